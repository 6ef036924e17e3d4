//! The internal-function registry: one builtin per inline-cached
//! primitive operator (the guard constants and generic-call fallbacks),
//! plus the small core library (`c`, `list`, folds, subscripting,
//! attributes, conditions).

use lasso::Spur;
use riposte_core::{
    intern, is_na_real, na_real, strings, with_resolved, RiposteError, Type, Value, NA_INTEGER,
    NA_LOGICAL,
};

use crate::interp::{Arguments, Interpreter};
use crate::kernels::{self, ArithOp, CompareOp, MathOp};
use crate::trace::FoldKind;

pub fn register_all(interp: &mut Interpreter) {
    // operator primitives (guarded inline at call sites)
    interp.register_internal("+", internal_add, -1);
    interp.register_internal("-", internal_sub, -1);
    interp.register_internal("*", internal_mul, 2);
    interp.register_internal("/", internal_div, 2);
    interp.register_internal("%%", internal_mod, 2);
    interp.register_internal("%/%", internal_idiv, 2);
    interp.register_internal("^", internal_pow, 2);
    interp.register_internal("==", internal_eq, 2);
    interp.register_internal("!=", internal_neq, 2);
    interp.register_internal("<", internal_lt, 2);
    interp.register_internal("<=", internal_le, 2);
    interp.register_internal(">", internal_gt, 2);
    interp.register_internal(">=", internal_ge, 2);
    interp.register_internal("!", internal_not, 1);
    interp.register_internal("&", internal_and, 2);
    interp.register_internal("|", internal_or, 2);
    interp.register_internal("abs", |i, a| math1(i, a, MathOp::Abs), 1);
    interp.register_internal("sign", |i, a| math1(i, a, MathOp::Sign), 1);
    interp.register_internal("sqrt", |i, a| math1(i, a, MathOp::Sqrt), 1);
    interp.register_internal("floor", |i, a| math1(i, a, MathOp::Floor), 1);
    interp.register_internal("ceiling", |i, a| math1(i, a, MathOp::Ceiling), 1);
    interp.register_internal("trunc", |i, a| math1(i, a, MathOp::Trunc), 1);
    interp.register_internal("round", |i, a| math1(i, a, MathOp::Round), 1);
    interp.register_internal("signif", |i, a| math1(i, a, MathOp::Signif), 1);
    interp.register_internal("exp", |i, a| math1(i, a, MathOp::Exp), 1);
    interp.register_internal("log", |i, a| math1(i, a, MathOp::Log), 1);
    interp.register_internal("cos", |i, a| math1(i, a, MathOp::Cos), 1);
    interp.register_internal("sin", |i, a| math1(i, a, MathOp::Sin), 1);
    interp.register_internal("tan", |i, a| math1(i, a, MathOp::Tan), 1);
    interp.register_internal("acos", |i, a| math1(i, a, MathOp::ACos), 1);
    interp.register_internal("asin", |i, a| math1(i, a, MathOp::ASin), 1);
    interp.register_internal("atan", |i, a| math1(i, a, MathOp::ATan), 1);

    // core library
    interp.register_internal(":", internal_colon, 2);
    interp.register_internal("c", internal_c, -1);
    interp.register_internal("list", internal_list, -1);
    interp.register_internal("length", internal_length, 1);
    interp.register_internal("sum", internal_sum, -1);
    interp.register_internal("prod", internal_prod, -1);
    interp.register_internal("cumsum", internal_cumsum, 1);
    interp.register_internal("max", internal_max, -1);
    interp.register_internal("min", internal_min, -1);
    interp.register_internal("ifelse", internal_ifelse, 3);
    interp.register_internal("names", internal_names, 1);
    interp.register_internal("setNames", internal_set_names, 2);
    interp.register_internal("[", internal_subset, 2);
    interp.register_internal("stop", internal_stop, -1);
    interp.register_internal("warning", internal_warning, -1);
}

fn expect_args(name: &str, args: &Arguments, lo: usize, hi: usize) -> Result<(), RiposteError> {
    let n = args.values.len();
    if n < lo || n > hi {
        return Err(RiposteError::match_error(format!(
            "'{name}' expects {lo}..{hi} arguments, got {n}"
        )));
    }
    Ok(())
}

// ── Operator fallbacks ────────────────────────────────────────────

fn internal_add(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    expect_args("+", args, 1, 2)?;
    match args.values.len() {
        1 => kernels::unary_arith(false, &args.values[0]),
        _ => kernels::binary_arith(ArithOp::Add, &args.values[0], &args.values[1]),
    }
}

fn internal_sub(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    expect_args("-", args, 1, 2)?;
    match args.values.len() {
        1 => kernels::unary_arith(true, &args.values[0]),
        _ => kernels::binary_arith(ArithOp::Sub, &args.values[0], &args.values[1]),
    }
}

macro_rules! binary_arith_builtin {
    ($fn_name:ident, $op:expr) => {
        fn $fn_name(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
            kernels::binary_arith($op, &args.values[0], &args.values[1])
        }
    };
}

binary_arith_builtin!(internal_mul, ArithOp::Mul);
binary_arith_builtin!(internal_div, ArithOp::Div);
binary_arith_builtin!(internal_mod, ArithOp::Mod);
binary_arith_builtin!(internal_idiv, ArithOp::IDiv);
binary_arith_builtin!(internal_pow, ArithOp::Pow);

macro_rules! binary_compare_builtin {
    ($fn_name:ident, $op:expr) => {
        fn $fn_name(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
            kernels::binary_compare($op, &args.values[0], &args.values[1])
        }
    };
}

binary_compare_builtin!(internal_eq, CompareOp::Eq);
binary_compare_builtin!(internal_neq, CompareOp::Neq);
binary_compare_builtin!(internal_lt, CompareOp::Lt);
binary_compare_builtin!(internal_le, CompareOp::Le);
binary_compare_builtin!(internal_gt, CompareOp::Gt);
binary_compare_builtin!(internal_ge, CompareOp::Ge);

fn internal_not(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    kernels::unary_logical_not(&args.values[0])
}

fn internal_and(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    kernels::binary_logical(false, &args.values[0], &args.values[1])
}

fn internal_or(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    kernels::binary_logical(true, &args.values[0], &args.values[1])
}

fn math1(_i: &mut Interpreter, args: &Arguments, op: MathOp) -> Result<Value, RiposteError> {
    kernels::unary_math(op, &args.values[0])
}

// ── Ranges ────────────────────────────────────────────────────────

fn internal_colon(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    let from = args.values[0]
        .as_integer1()
        .filter(|i| *i != NA_INTEGER)
        .ok_or_else(|| RiposteError::runtime("NA/NaN argument"))?;
    let to = args.values[1]
        .as_integer1()
        .filter(|i| *i != NA_INTEGER)
        .ok_or_else(|| RiposteError::runtime("NA/NaN argument"))?;
    let out: Vec<i64> = if from <= to {
        (from..=to).collect()
    } else {
        (to..=from).rev().collect()
    };
    Ok(Value::integers(out))
}

// ── Concatenation ─────────────────────────────────────────────────

/// The promoted result tag for concatenation over the tower
/// (logical < integer < double < character; anything else forces a list).
fn concat_tag(values: &[Value]) -> Result<Type, RiposteError> {
    let mut tag = Type::Null;
    let mut saw_raw = false;
    for v in values {
        let base = v.stripped();
        match base.tag() {
            Type::Null => {}
            Type::Raw => saw_raw = true,
            Type::Logical | Type::Integer | Type::Double | Type::Character => {
                tag = tag.max(base.tag());
            }
            _ => tag = Type::List,
        }
    }
    if saw_raw {
        if tag == Type::Null {
            return Ok(Type::Raw);
        }
        return Err(RiposteError::type_error("raw", tag.name()));
    }
    Ok(tag)
}

fn character_of(v: &Value, i: usize) -> Spur {
    match v.tag() {
        Type::Character => v.characters_ref().expect("tag checked")[i],
        Type::Logical => {
            let e = v.logicals_ref().expect("tag checked")[i];
            match e {
                0 => intern("FALSE"),
                NA_LOGICAL => strings().na,
                _ => intern("TRUE"),
            }
        }
        Type::Integer => {
            let e = v.integers_ref().expect("tag checked")[i];
            if e == NA_INTEGER {
                strings().na
            } else {
                intern(&e.to_string())
            }
        }
        Type::Double => {
            let e = v.doubles_ref().expect("tag checked")[i];
            if is_na_real(e) {
                strings().na
            } else {
                intern(&format!("{e}"))
            }
        }
        _ => strings().na,
    }
}

/// Whole-vector coercion within the tower (plus character and list).
pub fn coerce_vector(v: &Value, target: Type) -> Result<Value, RiposteError> {
    let base = v.stripped();
    if base.tag() == target {
        return Ok(base);
    }
    match target {
        Type::Integer => {
            let view = kernels::integer_view(&base)?;
            Ok(Value::integers(view.as_slice().to_vec()))
        }
        Type::Double => {
            let view = kernels::double_view(&base)?;
            Ok(Value::doubles(view.as_slice().to_vec()))
        }
        Type::Logical => {
            let view = kernels::logical_view(&base)?;
            Ok(Value::logicals(view.as_slice().to_vec()))
        }
        Type::Character => {
            let n = base.len() as usize;
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                out.push(character_of(&base, i));
            }
            Ok(Value::characters(out))
        }
        Type::List => {
            let n = base.len() as usize;
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                out.push(element_at(&base, i));
            }
            Ok(Value::list(out))
        }
        t => Err(RiposteError::type_error(t.name(), base.tag().name())),
    }
}

/// One element of a vector as a scalar Value.
fn element_at(v: &Value, i: usize) -> Value {
    match v.tag() {
        Type::Logical => Value::logical_elem(v.logicals_ref().expect("tag checked")[i]),
        Type::Integer => Value::integer(v.integers_ref().expect("tag checked")[i]),
        Type::Double => Value::double(v.doubles_ref().expect("tag checked")[i]),
        Type::Character => Value::character(v.characters_ref().expect("tag checked")[i]),
        Type::Raw => Value::raw(v.raws_ref().expect("tag checked")[i]),
        Type::List => v.list_ref().expect("tag checked")[i].clone(),
        _ => v.clone(),
    }
}

fn internal_c(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    if args.values.is_empty() {
        return Ok(Value::null());
    }
    let tag = concat_tag(&args.values)?;
    if tag == Type::Null {
        return Ok(Value::null());
    }

    let mut out: Vec<Value> = Vec::new();
    let mut out_names: Vec<Spur> = Vec::new();
    let mut any_named = false;
    for (i, v) in args.values.iter().enumerate() {
        let label = args.name_of(i);
        let base = v.stripped();
        if base.is_null() {
            continue;
        }
        let coerced = if tag == Type::List && !base.is_vector() {
            Value::list(vec![base.clone()])
        } else {
            coerce_vector(&base, tag)?
        };
        let n = coerced.len() as usize;
        for j in 0..n {
            out.push(element_at(&coerced, j));
            // labels attach to scalar arguments; longer arguments keep
            // their positions unnamed
            if n == 1 && label != strings().empty {
                out_names.push(label);
                any_named = true;
            } else {
                out_names.push(strings().empty);
            }
        }
    }

    let result = match tag {
        Type::Logical => Value::logicals(out.iter().map(|v| v.as_logical().expect("coerced")).collect()),
        Type::Integer => Value::integers(out.iter().map(|v| v.as_integer().expect("coerced")).collect()),
        Type::Double => Value::doubles(out.iter().map(|v| v.as_double().expect("coerced")).collect()),
        Type::Character => {
            Value::characters(out.iter().map(|v| v.as_character().expect("coerced")).collect())
        }
        Type::Raw => Value::raws(out.iter().map(|v| v.raws_ref().expect("coerced")[0]).collect()),
        _ => Value::list(out),
    };
    if any_named {
        Ok(result.set_names(Value::characters(out_names)))
    } else {
        Ok(result)
    }
}

fn internal_list(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    let result = Value::list(args.values.clone());
    let any_named = (0..args.values.len()).any(|i| args.name_of(i) != strings().empty);
    if any_named {
        let names: Vec<Spur> = (0..args.values.len()).map(|i| args.name_of(i)).collect();
        Ok(result.set_names(Value::characters(names)))
    } else {
        Ok(result)
    }
}

fn internal_length(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    Ok(Value::integer(args.values[0].stripped().len()))
}

// ── Folds and scans ───────────────────────────────────────────────

fn fold_numeric(
    interp: &mut Interpreter,
    args: &Arguments,
    kind: FoldKind,
) -> Result<Value, RiposteError> {
    let any_double = args
        .values
        .iter()
        .any(|v| v.stripped().tag() == Type::Double);
    let result = if any_double || matches!(kind, FoldKind::Prod) {
        let (base, f): (f64, fn(f64, f64) -> f64) = match kind {
            FoldKind::Sum => (0.0, |a, x| a + x),
            FoldKind::Prod => (1.0, |a, x| a * x),
        };
        let mut acc = base;
        for v in &args.values {
            let v = v.stripped();
            let view = kernels::double_view(&v)?;
            acc = kernels::fold_left(view.as_slice(), acc, |a, x| {
                if is_na_real(a) || is_na_real(x) {
                    na_real()
                } else {
                    f(a, x)
                }
            });
        }
        Value::double(acc)
    } else {
        let mut acc: i64 = 0;
        for v in &args.values {
            let v = v.stripped();
            let view = kernels::integer_view(&v)?;
            acc = kernels::fold_left(view.as_slice(), acc, |a, x| {
                if a == NA_INTEGER || x == NA_INTEGER {
                    NA_INTEGER
                } else {
                    a.checked_add(x).unwrap_or(NA_INTEGER)
                }
            });
        }
        Value::integer(acc)
    };
    if let [single] = args.values.as_slice() {
        interp.trace.record_fold(kind, single, &result);
    }
    Ok(result)
}

fn internal_sum(i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    fold_numeric(i, args, FoldKind::Sum)
}

fn internal_prod(i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    fold_numeric(i, args, FoldKind::Prod)
}

fn internal_cumsum(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    let v = args.values[0].stripped();
    if v.tag() == Type::Double {
        let s = v.doubles_ref().expect("tag checked");
        Ok(Value::doubles(kernels::scan_left(s, 0.0, |a, x| {
            if is_na_real(a) || is_na_real(x) {
                na_real()
            } else {
                a + x
            }
        })))
    } else {
        let view = kernels::integer_view(&v)?;
        Ok(Value::integers(kernels::scan_left(
            view.as_slice(),
            0i64,
            |a, x| {
                if a == NA_INTEGER || x == NA_INTEGER {
                    NA_INTEGER
                } else {
                    a.checked_add(x).unwrap_or(NA_INTEGER)
                }
            },
        )))
    }
}

fn extreme(
    interp: &mut Interpreter,
    args: &Arguments,
    maximum: bool,
) -> Result<Value, RiposteError> {
    let mut acc = if maximum {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    };
    let mut saw_element = false;
    for v in &args.values {
        let v = v.stripped();
        let view = kernels::double_view(&v)?;
        for x in view.as_slice() {
            saw_element = true;
            if is_na_real(acc) || is_na_real(*x) {
                acc = na_real();
            } else if maximum {
                acc = acc.max(*x);
            } else {
                acc = acc.min(*x);
            }
        }
    }
    if !saw_element {
        interp.warning(if maximum {
            "no non-missing arguments to max; returning -Inf"
        } else {
            "no non-missing arguments to min; returning Inf"
        });
    }
    Ok(Value::double(acc))
}

fn internal_max(i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    extreme(i, args, true)
}

fn internal_min(i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    extreme(i, args, false)
}

fn internal_ifelse(interp: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    let test = args.values[0].stripped();
    let yes = args.values[1].stripped();
    let no = args.values[2].stripped();

    let t = kernels::logical_view(&test)?;
    let result = if yes.tag() == Type::Double || no.tag() == Type::Double {
        let y = kernels::double_view(&yes)?;
        let n = kernels::double_view(&no)?;
        Value::doubles(kernels::zip3(
            t.as_slice(),
            y.as_slice(),
            n.as_slice(),
            |t, y, n| match t {
                0 => n,
                NA_LOGICAL => na_real(),
                _ => y,
            },
        ))
    } else {
        let y = kernels::integer_view(&yes)?;
        let n = kernels::integer_view(&no)?;
        Value::integers(kernels::zip3(
            t.as_slice(),
            y.as_slice(),
            n.as_slice(),
            |t, y, n| match t {
                0 => n,
                NA_LOGICAL => NA_INTEGER,
                _ => y,
            },
        ))
    };
    interp.trace.record_ternary(&test, &yes, &no, &result);
    Ok(result)
}

// ── Attributes ────────────────────────────────────────────────────

fn internal_names(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    Ok(args.values[0].names_of().unwrap_or_else(Value::null))
}

fn internal_set_names(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    let v = &args.values[0];
    let names = &args.values[1];
    if names.is_null() {
        return Ok(v.set_names(Value::nil()));
    }
    let names = coerce_vector(names, Type::Character)?;
    if names.len() != v.stripped().len() {
        return Err(RiposteError::runtime(
            "'names' attribute must be the same length as the vector",
        ));
    }
    Ok(v.set_names(names))
}

// ── Subscripting ──────────────────────────────────────────────────

/// Resolve an index argument to element positions (None selects NA).
fn index_positions(x: &Value, index: &Value) -> Result<Vec<Option<usize>>, RiposteError> {
    let n = x.stripped().len();
    let index_base = index.stripped();
    match index_base.tag() {
        Type::Logical => {
            let mask = index_base.logicals_ref().expect("tag checked");
            if mask.is_empty() {
                return Ok(Vec::new());
            }
            let mut out = Vec::new();
            let span = (n as usize).max(mask.len());
            for i in 0..span {
                match mask[i % mask.len()] {
                    0 => {}
                    NA_LOGICAL => out.push(None),
                    _ => out.push(if (i as i64) < n { Some(i) } else { None }),
                }
            }
            Ok(out)
        }
        Type::Integer | Type::Double => {
            let coerced = coerce_vector(&index_base, Type::Integer)?;
            let view = kernels::integer_view(&coerced)?;
            let idx = view.as_slice().to_vec();
            let any_neg = idx.iter().any(|i| *i != NA_INTEGER && *i < 0);
            let any_pos = idx.iter().any(|i| *i != NA_INTEGER && *i > 0);
            if any_neg && any_pos {
                return Err(RiposteError::runtime(
                    "can't mix positive and negative subscripts",
                ));
            }
            if any_neg {
                let excluded: Vec<i64> = idx
                    .iter()
                    .filter(|i| **i != NA_INTEGER)
                    .map(|i| -i)
                    .collect();
                let mut out = Vec::new();
                for i in 0..n {
                    if !excluded.contains(&(i + 1)) {
                        out.push(Some(i as usize));
                    }
                }
                Ok(out)
            } else {
                let mut out = Vec::new();
                for i in idx {
                    if i == NA_INTEGER {
                        out.push(None);
                    } else if i == 0 {
                        // zero subscripts select nothing
                    } else if i <= n {
                        out.push(Some((i - 1) as usize));
                    } else {
                        out.push(None);
                    }
                }
                Ok(out)
            }
        }
        Type::Character => {
            let wanted = index_base.characters_ref().expect("tag checked");
            let names = x.names_of();
            let names = names.as_ref().and_then(|v| v.characters_ref());
            let mut out = Vec::new();
            for w in wanted {
                let hit = names.and_then(|ns| ns.iter().position(|n| n == w));
                out.push(hit);
            }
            Ok(out)
        }
        t => Err(RiposteError::type_error("subscript", t.name())),
    }
}

fn empty_of(tag: Type) -> Value {
    match tag {
        Type::Logical => Value::logicals(Vec::new()),
        Type::Integer => Value::integers(Vec::new()),
        Type::Double => Value::doubles(Vec::new()),
        Type::Character => Value::characters(Vec::new()),
        Type::Raw => Value::raws(Vec::new()),
        _ => Value::list(Vec::new()),
    }
}

fn na_element_of(tag: Type) -> Value {
    match tag {
        Type::Logical => Value::logical_elem(NA_LOGICAL),
        Type::Integer => Value::integer(NA_INTEGER),
        Type::Double => Value::double(na_real()),
        Type::Character => Value::character(strings().na),
        _ => Value::null(),
    }
}

/// `x[i]`: select elements by position, logical mask, or name.
pub fn subset(x: &Value, index: &Value) -> Result<Value, RiposteError> {
    let base = x.stripped();
    if !base.is_vector() || base.is_null() {
        return Err(RiposteError::type_error("vector", base.tag().name()));
    }
    let positions = index_positions(x, index)?;
    let tag = base.tag();
    let mut out = Vec::with_capacity(positions.len());
    for p in positions {
        match p {
            Some(i) => out.push(element_at(&base, i)),
            None => out.push(na_element_of(tag)),
        }
    }
    match tag {
        Type::Logical => Ok(Value::logicals(
            out.iter().map(|v| v.as_logical().expect("selected")).collect(),
        )),
        Type::Integer => Ok(Value::integers(
            out.iter().map(|v| v.as_integer().expect("selected")).collect(),
        )),
        Type::Double => Ok(Value::doubles(
            out.iter().map(|v| v.as_double().expect("selected")).collect(),
        )),
        Type::Character => Ok(Value::characters(
            out.iter().map(|v| v.as_character().expect("selected")).collect(),
        )),
        _ => Ok(Value::list(out)),
    }
}

fn internal_subset(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    subset(&args.values[0], &args.values[1])
}

/// `x[i] <- value`: indexed assignment. The target is promoted to the
/// wider of its own and the replacement's type; writing past the end
/// extends the vector with NA.
pub fn sub_assign(x: &Value, index: &Value, value: &Value) -> Result<Value, RiposteError> {
    let base = x.stripped();
    let value = value.stripped();
    if !base.is_vector() {
        return Err(RiposteError::type_error("vector", base.tag().name()));
    }

    let positions: Vec<usize> = index_positions(x, index)?
        .into_iter()
        .map(|p| p.ok_or_else(|| RiposteError::runtime("NAs are not allowed in subscripted assignments")))
        .collect::<Result<_, _>>()?;
    if positions.is_empty() {
        return Ok(base);
    }
    if value.len() == 0 {
        return Err(RiposteError::runtime("replacement has length zero"));
    }

    let tag = if base.is_null() {
        value.tag()
    } else {
        base.tag().max(value.tag())
    };
    // assignment into NULL builds a fresh vector of the replacement type
    let target = if base.is_null() {
        empty_of(tag)
    } else {
        coerce_vector(&base, tag)?
    };
    let replacement = coerce_vector(&value, tag)?;

    let needed = positions.iter().map(|p| p + 1).max().unwrap_or(0);
    let mut elements: Vec<Value> = (0..target.len() as usize)
        .map(|i| element_at(&target, i))
        .collect();
    while elements.len() < needed {
        elements.push(na_element_of(tag));
    }
    for (k, p) in positions.iter().enumerate() {
        elements[*p] = element_at(&replacement, k % replacement.len() as usize);
    }

    match tag {
        Type::Logical => Ok(Value::logicals(
            elements.iter().map(|v| v.as_logical().expect("coerced")).collect(),
        )),
        Type::Integer => Ok(Value::integers(
            elements.iter().map(|v| v.as_integer().expect("coerced")).collect(),
        )),
        Type::Double => Ok(Value::doubles(
            elements.iter().map(|v| v.as_double().expect("coerced")).collect(),
        )),
        Type::Character => Ok(Value::characters(
            elements.iter().map(|v| v.as_character().expect("coerced")).collect(),
        )),
        _ => Ok(Value::list(elements)),
    }
}

// ── Conditions ────────────────────────────────────────────────────

fn condition_message(args: &Arguments, fallback: &str) -> String {
    if args.values.is_empty() {
        return fallback.to_string();
    }
    args.values
        .iter()
        .map(|v| match v.as_character() {
            Some(s) => with_resolved(s, |msg| msg.to_string()),
            None => format!("{v}"),
        })
        .collect::<Vec<_>>()
        .join("")
}

fn internal_stop(_i: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    Err(RiposteError::runtime(condition_message(args, "error")))
}

fn internal_warning(interp: &mut Interpreter, args: &Arguments) -> Result<Value, RiposteError> {
    let msg = condition_message(args, "warning");
    interp.warning(msg);
    Ok(Value::null())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forced(values: Vec<Value>) -> Arguments {
        Arguments {
            values,
            names: Vec::new(),
        }
    }

    #[test]
    fn test_c_promotes_through_tower() {
        let mut i = Interpreter::new();
        let r = internal_c(
            &mut i,
            &forced(vec![Value::logical(true), Value::integer(2), Value::double(3.5)]),
        )
        .unwrap();
        assert_eq!(r.doubles_ref().unwrap(), &[1.0, 2.0, 3.5]);
    }

    #[test]
    fn test_c_flattens() {
        let mut i = Interpreter::new();
        let r = internal_c(
            &mut i,
            &forced(vec![Value::integers(vec![1, 2]), Value::integer(3)]),
        )
        .unwrap();
        assert_eq!(r.integers_ref().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_colon_descends() {
        let mut i = Interpreter::new();
        let r = internal_colon(&mut i, &forced(vec![Value::integer(4), Value::integer(1)])).unwrap();
        assert_eq!(r.integers_ref().unwrap(), &[4, 3, 2, 1]);
    }

    #[test]
    fn test_sum_integer_stays_integer() {
        let mut i = Interpreter::new();
        let r = internal_sum(&mut i, &forced(vec![Value::integers(vec![1, 2, 3])])).unwrap();
        assert_eq!(r.as_integer(), Some(6));
    }

    #[test]
    fn test_sum_doubles() {
        let mut i = Interpreter::new();
        let r = internal_sum(&mut i, &forced(vec![Value::doubles(vec![1.0, 2.0, 3.0])])).unwrap();
        assert_eq!(r.as_double(), Some(6.0));
    }

    #[test]
    fn test_cumsum_scan() {
        let mut i = Interpreter::new();
        let r = internal_cumsum(&mut i, &forced(vec![Value::integers(vec![1, 2, 3, 4])])).unwrap();
        assert_eq!(r.integers_ref().unwrap(), &[1, 3, 6, 10]);
    }

    #[test]
    fn test_subset_positive_indices() {
        let x = Value::doubles(vec![10.0, 20.0, 30.0]);
        let r = subset(&x, &Value::integers(vec![3, 1])).unwrap();
        assert_eq!(r.doubles_ref().unwrap(), &[30.0, 10.0]);
    }

    #[test]
    fn test_subset_out_of_range_is_na() {
        let x = Value::integers(vec![1, 2]);
        let r = subset(&x, &Value::integer(5)).unwrap();
        assert_eq!(r.as_integer(), Some(NA_INTEGER));
    }

    #[test]
    fn test_subset_negative_excludes() {
        let x = Value::integers(vec![1, 2, 3]);
        let r = subset(&x, &Value::integer(-2)).unwrap();
        assert_eq!(r.integers_ref().unwrap(), &[1, 3]);
    }

    #[test]
    fn test_subset_by_name() {
        let x = Value::integers(vec![1, 2]).set_names(Value::characters(vec![
            intern("a"),
            intern("b"),
        ]));
        let r = subset(&x, &Value::character_str("b")).unwrap();
        assert_eq!(r.as_integer(), Some(2));
    }

    #[test]
    fn test_sub_assign_promotes_and_extends() {
        let x = Value::integers(vec![1, 2]);
        let r = sub_assign(&x, &Value::integer(4), &Value::double(9.5)).unwrap();
        let s = r.doubles_ref().unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s[0], 1.0);
        assert!(is_na_real(s[2]));
        assert_eq!(s[3], 9.5);
    }

    #[test]
    fn test_set_names_round_trip() {
        let mut i = Interpreter::new();
        let v = Value::integers(vec![1, 2]);
        let names = Value::characters(vec![intern("a"), intern("b")]);
        let named = internal_set_names(&mut i, &forced(vec![v, names.clone()])).unwrap();
        let got = internal_names(&mut i, &forced(vec![named.clone()])).unwrap();
        assert_eq!(
            got.characters_ref().unwrap(),
            names.characters_ref().unwrap()
        );
        // Stripping names with NULL
        let stripped = internal_set_names(&mut i, &forced(vec![named, Value::null()])).unwrap();
        assert!(internal_names(&mut i, &forced(vec![stripped])).unwrap().is_null());
    }

    #[test]
    fn test_stop_raises_runtime_error() {
        let mut i = Interpreter::new();
        let err = internal_stop(&mut i, &forced(vec![Value::character_str("boom")])).unwrap_err();
        match err {
            RiposteError::Runtime(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_warning_buffers() {
        let mut i = Interpreter::new();
        internal_warning(&mut i, &forced(vec![Value::character_str("careful")])).unwrap();
        assert_eq!(i.take_warnings(), vec!["careful".to_string()]);
    }
}
