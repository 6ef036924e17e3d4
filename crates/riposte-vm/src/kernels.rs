//! Elementwise vector kernels: unary/binary/ternary maps with recycling
//! broadcast, folds, and scans, plus the Value-level dispatchers that
//! implement the numeric tower (logical ⊂ integer ⊂ double).
//!
//! NA is checked per element: any NA input element produces an NA output
//! element. Integer overflow and integer division by zero produce NA.

use lasso::Spur;
use riposte_core::{
    compare_spurs, is_na_character, is_na_real, na_real, RiposteError, Type, Value, NA_INTEGER,
    NA_LOGICAL,
};

// ── Map shapes ────────────────────────────────────────────────────

/// Unary elementwise map, unrolled by four.
pub fn zip1<A: Copy, R: Copy>(a: &[A], f: impl Fn(A) -> R) -> Vec<R> {
    let mut out = Vec::with_capacity(a.len());
    let mut i = 0;
    while i + 4 <= a.len() {
        out.push(f(a[i]));
        out.push(f(a[i + 1]));
        out.push(f(a[i + 2]));
        out.push(f(a[i + 3]));
        i += 4;
    }
    while i < a.len() {
        out.push(f(a[i]));
        i += 1;
    }
    out
}

/// Binary elementwise map with recycling broadcast: scalars broadcast,
/// equal lengths zip, a zero length produces an empty result, and
/// otherwise the shorter side cycles modulo its length.
pub fn zip2<A: Copy, B: Copy, R: Copy>(a: &[A], b: &[B], f: impl Fn(A, B) -> R) -> Vec<R> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    if a.len() == b.len() {
        let n = a.len();
        let mut out = Vec::with_capacity(n);
        let mut i = 0;
        while i + 4 <= n {
            out.push(f(a[i], b[i]));
            out.push(f(a[i + 1], b[i + 1]));
            out.push(f(a[i + 2], b[i + 2]));
            out.push(f(a[i + 3], b[i + 3]));
            i += 4;
        }
        while i < n {
            out.push(f(a[i], b[i]));
            i += 1;
        }
        return out;
    }
    if b.len() == 1 {
        let be = b[0];
        return zip1(a, |x| f(x, be));
    }
    if a.len() == 1 {
        let ae = a[0];
        return zip1(b, |y| f(ae, y));
    }
    // Unequal non-scalar lengths: the longer drives, the shorter cycles.
    let n = a.len().max(b.len());
    let mut out = Vec::with_capacity(n);
    let mut j = 0;
    let mut k = 0;
    for _ in 0..n {
        out.push(f(a[j], b[k]));
        j += 1;
        if j >= a.len() {
            j = 0;
        }
        k += 1;
        if k >= b.len() {
            k = 0;
        }
    }
    out
}

/// Ternary broadcast: output length is the max of the three, each input
/// cycled independently.
pub fn zip3<A: Copy, B: Copy, C: Copy, R: Copy>(
    a: &[A],
    b: &[B],
    c: &[C],
    f: impl Fn(A, B, C) -> R,
) -> Vec<R> {
    if a.is_empty() || b.is_empty() || c.is_empty() {
        return Vec::new();
    }
    let n = a.len().max(b.len()).max(c.len());
    let mut out = Vec::with_capacity(n);
    let (mut j, mut k, mut l) = (0, 0, 0);
    for _ in 0..n {
        out.push(f(a[j], b[k], c[l]));
        j += 1;
        if j >= a.len() {
            j = 0;
        }
        k += 1;
        if k >= b.len() {
            k = 0;
        }
        l += 1;
        if l >= c.len() {
            l = 0;
        }
    }
    out
}

/// Left fold from a base element, producing a scalar.
pub fn fold_left<A: Copy, R: Copy>(a: &[A], base: R, f: impl Fn(R, A) -> R) -> R {
    let mut acc = base;
    for e in a {
        acc = f(acc, *e);
    }
    acc
}

/// Left scan: the running fold results, same length as the input.
pub fn scan_left<A: Copy, R: Copy>(a: &[A], base: R, f: impl Fn(R, A) -> R) -> Vec<R> {
    let mut acc = base;
    let mut out = Vec::with_capacity(a.len());
    for e in a {
        acc = f(acc, *e);
        out.push(acc);
    }
    out
}

// ── Element operations ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl ArithOp {
    /// Division and exponentiation always produce doubles.
    pub fn forces_double(self) -> bool {
        matches!(self, ArithOp::Div | ArithOp::Pow)
    }

    pub fn eval_i(self, x: i64, y: i64) -> i64 {
        if x == NA_INTEGER || y == NA_INTEGER {
            return NA_INTEGER;
        }
        match self {
            ArithOp::Add => x.checked_add(y).unwrap_or(NA_INTEGER),
            ArithOp::Sub => x.checked_sub(y).unwrap_or(NA_INTEGER),
            ArithOp::Mul => x.checked_mul(y).unwrap_or(NA_INTEGER),
            ArithOp::IDiv => {
                if y == 0 {
                    NA_INTEGER
                } else {
                    // floor division
                    let q = x / y;
                    let r = x % y;
                    if r != 0 && (r < 0) != (y < 0) {
                        q - 1
                    } else {
                        q
                    }
                }
            }
            ArithOp::Mod => {
                if y == 0 {
                    NA_INTEGER
                } else {
                    // result takes the sign of the divisor
                    let r = x % y;
                    if r != 0 && (r < 0) != (y < 0) {
                        r + y
                    } else {
                        r
                    }
                }
            }
            ArithOp::Div | ArithOp::Pow => unreachable!("always evaluated as double"),
        }
    }

    pub fn eval_d(self, x: f64, y: f64) -> f64 {
        if is_na_real(x) || is_na_real(y) {
            return na_real();
        }
        match self {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
            ArithOp::IDiv => (x / y).floor(),
            ArithOp::Mod => x - (x / y).floor() * y,
            ArithOp::Pow => x.powf(y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn of_ordering(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::Neq => ord != Equal,
            CompareOp::Lt => ord == Less,
            CompareOp::Le => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::Ge => ord != Less,
        }
    }

    pub fn eval_d(self, x: f64, y: f64) -> u8 {
        if is_na_real(x) || is_na_real(y) || x.is_nan() || y.is_nan() {
            return NA_LOGICAL;
        }
        u8::from(self.of_ordering(x.partial_cmp(&y).expect("non-NaN doubles compare")))
    }

    pub fn eval_i(self, x: i64, y: i64) -> u8 {
        if x == NA_INTEGER || y == NA_INTEGER {
            return NA_LOGICAL;
        }
        u8::from(self.of_ordering(x.cmp(&y)))
    }

    pub fn eval_s(self, x: Spur, y: Spur) -> u8 {
        if is_na_character(x) || is_na_character(y) {
            return NA_LOGICAL;
        }
        match self {
            CompareOp::Eq => u8::from(x == y),
            CompareOp::Neq => u8::from(x != y),
            _ => u8::from(self.of_ordering(compare_spurs(x, y))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Abs,
    Sign,
    Sqrt,
    Floor,
    Ceiling,
    Trunc,
    Round,
    Signif,
    Exp,
    Log,
    Cos,
    Sin,
    Tan,
    ACos,
    ASin,
    ATan,
}

impl MathOp {
    pub fn eval_d(self, x: f64) -> f64 {
        if is_na_real(x) {
            return na_real();
        }
        match self {
            MathOp::Abs => x.abs(),
            MathOp::Sign => {
                if x.is_nan() {
                    x
                } else if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            MathOp::Sqrt => x.sqrt(),
            MathOp::Floor => x.floor(),
            MathOp::Ceiling => x.ceil(),
            MathOp::Trunc => x.trunc(),
            MathOp::Round => round_half_even(x),
            MathOp::Signif => signif(x, 6),
            MathOp::Exp => x.exp(),
            MathOp::Log => x.ln(),
            MathOp::Cos => x.cos(),
            MathOp::Sin => x.sin(),
            MathOp::Tan => x.tan(),
            MathOp::ACos => x.acos(),
            MathOp::ASin => x.asin(),
            MathOp::ATan => x.atan(),
        }
    }
}

/// Round half to even, the rounding of the source language.
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}

/// Round to `digits` significant digits.
fn signif(x: f64, digits: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = digits - 1 - x.abs().log10().floor() as i32;
    let scale = 10f64.powi(magnitude);
    round_half_even(x * scale) / scale
}

// three-valued logic

pub fn logic_and(x: u8, y: u8) -> u8 {
    if x == 0 || y == 0 {
        0
    } else if x == NA_LOGICAL || y == NA_LOGICAL {
        NA_LOGICAL
    } else {
        1
    }
}

pub fn logic_or(x: u8, y: u8) -> u8 {
    if (x == 1) || (y == 1) {
        1
    } else if x == NA_LOGICAL || y == NA_LOGICAL {
        NA_LOGICAL
    } else {
        0
    }
}

pub fn logic_not(x: u8) -> u8 {
    if x == NA_LOGICAL {
        NA_LOGICAL
    } else {
        u8::from(x == 0)
    }
}

// ── Coerced element views ─────────────────────────────────────────

pub enum Doubles<'a> {
    Borrowed(&'a [f64]),
    Owned(Vec<f64>),
}

impl Doubles<'_> {
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Doubles::Borrowed(s) => s,
            Doubles::Owned(v) => v,
        }
    }
}

pub fn double_view(v: &Value) -> Result<Doubles<'_>, RiposteError> {
    match v.tag() {
        Type::Double => Ok(Doubles::Borrowed(v.doubles_ref().expect("tag checked"))),
        Type::Integer => Ok(Doubles::Owned(zip1(
            v.integers_ref().expect("tag checked"),
            |i| {
                if i == NA_INTEGER {
                    na_real()
                } else {
                    i as f64
                }
            },
        ))),
        Type::Logical => Ok(Doubles::Owned(zip1(
            v.logicals_ref().expect("tag checked"),
            |b| {
                if b == NA_LOGICAL {
                    na_real()
                } else {
                    b as f64
                }
            },
        ))),
        t => Err(RiposteError::type_error("numeric", t.name())),
    }
}

pub enum Integers<'a> {
    Borrowed(&'a [i64]),
    Owned(Vec<i64>),
}

impl Integers<'_> {
    pub fn as_slice(&self) -> &[i64] {
        match self {
            Integers::Borrowed(s) => s,
            Integers::Owned(v) => v,
        }
    }
}

pub fn integer_view(v: &Value) -> Result<Integers<'_>, RiposteError> {
    match v.tag() {
        Type::Integer => Ok(Integers::Borrowed(v.integers_ref().expect("tag checked"))),
        Type::Logical => Ok(Integers::Owned(zip1(
            v.logicals_ref().expect("tag checked"),
            |b| {
                if b == NA_LOGICAL {
                    NA_INTEGER
                } else {
                    b as i64
                }
            },
        ))),
        t => Err(RiposteError::type_error("integer", t.name())),
    }
}

pub enum Logicals<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl Logicals<'_> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Logicals::Borrowed(s) => s,
            Logicals::Owned(v) => v,
        }
    }
}

pub fn logical_view(v: &Value) -> Result<Logicals<'_>, RiposteError> {
    match v.tag() {
        Type::Logical => Ok(Logicals::Borrowed(v.logicals_ref().expect("tag checked"))),
        Type::Integer => Ok(Logicals::Owned(zip1(
            v.integers_ref().expect("tag checked"),
            |i| {
                if i == NA_INTEGER {
                    NA_LOGICAL
                } else {
                    u8::from(i != 0)
                }
            },
        ))),
        Type::Double => Ok(Logicals::Owned(zip1(
            v.doubles_ref().expect("tag checked"),
            |d| {
                if is_na_real(d) || d.is_nan() {
                    NA_LOGICAL
                } else {
                    u8::from(d != 0.0)
                }
            },
        ))),
        t => Err(RiposteError::type_error("logical", t.name())),
    }
}

// ── Value-level dispatchers ───────────────────────────────────────

/// Binary arithmetic over the numeric tower, with recycling broadcast.
pub fn binary_arith(op: ArithOp, a: &Value, b: &Value) -> Result<Value, RiposteError> {
    let a = a.stripped();
    let b = b.stripped();
    if !a.is_math_coerce() || !b.is_math_coerce() {
        let got = if a.is_math_coerce() { b.tag() } else { a.tag() };
        return Err(RiposteError::type_error("numeric", got.name()));
    }

    let double = op.forces_double() || a.tag() == Type::Double || b.tag() == Type::Double;
    if double {
        // scalar fast path computes straight into a packed value
        if a.len() == 1 && b.len() == 1 {
            let x = a.as_double1().expect("math-coercible scalar");
            let y = b.as_double1().expect("math-coercible scalar");
            return Ok(Value::double(op.eval_d(x, y)));
        }
        let av = double_view(&a)?;
        let bv = double_view(&b)?;
        Ok(Value::doubles(zip2(av.as_slice(), bv.as_slice(), |x, y| {
            op.eval_d(x, y)
        })))
    } else {
        if a.len() == 1 && b.len() == 1 {
            let x = a.as_integer1().expect("math-coercible scalar");
            let y = b.as_integer1().expect("math-coercible scalar");
            return Ok(Value::integer(op.eval_i(x, y)));
        }
        let av = integer_view(&a)?;
        let bv = integer_view(&b)?;
        Ok(Value::integers(zip2(av.as_slice(), bv.as_slice(), |x, y| {
            op.eval_i(x, y)
        })))
    }
}

/// Unary + and -: type preserving on integers and doubles, logical
/// operands promote to integer.
pub fn unary_arith(negate: bool, a: &Value) -> Result<Value, RiposteError> {
    let a = a.stripped();
    match a.tag() {
        Type::Double => {
            let s = a.doubles_ref().expect("tag checked");
            if !negate {
                return Ok(a.clone());
            }
            Ok(Value::doubles(zip1(s, |x| {
                if is_na_real(x) {
                    na_real()
                } else {
                    -x
                }
            })))
        }
        Type::Integer | Type::Logical => {
            let v = integer_view(&a)?;
            let s = v.as_slice();
            if !negate {
                return Ok(Value::integers(s.to_vec()));
            }
            Ok(Value::integers(zip1(s, |x| {
                x.checked_neg().unwrap_or(NA_INTEGER)
            })))
        }
        t => Err(RiposteError::type_error("numeric", t.name())),
    }
}

/// Unary math kernels. `abs` preserves integers; everything else
/// evaluates in doubles.
pub fn unary_math(op: MathOp, a: &Value) -> Result<Value, RiposteError> {
    let a = a.stripped();
    if op == MathOp::Abs && a.tag() == Type::Integer {
        let s = a.integers_ref().expect("tag checked");
        // NA is MIN_INT64, whose absolute value overflows back to NA.
        return Ok(Value::integers(zip1(s, |x| {
            x.checked_abs().unwrap_or(NA_INTEGER)
        })));
    }
    let v = double_view(&a)?;
    Ok(Value::doubles(zip1(v.as_slice(), |x| op.eval_d(x))))
}

/// Binary comparison: numeric operands promote through the tower,
/// character operands compare by string collation. Output is logical.
pub fn binary_compare(op: CompareOp, a: &Value, b: &Value) -> Result<Value, RiposteError> {
    let a = a.stripped();
    let b = b.stripped();
    if a.tag() == Type::Character && b.tag() == Type::Character {
        let av = a.characters_ref().expect("tag checked");
        let bv = b.characters_ref().expect("tag checked");
        return Ok(Value::logicals(zip2(av, bv, |x, y| op.eval_s(x, y))));
    }
    if !a.is_math_coerce() || !b.is_math_coerce() {
        let got = if a.is_math_coerce() { b.tag() } else { a.tag() };
        return Err(RiposteError::type_error("comparable", got.name()));
    }
    if a.tag() == Type::Double || b.tag() == Type::Double {
        let av = double_view(&a)?;
        let bv = double_view(&b)?;
        Ok(Value::logicals(zip2(av.as_slice(), bv.as_slice(), |x, y| {
            op.eval_d(x, y)
        })))
    } else {
        let av = integer_view(&a)?;
        let bv = integer_view(&b)?;
        Ok(Value::logicals(zip2(av.as_slice(), bv.as_slice(), |x, y| {
            op.eval_i(x, y)
        })))
    }
}

/// Elementwise & and | with three-valued logic.
pub fn binary_logical(or: bool, a: &Value, b: &Value) -> Result<Value, RiposteError> {
    let a = a.stripped();
    let b = b.stripped();
    let av = logical_view(&a)?;
    let bv = logical_view(&b)?;
    let f = if or { logic_or } else { logic_and };
    Ok(Value::logicals(zip2(av.as_slice(), bv.as_slice(), f)))
}

/// Elementwise logical negation.
pub fn unary_logical_not(a: &Value) -> Result<Value, RiposteError> {
    let a = a.stripped();
    let av = logical_view(&a)?;
    Ok(Value::logicals(zip1(av.as_slice(), logic_not)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip2_equal_lengths() {
        let r = zip2(&[1, 2, 3, 4, 5], &[10, 20, 30, 40, 50], |a, b| a + b);
        assert_eq!(r, vec![11, 22, 33, 44, 55]);
    }

    #[test]
    fn test_zip2_recycles_shorter() {
        let r = zip2(&[1, 2, 3, 4, 5, 6], &[10, 20], |a, b| a + b);
        assert_eq!(r, vec![11, 22, 13, 24, 15, 26]);
    }

    #[test]
    fn test_zip2_empty_side() {
        let r: Vec<i64> = zip2(&[1i64, 2], &[], |a, _b: i64| a);
        assert!(r.is_empty());
    }

    #[test]
    fn test_zip3_max_length() {
        let r = zip3(&[1, 2, 3, 4, 5, 6], &[10, 20], &[100, 200, 300], |a, b, c| {
            a + b + c
        });
        assert_eq!(r, vec![111, 222, 313, 124, 235, 316]);
    }

    #[test]
    fn test_fold_and_scan() {
        assert_eq!(fold_left(&[1, 2, 3, 4], 0i64, |a, b| a + b), 10);
        assert_eq!(scan_left(&[1, 2, 3, 4], 0i64, |a, b| a + b), vec![1, 3, 6, 10]);
    }

    #[test]
    fn test_integer_overflow_is_na() {
        let r = binary_arith(ArithOp::Add, &Value::integer(i64::MAX), &Value::integer(1)).unwrap();
        assert_eq!(r.as_integer(), Some(NA_INTEGER));
    }

    #[test]
    fn test_division_always_double() {
        let r = binary_arith(ArithOp::Div, &Value::integer(7), &Value::integer(2)).unwrap();
        assert_eq!(r.as_double(), Some(3.5));
    }

    #[test]
    fn test_integer_division_and_modulo() {
        let r = binary_arith(ArithOp::IDiv, &Value::integer(-7), &Value::integer(2)).unwrap();
        assert_eq!(r.as_integer(), Some(-4));
        let r = binary_arith(ArithOp::Mod, &Value::integer(-7), &Value::integer(2)).unwrap();
        assert_eq!(r.as_integer(), Some(1));
        let r = binary_arith(ArithOp::Mod, &Value::integer(7), &Value::integer(0)).unwrap();
        assert_eq!(r.as_integer(), Some(NA_INTEGER));
    }

    #[test]
    fn test_na_propagates_through_arithmetic() {
        let a = Value::doubles(vec![1.0, na_real(), 3.0]);
        let r = binary_arith(ArithOp::Add, &a, &Value::double(1.0)).unwrap();
        let s = r.doubles_ref().unwrap();
        assert_eq!(s[0], 2.0);
        assert!(is_na_real(s[1]));
        assert_eq!(s[2], 4.0);
    }

    #[test]
    fn test_logical_promotes_to_integer() {
        let r = binary_arith(ArithOp::Add, &Value::logical(true), &Value::logical(true)).unwrap();
        assert_eq!(r.as_integer(), Some(2));
    }

    #[test]
    fn test_comparison_emits_logical() {
        let a = Value::integers(vec![1, 2, 3]);
        let r = binary_compare(CompareOp::Lt, &a, &Value::integer(3)).unwrap();
        assert_eq!(r.logicals_ref().unwrap(), &[1, 1, 0]);
    }

    #[test]
    fn test_nan_comparison_is_na() {
        let r = binary_compare(CompareOp::Eq, &Value::double(f64::NAN), &Value::double(1.0)).unwrap();
        assert_eq!(r.as_logical(), Some(NA_LOGICAL));
    }

    #[test]
    fn test_character_comparison() {
        let r = binary_compare(
            CompareOp::Lt,
            &Value::character_str("apple"),
            &Value::character_str("banana"),
        )
        .unwrap();
        assert_eq!(r.as_logical(), Some(1));
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(logic_and(0, NA_LOGICAL), 0);
        assert_eq!(logic_and(1, NA_LOGICAL), NA_LOGICAL);
        assert_eq!(logic_or(1, NA_LOGICAL), 1);
        assert_eq!(logic_or(0, NA_LOGICAL), NA_LOGICAL);
        assert_eq!(logic_not(NA_LOGICAL), NA_LOGICAL);
    }

    #[test]
    fn test_double_negation_round_trip() {
        let a = Value::logicals(vec![1, 0, NA_LOGICAL]);
        let r = unary_logical_not(&unary_logical_not(&a).unwrap()).unwrap();
        assert_eq!(r.logicals_ref().unwrap(), a.logicals_ref().unwrap());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_half_even(0.5), 0.0);
        assert_eq!(round_half_even(1.5), 2.0);
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(-0.5), 0.0);
        assert_eq!(signif(123456.789, 6), 123457.0);
        assert_eq!(signif(0.00123456789, 6), 0.00123457);
    }

    #[test]
    fn test_arith_on_function_is_type_error() {
        let f = Value::character_str("not a number");
        assert!(binary_arith(ArithOp::Add, &f, &Value::integer(1)).is_err());
    }
}
