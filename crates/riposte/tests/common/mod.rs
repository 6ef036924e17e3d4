//! Expression-tree builders following the parser contract: literals,
//! interned symbols, Call objects (class "Call", optional names), and
//! Expression sequences.

#![allow(dead_code)]

use riposte::{create_call, create_expression, intern, strings, Spur, Value};

pub fn sym(s: &str) -> Value {
    Value::symbol_str(s)
}

pub fn int(n: i64) -> Value {
    Value::integer(n)
}

pub fn dbl(d: f64) -> Value {
    Value::double(d)
}

pub fn lgl(b: bool) -> Value {
    Value::logical(b)
}

pub fn chr(s: &str) -> Value {
    Value::character_str(s)
}

pub fn call(items: Vec<Value>) -> Value {
    create_call(items, None)
}

/// A call with keyword labels; `""` marks a positional argument.
pub fn call_named(items: Vec<Value>, labels: Vec<&str>) -> Value {
    let mut names: Vec<Spur> = Vec::with_capacity(items.len());
    names.push(strings().empty); // the callee slot
    for l in labels {
        names.push(if l.is_empty() { strings().empty } else { intern(l) });
    }
    assert_eq!(names.len(), items.len());
    create_call(items, Some(names))
}

pub fn exprs(items: Vec<Value>) -> Value {
    create_expression(items)
}

pub fn block(items: Vec<Value>) -> Value {
    let mut all = vec![sym("{")];
    all.extend(items);
    call(all)
}

pub fn assign(name: &str, value: Value) -> Value {
    call(vec![sym("<-"), sym(name), value])
}

pub fn binop(op: &str, a: Value, b: Value) -> Value {
    call(vec![sym(op), a, b])
}

pub fn unop(op: &str, a: Value) -> Value {
    call(vec![sym(op), a])
}

pub fn if_(cond: Value, then: Value) -> Value {
    call(vec![sym("if"), cond, then])
}

pub fn if_else(cond: Value, then: Value, alt: Value) -> Value {
    call(vec![sym("if"), cond, then, alt])
}

pub fn colon(lo: Value, hi: Value) -> Value {
    call(vec![sym(":"), lo, hi])
}

pub fn for_(var: &str, lo: Value, hi: Value, body: Value) -> Value {
    call(vec![sym("for"), sym(var), colon(lo, hi), body])
}

pub fn while_(cond: Value, body: Value) -> Value {
    call(vec![sym("while"), cond, body])
}

pub fn repeat_(body: Value) -> Value {
    call(vec![sym("repeat"), body])
}

/// function(params) body; each param is (name, default expression).
pub fn function(params: Vec<(&str, Option<Value>)>, body: Value) -> Value {
    let formals = if params.is_empty() {
        Value::null()
    } else {
        let names: Vec<Spur> = params.iter().map(|(n, _)| intern(n)).collect();
        let defaults: Vec<Value> = params
            .into_iter()
            .map(|(_, d)| d.unwrap_or_else(Value::nil))
            .collect();
        Value::list(defaults).set_names(Value::characters(names))
    };
    call(vec![sym("function"), formals, body])
}
