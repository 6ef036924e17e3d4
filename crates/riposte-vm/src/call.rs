//! The function-call protocol: environment creation, positional, named,
//! and variadic argument matching, and default binding.

use std::rc::Rc;

use riposte_core::{
    resolve, strings, Environment, FunctionInner, Prototype, RiposteError, Spur, Value,
};

use crate::interp::Interpreter;

/// Invoke a closure: allocate the callee environment (lexical parent is
/// the captured environment, dynamic parent is the caller), match actuals
/// against formals, bind defaults, and evaluate the body.
pub fn apply_closure(
    interp: &mut Interpreter,
    f: Rc<FunctionInner>,
    args: Vec<Value>,
    names: Vec<Spur>,
    record: Value,
) -> Result<Value, RiposteError> {
    let proto = f.prototype.clone();
    let fenv = Environment::new(f.env.clone(), interp.current_env().clone(), record);
    let fenv_value = fenv.to_value();
    match_arguments(&proto, args, names, &fenv, &fenv_value)?;

    // A body that is a bare symbol needs no bytecode: resolve it as a
    // plain (forced) lookup.
    if let Some(sym) = proto.expression.as_symbol() {
        return interp.get_forced(&fenv_value, sym);
    }
    interp.eval_in(&proto, fenv_value)
}

/// Match actual arguments against a prototype's formals and bind them
/// (plus defaults and `...`) into `fenv`.
///
/// Keyword matching is exact; unnamed actuals fill the remaining formals
/// in order up to the dots position; excess actuals land in `...` in call
/// order.
pub fn match_arguments(
    proto: &Rc<Prototype>,
    args: Vec<Value>,
    names: Vec<Spur>,
    fenv: &Rc<Environment>,
    fenv_value: &Value,
) -> Result<(), RiposteError> {
    let s = strings();
    let formals = &proto.parameters;
    let dots_pos = proto.dots;
    let mut filled = vec![false; formals.len()];
    let mut dots_values: Vec<Value> = Vec::new();
    let mut dots_names: Vec<Spur> = Vec::new();
    let positional_limit = if dots_pos >= 0 {
        dots_pos as usize
    } else {
        formals.len()
    };

    // Decide each actual's destination first, then bind in call order so
    // that `...` preserves the original argument order even when named
    // and unnamed actuals interleave.
    enum Dest {
        Formal(usize),
        Dots,
    }
    let mut dest: Vec<Option<Dest>> = (0..args.len()).map(|_| None).collect();

    // First pass: each named actual binds its exactly-matching formal.
    for (i, _) in args.iter().enumerate() {
        let name = names.get(i).copied().unwrap_or(s.empty);
        if name == s.empty {
            continue;
        }
        match formals.iter().position(|f| *f == name && *f != s.dots) {
            Some(j) => {
                if filled[j] {
                    return Err(RiposteError::match_error(format!(
                        "formal argument '{}' matched by multiple actual arguments",
                        resolve(name)
                    )));
                }
                filled[j] = true;
                dest[i] = Some(Dest::Formal(j));
            }
            None => {
                if dots_pos >= 0 {
                    dest[i] = Some(Dest::Dots);
                } else {
                    return Err(RiposteError::match_error(format!(
                        "unused argument '{}'",
                        resolve(name)
                    )));
                }
            }
        }
    }

    // Second pass: unnamed actuals fill the formals still holding their
    // defaults, in order; the overflow goes to `...`.
    let mut next_formal = 0;
    for d in dest.iter_mut() {
        if d.is_some() {
            continue;
        }
        while next_formal < positional_limit && filled[next_formal] {
            next_formal += 1;
        }
        if next_formal < positional_limit {
            filled[next_formal] = true;
            *d = Some(Dest::Formal(next_formal));
            next_formal += 1;
        } else if dots_pos >= 0 {
            *d = Some(Dest::Dots);
        } else {
            return Err(RiposteError::match_error("unused arguments in call"));
        }
    }

    for (i, arg) in args.into_iter().enumerate() {
        match dest[i] {
            Some(Dest::Formal(j)) => {
                fenv.assign(formals[j], arg);
            }
            Some(Dest::Dots) => {
                dots_values.push(arg);
                dots_names.push(names.get(i).copied().unwrap_or(s.empty));
            }
            None => unreachable!("every actual is assigned a destination"),
        }
    }

    if dots_pos >= 0 {
        filled[dots_pos as usize] = true;
        fenv.assign(s.dots, Value::list(dots_values));
        fenv.set_dots(dots_names);
    }

    // Unmatched formals get their default expression as a promise over
    // the new environment; formals with no default get the missing
    // marker, whose forcing is the "argument is missing" error.
    for (j, formal) in formals.iter().enumerate() {
        if filled[j] {
            continue;
        }
        match proto.defaults[j].as_code_rc() {
            Some(code) => {
                fenv.assign(*formal, Value::promise_expr(code, fenv_value.clone()));
            }
            None => {
                fenv.assign(*formal, Value::promise_missing(*formal));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use riposte_core::intern;

    fn proto_with_formals(formals: &[&str], defaults: Vec<Value>) -> Rc<Prototype> {
        let parameters: Vec<Spur> = formals.iter().map(|f| intern(f)).collect();
        let dots = parameters
            .iter()
            .position(|p| *p == strings().dots)
            .map(|i| i as i64)
            .unwrap_or(-1);
        Rc::new(Prototype::new(
            Value::null(),
            parameters,
            defaults,
            dots,
            0,
            vec![],
            vec![],
        ))
    }

    fn fresh_env() -> (Rc<Environment>, Value) {
        let env = Environment::new(Value::null(), Value::null(), Value::null());
        let v = env.to_value();
        (env, v)
    }

    #[test]
    fn test_positional_matching() {
        let proto = proto_with_formals(&["a", "b"], vec![Value::nil(), Value::nil()]);
        let (env, ev) = fresh_env();
        match_arguments(
            &proto,
            vec![Value::integer(1), Value::integer(2)],
            vec![],
            &env,
            &ev,
        )
        .unwrap();
        assert_eq!(env.get(intern("a")), Value::integer(1));
        assert_eq!(env.get(intern("b")), Value::integer(2));
    }

    #[test]
    fn test_named_then_positional() {
        let proto = proto_with_formals(&["a", "b", "c"], vec![Value::nil(); 3]);
        let (env, ev) = fresh_env();
        // f(b=2, 1, 3) → a=1, b=2, c=3
        match_arguments(
            &proto,
            vec![Value::integer(2), Value::integer(1), Value::integer(3)],
            vec![intern("b"), strings().empty, strings().empty],
            &env,
            &ev,
        )
        .unwrap();
        assert_eq!(env.get(intern("a")), Value::integer(1));
        assert_eq!(env.get(intern("b")), Value::integer(2));
        assert_eq!(env.get(intern("c")), Value::integer(3));
    }

    #[test]
    fn test_unknown_keyword_without_dots_is_match_error() {
        let proto = proto_with_formals(&["a"], vec![Value::nil()]);
        let (env, ev) = fresh_env();
        let err = match_arguments(
            &proto,
            vec![Value::integer(1)],
            vec![intern("zz")],
            &env,
            &ev,
        )
        .unwrap_err();
        assert!(matches!(err, RiposteError::Match(_)));
    }

    #[test]
    fn test_duplicate_keyword_is_match_error() {
        let proto = proto_with_formals(&["a"], vec![Value::nil()]);
        let (env, ev) = fresh_env();
        let err = match_arguments(
            &proto,
            vec![Value::integer(1), Value::integer(2)],
            vec![intern("a"), intern("a")],
            &env,
            &ev,
        )
        .unwrap_err();
        assert!(matches!(err, RiposteError::Match(_)));
    }

    #[test]
    fn test_too_many_positional_is_match_error() {
        let proto = proto_with_formals(&["a"], vec![Value::nil()]);
        let (env, ev) = fresh_env();
        let err = match_arguments(
            &proto,
            vec![Value::integer(1), Value::integer(2)],
            vec![],
            &env,
            &ev,
        )
        .unwrap_err();
        assert!(matches!(err, RiposteError::Match(_)));
    }

    #[test]
    fn test_excess_arguments_fill_dots_in_call_order() {
        let proto = proto_with_formals(&["a", "..."], vec![Value::nil(), Value::nil()]);
        let (env, ev) = fresh_env();
        // f(x=1, 2, y=3): a gets 2 (first unnamed), dots get x=1, y=3
        match_arguments(
            &proto,
            vec![Value::integer(1), Value::integer(2), Value::integer(3)],
            vec![intern("x"), strings().empty, intern("y")],
            &env,
            &ev,
        )
        .unwrap();
        assert_eq!(env.get(intern("a")), Value::integer(2));
        let dots = env.get(strings().dots);
        let items = dots.list_ref().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Value::integer(1));
        assert_eq!(items[1], Value::integer(3));
        assert_eq!(env.dots().as_slice(), &[intern("x"), intern("y")]);
    }

    #[test]
    fn test_unmatched_formal_without_default_gets_missing_promise() {
        let proto = proto_with_formals(&["a"], vec![Value::nil()]);
        let (env, ev) = fresh_env();
        match_arguments(&proto, vec![], vec![], &env, &ev).unwrap();
        let bound = env.get(intern("a"));
        assert!(bound.is_promise());
    }
}
