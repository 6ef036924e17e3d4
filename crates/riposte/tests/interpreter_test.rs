mod common;

use common::*;
use riposte::{intern, strings, Dispatch, Interpreter, RiposteError, Value};

fn eval(interp: &mut Interpreter, expr: &Value) -> Value {
    interp
        .eval_expr(expr)
        .unwrap_or_else(|e| panic!("eval failed: {e} for {expr}"))
}

// === End-to-end scenarios ===

#[test]
fn test_integer_addition() {
    let mut interp = Interpreter::new();
    assert_eq!(
        eval(&mut interp, &binop("+", int(1), int(2))),
        Value::integer(3)
    );
}

#[test]
fn test_concat_and_sum() {
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("x", call(vec![sym("c"), dbl(1.0), dbl(2.0), dbl(3.0)])),
        call(vec![sym("sum"), sym("x")]),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(6.0));
}

#[test]
fn test_default_argument_is_lazy() {
    // f <- function(a, b=2) a+b; f(3) → 5
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign(
            "f",
            function(
                vec![("a", None), ("b", Some(dbl(2.0)))],
                binop("+", sym("a"), sym("b")),
            ),
        ),
        call(vec![sym("f"), dbl(3.0)]),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(5.0));
}

#[test]
fn test_dots_collects_names_in_call_order() {
    // g <- function(...) list(...); g(x=1, 2, y=3)
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign(
            "g",
            function(vec![("...", None)], call(vec![sym("list"), sym("...")])),
        ),
        call_named(
            vec![sym("g"), dbl(1.0), dbl(2.0), dbl(3.0)],
            vec!["x", "", "y"],
        ),
    ]);
    let result = eval(&mut interp, &program);
    let obj = result.as_object().expect("named list is an object");
    let items = obj.base().list_ref().expect("list base");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0], Value::double(1.0));
    assert_eq!(items[1], Value::double(2.0));
    assert_eq!(items[2], Value::double(3.0));
    let names = obj.names().expect("names attribute");
    assert_eq!(
        names.characters_ref().unwrap(),
        &[intern("x"), strings().empty, intern("y")]
    );
}

#[test]
fn test_for_loop_accumulates() {
    // for (i in 1:4) s <- if (i==1) i else s+i; s → 10
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        for_(
            "i",
            int(1),
            int(4),
            assign(
                "s",
                if_else(
                    binop("==", sym("i"), int(1)),
                    sym("i"),
                    binop("+", sym("s"), sym("i")),
                ),
            ),
        ),
        sym("s"),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::integer(10));
}

#[test]
fn test_unreferenced_argument_is_never_evaluated() {
    // h <- function(x) 42; h(stop("boom")) returns without error
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("h", function(vec![("x", None)], dbl(42.0))),
        call(vec![sym("h"), call(vec![sym("stop"), chr("boom")])]),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(42.0));
}

#[test]
fn test_referenced_argument_surfaces_the_error() {
    // h <- function(x) x; h(stop("boom")) raises on first use of x
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("h", function(vec![("x", None)], sym("x"))),
        call(vec![sym("h"), call(vec![sym("stop"), chr("boom")])]),
    ]);
    match interp.eval_expr(&program) {
        Err(RiposteError::Runtime(msg)) => assert_eq!(msg, "boom"),
        other => panic!("expected the delayed error, got {other:?}"),
    }
}

// === Control flow ===

#[test]
fn test_if_without_else_is_null() {
    let mut interp = Interpreter::new();
    assert!(eval(&mut interp, &if_(lgl(false), dbl(1.0))).is_null());
    assert_eq!(eval(&mut interp, &if_(lgl(true), dbl(1.0))), Value::double(1.0));
}

#[test]
fn test_na_condition_is_an_error() {
    let mut interp = Interpreter::new();
    let na = Value::logical_elem(riposte::NA_LOGICAL);
    assert!(interp.eval_expr(&if_(na, dbl(1.0))).is_err());
}

#[test]
fn test_while_loop() {
    // n <- 0; while (n < 5) n <- n + 1; n
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("n", int(0)),
        while_(
            binop("<", sym("n"), int(5)),
            assign("n", binop("+", sym("n"), int(1))),
        ),
        sym("n"),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::integer(5));
}

#[test]
fn test_repeat_with_break() {
    // n <- 0; repeat { n <- n + 1; if (n >= 3) break }; n
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("n", int(0)),
        repeat_(block(vec![
            assign("n", binop("+", sym("n"), int(1))),
            if_(
                binop(">=", sym("n"), int(3)),
                call(vec![sym("break")]),
            ),
        ])),
        sym("n"),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::integer(3));
}

#[test]
fn test_for_loop_with_break_and_next() {
    // s <- 0; for (i in 1:10) { if (i == 3) next; if (i == 6) break; s <- s + i }; s
    // sums 1+2+4+5 = 12
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("s", int(0)),
        for_(
            "i",
            int(1),
            int(10),
            block(vec![
                if_(binop("==", sym("i"), int(3)), call(vec![sym("next")])),
                if_(binop("==", sym("i"), int(6)), call(vec![sym("break")])),
                assign("s", binop("+", sym("s"), sym("i"))),
            ]),
        ),
        sym("s"),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::integer(12));
}

#[test]
fn test_empty_for_range_skips_body() {
    // for (i in 2:1) s <- 99; the loop only steps forward
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("s", int(0)),
        for_("i", int(2), int(1), assign("s", int(99))),
        sym("s"),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::integer(0));
}

#[test]
fn test_loop_value_is_null() {
    let mut interp = Interpreter::new();
    let program = for_("i", int(1), int(3), sym("i"));
    assert!(eval(&mut interp, &program).is_null());
}

// === Functions, closures, laziness ===

#[test]
fn test_closure_captures_lexical_environment() {
    // a <- 10; f <- function(x) x + a; f(1) → 11
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("a", dbl(10.0)),
        assign(
            "f",
            function(vec![("x", None)], binop("+", sym("x"), sym("a"))),
        ),
        call(vec![sym("f"), dbl(1.0)]),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(11.0));
}

#[test]
fn test_promise_forced_once() {
    // side <- function() { warning("forced"); 5 }
    // f <- function(x) x + x; f(side()) forces the promise exactly once
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign(
            "side",
            function(
                vec![],
                block(vec![call(vec![sym("warning"), chr("forced")]), dbl(5.0)]),
            ),
        ),
        assign(
            "f",
            function(vec![("x", None)], binop("+", sym("x"), sym("x"))),
        ),
        call(vec![sym("f"), call(vec![sym("side")])]),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(10.0));
    assert_eq!(interp.take_warnings().len(), 1);
}

#[test]
fn test_missing_argument_without_default_errors_on_use() {
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("f", function(vec![("a", None)], sym("a"))),
        call(vec![sym("f")]),
    ]);
    let err = interp.eval_expr(&program).unwrap_err();
    match err {
        RiposteError::Runtime(msg) => assert!(msg.contains("missing")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_named_arguments_match_exactly() {
    // f <- function(a, b) a - b; f(b=1, a=10) → 9
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign(
            "f",
            function(
                vec![("a", None), ("b", None)],
                binop("-", sym("a"), sym("b")),
            ),
        ),
        call_named(vec![sym("f"), dbl(1.0), dbl(10.0)], vec!["b", "a"]),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(9.0));
}

#[test]
fn test_unknown_keyword_is_match_error() {
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("f", function(vec![("a", None)], sym("a"))),
        call_named(vec![sym("f"), dbl(1.0)], vec!["zz"]),
    ]);
    assert!(matches!(
        interp.eval_expr(&program),
        Err(RiposteError::Match(_))
    ));
}

#[test]
fn test_dots_forward_through_nested_calls() {
    // inner <- function(a, b) a / b
    // outer <- function(...) inner(...)
    // outer(10, 2) → 5
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign(
            "inner",
            function(
                vec![("a", None), ("b", None)],
                binop("/", sym("a"), sym("b")),
            ),
        ),
        assign(
            "outer",
            function(vec![("...", None)], call(vec![sym("inner"), sym("...")])),
        ),
        call(vec![sym("outer"), dbl(10.0), dbl(2.0)]),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(5.0));
}

#[test]
fn test_recursive_closure() {
    // fact <- function(n) if (n == 0) 1 else n * fact(n - 1); fact(5)
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign(
            "fact",
            function(
                vec![("n", None)],
                if_else(
                    binop("==", sym("n"), dbl(0.0)),
                    dbl(1.0),
                    binop(
                        "*",
                        sym("n"),
                        call(vec![sym("fact"), binop("-", sym("n"), dbl(1.0))]),
                    ),
                ),
            ),
        ),
        call(vec![sym("fact"), dbl(5.0)]),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(120.0));
}

#[test]
fn test_eval_function_entry_point() {
    let mut interp = Interpreter::new();
    eval(&mut interp, &assign("f", function(vec![], dbl(7.0))));
    let f = eval(&mut interp, &sym("f"));
    assert!(f.is_function());
    assert_eq!(interp.eval_function(&f).unwrap(), Value::double(7.0));
}

// === Inline caches ===

#[test]
fn test_primitive_redefinition_trips_the_guard() {
    // "+" <- function(a, b) 99; 1 + 2 → 99
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        call(vec![
            sym("<-"),
            sym("+"),
            function(vec![("a", None), ("b", None)], dbl(99.0)),
        ]),
        binop("+", dbl(1.0), dbl(2.0)),
    ]);
    assert_eq!(eval(&mut interp, &program), Value::double(99.0));
}

#[test]
fn test_guard_path_matches_generic_call() {
    // (`+`)(1, 2) goes through the generic call protocol; 1 + 2 goes
    // through the specialized path. Both must agree.
    let mut interp = Interpreter::new();
    let inline = eval(&mut interp, &binop("+", dbl(1.0), dbl(2.0)));
    let generic = eval(
        &mut interp,
        &call(vec![call(vec![sym("("), sym("+")]), dbl(1.0), dbl(2.0)]),
    );
    assert_eq!(inline, generic);
    assert_eq!(inline, Value::double(3.0));
}

// === Assignment forms ===

#[test]
fn test_assignment_value_round_trip() {
    // {x <- e; x} ≡ e
    let mut interp = Interpreter::new();
    let e = dbl(2.5);
    let program = block(vec![assign("x", e.clone()), sym("x")]);
    assert_eq!(eval(&mut interp, &program), e);
}

#[test]
fn test_names_assignment() {
    // x <- c(1, 2); names(x) <- c("a", "b"); names(x)
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("x", call(vec![sym("c"), dbl(1.0), dbl(2.0)])),
        call(vec![
            sym("<-"),
            call(vec![sym("names"), sym("x")]),
            call(vec![sym("c"), chr("a"), chr("b")]),
        ]),
        call(vec![sym("names"), sym("x")]),
    ]);
    let names = eval(&mut interp, &program);
    assert_eq!(names.characters_ref().unwrap(), &[intern("a"), intern("b")]);
}

#[test]
fn test_set_names_and_strip() {
    // names(setNames(v, n)) == n; setNames(v, NULL) strips
    let mut interp = Interpreter::new();
    let named = exprs(vec![
        assign("v", call(vec![sym("c"), dbl(1.0), dbl(2.0)])),
        call(vec![
            sym("names"),
            call(vec![
                sym("setNames"),
                sym("v"),
                call(vec![sym("c"), chr("p"), chr("q")]),
            ]),
        ]),
    ]);
    let names = eval(&mut interp, &named);
    assert_eq!(names.characters_ref().unwrap(), &[intern("p"), intern("q")]);

    let stripped = call(vec![
        sym("names"),
        call(vec![sym("setNames"), sym("v"), Value::null()]),
    ]);
    assert!(eval(&mut interp, &stripped).is_null());
}

#[test]
fn test_indexed_assignment() {
    // x <- c(1, 2, 3); x[2] <- 9; x
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("x", call(vec![sym("c"), dbl(1.0), dbl(2.0), dbl(3.0)])),
        call(vec![
            sym("<-"),
            call(vec![sym("["), sym("x"), int(2)]),
            dbl(9.0),
        ]),
        sym("x"),
    ]);
    let x = eval(&mut interp, &program);
    assert_eq!(x.doubles_ref().unwrap(), &[1.0, 9.0, 3.0]);
}

#[test]
fn test_subscript_read() {
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("x", call(vec![sym("c"), dbl(10.0), dbl(20.0), dbl(30.0)])),
        call(vec![sym("["), sym("x"), colon(int(2), int(3))]),
    ]);
    let x = eval(&mut interp, &program);
    assert_eq!(x.doubles_ref().unwrap(), &[20.0, 30.0]);
}

// === Kernels through the bytecode path ===

#[test]
fn test_vector_arithmetic_broadcasts() {
    // c(1,2,3,4) * 2 + c(10, 20)
    let mut interp = Interpreter::new();
    let program = binop(
        "+",
        binop(
            "*",
            call(vec![sym("c"), dbl(1.0), dbl(2.0), dbl(3.0), dbl(4.0)]),
            dbl(2.0),
        ),
        call(vec![sym("c"), dbl(10.0), dbl(20.0)]),
    );
    let r = eval(&mut interp, &program);
    assert_eq!(r.doubles_ref().unwrap(), &[12.0, 24.0, 16.0, 28.0]);
}

#[test]
fn test_add_zero_identity() {
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("x", call(vec![sym("c"), dbl(1.5), dbl(-2.0), dbl(0.0)])),
        binop("==", binop("+", sym("x"), dbl(0.0)), sym("x")),
    ]);
    let r = eval(&mut interp, &program);
    assert_eq!(r.logicals_ref().unwrap(), &[1, 1, 1]);
}

#[test]
fn test_unary_math_through_bytecode() {
    let mut interp = Interpreter::new();
    assert_eq!(
        eval(&mut interp, &unop("sqrt", dbl(9.0))),
        Value::double(3.0)
    );
    assert_eq!(
        eval(&mut interp, &unop("floor", dbl(2.7))),
        Value::double(2.0)
    );
    assert_eq!(eval(&mut interp, &unop("-", dbl(2.5))), Value::double(-2.5));
    assert_eq!(eval(&mut interp, &unop("!", lgl(false))), Value::logical(true));
}

#[test]
fn test_cumsum_and_prod() {
    let mut interp = Interpreter::new();
    let cumsum = eval(
        &mut interp,
        &call(vec![sym("cumsum"), colon(int(1), int(4))]),
    );
    assert_eq!(cumsum.integers_ref().unwrap(), &[1, 3, 6, 10]);
    let prod = eval(&mut interp, &call(vec![sym("prod"), colon(int(1), int(5))]));
    assert_eq!(prod.as_double(), Some(120.0));
}

#[test]
fn test_ifelse_broadcasts() {
    let mut interp = Interpreter::new();
    let program = call(vec![
        sym("ifelse"),
        binop("<", colon(int(1), int(4)), int(3)),
        int(1),
        int(0),
    ]);
    let r = eval(&mut interp, &program);
    assert_eq!(r.integers_ref().unwrap(), &[1, 1, 0, 0]);
}

// === Dispatch equivalence ===

#[test]
fn test_threaded_and_switch_dispatch_agree() {
    let programs = vec![
        binop("+", int(1), int(2)),
        exprs(vec![
            assign("x", call(vec![sym("c"), dbl(1.0), dbl(2.0), dbl(3.0)])),
            call(vec![sym("sum"), sym("x")]),
        ]),
        exprs(vec![
            for_(
                "i",
                int(1),
                int(4),
                assign(
                    "s",
                    if_else(
                        binop("==", sym("i"), int(1)),
                        sym("i"),
                        binop("+", sym("s"), sym("i")),
                    ),
                ),
            ),
            sym("s"),
        ]),
        exprs(vec![
            assign(
                "f",
                function(
                    vec![("a", None), ("b", Some(dbl(2.0)))],
                    binop("+", sym("a"), sym("b")),
                ),
            ),
            call(vec![sym("f"), dbl(3.0)]),
        ]),
    ];
    for program in programs {
        let mut threaded = Interpreter::new();
        threaded.set_dispatch(Dispatch::Threaded);
        let mut switched = Interpreter::new();
        switched.set_dispatch(Dispatch::Switch);
        assert_eq!(
            threaded.eval_expr(&program).unwrap(),
            switched.eval_expr(&program).unwrap(),
            "dispatch modes disagree on {program}"
        );
    }
}

// === Error handling ===

#[test]
fn test_interpreter_survives_errors() {
    let mut interp = Interpreter::new();
    assert!(interp.eval_expr(&call(vec![sym("stop"), chr("first")])).is_err());
    assert_eq!(
        eval(&mut interp, &binop("+", int(1), int(1))),
        Value::integer(2)
    );
}

#[test]
fn test_calling_a_non_function_is_a_type_error() {
    let mut interp = Interpreter::new();
    let program = exprs(vec![
        assign("x", dbl(1.0)),
        call(vec![sym("x"), dbl(2.0)]),
    ]);
    assert!(matches!(
        interp.eval_expr(&program),
        Err(RiposteError::Type { .. })
    ));
}

#[test]
fn test_warnings_buffer_until_drained() {
    let mut interp = Interpreter::new();
    eval(&mut interp, &call(vec![sym("warning"), chr("one")]));
    eval(&mut interp, &call(vec![sym("warning"), chr("two")]));
    assert_eq!(interp.take_warnings(), vec!["one", "two"]);
    assert!(interp.take_warnings().is_empty());
}
