mod common;

use common::*;
use riposte::{ExitReason, Interpreter, Value};

#[test]
fn test_recorded_trace_replays_to_architectural_state() {
    let mut interp = Interpreter::new();
    interp
        .eval_expr(&assign(
            "x",
            call(vec![sym("c"), dbl(1.0), dbl(2.0), dbl(3.0), dbl(4.0)]),
        ))
        .unwrap();

    interp.begin_trace();
    interp
        .eval_expr(&assign(
            "y",
            binop("+", binop("*", sym("x"), dbl(2.0)), dbl(1.0)),
        ))
        .unwrap();
    let outputs = {
        let trace = interp.end_trace();
        assert!(!trace.nodes.is_empty());
        trace.output_values().unwrap()
    };

    let architectural = interp.eval_expr(&sym("y")).unwrap();
    assert_eq!(
        architectural.doubles_ref().unwrap(),
        &[3.0, 5.0, 7.0, 9.0]
    );
    assert_eq!(outputs.last().unwrap(), &architectural);
}

#[test]
fn test_trace_exits_on_branch() {
    let mut interp = Interpreter::new();
    interp.begin_trace();
    interp
        .eval_expr(&if_else(lgl(true), dbl(1.0), dbl(2.0)))
        .unwrap();
    assert!(!interp.trace.is_recording());
    assert_eq!(interp.trace.last_exit, Some(ExitReason::Branch));
}

#[test]
fn test_trace_exits_on_call() {
    let mut interp = Interpreter::new();
    interp
        .eval_expr(&assign("f", function(vec![], dbl(1.0))))
        .unwrap();
    interp.begin_trace();
    interp.eval_expr(&call(vec![sym("f")])).unwrap();
    assert!(!interp.trace.is_recording());
    assert_eq!(interp.trace.last_exit, Some(ExitReason::Call));
}

#[test]
fn test_fold_recording() {
    let mut interp = Interpreter::new();
    interp
        .eval_expr(&assign(
            "x",
            call(vec![sym("c"), dbl(1.0), dbl(2.0), dbl(3.0)]),
        ))
        .unwrap();
    interp.begin_trace();
    // internal folds record IR without ending the trace
    let r = interp.eval_expr(&call(vec![sym("sum"), sym("x")])).unwrap();
    assert_eq!(r, Value::double(6.0));
    assert!(interp.trace.is_recording());
    let trace = interp.end_trace();
    let replayed = trace.execute().unwrap();
    assert_eq!(replayed.last().unwrap(), &Value::double(6.0));
}
