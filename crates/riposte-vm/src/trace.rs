//! Recording tracer: while active, vector opcodes execute normally and
//! append straight-line IR to a bounded per-trace buffer. Recording exits
//! when a branch is taken, a call leaves visible code, a budget is
//! exhausted, or an unsupported op shows up. Because execution stays
//! eager, trace exit leaves the architectural state untouched; the
//! recorded IR can be re-executed over its captured inputs and compared
//! against the architectural results.

use lasso::Spur;
use riposte_core::{RiposteError, Value};

use crate::kernels::{self, ArithOp, CompareOp, MathOp};

pub const TRACE_MAX_NODES: usize = 128;
pub const TRACE_MAX_OUTPUTS: usize = 128;
pub const TRACE_MAX_RECORDED: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Disabled,
    /// Re-execute the recorded IR directly (the validation backend).
    Interpret,
    /// Reserved for a compiling backend; treated as Interpret here.
    Compile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Branch,
    Call,
    Budget,
    Unsupported,
    Done,
}

#[derive(Debug, Clone, Copy)]
pub enum UnaryKind {
    Neg,
    Math(MathOp),
    Not,
}

#[derive(Debug, Clone, Copy)]
pub enum FoldKind {
    Sum,
    Prod,
}

/// One node of straight-line trace IR. Operand fields are indices of
/// earlier nodes.
#[derive(Debug, Clone)]
pub enum IRNode {
    /// A vector captured from the architectural state.
    LoadV(Value),
    /// A constant loaded by kget.
    LoadC(Value),
    Binary { op: ArithOp, a: usize, b: usize },
    Compare { op: CompareOp, a: usize, b: usize },
    Unary { op: UnaryKind, a: usize },
    Ternary { a: usize, b: usize, c: usize },
    Fold { op: FoldKind, a: usize },
    /// A store of node `a` into a variable; marks a trace output.
    Store { name: Spur, a: usize },
}

#[derive(Debug, Default)]
pub struct Trace {
    pub nodes: Vec<IRNode>,
    pub outputs: Vec<usize>,
    pub n_recorded: usize,
    /// Which node computed which architectural value (shallow identity),
    /// so later ops chain to earlier nodes instead of re-loading
    /// intermediates.
    produced: Vec<(Value, usize)>,
}

impl Trace {
    fn reset(&mut self) {
        self.nodes.clear();
        self.outputs.clear();
        self.produced.clear();
        self.n_recorded = 0;
    }

    fn reserve(&mut self, nodes: usize) -> bool {
        self.nodes.len() + nodes < TRACE_MAX_NODES && self.outputs.len() < TRACE_MAX_OUTPUTS
    }

    fn producer_of(&self, v: &Value) -> Option<usize> {
        self.produced
            .iter()
            .rev()
            .find(|(value, _)| value == v)
            .map(|(_, i)| *i)
    }

    fn note_produced(&mut self, v: &Value) {
        let idx = self.nodes.len() - 1;
        self.produced.push((v.clone(), idx));
    }

    /// Chain to the node that computed this value, or to an existing load
    /// of it, or append a fresh vector load.
    fn load(&mut self, v: &Value) -> usize {
        if let Some(i) = self.producer_of(v) {
            return i;
        }
        for (i, n) in self.nodes.iter().enumerate() {
            match n {
                IRNode::LoadV(existing) | IRNode::LoadC(existing) if existing == v => return i,
                _ => {}
            }
        }
        self.nodes.push(IRNode::LoadV(v.clone()));
        self.nodes.len() - 1
    }

    /// Re-execute the recorded IR. Returns one value per node; the Store
    /// outputs are the architectural results a compiled trace would have
    /// to reproduce.
    pub fn execute(&self) -> Result<Vec<Value>, RiposteError> {
        let mut vals: Vec<Value> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let v = match node {
                IRNode::LoadV(v) | IRNode::LoadC(v) => v.clone(),
                IRNode::Binary { op, a, b } => kernels::binary_arith(*op, &vals[*a], &vals[*b])?,
                IRNode::Compare { op, a, b } => {
                    kernels::binary_compare(*op, &vals[*a], &vals[*b])?
                }
                IRNode::Unary { op, a } => match op {
                    UnaryKind::Neg => kernels::unary_arith(true, &vals[*a])?,
                    UnaryKind::Math(m) => kernels::unary_math(*m, &vals[*a])?,
                    UnaryKind::Not => kernels::unary_logical_not(&vals[*a])?,
                },
                IRNode::Ternary { a, b, c } => ternary_select(&vals[*a], &vals[*b], &vals[*c])?,
                IRNode::Fold { op, a } => fold(*op, &vals[*a])?,
                IRNode::Store { a, .. } => vals[*a].clone(),
            };
            vals.push(v);
        }
        Ok(vals)
    }

    /// The values of the Store outputs after `execute`.
    pub fn output_values(&self) -> Result<Vec<Value>, RiposteError> {
        let vals = self.execute()?;
        Ok(self.outputs.iter().map(|i| vals[*i].clone()).collect())
    }
}

fn ternary_select(test: &Value, yes: &Value, no: &Value) -> Result<Value, RiposteError> {
    let (test, yes, no) = (test.stripped(), yes.stripped(), no.stripped());
    let t = kernels::logical_view(&test)?;
    let y = kernels::double_view(&yes)?;
    let n = kernels::double_view(&no)?;
    Ok(Value::doubles(kernels::zip3(
        t.as_slice(),
        y.as_slice(),
        n.as_slice(),
        |t, y, n| match t {
            0 => n,
            riposte_core::NA_LOGICAL => riposte_core::na_real(),
            _ => y,
        },
    )))
}

fn fold(kind: FoldKind, a: &Value) -> Result<Value, RiposteError> {
    let a = a.stripped();
    let v = kernels::double_view(&a)?;
    let (base, f): (f64, fn(f64, f64) -> f64) = match kind {
        FoldKind::Sum => (0.0, |acc, x| acc + x),
        FoldKind::Prod => (1.0, |acc, x| acc * x),
    };
    let r = kernels::fold_left(v.as_slice(), base, |acc, x| {
        if riposte_core::is_na_real(acc) || riposte_core::is_na_real(x) {
            riposte_core::na_real()
        } else {
            f(acc, x)
        }
    });
    Ok(Value::double(r))
}

/// All recorder state carried by the interpreter.
#[derive(Debug)]
pub struct TraceState {
    pub mode: Mode,
    active: bool,
    pub trace: Trace,
    pub last_exit: Option<ExitReason>,
}

impl TraceState {
    pub fn new() -> TraceState {
        TraceState {
            mode: Mode::Disabled,
            active: false,
            trace: Trace::default(),
            last_exit: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.mode != Mode::Disabled
    }

    pub fn is_recording(&self) -> bool {
        self.active
    }

    pub fn begin(&mut self) {
        self.trace.reset();
        self.active = true;
        self.last_exit = None;
    }

    pub fn exit(&mut self, reason: ExitReason) {
        if self.active {
            self.active = false;
            self.last_exit = Some(reason);
        }
    }

    fn bump_recorded(&mut self) -> bool {
        self.trace.n_recorded += 1;
        if self.trace.n_recorded > TRACE_MAX_RECORDED {
            self.exit(ExitReason::Budget);
            false
        } else {
            true
        }
    }

    pub fn record_const(&mut self, v: &Value) {
        if !self.active || !self.bump_recorded() {
            return;
        }
        if !self.trace.reserve(1) {
            self.exit(ExitReason::Budget);
            return;
        }
        self.trace.nodes.push(IRNode::LoadC(v.clone()));
        self.trace.note_produced(v);
    }

    pub fn record_load(&mut self, v: &Value) {
        if !self.active || !self.bump_recorded() {
            return;
        }
        if !self.trace.reserve(1) {
            self.exit(ExitReason::Budget);
            return;
        }
        self.trace.load(v);
    }

    pub fn record_binary(&mut self, op: ArithOp, a: &Value, b: &Value, r: &Value) {
        if !self.active || !self.bump_recorded() {
            return;
        }
        if !self.trace.reserve(3) {
            self.exit(ExitReason::Budget);
            return;
        }
        let ia = self.trace.load(a);
        let ib = self.trace.load(b);
        self.trace.nodes.push(IRNode::Binary { op, a: ia, b: ib });
        self.trace.note_produced(r);
    }

    pub fn record_compare(&mut self, op: CompareOp, a: &Value, b: &Value, r: &Value) {
        if !self.active || !self.bump_recorded() {
            return;
        }
        if !self.trace.reserve(3) {
            self.exit(ExitReason::Budget);
            return;
        }
        let ia = self.trace.load(a);
        let ib = self.trace.load(b);
        self.trace.nodes.push(IRNode::Compare { op, a: ia, b: ib });
        self.trace.note_produced(r);
    }

    pub fn record_unary(&mut self, op: UnaryKind, a: &Value, r: &Value) {
        if !self.active || !self.bump_recorded() {
            return;
        }
        if !self.trace.reserve(2) {
            self.exit(ExitReason::Budget);
            return;
        }
        let ia = self.trace.load(a);
        self.trace.nodes.push(IRNode::Unary { op, a: ia });
        self.trace.note_produced(r);
    }

    pub fn record_ternary(&mut self, a: &Value, b: &Value, c: &Value, r: &Value) {
        if !self.active || !self.bump_recorded() {
            return;
        }
        if !self.trace.reserve(4) {
            self.exit(ExitReason::Budget);
            return;
        }
        let ia = self.trace.load(a);
        let ib = self.trace.load(b);
        let ic = self.trace.load(c);
        self.trace.nodes.push(IRNode::Ternary {
            a: ia,
            b: ib,
            c: ic,
        });
        self.trace.note_produced(r);
    }

    pub fn record_fold(&mut self, op: FoldKind, a: &Value, r: &Value) {
        if !self.active || !self.bump_recorded() {
            return;
        }
        if !self.trace.reserve(2) {
            self.exit(ExitReason::Budget);
            return;
        }
        let ia = self.trace.load(a);
        self.trace.nodes.push(IRNode::Fold { op, a: ia });
        self.trace.note_produced(r);
    }

    /// A store into a variable marks a trace output. Values computed
    /// outside the recorded region are not linked.
    pub fn record_store(&mut self, name: Spur, v: &Value) {
        if !self.active || !self.bump_recorded() {
            return;
        }
        let Some(a) = self.trace.producer_of(v) else {
            return;
        };
        if !self.trace.reserve(1) {
            self.exit(ExitReason::Budget);
            return;
        }
        self.trace.nodes.push(IRNode::Store { name, a });
        let idx = self.trace.nodes.len() - 1;
        self.trace.outputs.push(idx);
    }
}

impl Default for TraceState {
    fn default() -> Self {
        Self::new()
    }
}
