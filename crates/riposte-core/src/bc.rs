use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lasso::Spur;

use crate::value::Value;

/// Bytecode opcodes for the execution core.
///
/// Stack-based: operands are pushed/popped from the value stack. Each
/// instruction carries three integer operands whose meaning is
/// per-opcode (interned ids, constant-pool indices, jump deltas).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// a: constant index → push constants[a]
    Kget,
    /// a: interned id → push current-env lookup, forcing promises
    Get,
    /// a: interned id → like Get, against the base environment
    Iget,
    /// discard TOS
    Pop,
    /// a: interned id → pop value, bind it, push the assigned value
    Assign,
    /// a: interned id → peek attr, rebind with new class
    ClassAssign,
    /// a: interned id → peek attr, rebind with new names
    NamesAssign,
    /// a: interned id → peek attr, rebind with new dim
    DimAssign,
    /// a: interned id → pop index, pop value, subscript-assign, rebind
    IAssign,
    /// a: exit offset. Pop name, lower, upper; set up the loop state.
    ForBegin,
    /// a: back-branch offset. Advance the loop or clean up.
    ForEnd,
    /// a: exit offset. Pop condition; push the loop result slot.
    WhileBegin,
    /// a: back-branch offset. Pop condition and body result.
    WhileEnd,
    /// push the loop result slot
    RepeatBegin,
    /// a: back-branch offset. Pop body result, branch back.
    RepeatEnd,
    /// a: offset. Pop a logical; jump when false.
    If1,
    /// a: offset. Unconditional relative branch.
    Jmp,
    // binary arithmetic (a: arity, for reflection)
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    // unary arithmetic
    Pos,
    Neg,
    // logical
    LNeg,
    LAnd,
    LOr,
    // comparison
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    // unary math
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
    /// a: constant index of a prototype → push an expression promise over
    /// the current environment
    Delay,
    /// a: interned id → push a symbol promise over the current environment
    SymDelay,
    /// a: argc, b: constant index of the call record → pop callee, take
    /// the top argc values, run the call protocol
    Call,
    /// like Call, but expand `...` markers from the current env's dots
    DCall,
    /// a: guard constant, b: slow-path prototype constant, c: skip offset.
    /// Pop the callee; identical to the guard constant means fall through
    /// to the specialized code, otherwise run the slow path and skip it.
    Fguard,
    /// a: constant index of a prototype → push a closure capturing the
    /// current environment
    Function,
    /// push the NULL singleton
    Null,
    /// terminate; the result is the top of the stack
    Ret,
}

impl Op {
    /// Worst-case stack effect (pops, pushes) used to compute a
    /// prototype's register high-water mark. Variable-arity ops consult
    /// operand `a`.
    pub fn stack_effect(self, a: i64) -> (i64, i64) {
        use Op::*;
        match self {
            Kget | Get | Iget | Null | Delay | SymDelay | Function | RepeatBegin => (0, 1),
            Pop | If1 | Ret | RepeatEnd => (1, 0),
            Assign => (1, 1),
            ClassAssign | NamesAssign | DimAssign | Jmp => (0, 0),
            IAssign => (2, 1),
            ForBegin => (3, 4),
            ForEnd => (5, 1),
            WhileBegin => (1, 1),
            WhileEnd => (2, 0),
            Add | Sub | Mul | Div | IDiv | Mod | Pow | LAnd | LOr | Eq | Neq | Lt | Le | Gt
            | Ge => (2, 1),
            Pos | Neg | LNeg | Abs | Sign | Sqrt | Floor | Ceiling | Trunc | Round | Signif
            | Exp | Log | Cos | Sin | Tan | ACos | ASin | ATan => (1, 1),
            Call | DCall => (a + 1, 1),
            Fguard => (1, 0),
        }
    }
}

/// One bytecode instruction: opcode plus three integer operands.
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub op: Op,
    pub a: i64,
    pub b: i64,
    pub c: i64,
}

impl Instruction {
    pub fn new(op: Op, a: i64, b: i64, c: i64) -> Instruction {
        Instruction { op, a, b, c }
    }

    pub fn op(op: Op) -> Instruction {
        Instruction { op, a: 0, b: 0, c: 0 }
    }

    pub fn with_a(op: Op, a: i64) -> Instruction {
        Instruction { op, a, b: 0, c: 0 }
    }
}

/// An immutable compiled expression: bytecode, constants, and metadata.
///
/// Prototypes outlive the call that compiled them; promises and closures
/// share them by reference.
pub struct Prototype {
    /// The original expression, kept for reflection and deparsing.
    pub expression: Value,
    /// Formal parameter names (empty for non-function prototypes).
    pub parameters: Vec<Spur>,
    /// Per formal: Nil (no default) or a Code value holding the compiled
    /// default expression.
    pub defaults: Vec<Value>,
    /// Index of `...` among the formals, or -1.
    pub dots: i64,
    /// Value-stack high-water mark.
    pub registers: i64,
    pub constants: Vec<Value>,
    pub code: Vec<Instruction>,
    /// Rewritten threaded-dispatch stream, filled in by the interpreter on
    /// first execution. Type-erased so this crate stays independent of the
    /// dispatch handler type.
    threaded: RefCell<Option<Rc<dyn Any>>>,
}

impl Prototype {
    pub fn new(
        expression: Value,
        parameters: Vec<Spur>,
        defaults: Vec<Value>,
        dots: i64,
        registers: i64,
        constants: Vec<Value>,
        code: Vec<Instruction>,
    ) -> Prototype {
        Prototype {
            expression,
            parameters,
            defaults,
            dots,
            registers,
            constants,
            code,
            threaded: RefCell::new(None),
        }
    }

    pub fn threaded_cache(&self) -> Option<Rc<dyn Any>> {
        self.threaded.borrow().clone()
    }

    pub fn set_threaded_cache(&self, cache: Rc<dyn Any>) {
        *self.threaded.borrow_mut() = Some(cache);
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Prototype({} instructions, {} constants, {} formals)",
            self.code.len(),
            self.constants.len(),
            self.parameters.len()
        )
    }
}
