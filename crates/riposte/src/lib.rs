//! The Riposte execution core: a 16-byte tagged value representation, a
//! bytecode compiler with inline-cached primitive calls, a
//! threaded-dispatch virtual machine, revision-stamped environments,
//! promise-based lazy argument passing, and broadcast vector kernels.
//!
//! The surface parser is an external collaborator: it delivers parsed
//! expression trees as [`Value`]s (symbols, call records, expression
//! sequences, and literals), which [`Interpreter::eval_expr`] compiles
//! and runs.

pub use riposte_core::{
    create_call, create_expression, intern, is_na_real, na_real, resolve, strings, Environment,
    Instruction, Op, Pointer, Prototype, RiposteError, Spur, Type, Value, NA_INTEGER, NA_LOGICAL,
};
pub use riposte_vm::{
    compile, Arguments, Dispatch, ExitReason, InternalFnPtr, InternalFunction, Interpreter,
    TraceMode,
};
