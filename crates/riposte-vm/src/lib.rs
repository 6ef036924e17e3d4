pub mod builtins;
pub mod call;
pub mod compiler;
pub mod emit;
pub mod interp;
pub mod kernels;
pub mod trace;

pub use compiler::compile;
pub use emit::Emitter;
pub use interp::{Arguments, Dispatch, InternalFnPtr, InternalFunction, Interpreter};
pub use trace::{ExitReason, Mode as TraceMode, Trace, TraceState};
