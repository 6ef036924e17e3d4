pub mod bc;
pub mod env;
pub mod error;
pub mod interner;
pub mod literals;
pub mod object;
pub mod types;
pub mod value;

pub use bc::{Instruction, Op, Prototype};
pub use env::{Environment, Pointer};
pub use error::RiposteError;
pub use interner::{
    compare_spurs, intern, resolve, spur_bits, spur_from_bits, strings, with_resolved, Strings,
};
pub use lasso::Spur;
pub use object::{create_call, create_expression, ObjectInner};
pub use types::Type;
pub use value::{
    is_na_character, is_na_real, na_real, FunctionInner, InternalRef, PromiseInner, PromiseKind,
    Value, NA_INTEGER, NA_LOGICAL, NA_REAL_BITS,
};
