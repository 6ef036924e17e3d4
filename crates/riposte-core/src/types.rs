use std::fmt;

/// The 4-bit type tag stored in a Value's header word.
///
/// Ordering matters for the numeric tower: `Logical < Integer < Double <
/// Character < List` is the promotion order used by concatenation and the
/// arithmetic kernels.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Nil = 0,
    Null = 1,
    Logical = 2,
    Integer = 3,
    Double = 4,
    Character = 5,
    Raw = 6,
    List = 7,
    Symbol = 8,
    Function = 9,
    Promise = 10,
    Environment = 11,
    Object = 12,
    Code = 13,
    HeapObject = 14,
}

impl Type {
    pub fn from_u8(byte: u8) -> Option<Type> {
        if byte <= Type::HeapObject as u8 {
            // SAFETY: Type is #[repr(u8)] with dense, contiguous variants 0..=HeapObject.
            Some(unsafe { std::mem::transmute::<u8, Type>(byte) })
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Nil => "nil",
            Type::Null => "NULL",
            Type::Logical => "logical",
            Type::Integer => "integer",
            Type::Double => "double",
            Type::Character => "character",
            Type::Raw => "raw",
            Type::List => "list",
            Type::Symbol => "symbol",
            Type::Function => "closure",
            Type::Promise => "promise",
            Type::Environment => "environment",
            Type::Object => "object",
            Type::Code => "bytecode",
            Type::HeapObject => "builtin",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
