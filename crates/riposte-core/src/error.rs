/// Error kinds surfaced by the execution core.
///
/// `Compile` aborts compilation of the enclosing top-level expression;
/// `Match` is raised at call entry; `Type` and `Runtime` are raised by the
/// op that detects them. All of them unwind the interpreter's call frames
/// to the single top-level handler. `Internal` marks a broken invariant.
///
/// NA is not an error: operations on NA produce NA.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RiposteError {
    #[error("compile error: {0}")]
    Compile(String),

    #[error("match error: {0}")]
    Match(String),

    #[error("type error: expected {expected}, got {got}")]
    Type { expected: String, got: String },

    #[error("error: {0}")]
    Runtime(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RiposteError {
    pub fn compile(msg: impl Into<String>) -> Self {
        RiposteError::Compile(msg.into())
    }

    pub fn match_error(msg: impl Into<String>) -> Self {
        RiposteError::Match(msg.into())
    }

    pub fn type_error(expected: impl Into<String>, got: impl Into<String>) -> Self {
        RiposteError::Type {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        RiposteError::Runtime(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RiposteError::Internal(msg.into())
    }
}
