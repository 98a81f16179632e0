//! Error taxonomy.
//!
//! Structural errors ([`WorkbenchError`]) surface synchronously to the
//! caller of the failing operation and leave prior state untouched.
//! Evaluation errors ([`EvalError`]) never escape the propagation loop: a
//! constraint whose expression fails simply contributes no update that tick.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkbenchError {
    #[error("id already exists: `{0}`")]
    AlreadyExists(String),

    #[error("edge endpoint does not name an existing node: `{0}`")]
    InvalidReference(String),

    #[error("no entity for `{0}`")]
    NotFound(String),

    #[error("attribute path must look like `entity.attr`, got `{0}`")]
    InvalidPath(String),

    #[error("no snapshot recorded at version {0}")]
    NoSnapshot(u64),
}

pub type Result<T> = std::result::Result<T, WorkbenchError>;

/// Why an expression produced no result. Recovered locally by the scheduler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("no value at `{0}`")]
    MissingValue(String),

    #[error("`{func}` called with {got} argument(s)")]
    Arity { func: &'static str, got: usize },

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivideByZero,

    #[error("domain error in `{0}`")]
    Domain(&'static str),
}
