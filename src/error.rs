//! Crate-level error type
//!
//! `Error` wraps the error of every stage so a caller driving the whole
//! pipeline can report failures in one shape: a stable code from
//! [`Error::code`] and the human-readable message from `Display`.

use crate::compiler::{CompileError, SyntaxError, TypeError};
use crate::resolver::ResolverError;
use crate::typed::TypedValueError;
use crate::vm::{BindingError, ResolutionError, RuntimeError};
use thiserror::Error;

/// Any error raised while compiling or running a script
#[derive(Debug, Error)]
pub enum Error {
    /// Compilation failed
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Variables do not match the program
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Ledger facts could not be resolved
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Execution failed
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A value could not be built or parsed
    #[error(transparent)]
    Value(#[from] TypedValueError),

    /// Resolver contents could not be loaded
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

impl From<SyntaxError> for Error {
    fn from(err: SyntaxError) -> Self {
        Error::Compile(err.into())
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Compile(err.into())
    }
}

impl Error {
    /// Stable identifier of the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::Compile(CompileError::Syntax(_)) => "SYNTAX",
            Error::Compile(CompileError::Type(_)) => "TYPE",
            Error::Compile(CompileError::ResourceLimit { .. }) => "RESOURCE_LIMIT",
            Error::Compile(CompileError::Internal(_)) => "COMPILER",
            Error::Binding(BindingError::InvalidState { .. })
            | Error::Resolution(ResolutionError::InvalidState { .. })
            | Error::Runtime(RuntimeError::InvalidState { .. }) => "INVALID_STATE",
            Error::Binding(_) => "BINDING",
            Error::Resolution(_) => "RESOLUTION",
            Error::Runtime(RuntimeError::InsufficientFunds { .. }) => "INSUFFICIENT_FUNDS",
            Error::Runtime(RuntimeError::ScriptFailure) => "SCRIPT_FAILED",
            Error::Runtime(RuntimeError::InvalidAllotment(_)) => "INVALID_ALLOTMENT",
            Error::Runtime(_) => "RUNTIME",
            Error::Value(_) => "INVALID_VALUE",
            Error::Resolver(_) => "RESOLVER",
        }
    }
}

/// Result type using the crate-level error
pub type Result<T, E = Error> = std::result::Result<T, E>;
