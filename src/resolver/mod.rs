//! Answering resolution requests
//!
//! The machine only describes the ledger facts it needs. A `Resolver` is the
//! caller-side component answering them, typically backed by the ledger's
//! storage. `InMemoryResolver` keeps everything in maps and is used by the
//! command line tool and the tests.

mod in_memory;

pub use in_memory::InMemoryResolver;

use crate::typed::{TypedValueError, Value};
use crate::vm::ResolutionRequest;
use thiserror::Error;

/// Source of metadata and balances for resolution requests
pub trait Resolver {
    /// Answer one request, or explain why it cannot be answered
    fn resolve(&mut self, request: &ResolutionRequest) -> Result<Value, String>;
}

impl<F> Resolver for F
where
    F: FnMut(&ResolutionRequest) -> Result<Value, String>,
{
    fn resolve(&mut self, request: &ResolutionRequest) -> Result<Value, String> {
        self(request)
    }
}

/// Errors loading resolver contents
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Input is not valid JSON
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Input holds an invalid account, asset or amount
    #[error(transparent)]
    Value(#[from] TypedValueError),

    /// Input is valid JSON with an unexpected shape
    #[error("Unexpected format: {0}")]
    Format(String),
}
