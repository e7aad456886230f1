//! Error types for machine operations
//!
//! Each phase of a machine's life has its own error type:
//!
//! - `BindingError`: caller variables do not match the program
//! - `ResolutionError`: the resolver failed or answered with bad data
//! - `RuntimeError`: execution of the instructions failed

use super::machine::{ExitCode, MachineState};
use super::resolution::RequestId;
use crate::typed::{Account, Asset, TypedValueError, ValueType};
use num_bigint::BigInt;
use thiserror::Error;

/// Errors raised while binding caller variables
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindingError {
    /// A declared variable has no binding
    #[error("Missing variable: ${0}")]
    MissingVariable(String),

    /// A binding does not correspond to any declared variable
    #[error("Unknown variable: ${0}")]
    UnknownVariable(String),

    /// A binding holds a value of the wrong type
    #[error("Variable ${name} expects type {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        found: ValueType,
    },

    /// A JSON binding could not be turned into a value
    #[error("Invalid value for variable ${name}: {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: TypedValueError,
    },

    /// Variables were bound at the wrong point of the machine's life
    #[error("Cannot bind variables in state {found}, expected {expected}")]
    InvalidState {
        expected: MachineState,
        found: MachineState,
    },
}

/// Errors raised while resolving resources and balances
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolutionError {
    /// The resolver reported a failure for a request
    #[error("Request {id} for @{account} was rejected: {reason}")]
    Rejected {
        id: RequestId,
        account: Account,
        reason: String,
    },

    /// The caller abandoned the resolution
    #[error("Resolution was cancelled")]
    Cancelled,

    /// A response does not match any outstanding request
    #[error("No outstanding request with id {0}")]
    UnknownRequest(RequestId),

    /// A response has the wrong type
    #[error("Request {id} expects a value of type {expected}, got {found}")]
    UnexpectedType {
        id: RequestId,
        expected: ValueType,
        found: ValueType,
    },

    /// A JSON response could not be turned into a value
    #[error("Invalid value for request {id}: {source}")]
    InvalidValue {
        id: RequestId,
        #[source]
        source: TypedValueError,
    },

    /// A balance used as a variable came back negative
    #[error("Balance of @{account} for {asset} is negative ({amount}), monetary amounts must be non-negative")]
    NegativeBalance {
        account: Account,
        asset: Asset,
        amount: BigInt,
    },

    /// A resource resolved to a value unusable by the resources depending on it
    #[error("Invalid resource {address}: {reason}")]
    InvalidResource { address: String, reason: String },

    /// Some requests of the batch are still waiting for a response
    #[error("{0} request(s) still unanswered")]
    Unanswered(usize),

    /// Resolution was started at the wrong point of the machine's life
    #[error("Cannot resolve in state {found}, expected {expected}")]
    InvalidState {
        expected: MachineState,
        found: MachineState,
    },
}

/// Errors raised while executing a program
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    /// Source accounts cannot cover the requested amount
    #[error("Insufficient funds: missing {missing} {asset}")]
    InsufficientFunds { asset: Asset, missing: BigInt },

    /// The script executed a `fail` statement
    #[error("Script failed")]
    ScriptFailure,

    /// Allocated shares do not add up to the allocated amount
    #[error("Allocation invariant violated: {0}")]
    AllocationInvariant(String),

    /// Portions supplied at runtime do not form a valid allotment
    #[error("Invalid allotment: {0}")]
    InvalidAllotment(String),

    /// An instruction received operands it cannot work with
    #[error("Invalid operation {op_name}: {reason}")]
    InvalidOperation { op_name: String, reason: String },

    /// Stack underflow occurs when trying to pop more values than are available
    #[error("Stack underflow during {op_name}")]
    StackUnderflow { op_name: String },

    /// An operand has the wrong type
    #[error("{op_name} expects {expected}, found {found}")]
    UnexpectedType {
        op_name: String,
        expected: ValueType,
        found: ValueType,
    },

    /// The program is inconsistent with the machine running it
    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    /// Execution was requested at the wrong point of the machine's life
    #[error("Cannot execute in state {found}, expected {expected}")]
    InvalidState {
        expected: MachineState,
        found: MachineState,
    },
}

impl RuntimeError {
    /// Exit code reported for this failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RuntimeError::InsufficientFunds { .. } => ExitCode::FailInsufficientFunds,
            RuntimeError::ScriptFailure => ExitCode::Fail,
            _ => ExitCode::FailInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_exit_codes() {
        let insufficient = RuntimeError::InsufficientFunds {
            asset: Asset::parse("COIN").unwrap(),
            missing: BigInt::from(5),
        };
        assert_eq!(insufficient.exit_code(), ExitCode::FailInsufficientFunds);
        assert_eq!(insufficient.to_string(), "Insufficient funds: missing 5 COIN");
        assert_eq!(RuntimeError::ScriptFailure.exit_code(), ExitCode::Fail);
        assert_eq!(
            RuntimeError::InvalidProgram("x".to_string()).exit_code(),
            ExitCode::FailInvalid
        );
    }
}
