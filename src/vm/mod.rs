//! Virtual machine executing compiled Numscript programs
//!
//! This module contains the machine that turns a `Program` and its bindings
//! into postings and metadata, together with the resolution protocol used to
//! obtain ledger facts before execution.

mod errors;
mod machine;
mod resolution;
mod stack;

pub use errors::{BindingError, ResolutionError, RuntimeError};
pub use machine::{ExitCode, Machine, MachineState, Posting};
pub use resolution::{RequestId, RequestKind, ResolutionChannel, ResolutionRequest};
pub use stack::VMStack;
