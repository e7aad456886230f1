//! Numscript compiler
//!
//! Source text goes through four stages:
//!
//! - `lexer`: characters to tokens
//! - `parser`: tokens to a syntax tree (`ast`), printable back to source by `printer`
//! - `checker`: variable binding and type checking
//! - `emitter`: lowering to a `Program`, with `source` and `destination`
//!   handling the funding choreography of `send`

pub mod ast;
pub mod checker;
mod destination;
pub mod emitter;
pub mod lexer;
pub mod parser;
mod printer;
mod source;

pub use ast::Script;
pub use checker::{check, TypeError, TypedScript};
pub use emitter::emit;
pub use parser::{parse, SyntaxError};

use crate::program::Program;
use log::debug;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while compiling a script
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The source text is malformed
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// The script is ill-typed
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The compiler broke one of its own invariants
    #[error("Internal compiler error: {0}")]
    Internal(String),

    /// The program would need more resources than can be addressed
    #[error("Program needs more than {limit} resources")]
    ResourceLimit { limit: usize },
}

/// Source position information for error reporting
///
/// Contains line and column information to pinpoint errors in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed)
    pub column: usize,
}

impl SourcePosition {
    /// Create a new source position
    ///
    /// # Arguments
    ///
    /// * `line` - Line number (1-indexed)
    /// * `column` - Column number (1-indexed)
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Compile Numscript source into a program
///
/// # Example
///
/// ```
/// use numscript::compile;
///
/// let program = compile("send [COIN 10] (source = @alice destination = @bob)").unwrap();
/// assert!(!program.instructions.is_empty());
/// ```
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let script = parse(source)?;
    let typed = check(&script)?;
    let program = emit(&typed)?;
    debug!(
        "Compiled program: {} instructions, {} resources, {} variables",
        program.instructions.len(),
        program.resources.len(),
        program.variables().len()
    );
    Ok(program)
}
