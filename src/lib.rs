//! Numscript: a transaction-scripting language for double-entry ledgers
//!
//! A script is compiled once into an immutable [`Program`], then executed by
//! a single-use [`Machine`] per transaction:
//!
//! 1. `compile` the source
//! 2. bind caller variables with `Machine::set_vars`
//! 3. answer the requests of `Machine::resolve_resources`, then of
//!    `Machine::resolve_balances`
//! 4. `Machine::execute` and read the postings and metadata
//!
//! ```
//! use numscript::{compile, InMemoryResolver, Machine};
//! use std::collections::BTreeMap;
//!
//! let program = compile("send [COIN 10] (source = @alice destination = @bob)").unwrap();
//! let mut resolver = InMemoryResolver::new().with_balance("alice", "COIN", 25).unwrap();
//!
//! let mut machine = Machine::new(program);
//! machine.set_vars(BTreeMap::new()).unwrap();
//! machine.resolve_resources().unwrap().drive(&mut resolver).unwrap();
//! machine.resolve_balances().unwrap().drive(&mut resolver).unwrap();
//! machine.execute().unwrap();
//!
//! assert_eq!(machine.postings()[0].to_string(), "@alice -> @bob: [COIN 10]");
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod program;
pub mod resolver;
pub mod typed;
pub mod vm;

pub use crate::compiler::{compile, parse, CompileError, SyntaxError, TypeError};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::program::{Address, Instruction, Program, Resource};
pub use crate::resolver::{InMemoryResolver, Resolver};
pub use crate::typed::{Account, Allotment, Asset, Funding, Monetary, Portion, Value, ValueType};
pub use crate::vm::{
    BindingError, ExitCode, Machine, MachineState, Posting, ResolutionError, RuntimeError,
};
