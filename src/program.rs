//! Compiled program representation
//!
//! This module defines the artifact produced by the compiler and consumed by
//! the machine:
//!
//! - `Instruction`: one operation of the stack machine
//! - `Resource`: an entry of the resource table, either known at compile time
//!   or resolved from bindings and ledger state before execution
//! - `Program`: the instruction sequence together with its resource table and
//!   the balances the machine will need
//!
//! A `Program` is immutable once compiled and can be shared between any
//! number of machines.

use crate::typed::{Portion, TypedValueError, Value, ValueType};
use crate::vm::BindingError;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Index into the resource table of a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u16);

impl Address {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Entry of the resource table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    /// Literal value known at compile time
    Constant { value: Value },

    /// Variable supplied by the caller before execution
    Variable { name: String, ty: ValueType },

    /// Variable read from the metadata of an account
    VariableAccountMetadata {
        name: String,
        ty: ValueType,
        account: Address,
        key: String,
    },

    /// Monetary variable holding the current balance of an account
    VariableAccountBalance {
        name: String,
        account: Address,
        asset: Address,
    },

    /// Monetary literal whose asset is another resource
    Monetary {
        asset: Address,
        #[serde(with = "crate::typed::amount")]
        amount: BigInt,
    },
}

impl Resource {
    /// Type of the value the resource resolves to
    pub fn value_type(&self) -> ValueType {
        match self {
            Resource::Constant { value } => value.value_type(),
            Resource::Variable { ty, .. } => *ty,
            Resource::VariableAccountMetadata { ty, .. } => *ty,
            Resource::VariableAccountBalance { .. } => ValueType::Monetary,
            Resource::Monetary { .. } => ValueType::Monetary,
        }
    }

    /// Resources that must be resolved before this one
    pub fn dependencies(&self) -> Vec<Address> {
        match self {
            Resource::Constant { .. } | Resource::Variable { .. } => Vec::new(),
            Resource::VariableAccountMetadata { account, .. } => vec![*account],
            Resource::VariableAccountBalance { account, asset, .. } => vec![*account, *asset],
            Resource::Monetary { asset, .. } => vec![*asset],
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Constant { value } => write!(f, "{}", value),
            Resource::Variable { name, ty } => write!(f, "<{}> ${}", ty, name),
            Resource::VariableAccountMetadata {
                name,
                ty,
                account,
                key,
            } => write!(f, "<{}> ${} = meta({}, \"{}\")", ty, name, account, key),
            Resource::VariableAccountBalance {
                name,
                account,
                asset,
            } => write!(f, "<monetary> ${} = balance({}, {})", name, account, asset),
            Resource::Monetary { asset, amount } => write!(f, "[{} {}]", asset, amount),
        }
    }
}

/// Stack machine instructions
///
/// Operand counts are carried by the instruction itself rather than pushed
/// on the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Push the value of a resource
    Push(Address),

    /// Move the value at the given depth to the top of the stack
    Bump(usize),

    /// Discard the top value, which must not be a funding
    Delete,

    /// Add two numbers
    IAdd,

    /// Subtract two numbers
    ISub,

    /// Emit the top value through the print channel
    Print,

    /// Abort the script
    Fail,

    /// Replace an asset, monetary or funding by its asset
    Asset,

    /// Build a monetary from an asset and a number
    MonetaryNew,

    MonetaryAdd,

    MonetarySub,

    /// Pop the given number of portions and build an allotment
    MakeAllotment(usize),

    /// Withdraw the whole balance of an account, overdraft included
    TakeAll,

    /// Withdraw a fixed amount from an account regardless of its balance
    TakeAlways,

    /// Take an exact amount from a funding, failing if it holds less
    Take,

    /// Take at most an amount from a funding, also pushing what is missing
    TakeMax,

    /// Concatenate the given number of fundings
    FundingAssemble(usize),

    /// Push the total of the funding on top of the stack
    FundingSum,

    FundingReverse,

    /// Split a monetary according to an allotment
    Alloc,

    /// Give a funding back to the accounts it was drawn from
    Repay,

    /// Move a funding to an account, emitting postings
    Send,

    /// Reserve funds of an account so later withdrawals cannot use them
    Save,

    /// Set a transaction metadata entry
    TxMeta,

    /// Set an account metadata entry
    AccountMeta,

    /// Continue execution at the given instruction
    Jump(usize),

    /// Continue at the given instruction if the number on top is zero
    JumpIfZero(usize),
}

impl Instruction {
    /// Mnemonic used in listings and traces
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Push(_) => "PUSH",
            Instruction::Bump(_) => "BUMP",
            Instruction::Delete => "DELETE",
            Instruction::IAdd => "IADD",
            Instruction::ISub => "ISUB",
            Instruction::Print => "PRINT",
            Instruction::Fail => "FAIL",
            Instruction::Asset => "ASSET",
            Instruction::MonetaryNew => "MONETARY_NEW",
            Instruction::MonetaryAdd => "MONETARY_ADD",
            Instruction::MonetarySub => "MONETARY_SUB",
            Instruction::MakeAllotment(_) => "MAKE_ALLOTMENT",
            Instruction::TakeAll => "TAKE_ALL",
            Instruction::TakeAlways => "TAKE_ALWAYS",
            Instruction::Take => "TAKE",
            Instruction::TakeMax => "TAKE_MAX",
            Instruction::FundingAssemble(_) => "FUNDING_ASSEMBLE",
            Instruction::FundingSum => "FUNDING_SUM",
            Instruction::FundingReverse => "FUNDING_REVERSE",
            Instruction::Alloc => "ALLOC",
            Instruction::Repay => "REPAY",
            Instruction::Send => "SEND",
            Instruction::Save => "SAVE",
            Instruction::TxMeta => "TX_META",
            Instruction::AccountMeta => "ACCOUNT_META",
            Instruction::Jump(_) => "JUMP",
            Instruction::JumpIfZero(_) => "JUMP_IF_ZERO",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(address) => write!(f, "{} {}", self.name(), address),
            Instruction::Bump(n)
            | Instruction::MakeAllotment(n)
            | Instruction::FundingAssemble(n)
            | Instruction::Jump(n)
            | Instruction::JumpIfZero(n) => write!(f, "{} {}", self.name(), n),
            _ => f.write_str(self.name()),
        }
    }
}

/// A compiled script
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Program {
    /// Flat instruction sequence
    pub instructions: Vec<Instruction>,

    /// Resource table, addressed by `Address`
    pub resources: Vec<Resource>,

    /// Resources holding accounts that funds are drawn from
    pub sources: BTreeSet<Address>,

    /// For every source account, the resources carrying the assets whose
    /// balance must be known before execution
    pub needed_balances: BTreeMap<Address, BTreeSet<Address>>,
}

impl Program {
    /// Variables the caller must bind, in declaration order
    pub fn variables(&self) -> Vec<(&str, ValueType)> {
        self.resources
            .iter()
            .filter_map(|resource| match resource {
                Resource::Variable { name, ty } => Some((name.as_str(), *ty)),
                _ => None,
            })
            .collect()
    }

    /// Check caller-supplied bindings against the declared variables
    ///
    /// Every declared variable must be bound to a value of its type, and no
    /// other name may be bound. A portion variable must hold a specific
    /// portion: `remaining` is only meaningful written inside an allotment.
    pub fn parse_variables(
        &self,
        vars: BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, BindingError> {
        let declared = self.variables();

        for name in vars.keys() {
            if !declared.iter().any(|(declared_name, _)| declared_name == name) {
                return Err(BindingError::UnknownVariable(name.clone()));
            }
        }

        for (name, ty) in &declared {
            let value = vars
                .get(*name)
                .ok_or_else(|| BindingError::MissingVariable(name.to_string()))?;
            if value.value_type() != *ty {
                return Err(BindingError::TypeMismatch {
                    name: name.to_string(),
                    expected: *ty,
                    found: value.value_type(),
                });
            }
            if matches!(value, Value::Portion(portion) if portion.is_remaining()) {
                return Err(BindingError::InvalidValue {
                    name: name.to_string(),
                    source: TypedValueError::InvalidPortion(Portion::Remaining.to_string()),
                });
            }
        }

        Ok(vars)
    }

    /// Same as [`Program::parse_variables`] for raw JSON values
    pub fn parse_variables_json(
        &self,
        vars: &BTreeMap<String, serde_json::Value>,
    ) -> Result<BTreeMap<String, Value>, BindingError> {
        let declared = self.variables();
        let mut values = BTreeMap::new();

        for (name, raw) in vars {
            let ty = declared
                .iter()
                .find(|(declared_name, _)| declared_name == name)
                .map(|(_, ty)| *ty)
                .ok_or_else(|| BindingError::UnknownVariable(name.clone()))?;
            let value = Value::from_json(ty, raw).map_err(|source| BindingError::InvalidValue {
                name: name.clone(),
                source,
            })?;
            values.insert(name.clone(), value);
        }

        self.parse_variables(values)
    }

    /// Number of resources whose value comes from ledger metadata or balances
    pub fn external_resource_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|resource| {
                matches!(
                    resource,
                    Resource::VariableAccountMetadata { .. } | Resource::VariableAccountBalance { .. }
                )
            })
            .count()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instructions:")?;
        for (i, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "  {:04}: {}", i, instruction)?;
        }
        writeln!(f, "Resources:")?;
        for (i, resource) in self.resources.iter().enumerate() {
            writeln!(f, "  #{}: {}", i, resource)?;
        }
        if !self.needed_balances.is_empty() {
            writeln!(f, "Needed balances:")?;
            for (account, assets) in &self.needed_balances {
                let assets: Vec<String> = assets.iter().map(|a| a.to_string()).collect();
                writeln!(f, "  {}: {}", account, assets.join(", "))?;
            }
        }
        Ok(())
    }
}
