//! Execution of compiled programs
//!
//! A `Machine` runs one `Program` for one transaction. Its life goes through
//! the following states, each transition being driven by the caller:
//!
//! 1. `Created`: built from a program with [`Machine::new`]
//! 2. `VarsBound`: caller variables checked by [`Machine::set_vars`]
//! 3. `ResourcesResolved`: metadata and balance variables supplied through
//!    the channel returned by [`Machine::resolve_resources`]
//! 4. `BalancesResolved`: balances of source accounts supplied through the
//!    channel returned by [`Machine::resolve_balances`]
//! 5. `Executed`: instructions run by [`Machine::execute`]
//!
//! Any resolution failure moves the machine to `Failed`. Machines are single
//! use: once terminal, every further call is an `InvalidState` error.

use super::errors::{BindingError, ResolutionError, RuntimeError};
use super::resolution::{Phase, ResolutionChannel};
use super::stack::VMStack;
use crate::program::{Instruction, Program};
use crate::typed::{
    Account, Allotment, Asset, Funding, FundingPart, Monetary, TypedValueError, Value, ValueType,
};
use log::{debug, info, trace};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Outcome of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExitCode {
    Ok = 1,
    Fail = 2,
    FailInvalid = 3,
    FailInsufficientFunds = 4,
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Ok => "OK",
            ExitCode::Fail => "FAIL",
            ExitCode::FailInvalid => "FAIL_INVALID",
            ExitCode::FailInsufficientFunds => "FAIL_INSUFFICIENT_FUNDS",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Created,
    VarsBound,
    ResolvingResources,
    ResourcesResolved,
    ResolvingBalances,
    BalancesResolved,
    Executed(ExitCode),
    Failed,
}

impl MachineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MachineState::Executed(_) | MachineState::Failed)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Created => f.write_str("created"),
            MachineState::VarsBound => f.write_str("vars-bound"),
            MachineState::ResolvingResources => f.write_str("resolving-resources"),
            MachineState::ResourcesResolved => f.write_str("resources-resolved"),
            MachineState::ResolvingBalances => f.write_str("resolving-balances"),
            MachineState::BalancesResolved => f.write_str("balances-resolved"),
            MachineState::Executed(code) => write!(f, "executed({})", code),
            MachineState::Failed => f.write_str("failed"),
        }
    }
}

/// Movement of an amount of one asset between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub source: Account,
    pub destination: Account,
    pub asset: Asset,
    #[serde(with = "crate::typed::amount")]
    pub amount: BigInt,
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{} -> @{}: [{} {}]",
            self.source, self.destination, self.asset, self.amount
        )
    }
}

/// A single-use execution of a program
#[derive(Debug)]
pub struct Machine {
    program: Arc<Program>,
    state: MachineState,
    vars: BTreeMap<String, Value>,
    pub(super) resources: Vec<Option<Value>>,
    pub(super) balances: BTreeMap<Account, BTreeMap<Asset, BigInt>>,
    stack: VMStack,
    pc: usize,
    postings: Vec<Posting>,
    tx_meta: BTreeMap<String, Value>,
    account_meta: BTreeMap<Account, BTreeMap<String, Value>>,
    printed: Vec<Value>,
}

impl Machine {
    pub fn new(program: impl Into<Arc<Program>>) -> Self {
        let program = program.into();
        let resources = vec![None; program.resources.len()];
        Self {
            program,
            state: MachineState::Created,
            vars: BTreeMap::new(),
            resources,
            balances: BTreeMap::new(),
            stack: VMStack::new(),
            pc: 0,
            postings: Vec::new(),
            tx_meta: BTreeMap::new(),
            account_meta: BTreeMap::new(),
            printed: Vec::new(),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Bind the caller variables
    ///
    /// Bindings must cover every declared variable with a value of the
    /// declared type and nothing else.
    pub fn set_vars(&mut self, vars: BTreeMap<String, Value>) -> Result<(), BindingError> {
        if self.state != MachineState::Created {
            return Err(BindingError::InvalidState {
                expected: MachineState::Created,
                found: self.state,
            });
        }
        self.vars = self.program.parse_variables(vars)?;
        self.transition(MachineState::VarsBound);
        Ok(())
    }

    /// Bind the caller variables from their JSON representation
    pub fn set_vars_json(
        &mut self,
        vars: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), BindingError> {
        if self.state != MachineState::Created {
            return Err(BindingError::InvalidState {
                expected: MachineState::Created,
                found: self.state,
            });
        }
        let vars = self.program.parse_variables_json(vars)?;
        self.set_vars(vars)
    }

    /// Start resolving the resource table
    ///
    /// A program declaring no variables may skip [`Machine::set_vars`].
    pub fn resolve_resources(&mut self) -> Result<ResolutionChannel<'_>, ResolutionError> {
        if self.state == MachineState::Created && self.program.variables().is_empty() {
            self.transition(MachineState::VarsBound);
        }
        if self.state != MachineState::VarsBound {
            return Err(ResolutionError::InvalidState {
                expected: MachineState::VarsBound,
                found: self.state,
            });
        }
        self.transition(MachineState::ResolvingResources);
        Ok(ResolutionChannel::new(self, Phase::Resources))
    }

    /// Start resolving the balances of the accounts funds are drawn from
    pub fn resolve_balances(&mut self) -> Result<ResolutionChannel<'_>, ResolutionError> {
        if self.state != MachineState::ResourcesResolved {
            return Err(ResolutionError::InvalidState {
                expected: MachineState::ResourcesResolved,
                found: self.state,
            });
        }
        self.transition(MachineState::ResolvingBalances);
        Ok(ResolutionChannel::new(self, Phase::Balances))
    }

    /// Run the program to completion
    ///
    /// On failure the postings and metadata are discarded and the error is
    /// returned; its [`RuntimeError::exit_code`] is recorded in the state.
    pub fn execute(&mut self) -> Result<ExitCode, RuntimeError> {
        if self.state != MachineState::BalancesResolved {
            return Err(RuntimeError::InvalidState {
                expected: MachineState::BalancesResolved,
                found: self.state,
            });
        }

        match self.run() {
            Ok(()) => {
                self.transition(MachineState::Executed(ExitCode::Ok));
                Ok(ExitCode::Ok)
            }
            Err(err) => {
                debug!("Execution failed at instruction {}: {}", self.pc, err);
                self.postings.clear();
                self.tx_meta.clear();
                self.account_meta.clear();
                self.stack.clear();
                self.transition(MachineState::Executed(err.exit_code()));
                Err(err)
            }
        }
    }

    /// Postings emitted by a successful execution
    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn tx_meta(&self) -> &BTreeMap<String, Value> {
        &self.tx_meta
    }

    pub fn account_meta(&self) -> &BTreeMap<Account, BTreeMap<String, Value>> {
        &self.account_meta
    }

    /// Values emitted by `print` statements, in order
    pub fn printed(&self) -> &[Value] {
        &self.printed
    }

    /// Current tracked balance of an account
    pub fn balance(&self, account: &Account, asset: &Asset) -> Option<&BigInt> {
        self.balances.get(account).and_then(|assets| assets.get(asset))
    }

    /// Every account referenced by the resolved resources
    pub fn involved_accounts(&self) -> BTreeSet<Account> {
        self.resources
            .iter()
            .filter_map(|value| match value {
                Some(Value::Account(account)) => Some(account.clone()),
                _ => None,
            })
            .collect()
    }

    /// Accounts funds may be drawn from, once resources are resolved
    pub fn involved_sources(&self) -> BTreeSet<Account> {
        self.program
            .sources
            .iter()
            .filter_map(|address| match self.resources.get(address.index()) {
                Some(Some(Value::Account(account))) => Some(account.clone()),
                _ => None,
            })
            .collect()
    }

    pub(super) fn shared_program(&self) -> Arc<Program> {
        Arc::clone(&self.program)
    }

    pub(super) fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub(super) fn transition(&mut self, next: MachineState) {
        debug!("Machine state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Abort the machine after a resolution failure
    pub(super) fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.postings.clear();
            self.tx_meta.clear();
            self.account_meta.clear();
            self.transition(MachineState::Failed);
        }
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        let program = Arc::clone(&self.program);
        self.pc = 0;

        while let Some(instruction) = program.instructions.get(self.pc) {
            trace!(
                "{:04}: {} (stack depth {})",
                self.pc,
                instruction,
                self.stack.len()
            );
            self.pc = self.step(instruction)?;
        }

        if !self.stack.is_empty() {
            return Err(RuntimeError::InvalidProgram(format!(
                "stack not empty after execution: {}",
                self.stack.format_stack()
            )));
        }
        Ok(())
    }

    /// Execute one instruction, returning the next program counter
    fn step(&mut self, instruction: &Instruction) -> Result<usize, RuntimeError> {
        let op = instruction.name();

        match instruction {
            Instruction::Push(address) => {
                let value = self
                    .resources
                    .get(address.index())
                    .and_then(|v| v.clone())
                    .ok_or_else(|| {
                        RuntimeError::InvalidProgram(format!("resource {} is not resolved", address))
                    })?;
                self.stack.push(value);
            }

            Instruction::Bump(depth) => self.stack.bump(*depth, op)?,

            Instruction::Delete => {
                if let Value::Funding(_) = self.stack.pop(op)? {
                    return Err(invalid(op, "cannot discard a funding"));
                }
            }

            Instruction::IAdd => {
                let b = self.stack.pop_number(op)?;
                let a = self.stack.pop_number(op)?;
                self.stack.push(Value::Number(a + b));
            }

            Instruction::ISub => {
                let b = self.stack.pop_number(op)?;
                let a = self.stack.pop_number(op)?;
                self.stack.push(Value::Number(a - b));
            }

            Instruction::Print => {
                let value = self.stack.pop(op)?;
                info!("OUT: {}", value);
                self.printed.push(value);
            }

            Instruction::Fail => return Err(RuntimeError::ScriptFailure),

            Instruction::Asset => {
                let value = self.stack.pop(op)?;
                let asset = value.asset().cloned().ok_or(RuntimeError::UnexpectedType {
                    op_name: op.to_string(),
                    expected: ValueType::Asset,
                    found: value.value_type(),
                })?;
                self.stack.push(Value::Asset(asset));
            }

            Instruction::MonetaryNew => {
                let amount = self.stack.pop_number(op)?;
                let asset = self.stack.pop_asset(op)?;
                let monetary = Monetary::new(asset, amount).map_err(|e| value_error(op, e))?;
                self.stack.push(Value::Monetary(monetary));
            }

            Instruction::MonetaryAdd => {
                let b = self.stack.pop_monetary(op)?;
                let a = self.stack.pop_monetary(op)?;
                let sum = a.checked_add(&b).map_err(|e| value_error(op, e))?;
                self.stack.push(Value::Monetary(sum));
            }

            Instruction::MonetarySub => {
                let b = self.stack.pop_monetary(op)?;
                let a = self.stack.pop_monetary(op)?;
                let difference = a.checked_sub(&b).map_err(|e| value_error(op, e))?;
                self.stack.push(Value::Monetary(difference));
            }

            Instruction::MakeAllotment(count) => {
                let mut portions = Vec::with_capacity(*count);
                for _ in 0..*count {
                    portions.push(self.stack.pop_portion(op)?);
                }
                let allotment = Allotment::new(portions)
                    .map_err(|e| RuntimeError::InvalidAllotment(e.to_string()))?;
                self.stack.push(Value::Allotment(allotment));
            }

            Instruction::TakeAll => {
                let overdraft = self.stack.pop_monetary(op)?;
                let account = self.stack.pop_account(op)?;
                let funding = self.withdraw_all(account, overdraft)?;
                self.stack.push(Value::Funding(funding));
            }

            Instruction::TakeAlways => {
                let monetary = self.stack.pop_monetary(op)?;
                let account = self.stack.pop_account(op)?;
                let funding = self.withdraw_always(account, monetary);
                self.stack.push(Value::Funding(funding));
            }

            Instruction::Take => {
                let monetary = self.stack.pop_monetary(op)?;
                let funding = self.stack.pop_funding(op)?;
                check_same_asset(op, funding.asset(), monetary.asset())?;
                let (taken, remainder) = funding.take(monetary.amount()).map_err(|e| match e {
                    TypedValueError::InsufficientFunding { missing } => {
                        RuntimeError::InsufficientFunds {
                            asset: monetary.asset().clone(),
                            missing,
                        }
                    }
                    other => value_error(op, other),
                })?;
                self.stack.push(Value::Funding(remainder));
                self.stack.push(Value::Funding(taken));
            }

            Instruction::TakeMax => {
                let monetary = self.stack.pop_monetary(op)?;
                let funding = self.stack.pop_funding(op)?;
                check_same_asset(op, funding.asset(), monetary.asset())?;
                let missing = monetary.amount() - funding.total();
                let missing = if missing.is_positive() {
                    missing
                } else {
                    BigInt::zero()
                };
                let missing =
                    Monetary::new(monetary.asset().clone(), missing).map_err(|e| value_error(op, e))?;
                let (taken, remainder) = funding.take_max(monetary.amount());
                self.stack.push(Value::Monetary(missing));
                self.stack.push(Value::Funding(remainder));
                self.stack.push(Value::Funding(taken));
            }

            Instruction::FundingAssemble(count) => {
                if *count == 0 {
                    return Err(RuntimeError::InvalidProgram(
                        "cannot assemble zero fundings".to_string(),
                    ));
                }
                let mut fundings = Vec::with_capacity(*count);
                for _ in 0..*count {
                    fundings.push(self.stack.pop_funding(op)?);
                }
                let mut fundings = fundings.into_iter().rev();
                let mut result = match fundings.next() {
                    Some(first) => first,
                    None => return Err(RuntimeError::StackUnderflow { op_name: op.to_string() }),
                };
                for funding in fundings {
                    result = result.concat(&funding).map_err(|e| value_error(op, e))?;
                }
                self.stack.push(Value::Funding(result));
            }

            Instruction::FundingSum => {
                let funding = self.stack.pop_funding(op)?;
                let total = funding.total_monetary();
                self.stack.push(Value::Funding(funding));
                self.stack.push(Value::Monetary(total));
            }

            Instruction::FundingReverse => {
                let funding = self.stack.pop_funding(op)?;
                self.stack.push(Value::Funding(funding.reverse()));
            }

            Instruction::Alloc => {
                let allotment = self.stack.pop_allotment(op)?;
                let monetary = self.stack.pop_monetary(op)?;
                let shares = allotment.allocate(monetary.amount());
                let allocated: BigInt = shares.iter().sum();
                if &allocated > monetary.amount() || shares.iter().any(|s| s.is_negative()) {
                    return Err(RuntimeError::AllocationInvariant(format!(
                        "allocated {} out of {}",
                        allocated, monetary
                    )));
                }
                for share in shares.into_iter().rev() {
                    let part = Monetary::new(monetary.asset().clone(), share)
                        .map_err(|e| value_error(op, e))?;
                    self.stack.push(Value::Monetary(part));
                }
            }

            Instruction::Repay => {
                let funding = self.stack.pop_funding(op)?;
                for part in funding.parts() {
                    self.credit(&part.account, funding.asset(), &part.amount);
                }
            }

            Instruction::Send => {
                let destination = self.stack.pop_account(op)?;
                let funding = self.stack.pop_funding(op)?;
                self.credit(&destination, funding.asset(), &funding.total());
                for part in funding.parts() {
                    self.postings.push(Posting {
                        source: part.account.clone(),
                        destination: destination.clone(),
                        asset: funding.asset().clone(),
                        amount: part.amount.clone(),
                    });
                }
            }

            Instruction::Save => {
                let account = self.stack.pop_account(op)?;
                match self.stack.pop(op)? {
                    Value::Asset(asset) => {
                        if let Some(balance) = self.tracked_balance(&account, &asset) {
                            if balance.is_positive() {
                                *balance = BigInt::zero();
                            }
                        }
                    }
                    Value::Monetary(monetary) => {
                        if let Some(balance) = self.tracked_balance(&account, monetary.asset()) {
                            *balance -= monetary.amount();
                        }
                    }
                    other => {
                        return Err(RuntimeError::UnexpectedType {
                            op_name: op.to_string(),
                            expected: ValueType::Monetary,
                            found: other.value_type(),
                        })
                    }
                }
            }

            Instruction::TxMeta => {
                let key = self.stack.pop_string(op)?;
                let value = self.stack.pop(op)?;
                self.tx_meta.insert(key, value);
            }

            Instruction::AccountMeta => {
                let account = self.stack.pop_account(op)?;
                let key = self.stack.pop_string(op)?;
                let value = self.stack.pop(op)?;
                self.account_meta.entry(account).or_default().insert(key, value);
            }

            Instruction::Jump(target) => return self.jump(*target),

            Instruction::JumpIfZero(target) => {
                if self.stack.pop_number(op)?.is_zero() {
                    return self.jump(*target);
                }
            }
        }

        Ok(self.pc + 1)
    }

    fn jump(&self, target: usize) -> Result<usize, RuntimeError> {
        if target > self.program.instructions.len() {
            return Err(RuntimeError::InvalidProgram(format!(
                "jump target {} out of bounds",
                target
            )));
        }
        Ok(target)
    }

    fn tracked_balance(&mut self, account: &Account, asset: &Asset) -> Option<&mut BigInt> {
        if account.is_world() {
            return None;
        }
        self.balances
            .get_mut(account)
            .and_then(|assets| assets.get_mut(asset))
    }

    fn credit(&mut self, account: &Account, asset: &Asset, amount: &BigInt) {
        if let Some(balance) = self.tracked_balance(account, asset) {
            *balance += amount;
        }
    }

    /// Take the whole balance of an account plus its overdraft allowance
    fn withdraw_all(&mut self, account: Account, overdraft: Monetary) -> Result<Funding, RuntimeError> {
        let (asset, overdraft) = overdraft.into_parts();
        let mut funding = Funding::new(asset.clone());
        if account.is_world() {
            return Ok(funding);
        }

        let balance = self.tracked_balance(&account, &asset).ok_or_else(|| {
            RuntimeError::InvalidProgram(format!(
                "balance of @{} for {} was not resolved",
                account, asset
            ))
        })?;
        let available = &*balance + &overdraft;
        if available.is_positive() {
            *balance = -overdraft;
            funding.push(FundingPart::new(account, available));
        }
        Ok(funding)
    }

    /// Take an amount from an account regardless of its balance
    fn withdraw_always(&mut self, account: Account, monetary: Monetary) -> Funding {
        let (asset, amount) = monetary.into_parts();
        if let Some(balance) = self.tracked_balance(&account, &asset) {
            *balance -= &amount;
        }
        Funding::from_parts(asset, vec![FundingPart::new(account, amount)])
    }
}

fn invalid(op: &str, reason: impl Into<String>) -> RuntimeError {
    RuntimeError::InvalidOperation {
        op_name: op.to_string(),
        reason: reason.into(),
    }
}

fn value_error(op: &str, err: TypedValueError) -> RuntimeError {
    invalid(op, err.to_string())
}

fn check_same_asset(op: &str, funding: &Asset, monetary: &Asset) -> Result<(), RuntimeError> {
    if funding != monetary {
        return Err(invalid(
            op,
            format!("cannot take {} from a funding of {}", monetary, funding),
        ));
    }
    Ok(())
}
