//! Resolution of external facts
//!
//! Before execution a machine needs values held by the ledger: metadata and
//! balances used as variables, then the balances of every account funds are
//! drawn from. The machine never reaches storage itself. Instead each phase
//! hands the caller a [`ResolutionChannel`] producing batches of
//! [`ResolutionRequest`]s; the caller answers every request of a batch, in
//! any order, and asks for the next batch until an empty one marks the end
//! of the phase.
//!
//! Requests are produced in a deterministic order: a left to right walk of
//! the resource table, then the needed balances sorted by account and asset.
//! A resource whose account or asset depends on a pending answer waits for
//! the following batch.
//!
//! Rejecting a request, cancelling the channel or dropping it before the end
//! of the phase aborts the machine.

use super::errors::ResolutionError;
use super::machine::{Machine, MachineState};
use crate::program::{Address, Resource};
use crate::resolver::Resolver;
use crate::typed::{amount, Account, Asset, Monetary, Portion, TypedValueError, Value, ValueType};
use log::debug;
use num_bigint::BigInt;
use num_traits::Signed;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a request within one machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the caller is asked for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    /// Value of a metadata key of the account, of the given type
    Metadata { key: String, ty: ValueType },

    /// Current balance of the account for the request's asset
    Balance,
}

/// A single fact the machine needs from the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionRequest {
    pub id: RequestId,
    #[serde(flatten)]
    pub kind: RequestKind,
    pub account: Account,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<Asset>,
}

impl fmt::Display for ResolutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.asset) {
            (RequestKind::Metadata { key, ty }, _) => {
                write!(f, "#{} meta(@{}, \"{}\") as {}", self.id, self.account, key, ty)
            }
            (RequestKind::Balance, Some(asset)) => {
                write!(f, "#{} balance(@{}, {})", self.id, self.account, asset)
            }
            (RequestKind::Balance, None) => write!(f, "#{} balance(@{})", self.id, self.account),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Phase {
    Resources,
    Balances,
}

/// Where an answer is stored
#[derive(Debug)]
enum Target {
    Metadata { address: Address, ty: ValueType },
    BalanceVariable { address: Address },
    Balance,
}

#[derive(Debug)]
struct Pending {
    request: ResolutionRequest,
    target: Target,
}

/// Request/response handshake for one resolution phase
///
/// The channel borrows the machine exclusively until the phase is over.
pub struct ResolutionChannel<'m> {
    machine: &'m mut Machine,
    phase: Phase,
    outstanding: BTreeMap<RequestId, Pending>,
    next_id: u64,
    cursor: usize,
    balances_requested: bool,
    done: bool,
}

impl<'m> ResolutionChannel<'m> {
    pub(super) fn new(machine: &'m mut Machine, phase: Phase) -> Self {
        ResolutionChannel {
            machine,
            phase,
            outstanding: BTreeMap::new(),
            next_id: 0,
            cursor: 0,
            balances_requested: false,
            done: false,
        }
    }

    /// Whether the phase is over, successfully or not
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Requests answered by nobody yet
    pub fn outstanding(&self) -> impl Iterator<Item = &ResolutionRequest> {
        self.outstanding.values().map(|p| &p.request)
    }

    /// Produce the next batch of requests
    ///
    /// Every request of the previous batch must have been answered. An empty
    /// batch means the phase is complete.
    pub fn next_batch(&mut self) -> Result<Vec<ResolutionRequest>, ResolutionError> {
        if self.done {
            return Ok(Vec::new());
        }
        if !self.outstanding.is_empty() {
            return Err(ResolutionError::Unanswered(self.outstanding.len()));
        }

        let batch = match self.phase {
            Phase::Resources => self.walk_resources(),
            Phase::Balances => self.request_balances(),
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(err) => return Err(self.fail(err)),
        };

        if batch.is_empty() {
            self.done = true;
            let next = match self.phase {
                Phase::Resources => MachineState::ResourcesResolved,
                Phase::Balances => MachineState::BalancesResolved,
            };
            self.machine.transition(next);
        } else {
            debug!("Resolution batch of {} request(s)", batch.len());
        }
        Ok(batch)
    }

    /// Answer a request with a typed value
    ///
    /// Metadata requests expect a value of the requested type. Balance
    /// requests expect a number or a monetary of the requested asset.
    pub fn respond(&mut self, id: RequestId, value: Value) -> Result<(), ResolutionError> {
        let pending = match self.outstanding.remove(&id) {
            Some(pending) => pending,
            None => return Err(ResolutionError::UnknownRequest(id)),
        };
        match self.store(pending, value) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Answer a request with a raw JSON value
    pub fn respond_json(
        &mut self,
        id: RequestId,
        json: &serde_json::Value,
    ) -> Result<(), ResolutionError> {
        let pending = self
            .outstanding
            .get(&id)
            .ok_or(ResolutionError::UnknownRequest(id))?;
        let parsed = match &pending.request.kind {
            RequestKind::Metadata { ty, .. } => Value::from_json(*ty, json)
                .map_err(|source| ResolutionError::InvalidValue { id, source }),
            RequestKind::Balance => amount::from_json(json).map(Value::Number).ok_or_else(|| {
                ResolutionError::InvalidValue {
                    id,
                    source: TypedValueError::InvalidNumber(json.to_string()),
                }
            }),
        };
        match parsed {
            Ok(value) => self.respond(id, value),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Report that a request cannot be answered, aborting the machine
    ///
    /// Always returns the resulting error so callers can propagate it.
    pub fn reject(&mut self, id: RequestId, reason: impl Into<String>) -> ResolutionError {
        let err = match self.outstanding.remove(&id) {
            Some(pending) => ResolutionError::Rejected {
                id,
                account: pending.request.account,
                reason: reason.into(),
            },
            None => ResolutionError::UnknownRequest(id),
        };
        self.fail(err)
    }

    /// Abandon the phase, aborting the machine
    pub fn cancel(mut self) {
        let _ = self.fail(ResolutionError::Cancelled);
    }

    /// Answer every batch from a resolver until the phase is complete
    pub fn drive<R: Resolver + ?Sized>(mut self, resolver: &mut R) -> Result<(), ResolutionError> {
        loop {
            let batch = self.next_batch()?;
            if batch.is_empty() {
                return Ok(());
            }
            for request in batch {
                match resolver.resolve(&request) {
                    Ok(value) => self.respond(request.id, value)?,
                    Err(reason) => return Err(self.reject(request.id, reason)),
                }
            }
        }
    }

    fn fail(&mut self, err: ResolutionError) -> ResolutionError {
        debug!("Resolution aborted: {}", err);
        self.outstanding.clear();
        self.done = true;
        self.machine.abort();
        err
    }

    fn issue(
        &mut self,
        kind: RequestKind,
        account: Account,
        asset: Option<Asset>,
        target: Target,
    ) -> ResolutionRequest {
        let request = ResolutionRequest {
            id: RequestId(self.next_id),
            kind,
            account,
            asset,
        };
        self.next_id += 1;
        self.outstanding.insert(
            request.id,
            Pending {
                request: request.clone(),
                target,
            },
        );
        request
    }

    fn walk_resources(&mut self) -> Result<Vec<ResolutionRequest>, ResolutionError> {
        let mut batch = Vec::new();
        let program = self.machine.shared_program();

        while let Some(resource) = program.resources.get(self.cursor) {
            let address = Address(self.cursor as u16);
            if resource
                .dependencies()
                .iter()
                .any(|dep| self.is_pending(*dep))
            {
                break;
            }

            match resource {
                Resource::Constant { value } => self.set_resource(address, value.clone()),
                Resource::Variable { name, .. } => {
                    let value = self.machine.var(name).cloned().ok_or_else(|| {
                        ResolutionError::InvalidResource {
                            address: address.to_string(),
                            reason: format!("variable ${} is not bound", name),
                        }
                    })?;
                    self.set_resource(address, value);
                }
                Resource::Monetary { asset, amount } => {
                    let asset = self.resolved_asset(*asset)?;
                    let monetary = Monetary::new(asset, amount.clone()).map_err(|e| {
                        ResolutionError::InvalidResource {
                            address: address.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    self.set_resource(address, Value::Monetary(monetary));
                }
                Resource::VariableAccountMetadata {
                    ty, account, key, ..
                } => {
                    let account = self.resolved_account(*account)?;
                    batch.push(self.issue(
                        RequestKind::Metadata {
                            key: key.clone(),
                            ty: *ty,
                        },
                        account,
                        None,
                        Target::Metadata { address, ty: *ty },
                    ));
                }
                Resource::VariableAccountBalance { account, asset, .. } => {
                    let account = self.resolved_account(*account)?;
                    let asset = self.resolved_asset(*asset)?;
                    batch.push(self.issue(
                        RequestKind::Balance,
                        account,
                        Some(asset),
                        Target::BalanceVariable { address },
                    ));
                }
            }
            self.cursor += 1;
        }

        Ok(batch)
    }

    fn request_balances(&mut self) -> Result<Vec<ResolutionRequest>, ResolutionError> {
        if self.balances_requested {
            return Ok(Vec::new());
        }
        self.balances_requested = true;

        let program = self.machine.shared_program();
        let mut needed: BTreeSet<(Account, Asset)> = BTreeSet::new();
        for (account, assets) in &program.needed_balances {
            let account = self.resolved_account(*account)?;
            if account.is_world() {
                continue;
            }
            for asset in assets {
                let asset = self.resolved_asset(*asset)?;
                needed.insert((account.clone(), asset));
            }
        }

        Ok(needed
            .into_iter()
            .map(|(account, asset)| {
                self.issue(RequestKind::Balance, account, Some(asset), Target::Balance)
            })
            .collect())
    }

    fn store(&mut self, pending: Pending, value: Value) -> Result<(), ResolutionError> {
        let id = pending.request.id;
        match pending.target {
            Target::Metadata { address, ty } => {
                if value.value_type() != ty {
                    return Err(ResolutionError::UnexpectedType {
                        id,
                        expected: ty,
                        found: value.value_type(),
                    });
                }
                if matches!(value, Value::Portion(ref portion) if portion.is_remaining()) {
                    return Err(ResolutionError::InvalidValue {
                        id,
                        source: TypedValueError::InvalidPortion(Portion::Remaining.to_string()),
                    });
                }
                self.set_resource(address, value);
            }
            Target::BalanceVariable { address } => {
                let (account, asset, balance) = balance_answer(pending.request, value)?;
                if balance.is_negative() {
                    return Err(ResolutionError::NegativeBalance {
                        account,
                        asset,
                        amount: balance,
                    });
                }
                let monetary = Monetary::new(asset, balance)
                    .map_err(|source| ResolutionError::InvalidValue { id, source })?;
                self.set_resource(address, Value::Monetary(monetary));
            }
            Target::Balance => {
                let (account, asset, balance) = balance_answer(pending.request, value)?;
                self.machine
                    .balances
                    .entry(account)
                    .or_default()
                    .insert(asset, balance);
            }
        }
        Ok(())
    }

    fn is_pending(&self, address: Address) -> bool {
        matches!(self.machine.resources.get(address.index()), Some(None))
    }

    fn set_resource(&mut self, address: Address, value: Value) {
        if let Some(slot) = self.machine.resources.get_mut(address.index()) {
            *slot = Some(value);
        }
    }

    fn resolved(&self, address: Address) -> Result<&Value, ResolutionError> {
        self.machine
            .resources
            .get(address.index())
            .and_then(|v| v.as_ref())
            .ok_or_else(|| ResolutionError::InvalidResource {
                address: address.to_string(),
                reason: "not resolved yet".to_string(),
            })
    }

    fn resolved_account(&self, address: Address) -> Result<Account, ResolutionError> {
        match self.resolved(address)? {
            Value::Account(account) => Ok(account.clone()),
            other => Err(ResolutionError::InvalidResource {
                address: address.to_string(),
                reason: format!("expected an account, found {}", other.value_type()),
            }),
        }
    }

    fn resolved_asset(&self, address: Address) -> Result<Asset, ResolutionError> {
        let value = self.resolved(address)?;
        value
            .asset()
            .cloned()
            .ok_or_else(|| ResolutionError::InvalidResource {
                address: address.to_string(),
                reason: format!("expected an asset, found {}", value.value_type()),
            })
    }
}

impl Drop for ResolutionChannel<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.fail(ResolutionError::Cancelled);
        }
    }
}

/// Extract the amount answering a balance request
fn balance_answer(
    request: ResolutionRequest,
    value: Value,
) -> Result<(Account, Asset, BigInt), ResolutionError> {
    let id = request.id;
    let asset = request.asset.ok_or_else(|| ResolutionError::InvalidResource {
        address: id.to_string(),
        reason: "balance request without asset".to_string(),
    })?;
    let amount = match value {
        Value::Number(amount) => amount,
        Value::Monetary(monetary) if monetary.asset() == &asset => monetary.into_parts().1,
        other => {
            return Err(ResolutionError::UnexpectedType {
                id,
                expected: ValueType::Number,
                found: other.value_type(),
            })
        }
    };
    Ok((request.account, asset, amount))
}
