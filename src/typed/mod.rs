//! Runtime value system shared by the compiler and the machine
//!
//! Every value a script can manipulate is a variant of the closed [`Value`]
//! enum. Consumers match on it exhaustively instead of downcasting, so a
//! value of the wrong kind is always a typed error and never a panic.
//!
//! The module provides:
//! - `Account` and `Asset`: validated identifiers
//! - `Monetary`: an asset paired with a non-negative arbitrary-precision amount
//! - `Portion`: an exact fraction or the `remaining` marker
//! - `Allotment`: the allocation engine splitting an amount between portions
//! - `Funding`: an ordered list of (account, amount) parts of one asset

mod account;
mod allotment;
mod asset;
mod funding;
mod monetary;
mod portion;

pub use account::{Account, WORLD};
pub use allotment::Allotment;
pub use asset::Asset;
pub use funding::{Funding, FundingPart};
pub use monetary::Monetary;
pub use portion::Portion;
pub use portion::parse_ratio;
pub(crate) use portion::format_ratio;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors specific to typed value operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypedValueError {
    /// A value of one type was used where another was required
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueType, found: ValueType },

    /// Account address does not match the account pattern
    #[error("Invalid account address: '{0}'")]
    InvalidAccount(String),

    /// Asset code does not match the asset pattern
    #[error("Invalid asset: '{0}'")]
    InvalidAsset(String),

    /// Portion is malformed or outside of [0%, 100%]
    #[error("Invalid portion: '{0}'")]
    InvalidPortion(String),

    /// Number could not be parsed
    #[error("Invalid number: '{0}'")]
    InvalidNumber(String),

    /// Monetary amounts can never be negative
    #[error("Monetary amounts must be non-negative: [{asset} {amount}]")]
    NegativeAmount { asset: Asset, amount: BigInt },

    /// Two values of different assets were combined
    #[error("Mismatched assets: '{0}' and '{1}'")]
    AssetMismatch(Asset, Asset),

    /// A funding did not hold enough to cover a withdrawal
    #[error("Insufficient funding: missing {missing}")]
    InsufficientFunding { missing: BigInt },

    /// Allotment portions are inconsistent
    #[error("Invalid allotment: {0}")]
    InvalidAllotment(String),

    /// JSON payload does not describe a value of the expected type
    #[error("Invalid JSON value for type {ty}: {reason}")]
    InvalidJson { ty: ValueType, reason: String },
}

/// Types of the values handled by scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Account,
    Asset,
    Number,
    String,
    Monetary,
    Portion,
    Allotment,
    Funding,
}

impl ValueType {
    /// Resolve a type keyword usable in a `vars` block
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "account" => Some(ValueType::Account),
            "asset" => Some(ValueType::Asset),
            "number" => Some(ValueType::Number),
            "string" => Some(ValueType::String),
            "monetary" => Some(ValueType::Monetary),
            "portion" => Some(ValueType::Portion),
            _ => None,
        }
    }

    /// Get the type name as written in scripts
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Account => "account",
            ValueType::Asset => "asset",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Monetary => "monetary",
            ValueType::Portion => "portion",
            ValueType::Allotment => "allotment",
            ValueType::Funding => "funding",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value that can be stored on the machine stack
///
/// Serialized as `{"type": "...", "value": ...}`, the encoding used for
/// ledger metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Account(Account),
    Asset(Asset),
    Number(#[serde(with = "amount")] BigInt),
    String(String),
    Monetary(Monetary),
    Portion(Portion),
    Allotment(Allotment),
    Funding(Funding),
}

impl Value {
    /// Get the type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Account(_) => ValueType::Account,
            Value::Asset(_) => ValueType::Asset,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Monetary(_) => ValueType::Monetary,
            Value::Portion(_) => ValueType::Portion,
            Value::Allotment(_) => ValueType::Allotment,
            Value::Funding(_) => ValueType::Funding,
        }
    }

    /// Asset carried by the value, if any
    pub fn asset(&self) -> Option<&Asset> {
        match self {
            Value::Asset(asset) => Some(asset),
            Value::Monetary(monetary) => Some(monetary.asset()),
            Value::Funding(funding) => Some(funding.asset()),
            _ => None,
        }
    }

    /// Build a value of type `ty` from its plain JSON representation
    ///
    /// Accounts, assets and portions are strings, numbers are JSON integers
    /// or decimal strings, monetaries are `{"asset": ..., "amount": ...}`.
    pub fn from_json(ty: ValueType, json: &serde_json::Value) -> Result<Value, TypedValueError> {
        let invalid = |reason: &str| TypedValueError::InvalidJson {
            ty,
            reason: reason.to_string(),
        };

        match ty {
            ValueType::Account => {
                let raw = json.as_str().ok_or_else(|| invalid("expected a string"))?;
                Ok(Value::Account(Account::parse(raw)?))
            }
            ValueType::Asset => {
                let raw = json.as_str().ok_or_else(|| invalid("expected a string"))?;
                Ok(Value::Asset(Asset::parse(raw)?))
            }
            ValueType::Number => amount::from_json(json)
                .map(Value::Number)
                .ok_or_else(|| invalid("expected an integer")),
            ValueType::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| invalid("expected a string")),
            ValueType::Monetary => {
                let asset = json
                    .get("asset")
                    .and_then(|a| a.as_str())
                    .ok_or_else(|| invalid("missing asset"))?;
                let amount = json
                    .get("amount")
                    .and_then(amount::from_json)
                    .ok_or_else(|| invalid("missing or invalid amount"))?;
                Ok(Value::Monetary(Monetary::new(Asset::parse(asset)?, amount)?))
            }
            ValueType::Portion => {
                let raw = json.as_str().ok_or_else(|| invalid("expected a string"))?;
                Ok(Value::Portion(Portion::parse(raw)?))
            }
            ValueType::Allotment | ValueType::Funding => Err(invalid("not a declarable type")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Account(account) => write!(f, "@{}", account),
            Value::Asset(asset) => write!(f, "{}", asset),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Monetary(monetary) => write!(f, "{}", monetary),
            Value::Portion(portion) => write!(f, "{}", portion),
            Value::Allotment(allotment) => write!(f, "{}", allotment),
            Value::Funding(funding) => write!(f, "{}", funding),
        }
    }
}

/// Serde helpers for arbitrary-precision amounts
///
/// Amounts fitting in 64 bits are written as JSON integers, larger ones as
/// decimal strings. Both forms are accepted when reading.
pub(crate) mod amount {
    use num_bigint::BigInt;
    use num_traits::ToPrimitive;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        match value.to_i64() {
            Some(v) => serializer.serialize_i64(v),
            None => serializer.serialize_str(&value.to_string()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        from_json(&raw).ok_or_else(|| D::Error::custom(format!("invalid amount: {}", raw)))
    }

    pub fn from_json(raw: &serde_json::Value) -> Option<BigInt> {
        match raw {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(BigInt::from)
                .or_else(|| n.as_u64().map(BigInt::from)),
            serde_json::Value::String(s) => s.trim().parse::<BigInt>().ok(),
            _ => None,
        }
    }
}
