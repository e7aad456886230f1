use super::{Resolver, ResolverError};
use crate::typed::{amount, Account, Asset, Value};
use crate::vm::{RequestKind, ResolutionRequest};
use log::debug;
use num_bigint::BigInt;
use std::collections::HashMap;

/// A resolver answering from in-memory balances and metadata
///
/// Accounts without a recorded balance have a balance of zero. Missing
/// metadata keys are reported as resolution failures.
#[derive(Default, Debug, Clone)]
pub struct InMemoryResolver {
    // Account -> Asset -> balance
    balances: HashMap<Account, HashMap<Asset, BigInt>>,
    // Account -> key -> value
    metadata: HashMap<Account, HashMap<String, Value>>,
    // Every request answered or rejected, in order
    requests: Vec<ResolutionRequest>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&mut self, account: Account, asset: Asset, balance: impl Into<BigInt>) {
        self.balances
            .entry(account)
            .or_default()
            .insert(asset, balance.into());
    }

    /// Builder form of [`InMemoryResolver::set_balance`] for string literals
    pub fn with_balance(
        mut self,
        account: &str,
        asset: &str,
        balance: impl Into<BigInt>,
    ) -> Result<Self, ResolverError> {
        self.set_balance(Account::parse(account)?, Asset::parse(asset)?, balance);
        Ok(self)
    }

    pub fn set_metadata(&mut self, account: Account, key: impl Into<String>, value: Value) {
        self.metadata
            .entry(account)
            .or_default()
            .insert(key.into(), value);
    }

    pub fn with_metadata(
        mut self,
        account: &str,
        key: &str,
        value: Value,
    ) -> Result<Self, ResolverError> {
        self.set_metadata(Account::parse(account)?, key, value);
        Ok(self)
    }

    /// Load balances from `{"account": {"ASSET": amount}}`
    pub fn load_balances_json(&mut self, json: &str) -> Result<(), ResolverError> {
        let raw: HashMap<String, HashMap<String, serde_json::Value>> = serde_json::from_str(json)?;
        for (account, assets) in raw {
            let account = Account::parse(&account)?;
            for (asset, balance) in assets {
                let balance = amount::from_json(&balance).ok_or_else(|| {
                    ResolverError::Format(format!(
                        "balance of @{} for {} is not an integer: {}",
                        account, asset, balance
                    ))
                })?;
                self.set_balance(account.clone(), Asset::parse(&asset)?, balance);
            }
        }
        Ok(())
    }

    /// Load metadata from `{"account": {"key": {"type": ..., "value": ...}}}`
    pub fn load_metadata_json(&mut self, json: &str) -> Result<(), ResolverError> {
        let raw: HashMap<String, HashMap<String, Value>> = serde_json::from_str(json)?;
        for (account, entries) in raw {
            let account = Account::parse(&account)?;
            for (key, value) in entries {
                self.set_metadata(account.clone(), key, value);
            }
        }
        Ok(())
    }

    /// Requests seen so far
    pub fn requests(&self) -> &[ResolutionRequest] {
        &self.requests
    }

    fn lookup(&self, request: &ResolutionRequest) -> Result<Value, String> {
        match &request.kind {
            RequestKind::Balance => {
                let asset = request
                    .asset
                    .as_ref()
                    .ok_or_else(|| "balance request without asset".to_string())?;
                let balance = self
                    .balances
                    .get(&request.account)
                    .and_then(|assets| assets.get(asset))
                    .cloned()
                    .unwrap_or_default();
                Ok(Value::Number(balance))
            }
            RequestKind::Metadata { key, ty } => {
                let value = self
                    .metadata
                    .get(&request.account)
                    .and_then(|entries| entries.get(key))
                    .ok_or_else(|| {
                        format!("missing key {} in metadata for account @{}", key, request.account)
                    })?;
                match value {
                    value if value.value_type() == *ty => Ok(value.clone()),
                    // metadata stored as plain strings is parsed on demand
                    Value::String(raw) => Value::from_json(*ty, &serde_json::Value::String(raw.clone()))
                        .map_err(|e| e.to_string()),
                    other => Err(format!(
                        "metadata {} of account @{} is a {}, expected {}",
                        key,
                        request.account,
                        other.value_type(),
                        ty
                    )),
                }
            }
        }
    }
}

impl Resolver for InMemoryResolver {
    fn resolve(&mut self, request: &ResolutionRequest) -> Result<Value, String> {
        debug!("Resolving {}", request);
        self.requests.push(request.clone());
        self.lookup(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::ValueType;
    use crate::vm::RequestId;

    fn balance_request(account: &str, asset: &str) -> ResolutionRequest {
        ResolutionRequest {
            id: RequestId(0),
            kind: RequestKind::Balance,
            account: Account::parse(account).unwrap(),
            asset: Some(Asset::parse(asset).unwrap()),
        }
    }

    #[test]
    fn test_missing_balance_is_zero() {
        let mut resolver = InMemoryResolver::new()
            .with_balance("alice", "COIN", 10)
            .unwrap();
        assert_eq!(
            resolver.resolve(&balance_request("alice", "COIN")).unwrap(),
            Value::Number(BigInt::from(10))
        );
        assert_eq!(
            resolver.resolve(&balance_request("bob", "COIN")).unwrap(),
            Value::Number(BigInt::from(0))
        );
        assert_eq!(resolver.requests().len(), 2);
    }

    #[test]
    fn test_metadata_lookup() {
        let mut resolver = InMemoryResolver::new();
        resolver
            .load_metadata_json(
                r#"{"sales:042": {"seller": {"type": "account", "value": "users:053"},
                                  "rate": "12.5%"}}"#,
            )
            .unwrap_err();

        resolver
            .load_metadata_json(
                r#"{"sales:042": {"seller": {"type": "account", "value": "users:053"},
                                  "rate": {"type": "string", "value": "12.5%"}}}"#,
            )
            .unwrap();

        let request = |key: &str, ty| ResolutionRequest {
            id: RequestId(1),
            kind: RequestKind::Metadata {
                key: key.to_string(),
                ty,
            },
            account: Account::parse("sales:042").unwrap(),
            asset: None,
        };

        assert_eq!(
            resolver.resolve(&request("seller", ValueType::Account)).unwrap(),
            Value::Account(Account::parse("users:053").unwrap())
        );
        assert!(matches!(
            resolver.resolve(&request("rate", ValueType::Portion)).unwrap(),
            Value::Portion(_)
        ));
        assert!(resolver.resolve(&request("seller", ValueType::Number)).is_err());
        assert!(resolver.resolve(&request("missing", ValueType::Account)).is_err());
    }

    #[test]
    fn test_load_balances_json() {
        let mut resolver = InMemoryResolver::new();
        resolver
            .load_balances_json(r#"{"alice": {"COIN": 10, "USD/2": "99999999999999999999"}}"#)
            .unwrap();
        assert_eq!(
            resolver.resolve(&balance_request("alice", "USD/2")).unwrap(),
            Value::Number("99999999999999999999".parse().unwrap())
        );
        assert!(resolver
            .load_balances_json(r#"{"alice": {"coin": 10}}"#)
            .is_err());
    }
}
