use super::TypedValueError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of the unbounded account every ledger starts with
pub const WORLD: &str = "world";

static ACCOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_:]*$").expect("account pattern is valid")
});

/// A validated ledger account address, stored without its `@` prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account(String);

impl Account {
    /// Validate an account address
    ///
    /// A leading `@` is accepted and stripped.
    pub fn parse(raw: &str) -> Result<Self, TypedValueError> {
        let address = raw.strip_prefix('@').unwrap_or(raw);
        if ACCOUNT_PATTERN.is_match(address) {
            Ok(Account(address.to_string()))
        } else {
            Err(TypedValueError::InvalidAccount(raw.to_string()))
        }
    }

    /// The `@world` account
    pub fn world() -> Self {
        Account(WORLD.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_world(&self) -> bool {
        self.0 == WORLD
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Account {
    type Error = TypedValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Account::parse(&value)
    }
}

impl From<Account> for String {
    fn from(account: Account) -> Self {
        account.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_parse() {
        assert_eq!(Account::parse("users:001").unwrap().as_str(), "users:001");
        assert_eq!(Account::parse("@alice").unwrap().as_str(), "alice");
        assert_eq!(Account::parse("_tmp").unwrap().as_str(), "_tmp");
        assert!(Account::parse("world").unwrap().is_world());
    }

    #[test]
    fn test_account_parse_rejects_malformed() {
        for raw in ["123abc", "", "@", "users-001", "a b", ":x"] {
            assert!(
                matches!(Account::parse(raw), Err(TypedValueError::InvalidAccount(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_account_serde() {
        let account: Account = serde_json::from_str("\"orders:42\"").unwrap();
        assert_eq!(account.as_str(), "orders:42");
        assert!(serde_json::from_str::<Account>("\"42orders\"").is_err());
    }
}
