use super::TypedValueError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static ASSET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z/0-9]+$").expect("asset pattern is valid"));

/// A validated asset code such as `COIN` or `USD/2`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Asset(String);

impl Asset {
    pub fn parse(raw: &str) -> Result<Self, TypedValueError> {
        if ASSET_PATTERN.is_match(raw) {
            Ok(Asset(raw.to_string()))
        } else {
            Err(TypedValueError::InvalidAsset(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Asset {
    type Error = TypedValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Asset::parse(&value)
    }
}

impl From<Asset> for String {
    fn from(asset: Asset) -> Self {
        asset.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_parse() {
        assert!(Asset::parse("COIN").is_ok());
        assert!(Asset::parse("USD/2").is_ok());
        assert!(Asset::parse("EUR2").is_ok());
        assert!(matches!(Asset::parse("coin"), Err(TypedValueError::InvalidAsset(_))));
        assert!(Asset::parse("Coin").is_err());
        assert!(Asset::parse("").is_err());
        assert!(Asset::parse("US D").is_err());
    }
}
