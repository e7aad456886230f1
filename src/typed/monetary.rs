use super::{amount, Asset, TypedValueError};
use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An amount of a single asset
///
/// The amount is never negative: constructors and arithmetic return
/// `TypedValueError::NegativeAmount` instead of producing such a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMonetary", into = "RawMonetary")]
pub struct Monetary {
    asset: Asset,
    amount: BigInt,
}

#[derive(Serialize, Deserialize)]
struct RawMonetary {
    asset: Asset,
    #[serde(with = "amount")]
    amount: BigInt,
}

impl Monetary {
    pub fn new(asset: Asset, amount: BigInt) -> Result<Self, TypedValueError> {
        if amount.sign() == Sign::Minus {
            return Err(TypedValueError::NegativeAmount { asset, amount });
        }
        Ok(Monetary { asset, amount })
    }

    pub fn zero(asset: Asset) -> Self {
        Monetary {
            asset,
            amount: BigInt::default(),
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn amount(&self) -> &BigInt {
        &self.amount
    }

    pub fn into_parts(self) -> (Asset, BigInt) {
        (self.asset, self.amount)
    }

    pub fn checked_add(&self, other: &Monetary) -> Result<Monetary, TypedValueError> {
        self.same_asset(other)?;
        Monetary::new(self.asset.clone(), &self.amount + &other.amount)
    }

    /// Subtract `other`, failing if the result would be negative
    pub fn checked_sub(&self, other: &Monetary) -> Result<Monetary, TypedValueError> {
        self.same_asset(other)?;
        Monetary::new(self.asset.clone(), &self.amount - &other.amount)
    }

    fn same_asset(&self, other: &Monetary) -> Result<(), TypedValueError> {
        if self.asset != other.asset {
            return Err(TypedValueError::AssetMismatch(
                self.asset.clone(),
                other.asset.clone(),
            ));
        }
        Ok(())
    }
}

impl TryFrom<RawMonetary> for Monetary {
    type Error = TypedValueError;

    fn try_from(raw: RawMonetary) -> Result<Self, Self::Error> {
        Monetary::new(raw.asset, raw.amount)
    }
}

impl From<Monetary> for RawMonetary {
    fn from(monetary: Monetary) -> Self {
        RawMonetary {
            asset: monetary.asset,
            amount: monetary.amount,
        }
    }
}

impl fmt::Display for Monetary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.asset, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(amount: i64) -> Monetary {
        Monetary::new(Asset::parse("COIN").unwrap(), BigInt::from(amount)).unwrap()
    }

    #[test]
    fn test_monetary_arithmetic() {
        assert_eq!(coin(10).checked_add(&coin(5)).unwrap(), coin(15));
        assert_eq!(coin(10).checked_sub(&coin(10)).unwrap(), coin(0));
        assert!(matches!(
            coin(5).checked_sub(&coin(6)),
            Err(TypedValueError::NegativeAmount { .. })
        ));

        let usd = Monetary::new(Asset::parse("USD").unwrap(), BigInt::from(1)).unwrap();
        assert!(matches!(
            coin(1).checked_add(&usd),
            Err(TypedValueError::AssetMismatch(_, _))
        ));
    }

    #[test]
    fn test_monetary_rejects_negative() {
        let result = Monetary::new(Asset::parse("COIN").unwrap(), BigInt::from(-1));
        assert!(matches!(result, Err(TypedValueError::NegativeAmount { .. })));
        assert!(serde_json::from_str::<Monetary>(r#"{"asset":"COIN","amount":-3}"#).is_err());
    }

    #[test]
    fn test_monetary_display() {
        assert_eq!(coin(99).to_string(), "[COIN 99]");
    }
}
