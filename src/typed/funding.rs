use super::{amount, Account, Asset, Monetary, TypedValueError};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount drawn from one account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundingPart {
    pub account: Account,
    #[serde(with = "amount")]
    pub amount: BigInt,
}

impl FundingPart {
    pub fn new(account: Account, amount: BigInt) -> Self {
        FundingPart { account, amount }
    }
}

/// Funds of one asset, as an ordered list of per-account parts
///
/// Parts never hold a zero or negative amount and two consecutive parts
/// never share an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Funding {
    asset: Asset,
    parts: Vec<FundingPart>,
}

impl Funding {
    pub fn new(asset: Asset) -> Self {
        Funding {
            asset,
            parts: Vec::new(),
        }
    }

    pub fn from_parts(asset: Asset, parts: Vec<FundingPart>) -> Self {
        let mut funding = Funding::new(asset);
        for part in parts {
            funding.push(part);
        }
        funding
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn parts(&self) -> &[FundingPart] {
        &self.parts
    }

    /// Append a part, merging it into the last one when accounts match
    pub fn push(&mut self, part: FundingPart) {
        if !part.amount.is_positive() {
            return;
        }
        if let Some(last) = self.parts.last_mut() {
            if last.account == part.account {
                last.amount += part.amount;
                return;
            }
        }
        self.parts.push(part);
    }

    pub fn total(&self) -> BigInt {
        self.parts.iter().map(|p| &p.amount).sum()
    }

    pub fn total_monetary(&self) -> Monetary {
        Monetary::new(self.asset.clone(), self.total())
            .unwrap_or_else(|_| Monetary::zero(self.asset.clone()))
    }

    /// Split off exactly `amount` from the front
    ///
    /// Returns `(taken, remainder)`, or the missing amount when the funding
    /// holds less than requested.
    pub fn take(&self, amount: &BigInt) -> Result<(Funding, Funding), TypedValueError> {
        let (taken, remainder) = self.take_max(amount);
        let missing = amount - taken.total();
        if missing.is_positive() {
            return Err(TypedValueError::InsufficientFunding { missing });
        }
        Ok((taken, remainder))
    }

    /// Split off at most `amount` from the front
    pub fn take_max(&self, amount: &BigInt) -> (Funding, Funding) {
        let mut taken = Funding::new(self.asset.clone());
        let mut remainder = Funding::new(self.asset.clone());
        let mut wanted = amount.clone();

        for part in &self.parts {
            if wanted.is_zero() || wanted.is_negative() {
                remainder.push(part.clone());
                continue;
            }
            if part.amount <= wanted {
                wanted -= &part.amount;
                taken.push(part.clone());
            } else {
                taken.push(FundingPart::new(part.account.clone(), wanted.clone()));
                remainder.push(FundingPart::new(
                    part.account.clone(),
                    &part.amount - &wanted,
                ));
                wanted = BigInt::zero();
            }
        }

        (taken, remainder)
    }

    /// Append `other` after `self`
    pub fn concat(&self, other: &Funding) -> Result<Funding, TypedValueError> {
        if self.asset != other.asset {
            return Err(TypedValueError::AssetMismatch(
                self.asset.clone(),
                other.asset.clone(),
            ));
        }
        let mut result = self.clone();
        for part in &other.parts {
            result.push(part.clone());
        }
        Ok(result)
    }

    pub fn reverse(&self) -> Funding {
        Funding::from_parts(self.asset.clone(), self.parts.iter().rev().cloned().collect())
    }
}

impl fmt::Display for Funding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.asset)?;
        for part in &self.parts {
            write!(f, " @{} {}", part.account, part.amount)?;
        }
        write!(f, "]")
    }
}
