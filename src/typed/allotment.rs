use super::{Portion, TypedValueError};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered list of portions splitting one amount
///
/// Invariants, enforced by [`Allotment::new`]:
/// - at least one portion
/// - at most one `remaining`, and only in last position
/// - specific portions sum to at most 100%
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Portion>", into = "Vec<Portion>")]
pub struct Allotment {
    portions: Vec<Portion>,
}

impl Allotment {
    pub fn new(portions: Vec<Portion>) -> Result<Self, TypedValueError> {
        if portions.is_empty() {
            return Err(TypedValueError::InvalidAllotment(
                "allotment has no portions".to_string(),
            ));
        }

        let mut total = BigRational::zero();
        for (i, portion) in portions.iter().enumerate() {
            match portion {
                Portion::Remaining if i + 1 != portions.len() => {
                    return Err(TypedValueError::InvalidAllotment(
                        "'remaining' must be the last portion".to_string(),
                    ));
                }
                Portion::Remaining => {}
                Portion::Specific(ratio) => total += ratio,
            }
        }

        if total > BigRational::one() {
            return Err(TypedValueError::InvalidAllotment(format!(
                "portions sum to {}, more than 100%",
                Portion::Specific(total)
            )));
        }

        Ok(Allotment { portions })
    }

    pub fn portions(&self) -> &[Portion] {
        &self.portions
    }

    pub fn len(&self) -> usize {
        self.portions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portions.is_empty()
    }

    /// Split `total` into one share per portion
    ///
    /// Each specific share is `floor(total * portion)`. The running remainder
    /// is tracked by subtraction: a trailing `remaining` receives it, and when
    /// specific portions cover exactly 100% the last share absorbs the
    /// rounding. Otherwise the remainder is left unallocated, so the shares
    /// plus the leftover always add up to `total`.
    pub fn allocate(&self, total: &BigInt) -> Vec<BigInt> {
        let mut shares = Vec::with_capacity(self.portions.len());
        let mut remaining = total.clone();
        let mut covered = BigRational::zero();

        for portion in &self.portions {
            match portion {
                Portion::Specific(ratio) => {
                    let share = (total * ratio.numer()) / ratio.denom();
                    remaining -= &share;
                    covered += ratio;
                    shares.push(share);
                }
                Portion::Remaining => {
                    shares.push(std::mem::take(&mut remaining));
                }
            }
        }

        if covered.is_one() && !remaining.is_zero() {
            if let Some(last) = shares.last_mut() {
                *last += std::mem::take(&mut remaining);
            }
        }

        shares
    }
}

impl TryFrom<Vec<Portion>> for Allotment {
    type Error = TypedValueError;

    fn try_from(portions: Vec<Portion>) -> Result<Self, Self::Error> {
        Allotment::new(portions)
    }
}

impl From<Allotment> for Vec<Portion> {
    fn from(allotment: Allotment) -> Self {
        allotment.portions
    }
}

impl fmt::Display for Allotment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, portion) in self.portions.iter().enumerate() {
            if i > 0 {
                write!(f, " :")?;
            }
            write!(f, " {}", portion)?;
        }
        write!(f, " }}")
    }
}
