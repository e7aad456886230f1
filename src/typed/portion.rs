use super::TypedValueError;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A share of an amount: an exact fraction in [0, 1] or the `remaining` marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Portion {
    /// Whatever is left once every other portion has been served
    Remaining,
    Specific(BigRational),
}

impl Portion {
    /// Build a specific portion, checking it lies in [0, 1]
    pub fn specific(ratio: BigRational) -> Result<Self, TypedValueError> {
        if ratio.is_negative() || ratio > BigRational::one() {
            return Err(TypedValueError::InvalidPortion(format_ratio(&ratio)));
        }
        Ok(Portion::Specific(ratio))
    }

    /// Parse `remaining`, a percentage (`15%`, `12.5%`) or a fraction (`1/3`)
    pub fn parse(raw: &str) -> Result<Self, TypedValueError> {
        let raw = raw.trim();
        if raw == "remaining" {
            return Ok(Portion::Remaining);
        }
        Portion::specific(parse_ratio(raw)?)
    }

    pub fn is_remaining(&self) -> bool {
        matches!(self, Portion::Remaining)
    }

    pub fn ratio(&self) -> Option<&BigRational> {
        match self {
            Portion::Remaining => None,
            Portion::Specific(ratio) => Some(ratio),
        }
    }
}

/// Parse a percentage or fraction without range checking
pub fn parse_ratio(raw: &str) -> Result<BigRational, TypedValueError> {
    let invalid = || TypedValueError::InvalidPortion(raw.to_string());

    if let Some(percent) = raw.strip_suffix('%') {
        let (whole, decimals) = match percent.split_once('.') {
            Some((whole, decimals)) => (whole, decimals),
            None => (percent, ""),
        };
        if whole.is_empty() || !is_digits(whole) || !(decimals.is_empty() || is_digits(decimals)) {
            return Err(invalid());
        }
        if percent.ends_with('.') {
            return Err(invalid());
        }
        let numerator: BigInt = format!("{}{}", whole, decimals).parse().map_err(|_| invalid())?;
        let denominator = BigInt::from(100) * BigInt::from(10).pow(decimals.len() as u32);
        return Ok(BigRational::new(numerator, denominator));
    }

    if let Some((numerator, denominator)) = raw.split_once('/') {
        let (numerator, denominator) = (numerator.trim(), denominator.trim());
        if !is_digits(numerator) || !is_digits(denominator) {
            return Err(invalid());
        }
        let numerator: BigInt = numerator.parse().map_err(|_| invalid())?;
        let denominator: BigInt = denominator.parse().map_err(|_| invalid())?;
        if denominator.is_zero() {
            return Err(invalid());
        }
        return Ok(BigRational::new(numerator, denominator));
    }

    Err(invalid())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Percent form when exact, fraction form otherwise
pub(crate) fn format_ratio(ratio: &BigRational) -> String {
    let percent = ratio * BigRational::from_integer(BigInt::from(100));
    if percent.is_integer() {
        format!("{}%", percent.to_integer())
    } else {
        format!("{}/{}", ratio.numer(), ratio.denom())
    }
}

impl fmt::Display for Portion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Portion::Remaining => f.write_str("remaining"),
            Portion::Specific(ratio) => f.write_str(&format_ratio(ratio)),
        }
    }
}

impl TryFrom<String> for Portion {
    type Error = TypedValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Portion::parse(&value)
    }
}

impl From<Portion> for String {
    fn from(portion: Portion) -> Self {
        portion.to_string()
    }
}
