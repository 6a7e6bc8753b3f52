//! Value Objects for the loyalty ledger
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::luhn::{self, InvalidChecksum};

/// Identity of the user who owns orders and withdrawals.
pub type UserId = Uuid;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Identifier failed the Luhn check
    #[error(transparent)]
    InvalidChecksum(#[from] InvalidChecksum),

    /// Amount must be non-negative (or positive, where required)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Unknown order or accrual status string
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// OrderNumber
// =============================================================================

/// A checksum-valid order identifier.
///
/// # Invariants
/// - Non-empty, ASCII digits only
/// - Passes the Luhn check
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Parse and validate an order number.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidChecksum` if the input is not a Luhn-valid digit string.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        luhn::validate(raw)?;
        Ok(Self(raw.to_string()))
    }

    /// Borrow the digits
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        luhn::validate(&value)?;
        Ok(Self(value))
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Amount
// =============================================================================

/// Minor units per major unit (cents per currency unit).
const MINOR_PER_MAJOR: i64 = 100;

/// A non-negative monetary amount in minor currency units.
///
/// # Invariants
/// - Must be >= 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    /// Zero amount
    pub const ZERO: Amount = Amount(0);

    /// Create an amount from minor units
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if value < 0
    pub fn from_minor(minor: i64) -> Result<Self, DomainError> {
        if minor < 0 {
            return Err(DomainError::InvalidAmount(format!(
                "Amount must be non-negative, got {} minor units",
                minor
            )));
        }
        Ok(Self(minor))
    }

    /// Convert a major-unit decimal (e.g. `500.5`) to minor units (`50050`).
    ///
    /// Sub-cent precision is rounded half away from zero.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` for negative values or values
    /// that do not fit in `i64` minor units.
    pub fn from_major(major: Decimal) -> Result<Self, DomainError> {
        if major.is_sign_negative() && !major.is_zero() {
            return Err(DomainError::InvalidAmount(format!(
                "Amount must be non-negative, got {}",
                major
            )));
        }

        let minor = major
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .map(|m| m.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|m| m.to_i64())
            .ok_or_else(|| DomainError::InvalidAmount(format!("Amount out of range: {}", major)))?;

        Self::from_minor(minor)
    }

    /// Create an amount that must be strictly positive (withdrawals).
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if value <= 0
    pub fn positive(minor: i64) -> Result<Self, DomainError> {
        if minor <= 0 {
            return Err(DomainError::InvalidAmount(format!(
                "Amount must be positive, got {} minor units",
                minor
            )));
        }
        Ok(Self(minor))
    }

    /// Underlying minor units
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Value in major units as a decimal (`50050` -> `500.50`)
    pub fn as_major(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Whether the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction; `None` if the result would be negative
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        match self.0.checked_sub(other.0) {
            Some(v) if v >= 0 => Some(Amount(v)),
            _ => None,
        }
    }
}

impl TryFrom<i64> for Amount {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_minor(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_major())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_number_parse() {
        let number = OrderNumber::parse("12345678903").unwrap();
        assert_eq!(number.as_str(), "12345678903");
        assert_eq!(number.to_string(), "12345678903");
    }

    #[test]
    fn test_order_number_rejects_invalid() {
        assert!(matches!(
            OrderNumber::parse("12345678904"),
            Err(DomainError::InvalidChecksum(_))
        ));
        assert!(OrderNumber::parse("").is_err());
        assert!(OrderNumber::parse("abc").is_err());
    }

    #[test]
    fn test_order_number_deserialize_validates() {
        let ok: Result<OrderNumber, _> = serde_json::from_str("\"12345678903\"");
        assert!(ok.is_ok());

        let bad: Result<OrderNumber, _> = serde_json::from_str("\"12345678904\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_amount_from_major() {
        assert_eq!(Amount::from_major(dec!(500.5)).unwrap().minor_units(), 50050);
        assert_eq!(Amount::from_major(dec!(729.98)).unwrap().minor_units(), 72998);
        assert_eq!(Amount::from_major(dec!(0)).unwrap(), Amount::ZERO);
        assert_eq!(Amount::from_major(dec!(12)).unwrap().minor_units(), 1200);
    }

    #[test]
    fn test_amount_from_major_rounds_sub_cent() {
        assert_eq!(Amount::from_major(dec!(0.005)).unwrap().minor_units(), 1);
        assert_eq!(Amount::from_major(dec!(0.004)).unwrap().minor_units(), 0);
        assert_eq!(Amount::from_major(dec!(1.235)).unwrap().minor_units(), 124);
    }

    #[test]
    fn test_amount_rejects_negative() {
        assert!(Amount::from_major(dec!(-1)).is_err());
        assert!(Amount::from_minor(-1).is_err());
        assert!(Amount::positive(0).is_err());
        assert!(Amount::positive(1).is_ok());
    }

    #[test]
    fn test_amount_display_in_major_units() {
        assert_eq!(Amount::from_minor(50050).unwrap().to_string(), "500.50");
        assert_eq!(Amount::from_minor(8050).unwrap().to_string(), "80.50");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_amount_checked_sub_never_negative() {
        let a = Amount::from_minor(100).unwrap();
        let b = Amount::from_minor(150).unwrap();
        assert_eq!(b.checked_sub(a), Some(Amount::from_minor(50).unwrap()));
        assert_eq!(a.checked_sub(b), None);
    }
}
