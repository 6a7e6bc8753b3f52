//! Luhn checksum validation for order identifiers.
//!
//! Every order number and withdrawal reference passes through [`validate`]
//! before it reaches the ledger. The check is pure and allocation-free.

use thiserror::Error;

/// Identifier failed the digit checksum (or was not a digit string at all).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid checksum for identifier {identifier:?}")]
pub struct InvalidChecksum {
    /// The rejected input, verbatim
    pub identifier: String,
}

/// Validate an identifier against the Luhn (mod 10) algorithm.
///
/// The input must be a non-empty sequence of ASCII decimal digits. Starting
/// from the rightmost digit, every second digit is doubled (subtracting 9 when
/// the result exceeds 9); the identifier is valid iff the total is a multiple of 10.
///
/// # Examples
/// ```
/// use loyalty_domain::luhn::validate;
///
/// assert!(validate("12345678903").is_ok());
/// assert!(validate("12345678904").is_err());
/// assert!(validate("").is_err());
/// ```
pub fn validate(identifier: &str) -> Result<(), InvalidChecksum> {
    let reject = || InvalidChecksum {
        identifier: identifier.to_string(),
    };

    if identifier.is_empty() {
        return Err(reject());
    }

    let mut sum: u32 = 0;
    for (position, ch) in identifier.chars().rev().enumerate() {
        let digit = ch.to_digit(10).ok_or_else(reject)?;
        sum += if position % 2 == 1 {
            let doubled = digit * 2;
            if doubled > 9 {
                doubled - 9
            } else {
                doubled
            }
        } else {
            digit
        };
    }

    if sum % 10 == 0 {
        Ok(())
    } else {
        Err(reject())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_numbers() {
        assert!(validate("12345678903").is_ok());
        assert!(validate("79927398713").is_ok());
        assert!(validate("4561261212345467").is_ok());
        assert!(validate("0").is_ok());
    }

    #[test]
    fn test_rejects_bad_check_digit() {
        assert!(validate("12345678904").is_err());
        assert!(validate("79927398710").is_err());
        assert!(validate("123").is_err());
    }

    #[test]
    fn test_rejects_empty_and_non_digits() {
        assert!(validate("").is_err());
        assert!(validate("1234567890a").is_err());
        assert!(validate(" 12345678903").is_err());
        assert!(validate("1234-5678-903").is_err());
        // Non-ASCII digits are not decimal digits for our purposes
        assert!(validate("١٢٣").is_err());
    }

    #[test]
    fn test_standard_luhn_sum_for_ten_digit_number() {
        // 3081279352: 2+1+3+9+7+4+1+7+0+6 = 40
        assert!(validate("3081279352").is_ok());
        assert!(validate("3081279353").is_err());
    }

    #[test]
    fn test_error_carries_identifier() {
        let err = validate("42").unwrap_err();
        assert_eq!(err.identifier, "42");
        assert!(err.to_string().contains("42"));
    }
}
