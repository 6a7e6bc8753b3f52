//! Engine error types.

use loyalty_domain::{Amount, DomainError, InvalidChecksum, OrderNumber};
use loyalty_store::StoreError;
use thiserror::Error;

/// Errors returned by ledger operations.
///
/// Every rejection happens before any write, or with no partial effect.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Identifier failed the Luhn check
    #[error(transparent)]
    InvalidChecksum(#[from] InvalidChecksum),

    /// Amount is zero, negative or unrepresentable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Withdrawal exceeds the available balance
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at admission time
        available: Amount,
        /// Amount asked for
        requested: Amount,
    },

    /// Order number was registered first by someone else
    #[error("Order {number} is registered by another user")]
    OrderOwnedByAnotherUser {
        /// The contested number
        number: OrderNumber,
    },

    /// Domain rule violation
    #[error("Domain error: {0}")]
    Domain(DomainError),

    /// Store error
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidChecksum(e) => LedgerError::InvalidChecksum(e),
            DomainError::InvalidAmount(msg) => LedgerError::InvalidAmount(msg),
            other => LedgerError::Domain(other),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientFunds { available, requested } => {
                LedgerError::InsufficientFunds { available, requested }
            },
            StoreError::Domain(e) => e.into(),
            other => LedgerError::Store(other),
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
