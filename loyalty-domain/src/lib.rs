//! Loyalty Ledger Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains entities, value objects, the order status state machine
//! and the Luhn checksum used to gate identifiers.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod accrual;
pub mod entities;
pub mod luhn;
pub mod value_objects;

// Re-export commonly used types
pub use accrual::{AccrualOutcome, AccrualStatus};
pub use entities::{BalanceSummary, Order, OrderStatus, Transition, Withdrawal};
pub use luhn::InvalidChecksum;
pub use value_objects::{Amount, DomainError, OrderNumber, UserId};
