//! Loyalty Ledger Engine
//!
//! Reconciliation of pending orders against the external accrual service,
//! plus the request-scoped ledger operations.
//!
//! # Architecture
//!
//! ```text
//! Store (pending) → Reconciler → AccrualPort → Outcome → Store (settle)
//! Caller → Ledger → Store (atomic withdrawal)
//! ```
//!
//! # Components
//!
//! - **Ports**: Trait for the accrual service
//! - **Reconciler**: Background sweep loop with rate-limit cooldown
//! - **Ledger**: Order registration, withdrawals and balance reads
//! - **Stub**: Scripted accrual service for tests

#![warn(clippy::all)]

pub mod error;
pub mod ledger;
pub mod ports;
pub mod reconciler;
pub mod stub;

// Re-exports for convenience
pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, Registration};
pub use ports::AccrualPort;
pub use reconciler::{Reconciler, ReconcilerConfig, ReconcilerHandle, ReconcilerStats, SweepReport};
pub use stub::ScriptedAccrual;
