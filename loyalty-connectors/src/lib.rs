//! Loyalty Ledger Connectors
//!
//! Adapters for external services.
//! Normalizes service-specific responses to domain outcomes.

#![warn(clippy::all)]

// Public modules
pub mod accrual_rest;

// Re-exports
pub use accrual_rest::{AccrualClientError, AccrualRestClient, DEFAULT_REQUEST_TIMEOUT_MS};
