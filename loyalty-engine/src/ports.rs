//! Engine port definitions.
//!
//! Ports define the interfaces for external services the engine talks to.
//! Adapters implement these ports for specific services (REST client, stub).

use async_trait::async_trait;

use loyalty_domain::{AccrualOutcome, OrderNumber};

// =============================================================================
// Accrual Port
// =============================================================================

/// Port for asking the external accrual service about one order.
///
/// Implementations:
/// - `ScriptedAccrual` - For testing (pre-programmed outcomes)
/// - `AccrualRestClient` - Real HTTP service (`loyalty-connectors`)
///
/// Every call is a single attempt. Failures are classified into
/// [`AccrualOutcome`] variants rather than returned as errors, so the
/// scheduler decides what to do with them.
#[async_trait]
pub trait AccrualPort: Send + Sync {
    /// Fetch the current verdict for `number`.
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome;
}
