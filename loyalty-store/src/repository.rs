//! Repository trait definitions (Ports)
//!
//! These traits define the Ledger Store contract consumed by the engine.
//! Implementations can be PostgreSQL, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use loyalty_domain::{
    Amount, BalanceSummary, Order, OrderNumber, OrderStatus, Transition, UserId, Withdrawal,
};

/// Result of registering an order number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Number was unknown; a new `New` order was stored
    Created(Order),
    /// Number already exists (owned by whoever registered it first)
    Existing(Order),
}

impl RegisterOutcome {
    /// The stored order, new or pre-existing
    pub fn order(&self) -> &Order {
        match self {
            RegisterOutcome::Created(order) | RegisterOutcome::Existing(order) => order,
        }
    }
}

/// Repository for Order entities
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order in status `New`, or return the existing row for that number
    async fn register_order(
        &self,
        owner: UserId,
        number: &OrderNumber,
    ) -> Result<RegisterOutcome, StoreError>;

    /// Find an order by number
    async fn find_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError>;

    /// All orders of an owner, newest first
    async fn orders_by_owner(&self, owner: UserId) -> Result<Vec<Order>, StoreError>;

    /// Numbers of all orders in `New` or `Processing`, oldest registration first
    async fn list_pending_orders(&self) -> Result<Vec<OrderNumber>, StoreError>;

    /// Write an external verdict for one order.
    ///
    /// Atomic per order and idempotent: repeating identical arguments returns
    /// `Transition::Unchanged`. A stale observation returns `Transition::Stale`
    /// without writing. Rewriting a terminal order with a different verdict
    /// fails with `StoreError::Domain`.
    async fn apply_settlement(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Amount>,
    ) -> Result<Transition, StoreError>;
}

/// Repository for balance-affecting rows (settled accruals and withdrawals)
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    /// Accrued and withdrawn totals for an owner, derived fresh
    async fn balance_summary(&self, owner: UserId) -> Result<BalanceSummary, StoreError>;

    /// Settled accrual minus withdrawals
    async fn compute_available_balance(&self, owner: UserId) -> Result<Amount, StoreError> {
        Ok(self.balance_summary(owner).await?.current)
    }

    /// Admit a withdrawal against the owner's balance.
    ///
    /// The balance read, comparison and insert are one unit of work,
    /// serialized per owner. Fails with `StoreError::InsufficientFunds`
    /// (and writes nothing) when `amount` exceeds the available balance.
    async fn create_withdrawal(
        &self,
        owner: UserId,
        order_reference: &OrderNumber,
        amount: Amount,
    ) -> Result<Withdrawal, StoreError>;

    /// All withdrawals of an owner, newest first
    async fn withdrawals_by_owner(&self, owner: UserId) -> Result<Vec<Withdrawal>, StoreError>;
}

/// Combined store interface
pub trait LedgerStore: Send + Sync {
    /// Get order repository
    fn orders(&self) -> &dyn OrderRepository;

    /// Get balance repository
    fn balances(&self) -> &dyn BalanceRepository;
}
