//! Balance ledger operations.
//!
//! Request-scoped entry points used by the user-facing surface: order
//! registration, withdrawals and balance/history reads. Identifiers are
//! checksum-validated before the store is touched.

use std::sync::Arc;

use tracing::{debug, info};

use loyalty_domain::{Amount, BalanceSummary, Order, OrderNumber, UserId, Withdrawal};
use loyalty_store::{LedgerStore, RegisterOutcome};

use crate::error::{LedgerError, LedgerResult};

/// Result of submitting an order number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Number was new; the order is now pending
    Accepted(Order),
    /// Caller had already registered this number
    AlreadyRegistered(Order),
}

impl Registration {
    /// The stored order.
    pub fn order(&self) -> &Order {
        match self {
            Registration::Accepted(order) | Registration::AlreadyRegistered(order) => order,
        }
    }
}

/// Ledger facade over a store.
pub struct Ledger<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> Ledger<S>
where
    S: LedgerStore + ?Sized,
{
    /// Create a ledger over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register an order number for `owner`.
    pub async fn register_order(
        &self,
        owner: UserId,
        raw_number: &str,
    ) -> LedgerResult<Registration> {
        let number = OrderNumber::parse(raw_number)?;

        match self.store.orders().register_order(owner, &number).await? {
            RegisterOutcome::Created(order) => {
                info!(order = %number, %owner, "Order registered");
                Ok(Registration::Accepted(order))
            },
            RegisterOutcome::Existing(order) if order.owner == owner => {
                Ok(Registration::AlreadyRegistered(order))
            },
            RegisterOutcome::Existing(_) => Err(LedgerError::OrderOwnedByAnotherUser { number }),
        }
    }

    /// Spend `amount` of `owner`'s balance against an order reference.
    ///
    /// The reference must pass the Luhn check but need not be a registered
    /// order. Nothing is written when funds are insufficient.
    pub async fn withdraw(
        &self,
        owner: UserId,
        raw_reference: &str,
        amount: Amount,
    ) -> LedgerResult<Withdrawal> {
        let reference = OrderNumber::parse(raw_reference)?;
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("withdrawal must be positive".to_string()));
        }

        let withdrawal = self
            .store
            .balances()
            .create_withdrawal(owner, &reference, amount)
            .await
            .map_err(|e| {
                debug!(%owner, reference = %reference, %amount, error = %e, "Withdrawal rejected");
                LedgerError::from(e)
            })?;

        info!(%owner, reference = %reference, %amount, "Withdrawal admitted");
        Ok(withdrawal)
    }

    /// Current and withdrawn totals for `owner`.
    pub async fn balance(&self, owner: UserId) -> LedgerResult<BalanceSummary> {
        Ok(self.store.balances().balance_summary(owner).await?)
    }

    /// Spendable balance for `owner`.
    pub async fn available(&self, owner: UserId) -> LedgerResult<Amount> {
        Ok(self.store.balances().compute_available_balance(owner).await?)
    }

    /// `owner`'s orders, newest first.
    pub async fn orders(&self, owner: UserId) -> LedgerResult<Vec<Order>> {
        Ok(self.store.orders().orders_by_owner(owner).await?)
    }

    /// `owner`'s withdrawals, newest first.
    pub async fn withdrawals(&self, owner: UserId) -> LedgerResult<Vec<Withdrawal>> {
        Ok(self.store.balances().withdrawals_by_owner(owner).await?)
    }
}
