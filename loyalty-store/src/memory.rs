//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! All state sits behind one RwLock, so every write (settlement or
//! withdrawal admission) is a single atomic unit.

use crate::error::StoreError;
use crate::repository::{BalanceRepository, LedgerStore, OrderRepository, RegisterOutcome};
use async_trait::async_trait;
use loyalty_domain::{
    Amount, BalanceSummary, DomainError, Order, OrderNumber, OrderStatus, Transition, UserId,
    Withdrawal,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory ledger store
pub struct MemoryStore {
    state: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    orders: HashMap<OrderNumber, StoredOrder>,
    withdrawals: Vec<Withdrawal>,
    next_seq: u64,
    settlement_writes: u64,
}

/// Order with its registration sequence (stable pending-list ordering)
struct StoredOrder {
    seq: u64,
    order: Order,
}

impl LedgerState {
    fn totals(&self, owner: UserId) -> Result<(Amount, Amount), StoreError> {
        let overflow = || DomainError::InvalidAmount("balance overflow".to_string());

        let accrued = self
            .orders
            .values()
            .filter(|s| s.order.owner == owner)
            .try_fold(Amount::ZERO, |acc, s| acc.checked_add(s.order.settled_accrual()))
            .ok_or_else(overflow)?;

        let withdrawn = self
            .withdrawals
            .iter()
            .filter(|w| w.owner == owner)
            .try_fold(Amount::ZERO, |acc, w| acc.checked_add(w.amount))
            .ok_or_else(overflow)?;

        Ok((accrued, withdrawn))
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("ledger lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("ledger lock poisoned".to_string()))
    }

    /// Get the number of orders
    pub fn order_count(&self) -> usize {
        self.read().map(|s| s.orders.len()).unwrap_or_default()
    }

    /// Get the number of withdrawals
    pub fn withdrawal_count(&self) -> usize {
        self.read().map(|s| s.withdrawals.len()).unwrap_or_default()
    }

    /// Number of settlements that actually changed a row
    pub fn settlement_write_count(&self) -> u64 {
        self.read().map(|s| s.settlement_writes).unwrap_or_default()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        if let Ok(mut state) = self.write() {
            *state = LedgerState::default();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Order Repository Implementation
// =============================================================================

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn register_order(
        &self,
        owner: UserId,
        number: &OrderNumber,
    ) -> Result<RegisterOutcome, StoreError> {
        let mut state = self.write()?;

        if let Some(existing) = state.orders.get(number) {
            return Ok(RegisterOutcome::Existing(existing.order.clone()));
        }

        let order = Order::new(number.clone(), owner);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.orders.insert(
            number.clone(),
            StoredOrder {
                seq,
                order: order.clone(),
            },
        );
        Ok(RegisterOutcome::Created(order))
    }

    async fn find_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        let state = self.read()?;
        Ok(state.orders.get(number).map(|s| s.order.clone()))
    }

    async fn orders_by_owner(&self, owner: UserId) -> Result<Vec<Order>, StoreError> {
        let state = self.read()?;
        let mut owned: Vec<&StoredOrder> =
            state.orders.values().filter(|s| s.order.owner == owner).collect();
        owned.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(owned.into_iter().map(|s| s.order.clone()).collect())
    }

    async fn list_pending_orders(&self) -> Result<Vec<OrderNumber>, StoreError> {
        let state = self.read()?;
        let mut pending: Vec<&StoredOrder> =
            state.orders.values().filter(|s| s.order.status.is_pending()).collect();
        pending.sort_by_key(|s| s.seq);
        Ok(pending.into_iter().map(|s| s.order.number.clone()).collect())
    }

    async fn apply_settlement(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Amount>,
    ) -> Result<Transition, StoreError> {
        let mut state = self.write()?;

        let stored = state
            .orders
            .get_mut(number)
            .ok_or_else(|| StoreError::not_found("order", number.as_str()))?;

        let transition = stored.order.apply_settlement(status, accrual)?;
        if transition == Transition::Advance {
            state.settlement_writes += 1;
        }
        Ok(transition)
    }
}

// =============================================================================
// Balance Repository Implementation
// =============================================================================

#[async_trait]
impl BalanceRepository for MemoryStore {
    async fn balance_summary(&self, owner: UserId) -> Result<BalanceSummary, StoreError> {
        let state = self.read()?;
        let (accrued, withdrawn) = state.totals(owner)?;
        Ok(BalanceSummary::from_totals(accrued, withdrawn)?)
    }

    async fn create_withdrawal(
        &self,
        owner: UserId,
        order_reference: &OrderNumber,
        amount: Amount,
    ) -> Result<Withdrawal, StoreError> {
        // Read, compare and insert under one write guard
        let mut state = self.write()?;
        let (accrued, withdrawn) = state.totals(owner)?;
        let available = BalanceSummary::from_totals(accrued, withdrawn)?.current;

        if amount > available {
            return Err(StoreError::InsufficientFunds {
                available,
                requested: amount,
            });
        }

        let withdrawal = Withdrawal::new(owner, order_reference.clone(), amount);
        state.withdrawals.push(withdrawal.clone());
        Ok(withdrawal)
    }

    async fn withdrawals_by_owner(&self, owner: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        let state = self.read()?;
        // Insertion order is admission order; newest first
        Ok(state
            .withdrawals
            .iter()
            .rev()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl LedgerStore for MemoryStore {
    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn balances(&self) -> &dyn BalanceRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
