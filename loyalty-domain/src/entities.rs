//! Domain Entities for the loyalty ledger
//!
//! Orders carry a monotonic status; withdrawals are immutable ledger memos.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::value_objects::{Amount, DomainError, OrderNumber, UserId};

// =============================================================================
// Order Status
// =============================================================================

/// Internal status of an order.
///
/// Ordering: `New < Processing < {Processed, Invalid}`. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Registered, no verdict yet
    New,
    /// External service is computing the reward
    Processing,
    /// Reward computed; accrual is final
    Processed,
    /// External service rejected the order
    Invalid,
}

/// Result of comparing an observed status against the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moves forward; write it
    Advance,
    /// Same status and accrual; writing again is a no-op
    Unchanged,
    /// Observation is older than the stored status; ignore it
    Stale,
}

impl OrderStatus {
    /// Position in the forward progression.
    fn rank(self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Processed | OrderStatus::Invalid => 2,
        }
    }

    /// Terminal statuses are never re-queried or rewritten.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    /// Still awaiting a verdict from the accrual service.
    pub fn is_pending(self) -> bool {
        !self.is_terminal()
    }

    /// Stable name, used on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    /// Decide how an observed `(next, next_accrual)` relates to the stored
    /// `(self, current_accrual)`.
    ///
    /// # Errors
    /// `DomainError::InvalidStateTransition` when a terminal order would be
    /// rewritten with a different verdict.
    pub fn settle(
        self,
        current_accrual: Option<Amount>,
        next: OrderStatus,
        next_accrual: Option<Amount>,
    ) -> Result<Transition, DomainError> {
        if self == next {
            if !self.is_terminal() || current_accrual == next_accrual {
                return Ok(Transition::Unchanged);
            }
            return Err(DomainError::InvalidStateTransition(format!(
                "{} order accrual is final ({:?} -> {:?})",
                self, current_accrual, next_accrual
            )));
        }

        if self.is_terminal() {
            return Err(DomainError::InvalidStateTransition(format!(
                "{} is terminal, refusing {}",
                self, next
            )));
        }

        if next.rank() > self.rank() {
            Ok(Transition::Advance)
        } else {
            Ok(Transition::Stale)
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// A loyalty-bearing purchase submitted for reward evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Luhn-valid identifier, globally unique
    pub number: OrderNumber,
    /// User who registered the order
    pub owner: UserId,
    /// Current status
    pub status: OrderStatus,
    /// Reward, present once `Processed`
    pub accrual: Option<Amount>,
    /// When the order was registered
    pub registered_at: DateTime<Utc>,
}

impl Order {
    /// Create a freshly registered order in status `New`.
    pub fn new(number: OrderNumber, owner: UserId) -> Self {
        Self {
            number,
            owner,
            status: OrderStatus::New,
            accrual: None,
            registered_at: Utc::now(),
        }
    }

    /// Accrual counted towards the owner's balance (zero unless `Processed`).
    pub fn settled_accrual(&self) -> Amount {
        match (self.status, self.accrual) {
            (OrderStatus::Processed, Some(amount)) => amount,
            _ => Amount::ZERO,
        }
    }

    /// Apply a settlement in place, following [`OrderStatus::settle`].
    ///
    /// The accrual is only kept for `Processed`; other statuses clear it.
    pub fn apply_settlement(
        &mut self,
        status: OrderStatus,
        accrual: Option<Amount>,
    ) -> Result<Transition, DomainError> {
        let accrual = if status == OrderStatus::Processed {
            Some(accrual.unwrap_or(Amount::ZERO))
        } else {
            None
        };

        let transition = self.status.settle(self.accrual, status, accrual)?;
        if transition == Transition::Advance {
            self.status = status;
            self.accrual = accrual;
        }
        Ok(transition)
    }
}

// =============================================================================
// Withdrawal
// =============================================================================

/// A spend of loyalty points against an in-app order reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Checksum-valid memo; need not be a registered order
    pub order_reference: OrderNumber,
    /// Positive amount withdrawn
    pub amount: Amount,
    /// User charged
    pub owner: UserId,
    /// When the withdrawal was admitted
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Create a withdrawal record stamped now.
    pub fn new(owner: UserId, order_reference: OrderNumber, amount: Amount) -> Self {
        Self {
            order_reference,
            amount,
            owner,
            processed_at: Utc::now(),
        }
    }
}

// =============================================================================
// Balance
// =============================================================================

/// Derived balance figures for one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// Settled accrual minus withdrawals
    pub current: Amount,
    /// Sum of all withdrawals
    pub withdrawn: Amount,
}

impl BalanceSummary {
    /// Derive the summary from raw sums.
    ///
    /// # Errors
    /// `DomainError::InvalidAmount` if withdrawals exceed accruals, which
    /// means the no-overdraft invariant was broken upstream.
    pub fn from_totals(accrued: Amount, withdrawn: Amount) -> Result<Self, DomainError> {
        let current = accrued.checked_sub(withdrawn).ok_or_else(|| {
            DomainError::InvalidAmount(format!(
                "Withdrawn {} exceeds accrued {}",
                withdrawn, accrued
            ))
        })?;
        Ok(Self { current, withdrawn })
    }
}

// =============================================================================
// Tests
// =============================================================================
