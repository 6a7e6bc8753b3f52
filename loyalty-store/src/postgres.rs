//! PostgreSQL ledger store.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.
//!
//! Withdrawal admission takes a transaction-scoped advisory lock keyed by the
//! owner, so withdrawals for one owner are serialized while different owners
//! proceed in parallel. Settlement locks the order row (`FOR UPDATE`) and runs
//! the domain transition rule before writing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_domain::{
    Amount, BalanceSummary, Order, OrderNumber, OrderStatus, Transition, UserId, Withdrawal,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::repository::{BalanceRepository, LedgerStore, OrderRepository, RegisterOutcome};

/// PostgreSQL-backed ledger store.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a small pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse_order_row(row: &PgRow) -> Result<Order, StoreError> {
    let number: String = row.try_get("number")?;
    let status: String = row.try_get("status")?;
    let accrual: Option<i64> = row.try_get("accrual")?;

    let number = OrderNumber::parse(&number).map_err(|e| {
        StoreError::Deserialization(format!("Invalid order number {}: {}", number, e))
    })?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    let accrual = accrual
        .map(Amount::from_minor)
        .transpose()
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;

    Ok(Order {
        number,
        owner: row.try_get::<Uuid, _>("owner")?,
        status,
        accrual,
        registered_at: row.try_get::<DateTime<Utc>, _>("registered_at")?,
    })
}

fn parse_withdrawal_row(row: &PgRow) -> Result<Withdrawal, StoreError> {
    let reference: String = row.try_get("order_reference")?;
    let amount: i64 = row.try_get("amount")?;

    Ok(Withdrawal {
        order_reference: OrderNumber::parse(&reference)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?,
        amount: Amount::from_minor(amount).map_err(|e| StoreError::Deserialization(e.to_string()))?,
        owner: row.try_get::<Uuid, _>("owner")?,
        processed_at: row.try_get::<DateTime<Utc>, _>("processed_at")?,
    })
}

/// Accrued (PROCESSED only) and withdrawn totals, read on the given connection.
async fn owner_totals(
    tx: &mut Transaction<'_, Postgres>,
    owner: UserId,
) -> Result<(Amount, Amount), StoreError> {
    let accrued: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(accrual), 0)::BIGINT
        FROM orders
        WHERE owner = $1 AND status = 'PROCESSED'
        "#,
    )
    .bind(owner)
    .fetch_one(&mut **tx)
    .await?;

    let withdrawn: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)::BIGINT
        FROM withdrawals
        WHERE owner = $1
        "#,
    )
    .bind(owner)
    .fetch_one(&mut **tx)
    .await?;

    Ok((Amount::from_minor(accrued)?, Amount::from_minor(withdrawn)?))
}

// =============================================================================
// Order Repository Implementation
// =============================================================================

#[async_trait]
impl OrderRepository for PgLedgerStore {
    async fn register_order(
        &self,
        owner: UserId,
        number: &OrderNumber,
    ) -> Result<RegisterOutcome, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (number, owner, status)
            VALUES ($1, $2, 'NEW')
            ON CONFLICT (number) DO NOTHING
            RETURNING number, owner, status, accrual, registered_at
            "#,
        )
        .bind(number.as_str())
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(RegisterOutcome::Created(parse_order_row(&row)?));
        }

        let existing = self
            .find_order(number)
            .await?
            .ok_or_else(|| StoreError::not_found("order", number.as_str()))?;
        Ok(RegisterOutcome::Existing(existing))
    }

    async fn find_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT number, owner, status, accrual, registered_at
            FROM orders
            WHERE number = $1
            "#,
        )
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parse_order_row).transpose()
    }

    async fn orders_by_owner(&self, owner: UserId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT number, owner, status, accrual, registered_at
            FROM orders
            WHERE owner = $1
            ORDER BY registered_at DESC, number DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_order_row).collect()
    }

    async fn list_pending_orders(&self) -> Result<Vec<OrderNumber>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT number
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
            ORDER BY registered_at ASC, number ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("number")?;
                OrderNumber::parse(&raw).map_err(|e| StoreError::Deserialization(e.to_string()))
            })
            .collect()
    }

    async fn apply_settlement(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Amount>,
    ) -> Result<Transition, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT number, owner, status, accrual, registered_at
            FROM orders
            WHERE number = $1
            FOR UPDATE
            "#,
        )
        .bind(number.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("order", number.as_str()))?;

        let mut order = parse_order_row(&row)?;
        let transition = order.apply_settlement(status, accrual)?;

        if transition == Transition::Advance {
            sqlx::query(
                r#"
                UPDATE orders
                SET status = $2, accrual = $3
                WHERE number = $1
                "#,
            )
            .bind(number.as_str())
            .bind(order.status.as_str())
            .bind(order.accrual.map(|a| a.minor_units()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(order = %number, status = %order.status, ?transition, "Settlement applied");
        Ok(transition)
    }
}

// =============================================================================
// Balance Repository Implementation
// =============================================================================

#[async_trait]
impl BalanceRepository for PgLedgerStore {
    async fn balance_summary(&self, owner: UserId) -> Result<BalanceSummary, StoreError> {
        let mut tx = self.pool.begin().await?;
        let (accrued, withdrawn) = owner_totals(&mut tx, owner).await?;
        tx.commit().await?;

        Ok(BalanceSummary::from_totals(accrued, withdrawn)?)
    }

    async fn create_withdrawal(
        &self,
        owner: UserId,
        order_reference: &OrderNumber,
        amount: Amount,
    ) -> Result<Withdrawal, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialize admissions for this owner until commit/rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(owner)
            .execute(&mut *tx)
            .await?;

        let (accrued, withdrawn) = owner_totals(&mut tx, owner).await?;
        let available = BalanceSummary::from_totals(accrued, withdrawn)?.current;

        if amount > available {
            tx.rollback().await?;
            return Err(StoreError::InsufficientFunds {
                available,
                requested: amount,
            });
        }

        let row = sqlx::query(
            r#"
            INSERT INTO withdrawals (owner, order_reference, amount)
            VALUES ($1, $2, $3)
            RETURNING owner, order_reference, amount, processed_at
            "#,
        )
        .bind(owner)
        .bind(order_reference.as_str())
        .bind(amount.minor_units())
        .fetch_one(&mut *tx)
        .await?;

        let withdrawal = parse_withdrawal_row(&row)?;
        tx.commit().await?;

        Ok(withdrawal)
    }

    async fn withdrawals_by_owner(&self, owner: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT owner, order_reference, amount, processed_at
            FROM withdrawals
            WHERE owner = $1
            ORDER BY processed_at DESC, id DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_withdrawal_row).collect()
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl LedgerStore for PgLedgerStore {
    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn balances(&self) -> &dyn BalanceRepository {
        self
    }
}
