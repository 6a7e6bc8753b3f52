//! Reconciliation scheduler.
//!
//! A single background task that repeatedly sweeps the pending orders
//! (`New` and `Processing`), asks the accrual service about each one and
//! writes settled verdicts back to the store.
//!
//! Sweeps are sequential. A `RateLimited` answer aborts the rest of the
//! sweep and the loop cools down for the advertised interval (or the
//! configured default). All waits race against the cancellation token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use loyalty_domain::{AccrualOutcome, Amount, OrderNumber, OrderStatus, Transition};
use loyalty_store::{LedgerStore, StoreError};

use crate::ports::AccrualPort;

// =============================================================================
// Configuration
// =============================================================================

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Delay between full sweeps
    pub poll_interval: Duration,
    /// Cooldown after a 429 that carried no hint
    pub rate_limit_cooldown: Duration,
    /// Upper bound on any advertised cooldown
    pub max_rate_limit_cooldown: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            rate_limit_cooldown: Duration::from_secs(60),
            max_rate_limit_cooldown: Duration::from_secs(3600),
        }
    }
}

// =============================================================================
// Reports and stats
// =============================================================================

/// What happened during one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Orders for which a request completed
    pub queried: usize,
    /// Orders whose status moved forward
    pub advanced: usize,
    /// Verdicts identical to what was stored
    pub unchanged: usize,
    /// Late observations that were ignored
    pub stale: usize,
    /// Orders the service does not know yet
    pub not_found: usize,
    /// 5xx and transport failures
    pub transient_failures: usize,
    /// Settlements the store refused or failed to write
    pub store_failures: usize,
    /// Whether the service pushed back with 429
    pub rate_limited: bool,
    /// Interval advertised with the 429, if any
    pub retry_after: Option<Duration>,
    /// Whether the sweep stopped because of shutdown
    pub cancelled: bool,
}

impl SweepReport {
    /// How long to wait before the next sweep.
    ///
    /// An advertised cooldown is capped at `max_rate_limit_cooldown` and never
    /// shorter than the poll interval.
    pub fn next_delay(&self, config: &ReconcilerConfig) -> Duration {
        if self.rate_limited {
            self.retry_after
                .unwrap_or(config.rate_limit_cooldown)
                .min(config.max_rate_limit_cooldown)
                .max(config.poll_interval)
        } else {
            config.poll_interval
        }
    }
}

/// Running counters, exposed on the ops API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcilerStats {
    /// Completed sweeps (including rate-limited ones)
    pub sweeps: u64,
    /// Orders moved forward since start
    pub orders_advanced: u64,
    /// 429 responses seen
    pub rate_limit_hits: u64,
    /// Sweeps that could not list pending orders
    pub list_failures: u64,
    /// When the last sweep finished
    pub last_sweep_at: Option<DateTime<Utc>>,
    /// Set while cooling down after a 429
    pub cooldown_until: Option<DateTime<Utc>>,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Drives pending orders to a terminal status.
pub struct Reconciler<A: ?Sized, S: ?Sized> {
    accrual: Arc<A>,
    store: Arc<S>,
    config: ReconcilerConfig,
    stats: RwLock<ReconcilerStats>,
}

impl<A, S> Reconciler<A, S>
where
    A: AccrualPort + ?Sized + 'static,
    S: LedgerStore + ?Sized + 'static,
{
    /// Create a new reconciler.
    pub fn new(accrual: Arc<A>, store: Arc<S>, config: ReconcilerConfig) -> Self {
        Self {
            accrual,
            store,
            config,
            stats: RwLock::new(ReconcilerStats::default()),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Snapshot of the running counters.
    pub async fn stats(&self) -> ReconcilerStats {
        self.stats.read().await.clone()
    }

    /// Run one sweep over the pending orders.
    ///
    /// Only a failure to list pending orders is returned as an error.
    /// Everything that happens per order is recorded in the report.
    pub async fn sweep(&self, shutdown: &CancellationToken) -> Result<SweepReport, StoreError> {
        let pending = self.store.orders().list_pending_orders().await?;
        let mut report = SweepReport::default();

        debug!(pending = pending.len(), "Starting sweep");

        for number in pending {
            if shutdown.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                outcome = self.accrual.fetch(&number) => outcome,
            };

            report.queried += 1;
            debug!(order = %number, outcome = outcome.kind(), "Accrual outcome");

            match outcome {
                AccrualOutcome::Settled { status, amount } => {
                    self.settle(&number, status.to_order_status(), amount, &mut report).await;
                },
                AccrualOutcome::NotFound => {
                    report.not_found += 1;
                },
                AccrualOutcome::RateLimited { retry_after } => {
                    warn!(
                        order = %number,
                        retry_after_secs = retry_after.map(|d| d.as_secs()),
                        "Accrual service rate limited, aborting sweep"
                    );
                    report.rate_limited = true;
                    report.retry_after = retry_after;
                    break;
                },
                AccrualOutcome::ServiceUnavailable => {
                    warn!(order = %number, "Accrual service unavailable");
                    report.transient_failures += 1;
                },
                AccrualOutcome::TransportFailure { reason } => {
                    warn!(order = %number, %reason, "Accrual request failed");
                    report.transient_failures += 1;
                },
            }
        }

        Ok(report)
    }

    async fn settle(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        amount: Option<Amount>,
        report: &mut SweepReport,
    ) {
        match self.store.orders().apply_settlement(number, status, amount).await {
            Ok(Transition::Advance) => {
                info!(
                    order = %number,
                    %status,
                    accrual = amount.map(|a| a.to_string()),
                    "Order settled"
                );
                report.advanced += 1;
            },
            Ok(Transition::Unchanged) => {
                report.unchanged += 1;
            },
            Ok(Transition::Stale) => {
                debug!(order = %number, %status, "Ignoring stale observation");
                report.stale += 1;
            },
            Err(e) => {
                warn!(order = %number, %status, error = %e, "Failed to apply settlement");
                report.store_failures += 1;
            },
        }
    }

    /// Run sweeps until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            rate_limit_cooldown_secs = self.config.rate_limit_cooldown.as_secs(),
            "Reconciler started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let delay = match self.sweep(&shutdown).await {
                Ok(report) => {
                    if report.cancelled {
                        break;
                    }
                    let delay = report.next_delay(&self.config);
                    self.record(&report, delay).await;
                    delay
                },
                Err(e) => {
                    error!(error = %e, "Failed to list pending orders (will retry)");
                    self.stats.write().await.list_failures += 1;
                    self.config.poll_interval
                },
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Reconciler stopped");
    }

    async fn record(&self, report: &SweepReport, delay: Duration) {
        let now = Utc::now();
        let mut stats = self.stats.write().await;
        stats.sweeps += 1;
        stats.orders_advanced += report.advanced as u64;
        stats.last_sweep_at = Some(now);
        if report.rate_limited {
            stats.rate_limit_hits += 1;
            stats.cooldown_until = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d));
        } else {
            stats.cooldown_until = None;
        }
    }

    /// Spawn the loop on the runtime.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> ReconcilerHandle {
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        ReconcilerHandle { shutdown, task }
    }
}

/// Handle to a running reconciler task.
pub struct ReconcilerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) -> Result<(), JoinError> {
        self.shutdown.cancel();
        self.task.await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::ScriptedAccrual;
    use loyalty_domain::{AccrualStatus, Amount, OrderStatus};
    use loyalty_store::{MemoryStore, OrderRepository};
    use uuid::Uuid;

    const ORDERS: [&str; 5] =
        ["12345678903", "79927398713", "4561261212345467", "2377225624", "9278923470"];

    fn number(raw: &str) -> OrderNumber {
        OrderNumber::parse(raw).unwrap()
    }

    fn amount(minor: i64) -> Amount {
        Amount::from_minor(minor).unwrap()
    }

    fn processed(minor: i64) -> AccrualOutcome {
        AccrualOutcome::settled(AccrualStatus::Processed, Some(amount(minor)))
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval: Duration::from_millis(100),
            rate_limit_cooldown: Duration::from_secs(60),
            max_rate_limit_cooldown: Duration::from_secs(600),
        }
    }

    async fn setup(
        raw: &[&str],
    ) -> (Arc<ScriptedAccrual>, Arc<MemoryStore>, Reconciler<ScriptedAccrual, MemoryStore>) {
        let accrual = Arc::new(ScriptedAccrual::new());
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::now_v7();
        for r in raw {
            store.register_order(owner, &number(r)).await.unwrap();
        }
        let reconciler = Reconciler::new(Arc::clone(&accrual), Arc::clone(&store), config());
        (accrual, store, reconciler)
    }

    async fn status_of(store: &MemoryStore, raw: &str) -> OrderStatus {
        store.find_order(&number(raw)).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_sweep_settles_orders() {
        let (accrual, store, reconciler) = setup(&ORDERS[..3]).await;
        accrual.script(&number(ORDERS[0]), [processed(50_050)]);
        accrual.script(&number(ORDERS[1]), [AccrualOutcome::settled(AccrualStatus::Invalid, None)]);
        accrual.script(
            &number(ORDERS[2]),
            [AccrualOutcome::settled(AccrualStatus::Processing, None)],
        );

        let report = reconciler.sweep(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.queried, 3);
        assert_eq!(report.advanced, 3);
        assert!(!report.rate_limited);
        assert_eq!(status_of(&store, ORDERS[0]).await, OrderStatus::Processed);
        assert_eq!(status_of(&store, ORDERS[1]).await, OrderStatus::Invalid);
        assert_eq!(status_of(&store, ORDERS[2]).await, OrderStatus::Processing);
        assert_eq!(store.list_pending_orders().await.unwrap(), vec![number(ORDERS[2])]);
    }

    #[tokio::test]
    async fn test_rate_limit_aborts_rest_of_sweep() {
        let (accrual, store, reconciler) = setup(&ORDERS).await;
        accrual.set_default(processed(100));
        accrual.script(
            &number(ORDERS[2]),
            [AccrualOutcome::RateLimited {
                retry_after: Some(Duration::from_secs(3)),
            }],
        );

        let report = reconciler.sweep(&CancellationToken::new()).await.unwrap();

        assert!(report.rate_limited);
        assert_eq!(report.retry_after, Some(Duration::from_secs(3)));
        assert_eq!(report.queried, 3);
        assert_eq!(report.next_delay(reconciler.config()), Duration::from_secs(3));
        assert_eq!(
            accrual.calls(),
            vec![number(ORDERS[0]), number(ORDERS[1]), number(ORDERS[2])]
        );

        assert_eq!(status_of(&store, ORDERS[0]).await, OrderStatus::Processed);
        assert_eq!(status_of(&store, ORDERS[1]).await, OrderStatus::Processed);
        for raw in &ORDERS[2..] {
            assert_eq!(status_of(&store, raw).await, OrderStatus::New);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_without_hint_uses_default_cooldown() {
        let (accrual, _store, reconciler) = setup(&ORDERS[..1]).await;
        accrual.set_default(AccrualOutcome::RateLimited { retry_after: None });

        let report = reconciler.sweep(&CancellationToken::new()).await.unwrap();

        assert!(report.rate_limited);
        assert_eq!(report.next_delay(reconciler.config()), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_zero_hint_waits_at_least_poll_interval() {
        let (accrual, _store, reconciler) = setup(&ORDERS[..1]).await;
        accrual.set_default(AccrualOutcome::RateLimited {
            retry_after: Some(Duration::ZERO),
        });

        let report = reconciler.sweep(&CancellationToken::new()).await.unwrap();

        assert!(report.rate_limited);
        assert_eq!(report.next_delay(reconciler.config()), Duration::from_millis(100));
    }

    #[test]
    fn test_huge_hint_is_capped() {
        let report = SweepReport {
            rate_limited: true,
            retry_after: Some(Duration::from_secs(10_000_000_000_000)),
            ..SweepReport::default()
        };

        assert_eq!(report.next_delay(&config()), Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_hint_keeps_loop_alive() {
        let (accrual, store, reconciler) = setup(&ORDERS[..1]).await;
        accrual.script(
            &number(ORDERS[0]),
            [
                AccrualOutcome::RateLimited {
                    retry_after: Some(Duration::from_secs(10_000_000_000_000)),
                },
                processed(400),
            ],
        );
        let reconciler = Arc::new(reconciler);
        let handle = Arc::clone(&reconciler).start(CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_finished());
        let stats = reconciler.stats().await;
        assert_eq!(stats.rate_limit_hits, 1);
        assert!(stats.cooldown_until.is_some());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(accrual.call_count(), 2);
        assert_eq!(status_of(&store, ORDERS[0]).await, OrderStatus::Processed);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_terminal_orders_are_not_requeried() {
        let (accrual, store, reconciler) = setup(&ORDERS[..2]).await;
        accrual.set_default(processed(1_000));
        let token = CancellationToken::new();

        reconciler.sweep(&token).await.unwrap();
        assert_eq!(accrual.call_count(), 2);

        let report = reconciler.sweep(&token).await.unwrap();
        assert_eq!(report.queried, 0);
        assert_eq!(accrual.call_count(), 2);
        assert_eq!(store.settlement_write_count(), 2);
    }

    #[tokio::test]
    async fn test_repeated_verdict_is_idempotent() {
        let (accrual, store, reconciler) = setup(&ORDERS[..1]).await;
        accrual.set_default(AccrualOutcome::settled(AccrualStatus::Processing, None));
        let token = CancellationToken::new();

        let first = reconciler.sweep(&token).await.unwrap();
        let second = reconciler.sweep(&token).await.unwrap();

        assert_eq!(first.advanced, 1);
        assert_eq!(second.advanced, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(status_of(&store, ORDERS[0]).await, OrderStatus::Processing);
        assert_eq!(store.settlement_write_count(), 1);
    }

    #[tokio::test]
    async fn test_late_registered_observation_is_stale() {
        let (accrual, store, reconciler) = setup(&ORDERS[..1]).await;
        accrual.script(
            &number(ORDERS[0]),
            [
                AccrualOutcome::settled(AccrualStatus::Processing, None),
                AccrualOutcome::settled(AccrualStatus::Registered, None),
            ],
        );
        let token = CancellationToken::new();

        reconciler.sweep(&token).await.unwrap();
        let report = reconciler.sweep(&token).await.unwrap();

        assert_eq!(report.stale, 1);
        assert_eq!(status_of(&store, ORDERS[0]).await, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_transient_failures_leave_orders_pending() {
        let (accrual, store, reconciler) = setup(&ORDERS[..3]).await;
        accrual.script(&number(ORDERS[0]), [AccrualOutcome::ServiceUnavailable]);
        accrual.script(&number(ORDERS[1]), [AccrualOutcome::transport("connection reset")]);
        accrual.script(&number(ORDERS[2]), [processed(700)]);

        let report = reconciler.sweep(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.transient_failures, 2);
        assert_eq!(report.advanced, 1);
        assert_eq!(
            store.list_pending_orders().await.unwrap(),
            vec![number(ORDERS[0]), number(ORDERS[1])]
        );
    }

    #[tokio::test]
    async fn test_not_found_stays_new() {
        let (accrual, store, reconciler) = setup(&ORDERS[..1]).await;

        let report = reconciler.sweep(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.not_found, 1);
        assert_eq!(accrual.call_count(), 1);
        assert_eq!(status_of(&store, ORDERS[0]).await, OrderStatus::New);
    }

    #[tokio::test]
    async fn test_stop_interrupts_inflight_request() {
        let (accrual, _store, reconciler) = setup(&ORDERS[..2]).await;
        accrual.hang_on(&number(ORDERS[0]));

        let handle = Arc::new(reconciler).start(CancellationToken::new());

        while accrual.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("reconciler did not stop")
            .unwrap();

        // The hanging order blocked the sweep; the next one was never asked
        assert_eq!(accrual.calls(), vec![number(ORDERS[0])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_honours_cooldown() {
        let (accrual, store, reconciler) = setup(&ORDERS[..1]).await;
        accrual.script(
            &number(ORDERS[0]),
            [
                AccrualOutcome::RateLimited {
                    retry_after: Some(Duration::from_secs(30)),
                },
                processed(250),
            ],
        );
        let reconciler = Arc::new(reconciler);
        let handle = Arc::clone(&reconciler).start(CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(accrual.call_count(), 1);
        let stats = reconciler.stats().await;
        assert_eq!(stats.rate_limit_hits, 1);
        assert!(stats.cooldown_until.is_some());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(accrual.call_count(), 2);
        assert_eq!(status_of(&store, ORDERS[0]).await, OrderStatus::Processed);

        handle.stop().await.unwrap();
        let stats = reconciler.stats().await;
        assert_eq!(stats.orders_advanced, 1);
        assert!(stats.cooldown_until.is_none());
    }
}
