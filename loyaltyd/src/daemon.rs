//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Ledger Store (orders, withdrawals)
//! - Reconciler (background settlement loop)
//! - Ledger (request-scoped operations)
//! - API Server (ops endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Start API server
//! 4. Start reconciler
//! 5. Wait for SIGINT or external cancellation
//! 6. Stop reconciler, drain API server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use loyalty_connectors::AccrualRestClient;
use loyalty_engine::{AccrualPort, Ledger, Reconciler, ScriptedAccrual};
use loyalty_store::{LedgerStore, MemoryStore};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Daemon
// =============================================================================

/// The main loyalty daemon.
pub struct Daemon<A: ?Sized, S: ?Sized> {
    /// Configuration
    config: Config,
    /// Store
    store: Arc<S>,
    /// Reconciliation loop
    reconciler: Arc<Reconciler<A, S>>,
    /// Cancelled on shutdown
    shutdown: CancellationToken,
}

impl Daemon<ScriptedAccrual, MemoryStore> {
    /// Create a new daemon with stub components (for testing).
    pub fn new_stub(config: Config) -> Self {
        Self::new(config, Arc::new(ScriptedAccrual::new()), Arc::new(MemoryStore::new()))
    }
}

impl<S: LedgerStore + ?Sized + 'static> Daemon<AccrualRestClient, S> {
    /// Create a daemon talking to the configured accrual service over HTTP.
    pub fn with_rest_client(config: Config, store: Arc<S>) -> DaemonResult<Self> {
        let client =
            AccrualRestClient::new(&config.accrual.base_url, config.accrual.request_timeout)?;
        Ok(Self::new(config, Arc::new(client), store))
    }
}

impl<A, S> Daemon<A, S>
where
    A: AccrualPort + ?Sized + 'static,
    S: LedgerStore + ?Sized + 'static,
{
    /// Create a new daemon with provided components.
    pub fn new(config: Config, accrual: Arc<A>, store: Arc<S>) -> Self {
        let reconciler =
            Arc::new(Reconciler::new(accrual, Arc::clone(&store), config.reconciler.clone()));

        Self {
            config,
            store,
            reconciler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ledger operations over the daemon's store.
    pub fn ledger(&self) -> Ledger<S> {
        Ledger::new(Arc::clone(&self.store))
    }

    /// The reconciler driven by this daemon.
    pub fn reconciler(&self) -> Arc<Reconciler<A, S>> {
        Arc::clone(&self.reconciler)
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT or the
    /// shutdown token).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            store = self.config.store_backend(),
            accrual = %self.config.accrual.base_url,
            "Starting loyalty daemon"
        );

        // 1. Start API server
        let (api_addr, api_task) = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 2. Start reconciler
        let reconciler = Arc::clone(&self.reconciler).start(self.shutdown.child_token());

        // 3. Wait for shutdown
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
        }

        // 4. Graceful shutdown
        info!("Initiating graceful shutdown");
        self.shutdown.cancel();

        reconciler.stop().await.map_err(|e| DaemonError::Task(e.to_string()))?;
        api_task.await.map_err(|e| DaemonError::Task(e.to_string()))?;

        let stats = self.reconciler.stats().await;
        info!(
            sweeps = stats.sweeps,
            orders_advanced = stats.orders_advanced,
            "Shutdown complete"
        );
        Ok(())
    }

    /// Start the API server.
    ///
    /// The server drains in-flight requests once the shutdown token fires.
    async fn start_api_server(&self) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let state = Arc::new(ApiState {
            reconciler: Arc::clone(&self.reconciler),
            config: self.config.clone(),
        });

        let router = create_router(state);
        let addr = self.config.api_addr();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Api(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| DaemonError::Api(format!("Failed to get local address: {}", e)))?;

        let token = self.shutdown.child_token();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = server.await {
                error!(error = %e, "API server error");
            }
        });

        Ok((local_addr, task))
    }
}

// =============================================================================
// Tests
// =============================================================================
