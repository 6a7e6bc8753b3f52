//! Loyalty Ledger Daemon
//!
//! Runs the reconciliation loop against the accrual service and serves
//! the ops API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store)
//! cargo run -p loyaltyd
//!
//! # Start against Postgres and a remote accrual service
//! DATABASE_URI=postgres://... ACCRUAL_SYSTEM_ADDRESS=http://accrual:8080 \
//!     cargo run -p loyaltyd --features postgres
//!
//! # Database maintenance
//! cargo run -p loyaltyd --features postgres -- db migrate
//! ```
//!
//! # Environment Variables
//!
//! - `LOYALTY_ENV`: Environment (test, development, production)
//! - `RUN_ADDRESS`: Ops API bind address (default: 0.0.0.0:8081)
//! - `ACCRUAL_SYSTEM_ADDRESS`: Accrual service (default: http://localhost:8080)
//! - `DATABASE_URI`: Postgres URL (default: unset, in-memory store)
//! - `LOYALTY_POLL_INTERVAL_MS`: Delay between sweeps (default: 1000)
//! - `LOYALTY_RATE_LIMIT_COOLDOWN_SECS`: Cooldown after 429 without hint (default: 60)
//! - `LOYALTY_REQUEST_TIMEOUT_MS`: Accrual request timeout (default: 5000)
//! - `LOG_LEVEL`: Log filter when `RUST_LOG` is unset
//! - `LOYALTY_LOG_FORMAT`: text or json

use std::sync::Arc;

use loyaltyd::{Config, Daemon, LogConfig, LogFormat};
use loyalty_store::{LedgerStore, MemoryStore};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (also reads .env)
    let config = Config::from_env()?;

    init_tracing(&config.log)?;

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("db") {
        return run_db(&args).await;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_addr = %config.api_addr(),
        "Loyalty Ledger Daemon"
    );

    match config.database_url.clone() {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let store = loyalty_store::PgLedgerStore::connect(&url).await?;
            loyalty_db::migrate(store.pool()).await?;
            run_daemon(config, Arc::new(store)).await
        },
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            warn!(
                "DATABASE_URI is set but this build has no postgres support; using in-memory store"
            );
            let config = Config {
                database_url: None,
                ..config
            };
            run_daemon(config, Arc::new(MemoryStore::new())).await
        },
        None => {
            warn!("DATABASE_URI not set; ledger lives in memory and is lost on exit");
            run_daemon(config, Arc::new(MemoryStore::new())).await
        },
    }
}

async fn run_daemon<S: LedgerStore + 'static>(config: Config, store: Arc<S>) -> anyhow::Result<()> {
    let daemon = Daemon::with_rest_client(config, store)?;
    daemon.run().await?;
    Ok(())
}

#[cfg(feature = "postgres")]
async fn run_db(args: &[String]) -> anyhow::Result<()> {
    loyaltyd::db::run_db_command(args).await
}

#[cfg(not(feature = "postgres"))]
async fn run_db(_args: &[String]) -> anyhow::Result<()> {
    Err(anyhow::anyhow!("db commands require the `postgres` feature"))
}

fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.level))?;

    match log.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
    }

    Ok(())
}
