//! Loyalty Ledger Daemon Library
//!
//! Runtime orchestrator for the order accrual reconciliation engine.
//!
//! # Architecture
//!
//! ```text
//! Ops API ─────────────┐
//!                      ↓
//! Reconciler → Accrual Service (HTTP)
//!     ↓
//! Ledger Store ← Ledger (register, withdraw, balance)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **API**: Health and status endpoints
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use loyaltyd::{Config, Daemon};
//! use loyalty_store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::with_rest_client(config, Arc::new(MemoryStore::new()))
//!         .expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
#[cfg(feature = "postgres")]
pub mod db;
pub mod error;

// Re-exports for convenience
pub use config::{AccrualConfig, ApiConfig, Config, Environment, LogConfig, LogFormat};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
