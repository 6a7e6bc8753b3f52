//! Loyalty Ledger Storage Layer
//!
//! Persists orders and withdrawals and answers balance queries.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing and local runs
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use loyalty_store::{BalanceRepository, MemoryStore, OrderRepository};
//! use loyalty_domain::OrderNumber;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let owner = Uuid::now_v7();
//!
//!     let number = OrderNumber::parse("12345678903").unwrap();
//!     store.register_order(owner, &number).await.unwrap();
//!
//!     let pending = store.list_pending_orders().await.unwrap();
//!     assert_eq!(pending, vec![number]);
//!
//!     let summary = store.balance_summary(owner).await.unwrap();
//!     assert!(summary.current.is_zero());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgLedgerStore;
pub use repository::{BalanceRepository, LedgerStore, OrderRepository, RegisterOutcome};
