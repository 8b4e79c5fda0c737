//! # mise-db: Database Layer for Mise POS
//!
//! SQLite persistence for the catalog, the reservation ledger, orders and
//! the waste/return queue, using sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mise POS Data Flow                               │
//! │                                                                         │
//! │  OrderCoordinator / Ledger / Sweeper (mise-engine)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     mise-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ CatalogRepo    │   │ 001_catalog  │  │   │
//! │  │   │ SqlitePool    │◄───│ StockRepo      │   │ 002_ledger   │  │   │
//! │  │   │ Connection    │    │ OrderRepo      │   │ 003_orders   │  │   │
//! │  │   │ Management    │    │ CancelledRepo  │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations and transactional writes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mise_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("mise.db")).await?;
//! let data = db.catalog().load_data(tenant_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cancelled::CancelledRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::order::OrderRepository;
pub use repository::stock::{HeldReservation, StockRepository};

/// Transaction type handed to the transactional repository functions.
pub type SqliteTx<'c> = sqlx::Transaction<'c, sqlx::Sqlite>;
