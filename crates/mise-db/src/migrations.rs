//! # Schema
//!
//! Embedded SQL migrations plus the startup checks run against them.
//!
//! ```text
//! migrations/sqlite/
//! ├── 001_catalog.sql   items, composite links, products, modifiers, bundles
//! ├── 002_ledger.sql    stock_records, order_reservations, batches, movements, anomalies
//! └── 003_orders.sql    orders, order_items, cancelled_order_items
//! ```
//!
//! The ledger is unusable without its tables, so a database opened with
//! migrations disabled is still checked with [`missing_tables`] before any
//! order is accepted. New files take the next sequence number; applied files
//! are never edited. Decimals are stored as TEXT and parsed with rust_decimal.

use std::collections::BTreeSet;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Tables the catalog, ledger and order repositories read and write.
pub const REQUIRED_TABLES: &[&str] = &[
    "items",
    "composite_item_components",
    "products",
    "product_variants",
    "product_ingredients",
    "product_modifiers",
    "product_accessories",
    "bundles",
    "bundle_items",
    "stock_records",
    "order_reservations",
    "ledger_batches",
    "inventory_movements",
    "ledger_anomalies",
    "orders",
    "order_items",
    "cancelled_order_items",
];

/// Embedded versions against what the database has recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Versions compiled into this binary.
    pub available: Vec<i64>,
    /// Versions recorded as successfully applied.
    pub applied: Vec<i64>,
}

impl MigrationStatus {
    /// Embedded versions the database has not applied.
    pub fn pending(&self) -> Vec<i64> {
        self.available
            .iter()
            .copied()
            .filter(|v| !self.applied.contains(v))
            .collect()
    }

    /// Applied versions this binary does not know (a newer build ran here).
    pub fn unknown(&self) -> Vec<i64> {
        self.applied
            .iter()
            .copied()
            .filter(|v| !self.available.contains(v))
            .collect()
    }

    pub fn is_current(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn latest_applied(&self) -> Option<i64> {
        self.applied.iter().copied().max()
    }
}

/// Applies pending migrations in version order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(available = MIGRATOR.iter().count(), "Checking for pending migrations");
    MIGRATOR.run(pool).await?;
    info!("All migrations applied");
    Ok(())
}

/// Reads which embedded migrations the database has applied.
///
/// A database sqlx has never touched reports nothing applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let available: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();

    let applied = if table_names(pool).await?.contains("_sqlx_migrations") {
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version")
            .fetch_all(pool)
            .await?
    } else {
        Vec::new()
    };

    let status = MigrationStatus { available, applied };
    let unknown = status.unknown();
    if !unknown.is_empty() {
        warn!(?unknown, "Database has migrations this build does not know");
    }
    Ok(status)
}

/// Entries of [`REQUIRED_TABLES`] absent from the database.
pub async fn missing_tables(pool: &SqlitePool) -> DbResult<Vec<&'static str>> {
    let present = table_names(pool).await?;
    Ok(REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|t| !present.contains(*t))
        .collect())
}

async fn table_names(pool: &SqlitePool) -> DbResult<BTreeSet<String>> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
        .fetch_all(pool)
        .await?;
    Ok(names.into_iter().collect())
}
