//! # Cancelled Item Repository
//!
//! The waste/return queue. One row per raw item released by a
//! cancellation, frozen at the reserved amount.
//!
//! ## Claiming
//! ```text
//! UPDATE ... SET decision = ? WHERE id = ? AND decision IS NULL
//!     rows_affected = 1  → this caller owns the decision
//!     rows_affected = 0  → someone else (a user or the sweeper) got there first
//! ```
//! The claim runs in the same transaction as the waste deduction, so a
//! decision is never recorded without its stock effect or vice versa.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use mise_core::{CancelledOrderItem, Unit, WasteDecision};

use super::parse_decimal;
use crate::error::DbResult;

/// Repository for the cancelled item queue.
#[derive(Debug, Clone)]
pub struct CancelledRepository {
    pool: SqlitePool,
}

impl CancelledRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CancelledRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<CancelledOrderItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Undecided rows for a tenant, oldest first.
    pub async fn list_pending(&self, tenant_id: &str) -> DbResult<Vec<CancelledOrderItem>> {
        sqlx::query_as::<_, CancelledRow>(
            r#"
            SELECT id, tenant_id, branch_id, order_id, order_item_id, item_id, item_name,
                   quantity, unit, storage_unit, decision, decided_by, decided_at, created_at
            FROM cancelled_order_items
            WHERE tenant_id = ?1 AND decision IS NULL
            ORDER BY created_at, rowid
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CancelledRow::into_item)
        .collect()
    }

    /// All rows created for an order.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<CancelledOrderItem>> {
        sqlx::query_as::<_, CancelledRow>(
            r#"
            SELECT id, tenant_id, branch_id, order_id, order_item_id, item_id, item_name,
                   quantity, unit, storage_unit, decision, decided_by, decided_at, created_at
            FROM cancelled_order_items
            WHERE order_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CancelledRow::into_item)
        .collect()
    }

    /// Undecided rows created before `cutoff`, across all tenants.
    pub async fn list_expired(&self, cutoff: DateTime<Utc>, limit: i64) -> DbResult<Vec<CancelledOrderItem>> {
        sqlx::query_as::<_, CancelledRow>(
            r#"
            SELECT id, tenant_id, branch_id, order_id, order_item_id, item_id, item_name,
                   quantity, unit, storage_unit, decision, decided_by, decided_at, created_at
            FROM cancelled_order_items
            WHERE decision IS NULL AND created_at < ?1
            ORDER BY created_at, rowid
            LIMIT ?2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CancelledRow::into_item)
        .collect()
    }
}

// =============================================================================
// Transactional Reads and Writes
// =============================================================================

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CancelledOrderItem>> {
    sqlx::query_as::<_, CancelledRow>(
        r#"
        SELECT id, tenant_id, branch_id, order_id, order_item_id, item_id, item_name,
               quantity, unit, storage_unit, decision, decided_by, decided_at, created_at
        FROM cancelled_order_items
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(CancelledRow::into_item)
    .transpose()
}

pub async fn insert(conn: &mut SqliteConnection, item: &CancelledOrderItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO cancelled_order_items (
            id, tenant_id, branch_id, order_id, order_item_id, item_id, item_name,
            quantity, unit, storage_unit, decision, decided_by, decided_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&item.id)
    .bind(&item.tenant_id)
    .bind(&item.branch_id)
    .bind(&item.order_id)
    .bind(&item.order_item_id)
    .bind(&item.item_id)
    .bind(&item.item_name)
    .bind(item.quantity.normalize().to_string())
    .bind(item.unit)
    .bind(item.storage_unit)
    .bind(item.decision)
    .bind(&item.decided_by)
    .bind(item.decided_at)
    .bind(item.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Records a decision if none exists yet. Returns whether this call won.
pub async fn claim(
    conn: &mut SqliteConnection,
    id: &str,
    decision: WasteDecision,
    decided_by: Option<&str>,
    decided_at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE cancelled_order_items
        SET decision = ?2, decided_by = ?3, decided_at = ?4
        WHERE id = ?1 AND decision IS NULL
        "#,
    )
    .bind(id)
    .bind(decision)
    .bind(decided_by)
    .bind(decided_at)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CancelledRow {
    id: String,
    tenant_id: String,
    branch_id: Option<String>,
    order_id: String,
    order_item_id: Option<String>,
    item_id: String,
    item_name: String,
    quantity: String,
    unit: Unit,
    storage_unit: Unit,
    decision: Option<WasteDecision>,
    decided_by: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl CancelledRow {
    fn into_item(self) -> DbResult<CancelledOrderItem> {
        Ok(CancelledOrderItem {
            quantity: parse_decimal("cancelled_order_items.quantity", &self.quantity)?,
            id: self.id,
            tenant_id: self.tenant_id,
            branch_id: self.branch_id,
            order_id: self.order_id,
            order_item_id: self.order_item_id,
            item_id: self.item_id,
            item_name: self.item_name,
            unit: self.unit,
            storage_unit: self.storage_unit,
            decision: self.decision,
            decided_by: self.decided_by,
            decided_at: self.decided_at,
            created_at: self.created_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
