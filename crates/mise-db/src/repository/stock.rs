//! # Stock Repository
//!
//! Rows owned by the reservation ledger: stock records, per-order
//! reservations, batch headers, movements and anomalies.
//!
//! Every write here is a free function taking `&mut SqliteConnection`.
//! The ledger calls them inside one transaction while holding its item
//! locks; nothing else should write these tables.
//!
//! ## Row Shape
//! ```text
//! stock_records          (tenant, branch '', item) → quantity, reserved
//! order_reservations     (order, tenant, branch, item) → held quantity
//! ledger_batches         one header per ledger call
//! inventory_movements    before/after per touched row
//! ledger_anomalies       clamped mutations
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};

use mise_core::{InventoryMovement, LedgerAnomaly, MovementKind, StockKey, StockRecord};

use super::{branch_from_key, branch_key, parse_decimal};
use crate::error::DbResult;

/// Quantity an order currently holds on one item, in storage units.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldReservation {
    pub item_id: String,
    pub quantity: Decimal,
}

/// Read side of the ledger tables.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Gets a single stock row.
    pub async fn get(&self, key: &StockKey) -> DbResult<Option<StockRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, key).await
    }

    /// All stock rows for a tenant and branch.
    pub async fn snapshot(&self, tenant_id: &str, branch_id: Option<&str>) -> DbResult<Vec<StockRecord>> {
        sqlx::query_as::<_, StockRow>(
            r#"
            SELECT tenant_id, branch_id, item_id, quantity, reserved_quantity, updated_at
            FROM stock_records
            WHERE tenant_id = ?1 AND branch_id = ?2
            ORDER BY item_id
            "#,
        )
        .bind(tenant_id)
        .bind(branch_key(branch_id))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(StockRow::into_record)
        .collect()
    }

    /// What an order still holds, per item.
    pub async fn reservations_for_order(
        &self,
        order_ref: &str,
        tenant_id: &str,
        branch_id: Option<&str>,
    ) -> DbResult<Vec<HeldReservation>> {
        let mut conn = self.pool.acquire().await?;
        held_for_order(&mut conn, order_ref, tenant_id, branch_id).await
    }

    /// Movement history for one stock row, oldest first.
    pub async fn movements_for_item(&self, key: &StockKey) -> DbResult<Vec<InventoryMovement>> {
        sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, batch_id, tenant_id, branch_id, item_id, kind, order_ref,
                   quantity_before, quantity_after, reserved_before, reserved_after,
                   reason, created_at
            FROM inventory_movements
            WHERE tenant_id = ?1 AND branch_id = ?2 AND item_id = ?3
            ORDER BY created_at, rowid
            "#,
        )
        .bind(&key.tenant_id)
        .bind(branch_key(key.branch_id.as_deref()))
        .bind(&key.item_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MovementRow::into_movement)
        .collect()
    }

    /// Movement history for one order, oldest first.
    pub async fn movements_for_order(&self, order_ref: &str) -> DbResult<Vec<InventoryMovement>> {
        sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, batch_id, tenant_id, branch_id, item_id, kind, order_ref,
                   quantity_before, quantity_after, reserved_before, reserved_after,
                   reason, created_at
            FROM inventory_movements
            WHERE order_ref = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(order_ref)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MovementRow::into_movement)
        .collect()
    }

    /// Anomalies recorded for a tenant, newest first.
    pub async fn anomalies(&self, tenant_id: &str) -> DbResult<Vec<LedgerAnomaly>> {
        sqlx::query_as::<_, AnomalyRow>(
            r#"
            SELECT id, tenant_id, branch_id, item_id, order_ref, operation,
                   expected, applied, note, created_at
            FROM ledger_anomalies
            WHERE tenant_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AnomalyRow::into_anomaly)
        .collect()
    }

    /// Count of stock rows violating `0 <= reserved <= quantity`.
    ///
    /// The CHECK constraints cover the lower bounds; the upper bound is
    /// only maintained by the ledger, so this is what tests and health
    /// checks look at.
    pub async fn count_inconsistent(&self) -> DbResult<i64> {
        let rows = sqlx::query_as::<_, StockRow>(
            "SELECT tenant_id, branch_id, item_id, quantity, reserved_quantity, updated_at FROM stock_records",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut bad = 0;
        for row in rows {
            if !row.into_record()?.is_consistent() {
                bad += 1;
            }
        }
        Ok(bad)
    }
}

// =============================================================================
// Transactional Writes
// =============================================================================

/// Inserts the batch header. Being the first write of a ledger
/// transaction, this is where SQLite hands out the write lock.
pub async fn insert_batch(
    conn: &mut SqliteConnection,
    batch_id: &str,
    tenant_id: &str,
    branch_id: Option<&str>,
    operation: &str,
    order_ref: Option<&str>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_batches (id, tenant_id, branch_id, operation, order_ref, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(batch_id)
    .bind(tenant_id)
    .bind(branch_key(branch_id))
    .bind(operation)
    .bind(order_ref)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

/// Reads one stock row on the given connection.
pub async fn fetch_record(conn: &mut SqliteConnection, key: &StockKey) -> DbResult<Option<StockRecord>> {
    sqlx::query_as::<_, StockRow>(
        r#"
        SELECT tenant_id, branch_id, item_id, quantity, reserved_quantity, updated_at
        FROM stock_records
        WHERE tenant_id = ?1 AND branch_id = ?2 AND item_id = ?3
        "#,
    )
    .bind(&key.tenant_id)
    .bind(branch_key(key.branch_id.as_deref()))
    .bind(&key.item_id)
    .fetch_optional(conn)
    .await?
    .map(StockRow::into_record)
    .transpose()
}

/// Reads a stock row, or a zeroed one if the item was never stocked.
pub async fn fetch_or_empty(conn: &mut SqliteConnection, key: &StockKey) -> DbResult<StockRecord> {
    Ok(fetch_record(conn, key).await?.unwrap_or_else(|| StockRecord {
        tenant_id: key.tenant_id.clone(),
        branch_id: key.branch_id.clone(),
        item_id: key.item_id.clone(),
        quantity: Decimal::ZERO,
        reserved_quantity: Decimal::ZERO,
        updated_at: Utc::now(),
    }))
}

/// Writes a stock row, creating it if needed.
pub async fn upsert_record(conn: &mut SqliteConnection, record: &StockRecord) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_records (tenant_id, branch_id, item_id, quantity, reserved_quantity, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (tenant_id, branch_id, item_id) DO UPDATE SET
            quantity = excluded.quantity,
            reserved_quantity = excluded.reserved_quantity,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.tenant_id)
    .bind(branch_key(record.branch_id.as_deref()))
    .bind(&record.item_id)
    .bind(record.quantity.normalize().to_string())
    .bind(record.reserved_quantity.normalize().to_string())
    .bind(record.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Quantity an order holds on one stock row (zero if none).
pub async fn held_quantity(conn: &mut SqliteConnection, order_ref: &str, key: &StockKey) -> DbResult<Decimal> {
    let held: Option<String> = sqlx::query_scalar(
        r#"
        SELECT quantity FROM order_reservations
        WHERE order_ref = ?1 AND tenant_id = ?2 AND branch_id = ?3 AND item_id = ?4
        "#,
    )
    .bind(order_ref)
    .bind(&key.tenant_id)
    .bind(branch_key(key.branch_id.as_deref()))
    .bind(&key.item_id)
    .fetch_optional(conn)
    .await?;

    match held {
        Some(q) => parse_decimal("order_reservations.quantity", &q),
        None => Ok(Decimal::ZERO),
    }
}

/// Sets what an order holds on one stock row; zero deletes the row.
pub async fn set_held_quantity(
    conn: &mut SqliteConnection,
    order_ref: &str,
    key: &StockKey,
    quantity: Decimal,
) -> DbResult<()> {
    if quantity <= Decimal::ZERO {
        sqlx::query(
            r#"
            DELETE FROM order_reservations
            WHERE order_ref = ?1 AND tenant_id = ?2 AND branch_id = ?3 AND item_id = ?4
            "#,
        )
        .bind(order_ref)
        .bind(&key.tenant_id)
        .bind(branch_key(key.branch_id.as_deref()))
        .bind(&key.item_id)
        .execute(conn)
        .await?;
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO order_reservations (order_ref, tenant_id, branch_id, item_id, quantity, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (order_ref, tenant_id, branch_id, item_id) DO UPDATE SET
            quantity = excluded.quantity,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(order_ref)
    .bind(&key.tenant_id)
    .bind(branch_key(key.branch_id.as_deref()))
    .bind(&key.item_id)
    .bind(quantity.normalize().to_string())
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

/// Everything an order holds in one tenant/branch.
pub async fn held_for_order(
    conn: &mut SqliteConnection,
    order_ref: &str,
    tenant_id: &str,
    branch_id: Option<&str>,
) -> DbResult<Vec<HeldReservation>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT item_id, quantity FROM order_reservations
        WHERE order_ref = ?1 AND tenant_id = ?2 AND branch_id = ?3
        ORDER BY item_id
        "#,
    )
    .bind(order_ref)
    .bind(tenant_id)
    .bind(branch_key(branch_id))
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|(item_id, quantity)| {
            Ok(HeldReservation {
                item_id,
                quantity: parse_decimal("order_reservations.quantity", &quantity)?,
            })
        })
        .collect()
}

pub async fn insert_movement(conn: &mut SqliteConnection, movement: &InventoryMovement) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, batch_id, tenant_id, branch_id, item_id, kind, order_ref,
            quantity_before, quantity_after, reserved_before, reserved_after,
            reason, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.batch_id)
    .bind(&movement.tenant_id)
    .bind(branch_key(movement.branch_id.as_deref()))
    .bind(&movement.item_id)
    .bind(movement.kind)
    .bind(&movement.order_ref)
    .bind(movement.quantity_before.normalize().to_string())
    .bind(movement.quantity_after.normalize().to_string())
    .bind(movement.reserved_before.normalize().to_string())
    .bind(movement.reserved_after.normalize().to_string())
    .bind(&movement.reason)
    .bind(movement.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_anomaly(conn: &mut SqliteConnection, anomaly: &LedgerAnomaly) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_anomalies (
            id, tenant_id, branch_id, item_id, order_ref, operation,
            expected, applied, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&anomaly.id)
    .bind(&anomaly.tenant_id)
    .bind(branch_key(anomaly.branch_id.as_deref()))
    .bind(&anomaly.item_id)
    .bind(&anomaly.order_ref)
    .bind(anomaly.operation)
    .bind(anomaly.expected.normalize().to_string())
    .bind(anomaly.applied.normalize().to_string())
    .bind(&anomaly.note)
    .bind(anomaly.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    tenant_id: String,
    branch_id: String,
    item_id: String,
    quantity: String,
    reserved_quantity: String,
    updated_at: DateTime<Utc>,
}

impl StockRow {
    fn into_record(self) -> DbResult<StockRecord> {
        Ok(StockRecord {
            quantity: parse_decimal("stock_records.quantity", &self.quantity)?,
            reserved_quantity: parse_decimal("stock_records.reserved_quantity", &self.reserved_quantity)?,
            tenant_id: self.tenant_id,
            branch_id: branch_from_key(self.branch_id),
            item_id: self.item_id,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: String,
    batch_id: String,
    tenant_id: String,
    branch_id: String,
    item_id: String,
    kind: MovementKind,
    order_ref: Option<String>,
    quantity_before: String,
    quantity_after: String,
    reserved_before: String,
    reserved_after: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl MovementRow {
    fn into_movement(self) -> DbResult<InventoryMovement> {
        Ok(InventoryMovement {
            quantity_before: parse_decimal("inventory_movements.quantity_before", &self.quantity_before)?,
            quantity_after: parse_decimal("inventory_movements.quantity_after", &self.quantity_after)?,
            reserved_before: parse_decimal("inventory_movements.reserved_before", &self.reserved_before)?,
            reserved_after: parse_decimal("inventory_movements.reserved_after", &self.reserved_after)?,
            id: self.id,
            batch_id: self.batch_id,
            tenant_id: self.tenant_id,
            branch_id: branch_from_key(self.branch_id),
            item_id: self.item_id,
            kind: self.kind,
            order_ref: self.order_ref,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AnomalyRow {
    id: String,
    tenant_id: String,
    branch_id: String,
    item_id: String,
    order_ref: Option<String>,
    operation: MovementKind,
    expected: String,
    applied: String,
    note: String,
    created_at: DateTime<Utc>,
}

impl AnomalyRow {
    fn into_anomaly(self) -> DbResult<LedgerAnomaly> {
        Ok(LedgerAnomaly {
            expected: parse_decimal("ledger_anomalies.expected", &self.expected)?,
            applied: parse_decimal("ledger_anomalies.applied", &self.applied)?,
            id: self.id,
            tenant_id: self.tenant_id,
            branch_id: branch_from_key(self.branch_id),
            item_id: self.item_id,
            order_ref: self.order_ref,
            operation: self.operation,
            note: self.note,
            created_at: self.created_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
