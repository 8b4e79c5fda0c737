//! # Order Repository
//!
//! Orders and their lines. Each line carries the JSON snapshot of the bill
//! of materials it was reserved with, so completion and cancellation act on
//! exactly what was reserved even if the recipe changed since.
//!
//! Writes are free functions on `&mut SqliteConnection` so they can share a
//! transaction with the ledger.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use mise_core::{ModifierSelection, Order, OrderItem, OrderSource, OrderStatus, OrderType, PaymentStatus, Requirement};

use super::{from_json, parse_decimal, to_json};
use crate::error::{DbError, DbResult};

/// Repository for order reads.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id).await
    }

    /// Gets an order, failing with NotFound if it does not exist.
    pub async fn get_required(&self, id: &str) -> DbResult<Order> {
        self.get(id).await?.ok_or_else(|| DbError::not_found("Order", id))
    }

    /// Lines of an order in insertion order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, order_id).await
    }

    /// Orders of a tenant in a given status, oldest first.
    pub async fn list_by_status(&self, tenant_id: &str, status: OrderStatus) -> DbResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, tenant_id, branch_id, source, order_type, status, payment_status,
                   total_cents, paid_cents, notes, created_at, updated_at,
                   completed_at, cancelled_at
            FROM orders
            WHERE tenant_id = ?1 AND status = ?2
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderRow::into_order).collect())
    }
}

// =============================================================================
// Transactional Reads and Writes
// =============================================================================

pub async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT id, tenant_id, branch_id, source, order_type, status, payment_status,
               total_cents, paid_cents, notes, created_at, updated_at,
               completed_at, cancelled_at
        FROM orders
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(OrderRow::into_order))
}

pub async fn fetch_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    sqlx::query_as::<_, OrderItemRow>(
        r#"
        SELECT id, order_id, product_id, variant_id, bundle_id, name_snapshot, quantity,
               modifiers, unit_price_cents, line_total_cents, unit_cost_at_sale,
               requirements, created_at
        FROM order_items
        WHERE order_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(OrderItemRow::into_item)
    .collect()
}

pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(order_id = %order.id, total_cents = order.total_cents, "Inserting order");

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, tenant_id, branch_id, source, order_type, status, payment_status,
            total_cents, paid_cents, notes, created_at, updated_at,
            completed_at, cancelled_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&order.id)
    .bind(&order.tenant_id)
    .bind(&order.branch_id)
    .bind(order.source)
    .bind(order.order_type)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.total_cents)
    .bind(order.paid_cents)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.completed_at)
    .bind(order.cancelled_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Writes the mutable fields of an order back.
pub async fn update_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = ?2,
            payment_status = ?3,
            total_cents = ?4,
            paid_cents = ?5,
            notes = ?6,
            updated_at = ?7,
            completed_at = ?8,
            cancelled_at = ?9
        WHERE id = ?1
        "#,
    )
    .bind(&order.id)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.total_cents)
    .bind(order.paid_cents)
    .bind(&order.notes)
    .bind(order.updated_at)
    .bind(order.completed_at)
    .bind(order.cancelled_at)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Order", &order.id));
    }
    Ok(())
}

pub async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, product_id, variant_id, bundle_id, name_snapshot, quantity,
            modifiers, unit_price_cents, line_total_cents, unit_cost_at_sale,
            requirements, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&item.id)
    .bind(&item.order_id)
    .bind(&item.product_id)
    .bind(&item.variant_id)
    .bind(&item.bundle_id)
    .bind(&item.name_snapshot)
    .bind(item.quantity)
    .bind(to_json("order_items.modifiers", &item.modifiers)?)
    .bind(item.unit_price_cents)
    .bind(item.line_total_cents)
    .bind(item.unit_cost_at_sale.to_string())
    .bind(to_json("order_items.requirements", &item.requirements)?)
    .bind(item.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Writes a line's quantity, total and requirement snapshot back.
pub async fn update_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE order_items SET
            quantity = ?2,
            line_total_cents = ?3,
            requirements = ?4
        WHERE id = ?1
        "#,
    )
    .bind(&item.id)
    .bind(item.quantity)
    .bind(item.line_total_cents)
    .bind(to_json("order_items.requirements", &item.requirements)?)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("OrderItem", &item.id));
    }
    Ok(())
}

pub async fn delete_item(conn: &mut SqliteConnection, item_id: &str) -> DbResult<()> {
    sqlx::query("DELETE FROM order_items WHERE id = ?1")
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(())
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    tenant_id: String,
    branch_id: Option<String>,
    source: OrderSource,
    order_type: Option<OrderType>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    total_cents: i64,
    paid_cents: i64,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self) -> Order {
        Order {
            id: self.id,
            tenant_id: self.tenant_id,
            branch_id: self.branch_id,
            source: self.source,
            order_type: self.order_type,
            status: self.status,
            payment_status: self.payment_status,
            total_cents: self.total_cents,
            paid_cents: self.paid_cents,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            cancelled_at: self.cancelled_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: String,
    order_id: String,
    product_id: Option<String>,
    variant_id: Option<String>,
    bundle_id: Option<String>,
    name_snapshot: String,
    quantity: i64,
    modifiers: String,
    unit_price_cents: i64,
    line_total_cents: i64,
    unit_cost_at_sale: String,
    requirements: String,
    created_at: DateTime<Utc>,
}

impl OrderItemRow {
    fn into_item(self) -> DbResult<OrderItem> {
        let modifiers: Vec<ModifierSelection> = from_json("order_items.modifiers", &self.modifiers)?;
        let requirements: Vec<Requirement> = from_json("order_items.requirements", &self.requirements)?;

        Ok(OrderItem {
            unit_cost_at_sale: parse_decimal("order_items.unit_cost_at_sale", &self.unit_cost_at_sale)?,
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            bundle_id: self.bundle_id,
            name_snapshot: self.name_snapshot,
            quantity: self.quantity,
            modifiers,
            unit_price_cents: self.unit_price_cents,
            line_total_cents: self.line_total_cents,
            requirements,
            created_at: self.created_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
