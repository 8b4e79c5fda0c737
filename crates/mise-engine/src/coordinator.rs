//! # Order Lifecycle Coordinator
//!
//! Drives orders through their states and issues the matching ledger calls.
//!
//! ```text
//!            start            complete          pick_up (delivery partner)
//! pending ─────────► in_progress ─────► completed ─────► picked_up
//!    │                 │    │              │                 │
//!    │ cancel   cancel │    │ reject       └──── refund ─────┘
//!    ▼                 ▼    ▼                       ▼
//! cancelled ◄──────────┘  rejected               refunded
//! ```
//!
//! | Transition          | Ledger effect                                 |
//! |---------------------|-----------------------------------------------|
//! | create              | reserve (spawned task, ticket returned)       |
//! | complete            | consume; failure logged, status still flips   |
//! | cancel / reject     | release + one cancelled item per raw item     |
//! | edit                | reserve additions, release reductions         |
//! | start/refund/pickup | none                                          |
//!
//! Every state change runs inside a ledger batch that also holds the locks
//! for the order's items, so a transition and the stock effect it implies
//! commit together or not at all. The order row is re-read after the locks
//! are taken; two transitions on the same order therefore see each other.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mise_core::availability;
use mise_core::bom::{self, resolve_line, scale_requirements, sum_requirements};
use mise_core::lifecycle::{self, LedgerEffect};
use mise_core::validation::{validate_payment_amount, validate_quantity};
use mise_core::{
    CancelledOrderItem, Catalog, FulfillabilityReport, LedgerAnomaly, LineRequest, Money, MovementKind, Order, OrderItem,
    OrderSource, OrderStatus, OrderType, PaymentStatus, Requirement, Unverifiable, ValidationError,
    WasteDecision,
};
use mise_db::repository::{cancelled, order, stock};
use mise_db::Database;

use crate::error::{EngineError, EngineResult};
use crate::ledger::{Ledger, LedgerTx};

/// Attempts to lock an order whose lines change under us.
const MAX_OPEN_ATTEMPTS: usize = 3;

// =============================================================================
// Requests and Results
// =============================================================================

/// A new order as submitted by the POS or a delivery partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub source: OrderSource,
    pub order_type: Option<OrderType>,
    /// Scheduled orders start as `pending`.
    #[serde(default)]
    pub scheduled: bool,
    pub lines: Vec<LineRequest>,
    pub notes: Option<String>,
}

/// Handle on the reservation spawned by `create_order`.
///
/// Dropping it does not cancel the reservation.
#[derive(Debug)]
pub struct ReservationTicket {
    order_id: String,
    handle: JoinHandle<EngineResult<()>>,
}

impl ReservationTicket {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Waits for the reservation to land.
    pub async fn wait(self) -> EngineResult<()> {
        self.handle
            .await
            .map_err(|e| EngineError::Internal(format!("reservation task for {} failed: {e}", self.order_id)))?
    }
}

#[derive(Debug)]
pub struct CreatedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub reservation: ReservationTicket,
}

/// Result of a cancel, reject or edit.
#[derive(Debug, Clone)]
pub struct OrderChange {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Waste/return rows created by the change.
    pub cancelled_items: Vec<CancelledOrderItem>,
}

/// Changes to an in-progress order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderEdit {
    #[serde(default)]
    pub add: Vec<LineRequest>,
    /// Line ids to drop.
    #[serde(default)]
    pub remove: Vec<String>,
    #[serde(default)]
    pub set_quantity: Vec<QuantityChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityChange {
    pub line_id: String,
    /// New line quantity; 0 removes the line.
    pub quantity: i64,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    pub expired: usize,
    /// Resolved by someone else between listing and claiming.
    pub skipped: usize,
    pub failed: usize,
}

// =============================================================================
// Coordinator
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrderCoordinator {
    ledger: Ledger,
    db: Database,
    waste_expiry: chrono::Duration,
    /// Orders whose create-time reservation has not finished.
    in_flight: Arc<DashSet<String>>,
    reservation_failures: Arc<AtomicU64>,
    consume_failures: Arc<AtomicU64>,
}

impl OrderCoordinator {
    pub fn new(ledger: Ledger, waste_expiry: chrono::Duration) -> Self {
        OrderCoordinator {
            db: ledger.database().clone(),
            ledger,
            waste_expiry,
            in_flight: Arc::new(DashSet::new()),
            reservation_failures: Arc::new(AtomicU64::new(0)),
            consume_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Create-time reservations that failed since startup.
    pub fn reservation_failures(&self) -> u64 {
        self.reservation_failures.load(Ordering::Relaxed)
    }

    /// Completions whose stock deduction failed since startup.
    pub fn consume_failures(&self) -> u64 {
        self.consume_failures.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Availability
    // =========================================================================

    /// Read-only check of `lines` against current free stock.
    pub async fn check_fulfillability(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
        lines: &[LineRequest],
        order_type: Option<OrderType>,
    ) -> EngineResult<FulfillabilityReport> {
        let catalog = self.catalog(tenant_id).await?;
        let levels = self.ledger.stock_levels(tenant_id, branch_id).await?;
        Ok(availability::check_fulfillability(&catalog, &levels, lines, order_type)?)
    }

    /// How many of each active product could be made right now.
    pub async fn max_orderable(&self, tenant_id: &str, branch_id: Option<&str>) -> EngineResult<BTreeMap<String, i64>> {
        let catalog = self.catalog(tenant_id).await?;
        let levels = self.ledger.stock_levels(tenant_id, branch_id).await?;
        Ok(availability::max_orderable(&catalog, &levels))
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Checks stock, persists the order and dispatches its reservation.
    ///
    /// Nothing is written when the check fails. The reservation runs on its
    /// own task; its failure is counted, logged and recorded as an anomaly,
    /// and surfaces through the returned ticket as `ReservationConflict`.
    pub async fn create_order(&self, request: NewOrder) -> EngineResult<CreatedOrder> {
        if request.lines.is_empty() {
            return Err(ValidationError::Required { field: "lines".into() }.into());
        }

        let catalog = self.catalog(&request.tenant_id).await?;
        let levels = self
            .ledger
            .stock_levels(&request.tenant_id, request.branch_id.as_deref())
            .await?;

        let report = availability::check_fulfillability(&catalog, &levels, &request.lines, request.order_type)?;
        if !report.unverifiable.is_empty() {
            return Err(EngineError::Unverifiable {
                problems: report.unverifiable,
            });
        }
        if !report.shortages.is_empty() {
            debug!(
                tenant_id = %request.tenant_id,
                shortages = report.shortages.len(),
                "Order refused at creation"
            );
            return Err(EngineError::InsufficientInventory {
                shortages: report.shortages,
            });
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();
        let items = request
            .lines
            .iter()
            .map(|line| build_item(&catalog, &order_id, line, request.order_type, now))
            .collect::<EngineResult<Vec<_>>>()?;

        let total = Money::try_sum(items.iter().map(OrderItem::line_total))?;
        let order = Order {
            id: order_id,
            tenant_id: request.tenant_id,
            branch_id: request.branch_id,
            source: request.source,
            order_type: request.order_type,
            status: lifecycle::initial_status(request.scheduled),
            payment_status: PaymentStatus::from_amounts(total, Money::zero()),
            total_cents: total.cents(),
            paid_cents: 0,
            notes: request.notes,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
        };

        let mut tx = self.db.pool().begin().await?;
        order::insert_order(&mut tx, &order).await?;
        for item in &items {
            order::insert_item(&mut tx, item).await?;
        }
        tx.commit().await?;

        info!(
            order_id = %order.id,
            tenant_id = %order.tenant_id,
            status = %order.status,
            lines = items.len(),
            total = %total,
            "Order created"
        );

        let reservation = self.spawn_reservation(&order);
        Ok(CreatedOrder {
            order,
            items,
            reservation,
        })
    }

    fn spawn_reservation(&self, order: &Order) -> ReservationTicket {
        let coordinator = self.clone();
        let order = order.clone();
        let order_id = order.id.clone();
        self.in_flight.insert(order_id.clone());

        let handle = tokio::spawn(async move {
            let result = coordinator.reserve_for_order(&order.id).await;
            let result = match result {
                Ok(()) => Ok(()),
                Err(err) => {
                    coordinator.record_reservation_failure(&order, &err).await;
                    Err(EngineError::ReservationConflict {
                        order_id: order.id.clone(),
                        reason: err.to_string(),
                    })
                }
            };
            coordinator.in_flight.remove(&order.id);
            result
        });

        ReservationTicket { order_id, handle }
    }

    /// Reserves the order's persisted lines, unless it already left the
    /// states that hold stock.
    async fn reserve_for_order(&self, order_id: &str) -> EngineResult<()> {
        self.ledger
            .bounded("reserve", async {
                let (mut tx, order, items) = self.open(order_id, "reserve", true, &[]).await?;
                if !order.status.holds_reservation() {
                    debug!(order_id, status = %order.status, "Order no longer holds stock; reservation skipped");
                    return Ok(());
                }
                tx.reserve(&order_requirements(&items), order_id).await?;
                tx.commit().await?;
                Ok(())
            })
            .await
    }

    async fn record_reservation_failure(&self, order: &Order, err: &EngineError) {
        self.reservation_failures.fetch_add(1, Ordering::Relaxed);

        let requirements = match self.db.orders().items(&order.id).await {
            Ok(items) => order_requirements(&items),
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Could not load lines of failed reservation");
                Vec::new()
            }
        };
        let item_ids: Vec<&str> = requirements.iter().map(|r| r.item_id.as_str()).collect();
        error!(
            order_id = %order.id,
            tenant_id = %order.tenant_id,
            items = ?item_ids,
            error = %err,
            "Reservation failed after order creation"
        );

        let mut conn = match self.db.pool().acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Could not record reservation failure");
                return;
            }
        };
        let now = Utc::now();
        for requirement in &requirements {
            let anomaly = LedgerAnomaly {
                id: Uuid::new_v4().to_string(),
                tenant_id: order.tenant_id.clone(),
                branch_id: order.branch_id.clone(),
                item_id: requirement.item_id.clone(),
                order_ref: Some(order.id.clone()),
                operation: MovementKind::Reserve,
                expected: requirement.storage_quantity().unwrap_or(requirement.quantity),
                applied: Decimal::ZERO,
                note: format!("reservation failed: {err}"),
                created_at: now,
            };
            if let Err(e) = stock::insert_anomaly(&mut conn, &anomaly).await {
                error!(order_id = %order.id, error = %e, "Could not record reservation failure");
            }
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `pending → in_progress` for scheduled orders.
    pub async fn start(&self, order_id: &str) -> EngineResult<Order> {
        self.transition(order_id, OrderStatus::InProgress, "start").await
    }

    /// Consumes the order's stock and marks it completed.
    ///
    /// A failed consumption never blocks the kitchen: it is logged and
    /// counted, and the order completes without a stock deduction.
    pub async fn complete(&self, order_id: &str) -> EngineResult<Order> {
        let consumed = self
            .ledger
            .bounded("complete", async {
                let (mut tx, mut order, items) = self.open(order_id, "consume", true, &[]).await?;
                let effect = lifecycle::plan_transition(&order, OrderStatus::Completed)?;
                if effect == LedgerEffect::Consume {
                    tx.consume(&order_requirements(&items), order_id).await?;
                }
                apply_status(&mut order, OrderStatus::Completed, Utc::now());
                order::update_order(tx.conn(), &order).await?;
                tx.commit().await?;
                Ok(order)
            })
            .await;

        match consumed {
            Ok(order) => {
                info!(order_id, "Order completed");
                Ok(order)
            }
            Err(err @ (EngineError::InvalidTransition { .. } | EngineError::OrderNotFound(_))) => Err(err),
            Err(err) => {
                self.consume_failures.fetch_add(1, Ordering::Relaxed);
                error!(order_id, error = %err, "Consumption failed; completing without stock deduction");
                self.transition(order_id, OrderStatus::Completed, "complete").await
            }
        }
    }

    /// Releases the order's hold and queues its ingredients for a waste decision.
    pub async fn cancel(&self, order_id: &str, reason: &str) -> EngineResult<OrderChange> {
        self.release_and_close(order_id, OrderStatus::Cancelled, reason).await
    }

    /// Kitchen refusal of an in-progress order. Same stock effect as cancel.
    pub async fn reject(&self, order_id: &str, reason: &str) -> EngineResult<OrderChange> {
        self.release_and_close(order_id, OrderStatus::Rejected, reason).await
    }

    pub async fn refund(&self, order_id: &str) -> EngineResult<Order> {
        self.transition(order_id, OrderStatus::Refunded, "refund").await
    }

    /// Handover to a delivery partner's courier.
    pub async fn pick_up(&self, order_id: &str) -> EngineResult<Order> {
        self.transition(order_id, OrderStatus::PickedUp, "pick_up").await
    }

    async fn release_and_close(&self, order_id: &str, to: OrderStatus, reason: &str) -> EngineResult<OrderChange> {
        let operation = if to == OrderStatus::Rejected { "reject" } else { "cancel" };

        let change = self
            .ledger
            .bounded(operation, async {
                let (mut tx, mut order, items) = self.open(order_id, operation, true, &[]).await?;
                let effect = lifecycle::plan_transition(&order, to)?;
                let now = Utc::now();

                let mut cancelled_items = Vec::new();
                if effect == LedgerEffect::Release {
                    for item in &items {
                        let released = tx.release(&item.requirements, order_id, reason).await?;
                        for requirement in &released {
                            let record = cancelled_item_record(&order, Some(&item.id), requirement, now);
                            cancelled::insert(tx.conn(), &record).await?;
                            cancelled_items.push(record);
                        }
                    }
                }

                apply_status(&mut order, to, now);
                order::update_order(tx.conn(), &order).await?;
                tx.commit().await?;

                Ok(OrderChange {
                    order,
                    items,
                    cancelled_items,
                })
            })
            .await?;

        info!(
            order_id,
            status = %to,
            cancelled_items = change.cancelled_items.len(),
            "Order closed"
        );
        Ok(change)
    }

    /// Status-only transition.
    async fn transition(&self, order_id: &str, to: OrderStatus, operation: &str) -> EngineResult<Order> {
        let order = self
            .ledger
            .bounded(operation, async {
                let (mut tx, mut order, _) = self.open(order_id, operation, false, &[]).await?;
                lifecycle::plan_transition(&order, to)?;
                apply_status(&mut order, to, Utc::now());
                order::update_order(tx.conn(), &order).await?;
                tx.commit().await?;
                Ok(order)
            })
            .await?;

        info!(order_id, status = %to, "Order status changed");
        Ok(order)
    }

    // =========================================================================
    // Edit
    // =========================================================================

    /// Adds, removes or resizes lines of an in-progress order.
    ///
    /// Reductions are applied first and release stock; additions then
    /// reserve synchronously, and any shortage refuses the whole edit.
    pub async fn edit_order(&self, order_id: &str, edit: OrderEdit) -> EngineResult<OrderChange> {
        if self.in_flight.contains(order_id) {
            return Err(EngineError::ReservationConflict {
                order_id: order_id.to_string(),
                reason: "initial reservation still in progress".into(),
            });
        }

        let current = self
            .db
            .orders()
            .get(order_id)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;
        lifecycle::ensure_editable(&current)?;

        let catalog = self.catalog(&current.tenant_id).await?;
        let now = Utc::now();
        let additions = edit
            .add
            .iter()
            .map(|line| build_item(&catalog, order_id, line, current.order_type, now))
            .collect::<EngineResult<Vec<_>>>()?;
        let added_ids: Vec<String> = additions
            .iter()
            .flat_map(|item| item.requirements.iter().map(|r| r.item_id.clone()))
            .collect();

        let change = self
            .ledger
            .bounded("edit", async {
                let (mut tx, mut order, items) = self.open(order_id, "edit", true, &added_ids).await?;
                lifecycle::ensure_editable(&order)?;

                let mut lines: Vec<OrderItem> = items.clone();
                let mut cancelled_items = Vec::new();

                // Reductions
                let mut resized: Vec<(String, i64)> = edit.remove.iter().map(|id| (id.clone(), 0)).collect();
                resized.extend(edit.set_quantity.iter().map(|c| (c.line_id.clone(), c.quantity)));

                for (line_id, quantity) in resized {
                    if quantity != 0 {
                        validate_quantity(quantity)?;
                    }
                    let index = lines
                        .iter()
                        .position(|l| l.id == line_id)
                        .ok_or_else(|| EngineError::LineNotFound {
                            order_id: order_id.to_string(),
                            line_id: line_id.clone(),
                        })?;
                    let line = &lines[index];

                    if quantity < line.quantity {
                        let reduction = scale_requirements(&line.requirements, line.quantity - quantity, line.quantity);
                        let released = tx.release(&reduction, order_id, "order edited").await?;
                        for requirement in &released {
                            let record = cancelled_item_record(&order, Some(&line.id), requirement, now);
                            cancelled::insert(tx.conn(), &record).await?;
                            cancelled_items.push(record);
                        }
                    } else if quantity > line.quantity {
                        let increase = scale_requirements(&line.requirements, quantity - line.quantity, line.quantity);
                        tx.reserve(&increase, order_id).await?;
                    }

                    if quantity == 0 {
                        order::delete_item(tx.conn(), &line_id).await?;
                        lines.remove(index);
                    } else if quantity != line.quantity {
                        let mut updated = line.clone();
                        updated.requirements = scale_requirements(&line.requirements, quantity, line.quantity);
                        updated.line_total_cents = Money::from_cents(line.unit_price_cents)
                            .multiply_quantity(quantity)?
                            .cents();
                        updated.quantity = quantity;
                        order::update_item(tx.conn(), &updated).await?;
                        lines[index] = updated;
                    }
                }

                // Additions
                for item in &additions {
                    tx.reserve(&item.requirements, order_id).await?;
                    order::insert_item(tx.conn(), item).await?;
                    lines.push(item.clone());
                }

                let total = Money::try_sum(lines.iter().map(OrderItem::line_total))?;
                order.total_cents = total.cents();
                order.payment_status = PaymentStatus::from_amounts(total, order.paid());
                order.updated_at = now;
                order::update_order(tx.conn(), &order).await?;
                tx.commit().await?;

                Ok(OrderChange {
                    order,
                    items: lines,
                    cancelled_items,
                })
            })
            .await?;

        info!(
            order_id,
            total_cents = change.order.total_cents,
            payment_status = ?change.order.payment_status,
            "Order edited"
        );
        Ok(change)
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// Adds a payment; the order becomes `paid` once it covers the total.
    pub async fn record_payment(&self, order_id: &str, amount_cents: i64) -> EngineResult<Order> {
        validate_payment_amount(amount_cents)?;

        self.ledger
            .bounded("payment", async {
                let (mut tx, mut order, _) = self.open(order_id, "payment", false, &[]).await?;
                if matches!(
                    order.status,
                    OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Refunded
                ) {
                    return Err(ValidationError::Conflict {
                        field: "status".into(),
                        reason: format!("cannot take payment on a {} order", order.status),
                    }
                    .into());
                }

                order.paid_cents = order.paid_cents.checked_add(amount_cents).ok_or_else(|| {
                    ValidationError::OutOfRange {
                        field: "paid amount".into(),
                        min: 0,
                        max: i64::MAX,
                    }
                })?;
                order.payment_status = PaymentStatus::from_amounts(order.total(), order.paid());
                order.updated_at = Utc::now();
                order::update_order(tx.conn(), &order).await?;
                tx.commit().await?;

                info!(order_id, amount_cents, payment_status = ?order.payment_status, "Payment recorded");
                Ok(order)
            })
            .await
    }

    // =========================================================================
    // Waste / Return Decisions
    // =========================================================================

    /// Undecided cancelled items for a tenant and branch, oldest first.
    pub async fn list_pending_waste_decisions(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
    ) -> EngineResult<Vec<CancelledOrderItem>> {
        Ok(self
            .db
            .cancelled()
            .list_pending(tenant_id)
            .await?
            .into_iter()
            .filter(|item| item.branch_id.as_deref() == branch_id)
            .collect())
    }

    /// Records a decision exactly once. `Waste` deducts the frozen amount
    /// from on-hand stock in the same transaction; `Return` touches nothing.
    pub async fn resolve_waste_decision(
        &self,
        cancelled_id: &str,
        decision: WasteDecision,
        decided_by: Option<&str>,
    ) -> EngineResult<CancelledOrderItem> {
        let item = self
            .db
            .cancelled()
            .get(cancelled_id)
            .await?
            .ok_or_else(|| EngineError::CancelledItemNotFound(cancelled_id.to_string()))?;
        if !item.is_pending() {
            return Err(EngineError::AlreadyResolved(cancelled_id.to_string()));
        }

        let now = Utc::now();
        let operation = match decision {
            WasteDecision::Waste => "waste",
            WasteDecision::Return => "return",
        };

        self.ledger
            .bounded(operation, async {
                let mut tx = self
                    .ledger
                    .begin(
                        &item.tenant_id,
                        item.branch_id.as_deref(),
                        [item.item_id.as_str()],
                        operation,
                        Some(&item.order_id),
                    )
                    .await?;

                if !cancelled::claim(tx.conn(), cancelled_id, decision, decided_by, now).await? {
                    return Err(EngineError::AlreadyResolved(cancelled_id.to_string()));
                }
                if decision == WasteDecision::Waste {
                    tx.deduct_waste(&[item.as_requirement()], Some(&item.order_id), "cancelled item wasted")
                        .await?;
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(
            cancelled_id,
            order_id = %item.order_id,
            item_id = %item.item_id,
            decision = %decision,
            decided_by = ?decided_by,
            "Waste decision recorded"
        );

        Ok(CancelledOrderItem {
            decision: Some(decision),
            decided_by: decided_by.map(str::to_string),
            decided_at: Some(now),
            ..item
        })
    }

    /// Resolves as waste every pending item older than the expiry window.
    pub async fn auto_expire(&self, now: DateTime<Utc>, limit: i64) -> EngineResult<ExpiryReport> {
        let cutoff = now - self.waste_expiry;
        let expired = self.db.cancelled().list_expired(cutoff, limit).await?;

        let mut report = ExpiryReport::default();
        for item in expired {
            match self.resolve_waste_decision(&item.id, WasteDecision::Waste, None).await {
                Ok(_) => report.expired += 1,
                Err(EngineError::AlreadyResolved(_)) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(cancelled_id = %item.id, error = %err, "Auto-expiry failed");
                }
            }
        }

        if report.expired > 0 || report.failed > 0 {
            info!(
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Waste decisions auto-expired"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn catalog(&self, tenant_id: &str) -> EngineResult<Catalog> {
        let data = self.db.catalog().load_data(tenant_id).await?;
        Ok(Catalog::new(tenant_id, data)?)
    }

    /// Opens a ledger batch for an order and reads it under the batch.
    ///
    /// With `lock_lines`, the batch holds the keys of every item on the
    /// order plus `extra_items`. If the lines changed between the unlocked
    /// read and the lock, the batch is reopened.
    async fn open(
        &self,
        order_id: &str,
        operation: &str,
        lock_lines: bool,
        extra_items: &[String],
    ) -> EngineResult<(LedgerTx, Order, Vec<OrderItem>)> {
        for _ in 0..MAX_OPEN_ATTEMPTS {
            let order = self
                .db
                .orders()
                .get(order_id)
                .await?
                .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

            let mut keys: BTreeSet<String> = extra_items.iter().cloned().collect();
            if lock_lines {
                keys.extend(line_item_ids(&self.db.orders().items(order_id).await?));
            }

            let mut tx = self
                .ledger
                .begin(
                    &order.tenant_id,
                    order.branch_id.as_deref(),
                    keys.iter().map(String::as_str),
                    operation,
                    Some(order_id),
                )
                .await?;

            let order = order::fetch_order(tx.conn(), order_id)
                .await?
                .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;
            let items = order::fetch_items(tx.conn(), order_id).await?;

            if !lock_lines || line_item_ids(&items).is_subset(&keys) {
                return Ok((tx, order, items));
            }
            debug!(order_id, operation, "Order lines changed before lock; retrying");
        }

        Err(EngineError::ReservationConflict {
            order_id: order_id.to_string(),
            reason: "order lines kept changing".into(),
        })
    }
}

// =============================================================================
// Free Functions
// =============================================================================

/// Builds an order line with its price, cost and requirement snapshot.
fn build_item(
    catalog: &Catalog,
    order_id: &str,
    line: &LineRequest,
    order_type: Option<OrderType>,
    now: DateTime<Utc>,
) -> EngineResult<OrderItem> {
    let resolved = resolve_line(catalog, line, order_type)?;
    if !resolved.missing_recipes.is_empty() {
        return Err(EngineError::Unverifiable {
            problems: resolved
                .missing_recipes
                .into_iter()
                .map(|m| Unverifiable::UnresolvableRecipe {
                    product_id: m.product_id,
                    variant_id: m.variant_id,
                })
                .collect(),
        });
    }

    let unit_price = bom::unit_price(catalog, line)?;
    Ok(OrderItem {
        id: Uuid::new_v4().to_string(),
        order_id: order_id.to_string(),
        product_id: line.product_id.clone(),
        variant_id: line.variant_id.clone(),
        bundle_id: line.bundle_id.clone(),
        name_snapshot: line_name(catalog, line),
        quantity: line.quantity,
        modifiers: line.modifiers.clone(),
        unit_price_cents: unit_price.cents(),
        line_total_cents: unit_price.multiply_quantity(line.quantity)?.cents(),
        unit_cost_at_sale: resolved.ingredient_cost / Decimal::from(line.quantity),
        requirements: resolved.requirements,
        created_at: now,
    })
}

fn line_name(catalog: &Catalog, line: &LineRequest) -> String {
    if let Some(bundle_id) = &line.bundle_id {
        return catalog
            .bundle(bundle_id)
            .map(|b| b.name.clone())
            .unwrap_or_else(|| bundle_id.clone());
    }

    let product_id = line.product_id.as_deref().unwrap_or_default();
    let product = catalog
        .product(product_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| product_id.to_string());
    match line.variant_id.as_deref().and_then(|id| catalog.variant(id)) {
        Some(variant) => format!("{product} ({})", variant.name),
        None => product,
    }
}

/// Summed requirements of every line on an order.
pub fn order_requirements(items: &[OrderItem]) -> Vec<Requirement> {
    sum_requirements(items.iter().flat_map(|item| item.requirements.iter().cloned()))
}

fn line_item_ids(items: &[OrderItem]) -> BTreeSet<String> {
    items
        .iter()
        .flat_map(|item| item.requirements.iter().map(|r| r.item_id.clone()))
        .collect()
}

/// A pending waste/return row for an amount released from `order`.
pub fn cancelled_item_record(
    order: &Order,
    order_item_id: Option<&str>,
    released: &Requirement,
    now: DateTime<Utc>,
) -> CancelledOrderItem {
    CancelledOrderItem {
        id: Uuid::new_v4().to_string(),
        tenant_id: order.tenant_id.clone(),
        branch_id: order.branch_id.clone(),
        order_id: order.id.clone(),
        order_item_id: order_item_id.map(str::to_string),
        item_id: released.item_id.clone(),
        item_name: released.item_name.clone(),
        quantity: released.quantity,
        unit: released.serving_unit,
        storage_unit: released.storage_unit,
        decision: None,
        decided_by: None,
        decided_at: None,
        created_at: now,
    }
}

fn apply_status(order: &mut Order, to: OrderStatus, now: DateTime<Utc>) {
    order.status = to;
    order.updated_at = now;
    match to {
        OrderStatus::Completed => order.completed_at = Some(now),
        OrderStatus::Cancelled | OrderStatus::Rejected => order.cancelled_at = Some(now),
        OrderStatus::Refunded => order.payment_status = PaymentStatus::Refunded,
        _ => {}
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use mise_core::{ModifierSelection, StockKey};
    use mise_db::DbConfig;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const TENANT: &str = demo::TENANT_ID;

    async fn setup() -> OrderCoordinator {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = Ledger::new(db, Duration::from_secs(5));
        demo::install(&ledger, TENANT, None).await.unwrap();
        OrderCoordinator::new(ledger, chrono::Duration::hours(24))
    }

    fn pos_order(lines: Vec<LineRequest>) -> NewOrder {
        NewOrder {
            tenant_id: TENANT.into(),
            branch_id: None,
            source: OrderSource::Pos,
            order_type: Some(OrderType::DineIn),
            scheduled: false,
            lines,
            notes: None,
        }
    }

    async fn cheese(coordinator: &OrderCoordinator) -> (Decimal, Decimal) {
        let row = coordinator
            .ledger()
            .database()
            .stock()
            .get(&StockKey::new(TENANT, None, demo::CHEESE))
            .await
            .unwrap()
            .unwrap();
        (row.quantity, row.reserved_quantity)
    }

    async fn place(coordinator: &OrderCoordinator, lines: Vec<LineRequest>) -> Order {
        let created = coordinator.create_order(pos_order(lines)).await.unwrap();
        created.reservation.wait().await.unwrap();
        created.order
    }

    #[tokio::test]
    async fn test_availability_reflects_reservations() {
        let coordinator = setup().await;
        place(&coordinator, vec![LineRequest::product(demo::BURGER, 10)]).await;

        let orderable = coordinator.max_orderable(TENANT, None).await.unwrap();
        assert_eq!(orderable[demo::BURGER], 3);

        let report = coordinator
            .check_fulfillability(TENANT, None, &[LineRequest::product(demo::BURGER, 4)], None)
            .await
            .unwrap();
        assert!(!report.can_fulfill());
        assert_eq!(report.shortages.len(), 1);
        assert_eq!(report.shortages[0].item_id, demo::CHEESE);
        assert_eq!(report.shortages[0].shortfall(), dec!(100));
    }

    #[tokio::test]
    async fn test_rejected_catalog_link_leaves_tenant_orderable() {
        let coordinator = setup().await;
        let link = mise_core::CompositeComponent {
            composite_item_id: demo::HOUSE_SAUCE.into(),
            component_item_id: demo::HOUSE_SAUCE.into(),
            quantity: dec!(10),
        };
        assert!(coordinator.ledger().database().catalog().insert_component(&link).await.is_err());

        let report = coordinator
            .check_fulfillability(TENANT, None, &[LineRequest::product(demo::WATER, 1)], None)
            .await
            .unwrap();
        assert!(report.can_fulfill());
        place(&coordinator, vec![LineRequest::product(demo::BURGER, 1)]).await;
    }

    #[tokio::test]
    async fn test_create_reserves_and_prices() {
        let coordinator = setup().await;
        let created = coordinator
            .create_order(pos_order(vec![
                LineRequest::product(demo::BURGER, 1).with_modifier(demo::EXTRA_CHEESE),
                LineRequest::variant(demo::FRIES, demo::FRIES_LARGE, 2),
            ]))
            .await
            .unwrap();

        assert_eq!(created.order.status, OrderStatus::InProgress);
        assert_eq!(created.order.total_cents, 1300 + 2 * 550);
        assert_eq!(created.order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(created.items[0].name_snapshot, "Cheeseburger");
        assert_eq!(created.items[1].name_snapshot, "Fries (Large)");
        assert_eq!(created.items[1].unit_cost_at_sale, dec!(0.5));

        created.reservation.wait().await.unwrap();
        assert_eq!(cheese(&coordinator).await, (dec!(2), dec!(0.18)));
    }

    #[tokio::test]
    async fn test_create_refuses_shortage_and_persists_nothing() {
        let coordinator = setup().await;
        let err = coordinator
            .create_order(pos_order(vec![LineRequest::product(demo::BURGER, 14)]))
            .await
            .unwrap_err();

        match err {
            EngineError::InsufficientInventory { shortages } => {
                assert_eq!(shortages[0].item_id, demo::CHEESE);
                assert_eq!(shortages[0].shortfall(), dec!(100));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(coordinator
            .ledger()
            .database()
            .orders()
            .list_by_status(TENANT, OrderStatus::InProgress)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_order_starts_pending() {
        let coordinator = setup().await;
        let mut request = pos_order(vec![LineRequest::product(demo::WATER, 1)]);
        request.scheduled = true;

        let created = coordinator.create_order(request).await.unwrap();
        created.reservation.wait().await.unwrap();
        assert_eq!(created.order.status, OrderStatus::Pending);

        let started = coordinator.start(&created.order.id).await.unwrap();
        assert_eq!(started.status, OrderStatus::InProgress);
    }

    #[tokio::test]
    async fn test_failed_reservation_is_counted_and_recorded() {
        let coordinator = setup().await;
        let created = coordinator
            .create_order(pos_order(vec![LineRequest::product(demo::BURGER, 13)]))
            .await
            .unwrap();

        // A walk-in grabs cheese while the spawned reservation is pending.
        let walk_in = coordinator
            .ledger()
            .reserve(
                TENANT,
                None,
                &[Requirement {
                    item_id: demo::CHEESE.into(),
                    item_name: "Cheddar".into(),
                    quantity: dec!(1000),
                    serving_unit: mise_core::Unit::Gram,
                    storage_unit: mise_core::Unit::Kilogram,
                }],
                "walk-in",
            )
            .await;

        let result = created.reservation.wait().await;
        if let Err(err) = result {
            assert!(walk_in.is_ok());
            assert!(matches!(err, EngineError::ReservationConflict { .. }));
            assert!(err.is_retryable());
            assert_eq!(coordinator.reservation_failures(), 1);
            let anomalies = coordinator.ledger().database().stock().anomalies(TENANT).await.unwrap();
            assert!(anomalies
                .iter()
                .any(|a| a.order_ref.as_deref() == Some(created.order.id.as_str())));
        } else {
            // The spawned reservation won; the walk-in found too little left.
            assert!(matches!(walk_in, Err(EngineError::InsufficientInventory { .. })));
            assert_eq!(coordinator.reservation_failures(), 0);
        }
    }

    #[tokio::test]
    async fn test_complete_consumes_reservation() {
        let coordinator = setup().await;
        let order = place(&coordinator, vec![LineRequest::product(demo::BURGER, 2)]).await;

        let completed = coordinator.complete(&order.id).await.unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert_eq!(cheese(&coordinator).await, (dec!(1.7), dec!(0)));
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_refused() {
        let coordinator = setup().await;
        let order = place(&coordinator, vec![LineRequest::product(demo::BURGER, 1)]).await;
        coordinator.complete(&order.id).await.unwrap();

        let err = coordinator.cancel(&order.id, "too late").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        // Only delivery partner orders are picked up.
        let err = coordinator.pick_up(&order.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let refunded = coordinator.refund(&order.id).await.unwrap();
        assert_eq!(refunded.status, OrderStatus::Refunded);
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_delivery_partner_pick_up() {
        let coordinator = setup().await;
        let mut request = pos_order(vec![LineRequest::product(demo::BURGER, 1)]);
        request.source = OrderSource::DeliveryPartner;
        request.order_type = Some(OrderType::Delivery);
        let created = coordinator.create_order(request).await.unwrap();
        created.reservation.wait().await.unwrap();

        coordinator.complete(&created.order.id).await.unwrap();
        let picked = coordinator.pick_up(&created.order.id).await.unwrap();
        assert_eq!(picked.status, OrderStatus::PickedUp);
        assert!(coordinator.refund(&created.order.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_then_expire_as_waste() {
        let coordinator = setup().await;
        let order = place(&coordinator, vec![LineRequest::product(demo::BURGER, 1)]).await;
        assert_eq!(cheese(&coordinator).await, (dec!(2), dec!(0.15)));

        let change = coordinator.cancel(&order.id, "customer left").await.unwrap();
        assert_eq!(change.order.status, OrderStatus::Cancelled);
        assert_eq!(cheese(&coordinator).await, (dec!(2), dec!(0)));

        let cheese_row = change
            .cancelled_items
            .iter()
            .find(|c| c.item_id == demo::CHEESE)
            .unwrap();
        assert_eq!(cheese_row.quantity, dec!(150));
        assert!(cheese_row.decision.is_none());

        let pending = coordinator.list_pending_waste_decisions(TENANT, None).await.unwrap();
        assert_eq!(pending.len(), change.cancelled_items.len());

        // Not yet expired.
        let report = coordinator.auto_expire(Utc::now(), 100).await.unwrap();
        assert_eq!(report.expired, 0);

        let report = coordinator
            .auto_expire(Utc::now() + chrono::Duration::hours(25), 100)
            .await
            .unwrap();
        assert_eq!(report.expired, change.cancelled_items.len());
        assert_eq!(cheese(&coordinator).await, (dec!(1.85), dec!(0)));

        let resolved = coordinator
            .ledger()
            .database()
            .cancelled()
            .get(&cheese_row.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.decision, Some(WasteDecision::Waste));
        assert!(resolved.decided_by.is_none());
    }

    #[tokio::test]
    async fn test_waste_decision_is_exactly_once() {
        let coordinator = setup().await;
        let order = place(&coordinator, vec![LineRequest::product(demo::BURGER, 1)]).await;
        let change = coordinator.reject(&order.id, "burnt").await.unwrap();
        assert_eq!(change.order.status, OrderStatus::Rejected);

        let cheese_row = change
            .cancelled_items
            .iter()
            .find(|c| c.item_id == demo::CHEESE)
            .unwrap();

        let first = coordinator.clone();
        let second = coordinator.clone();
        let id_a = cheese_row.id.clone();
        let id_b = cheese_row.id.clone();
        let (a, b) = tokio::join!(
            async move { first.resolve_waste_decision(&id_a, WasteDecision::Waste, Some("chef")).await },
            async move { second.resolve_waste_decision(&id_b, WasteDecision::Waste, Some("manager")).await },
        );

        assert!(a.is_ok() != b.is_ok());
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser, Err(EngineError::AlreadyResolved(_))));
        assert_eq!(cheese(&coordinator).await, (dec!(1.85), dec!(0)));
    }

    #[tokio::test]
    async fn test_return_decision_keeps_stock() {
        let coordinator = setup().await;
        let order = place(&coordinator, vec![LineRequest::product(demo::BURGER, 1)]).await;
        let change = coordinator.cancel(&order.id, "changed mind").await.unwrap();

        for item in &change.cancelled_items {
            let resolved = coordinator
                .resolve_waste_decision(&item.id, WasteDecision::Return, Some("chef"))
                .await
                .unwrap();
            assert_eq!(resolved.decision, Some(WasteDecision::Return));
        }
        assert_eq!(cheese(&coordinator).await, (dec!(2), dec!(0)));

        let err = coordinator
            .resolve_waste_decision(&change.cancelled_items[0].id, WasteDecision::Waste, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn test_edit_adds_and_reduces() {
        let coordinator = setup().await;
        let created = coordinator
            .create_order(pos_order(vec![LineRequest::product(demo::BURGER, 2)]))
            .await
            .unwrap();
        let burger_line = created.items[0].id.clone();
        created.reservation.wait().await.unwrap();
        coordinator.record_payment(&created.order.id, 2400).await.unwrap();

        let change = coordinator
            .edit_order(
                &created.order.id,
                OrderEdit {
                    add: vec![LineRequest {
                        modifiers: vec![ModifierSelection::once(demo::EXTRA_CHEESE)],
                        ..LineRequest::product(demo::BURGER, 1)
                    }],
                    set_quantity: vec![QuantityChange {
                        line_id: burger_line,
                        quantity: 1,
                    }],
                    ..OrderEdit::default()
                },
            )
            .await
            .unwrap();

        // 150 g released from the reduced line, 180 g reserved for the new one.
        assert_eq!(cheese(&coordinator).await, (dec!(2), dec!(0.33)));
        assert_eq!(change.order.total_cents, 1200 + 1300);
        assert_eq!(change.order.payment_status, PaymentStatus::PendingAdditionalPayment);
        assert!(change.cancelled_items.iter().any(|c| c.item_id == demo::CHEESE && c.quantity == dec!(150)));

        let paid = coordinator.record_payment(&created.order.id, 100).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
    }

    /// Sum of what open orders hold, per item, against the stock rows.
    async fn assert_reservations_balance(coordinator: &OrderCoordinator) {
        let db = coordinator.ledger().database();
        let mut held: BTreeMap<String, Decimal> = BTreeMap::new();
        for status in [OrderStatus::Pending, OrderStatus::InProgress] {
            for open in db.orders().list_by_status(TENANT, status).await.unwrap() {
                for reservation in db.stock().reservations_for_order(&open.id, TENANT, None).await.unwrap() {
                    *held.entry(reservation.item_id).or_default() += reservation.quantity;
                }
            }
        }

        for record in db.stock().snapshot(TENANT, None).await.unwrap() {
            let expected = held.remove(&record.item_id).unwrap_or_default();
            assert_eq!(record.reserved_quantity, expected, "reserved {}", record.item_id);
        }
        assert!(held.is_empty(), "reservations without a stock row: {held:?}");
    }

    #[tokio::test]
    async fn test_reservations_balance_across_edit_cancel_complete() {
        let coordinator = setup().await;
        let edited = coordinator
            .create_order(pos_order(vec![LineRequest::product(demo::BURGER, 2)]))
            .await
            .unwrap();
        edited.reservation.wait().await.unwrap();
        let cancelled = place(
            &coordinator,
            vec![
                LineRequest::product(demo::BURGER, 1),
                LineRequest::variant(demo::FRIES, demo::FRIES_LARGE, 1),
            ],
        )
        .await;
        let completed = place(&coordinator, vec![LineRequest::product(demo::BURGER, 1)]).await;
        let mut scheduled = pos_order(vec![LineRequest::variant(demo::FRIES, demo::FRIES_SMALL, 2)]);
        scheduled.scheduled = true;
        let scheduled = coordinator.create_order(scheduled).await.unwrap();
        scheduled.reservation.wait().await.unwrap();
        assert_reservations_balance(&coordinator).await;

        coordinator
            .edit_order(
                &edited.order.id,
                OrderEdit {
                    add: vec![LineRequest::product(demo::BURGER, 1).with_modifier(demo::EXTRA_CHEESE)],
                    set_quantity: vec![QuantityChange {
                        line_id: edited.items[0].id.clone(),
                        quantity: 1,
                    }],
                    ..OrderEdit::default()
                },
            )
            .await
            .unwrap();
        assert_reservations_balance(&coordinator).await;

        coordinator.cancel(&cancelled.id, "customer left").await.unwrap();
        assert_reservations_balance(&coordinator).await;

        coordinator.complete(&completed.id).await.unwrap();
        assert_reservations_balance(&coordinator).await;

        let db = coordinator.ledger().database();
        for closed in [&cancelled.id, &completed.id] {
            assert!(db.stock().reservations_for_order(closed, TENANT, None).await.unwrap().is_empty());
        }
        assert_eq!(cheese(&coordinator).await, (dec!(1.85), dec!(0.33)));
    }

    #[tokio::test]
    async fn test_edit_refused_on_shortage() {
        let coordinator = setup().await;
        let order = place(&coordinator, vec![LineRequest::product(demo::BURGER, 10)]).await;

        let err = coordinator
            .edit_order(
                &order.id,
                OrderEdit {
                    add: vec![LineRequest::product(demo::BURGER, 5)],
                    ..OrderEdit::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientInventory { .. }));

        assert_eq!(cheese(&coordinator).await, (dec!(2), dec!(1.5)));
        assert_eq!(coordinator.ledger().database().orders().items(&order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_refuses_oversized_modifier_quantity() {
        let coordinator = setup().await;
        let placed = place(&coordinator, vec![LineRequest::product(demo::BURGER, 1)]).await;

        let err = coordinator
            .edit_order(
                &placed.id,
                OrderEdit {
                    add: vec![LineRequest {
                        modifiers: vec![ModifierSelection {
                            modifier_id: demo::EXTRA_CHEESE.into(),
                            quantity: 100_000_000_000_000_000,
                        }],
                        ..LineRequest::product(demo::BURGER, 1)
                    }],
                    ..OrderEdit::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(_)));

        let stored = coordinator.ledger().database().orders().get(&placed.id).await.unwrap().unwrap();
        assert_eq!(stored.total_cents, placed.total_cents);
        assert_eq!(cheese(&coordinator).await, (dec!(2), dec!(0.15)));
    }

    #[tokio::test]
    async fn test_edit_unknown_line() {
        let coordinator = setup().await;
        let order = place(&coordinator, vec![LineRequest::product(demo::BURGER, 1)]).await;

        let err = coordinator
            .edit_order(
                &order.id,
                OrderEdit {
                    remove: vec!["nope".into()],
                    ..OrderEdit::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::LineNotFound { .. }));
    }

    #[tokio::test]
    async fn test_payment_validation() {
        let coordinator = setup().await;
        let order = place(&coordinator, vec![LineRequest::product(demo::WATER, 1)]).await;

        assert!(coordinator.record_payment(&order.id, 0).await.is_err());
        let paid = coordinator.record_payment(&order.id, 150).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        assert!(matches!(
            coordinator.record_payment("missing", 100).await,
            Err(EngineError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_payment_overflow_is_refused() {
        let coordinator = setup().await;
        let placed = place(&coordinator, vec![LineRequest::product(demo::WATER, 1)]).await;
        let orders = coordinator.ledger().database().orders();

        assert!(matches!(
            coordinator.record_payment(&placed.id, i64::MAX).await,
            Err(EngineError::Core(mise_core::CoreError::Validation(_)))
        ));
        assert_eq!(orders.get(&placed.id).await.unwrap().unwrap().paid_cents, 0);

        // A running total at the edge of i64 must not wrap.
        let mut stored = orders.get(&placed.id).await.unwrap().unwrap();
        stored.paid_cents = i64::MAX - 10;
        let mut conn = coordinator.ledger().database().pool().acquire().await.unwrap();
        order::update_order(&mut conn, &stored).await.unwrap();
        drop(conn);

        assert!(coordinator.record_payment(&placed.id, 100).await.is_err());
        assert_eq!(orders.get(&placed.id).await.unwrap().unwrap().paid_cents, i64::MAX - 10);
    }
}
