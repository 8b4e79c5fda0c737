//! # Reservation Ledger
//!
//! The only writer of `stock_records`. Every call:
//!
//! ```text
//! 1. lock (tenant, branch, item) keys, sorted      StockLocks
//! 2. BEGIN; INSERT ledger_batches                   takes the SQLite write lock
//! 3. read rows, apply, write movements/anomalies
//! 4. COMMIT                                         locks drop with the LedgerTx
//! ```
//!
//! The whole sequence runs under `Ledger::bounded`. If the timeout fires the
//! future is dropped, the transaction rolls back and the caller gets
//! `LedgerTimeout`. A partially applied call is never visible.
//!
//! Quantities arrive as [`Requirement`]s in serving units and are converted
//! to storage units before they touch a row.
//!
//! ## Clamping
//! `consume`, `release` and `deduct_waste` never push a counter below zero.
//! When the requested amount does not fit, the ledger applies what it can and
//! writes a [`LedgerAnomaly`]. `reserve` is the exception: it is all-or-nothing
//! and refuses with `InsufficientInventory`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use mise_core::bom::sum_requirements;
use mise_core::units;
use mise_core::validation::validate_positive_amount;
use mise_core::{
    CoreError, InventoryMovement, LedgerAnomaly, MovementKind, Requirement, Shortage, StockKey, StockLevels,
    StockRecord, Unverifiable,
};
use mise_db::repository::stock;
use mise_db::Database;

use crate::error::{EngineError, EngineResult};
use crate::locks::{LockSet, StockLocks};

// =============================================================================
// Ledger
// =============================================================================

/// Serialized access to stock rows.
///
/// Cheap to clone; clones share the lock table.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    locks: Arc<StockLocks>,
    timeout: Duration,
}

/// What one committed ledger call wrote.
#[derive(Debug, Clone, Default)]
pub struct LedgerReceipt {
    pub batch_id: String,
    pub movements: Vec<InventoryMovement>,
    pub anomalies: Vec<LedgerAnomaly>,
}

impl Ledger {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Ledger {
            db,
            locks: Arc::new(StockLocks::new()),
            timeout,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `fut` under the ledger timeout.
    ///
    /// Lock waits count against the budget. On expiry the future is dropped,
    /// which rolls back any open transaction.
    pub async fn bounded<T, F>(&self, operation: &str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "Ledger call timed out");
                Err(EngineError::LedgerTimeout {
                    operation: operation.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Locks the given items and opens a write transaction.
    ///
    /// Callers that need to write other rows atomically with the stock
    /// change (order status, cancelled items) do it through
    /// [`LedgerTx::conn`] before committing.
    pub async fn begin<'a, I>(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
        item_ids: I,
        operation: &str,
        order_ref: Option<&str>,
    ) -> EngineResult<LedgerTx>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keys: Vec<StockKey> = item_ids
            .into_iter()
            .map(|item_id| StockKey::new(tenant_id, branch_id, item_id))
            .collect();
        let locks = self.locks.acquire(keys).await;

        let mut tx = self.db.pool().begin().await?;
        let batch_id = Uuid::new_v4().to_string();
        stock::insert_batch(&mut tx, &batch_id, tenant_id, branch_id, operation, order_ref).await?;

        debug!(
            batch_id = %batch_id,
            operation,
            order_ref = ?order_ref,
            keys = locks.keys().len(),
            "Ledger batch opened"
        );

        Ok(LedgerTx {
            tenant_id: tenant_id.to_string(),
            branch_id: branch_id.map(str::to_string),
            operation: operation.to_string(),
            tx,
            receipt: LedgerReceipt {
                batch_id,
                ..LedgerReceipt::default()
            },
            locks,
        })
    }

    // =========================================================================
    // One-shot Operations
    // =========================================================================

    /// Reserves every requirement for `order_ref`, or nothing.
    pub async fn reserve(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
        requirements: &[Requirement],
        order_ref: &str,
    ) -> EngineResult<LedgerReceipt> {
        self.bounded("reserve", async {
            let mut tx = self
                .begin(tenant_id, branch_id, item_ids(requirements), "reserve", Some(order_ref))
                .await?;
            tx.reserve(requirements, order_ref).await?;
            tx.commit().await
        })
        .await
    }

    /// Takes the requirements out of stock, drawing on the order's hold first.
    pub async fn consume(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
        requirements: &[Requirement],
        order_ref: &str,
    ) -> EngineResult<LedgerReceipt> {
        self.bounded("consume", async {
            let mut tx = self
                .begin(tenant_id, branch_id, item_ids(requirements), "consume", Some(order_ref))
                .await?;
            tx.consume(requirements, order_ref).await?;
            tx.commit().await
        })
        .await
    }

    /// Gives back what `order_ref` holds, up to the requested amounts.
    pub async fn release_reservation(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
        requirements: &[Requirement],
        order_ref: &str,
        reason: &str,
    ) -> EngineResult<LedgerReceipt> {
        self.bounded("release", async {
            let mut tx = self
                .begin(tenant_id, branch_id, item_ids(requirements), "release", Some(order_ref))
                .await?;
            tx.release(requirements, order_ref, reason).await?;
            tx.commit().await
        })
        .await
    }

    /// Removes on-hand stock without touching reservations.
    pub async fn deduct_waste_only(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
        requirements: &[Requirement],
        order_ref: Option<&str>,
        reason: &str,
    ) -> EngineResult<LedgerReceipt> {
        self.bounded("waste", async {
            let mut tx = self
                .begin(tenant_id, branch_id, item_ids(requirements), "waste", order_ref)
                .await?;
            tx.deduct_waste(requirements, order_ref, reason).await?;
            tx.commit().await
        })
        .await
    }

    /// Adds on-hand stock (storage units).
    pub async fn restock(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
        item_id: &str,
        quantity: Decimal,
        reason: &str,
    ) -> EngineResult<LedgerReceipt> {
        self.bounded("restock", async {
            let mut tx = self.begin(tenant_id, branch_id, [item_id], "restock", None).await?;
            tx.restock(item_id, quantity, reason).await?;
            tx.commit().await
        })
        .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read-only view of every stock row for a tenant and branch.
    pub async fn snapshot(&self, tenant_id: &str, branch_id: Option<&str>) -> EngineResult<Vec<StockRecord>> {
        Ok(self.db.stock().snapshot(tenant_id, branch_id).await?)
    }

    /// Snapshot keyed by item, for availability checks.
    pub async fn stock_levels(&self, tenant_id: &str, branch_id: Option<&str>) -> EngineResult<StockLevels> {
        Ok(StockLevels::from_records(self.snapshot(tenant_id, branch_id).await?))
    }
}

fn item_ids(requirements: &[Requirement]) -> impl Iterator<Item = &str> {
    requirements.iter().map(|r| r.item_id.as_str())
}

// =============================================================================
// Ledger Transaction
// =============================================================================

/// An open ledger batch: item locks plus a write transaction.
///
/// Dropping it without [`commit`](LedgerTx::commit) rolls everything back.
#[derive(Debug)]
pub struct LedgerTx {
    tenant_id: String,
    branch_id: Option<String>,
    operation: String,
    tx: Transaction<'static, Sqlite>,
    receipt: LedgerReceipt,
    // Declared last so the transaction is gone before the keys unlock.
    locks: LockSet,
}

/// Storage-unit view of one requirement.
struct Demand<'r> {
    requirement: &'r Requirement,
    key: StockKey,
    quantity: Decimal,
}

impl LedgerTx {
    pub fn batch_id(&self) -> &str {
        &self.receipt.batch_id
    }

    /// The transaction's connection, for writes that must commit with the batch.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> EngineResult<LedgerReceipt> {
        let LedgerTx {
            operation,
            tx,
            receipt,
            locks,
            ..
        } = self;
        tx.commit().await?;
        drop(locks);

        info!(
            batch_id = %receipt.batch_id,
            operation = %operation,
            movements = receipt.movements.len(),
            anomalies = receipt.anomalies.len(),
            "Ledger batch committed"
        );
        Ok(receipt)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// All-or-nothing hold on free stock.
    pub async fn reserve(&mut self, requirements: &[Requirement], order_ref: &str) -> EngineResult<()> {
        let requirements = sum_requirements(requirements.iter().cloned());

        let mut demands = Vec::with_capacity(requirements.len());
        let mut problems = Vec::new();
        for requirement in &requirements {
            match self.demand(requirement)? {
                Some(demand) => demands.push(demand),
                None => problems.push(incompatible(requirement)),
            }
        }
        if !problems.is_empty() {
            return Err(EngineError::Unverifiable { problems });
        }

        let mut records = Vec::with_capacity(demands.len());
        let mut shortages = Vec::new();
        for demand in &demands {
            let record = stock::fetch_or_empty(&mut self.tx, &demand.key).await?;
            if record.available() < demand.quantity {
                let available = units::to_serving_units(
                    record.available().max(Decimal::ZERO),
                    demand.requirement.storage_unit,
                    demand.requirement.serving_unit,
                )?;
                shortages.push(Shortage {
                    item_id: demand.requirement.item_id.clone(),
                    item_name: demand.requirement.item_name.clone(),
                    required: demand.requirement.quantity,
                    available,
                    unit: demand.requirement.serving_unit,
                });
            }
            records.push(record);
        }
        if !shortages.is_empty() {
            debug!(order_ref, shortages = shortages.len(), "Reservation refused");
            return Err(EngineError::InsufficientInventory { shortages });
        }

        for (demand, before) in demands.iter().zip(records) {
            let mut after = before.clone();
            after.reserved_quantity += demand.quantity;
            self.write(&before, after, MovementKind::Reserve, Some(order_ref), None).await?;

            let held = stock::held_quantity(&mut self.tx, order_ref, &demand.key).await?;
            stock::set_held_quantity(&mut self.tx, order_ref, &demand.key, held + demand.quantity).await?;
        }

        Ok(())
    }

    /// Removes stock for a finished order.
    ///
    /// The order's own hold is used first; the remainder comes from free
    /// stock. Anything neither covers is recorded as an anomaly.
    pub async fn consume(&mut self, requirements: &[Requirement], order_ref: &str) -> EngineResult<()> {
        for requirement in sum_requirements(requirements.iter().cloned()) {
            let Some(demand) = self.demand(&requirement)? else {
                self.unit_anomaly(&requirement, MovementKind::Consume, Some(order_ref)).await?;
                continue;
            };

            let before = stock::fetch_or_empty(&mut self.tx, &demand.key).await?;
            let held = stock::held_quantity(&mut self.tx, order_ref, &demand.key).await?;

            let from_reserved = demand.quantity.min(held).min(before.reserved_quantity).max(Decimal::ZERO);
            let from_free = (demand.quantity - from_reserved)
                .min(before.available())
                .max(Decimal::ZERO);
            let applied = from_reserved + from_free;

            if applied.is_zero() {
                self.anomaly(&demand, Decimal::ZERO, MovementKind::Consume, Some(order_ref), "no stock to consume")
                    .await?;
                continue;
            }

            let mut after = before.clone();
            after.quantity -= applied;
            after.reserved_quantity -= from_reserved;
            self.write(&before, after, MovementKind::Consume, Some(order_ref), None).await?;
            stock::set_held_quantity(&mut self.tx, order_ref, &demand.key, held - from_reserved).await?;

            if applied < demand.quantity {
                self.anomaly(&demand, applied, MovementKind::Consume, Some(order_ref), "consumed more than on hand")
                    .await?;
            } else if from_free > Decimal::ZERO {
                self.anomaly(
                    &demand,
                    from_reserved,
                    MovementKind::Consume,
                    Some(order_ref),
                    "reservation did not cover consumption; remainder taken from free stock",
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Releases an order's hold. Returns what was actually released, in
    /// serving units; items with nothing released are left out.
    pub async fn release(
        &mut self,
        requirements: &[Requirement],
        order_ref: &str,
        reason: &str,
    ) -> EngineResult<Vec<Requirement>> {
        let mut released = Vec::new();

        for requirement in sum_requirements(requirements.iter().cloned()) {
            let Some(demand) = self.demand(&requirement)? else {
                self.unit_anomaly(&requirement, MovementKind::Release, Some(order_ref)).await?;
                continue;
            };

            let before = stock::fetch_or_empty(&mut self.tx, &demand.key).await?;
            let held = stock::held_quantity(&mut self.tx, order_ref, &demand.key).await?;
            let amount = demand.quantity.min(held).min(before.reserved_quantity).max(Decimal::ZERO);

            if amount < demand.quantity {
                self.anomaly(&demand, amount, MovementKind::Release, Some(order_ref), "release exceeds held reservation")
                    .await?;
            }
            if amount.is_zero() {
                continue;
            }

            let mut after = before.clone();
            after.reserved_quantity -= amount;
            self.write(&before, after, MovementKind::Release, Some(order_ref), Some(reason)).await?;
            stock::set_held_quantity(&mut self.tx, order_ref, &demand.key, held - amount).await?;

            released.push(Requirement {
                quantity: units::to_serving_units(amount, requirement.storage_unit, requirement.serving_unit)?,
                ..requirement.clone()
            });
        }

        Ok(released)
    }

    /// Removes on-hand stock only, clamped to what is free.
    pub async fn deduct_waste(
        &mut self,
        requirements: &[Requirement],
        order_ref: Option<&str>,
        reason: &str,
    ) -> EngineResult<()> {
        for requirement in sum_requirements(requirements.iter().cloned()) {
            let Some(demand) = self.demand(&requirement)? else {
                self.unit_anomaly(&requirement, MovementKind::Waste, order_ref).await?;
                continue;
            };

            let before = stock::fetch_or_empty(&mut self.tx, &demand.key).await?;
            let amount = demand.quantity.min(before.available()).max(Decimal::ZERO);

            if amount < demand.quantity {
                self.anomaly(&demand, amount, MovementKind::Waste, order_ref, "waste exceeds free stock")
                    .await?;
            }
            if amount.is_zero() {
                continue;
            }

            let mut after = before.clone();
            after.quantity -= amount;
            self.write(&before, after, MovementKind::Waste, order_ref, Some(reason)).await?;
        }
        Ok(())
    }

    /// Adds on-hand stock, in storage units.
    pub async fn restock(&mut self, item_id: &str, quantity: Decimal, reason: &str) -> EngineResult<()> {
        validate_positive_amount("quantity", quantity)?;

        let key = self.key(item_id)?;
        let before = stock::fetch_or_empty(&mut self.tx, &key).await?;
        let mut after = before.clone();
        after.quantity += quantity;
        self.write(&before, after, MovementKind::Restock, None, Some(reason)).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn key(&self, item_id: &str) -> EngineResult<StockKey> {
        let key = StockKey::new(&self.tenant_id, self.branch_id.as_deref(), item_id);
        if !self.locks.holds(&key) {
            return Err(EngineError::Internal(format!("ledger write to unlocked key {key}")));
        }
        Ok(key)
    }

    /// Converts to storage units. `None` when the units cannot be converted.
    fn demand<'r>(&self, requirement: &'r Requirement) -> EngineResult<Option<Demand<'r>>> {
        let key = self.key(&requirement.item_id)?;
        match requirement.storage_quantity() {
            Ok(quantity) => Ok(Some(Demand {
                requirement,
                key,
                quantity,
            })),
            Err(CoreError::IncompatibleUnits { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(
        &mut self,
        before: &StockRecord,
        mut after: StockRecord,
        kind: MovementKind,
        order_ref: Option<&str>,
        reason: Option<&str>,
    ) -> EngineResult<()> {
        let now = Utc::now();
        after.updated_at = now;
        stock::upsert_record(&mut self.tx, &after).await?;

        let movement = InventoryMovement {
            id: Uuid::new_v4().to_string(),
            batch_id: self.receipt.batch_id.clone(),
            tenant_id: after.tenant_id.clone(),
            branch_id: after.branch_id.clone(),
            item_id: after.item_id.clone(),
            kind,
            order_ref: order_ref.map(str::to_string),
            quantity_before: before.quantity,
            quantity_after: after.quantity,
            reserved_before: before.reserved_quantity,
            reserved_after: after.reserved_quantity,
            reason: reason.map(str::to_string),
            created_at: now,
        };
        stock::insert_movement(&mut self.tx, &movement).await?;
        self.receipt.movements.push(movement);
        Ok(())
    }

    async fn anomaly(
        &mut self,
        demand: &Demand<'_>,
        applied: Decimal,
        operation: MovementKind,
        order_ref: Option<&str>,
        note: &str,
    ) -> EngineResult<()> {
        warn!(
            item_id = %demand.key.item_id,
            order_ref = ?order_ref,
            operation = %operation,
            expected = %demand.quantity,
            applied = %applied,
            note,
            "Ledger anomaly"
        );

        let anomaly = LedgerAnomaly {
            id: Uuid::new_v4().to_string(),
            tenant_id: demand.key.tenant_id.clone(),
            branch_id: demand.key.branch_id.clone(),
            item_id: demand.key.item_id.clone(),
            order_ref: order_ref.map(str::to_string),
            operation,
            expected: demand.quantity,
            applied,
            note: note.to_string(),
            created_at: Utc::now(),
        };
        stock::insert_anomaly(&mut self.tx, &anomaly).await?;
        self.receipt.anomalies.push(anomaly);
        Ok(())
    }

    /// Anomaly for a requirement whose units cannot be converted; nothing is applied.
    async fn unit_anomaly(
        &mut self,
        requirement: &Requirement,
        operation: MovementKind,
        order_ref: Option<&str>,
    ) -> EngineResult<()> {
        let demand = Demand {
            requirement,
            key: self.key(&requirement.item_id)?,
            quantity: requirement.quantity,
        };
        let note = format!(
            "incompatible units {} -> {}",
            requirement.serving_unit, requirement.storage_unit
        );
        self.anomaly(&demand, Decimal::ZERO, operation, order_ref, &note).await
    }
}

fn incompatible(requirement: &Requirement) -> Unverifiable {
    Unverifiable::IncompatibleUnits {
        item_id: requirement.item_id.clone(),
        item_name: requirement.item_name.clone(),
        storage_unit: requirement.storage_unit,
        serving_unit: requirement.serving_unit,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use mise_core::bom::{recipe_requirements, resolve_line};
    use mise_core::catalog::Catalog;
    use mise_core::{LineRequest, Unit};
    use mise_db::DbConfig;
    use rust_decimal_macros::dec;

    const TENANT: &str = demo::TENANT_ID;

    async fn setup() -> (Ledger, Catalog) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = Ledger::new(db.clone(), Duration::from_secs(5));
        demo::install(&ledger, TENANT, None).await.unwrap();
        let catalog = Catalog::new(TENANT, db.catalog().load_data(TENANT).await.unwrap()).unwrap();
        (ledger, catalog)
    }

    fn cheese(grams: Decimal) -> Requirement {
        Requirement {
            item_id: demo::CHEESE.into(),
            item_name: "Cheddar".into(),
            quantity: grams,
            serving_unit: Unit::Gram,
            storage_unit: Unit::Kilogram,
        }
    }

    async fn record(ledger: &Ledger, item_id: &str) -> StockRecord {
        ledger
            .database()
            .stock()
            .get(&StockKey::new(TENANT, None, item_id))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_max_orderable_from_stock() {
        let (ledger, catalog) = setup().await;
        let levels = ledger.stock_levels(TENANT, None).await.unwrap();

        let orderable = mise_core::availability::max_orderable(&catalog, &levels);
        // 2 kg cheese / 150 g per burger
        assert_eq!(orderable[demo::BURGER], 13);
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let (ledger, _) = setup().await;

        ledger.reserve(TENANT, None, &[cheese(dec!(150))], "order-1").await.unwrap();

        let err = ledger
            .reserve(TENANT, None, &[cheese(dec!(1900))], "order-2")
            .await
            .unwrap_err();
        match err {
            EngineError::InsufficientInventory { shortages } => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].item_id, demo::CHEESE);
                assert_eq!(shortages[0].available, dec!(1850));
                assert_eq!(shortages[0].shortfall(), dec!(50));
                assert_eq!(shortages[0].unit, Unit::Gram);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let row = record(&ledger, demo::CHEESE).await;
        assert_eq!(row.quantity, dec!(2));
        assert_eq!(row.reserved_quantity, dec!(0.15));

        let held = ledger
            .database()
            .stock()
            .reservations_for_order("order-2", TENANT, None)
            .await
            .unwrap();
        assert!(held.is_empty());
    }

    #[tokio::test]
    async fn test_refused_reservation_leaves_other_items_untouched() {
        let (ledger, catalog) = setup().await;
        let mut requirements = recipe_requirements(&catalog, demo::BURGER, None).unwrap();
        requirements.push(cheese(dec!(5000)));

        let err = ledger.reserve(TENANT, None, &requirements, "order-1").await;
        assert!(matches!(err, Err(EngineError::InsufficientInventory { .. })));

        let bun = record(&ledger, demo::BUN).await;
        assert_eq!(bun.reserved_quantity, Decimal::ZERO);
        assert!(ledger.database().stock().movements_for_order("order-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_incompatible_units_fail_closed() {
        let (ledger, _) = setup().await;
        let bad = Requirement {
            serving_unit: Unit::Millilitre,
            ..cheese(dec!(10))
        };

        let err = ledger.reserve(TENANT, None, &[bad], "order-1").await.unwrap_err();
        assert!(matches!(err, EngineError::Unverifiable { .. }));
    }

    #[tokio::test]
    async fn test_consume_uses_hold_then_free_stock() {
        let (ledger, _) = setup().await;
        ledger.reserve(TENANT, None, &[cheese(dec!(150))], "order-1").await.unwrap();

        let receipt = ledger.consume(TENANT, None, &[cheese(dec!(200))], "order-1").await.unwrap();
        assert_eq!(receipt.anomalies.len(), 1);

        let row = record(&ledger, demo::CHEESE).await;
        assert_eq!(row.quantity, dec!(1.8));
        assert_eq!(row.reserved_quantity, Decimal::ZERO);
        assert!(row.is_consistent());
    }

    #[tokio::test]
    async fn test_consume_never_goes_negative() {
        let (ledger, _) = setup().await;

        let receipt = ledger.consume(TENANT, None, &[cheese(dec!(2500))], "order-1").await.unwrap();
        assert_eq!(receipt.anomalies.len(), 1);
        assert_eq!(receipt.anomalies[0].expected, dec!(2.5));
        assert_eq!(receipt.anomalies[0].applied, dec!(2));

        let row = record(&ledger, demo::CHEESE).await;
        assert_eq!(row.quantity, Decimal::ZERO);
        assert_eq!(ledger.database().stock().count_inconsistent().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_release_is_clamped_to_hold() {
        let (ledger, _) = setup().await;
        ledger.reserve(TENANT, None, &[cheese(dec!(150))], "order-1").await.unwrap();
        ledger.reserve(TENANT, None, &[cheese(dec!(100))], "order-2").await.unwrap();

        // order-1 cannot release order-2's hold
        let receipt = ledger
            .release_reservation(TENANT, None, &[cheese(dec!(400))], "order-1", "cancelled")
            .await
            .unwrap();
        assert_eq!(receipt.anomalies.len(), 1);

        let row = record(&ledger, demo::CHEESE).await;
        assert_eq!(row.reserved_quantity, dec!(0.1));
        assert_eq!(row.quantity, dec!(2));
    }

    #[tokio::test]
    async fn test_release_reports_released_amount() {
        let (ledger, _) = setup().await;
        ledger.reserve(TENANT, None, &[cheese(dec!(150))], "order-1").await.unwrap();

        let mut tx = ledger
            .begin(TENANT, None, [demo::CHEESE], "release", Some("order-1"))
            .await
            .unwrap();
        let released = tx.release(&[cheese(dec!(150))], "order-1", "cancelled").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(released.len(), 1);
        assert_eq!(released[0].quantity, dec!(150));
        assert_eq!(released[0].serving_unit, Unit::Gram);
    }

    #[tokio::test]
    async fn test_waste_only_touches_free_stock() {
        let (ledger, _) = setup().await;
        ledger.reserve(TENANT, None, &[cheese(dec!(1500))], "order-1").await.unwrap();

        let receipt = ledger
            .deduct_waste_only(TENANT, None, &[cheese(dec!(800))], Some("order-9"), "dropped")
            .await
            .unwrap();
        assert_eq!(receipt.anomalies.len(), 1);

        let row = record(&ledger, demo::CHEESE).await;
        assert_eq!(row.quantity, dec!(1.5));
        assert_eq!(row.reserved_quantity, dec!(1.5));
    }

    #[tokio::test]
    async fn test_every_mutation_writes_a_movement() {
        let (ledger, catalog) = setup().await;
        let bom = resolve_line(&catalog, &LineRequest::product(demo::BURGER, 1), None).unwrap();
        let requirements = sum_requirements(bom.requirements);

        ledger.reserve(TENANT, None, &requirements, "order-1").await.unwrap();
        let receipt = ledger.consume(TENANT, None, &requirements, "order-1").await.unwrap();
        assert!(receipt.anomalies.is_empty());

        let movements = ledger.database().stock().movements_for_order("order-1").await.unwrap();
        assert_eq!(movements.len(), requirements.len() * 2);
        assert!(movements.iter().all(|m| m.quantity_after >= Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_restock_rejects_non_positive() {
        let (ledger, _) = setup().await;
        assert!(ledger.restock(TENANT, None, demo::CHEESE, dec!(0), "count").await.is_err());

        ledger.restock(TENANT, None, demo::CHEESE, dec!(0.5), "delivery").await.unwrap();
        assert_eq!(record(&ledger, demo::CHEESE).await.quantity, dec!(2.5));

        let history = ledger
            .database()
            .stock()
            .movements_for_item(&StockKey::new(TENANT, None, demo::CHEESE))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.kind == MovementKind::Restock));
        assert_eq!(history[1].quantity_before, dec!(2));
        assert_eq!(history[1].reason.as_deref(), Some("delivery"));
    }

    #[tokio::test]
    async fn test_unlocked_write_is_refused() {
        let (ledger, _) = setup().await;
        let mut tx = ledger.begin(TENANT, None, [demo::BUN], "restock", None).await.unwrap();

        let err = tx.restock(demo::CHEESE, dec!(1), "count").await.unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let (ledger, _) = setup().await;

        let mut handles = Vec::new();
        for n in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .reserve(TENANT, None, &[cheese(dec!(150))], &format!("order-{n}"))
                    .await
                    .is_ok()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 13);
        let row = record(&ledger, demo::CHEESE).await;
        assert_eq!(row.reserved_quantity, dec!(1.95));
        assert!(row.is_consistent());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let (ledger, _) = setup().await;
        let ledger = Ledger::new(ledger.database().clone(), Duration::from_millis(20));
        let result: EngineResult<()> = ledger
            .bounded("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(EngineError::LedgerTimeout { .. })));
        assert!(result.unwrap_err().is_retryable());
    }
}
