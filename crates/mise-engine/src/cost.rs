//! # Cost Service
//!
//! Persists item cost changes and the derived costs they imply.
//!
//! ```text
//! lock tenant ──► BEGIN ──► write item cost ──► load catalog (same tx)
//!             ──► plan_cascade ──► write composites, products, variants ──► COMMIT
//! ```
//!
//! The catalog is read inside the write transaction, after its first write
//! has taken SQLite's write lock, so the plan always starts from the latest
//! committed costs. The tenant lock keeps in-process cascades from even
//! queueing on that write lock.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use mise_core::cost::{plan_cascade, CascadePlan, CostTarget};
use mise_core::validation::validate_unit_cost;
use mise_core::{Catalog, CoreError, ItemScope, ValidationError};
use mise_db::repository::catalog as catalog_writes;
use mise_db::Database;

use crate::error::EngineResult;
use crate::locks::KeyedLocks;

#[derive(Debug, Clone)]
pub struct CostService {
    db: Database,
    /// One cascade at a time per tenant.
    tenants: Arc<KeyedLocks<String>>,
}

impl CostService {
    pub fn new(db: Database) -> Self {
        CostService {
            db,
            tenants: Arc::new(KeyedLocks::new()),
        }
    }

    /// Sets a tenant-owned item's cost per serving unit and cascades it.
    pub async fn update_item_cost(&self, tenant_id: &str, item_id: &str, cost: Decimal) -> EngineResult<CascadePlan> {
        validate_unit_cost(cost)?;
        let _tenant = self.tenants.acquire([tenant_id.to_string()]).await;

        let mut tx = self.db.pool().begin().await?;
        if catalog_writes::set_item_cost(&mut tx, item_id, cost).await? == 0 {
            return Err(CoreError::ItemNotFound(item_id.to_string()).into());
        }

        let catalog = load_catalog(&mut tx, tenant_id).await?;
        let item = catalog
            .item(item_id)
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;
        if item.scope != ItemScope::Owned(tenant_id.to_string()) {
            return Err(ValidationError::Conflict {
                field: "item_id".into(),
                reason: "shared items are read-only for tenants".into(),
            }
            .into());
        }

        let plan = plan_cascade(&catalog, item_id)?;
        apply_plan(&mut tx, &plan).await?;
        tx.commit().await?;

        info!(
            tenant_id,
            item_id,
            new_cost = %cost,
            composites = plan.composites.len(),
            products = plan.products.len(),
            variants = plan.variants.len(),
            "Item cost updated"
        );
        Ok(plan)
    }

    /// Recomputes derived costs after an item's cost was written elsewhere.
    pub async fn on_item_cost_changed(&self, item_id: &str, tenant_id: &str) -> EngineResult<CascadePlan> {
        let _tenant = self.tenants.acquire([tenant_id.to_string()]).await;

        let mut tx = self.db.pool().begin().await?;
        // Take the write lock before reading.
        if catalog_writes::touch_item(&mut tx, item_id).await? == 0 {
            return Err(CoreError::ItemNotFound(item_id.to_string()).into());
        }
        let catalog = load_catalog(&mut tx, tenant_id).await?;
        let plan = plan_cascade(&catalog, item_id)?;
        apply_plan(&mut tx, &plan).await?;
        tx.commit().await?;

        info!(
            tenant_id,
            item_id,
            changed = plan.all().filter(|c| c.is_changed()).count(),
            "Cost cascade applied"
        );
        Ok(plan)
    }

    /// The tenant's current catalog, read outside any transaction.
    pub async fn catalog(&self, tenant_id: &str) -> EngineResult<Catalog> {
        let data = self.db.catalog().load_data(tenant_id).await?;
        Ok(Catalog::new(tenant_id, data)?)
    }
}

async fn load_catalog(conn: &mut sqlx::SqliteConnection, tenant_id: &str) -> EngineResult<Catalog> {
    let data = catalog_writes::load(conn, tenant_id).await?;
    Ok(Catalog::new(tenant_id, data)?)
}

async fn apply_plan(conn: &mut sqlx::SqliteConnection, plan: &CascadePlan) -> EngineResult<()> {
    for change in plan.all().filter(|c| c.is_changed()) {
        debug!(
            target_kind = ?change.target,
            id = %change.id,
            old_cost = %change.old_cost,
            new_cost = %change.new_cost,
            "Writing derived cost"
        );
        match change.target {
            CostTarget::Item => catalog_writes::set_item_cost(conn, &change.id, change.new_cost).await?,
            CostTarget::Product => catalog_writes::set_product_cost(conn, &change.id, change.new_cost).await?,
            CostTarget::Variant => catalog_writes::set_variant_cost(conn, &change.id, change.new_cost).await?,
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::ledger::Ledger;
    use mise_core::bom::{resolve_line, LineRequest};
    use mise_db::DbConfig;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    async fn setup() -> CostService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = Ledger::new(db.clone(), Duration::from_secs(5));
        demo::install(&ledger, demo::TENANT_ID, None).await.unwrap();
        CostService::new(db)
    }

    #[tokio::test]
    async fn test_house_sauce_cost_per_gram() {
        let service = setup().await;
        let catalog = service.catalog(demo::TENANT_ID).await.unwrap();

        // (300 g × $0.001 + 200 g × $0.004) ÷ 500 g
        let sauce = catalog.item(demo::HOUSE_SAUCE).unwrap();
        assert_eq!(sauce.cost_per_unit, dec!(0.0022));

        let burger = resolve_line(&catalog, &LineRequest::product(demo::BURGER, 1), None).unwrap();
        let sauce_cost: Decimal = burger
            .requirements
            .iter()
            .filter(|r| r.item_id == demo::TOMATO || r.item_id == demo::MAYO)
            .map(|r| r.quantity * catalog.item(&r.item_id).unwrap().cost_per_unit)
            .sum();
        assert_eq!(sauce_cost, dec!(0.11));
    }

    #[tokio::test]
    async fn test_tomato_price_cascades() {
        let service = setup().await;

        // Tomato $1/kg → $2/kg
        let plan = service
            .update_item_cost(demo::TENANT_ID, demo::TOMATO, dec!(0.002))
            .await
            .unwrap();

        assert_eq!(plan.composites.len(), 1);
        assert_eq!(plan.composites[0].new_cost, dec!(0.0028));
        assert_eq!(plan.products.len(), 1);
        assert_eq!(plan.products[0].id, demo::BURGER);
        assert_eq!(plan.products[0].new_cost, dec!(1.59));
        assert!(plan.variants.is_empty());

        let catalog = service.catalog(demo::TENANT_ID).await.unwrap();
        assert_eq!(catalog.item(demo::TOMATO).unwrap().cost_per_unit, dec!(0.002));
        assert_eq!(catalog.item(demo::HOUSE_SAUCE).unwrap().cost_per_unit, dec!(0.0028));
        assert_eq!(catalog.product(demo::BURGER).unwrap().ingredient_cost, dec!(1.59));
    }

    #[tokio::test]
    async fn test_direct_ingredient_change_skips_composites() {
        let service = setup().await;
        let plan = service
            .update_item_cost(demo::TENANT_ID, demo::POTATO, dec!(0.003))
            .await
            .unwrap();

        assert!(plan.composites.is_empty());
        assert!(plan.products.is_empty());
        assert_eq!(plan.variants.len(), 2);

        let catalog = service.catalog(demo::TENANT_ID).await.unwrap();
        assert_eq!(catalog.variant(demo::FRIES_LARGE).unwrap().ingredient_cost, dec!(0.75));
    }

    #[tokio::test]
    async fn test_on_item_cost_changed_is_idempotent() {
        let service = setup().await;
        let plan = service.on_item_cost_changed(demo::TOMATO, demo::TENANT_ID).await.unwrap();
        assert!(plan.all().all(|c| !c.is_changed()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_changes_to_one_composite_both_land() {
        let path = std::env::temp_dir().join(format!("mise-cost-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let ledger = Ledger::new(db.clone(), Duration::from_secs(5));
        demo::install(&ledger, demo::TENANT_ID, None).await.unwrap();
        let service = CostService::new(db.clone());

        for round in 1..=10i64 {
            let tomato = dec!(0.001) + Decimal::new(round, 4);
            let mayo = dec!(0.004) + Decimal::new(round, 4);

            let a = {
                let service = service.clone();
                tokio::spawn(async move { service.update_item_cost(demo::TENANT_ID, demo::TOMATO, tomato).await })
            };
            let b = {
                let service = service.clone();
                tokio::spawn(async move { service.update_item_cost(demo::TENANT_ID, demo::MAYO, mayo).await })
            };
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            // (300 g tomato + 200 g mayo) / 500 g
            let expected_sauce = (dec!(300) * tomato + dec!(200) * mayo) / dec!(500);
            let catalog = service.catalog(demo::TENANT_ID).await.unwrap();
            let sauce = catalog.item(demo::HOUSE_SAUCE).unwrap();
            assert_eq!(sauce.cost_per_unit, expected_sauce, "round {round}");
            assert_eq!(
                catalog.product(demo::BURGER).unwrap().ingredient_cost,
                mise_core::cost::recipe_cost(&catalog, demo::BURGER, None).unwrap(),
                "round {round}"
            );
        }

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn test_rejects_negative_cost_and_unknown_item() {
        let service = setup().await;
        assert!(service
            .update_item_cost(demo::TENANT_ID, demo::TOMATO, dec!(-1))
            .await
            .is_err());
        assert!(service
            .update_item_cost(demo::TENANT_ID, "saffron", dec!(1))
            .await
            .is_err());
        assert!(service.on_item_cost_changed("saffron", demo::TENANT_ID).await.is_err());

        // Refused changes leave the stored cost alone.
        let catalog = service.catalog(demo::TENANT_ID).await.unwrap();
        assert_eq!(catalog.item(demo::TOMATO).unwrap().cost_per_unit, dec!(0.001));
    }
}
