//! # mise-engine: Fulfillment Services for Mise POS
//!
//! The async half of the system. Everything that touches stock goes through
//! the [`Ledger`]; everything that moves an order goes through the
//! [`OrderCoordinator`].
//!
//! ## Modules
//! - [`ledger`]: reserve, consume, release, waste and restock under per-item locks
//! - [`coordinator`]: order creation, edits, transitions and waste decisions
//! - [`sweeper`]: background auto-expiry of waste decisions
//! - [`cost`]: item cost updates and the derived-cost cascade
//! - [`config`]: TOML + environment configuration
//! - [`demo`]: the demo restaurant used by `seed` and the tests
//!
//! ## Wiring
//! ```rust,ignore
//! let engine = Engine::open(EngineConfig::load(None)?).await?;
//! let created = engine.coordinator.create_order(new_order).await?;
//! created.reservation.wait().await?;
//! ```

pub mod config;
pub mod coordinator;
pub mod cost;
pub mod demo;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod sweeper;
pub mod telemetry;

pub use config::EngineConfig;
pub use coordinator::{
    CreatedOrder, ExpiryReport, NewOrder, OrderChange, OrderCoordinator, OrderEdit, QuantityChange,
    ReservationTicket,
};
pub use cost::CostService;
pub use error::{EngineError, EngineResult};
pub use ledger::{Ledger, LedgerReceipt, LedgerTx};
pub use sweeper::{WasteSweeper, WasteSweeperHandle};

use mise_db::Database;
use tracing::info;

/// The services of one engine instance, sharing a single pool.
#[derive(Clone)]
pub struct Engine {
    pub config: EngineConfig,
    pub ledger: Ledger,
    pub coordinator: OrderCoordinator,
    pub costs: CostService,
}

impl Engine {
    /// Opens the database (running migrations) and builds the services.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        let schema = db.verify_schema().await?;
        info!(
            path = ?config.database.path,
            schema_version = ?schema.latest_applied(),
            pending = schema.pending().len(),
            "Engine database ready"
        );
        Ok(Self::with_database(config, db))
    }

    /// Builds the services on an existing database.
    pub fn with_database(config: EngineConfig, db: Database) -> Self {
        let ledger = Ledger::new(db.clone(), config.ledger_timeout());
        let coordinator = OrderCoordinator::new(ledger.clone(), config.waste_expiry());
        let costs = CostService::new(db);
        Engine {
            config,
            ledger,
            coordinator,
            costs,
        }
    }

    /// A sweeper over this engine's coordinator.
    pub fn sweeper(&self) -> (WasteSweeper, WasteSweeperHandle) {
        WasteSweeper::new(self.coordinator.clone(), &self.config)
    }

    pub fn database(&self) -> &Database {
        self.ledger.database()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mise_core::LineRequest;
    use mise_db::DbConfig;

    #[tokio::test]
    async fn test_engine_services_share_one_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Engine::with_database(EngineConfig::default(), db);
        demo::install(&engine.ledger, demo::TENANT_ID, None).await.unwrap();

        let report = engine
            .coordinator
            .check_fulfillability(demo::TENANT_ID, None, &[LineRequest::product(demo::BURGER, 1)], None)
            .await
            .unwrap();
        assert!(report.can_fulfill());

        let (sweeper, _handle) = engine.sweeper();
        assert_eq!(sweeper.sweep().await.unwrap(), ExpiryReport::default());
    }

    #[tokio::test]
    async fn test_open_migrates_and_checks_schema() {
        let path = std::env::temp_dir().join(format!("mise-engine-{}.db", uuid::Uuid::new_v4()));
        let mut config = EngineConfig::default();
        config.database.path = path.clone();

        let engine = Engine::open(config).await.unwrap();
        let status = engine.database().migration_status().await.unwrap();
        assert!(status.is_current());
        assert!(engine.database().health_check().await);

        engine.database().close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
