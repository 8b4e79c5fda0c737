//! # Waste Sweeper
//!
//! Background task that resolves stale waste/return decisions.
//!
//! ```text
//! every sweep_interval_secs:
//!     OrderCoordinator::auto_expire(now, sweep_batch_size)
//!         pending items older than expiry_hours → decision = waste,
//!                                                 decided_by = null
//! ```
//!
//! A full batch triggers another pass on the next tick; the loop never
//! spins on its own.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::coordinator::{ExpiryReport, OrderCoordinator};
use crate::error::{EngineError, EngineResult};

/// Periodic auto-expiry of pending waste decisions.
pub struct WasteSweeper {
    coordinator: OrderCoordinator,
    interval: Duration,
    batch_size: i64,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running sweeper.
#[derive(Clone)]
pub struct WasteSweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl WasteSweeperHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::Internal("sweeper shutdown channel closed".into()))
    }
}

impl WasteSweeper {
    /// Creates a sweeper and returns a handle.
    pub fn new(coordinator: OrderCoordinator, config: &EngineConfig) -> (Self, WasteSweeperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let sweeper = WasteSweeper {
            coordinator,
            interval: config.sweep_interval(),
            batch_size: config.waste.sweep_batch_size,
            shutdown_rx,
        };

        (sweeper, WasteSweeperHandle { shutdown_tx })
    }

    /// Runs the sweep loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Waste sweeper starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Waste sweep failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Waste sweeper shutting down");
                    break;
                }
            }
        }

        info!("Waste sweeper stopped");
    }

    /// One pass over expired decisions.
    pub async fn sweep(&self) -> EngineResult<ExpiryReport> {
        let report = self.coordinator.auto_expire(Utc::now(), self.batch_size).await?;

        if report.expired + report.skipped + report.failed == 0 {
            debug!("No expired waste decisions");
        } else if (report.expired + report.skipped + report.failed) as i64 >= self.batch_size {
            debug!(batch_size = self.batch_size, "Sweep batch full; remainder on next tick");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::ledger::Ledger;
    use mise_core::types::{Order, OrderSource, OrderStatus, PaymentStatus};
    use mise_core::{CancelledOrderItem, Unit};
    use mise_db::repository::{cancelled, order};
    use mise_db::{Database, DbConfig};
    use rust_decimal_macros::dec;

    async fn setup() -> (OrderCoordinator, EngineConfig) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = Ledger::new(db, Duration::from_secs(5));
        demo::install(&ledger, demo::TENANT_ID, None).await.unwrap();

        let mut config = EngineConfig::default();
        config.waste.sweep_interval_secs = 1;
        config.waste.sweep_batch_size = 10;
        (OrderCoordinator::new(ledger, config.waste_expiry()), config)
    }

    async fn stale_item(coordinator: &OrderCoordinator) -> CancelledOrderItem {
        let created_at = Utc::now() - chrono::Duration::hours(30);
        let mut conn = coordinator.ledger().database().pool().acquire().await.unwrap();
        order::insert_order(
            &mut conn,
            &Order {
                id: "o-stale".into(),
                tenant_id: demo::TENANT_ID.into(),
                branch_id: None,
                source: OrderSource::Pos,
                order_type: None,
                status: OrderStatus::Cancelled,
                payment_status: PaymentStatus::Unpaid,
                total_cents: 1200,
                paid_cents: 0,
                notes: None,
                created_at,
                updated_at: created_at,
                completed_at: None,
                cancelled_at: Some(created_at),
            },
        )
        .await
        .unwrap();

        let item = CancelledOrderItem {
            id: "c-stale".into(),
            tenant_id: demo::TENANT_ID.into(),
            branch_id: None,
            order_id: "o-stale".into(),
            order_item_id: None,
            item_id: demo::CHEESE.into(),
            item_name: "Cheddar".into(),
            quantity: dec!(150),
            unit: Unit::Gram,
            storage_unit: Unit::Kilogram,
            decision: None,
            decided_by: None,
            decided_at: None,
            created_at,
        };
        cancelled::insert(&mut conn, &item).await.unwrap();
        item
    }

    #[tokio::test]
    async fn test_sweep_expires_stale_items() {
        let (coordinator, config) = setup().await;
        stale_item(&coordinator).await;
        let (sweeper, _handle) = WasteSweeper::new(coordinator.clone(), &config);

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.expired, 1);

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report, ExpiryReport::default());

        let row = coordinator
            .ledger()
            .database()
            .cancelled()
            .get("c-stale")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.decision, Some(mise_core::WasteDecision::Waste));
        assert!(row.decided_by.is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (coordinator, config) = setup().await;
        let (sweeper, handle) = WasteSweeper::new(coordinator, &config);

        let task = tokio::spawn(sweeper.run());
        handle.shutdown().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
