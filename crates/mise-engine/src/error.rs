//! # Engine Error Types
//!
//! Error types for the fulfillment services.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    EngineError                                          │
//! │                                                                         │
//! │  Business outcomes       InsufficientInventory   (itemised shortages)  │
//! │                          Unverifiable            (fail closed)         │
//! │                          InvalidTransition, AlreadyResolved            │
//! │                                                                         │
//! │  Retryable               LedgerTimeout, ReservationConflict,           │
//! │                          Db(Busy | PoolExhausted)                      │
//! │                                                                         │
//! │  Configuration           Config, Core(config-class CoreError)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledger anomalies are never errors: they are written to the audit table
//! and logged.

use thiserror::Error;

use mise_core::{CoreError, OrderStatus, Shortage, Unverifiable};
use mise_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering all fulfillment failures.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Fulfillment
    // =========================================================================
    /// Not enough stock for at least one item. Nothing was changed.
    #[error("Insufficient inventory for {} item(s)", shortages.len())]
    InsufficientInventory { shortages: Vec<Shortage> },

    /// Part of the order could not be checked (bad recipe or units).
    #[error("Order cannot be verified: {} problem(s)", problems.len())]
    Unverifiable { problems: Vec<Unverifiable> },

    /// Stock moved between the availability check and the reservation.
    #[error("Reservation conflict for order {order_id}: {reason}")]
    ReservationConflict { order_id: String, reason: String },

    /// A ledger call did not finish in time; it was rolled back.
    #[error("Ledger operation '{operation}' timed out after {timeout_ms} ms")]
    LedgerTimeout { operation: String, timeout_ms: u64 },

    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Status change not allowed from the current status.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Cancelled item not found.
    #[error("Cancelled item not found: {0}")]
    CancelledItemNotFound(String),

    /// The waste/return decision was already taken.
    #[error("Cancelled item {0} already has a decision")]
    AlreadyResolved(String),

    /// Edit referenced a line that is not on the order.
    #[error("Order line {line_id} is not part of order {order_id}")]
    LineNotFound { order_id: String, line_id: String },

    // =========================================================================
    // Configuration
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid engine configuration: {0}")]
    Config(String),

    /// Broken engine invariant (e.g. a ledger write outside its lock set).
    #[error("Internal engine error: {0}")]
    Internal(String),

    // =========================================================================
    // Wrapped
    // =========================================================================
    /// Domain or validation error from mise-core.
    #[error(transparent)]
    Core(CoreError),

    /// Database error from mise-db.
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

impl EngineError {
    /// Returns true if the caller may retry the same request.
    ///
    /// ## Retryable Errors
    /// - Ledger timeouts (the transaction was rolled back)
    /// - Reservation conflicts (re-check availability and try again)
    /// - SQLite busy / pool exhaustion
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::LedgerTimeout { .. } | EngineError::ReservationConflict { .. } => true,
            EngineError::Db(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error points at broken catalog or config data.
    pub fn is_config_error(&self) -> bool {
        match self {
            EngineError::Config(_) => true,
            EngineError::Core(e) => e.is_config_error(),
            EngineError::Db(DbError::Rejected(e)) => e.is_config_error(),
            _ => false,
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { order_id, from, to } => {
                EngineError::InvalidTransition { order_id, from, to }
            }
            other => EngineError::Core(other),
        }
    }
}

impl From<mise_core::ValidationError> for EngineError {
    fn from(err: mise_core::ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Db(DbError::from(err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
