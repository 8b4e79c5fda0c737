//! # mise-core: Pure Fulfillment Logic for Mise POS
//!
//! Everything that decides what an order consumes, whether it can be made,
//! and what it costs. No I/O: storage lives in `mise-db`, and the async
//! services that mutate stock live in `mise-engine`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mise POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             Order management (till, delivery webhooks)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   mise-engine: coordinator, reservation ledger, sweeper, cost   │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────────┐  ┌────────▼──────────────────┐    │
//! │  │   ★ mise-core (THIS CRATE) ★    │  │  mise-db (SQLite, sqlx)   │    │
//! │  │                                 │  │  repositories, migrations │    │
//! │  │  units → catalog → bom          │  └───────────────────────────┘    │
//! │  │  availability, lifecycle, cost  │                                   │
//! │  │                                 │                                   │
//! │  │  NO I/O • NO DATABASE • NO ASYNC│                                   │
//! │  └─────────────────────────────────┘                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`units`] - storage ↔ serving unit conversion
//! - [`catalog`] - validated, tenant-scoped catalog graph
//! - [`bom`] - order line → raw item requirements
//! - [`availability`] - fulfillability checks and max-orderable report
//! - [`lifecycle`] - order state machine
//! - [`cost`] - cost cascade planning
//! - [`types`], [`money`], [`error`], [`validation`]
//!
//! ## Example Usage
//!
//! ```rust
//! use mise_core::units::{to_serving_units, Unit};
//! use rust_decimal::Decimal;
//!
//! // 2 kg of cheese on hand, recipes in grams
//! let grams = to_serving_units(Decimal::from(2), Unit::Kilogram, Unit::Gram).unwrap();
//! assert_eq!(grams, Decimal::from(2000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod bom;
pub mod catalog;
pub mod cost;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod types;
pub mod units;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use availability::{FulfillabilityReport, Shortage, StockLevels, Unverifiable};
pub use bom::{BillOfMaterials, LineRequest, Requirement};
pub use catalog::{Catalog, CatalogData};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;
pub use units::Unit;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tenant used by single-restaurant deployments and the seed data.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Reported by `max_orderable` for products whose recipe has no ingredients.
///
/// Deliberately fail-open: a drink with no tracked recipe stays sellable.
pub const UNLIMITED_ORDERABLE: i64 = 9_999;

/// Maximum quantity on a single order line.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest single payment accepted, in cents.
pub const MAX_PAYMENT_CENTS: i64 = 100_000_000;

/// Pending waste/return decisions older than this resolve as waste.
pub const DEFAULT_WASTE_EXPIRY_HOURS: i64 = 24;
