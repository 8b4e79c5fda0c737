//! # Availability Calculator
//!
//! Answers "can we make this?" against a stock snapshot, without touching it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   check_fulfillability(lines)                           │
//! │                                                                         │
//! │  lines ──► BOM resolver ──► Σ required (serving units)                 │
//! │                                   │                                     │
//! │  StockLevels ── available ────────┤ storage → serving                  │
//! │  (missing row = 0)                │                                     │
//! │                                   ▼                                     │
//! │           required > available ──► Shortage                            │
//! │           units don't convert  ──► Unverifiable::IncompatibleUnits     │
//! │           recipe unresolvable  ──► Unverifiable::UnresolvableRecipe    │
//! │                                                                         │
//! │  can_fulfill = no shortages AND nothing unverifiable                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unverifiable means "refuse": the calculator never reports an item it could
//! not check as in stock.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::bom::{self, LineRequest, Requirement};
use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::types::{OrderType, StockRecord};
use crate::units::{self, Unit};
use crate::UNLIMITED_ORDERABLE;

// =============================================================================
// Stock Snapshot
// =============================================================================

/// Point-in-time stock for one (tenant, branch), keyed by item id.
#[derive(Debug, Clone, Default)]
pub struct StockLevels {
    records: HashMap<String, StockRecord>,
}

impl StockLevels {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = StockRecord>,
    {
        StockLevels {
            records: records
                .into_iter()
                .map(|r| (r.item_id.clone(), r))
                .collect(),
        }
    }

    pub fn record(&self, item_id: &str) -> Option<&StockRecord> {
        self.records.get(item_id)
    }

    /// Available-to-promise in storage units; a missing row is zero.
    pub fn available(&self, item_id: &str) -> Decimal {
        self.records
            .get(item_id)
            .map(StockRecord::available)
            .unwrap_or(Decimal::ZERO)
    }

    /// Available-to-promise converted into the requirement's serving unit.
    pub fn available_for(&self, requirement: &Requirement) -> CoreResult<Decimal> {
        units::to_serving_units(
            self.available(&requirement.item_id),
            requirement.storage_unit,
            requirement.serving_unit,
        )
    }
}

// =============================================================================
// Report Types
// =============================================================================

/// Not enough of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Shortage {
    pub item_id: String,
    pub item_name: String,
    #[ts(as = "String")]
    pub required: Decimal,
    #[ts(as = "String")]
    pub available: Decimal,
    /// Unit of `required` and `available` (the serving unit).
    pub unit: Unit,
}

impl Shortage {
    pub fn shortfall(&self) -> Decimal {
        self.required - self.available
    }
}

/// Something that could not be checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unverifiable {
    UnresolvableRecipe {
        product_id: String,
        variant_id: Option<String>,
    },
    IncompatibleUnits {
        item_id: String,
        item_name: String,
        storage_unit: Unit,
        serving_unit: Unit,
    },
}

/// Outcome of a fulfillability check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FulfillabilityReport {
    pub shortages: Vec<Shortage>,
    pub unverifiable: Vec<Unverifiable>,
    /// The summed demand that was checked.
    pub requirements: Vec<Requirement>,
}

impl FulfillabilityReport {
    pub fn can_fulfill(&self) -> bool {
        self.shortages.is_empty() && self.unverifiable.is_empty()
    }
}

// =============================================================================
// Fulfillability
// =============================================================================

/// Checks whether every line can be made from `stock`.
///
/// ## Errors
/// Caller mistakes (unknown product, unknown modifier, missing variant
/// choice, removing a required ingredient) are returned as errors. Catalog
/// defects are reported in [`FulfillabilityReport::unverifiable`].
pub fn check_fulfillability(
    catalog: &Catalog,
    stock: &StockLevels,
    lines: &[LineRequest],
    order_type: Option<OrderType>,
) -> CoreResult<FulfillabilityReport> {
    let mut report = FulfillabilityReport::default();
    let mut demand = Vec::new();

    for line in lines {
        match bom::resolve_line(catalog, line, order_type) {
            Ok(resolved) => {
                for missing in resolved.missing_recipes {
                    report.unverifiable.push(Unverifiable::UnresolvableRecipe {
                        product_id: missing.product_id,
                        variant_id: missing.variant_id,
                    });
                }
                demand.extend(resolved.requirements);
            }
            Err(err) if is_recipe_defect(&err) => {
                report.unverifiable.push(Unverifiable::UnresolvableRecipe {
                    product_id: line
                        .product_id
                        .clone()
                        .or_else(|| line.bundle_id.clone())
                        .unwrap_or_default(),
                    variant_id: line.variant_id.clone(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    report.requirements = bom::sum_requirements(demand);

    for req in &report.requirements {
        match stock.available_for(req) {
            Ok(available) if available < req.quantity => report.shortages.push(Shortage {
                item_id: req.item_id.clone(),
                item_name: req.item_name.clone(),
                required: req.quantity,
                available,
                unit: req.serving_unit,
            }),
            Ok(_) => {}
            Err(_) => report.unverifiable.push(Unverifiable::IncompatibleUnits {
                item_id: req.item_id.clone(),
                item_name: req.item_name.clone(),
                storage_unit: req.storage_unit,
                serving_unit: req.serving_unit,
            }),
        }
    }

    Ok(report)
}

/// Errors that mean the catalog, not the caller, is broken.
fn is_recipe_defect(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::UnresolvableRecipe { .. }
            | CoreError::InvalidBatch { .. }
            | CoreError::IncompatibleUnits { .. }
            | CoreError::CircularCompositeReference { .. }
    )
}

// =============================================================================
// Max Orderable
// =============================================================================

/// How many of each product could be made from current stock.
///
/// ```text
/// per ingredient:  floor(available / required_per_unit)
/// per recipe:      min over ingredients
/// per product:     max over active variants (or the product recipe)
/// ```
///
/// A recipe with no ingredients reports [`UNLIMITED_ORDERABLE`]. Ingredients
/// that cannot be checked (bad units, unresolvable recipe) count as zero.
pub fn max_orderable(catalog: &Catalog, stock: &StockLevels) -> BTreeMap<String, i64> {
    let mut result = BTreeMap::new();

    for product in catalog.products().into_iter().filter(|p| p.is_active) {
        let count = if product.has_variants {
            catalog
                .variants_of(&product.id)
                .into_iter()
                .filter(|v| v.is_active)
                .map(|v| recipe_capacity(catalog, stock, &product.id, Some(&v.id)))
                .max()
                .unwrap_or(0)
        } else {
            recipe_capacity(catalog, stock, &product.id, None)
        };
        result.insert(product.id.clone(), count);
    }

    result
}

fn recipe_capacity(catalog: &Catalog, stock: &StockLevels, product_id: &str, variant_id: Option<&str>) -> i64 {
    let requirements = match bom::recipe_requirements(catalog, product_id, variant_id) {
        Ok(reqs) => reqs,
        Err(_) => return 0,
    };

    if requirements.is_empty() {
        return UNLIMITED_ORDERABLE;
    }

    requirements
        .iter()
        .map(|req| match stock.available_for(req) {
            Ok(available) if available > Decimal::ZERO => (available / req.quantity)
                .floor()
                .to_i64()
                .unwrap_or(UNLIMITED_ORDERABLE)
                .min(UNLIMITED_ORDERABLE),
            _ => 0,
        })
        .min()
        .unwrap_or(0)
}

// =============================================================================
// Unit Tests
// =============================================================================
