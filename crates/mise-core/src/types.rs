//! # Domain Types
//!
//! Core domain types used throughout Mise POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  CATALOG (read-only to the engine)                                     │
//! │  ┌──────────────┐   ┌─────────────────────┐   ┌───────────────────┐    │
//! │  │    Item      │◄──│ CompositeComponent  │   │     Product       │    │
//! │  │  scope       │   │ composite → item    │   │  has_variants     │    │
//! │  │  units       │   └─────────────────────┘   │  track_inventory  │    │
//! │  │  cost        │◄──────────────┬─────────────┤  ProductVariant   │    │
//! │  │  composite?  │   Ingredient / Modifier /   │  Bundle           │    │
//! │  └──────────────┘   Accessory edges           └───────────────────┘    │
//! │                                                                         │
//! │  LEDGER (owned by the Reservation Ledger)                              │
//! │  ┌──────────────┐   ┌─────────────────────┐   ┌───────────────────┐    │
//! │  │ StockRecord  │   │ InventoryMovement   │   │  LedgerAnomaly    │    │
//! │  │ qty/reserved │   │ append-only audit   │   │  clamps recorded  │    │
//! │  └──────────────┘   └─────────────────────┘   └───────────────────┘    │
//! │                                                                         │
//! │  ORDERS                                                                │
//! │  ┌──────────────┐   ┌─────────────────────┐   ┌───────────────────┐    │
//! │  │    Order     │──►│     OrderItem       │   │CancelledOrderItem │    │
//! │  │  status      │   │ cost/BOM snapshots  │   │ waste | return    │    │
//! │  └──────────────┘   └─────────────────────┘   └───────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quantities
//! Stock and recipe quantities are `Decimal`. Stock rows are counted in the
//! item's storage unit; recipes, modifiers, accessories and cancelled items
//! are expressed in the item's serving unit.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::bom::Requirement;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::units::{self, Unit};
use crate::validation;

// =============================================================================
// Item Scope
// =============================================================================

/// Who owns a catalog item.
///
/// Shared items are the platform defaults every tenant sees. A tenant may
/// clone a shared item (e.g. to set its own cost); the clone carries
/// `base_item_id` and shadows the default through
/// [`crate::catalog::Catalog::effective_item`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tenant_id", rename_all = "snake_case")]
pub enum ItemScope {
    Shared,
    Owned(String),
}

impl ItemScope {
    /// Builds a scope from a nullable owner column.
    pub fn from_owner(owner: Option<String>) -> Self {
        match owner {
            Some(tenant_id) => ItemScope::Owned(tenant_id),
            None => ItemScope::Shared,
        }
    }

    /// Returns the owning tenant, if any.
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            ItemScope::Shared => None,
            ItemScope::Owned(id) => Some(id),
        }
    }

    /// Returns true if the tenant may use items in this scope.
    pub fn is_visible_to(&self, tenant_id: &str) -> bool {
        match self {
            ItemScope::Shared => true,
            ItemScope::Owned(owner) => owner == tenant_id,
        }
    }
}

// =============================================================================
// Item
// =============================================================================

/// Food or packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Food,
    NonFood,
}

/// A raw material, ingredient, packaging accessory or composite SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub scope: ItemScope,
    /// Shared item this tenant-owned item shadows.
    pub base_item_id: Option<String>,
    pub name: String,
    pub item_type: ItemType,
    /// Unit recipes are written in (grams, millilitres, pieces).
    pub serving_unit: Unit,
    /// Unit inventory is counted in (kilograms, litres, pieces).
    pub storage_unit: Unit,
    /// Weighted cost per serving unit.
    pub cost_per_unit: Decimal,
    pub is_composite: bool,
    /// How much one production batch yields (composites only).
    pub batch_quantity: Option<Decimal>,
    pub batch_unit: Option<Unit>,
    pub is_active: bool,
}

impl Item {
    /// Checks the unit and batch invariants.
    ///
    /// ## Rules
    /// - non-empty name, non-negative cost
    /// - serving and storage units share a family
    /// - composites carry a positive batch quantity in a compatible unit
    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_name("name", &self.name)?;
        validation::validate_unit_cost(self.cost_per_unit)?;
        units::ensure_compatible(self.storage_unit, self.serving_unit)?;

        if self.is_composite {
            self.batch_in_serving_units()?;
        }

        Ok(())
    }

    /// Returns the batch yield expressed in the item's serving unit.
    pub fn batch_in_serving_units(&self) -> CoreResult<Decimal> {
        let qty = self
            .batch_quantity
            .filter(|q| q.is_sign_positive() && !q.is_zero())
            .ok_or_else(|| CoreError::InvalidBatch {
                item_id: self.id.clone(),
            })?;
        let unit = self.batch_unit.unwrap_or(self.serving_unit);
        units::convert(qty, unit, self.serving_unit)
    }
}

/// Edge `composite_item → component_item`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeComponent {
    pub composite_item_id: String,
    pub component_item_id: String,
    /// In the component's serving unit, per batch.
    pub quantity: Decimal,
}

// =============================================================================
// Products
// =============================================================================

/// A sellable menu product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub price_cents: i64,
    pub has_variants: bool,
    /// Whether the product must be backed by a recipe to be sold.
    pub track_inventory: bool,
    /// Derived ingredient cost of one unit (maintained by the cost cascade).
    pub ingredient_cost: Decimal,
    pub is_active: bool,
}

impl Product {
    /// Returns the price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_name("name", &self.name)?;
        validation::validate_price_cents(self.price_cents)?;
        Ok(())
    }
}

/// A size/flavour option of a product with its own recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub price_cents: i64,
    pub ingredient_cost: Decimal,
    pub is_active: bool,
}

impl ProductVariant {
    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_name("name", &self.name)?;
        validation::validate_price_cents(self.price_cents)?;
        Ok(())
    }
}

/// Recipe edge `product (optionally a variant) → item`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductIngredient {
    pub id: String,
    pub product_id: String,
    /// `None` = product-level recipe line.
    pub variant_id: Option<String>,
    pub item_id: String,
    pub quantity: Decimal,
    pub removable: bool,
}

/// Add-on or removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    /// "extra cheese": adds its quantity of the item.
    Extra,
    /// "no onion": removes the product's normal quantity of the item.
    Removal,
}

/// An optional modifier line on a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductModifier {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub kind: ModifierKind,
    /// Item affected; `None` for price-only modifiers.
    pub item_id: Option<String>,
    pub quantity: Decimal,
    pub price_delta_cents: i64,
}

/// How an order is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    Takeaway,
    Delivery,
}

/// Order types an accessory applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessoryScope {
    Always,
    DineIn,
    Takeaway,
    Delivery,
}

impl AccessoryScope {
    fn matches(&self, order_type: OrderType) -> bool {
        matches!(
            (self, order_type),
            (AccessoryScope::DineIn, OrderType::DineIn)
                | (AccessoryScope::Takeaway, OrderType::Takeaway)
                | (AccessoryScope::Delivery, OrderType::Delivery)
        )
    }
}

/// Non-food item consumed per product unit (packaging, cutlery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAccessory {
    pub id: String,
    pub product_id: String,
    pub item_id: String,
    pub quantity: Decimal,
    pub applicable_order_types: Vec<AccessoryScope>,
}

impl ProductAccessory {
    /// Returns true if the accessory is consumed for this order type.
    ///
    /// An unknown order type only picks up `always` accessories.
    pub fn applies_to(&self, order_type: Option<OrderType>) -> bool {
        self.applicable_order_types.iter().any(|scope| match scope {
            AccessoryScope::Always => true,
            other => order_type.is_some_and(|t| other.matches(t)),
        })
    }
}

/// A fixed combination of products sold together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub price_cents: i64,
    pub is_active: bool,
}

impl Bundle {
    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_name("name", &self.name)?;
        validation::validate_price_cents(self.price_cents)?;
        Ok(())
    }
}

/// One constituent of a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleItem {
    pub id: String,
    pub bundle_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
}

// =============================================================================
// Stock
// =============================================================================

/// Identity of a stock row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub item_id: String,
}

impl StockKey {
    pub fn new(tenant_id: &str, branch_id: Option<&str>, item_id: &str) -> Self {
        StockKey {
            tenant_id: tenant_id.to_string(),
            branch_id: branch_id.map(str::to_string),
            item_id: item_id.to_string(),
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tenant_id,
            self.branch_id.as_deref().unwrap_or("*"),
            self.item_id
        )
    }
}

/// The mutable ledger row, in storage units.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockRecord {
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub item_id: String,
    /// Physically on hand.
    #[ts(as = "String")]
    pub quantity: Decimal,
    /// Promised to open orders.
    #[ts(as = "String")]
    pub reserved_quantity: Decimal,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Available-to-promise.
    #[inline]
    pub fn available(&self) -> Decimal {
        self.quantity - self.reserved_quantity
    }

    /// `0 ≤ reserved_quantity ≤ quantity`.
    pub fn is_consistent(&self) -> bool {
        !self.reserved_quantity.is_sign_negative() && self.reserved_quantity <= self.quantity
    }
}

/// Kind of ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Restock,
    Reserve,
    Release,
    Consume,
    Waste,
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MovementKind::Restock => "restock",
            MovementKind::Reserve => "reserve",
            MovementKind::Release => "release",
            MovementKind::Consume => "consume",
            MovementKind::Waste => "waste",
        };
        f.write_str(s)
    }
}

/// Append-only audit row written by every ledger mutation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryMovement {
    pub id: String,
    pub batch_id: String,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub item_id: String,
    pub kind: MovementKind,
    pub order_ref: Option<String>,
    #[ts(as = "String")]
    pub quantity_before: Decimal,
    #[ts(as = "String")]
    pub quantity_after: Decimal,
    #[ts(as = "String")]
    pub reserved_before: Decimal,
    #[ts(as = "String")]
    pub reserved_after: Decimal,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A discrepancy the ledger clamped instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAnomaly {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub item_id: String,
    pub order_ref: Option<String>,
    pub operation: MovementKind,
    /// What the caller asked for (storage units).
    pub expected: Decimal,
    /// What the ledger actually applied (storage units).
    pub applied: Decimal,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Orders
// =============================================================================

/// Channel an order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    /// Rung up at the till; terminates at `completed`.
    Pos,
    /// Delivery platform; goes on to `picked_up`.
    DeliveryPartner,
}

/// The status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Scheduled, not yet started.
    Pending,
    /// Being prepared.
    InProgress,
    Completed,
    /// Handed to a delivery partner.
    PickedUp,
    Cancelled,
    Rejected,
    Refunded,
}

impl OrderStatus {
    /// Orders whose reservations are still held.
    pub fn holds_reservation(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::InProgress)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    /// An edit raised the total above what was already paid.
    PendingAdditionalPayment,
    Refunded,
}

impl PaymentStatus {
    /// Derives the status from what is owed and what was paid.
    ///
    /// ```text
    /// paid == 0              → Unpaid
    /// paid >= total          → Paid
    /// 0 < paid < total       → PendingAdditionalPayment
    /// ```
    pub fn from_amounts(total: Money, paid: Money) -> Self {
        if paid.is_zero() && total.is_positive() {
            PaymentStatus::Unpaid
        } else if paid >= total {
            PaymentStatus::Paid
        } else {
            PaymentStatus::PendingAdditionalPayment
        }
    }
}

/// A modifier chosen on an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ModifierSelection {
    pub modifier_id: String,
    /// How many times the modifier is applied per unit (usually 1).
    #[serde(default = "default_selection_quantity")]
    pub quantity: i64,
}

fn default_selection_quantity() -> i64 {
    1
}

impl ModifierSelection {
    pub fn once(modifier_id: impl Into<String>) -> Self {
        ModifierSelection {
            modifier_id: modifier_id.into(),
            quantity: 1,
        }
    }
}

/// The order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub source: OrderSource,
    pub order_type: Option<OrderType>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }
}

/// A line of an order.
///
/// Uses the snapshot pattern: price, ingredient cost and the resolved bill of
/// materials are frozen when the line is created, so later catalog or price
/// edits change neither profit reports nor what completion consumes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub bundle_id: Option<String>,
    pub name_snapshot: String,
    pub quantity: i64,
    pub modifiers: Vec<ModifierSelection>,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    /// Ingredient cost of one unit at the time of sale.
    #[ts(as = "String")]
    pub unit_cost_at_sale: Decimal,
    /// Raw-item demand of the whole line (serving units).
    pub requirements: Vec<Requirement>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Waste / Return Queue
// =============================================================================

/// Kitchen verdict on cancelled ingredients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WasteDecision {
    /// Ingredients were used or spoiled: deduct from stock.
    Waste,
    /// Ingredients never left the shelf: nothing to do.
    Return,
}

impl fmt::Display for WasteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WasteDecision::Waste => f.write_str("waste"),
            WasteDecision::Return => f.write_str("return"),
        }
    }
}

/// Pending decision created when reserved ingredients are cancelled.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CancelledOrderItem {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub order_id: String,
    pub order_item_id: Option<String>,
    pub item_id: String,
    pub item_name: String,
    /// Frozen amount in `unit`.
    #[ts(as = "String")]
    pub quantity: Decimal,
    pub unit: Unit,
    /// Storage unit of the item, frozen for the waste deduction.
    pub storage_unit: Unit,
    pub decision: Option<WasteDecision>,
    /// `None` with a decision present = machine-resolved by expiry.
    pub decided_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl CancelledOrderItem {
    pub fn is_pending(&self) -> bool {
        self.decision.is_none()
    }

    /// The frozen amount as a ledger requirement.
    pub fn as_requirement(&self) -> Requirement {
        Requirement {
            item_id: self.item_id.clone(),
            item_name: self.item_name.clone(),
            quantity: self.quantity,
            serving_unit: self.unit,
            storage_unit: self.storage_unit,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
