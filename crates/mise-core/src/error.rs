//! # Error Types
//!
//! Domain-specific error types for mise-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mise-core errors (this file)                                          │
//! │  ├── CoreError        - Catalog / BOM / lifecycle rule violations      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mise-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  mise-engine errors (service crate)                                    │
//! │  └── EngineError      - What the order-management layer sees           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration vs Runtime
//! Most variants here are *configuration* errors: they are raised when a
//! catalog edge is created or when a recipe cannot be interpreted. Runtime
//! stock shortfalls are not errors at this layer; the availability
//! calculator returns them as data (see [`crate::availability`]).

use thiserror::Error;

use crate::types::OrderStatus;
use crate::units::Unit;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two units from different families were paired or converted.
    ///
    /// ## When This Occurs
    /// - Creating an item with `storage_unit = kilogram`, `serving_unit = piece`
    /// - Converting a batch quantity in litres into a gram-based composite
    ///
    /// Callers must fail closed: an item whose units cannot be reconciled is
    /// never reported as in stock.
    #[error("Incompatible units: cannot convert {from} to {to}")]
    IncompatibleUnits { from: Unit, to: Unit },

    /// A composite item was linked to another composite item.
    ///
    /// ## When This Occurs
    /// ```text
    /// House Sauce (composite) ──► Tomato      ✅
    /// House Sauce (composite) ──► Mayo        ✅
    /// Burger Sauce (composite) ──► House Sauce ❌ composite-of-composite
    /// House Sauce ──► House Sauce              ❌ self reference
    /// ```
    #[error("Composite item {composite_id} cannot contain composite item {component_id}")]
    CircularCompositeReference {
        composite_id: String,
        component_id: String,
    },

    /// A composite item is missing a usable batch definition.
    #[error("Composite item {item_id} has no valid batch quantity")]
    InvalidBatch { item_id: String },

    /// A recipe references an item that is not in the catalog.
    #[error("Recipe for product {product_id} references unknown item {item_id}")]
    UnresolvableRecipe { product_id: String, item_id: String },

    /// Product cannot be found (or is inactive).
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Variant cannot be found on the given product.
    #[error("Variant {variant_id} not found on product {product_id}")]
    VariantNotFound {
        product_id: String,
        variant_id: String,
    },

    /// A product with variants was ordered without choosing one.
    ///
    /// Products with `has_variants = true` never fall back to product-level
    /// ingredients.
    #[error("Product {product_id} has variants; a variant must be selected")]
    VariantRequired { product_id: String },

    /// Bundle cannot be found (or is inactive).
    #[error("Bundle not found: {0}")]
    BundleNotFound(String),

    /// Item cannot be found.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Modifier does not exist on the ordered product.
    #[error("Modifier {modifier_id} not found on product {product_id}")]
    ModifierNotFound {
        product_id: String,
        modifier_id: String,
    },

    /// A removal modifier targets an ingredient marked as not removable.
    #[error("Ingredient {item_id} cannot be removed from product {product_id}")]
    IngredientNotRemovable { product_id: String, item_id: String },

    /// Order status transition is not part of the lifecycle.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A price, line total or order total does not fit in `i64` cents.
    #[error("Amount out of range: {0}")]
    AmountOverflow(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true for errors caused by catalog misconfiguration rather than
    /// by the caller's input.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CoreError::IncompatibleUnits { .. }
                | CoreError::CircularCompositeReference { .. }
                | CoreError::InvalidBatch { .. }
                | CoreError::UnresolvableRecipe { .. }
                | CoreError::VariantRequired { .. }
                | CoreError::IngredientNotRemovable { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unknown unit).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Mutually exclusive fields were both set, or neither was.
    #[error("{field}: {reason}")]
    Conflict { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::IncompatibleUnits {
            from: Unit::Kilogram,
            to: Unit::Piece,
        };
        assert_eq!(
            err.to_string(),
            "Incompatible units: cannot convert kilogram to piece"
        );

        let err = CoreError::VariantRequired {
            product_id: "burger".to_string(),
        };
        assert!(err.to_string().contains("variant must be selected"));
    }

    #[test]
    fn test_config_error_classification() {
        assert!(CoreError::CircularCompositeReference {
            composite_id: "a".into(),
            component_id: "b".into(),
        }
        .is_config_error());
        assert!(!CoreError::ProductNotFound("p".into()).is_config_error());
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
