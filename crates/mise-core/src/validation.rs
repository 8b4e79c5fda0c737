//! # Validation Module
//!
//! Input checks run before business logic touches the catalog or the ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE                                                  │
//! │  ├── names, quantities, prices, ids                                    │
//! │  └── reject before any lookup happens                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Catalog / BOM rules (CoreError)                              │
//! │  ├── unit families, composite nesting                                  │
//! │  └── variant selection, removable ingredients                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite constraints                                           │
//! │  └── CHECK (reserved_quantity >= 0), foreign keys, uniqueness          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::{MAX_ITEM_QUANTITY, MAX_PAYMENT_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a catalog or order display name.
///
/// ## Example
/// ```rust
/// use mise_core::validation::validate_name;
///
/// assert!(validate_name("name", "House Sauce").is_ok());
/// assert!(validate_name("name", "  ").is_err());
/// ```
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an order-line quantity (1..=MAX_ITEM_QUANTITY).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock or recipe amount: strictly positive.
pub fn validate_positive_amount(field: &str, amount: Decimal) -> ValidationResult<()> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a cost per unit: zero is allowed (free samples), negative is not.
pub fn validate_unit_cost(cost: Decimal) -> ValidationResult<()> {
    if cost.is_sign_negative() && !cost.is_zero() {
        return Err(ValidationError::MustBePositive {
            field: "cost_per_unit".to_string(),
        });
    }
    Ok(())
}

/// Validates a price in cents (zero allowed).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents (1..=MAX_PAYMENT_CENTS).
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    if cents > MAX_PAYMENT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "payment amount".to_string(),
            min: 1,
            max: MAX_PAYMENT_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
