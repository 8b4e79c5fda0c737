//! # Unit Conversion
//!
//! Converts between the unit inventory is counted in (storage unit) and the
//! unit recipes are written in (serving unit).
//!
//! ## Unit Families
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Unit Families                                   │
//! │                                                                         │
//! │   MASS             VOLUME             COUNT                             │
//! │   ────             ──────             ─────                             │
//! │   kilogram         litre              piece                             │
//! │     │ ×1000          │ ×1000            │ ×1                            │
//! │     ▼                ▼                  ▼                               │
//! │   gram             millilitre         piece                             │
//! │                                                                         │
//! │   Crossing a family boundary (kg → piece) is ALWAYS an error.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fail Closed
//! A conversion error never degrades into "skip the check". Callers that
//! cannot convert must treat the item as unavailable.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Unit Family
// =============================================================================

/// Physical dimension a unit measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    Mass,
    Volume,
    Count,
}

// =============================================================================
// Unit
// =============================================================================

/// A storage or serving unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Kilogram,
    Gram,
    Litre,
    Millilitre,
    Piece,
}

impl Unit {
    /// Returns the family this unit belongs to.
    pub const fn family(&self) -> UnitFamily {
        match self {
            Unit::Kilogram | Unit::Gram => UnitFamily::Mass,
            Unit::Litre | Unit::Millilitre => UnitFamily::Volume,
            Unit::Piece => UnitFamily::Count,
        }
    }

    /// How many of the family's base unit (g, mL, piece) one of this unit is.
    fn base_factor(&self) -> Decimal {
        match self {
            Unit::Kilogram | Unit::Litre => Decimal::ONE_THOUSAND,
            Unit::Gram | Unit::Millilitre | Unit::Piece => Decimal::ONE,
        }
    }

    /// Short label for receipts and logs.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Unit::Kilogram => "kg",
            Unit::Gram => "g",
            Unit::Litre => "L",
            Unit::Millilitre => "mL",
            Unit::Piece => "pcs",
        }
    }

    /// Returns true if both units measure the same dimension.
    pub fn is_compatible_with(&self, other: Unit) -> bool {
        self.family() == other.family()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Unit::Kilogram => "kilogram",
            Unit::Gram => "gram",
            Unit::Litre => "litre",
            Unit::Millilitre => "millilitre",
            Unit::Piece => "piece",
        };
        f.write_str(name)
    }
}

impl FromStr for Unit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kg" | "kilogram" | "kilograms" => Ok(Unit::Kilogram),
            "g" | "gram" | "grams" => Ok(Unit::Gram),
            "l" | "litre" | "liter" | "litres" | "liters" => Ok(Unit::Litre),
            "ml" | "millilitre" | "milliliter" | "millilitres" | "milliliters" => {
                Ok(Unit::Millilitre)
            }
            "pc" | "pcs" | "piece" | "pieces" => Ok(Unit::Piece),
            other => Err(ValidationError::InvalidFormat {
                field: "unit".to_string(),
                reason: format!("unknown unit '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Conversion Functions
// =============================================================================

/// Converts a value between two units of the same family.
///
/// ## Example
/// ```rust
/// use mise_core::units::{convert, Unit};
/// use rust_decimal::Decimal;
///
/// let grams = convert(Decimal::new(15, 1), Unit::Kilogram, Unit::Gram).unwrap();
/// assert_eq!(grams, Decimal::from(1500));
///
/// assert!(convert(Decimal::ONE, Unit::Kilogram, Unit::Piece).is_err());
/// ```
pub fn convert(value: Decimal, from: Unit, to: Unit) -> CoreResult<Decimal> {
    ensure_compatible(from, to)?;
    if from == to {
        return Ok(value);
    }
    Ok(value * from.base_factor() / to.base_factor())
}

/// Converts a stock quantity (storage units) into serving units.
///
/// ## Example
/// ```text
/// Cheese: 2 kg on hand, recipes in grams
/// to_serving_units(2, Kilogram, Gram) = 2000
/// ```
pub fn to_serving_units(value: Decimal, storage_unit: Unit, serving_unit: Unit) -> CoreResult<Decimal> {
    convert(value, storage_unit, serving_unit)
}

/// Converts a recipe quantity (serving units) into storage units.
pub fn to_storage_units(value: Decimal, serving_unit: Unit, storage_unit: Unit) -> CoreResult<Decimal> {
    convert(value, serving_unit, storage_unit)
}

/// Rejects a unit pair that crosses families.
///
/// Called when an item is created or its units are edited.
pub fn ensure_compatible(a: Unit, b: Unit) -> CoreResult<()> {
    if a.is_compatible_with(b) {
        Ok(())
    } else {
        Err(CoreError::IncompatibleUnits { from: a, to: b })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mass_and_volume_conversion() {
        assert_eq!(to_serving_units(dec!(2), Unit::Kilogram, Unit::Gram).unwrap(), dec!(2000));
        assert_eq!(to_storage_units(dec!(150), Unit::Gram, Unit::Kilogram).unwrap(), dec!(0.15));
        assert_eq!(to_serving_units(dec!(1.5), Unit::Litre, Unit::Millilitre).unwrap(), dec!(1500));
        assert_eq!(to_storage_units(dec!(250), Unit::Millilitre, Unit::Litre).unwrap(), dec!(0.25));
    }

    #[test]
    fn test_identity_conversion() {
        assert_eq!(convert(dec!(7), Unit::Piece, Unit::Piece).unwrap(), dec!(7));
        assert_eq!(convert(dec!(3.5), Unit::Gram, Unit::Gram).unwrap(), dec!(3.5));
    }

    #[test]
    fn test_cross_family_always_fails() {
        let all = [Unit::Kilogram, Unit::Gram, Unit::Litre, Unit::Millilitre, Unit::Piece];
        for from in all {
            for to in all {
                let result = convert(dec!(1), from, to);
                if from.family() == to.family() {
                    assert!(result.is_ok(), "{from} -> {to} should convert");
                } else {
                    assert!(
                        matches!(result, Err(CoreError::IncompatibleUnits { .. })),
                        "{from} -> {to} must be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("kg".parse::<Unit>().unwrap(), Unit::Kilogram);
        assert_eq!("Grams".parse::<Unit>().unwrap(), Unit::Gram);
        assert_eq!("ml".parse::<Unit>().unwrap(), Unit::Millilitre);
        assert_eq!("pcs".parse::<Unit>().unwrap(), Unit::Piece);
        assert!("bushel".parse::<Unit>().is_err());
    }
}
