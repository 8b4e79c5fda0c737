//! # Repository Module
//!
//! Database repository implementations for Mise POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  mise-engine                                                           │
//! │       │                                                                 │
//! │       │  db.catalog().load_data(tenant)                                │
//! │       │  stock::apply(&mut tx, ...)   ← inside a ledger transaction    │
//! │       ▼                                                                 │
//! │  Repositories                                                          │
//! │  ├── CatalogRepository    items, recipes, products, bundles            │
//! │  ├── StockRepository      stock rows, reservations, movements          │
//! │  ├── OrderRepository      orders and order lines                       │
//! │  └── CancelledRepository  waste/return decision queue                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reads vs Transactional Writes
//! Reads go through the repository's pool. Writes that must commit together
//! with a ledger mutation are free functions taking `&mut SqliteConnection`,
//! so the caller decides the transaction boundary.

pub mod cancelled;
pub mod catalog;
pub mod order;
pub mod stock;

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DbError, DbResult};

/// Parses a decimal stored as TEXT.
pub(crate) fn parse_decimal(column: &str, value: &str) -> DbResult<Decimal> {
    Decimal::from_str(value).map_err(|e| DbError::invalid(column, value, e))
}

pub(crate) fn parse_optional_decimal(column: &str, value: Option<&str>) -> DbResult<Option<Decimal>> {
    value.map(|v| parse_decimal(column, v)).transpose()
}

/// Ledger tables key "no branch" as `''`.
pub(crate) fn branch_key(branch_id: Option<&str>) -> &str {
    branch_id.unwrap_or("")
}

pub(crate) fn branch_from_key(key: String) -> Option<String> {
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

pub(crate) fn to_json<T: Serialize>(column: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::invalid(column, "<unserializable>", e))
}

pub(crate) fn from_json<T: DeserializeOwned>(column: &str, value: &str) -> DbResult<T> {
    serde_json::from_str(value).map_err(|e| DbError::invalid(column, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_text_round_trip_is_exact() {
        assert_eq!(parse_decimal("q", &dec!(1.85).to_string()).unwrap(), dec!(1.85));
        assert!(parse_decimal("q", "1,85").is_err());
    }

    #[test]
    fn test_branch_key() {
        assert_eq!(branch_key(None), "");
        assert_eq!(branch_from_key(String::new()), None);
        assert_eq!(branch_from_key("b1".into()), Some("b1".to_string()));
    }
}
