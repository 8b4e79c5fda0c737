//! # Cost Cascade
//!
//! Works out which derived costs change when one item's cost changes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Tomato: $0.0005/g → $0.001/g                                          │
//! │       │                                                                 │
//! │       ▼  phase 1: composites containing tomato                         │
//! │  House Sauce = (300 g × 0.001 + 200 g × 0.004) ÷ 500 g = $0.0022/g     │
//! │       │                                                                 │
//! │       ▼  phase 2: products / variants using tomato OR house sauce      │
//! │  Burger = 150 g cheese + 50 g sauce + 1 bun                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because composites are one level deep, two phases cover every affected
//! row and no graph walk is needed. Planning is pure; persisting the plan is
//! the engine's job.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::types::Item;

/// Which kind of row a cost change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CostTarget {
    Item,
    Product,
    Variant,
}

/// One derived cost, before and after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostChange {
    pub target: CostTarget,
    pub id: String,
    pub name: String,
    #[ts(as = "String")]
    pub old_cost: Decimal,
    #[ts(as = "String")]
    pub new_cost: Decimal,
}

impl CostChange {
    pub fn is_changed(&self) -> bool {
        self.old_cost != self.new_cost
    }
}

/// Everything the cascade would rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CascadePlan {
    pub composites: Vec<CostChange>,
    pub products: Vec<CostChange>,
    pub variants: Vec<CostChange>,
}

impl CascadePlan {
    pub fn is_empty(&self) -> bool {
        self.composites.is_empty() && self.products.is_empty() && self.variants.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &CostChange> {
        self.composites
            .iter()
            .chain(self.products.iter())
            .chain(self.variants.iter())
    }
}

/// Cost per serving unit of a composite, from its components' effective costs.
pub fn composite_unit_cost(catalog: &Catalog, composite: &Item) -> CoreResult<Decimal> {
    let batch = composite.batch_in_serving_units()?;
    let mut total = Decimal::ZERO;

    for component in catalog.components_of(composite) {
        let item = catalog
            .effective_item(&component.component_item_id)
            .ok_or_else(|| CoreError::ItemNotFound(component.component_item_id.clone()))?;
        total += component.quantity * item.cost_per_unit;
    }

    Ok(total / batch)
}

/// Ingredient cost of one unit of a product (or one of its variants).
///
/// Composite ingredients are priced at their own `cost_per_unit`, which
/// phase 1 keeps current.
pub fn recipe_cost(catalog: &Catalog, product_id: &str, variant_id: Option<&str>) -> CoreResult<Decimal> {
    let mut total = Decimal::ZERO;
    for line in catalog.ingredients_for(product_id, variant_id) {
        let item = catalog
            .effective_item(&line.item_id)
            .ok_or_else(|| CoreError::UnresolvableRecipe {
                product_id: product_id.to_string(),
                item_id: line.item_id.clone(),
            })?;
        total += line.quantity * item.cost_per_unit;
    }
    Ok(total)
}

/// Plans the cascade for an item whose cost is already updated in `catalog`.
pub fn plan_cascade(catalog: &Catalog, changed_item_id: &str) -> CoreResult<CascadePlan> {
    let changed = catalog
        .item(changed_item_id)
        .ok_or_else(|| CoreError::ItemNotFound(changed_item_id.to_string()))?;

    let mut working = catalog.clone();
    let mut plan = CascadePlan::default();
    let mut affected: HashSet<String> = HashSet::from([changed.id.clone()]);

    // Phase 1: composites that contain the changed item.
    for composite in catalog.composites_containing(&changed.id) {
        let new_cost = composite_unit_cost(catalog, composite)?;
        plan.composites.push(CostChange {
            target: CostTarget::Item,
            id: composite.id.clone(),
            name: composite.name.clone(),
            old_cost: composite.cost_per_unit,
            new_cost,
        });
        working.set_item_cost(&composite.id, new_cost);
        affected.insert(composite.id.clone());
    }

    // Phase 2: products and variants referencing anything touched above.
    let uses_affected = |product_id: &str, variant_id: Option<&str>| {
        working
            .ingredients_for(product_id, variant_id)
            .iter()
            .any(|line| {
                working
                    .effective_item(&line.item_id)
                    .is_some_and(|item| affected.contains(&item.id))
            })
    };

    for product in working.products() {
        if uses_affected(&product.id, None) {
            plan.products.push(CostChange {
                target: CostTarget::Product,
                id: product.id.clone(),
                name: product.name.clone(),
                old_cost: product.ingredient_cost,
                new_cost: recipe_cost(&working, &product.id, None)?,
            });
        }

        for variant in working.variants_of(&product.id) {
            if uses_affected(&product.id, Some(&variant.id)) {
                plan.variants.push(CostChange {
                    target: CostTarget::Variant,
                    id: variant.id.clone(),
                    name: format!("{} ({})", product.name, variant.name),
                    old_cost: variant.ingredient_cost,
                    new_cost: recipe_cost(&working, &product.id, Some(&variant.id))?,
                });
            }
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use crate::money::Money;
    use rust_decimal_macros::dec;

    #[test]
    fn test_house_sauce_cascade() {
        // Tomato was $0.50/kg; it is now $1/kg.
        let mut data = restaurant();
        for item in data.items.iter_mut() {
            match item.id.as_str() {
                "house_sauce" => item.cost_per_unit = dec!(0.0019),
                "tomato" => item.cost_per_unit = dec!(0.001),
                _ => {}
            }
        }
        let catalog = Catalog::new(TENANT, data).unwrap();

        let plan = plan_cascade(&catalog, "tomato").unwrap();

        assert_eq!(plan.composites.len(), 1);
        let sauce = &plan.composites[0];
        assert_eq!(sauce.id, "house_sauce");
        assert_eq!(sauce.old_cost, dec!(0.0019));
        assert_eq!(sauce.new_cost, dec!(0.0022));

        assert_eq!(plan.products.len(), 1);
        let burger = &plan.products[0];
        assert_eq!(burger.id, "burger");
        // 150 × 0.008 + 50 × 0.0022 + 0.25
        assert_eq!(burger.new_cost, dec!(1.56));
        assert!(plan.variants.is_empty());
    }

    #[test]
    fn test_sauce_contribution_per_fifty_grams() {
        let catalog = Catalog::new(TENANT, restaurant()).unwrap();
        let sauce = catalog.item("house_sauce").unwrap();
        let per_gram = composite_unit_cost(&catalog, sauce).unwrap();
        assert_eq!(Money::from_decimal(per_gram * dec!(50)).cents(), 11);
    }

    #[test]
    fn test_variant_cascade_skips_unrelated_products() {
        let catalog = Catalog::new(TENANT, restaurant()).unwrap();
        let plan = plan_cascade(&catalog, "potato").unwrap();
        assert!(plan.composites.is_empty());
        assert!(plan.products.is_empty());
        let ids: Vec<&str> = plan.variants.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["fries_l", "fries_s"]);
        assert_eq!(plan.variants[0].new_cost, dec!(0.5));
    }

    #[test]
    fn test_unknown_item() {
        let catalog = Catalog::new(TENANT, restaurant()).unwrap();
        assert!(matches!(plan_cascade(&catalog, "ghost"), Err(CoreError::ItemNotFound(_))));
    }
}
