//! # BOM Resolver
//!
//! Turns an order line into the raw items it consumes.
//!
//! ## Resolution Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      resolve_line(line, order_type)                     │
//! │                                                                         │
//! │  bundle? ──► one product line per BundleItem (× bundle qty)            │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  1. recipe      variant lines if a variant is given,                   │
//! │                 product lines otherwise (has_variants → must pick)     │
//! │  2. modifiers   extra   → + modifier qty × count                       │
//! │                 removal → − normal recipe qty (floored at 0)           │
//! │  3. accessories "always" + the order's type                            │
//! │  4. × line quantity                                                    │
//! │  5. composites  replaced by components × (required ÷ batch)            │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Σ per raw item (serving units) + ingredient cost                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every item reference goes through [`Catalog::effective_item`], so a tenant
//! clone of a shared ingredient is what gets reserved and costed.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Item, ModifierKind, ModifierSelection, OrderType, Product, ProductIngredient};
use crate::units::{self, Unit};
use crate::validation;

// =============================================================================
// Input
// =============================================================================

/// One line of a cart or order, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineRequest {
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub bundle_id: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub modifiers: Vec<ModifierSelection>,
}

impl LineRequest {
    pub fn product(product_id: &str, quantity: i64) -> Self {
        LineRequest {
            product_id: Some(product_id.to_string()),
            variant_id: None,
            bundle_id: None,
            quantity,
            modifiers: Vec::new(),
        }
    }

    pub fn variant(product_id: &str, variant_id: &str, quantity: i64) -> Self {
        LineRequest {
            variant_id: Some(variant_id.to_string()),
            ..LineRequest::product(product_id, quantity)
        }
    }

    pub fn bundle(bundle_id: &str, quantity: i64) -> Self {
        LineRequest {
            product_id: None,
            variant_id: None,
            bundle_id: Some(bundle_id.to_string()),
            quantity,
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifier(mut self, modifier_id: &str) -> Self {
        self.modifiers.push(ModifierSelection::once(modifier_id));
        self
    }

    /// Exactly one of product or bundle, and a sane quantity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_quantity(self.quantity)?;
        match (&self.product_id, &self.bundle_id) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => {
                return Err(ValidationError::Conflict {
                    field: "line".to_string(),
                    reason: "exactly one of product_id or bundle_id must be set".to_string(),
                })
            }
        }
        if self.bundle_id.is_some() && self.variant_id.is_some() {
            return Err(ValidationError::Conflict {
                field: "variant_id".to_string(),
                reason: "bundle lines cannot select a variant".to_string(),
            });
        }
        for selection in &self.modifiers {
            validation::validate_quantity(selection.quantity)?;
        }
        Ok(())
    }
}

// =============================================================================
// Output
// =============================================================================

/// Demand for one raw item, in its serving unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Requirement {
    pub item_id: String,
    pub item_name: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
    pub serving_unit: Unit,
    pub storage_unit: Unit,
}

impl Requirement {
    fn for_item(item: &Item, quantity: Decimal) -> Self {
        Requirement {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            quantity,
            serving_unit: item.serving_unit,
            storage_unit: item.storage_unit,
        }
    }

    /// The demand expressed in storage units, as the ledger counts it.
    pub fn storage_quantity(&self) -> CoreResult<Decimal> {
        units::to_storage_units(self.quantity, self.serving_unit, self.storage_unit)
    }
}

/// A recipe the resolver could not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MissingRecipe {
    pub product_id: String,
    pub variant_id: Option<String>,
}

/// Resolved bill of materials for one or more lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillOfMaterials {
    /// Summed per raw item, ordered by item id.
    pub requirements: Vec<Requirement>,
    /// Inventory-tracked products that have no recipe at all.
    pub missing_recipes: Vec<MissingRecipe>,
    /// Σ quantity × effective cost_per_unit over `requirements`.
    pub ingredient_cost: Decimal,
}

impl BillOfMaterials {
    /// Combines two resolutions, summing shared items.
    pub fn merge(self, other: BillOfMaterials) -> BillOfMaterials {
        let mut missing = self.missing_recipes;
        for m in other.missing_recipes {
            if !missing.contains(&m) {
                missing.push(m);
            }
        }
        BillOfMaterials {
            requirements: sum_requirements(self.requirements.into_iter().chain(other.requirements)),
            missing_recipes: missing,
            ingredient_cost: self.ingredient_cost + other.ingredient_cost,
        }
    }
}

/// Sums requirements per item, dropping zero demand.
pub fn sum_requirements<I>(requirements: I) -> Vec<Requirement>
where
    I: IntoIterator<Item = Requirement>,
{
    let mut summed: BTreeMap<String, Requirement> = BTreeMap::new();
    for req in requirements {
        summed
            .entry(req.item_id.clone())
            .and_modify(|existing| existing.quantity += req.quantity)
            .or_insert(req);
    }
    summed
        .into_values()
        .filter(|r| r.quantity > Decimal::ZERO)
        .collect()
}

/// Scales requirements by `numerator / denominator`.
///
/// Used when a line's quantity changes: demand is linear in quantity.
pub fn scale_requirements(requirements: &[Requirement], numerator: i64, denominator: i64) -> Vec<Requirement> {
    if denominator == 0 {
        return Vec::new();
    }
    // Multiply first so whole-line fractions (2/3 of 450 g) stay exact.
    let (numerator, denominator) = (Decimal::from(numerator), Decimal::from(denominator));
    requirements
        .iter()
        .map(|r| Requirement {
            quantity: r.quantity * numerator / denominator,
            ..r.clone()
        })
        .filter(|r| r.quantity > Decimal::ZERO)
        .collect()
}

// =============================================================================
// Resolver
// =============================================================================

/// Per-raw-item demand keyed by effective item id.
type Demand = BTreeMap<String, Decimal>;

/// Resolves one order line.
pub fn resolve_line(catalog: &Catalog, line: &LineRequest, order_type: Option<OrderType>) -> CoreResult<BillOfMaterials> {
    line.validate()?;

    if let Some(bundle_id) = &line.bundle_id {
        return resolve_bundle(catalog, bundle_id, line, order_type);
    }

    let product_id = line.product_id.as_deref().unwrap_or_default();
    resolve_product(
        catalog,
        product_id,
        line.variant_id.as_deref(),
        line.quantity,
        &line.modifiers,
        order_type,
    )
}

/// Resolves and sums several lines.
pub fn resolve_lines(catalog: &Catalog, lines: &[LineRequest], order_type: Option<OrderType>) -> CoreResult<BillOfMaterials> {
    let mut total = BillOfMaterials::default();
    for line in lines {
        total = total.merge(resolve_line(catalog, line, order_type)?);
    }
    Ok(total)
}

/// Ingredient-only requirements for one unit of a product or variant.
///
/// No modifiers, no accessories. Used by the max-orderable report and the
/// cost cascade.
pub fn recipe_requirements(catalog: &Catalog, product_id: &str, variant_id: Option<&str>) -> CoreResult<Vec<Requirement>> {
    let product = active_product(catalog, product_id)?;
    let recipe = recipe_lines(catalog, product, variant_id)?;

    let mut demand = Demand::new();
    for line in &recipe {
        let item = lookup(catalog, product_id, &line.item_id)?;
        *demand.entry(item.id.clone()).or_default() += line.quantity;
    }

    let demand = expand_composites(catalog, product_id, demand)?;
    Ok(to_requirements(catalog, demand).0)
}

/// Sale price of one unit of a line, modifiers included.
///
/// Variant lines use the variant's price; bundle lines use the bundle's
/// price plus the deltas of modifiers picked on its constituents.
pub fn unit_price(catalog: &Catalog, line: &LineRequest) -> CoreResult<Money> {
    line.validate()?;

    let (base, owners): (i64, Vec<String>) = match (&line.bundle_id, &line.product_id) {
        (Some(bundle_id), _) => {
            let bundle = catalog
                .bundle(bundle_id)
                .filter(|b| b.is_active)
                .ok_or_else(|| CoreError::BundleNotFound(bundle_id.clone()))?;
            let owners = catalog
                .bundle_items(bundle_id)
                .iter()
                .map(|bi| bi.product_id.clone())
                .collect();
            (bundle.price_cents, owners)
        }
        (None, Some(product_id)) => {
            let product = active_product(catalog, product_id)?;
            let base = match line.variant_id.as_deref() {
                Some(variant_id) => {
                    catalog
                        .variant(variant_id)
                        .filter(|v| v.product_id == product.id && v.is_active)
                        .ok_or_else(|| CoreError::VariantNotFound {
                            product_id: product.id.clone(),
                            variant_id: variant_id.to_string(),
                        })?
                        .price_cents
                }
                None => product.price_cents,
            };
            (base, vec![product.id.clone()])
        }
        (None, None) => {
            return Err(ValidationError::Required {
                field: "product_id".to_string(),
            }
            .into())
        }
    };

    let mut price = Money::from_cents(base);
    for selection in &line.modifiers {
        let modifier = owners
            .iter()
            .find_map(|owner| catalog.modifier(owner, &selection.modifier_id))
            .ok_or_else(|| CoreError::ModifierNotFound {
                product_id: line
                    .bundle_id
                    .clone()
                    .or_else(|| line.product_id.clone())
                    .unwrap_or_default(),
                modifier_id: selection.modifier_id.clone(),
            })?;
        let delta = Money::from_cents(modifier.price_delta_cents).multiply_quantity(selection.quantity)?;
        price = price.try_add(delta)?;
    }

    Ok(price)
}

fn resolve_bundle(
    catalog: &Catalog,
    bundle_id: &str,
    line: &LineRequest,
    order_type: Option<OrderType>,
) -> CoreResult<BillOfMaterials> {
    catalog
        .bundle(bundle_id)
        .filter(|b| b.is_active)
        .ok_or_else(|| CoreError::BundleNotFound(bundle_id.to_string()))?;

    // Each selection applies to the constituent that owns the modifier.
    for selection in &line.modifiers {
        let owned = catalog
            .bundle_items(bundle_id)
            .iter()
            .any(|bi| catalog.modifier(&bi.product_id, &selection.modifier_id).is_some());
        if !owned {
            return Err(CoreError::ModifierNotFound {
                product_id: bundle_id.to_string(),
                modifier_id: selection.modifier_id.clone(),
            });
        }
    }

    let mut total = BillOfMaterials::default();
    for bundle_item in catalog.bundle_items(bundle_id) {
        let selections: Vec<ModifierSelection> = line
            .modifiers
            .iter()
            .filter(|s| catalog.modifier(&bundle_item.product_id, &s.modifier_id).is_some())
            .cloned()
            .collect();
        let resolved = resolve_product(
            catalog,
            &bundle_item.product_id,
            bundle_item.variant_id.as_deref(),
            line.quantity * bundle_item.quantity,
            &selections,
            order_type,
        )?;
        total = total.merge(resolved);
    }
    Ok(total)
}

fn resolve_product(
    catalog: &Catalog,
    product_id: &str,
    variant_id: Option<&str>,
    quantity: i64,
    modifiers: &[ModifierSelection],
    order_type: Option<OrderType>,
) -> CoreResult<BillOfMaterials> {
    let product = active_product(catalog, product_id)?;
    let recipe = recipe_lines(catalog, product, variant_id)?;

    let mut missing_recipes = Vec::new();
    if recipe.is_empty() && product.track_inventory {
        missing_recipes.push(MissingRecipe {
            product_id: product_id.to_string(),
            variant_id: variant_id.map(str::to_string),
        });
    }

    // 1. recipe
    let mut demand = Demand::new();
    for line in &recipe {
        let item = lookup(catalog, product_id, &line.item_id)?;
        *demand.entry(item.id.clone()).or_default() += line.quantity;
    }

    // 2. modifiers
    for selection in modifiers {
        let modifier = catalog
            .modifier(product_id, &selection.modifier_id)
            .ok_or_else(|| CoreError::ModifierNotFound {
                product_id: product_id.to_string(),
                modifier_id: selection.modifier_id.clone(),
            })?;
        let Some(target) = &modifier.item_id else {
            continue;
        };
        let item = lookup(catalog, product_id, target)?;
        let count = Decimal::from(selection.quantity);

        match modifier.kind {
            ModifierKind::Extra => {
                *demand.entry(item.id.clone()).or_default() += modifier.quantity * count;
            }
            ModifierKind::Removal => {
                let normal = removable_quantity(catalog, product_id, &recipe, &item.id)?;
                if let Some(current) = demand.get_mut(&item.id) {
                    *current = (*current - normal).max(Decimal::ZERO);
                }
            }
        }
    }

    // 3. accessories
    for accessory in catalog.accessories_for(product_id) {
        if accessory.applies_to(order_type) {
            let item = lookup(catalog, product_id, &accessory.item_id)?;
            *demand.entry(item.id.clone()).or_default() += accessory.quantity;
        }
    }

    // 4. line quantity
    let multiplier = Decimal::from(quantity);
    for qty in demand.values_mut() {
        *qty *= multiplier;
    }

    // 5. composites
    let demand = expand_composites(catalog, product_id, demand)?;
    let (requirements, ingredient_cost) = to_requirements(catalog, demand);

    Ok(BillOfMaterials {
        requirements,
        missing_recipes,
        ingredient_cost,
    })
}

fn active_product<'a>(catalog: &'a Catalog, product_id: &str) -> CoreResult<&'a Product> {
    catalog
        .product(product_id)
        .filter(|p| p.is_active)
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
}

/// Picks variant-level or product-level recipe lines.
fn recipe_lines<'a>(
    catalog: &'a Catalog,
    product: &Product,
    variant_id: Option<&str>,
) -> CoreResult<Vec<&'a ProductIngredient>> {
    match variant_id {
        Some(variant_id) => {
            catalog
                .variant(variant_id)
                .filter(|v| v.product_id == product.id && v.is_active)
                .ok_or_else(|| CoreError::VariantNotFound {
                    product_id: product.id.clone(),
                    variant_id: variant_id.to_string(),
                })?;
            Ok(catalog.ingredients_for(&product.id, Some(variant_id)))
        }
        None if product.has_variants => Err(CoreError::VariantRequired {
            product_id: product.id.clone(),
        }),
        None => Ok(catalog.ingredients_for(&product.id, None)),
    }
}

fn lookup<'a>(catalog: &'a Catalog, product_id: &str, item_id: &str) -> CoreResult<&'a Item> {
    catalog
        .effective_item(item_id)
        .ok_or_else(|| CoreError::UnresolvableRecipe {
            product_id: product_id.to_string(),
            item_id: item_id.to_string(),
        })
}

/// Normal recipe quantity of an item, if every line using it is removable.
fn removable_quantity(
    catalog: &Catalog,
    product_id: &str,
    recipe: &[&ProductIngredient],
    item_id: &str,
) -> CoreResult<Decimal> {
    let mut normal = Decimal::ZERO;
    for line in recipe.iter().filter(|l| catalog.resolves_to(&l.item_id, item_id)) {
        if !line.removable {
            return Err(CoreError::IngredientNotRemovable {
                product_id: product_id.to_string(),
                item_id: item_id.to_string(),
            });
        }
        normal += line.quantity;
    }
    Ok(normal)
}

/// Replaces composites by their components, one level, scaled per batch.
fn expand_composites(catalog: &Catalog, product_id: &str, demand: Demand) -> CoreResult<Demand> {
    let mut expanded = Demand::new();

    for (item_id, required) in demand {
        let item = lookup(catalog, product_id, &item_id)?;
        if !item.is_composite {
            *expanded.entry(item_id).or_default() += required;
            continue;
        }

        let batch = item.batch_in_serving_units()?;
        let factor = required / batch;

        for component in catalog.components_of(item) {
            let raw = lookup(catalog, product_id, &component.component_item_id)?;
            if raw.is_composite {
                return Err(CoreError::CircularCompositeReference {
                    composite_id: item.id.clone(),
                    component_id: raw.id.clone(),
                });
            }
            *expanded.entry(raw.id.clone()).or_default() += component.quantity * factor;
        }
    }

    Ok(expanded)
}

fn to_requirements(catalog: &Catalog, demand: Demand) -> (Vec<Requirement>, Decimal) {
    let mut cost = Decimal::ZERO;
    let requirements = demand
        .into_iter()
        .filter(|(_, qty)| *qty > Decimal::ZERO)
        .filter_map(|(item_id, qty)| {
            let item = catalog.item(&item_id)?;
            cost += qty * item.cost_per_unit;
            Some(Requirement::for_item(item, qty))
        })
        .collect();
    (requirements, cost)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use rust_decimal_macros::dec;

    fn catalog() -> Catalog {
        Catalog::new(TENANT, restaurant()).unwrap()
    }

    fn qty(bom: &BillOfMaterials, item_id: &str) -> Decimal {
        bom.requirements
            .iter()
            .find(|r| r.item_id == item_id)
            .map(|r| r.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    #[test]
    fn test_burger_expands_house_sauce() {
        let bom = resolve_line(&catalog(), &LineRequest::product("burger", 2), Some(OrderType::DineIn)).unwrap();

        assert_eq!(qty(&bom, "cheese"), dec!(300));
        assert_eq!(qty(&bom, "bun"), dec!(2));
        // 100 g sauce = 0.2 batch → 60 g tomato, 40 g mayo
        assert_eq!(qty(&bom, "tomato"), dec!(60));
        assert_eq!(qty(&bom, "mayo"), dec!(40));
        assert_eq!(qty(&bom, "house_sauce"), dec!(0));
        // dine-in: napkins only, no box
        assert_eq!(qty(&bom, "napkin"), dec!(4));
        assert_eq!(qty(&bom, "box"), dec!(0));
        assert!(bom.missing_recipes.is_empty());
    }

    #[test]
    fn test_accessories_follow_order_type() {
        let c = catalog();
        let takeaway = resolve_line(&c, &LineRequest::product("burger", 1), Some(OrderType::Takeaway)).unwrap();
        assert_eq!(qty(&takeaway, "box"), dec!(1));

        let unknown = resolve_line(&c, &LineRequest::product("burger", 1), None).unwrap();
        assert_eq!(qty(&unknown, "box"), dec!(0));
        assert_eq!(qty(&unknown, "napkin"), dec!(2));
    }

    #[test]
    fn test_extra_and_removal_modifiers() {
        let c = catalog();
        let line = LineRequest::product("burger", 1)
            .with_modifier("extra_cheese")
            .with_modifier("no_sauce");
        let bom = resolve_line(&c, &line, None).unwrap();

        assert_eq!(qty(&bom, "cheese"), dec!(180));
        assert_eq!(qty(&bom, "tomato"), dec!(0));
        assert_eq!(qty(&bom, "mayo"), dec!(0));
    }

    #[test]
    fn test_removal_of_required_ingredient_is_rejected() {
        let line = LineRequest::product("burger", 1).with_modifier("no_cheese");
        assert!(matches!(
            resolve_line(&catalog(), &line, None),
            Err(CoreError::IngredientNotRemovable { .. })
        ));
    }

    #[test]
    fn test_variant_required_and_variant_scoping() {
        let c = catalog();
        assert!(matches!(
            resolve_line(&c, &LineRequest::product("fries", 1), None),
            Err(CoreError::VariantRequired { .. })
        ));

        let large = resolve_line(&c, &LineRequest::variant("fries", "fries_l", 2), None).unwrap();
        assert_eq!(qty(&large, "potato"), dec!(500));

        assert!(matches!(
            resolve_line(&c, &LineRequest::variant("burger", "fries_l", 1), None),
            Err(CoreError::VariantNotFound { .. })
        ));
    }

    #[test]
    fn test_bundle_sums_constituents() {
        let bom = resolve_line(&catalog(), &LineRequest::bundle("combo", 2), None).unwrap();
        assert_eq!(qty(&bom, "cheese"), dec!(300));
        assert_eq!(qty(&bom, "potato"), dec!(500));
        assert_eq!(qty(&bom, "bun"), dec!(2));
    }

    #[test]
    fn test_bundle_modifier_applies_to_owning_product() {
        let line = LineRequest::bundle("combo", 1).with_modifier("extra_cheese");
        let bom = resolve_line(&catalog(), &line, None).unwrap();
        assert_eq!(qty(&bom, "cheese"), dec!(180));

        let bad = LineRequest::bundle("combo", 1).with_modifier("nope");
        assert!(matches!(
            resolve_line(&catalog(), &bad, None),
            Err(CoreError::ModifierNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_items_are_summed_across_lines() {
        let lines = vec![LineRequest::product("burger", 1), LineRequest::product("burger", 2)];
        let bom = resolve_lines(&catalog(), &lines, None).unwrap();
        assert_eq!(qty(&bom, "cheese"), dec!(450));
        assert_eq!(bom.requirements.iter().filter(|r| r.item_id == "cheese").count(), 1);
    }

    #[test]
    fn test_missing_recipe_only_for_tracked_products() {
        let c = catalog();
        let water = resolve_line(&c, &LineRequest::product("water", 3), None).unwrap();
        assert!(water.requirements.is_empty());
        assert!(water.missing_recipes.is_empty());

        let salad = resolve_line(&c, &LineRequest::product("salad", 1), None).unwrap();
        assert_eq!(salad.missing_recipes.len(), 1);
        assert_eq!(salad.missing_recipes[0].product_id, "salad");
    }

    #[test]
    fn test_unknown_item_is_unresolvable() {
        let mut data = restaurant();
        data.ingredients.push(crate::catalog::fixtures::ingredient("salad", None, "ghost", dec!(10)));
        let c = Catalog::new(TENANT, data).unwrap();
        assert!(matches!(
            resolve_line(&c, &LineRequest::product("salad", 1), None),
            Err(CoreError::UnresolvableRecipe { .. })
        ));
    }

    #[test]
    fn test_ingredient_cost_uses_effective_costs() {
        let bom = resolve_line(&catalog(), &LineRequest::product("burger", 1), None).unwrap();
        // cheese 1.20 + tomato 0.03 + mayo 0.08 + bun 0.25 + napkins 0.02
        assert_eq!(bom.ingredient_cost, dec!(1.58));
    }

    #[test]
    fn test_recipe_requirements_ignore_modifiers_and_accessories() {
        let reqs = recipe_requirements(&catalog(), "burger", None).unwrap();
        assert!(reqs.iter().all(|r| r.item_id != "napkin" && r.item_id != "box"));
        assert_eq!(reqs.len(), 4);
    }

    #[test]
    fn test_scale_requirements() {
        let bom = resolve_line(&catalog(), &LineRequest::product("burger", 3), None).unwrap();
        let released = scale_requirements(&bom.requirements, 2, 3);
        let cheese = released.iter().find(|r| r.item_id == "cheese").unwrap();
        assert_eq!(cheese.quantity, dec!(300));
    }

    #[test]
    fn test_unit_price() {
        let catalog = catalog();
        let burger = LineRequest::product("burger", 2).with_modifier("extra_cheese");
        assert_eq!(unit_price(&catalog, &burger).unwrap().cents(), 1300);

        let large = LineRequest::variant("fries", "fries_l", 1);
        assert_eq!(unit_price(&catalog, &large).unwrap().cents(), 550);

        let combo = LineRequest::bundle("combo", 1).with_modifier("extra_cheese");
        assert_eq!(unit_price(&catalog, &combo).unwrap().cents(), 1550);
    }

    #[test]
    fn test_line_validation() {
        assert!(LineRequest::product("burger", 0).validate().is_err());
        let both = LineRequest {
            bundle_id: Some("combo".into()),
            ..LineRequest::product("burger", 1)
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_modifier_quantity_is_bounded() {
        let catalog = catalog();
        let line = LineRequest {
            modifiers: vec![ModifierSelection {
                modifier_id: "extra_cheese".into(),
                quantity: 100_000_000_000_000_000,
            }],
            ..LineRequest::product("burger", 1)
        };
        assert!(matches!(line.validate(), Err(ValidationError::OutOfRange { .. })));
        assert!(unit_price(&catalog, &line).is_err());
        assert!(resolve_line(&catalog, &line, None).is_err());
    }

    #[test]
    fn test_modifier_price_overflow_is_an_error() {
        let mut data = restaurant();
        for modifier in &mut data.modifiers {
            if modifier.id == "extra_cheese" {
                modifier.price_delta_cents = i64::MAX;
            }
        }
        let catalog = Catalog::new(TENANT, data).unwrap();
        let line = LineRequest::product("burger", 1).with_modifier("extra_cheese");
        assert!(matches!(unit_price(&catalog, &line), Err(CoreError::AmountOverflow(_))));
    }
}
