//! # Catalog Graph
//!
//! An immutable, tenant-scoped view of the product catalog that the BOM
//! resolver, availability calculator and cost cascade walk.
//!
//! ## Graph Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Catalog Graph                                   │
//! │                                                                         │
//! │   Bundle ──► BundleItem ──► Product ──► ProductVariant                 │
//! │                                │              │                         │
//! │                                ├──────────────┴──► ProductIngredient ─┐ │
//! │                                ├──► ProductModifier ──────────────────┤ │
//! │                                └──► ProductAccessory ─────────────────┤ │
//! │                                                                       ▼ │
//! │                         effective_item(id) ◄── tenant clone shadows   │ │
//! │                                │               the shared default     │ │
//! │                                ▼                                        │
//! │                  Item ──► CompositeComponent ──► Item (raw)            │
//! │                            (exactly one level)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Nesting Rule
//! A composite's components are always raw items. `Catalog::new` rejects a
//! graph with composite-of-composite or self links, so a resolver holding a
//! `Catalog` never needs to recurse or detect cycles.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::{CoreError, CoreResult};
use crate::types::{
    Bundle, BundleItem, CompositeComponent, Item, ItemScope, Product, ProductAccessory,
    ProductIngredient, ProductModifier, ProductVariant,
};

// =============================================================================
// Catalog Data
// =============================================================================

/// Raw catalog rows as loaded from storage.
#[derive(Debug, Clone, Default)]
pub struct CatalogData {
    pub items: Vec<Item>,
    pub components: Vec<CompositeComponent>,
    pub products: Vec<Product>,
    pub variants: Vec<ProductVariant>,
    pub ingredients: Vec<ProductIngredient>,
    pub modifiers: Vec<ProductModifier>,
    pub accessories: Vec<ProductAccessory>,
    pub bundles: Vec<Bundle>,
    pub bundle_items: Vec<BundleItem>,
}

// =============================================================================
// Catalog
// =============================================================================

/// Validated catalog for one tenant.
#[derive(Debug, Clone)]
pub struct Catalog {
    tenant_id: String,
    items: HashMap<String, Item>,
    /// base_item_id → tenant clone id
    shadows: HashMap<String, String>,
    components: HashMap<String, Vec<CompositeComponent>>,
    products: HashMap<String, Product>,
    variants: HashMap<String, ProductVariant>,
    ingredients: HashMap<String, Vec<ProductIngredient>>,
    modifiers: HashMap<String, Vec<ProductModifier>>,
    accessories: HashMap<String, Vec<ProductAccessory>>,
    bundles: HashMap<String, Bundle>,
    bundle_items: HashMap<String, Vec<BundleItem>>,
}

impl Catalog {
    /// Builds the tenant view and enforces the one-level composite rule.
    ///
    /// Rows owned by other tenants are dropped. Item unit mismatches are NOT
    /// rejected here: such items load, and every consumer fails closed on
    /// them at use time.
    pub fn new(tenant_id: &str, data: CatalogData) -> CoreResult<Self> {
        let mut items = HashMap::new();
        let mut shadows = HashMap::new();

        for item in data.items {
            if !item.scope.is_visible_to(tenant_id) {
                continue;
            }
            if let (ItemScope::Owned(_), Some(base)) = (&item.scope, &item.base_item_id) {
                shadows.insert(base.clone(), item.id.clone());
            }
            items.insert(item.id.clone(), item);
        }

        let products: HashMap<String, Product> = data
            .products
            .into_iter()
            .filter(|p| p.tenant_id == tenant_id)
            .map(|p| (p.id.clone(), p))
            .collect();

        let variants = data
            .variants
            .into_iter()
            .filter(|v| products.contains_key(&v.product_id))
            .map(|v| (v.id.clone(), v))
            .collect();

        let mut catalog = Catalog {
            tenant_id: tenant_id.to_string(),
            items,
            shadows,
            components: HashMap::new(),
            ingredients: group_by(data.ingredients, |i| i.product_id.clone()),
            modifiers: group_by(data.modifiers, |m| m.product_id.clone()),
            accessories: group_by(data.accessories, |a| a.product_id.clone()),
            bundles: data
                .bundles
                .into_iter()
                .filter(|b| b.tenant_id == tenant_id)
                .map(|b| (b.id.clone(), b))
                .collect(),
            bundle_items: group_by(data.bundle_items, |b| b.bundle_id.clone()),
            products,
            variants,
        };

        for component in data.components {
            // Components of composites this tenant cannot see are irrelevant.
            if !catalog.items.contains_key(&component.composite_item_id) {
                continue;
            }
            catalog.check_link(&component.composite_item_id, &component.component_item_id)?;
            catalog
                .components
                .entry(component.composite_item_id.clone())
                .or_default()
                .push(component);
        }

        Ok(catalog)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Validates a prospective `composite → component` edge.
    ///
    /// Called before a link is persisted and for every edge at load.
    pub fn check_link(&self, composite_id: &str, component_id: &str) -> CoreResult<()> {
        let composite = self
            .effective_item(composite_id)
            .ok_or_else(|| CoreError::ItemNotFound(composite_id.to_string()))?;
        let component = self
            .effective_item(component_id)
            .ok_or_else(|| CoreError::ItemNotFound(component_id.to_string()))?;

        validate_link(composite, component)
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Returns the item as stored, ignoring shadowing.
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Returns the item a reference actually means for this tenant.
    ///
    /// ```text
    /// recipe → "tomato" (shared)
    ///            │
    ///            ├── tenant has clone with base_item_id = "tomato"?
    ///            │        yes → tenant clone
    ///            └──      no  → shared "tomato"
    /// ```
    pub fn effective_item(&self, id: &str) -> Option<&Item> {
        match self.shadows.get(id) {
            Some(clone_id) => self.items.get(clone_id),
            None => self.items.get(id),
        }
    }

    /// Returns true if `reference` resolves to `target_id` for this tenant.
    pub fn resolves_to(&self, reference: &str, target_id: &str) -> bool {
        self.effective_item(reference)
            .is_some_and(|item| item.id == target_id)
    }

    /// Components of a composite, falling back to the shared base definition
    /// for a tenant clone that declares none of its own.
    pub fn components_of(&self, composite: &Item) -> &[CompositeComponent] {
        if let Some(own) = self.components.get(&composite.id) {
            return own;
        }
        composite
            .base_item_id
            .as_ref()
            .and_then(|base| self.components.get(base))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Composites (effective) that contain the given item as a component.
    pub fn composites_containing(&self, item_id: &str) -> Vec<&Item> {
        let mut found: Vec<&Item> = self
            .items
            .values()
            .filter(|item| item.is_composite)
            .filter(|item| self.effective_item(&item.id).is_some_and(|e| e.id == item.id))
            .filter(|item| {
                self.components_of(item)
                    .iter()
                    .any(|c| self.resolves_to(&c.component_item_id, item_id))
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// Overwrites an item's cost in this in-memory view.
    pub fn set_item_cost(&mut self, item_id: &str, cost_per_unit: Decimal) {
        if let Some(item) = self.items.get_mut(item_id) {
            item.cost_per_unit = cost_per_unit;
        }
    }

    // =========================================================================
    // Products
    // =========================================================================

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    /// All products, ordered by id.
    pub fn products(&self) -> Vec<&Product> {
        let mut products: Vec<&Product> = self.products.values().collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        products
    }

    pub fn variant(&self, id: &str) -> Option<&ProductVariant> {
        self.variants.get(id)
    }

    /// Variants of a product, ordered by id.
    pub fn variants_of(&self, product_id: &str) -> Vec<&ProductVariant> {
        let mut variants: Vec<&ProductVariant> = self
            .variants
            .values()
            .filter(|v| v.product_id == product_id)
            .collect();
        variants.sort_by(|a, b| a.id.cmp(&b.id));
        variants
    }

    /// Recipe lines at exactly the given scope.
    ///
    /// `variant_id = None` returns only product-level lines; variant lines
    /// never leak into the product-level recipe or vice versa.
    pub fn ingredients_for(&self, product_id: &str, variant_id: Option<&str>) -> Vec<&ProductIngredient> {
        self.ingredients
            .get(product_id)
            .map(|lines| {
                lines
                    .iter()
                    .filter(|line| line.variant_id.as_deref() == variant_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn modifier(&self, product_id: &str, modifier_id: &str) -> Option<&ProductModifier> {
        self.modifiers
            .get(product_id)
            .and_then(|mods| mods.iter().find(|m| m.id == modifier_id))
    }

    pub fn accessories_for(&self, product_id: &str) -> &[ProductAccessory] {
        self.accessories
            .get(product_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn bundle(&self, id: &str) -> Option<&Bundle> {
        self.bundles.get(id)
    }

    pub fn bundle_items(&self, bundle_id: &str) -> &[BundleItem] {
        self.bundle_items
            .get(bundle_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn group_by<T, F>(rows: Vec<T>, key: F) -> HashMap<String, Vec<T>>
where
    F: Fn(&T) -> String,
{
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

/// Rules for one `composite → component` edge.
///
/// The parent must be a composite and the component must not be one, which
/// keeps composites exactly one level deep.
pub fn validate_link(composite: &Item, component: &Item) -> CoreResult<()> {
    if !composite.is_composite {
        return Err(CoreError::Validation(crate::error::ValidationError::Conflict {
            field: "composite_item_id".to_string(),
            reason: format!("item {} is not a composite", composite.id),
        }));
    }

    if composite.id == component.id || component.is_composite {
        return Err(CoreError::CircularCompositeReference {
            composite_id: composite.id.clone(),
            component_id: component.id.clone(),
        });
    }

    Ok(())
}

// =============================================================================
// Test Fixtures
// =============================================================================


// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::units::Unit;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rejects_composite_of_composite() {
        let mut data = restaurant();
        data.items.push(composite("burger_sauce", dec!(1), Unit::Kilogram, dec!(0)));
        data.components.push(component("burger_sauce", "house_sauce", dec!(100)));

        let err = Catalog::new(TENANT, data).unwrap_err();
        assert!(matches!(err, CoreError::CircularCompositeReference { .. }));
    }

    #[test]
    fn test_rejects_self_reference() {
        let mut data = restaurant();
        data.components.push(component("house_sauce", "house_sauce", dec!(1)));
        assert!(matches!(
            Catalog::new(TENANT, data),
            Err(CoreError::CircularCompositeReference { .. })
        ));
    }

    #[test]
    fn test_effective_item_prefers_tenant_clone() {
        let mut data = restaurant();
        let mut shared = item("flour", Unit::Gram, Unit::Kilogram, dec!(0.001));
        shared.scope = ItemScope::Shared;
        let mut clone = item("flour_t1", Unit::Gram, Unit::Kilogram, dec!(0.003));
        clone.base_item_id = Some("flour".into());
        let mut foreign = item("flour_t2", Unit::Gram, Unit::Kilogram, dec!(0.009));
        foreign.scope = ItemScope::Owned("tenant-2".into());
        foreign.base_item_id = Some("flour".into());
        data.items.extend([shared, clone, foreign]);

        let catalog = Catalog::new(TENANT, data).unwrap();
        assert_eq!(catalog.effective_item("flour").unwrap().id, "flour_t1");
        assert!(catalog.resolves_to("flour", "flour_t1"));
        assert!(catalog.item("flour_t2").is_none());
    }

    #[test]
    fn test_ingredients_are_scoped_by_variant() {
        let catalog = Catalog::new(TENANT, restaurant()).unwrap();
        assert!(catalog.ingredients_for("fries", None).is_empty());
        assert_eq!(catalog.ingredients_for("fries", Some("fries_l")).len(), 1);
        assert_eq!(catalog.ingredients_for("burger", None).len(), 3);
    }

    #[test]
    fn test_composites_containing() {
        let catalog = Catalog::new(TENANT, restaurant()).unwrap();
        let found = catalog.composites_containing("tomato");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "house_sauce");
        assert!(catalog.composites_containing("cheese").is_empty());
    }
}
