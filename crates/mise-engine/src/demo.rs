//! # Demo Restaurant
//!
//! A small burger shop used by the `seed` binary and the engine tests.
//!
//! ```text
//! Burger         150 g cheddar (not removable) + 50 g house sauce + 1 bun
//!                + 2 napkins always, + 1 box for takeaway/delivery
//! House sauce    500 g batch = 300 g tomato + 200 g mayo
//! Fries          Small 150 g potato / Large 250 g potato
//! Water          untracked
//! Combo          Burger + Large fries
//! ```
//!
//! Opening stock is booked through the ledger as restock movements.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use mise_core::catalog::{Catalog, CatalogData};
use mise_core::types::*;
use mise_core::{Unit, DEFAULT_TENANT_ID};

use crate::error::EngineResult;
use crate::ledger::Ledger;

pub const TENANT_ID: &str = DEFAULT_TENANT_ID;

pub const CHEESE: &str = "cheese";
pub const TOMATO: &str = "tomato";
pub const MAYO: &str = "mayo";
pub const POTATO: &str = "potato";
pub const BUN: &str = "bun";
pub const BOX: &str = "box";
pub const NAPKIN: &str = "napkin";
pub const HOUSE_SAUCE: &str = "house_sauce";

pub const BURGER: &str = "burger";
pub const FRIES: &str = "fries";
pub const FRIES_SMALL: &str = "fries_s";
pub const FRIES_LARGE: &str = "fries_l";
pub const WATER: &str = "water";
pub const COMBO: &str = "combo";

pub const EXTRA_CHEESE: &str = "extra_cheese";
pub const NO_SAUCE: &str = "no_sauce";

/// Opening stock in storage units.
pub const OPENING_STOCK: &[(&str, Decimal)] = &[
    (CHEESE, dec!(2)),
    (TOMATO, dec!(5)),
    (MAYO, dec!(3)),
    (POTATO, dec!(10)),
    (BUN, dec!(50)),
    (BOX, dec!(100)),
    (NAPKIN, dec!(500)),
];

fn item(tenant_id: &str, id: &str, name: &str, serving: Unit, storage: Unit, cost: Decimal) -> Item {
    Item {
        id: id.to_string(),
        scope: ItemScope::Owned(tenant_id.to_string()),
        base_item_id: None,
        name: name.to_string(),
        item_type: ItemType::Food,
        serving_unit: serving,
        storage_unit: storage,
        cost_per_unit: cost,
        is_composite: false,
        batch_quantity: None,
        batch_unit: None,
        is_active: true,
    }
}

fn product(tenant_id: &str, id: &str, name: &str, price_cents: i64, ingredient_cost: Decimal) -> Product {
    Product {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        name: name.to_string(),
        price_cents,
        has_variants: false,
        track_inventory: true,
        ingredient_cost,
        is_active: true,
    }
}

fn ingredient(product_id: &str, variant_id: Option<&str>, item_id: &str, quantity: Decimal) -> ProductIngredient {
    ProductIngredient {
        id: format!("{product_id}:{}:{item_id}", variant_id.unwrap_or("-")),
        product_id: product_id.to_string(),
        variant_id: variant_id.map(str::to_string),
        item_id: item_id.to_string(),
        quantity,
        removable: true,
    }
}

/// The demo catalog, owned by `tenant_id`.
///
/// Costs are per serving unit and already consistent with each other
/// (house sauce 0.0022/g, burger 1.56).
pub fn catalog_data(tenant_id: &str) -> CatalogData {
    let non_food = |id: &str, name: &str, cost: Decimal| Item {
        item_type: ItemType::NonFood,
        ..item(tenant_id, id, name, Unit::Piece, Unit::Piece, cost)
    };

    let items = vec![
        item(tenant_id, CHEESE, "Cheddar", Unit::Gram, Unit::Kilogram, dec!(0.008)),
        item(tenant_id, TOMATO, "Tomato", Unit::Gram, Unit::Kilogram, dec!(0.001)),
        item(tenant_id, MAYO, "Mayonnaise", Unit::Gram, Unit::Kilogram, dec!(0.004)),
        item(tenant_id, POTATO, "Potato", Unit::Gram, Unit::Kilogram, dec!(0.002)),
        item(tenant_id, BUN, "Brioche bun", Unit::Piece, Unit::Piece, dec!(0.25)),
        non_food(BOX, "Burger box", dec!(0.10)),
        non_food(NAPKIN, "Napkin", dec!(0.01)),
        Item {
            is_composite: true,
            batch_quantity: Some(dec!(500)),
            batch_unit: Some(Unit::Gram),
            ..item(tenant_id, HOUSE_SAUCE, "House sauce", Unit::Gram, Unit::Kilogram, dec!(0.0022))
        },
    ];

    let mut fries = product(tenant_id, FRIES, "Fries", 400, Decimal::ZERO);
    fries.has_variants = true;
    let mut water = product(tenant_id, WATER, "Still water", 150, Decimal::ZERO);
    water.track_inventory = false;

    let mut burger_cheese = ingredient(BURGER, None, CHEESE, dec!(150));
    burger_cheese.removable = false;

    CatalogData {
        items,
        components: vec![
            CompositeComponent {
                composite_item_id: HOUSE_SAUCE.into(),
                component_item_id: TOMATO.into(),
                quantity: dec!(300),
            },
            CompositeComponent {
                composite_item_id: HOUSE_SAUCE.into(),
                component_item_id: MAYO.into(),
                quantity: dec!(200),
            },
        ],
        products: vec![
            product(tenant_id, BURGER, "Cheeseburger", 1200, dec!(1.56)),
            fries,
            water,
        ],
        variants: vec![
            ProductVariant {
                id: FRIES_SMALL.into(),
                product_id: FRIES.into(),
                name: "Small".into(),
                price_cents: 400,
                ingredient_cost: dec!(0.30),
                is_active: true,
            },
            ProductVariant {
                id: FRIES_LARGE.into(),
                product_id: FRIES.into(),
                name: "Large".into(),
                price_cents: 550,
                ingredient_cost: dec!(0.50),
                is_active: true,
            },
        ],
        ingredients: vec![
            burger_cheese,
            ingredient(BURGER, None, HOUSE_SAUCE, dec!(50)),
            ingredient(BURGER, None, BUN, dec!(1)),
            ingredient(FRIES, Some(FRIES_SMALL), POTATO, dec!(150)),
            ingredient(FRIES, Some(FRIES_LARGE), POTATO, dec!(250)),
        ],
        modifiers: vec![
            ProductModifier {
                id: EXTRA_CHEESE.into(),
                product_id: BURGER.into(),
                name: "Extra cheese".into(),
                kind: ModifierKind::Extra,
                item_id: Some(CHEESE.into()),
                quantity: dec!(30),
                price_delta_cents: 100,
            },
            ProductModifier {
                id: NO_SAUCE.into(),
                product_id: BURGER.into(),
                name: "No sauce".into(),
                kind: ModifierKind::Removal,
                item_id: Some(HOUSE_SAUCE.into()),
                quantity: Decimal::ZERO,
                price_delta_cents: 0,
            },
        ],
        accessories: vec![
            ProductAccessory {
                id: "burger_box".into(),
                product_id: BURGER.into(),
                item_id: BOX.into(),
                quantity: dec!(1),
                applicable_order_types: vec![AccessoryScope::Takeaway, AccessoryScope::Delivery],
            },
            ProductAccessory {
                id: "burger_napkin".into(),
                product_id: BURGER.into(),
                item_id: NAPKIN.into(),
                quantity: dec!(2),
                applicable_order_types: vec![AccessoryScope::Always],
            },
        ],
        bundles: vec![Bundle {
            id: COMBO.into(),
            tenant_id: tenant_id.into(),
            name: "Burger combo".into(),
            price_cents: 1450,
            is_active: true,
        }],
        bundle_items: vec![
            BundleItem {
                id: "combo:burger".into(),
                bundle_id: COMBO.into(),
                product_id: BURGER.into(),
                variant_id: None,
                quantity: 1,
            },
            BundleItem {
                id: "combo:fries".into(),
                bundle_id: COMBO.into(),
                product_id: FRIES.into(),
                variant_id: Some(FRIES_LARGE.into()),
                quantity: 1,
            },
        ],
    }
}

/// Writes the demo catalog and books opening stock.
///
/// Every row and the composite links are validated before anything is
/// written.
pub async fn install(ledger: &Ledger, tenant_id: &str, branch_id: Option<&str>) -> EngineResult<()> {
    let data = catalog_data(tenant_id);
    for item in &data.items {
        item.validate()?;
    }
    for product in &data.products {
        product.validate()?;
    }
    for variant in &data.variants {
        variant.validate()?;
    }
    for bundle in &data.bundles {
        bundle.validate()?;
    }
    Catalog::new(tenant_id, data.clone())?;

    let catalog = ledger.database().catalog();
    for item in &data.items {
        catalog.insert_item(item).await?;
    }
    for component in &data.components {
        catalog.insert_component(component).await?;
    }
    for product in &data.products {
        catalog.insert_product(product).await?;
    }
    for variant in &data.variants {
        catalog.insert_variant(variant).await?;
    }
    for ingredient in &data.ingredients {
        catalog.insert_ingredient(ingredient).await?;
    }
    for modifier in &data.modifiers {
        catalog.insert_modifier(modifier).await?;
    }
    for accessory in &data.accessories {
        catalog.insert_accessory(accessory).await?;
    }
    for bundle in &data.bundles {
        let items: Vec<BundleItem> = data
            .bundle_items
            .iter()
            .filter(|bi| bi.bundle_id == bundle.id)
            .cloned()
            .collect();
        catalog.insert_bundle(bundle, &items).await?;
    }

    for (item_id, quantity) in OPENING_STOCK {
        ledger
            .restock(tenant_id, branch_id, item_id, *quantity, "opening stock")
            .await?;
    }

    info!(
        tenant_id,
        items = data.items.len(),
        products = data.products.len(),
        "Demo restaurant installed"
    );
    Ok(())
}
