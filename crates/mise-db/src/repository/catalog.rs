//! # Catalog Repository
//!
//! Loads the tenant-visible catalog and persists catalog rows.
//!
//! ## Visibility
//! ```text
//! items            tenant_id IS NULL (shared)  OR  tenant_id = :tenant
//! products         tenant_id = :tenant
//! variants, recipe lines, modifiers, accessories   via their product
//! bundles          tenant_id = :tenant
//! ```
//!
//! The engine turns the loaded [`CatalogData`] into a validated
//! [`mise_core::Catalog`]; this layer does not interpret recipes.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use mise_core::catalog::validate_link;
use mise_core::types::{AccessoryScope, ItemScope, ItemType, ModifierKind};
use mise_core::{
    Bundle, BundleItem, CatalogData, CompositeComponent, Item, Product, ProductAccessory,
    ProductIngredient, ProductModifier, ProductVariant, Unit,
};

use super::{from_json, parse_decimal, parse_optional_decimal, to_json};
use crate::error::{DbError, DbResult};

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Loads every catalog row visible to a tenant.
    pub async fn load_data(&self, tenant_id: &str) -> DbResult<CatalogData> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, tenant_id).await
    }

    /// Gets one item by id, regardless of scope.
    pub async fn get_item(&self, id: &str) -> DbResult<Option<Item>> {
        sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, tenant_id, base_item_id, name, item_type,
                   serving_unit, storage_unit, cost_per_unit,
                   is_composite, batch_quantity, batch_unit, is_active
            FROM items
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(ItemRow::into_item)
        .transpose()
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Inserts an item after checking its unit and batch rules.
    pub async fn insert_item(&self, item: &Item) -> DbResult<()> {
        item.validate()?;
        let now = Utc::now();
        debug!(id = %item.id, name = %item.name, "Inserting item");

        sqlx::query(
            r#"
            INSERT INTO items (
                id, tenant_id, base_item_id, name, item_type,
                serving_unit, storage_unit, cost_per_unit,
                is_composite, batch_quantity, batch_unit, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            "#,
        )
        .bind(&item.id)
        .bind(item.scope.tenant_id())
        .bind(&item.base_item_id)
        .bind(&item.name)
        .bind(item.item_type)
        .bind(item.serving_unit)
        .bind(item.storage_unit)
        .bind(item.cost_per_unit.to_string())
        .bind(item.is_composite)
        .bind(item.batch_quantity.map(|q| q.to_string()))
        .bind(item.batch_unit)
        .bind(item.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a composite link.
    ///
    /// Both items must exist, the parent must be a composite and the
    /// component must not be one. A rejected link writes nothing.
    pub async fn insert_component(&self, component: &CompositeComponent) -> DbResult<()> {
        let composite = self
            .get_item(&component.composite_item_id)
            .await?
            .ok_or_else(|| DbError::not_found("Item", &component.composite_item_id))?;
        let part = self
            .get_item(&component.component_item_id)
            .await?
            .ok_or_else(|| DbError::not_found("Item", &component.component_item_id))?;
        validate_link(&composite, &part)?;
        if component.quantity <= Decimal::ZERO {
            return Err(DbError::invalid(
                "quantity",
                &component.quantity.to_string(),
                "component quantity must be positive",
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO composite_item_components (composite_item_id, component_item_id, quantity)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&component.composite_item_id)
        .bind(&component.component_item_id)
        .bind(component.quantity.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        let now = Utc::now();
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, name, price_cents, has_variants,
                track_inventory, ingredient_cost, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.has_variants)
        .bind(product.track_inventory)
        .bind(product.ingredient_cost.to_string())
        .bind(product.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_variant(&self, variant: &ProductVariant) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO product_variants (
                id, product_id, name, price_cents, ingredient_cost, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_id)
        .bind(&variant.name)
        .bind(variant.price_cents)
        .bind(variant.ingredient_cost.to_string())
        .bind(variant.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_ingredient(&self, ingredient: &ProductIngredient) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_ingredients (id, product_id, variant_id, item_id, quantity, removable)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&ingredient.id)
        .bind(&ingredient.product_id)
        .bind(&ingredient.variant_id)
        .bind(&ingredient.item_id)
        .bind(ingredient.quantity.to_string())
        .bind(ingredient.removable)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_modifier(&self, modifier: &ProductModifier) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_modifiers (id, product_id, name, kind, item_id, quantity, price_delta_cents)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&modifier.id)
        .bind(&modifier.product_id)
        .bind(&modifier.name)
        .bind(modifier.kind)
        .bind(&modifier.item_id)
        .bind(modifier.quantity.to_string())
        .bind(modifier.price_delta_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_accessory(&self, accessory: &ProductAccessory) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_accessories (id, product_id, item_id, quantity, applicable_order_types)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&accessory.id)
        .bind(&accessory.product_id)
        .bind(&accessory.item_id)
        .bind(accessory.quantity.to_string())
        .bind(to_json("applicable_order_types", &accessory.applicable_order_types)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_bundle(&self, bundle: &Bundle, items: &[BundleItem]) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bundles (id, tenant_id, name, price_cents, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&bundle.id)
        .bind(&bundle.tenant_id)
        .bind(&bundle.name)
        .bind(bundle.price_cents)
        .bind(bundle.is_active)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO bundle_items (id, bundle_id, product_id, variant_id, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&item.id)
            .bind(&bundle.id)
            .bind(&item.product_id)
            .bind(&item.variant_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Transactional Reads
// =============================================================================

/// Loads every catalog row visible to a tenant on `conn`.
///
/// Inside a transaction this sees the transaction's own writes.
pub async fn load(conn: &mut SqliteConnection, tenant_id: &str) -> DbResult<CatalogData> {
    let items = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT id, tenant_id, base_item_id, name, item_type,
               serving_unit, storage_unit, cost_per_unit,
               is_composite, batch_quantity, batch_unit, is_active
        FROM items
        WHERE tenant_id IS NULL OR tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(ItemRow::into_item)
    .collect::<DbResult<Vec<_>>>()?;

    let components = sqlx::query_as::<_, ComponentRow>(
        r#"
        SELECT c.composite_item_id, c.component_item_id, c.quantity
        FROM composite_item_components c
        JOIN items i ON i.id = c.composite_item_id
        WHERE i.tenant_id IS NULL OR i.tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(ComponentRow::into_component)
    .collect::<DbResult<Vec<_>>>()?;

    let products = sqlx::query_as::<_, ProductRow>(
        r#"
        SELECT id, tenant_id, name, price_cents, has_variants,
               track_inventory, ingredient_cost, is_active
        FROM products
        WHERE tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(ProductRow::into_product)
    .collect::<DbResult<Vec<_>>>()?;

    let variants = sqlx::query_as::<_, VariantRow>(
        r#"
        SELECT v.id, v.product_id, v.name, v.price_cents, v.ingredient_cost, v.is_active
        FROM product_variants v
        JOIN products p ON p.id = v.product_id
        WHERE p.tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(VariantRow::into_variant)
    .collect::<DbResult<Vec<_>>>()?;

    let ingredients = sqlx::query_as::<_, IngredientRow>(
        r#"
        SELECT pi.id, pi.product_id, pi.variant_id, pi.item_id, pi.quantity, pi.removable
        FROM product_ingredients pi
        JOIN products p ON p.id = pi.product_id
        WHERE p.tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(IngredientRow::into_ingredient)
    .collect::<DbResult<Vec<_>>>()?;

    let modifiers = sqlx::query_as::<_, ModifierRow>(
        r#"
        SELECT m.id, m.product_id, m.name, m.kind, m.item_id, m.quantity, m.price_delta_cents
        FROM product_modifiers m
        JOIN products p ON p.id = m.product_id
        WHERE p.tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(ModifierRow::into_modifier)
    .collect::<DbResult<Vec<_>>>()?;

    let accessories = sqlx::query_as::<_, AccessoryRow>(
        r#"
        SELECT a.id, a.product_id, a.item_id, a.quantity, a.applicable_order_types
        FROM product_accessories a
        JOIN products p ON p.id = a.product_id
        WHERE p.tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(AccessoryRow::into_accessory)
    .collect::<DbResult<Vec<_>>>()?;

    let bundles = sqlx::query_as::<_, BundleRow>(
        r#"
        SELECT id, tenant_id, name, price_cents, is_active
        FROM bundles
        WHERE tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|r| Bundle {
        id: r.id,
        tenant_id: r.tenant_id,
        name: r.name,
        price_cents: r.price_cents,
        is_active: r.is_active,
    })
    .collect();

    let bundle_items = sqlx::query_as::<_, BundleItemRow>(
        r#"
        SELECT bi.id, bi.bundle_id, bi.product_id, bi.variant_id, bi.quantity
        FROM bundle_items bi
        JOIN bundles b ON b.id = bi.bundle_id
        WHERE b.tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|r| BundleItem {
        id: r.id,
        bundle_id: r.bundle_id,
        product_id: r.product_id,
        variant_id: r.variant_id,
        quantity: r.quantity,
    })
    .collect();

    debug!(
        tenant_id,
        items = items.len(),
        products = products.len(),
        "Loaded catalog"
    );

    Ok(CatalogData {
        items,
        components,
        products,
        variants,
        ingredients,
        modifiers,
        accessories,
        bundles,
        bundle_items,
    })
}

// =============================================================================
// Cost Writes (transactional)
// =============================================================================

/// Bumps an item's `updated_at`. Used to take the write lock before a
/// cascade reads the catalog.
pub async fn touch_item(conn: &mut SqliteConnection, item_id: &str) -> DbResult<u64> {
    let result = sqlx::query("UPDATE items SET updated_at = ?1 WHERE id = ?2")
        .bind(Utc::now())
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Sets an item's cost per serving unit.
pub async fn set_item_cost(conn: &mut SqliteConnection, item_id: &str, cost: Decimal) -> DbResult<u64> {
    let result = sqlx::query("UPDATE items SET cost_per_unit = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(cost.to_string())
        .bind(Utc::now())
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Sets a product's derived ingredient cost.
pub async fn set_product_cost(conn: &mut SqliteConnection, product_id: &str, cost: Decimal) -> DbResult<u64> {
    let result = sqlx::query("UPDATE products SET ingredient_cost = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(cost.to_string())
        .bind(Utc::now())
        .bind(product_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Sets a variant's derived ingredient cost.
pub async fn set_variant_cost(conn: &mut SqliteConnection, variant_id: &str, cost: Decimal) -> DbResult<u64> {
    let result = sqlx::query("UPDATE product_variants SET ingredient_cost = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(cost.to_string())
        .bind(Utc::now())
        .bind(variant_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    tenant_id: Option<String>,
    base_item_id: Option<String>,
    name: String,
    item_type: ItemType,
    serving_unit: Unit,
    storage_unit: Unit,
    cost_per_unit: String,
    is_composite: bool,
    batch_quantity: Option<String>,
    batch_unit: Option<Unit>,
    is_active: bool,
}

impl ItemRow {
    fn into_item(self) -> DbResult<Item> {
        Ok(Item {
            cost_per_unit: parse_decimal("items.cost_per_unit", &self.cost_per_unit)?,
            batch_quantity: parse_optional_decimal("items.batch_quantity", self.batch_quantity.as_deref())?,
            id: self.id,
            scope: ItemScope::from_owner(self.tenant_id),
            base_item_id: self.base_item_id,
            name: self.name,
            item_type: self.item_type,
            serving_unit: self.serving_unit,
            storage_unit: self.storage_unit,
            is_composite: self.is_composite,
            batch_unit: self.batch_unit,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ComponentRow {
    composite_item_id: String,
    component_item_id: String,
    quantity: String,
}

impl ComponentRow {
    fn into_component(self) -> DbResult<CompositeComponent> {
        Ok(CompositeComponent {
            quantity: parse_decimal("composite_item_components.quantity", &self.quantity)?,
            composite_item_id: self.composite_item_id,
            component_item_id: self.component_item_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    tenant_id: String,
    name: String,
    price_cents: i64,
    has_variants: bool,
    track_inventory: bool,
    ingredient_cost: String,
    is_active: bool,
}

impl ProductRow {
    fn into_product(self) -> DbResult<Product> {
        Ok(Product {
            ingredient_cost: parse_decimal("products.ingredient_cost", &self.ingredient_cost)?,
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            price_cents: self.price_cents,
            has_variants: self.has_variants,
            track_inventory: self.track_inventory,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: String,
    product_id: String,
    name: String,
    price_cents: i64,
    ingredient_cost: String,
    is_active: bool,
}

impl VariantRow {
    fn into_variant(self) -> DbResult<ProductVariant> {
        Ok(ProductVariant {
            ingredient_cost: parse_decimal("product_variants.ingredient_cost", &self.ingredient_cost)?,
            id: self.id,
            product_id: self.product_id,
            name: self.name,
            price_cents: self.price_cents,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IngredientRow {
    id: String,
    product_id: String,
    variant_id: Option<String>,
    item_id: String,
    quantity: String,
    removable: bool,
}

impl IngredientRow {
    fn into_ingredient(self) -> DbResult<ProductIngredient> {
        Ok(ProductIngredient {
            quantity: parse_decimal("product_ingredients.quantity", &self.quantity)?,
            id: self.id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            item_id: self.item_id,
            removable: self.removable,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ModifierRow {
    id: String,
    product_id: String,
    name: String,
    kind: ModifierKind,
    item_id: Option<String>,
    quantity: String,
    price_delta_cents: i64,
}

impl ModifierRow {
    fn into_modifier(self) -> DbResult<ProductModifier> {
        Ok(ProductModifier {
            quantity: parse_decimal("product_modifiers.quantity", &self.quantity)?,
            id: self.id,
            product_id: self.product_id,
            name: self.name,
            kind: self.kind,
            item_id: self.item_id,
            price_delta_cents: self.price_delta_cents,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AccessoryRow {
    id: String,
    product_id: String,
    item_id: String,
    quantity: String,
    applicable_order_types: String,
}

impl AccessoryRow {
    fn into_accessory(self) -> DbResult<ProductAccessory> {
        let scopes: Vec<AccessoryScope> = from_json(
            "product_accessories.applicable_order_types",
            &self.applicable_order_types,
        )?;
        Ok(ProductAccessory {
            quantity: parse_decimal("product_accessories.quantity", &self.quantity)?,
            id: self.id,
            product_id: self.product_id,
            item_id: self.item_id,
            applicable_order_types: scopes,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BundleRow {
    id: String,
    tenant_id: String,
    name: String,
    price_cents: i64,
    is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct BundleItemRow {
    id: String,
    bundle_id: String,
    product_id: String,
    variant_id: Option<String>,
    quantity: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use rust_decimal_macros::dec;

    const TENANT: &str = "tenant-1";

    fn item(id: &str, scope: ItemScope) -> Item {
        Item {
            id: id.into(),
            scope,
            base_item_id: None,
            name: id.into(),
            item_type: ItemType::Food,
            serving_unit: Unit::Gram,
            storage_unit: Unit::Kilogram,
            cost_per_unit: dec!(0.008),
            is_composite: false,
            batch_quantity: None,
            batch_unit: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_load_data_scopes_by_tenant() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        repo.insert_item(&item("shared", ItemScope::Shared)).await.unwrap();
        repo.insert_item(&item("mine", ItemScope::Owned(TENANT.into()))).await.unwrap();
        repo.insert_item(&item("theirs", ItemScope::Owned("tenant-2".into()))).await.unwrap();

        let data = repo.load_data(TENANT).await.unwrap();
        let mut ids: Vec<&str> = data.items.iter().map(|i| i.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["mine", "shared"]);
    }

    #[tokio::test]
    async fn test_recipe_round_trip_keeps_decimals_exact() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        repo.insert_item(&item("cheese", ItemScope::Owned(TENANT.into()))).await.unwrap();
        repo.insert_product(&Product {
            id: "burger".into(),
            tenant_id: TENANT.into(),
            name: "Burger".into(),
            price_cents: 1200,
            has_variants: false,
            track_inventory: true,
            ingredient_cost: dec!(1.56),
            is_active: true,
        })
        .await
        .unwrap();
        repo.insert_ingredient(&ProductIngredient {
            id: "i1".into(),
            product_id: "burger".into(),
            variant_id: None,
            item_id: "cheese".into(),
            quantity: dec!(150.5),
            removable: false,
        })
        .await
        .unwrap();
        repo.insert_accessory(&ProductAccessory {
            id: "a1".into(),
            product_id: "burger".into(),
            item_id: "cheese".into(),
            quantity: dec!(1),
            applicable_order_types: vec![AccessoryScope::Takeaway],
        })
        .await
        .unwrap();

        let data = repo.load_data(TENANT).await.unwrap();
        assert_eq!(data.ingredients[0].quantity, dec!(150.5));
        assert!(!data.ingredients[0].removable);
        assert_eq!(data.products[0].ingredient_cost, dec!(1.56));
        assert_eq!(data.accessories[0].applicable_order_types, vec![AccessoryScope::Takeaway]);
    }

    #[tokio::test]
    async fn test_cost_writes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();
        repo.insert_item(&item("tomato", ItemScope::Shared)).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(set_item_cost(&mut conn, "tomato", dec!(0.001)).await.unwrap(), 1);
        drop(conn);

        let tomato = repo.get_item("tomato").await.unwrap().unwrap();
        assert_eq!(tomato.cost_per_unit, dec!(0.001));
    }

    fn composite(id: &str) -> Item {
        Item {
            is_composite: true,
            batch_quantity: Some(dec!(500)),
            batch_unit: Some(Unit::Gram),
            ..item(id, ItemScope::Owned(TENANT.into()))
        }
    }

    #[tokio::test]
    async fn test_insert_item_rejects_mixed_unit_families() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        let mut bun = item("bun", ItemScope::Owned(TENANT.into()));
        bun.storage_unit = Unit::Piece;
        let err = repo.insert_item(&bun).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(mise_core::CoreError::IncompatibleUnits { .. })));
        assert!(repo.get_item("bun").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nested_composite_link_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();
        repo.insert_item(&item("tomato", ItemScope::Owned(TENANT.into()))).await.unwrap();
        repo.insert_item(&composite("house_sauce")).await.unwrap();
        repo.insert_item(&composite("super_sauce")).await.unwrap();

        let link = |parent: &str, child: &str| CompositeComponent {
            composite_item_id: parent.into(),
            component_item_id: child.into(),
            quantity: dec!(100),
        };
        repo.insert_component(&link("house_sauce", "tomato")).await.unwrap();

        let err = repo
            .insert_component(&link("super_sauce", "house_sauce"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(mise_core::CoreError::CircularCompositeReference { .. })
        ));
        assert!(repo.insert_component(&link("tomato", "tomato")).await.is_err());
        assert!(repo.insert_component(&link("house_sauce", "saffron")).await.is_err());

        // The tenant's catalog still loads and validates.
        let data = repo.load_data(TENANT).await.unwrap();
        assert_eq!(data.components.len(), 1);
        assert!(mise_core::Catalog::new(TENANT, data).is_ok());
    }
}
