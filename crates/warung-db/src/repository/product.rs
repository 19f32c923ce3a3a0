//! # Product Repository
//!
//! Products, their pricing tiers, and the restock shopping list.
//!
//! ## Tier Loading
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Listing (many products)          Checkout (one locked product)         │
//! │  ─────────────────────────        ──────────────────────────────        │
//! │  SELECT products ...              select_for_update(Product, id)        │
//! │  SELECT tiers WHERE product_id    SELECT tiers WHERE product_id = ?     │
//! │         IN (?, ?, ?)  ← batched          (same scope, once per line)    │
//! │  group by product_id                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::inventory::{insert_movement, MovementRecord};
use crate::scope::{LockTarget, ScopeMode, TxScope};
use warung_core::input::{NewPricingTier, NewProduct};
use warung_core::{CoreError, PricingTier, Product, ShoppingListItem, StockMovementKind};

/// Repository for products and pricing tiers.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product in its own scope. See [`Self::create_in`].
    pub async fn create(&self, input: &NewProduct, actor: &str) -> DbResult<Product> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let product = self.create_in(&mut scope, input, actor).await?;
        scope.commit().await?;

        info!(id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    /// Creates a product and records its opening stock.
    ///
    /// A tracked product with non-zero opening stock gets an `initial`
    /// movement so the ledger replays to `current_stock` from the first row.
    pub async fn create_in(&self, scope: &mut TxScope, input: &NewProduct, actor: &str) -> DbResult<Product> {
        input.validate()?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        debug!(id = %id, name = %input.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, barcode, unit, base_price, cost_price,
                stock_tracked, current_stock, min_stock_alert,
                is_active, is_refillable, empty_product_id,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?11, ?12, ?12)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(&input.barcode)
        .bind(&input.unit)
        .bind(input.base_price)
        .bind(input.cost_price)
        .bind(input.stock_tracked)
        .bind(input.initial_stock)
        .bind(input.min_stock_alert)
        .bind(input.is_refillable)
        .bind(&input.empty_product_id)
        .bind(now)
        .execute(scope.conn())
        .await?;

        if input.stock_tracked && input.initial_stock > 0 {
            insert_movement(
                scope,
                MovementRecord {
                    product_id: &id,
                    kind: StockMovementKind::Initial,
                    quantity: input.initial_stock,
                    stock_before: 0,
                    reference: None,
                    cost_per_unit: Some(input.cost_price),
                    notes: Some("Opening stock"),
                    actor,
                },
            )
            .await?;
        }

        let product = load_product(scope.conn(), &id).await?;
        Ok(product)
    }

    /// Gets an active or inactive product with its tiers.
    pub async fn get(&self, id: &str) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        load_product(&mut conn, id).await
    }

    /// Locks a product inside a write scope and loads its tiers.
    pub async fn lock(&self, scope: &mut TxScope, id: &str) -> DbResult<Product> {
        let mut product: Product = scope
            .select_for_update(LockTarget::Product, id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(id.to_string()))?;
        product.tiers = tiers_for(scope.conn(), id).await?;
        Ok(product)
    }

    /// Loads several products by id, tiers batched. Missing ids are skipped.
    pub async fn get_many(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM products WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let mut products: Vec<Product> = qb.build_query_as().fetch_all(&self.pool).await?;
        self.attach_tiers(&mut products).await?;
        Ok(products)
    }

    /// Lists active products by name.
    pub async fn list_active(&self, limit: i64) -> DbResult<Vec<Product>> {
        let mut products: Vec<Product> =
            sqlx::query_as("SELECT * FROM products WHERE is_active = 1 ORDER BY name LIMIT ?1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        self.attach_tiers(&mut products).await?;
        Ok(products)
    }

    /// Soft-deletes a product.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        self.deactivate_in(&mut scope, id).await?;
        scope.commit().await?;
        info!(id = %id, "Product deactivated");
        Ok(())
    }

    pub async fn deactivate_in(&self, scope: &mut TxScope, id: &str) -> DbResult<()> {
        let affected = scope
            .execute(
                sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                    .bind(id)
                    .bind(Utc::now()),
            )
            .await?;
        if affected == 0 {
            return Err(CoreError::ProductNotFound(id.to_string()).into());
        }
        Ok(())
    }

    // =========================================================================
    // Pricing Tiers
    // =========================================================================

    /// Adds a pricing tier to a product.
    pub async fn add_tier(&self, product_id: &str, input: &NewPricingTier) -> DbResult<PricingTier> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let tier = self.add_tier_in(&mut scope, product_id, input).await?;
        scope.commit().await?;
        Ok(tier)
    }

    pub async fn add_tier_in(&self, scope: &mut TxScope, product_id: &str, input: &NewPricingTier) -> DbResult<PricingTier> {
        input.validate()?;

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(scope.conn())
            .await?;
        if exists.is_none() {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        }

        let tier = PricingTier {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            name: input.name.trim().to_string(),
            min_qty: input.min_qty,
            max_qty: input.max_qty,
            price: input.price,
            is_active: true,
            created_at: Utc::now(),
        };
        debug!(product_id = %product_id, tier = %tier.name, min_qty = tier.min_qty, "Adding pricing tier");

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO pricing_tiers (id, product_id, name, min_qty, max_qty, price, is_active, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
                    "#,
                )
                .bind(&tier.id)
                .bind(&tier.product_id)
                .bind(&tier.name)
                .bind(tier.min_qty)
                .bind(tier.max_qty)
                .bind(tier.price)
                .bind(tier.created_at),
            )
            .await?;

        Ok(tier)
    }

    /// Tiers of one product, inactive included.
    pub async fn tiers_for(&self, product_id: &str) -> DbResult<Vec<PricingTier>> {
        let mut conn = self.pool.acquire().await?;
        tiers_for(&mut conn, product_id).await
    }

    /// Tiers of many products in one query, grouped by product id.
    pub async fn tiers_for_many(&self, product_ids: &[String]) -> DbResult<HashMap<String, Vec<PricingTier>>> {
        let mut grouped: HashMap<String, Vec<PricingTier>> = HashMap::new();
        if product_ids.is_empty() {
            return Ok(grouped);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM pricing_tiers WHERE product_id IN (");
        let mut separated = qb.separated(", ");
        for id in product_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY product_id, min_qty DESC, id");

        let tiers: Vec<PricingTier> = qb.build_query_as().fetch_all(&self.pool).await?;
        for tier in tiers {
            grouped.entry(tier.product_id.clone()).or_default().push(tier);
        }
        Ok(grouped)
    }

    async fn attach_tiers(&self, products: &mut [Product]) -> DbResult<()> {
        let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
        let mut grouped = self.tiers_for_many(&ids).await?;
        for product in products.iter_mut() {
            product.tiers = grouped.remove(&product.id).unwrap_or_default();
        }
        Ok(())
    }

    // =========================================================================
    // Shopping List
    // =========================================================================

    /// Tracked active products at or under their alert threshold.
    ///
    /// Suggests restocking to three times the threshold.
    pub async fn low_stock(&self) -> DbResult<Vec<ShoppingListItem>> {
        let items: Vec<ShoppingListItem> = sqlx::query_as(
            r#"
            SELECT
                id AS product_id,
                name AS product_name,
                barcode,
                current_stock,
                min_stock_alert,
                MAX(min_stock_alert * 3 - current_stock, 0) AS suggested_qty,
                MAX(min_stock_alert * 3 - current_stock, 0) * cost_price AS estimated_cost
            FROM products
            WHERE is_active = 1
              AND stock_tracked = 1
              AND current_stock <= min_stock_alert
            ORDER BY current_stock ASC, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

pub(crate) async fn load_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    let mut product: Product = sqlx::query_as("SELECT * FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::Domain(CoreError::ProductNotFound(id.to_string())))?;
    product.tiers = tiers_for(conn, id).await?;
    Ok(product)
}

async fn tiers_for(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<PricingTier>> {
    let tiers = sqlx::query_as("SELECT * FROM pricing_tiers WHERE product_id = ?1 ORDER BY min_qty DESC, id")
        .bind(product_id)
        .fetch_all(conn)
        .await?;
    Ok(tiers)
}

// =============================================================================
// Unit Tests
// =============================================================================
