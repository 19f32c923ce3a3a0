//! # Inventory Ledger
//!
//! Per-product stock plus the append-only `stock_movements` log.
//!
//! ## Ledger Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every change to products.current_stock writes exactly one movement     │
//! │  in the same scope:                                                     │
//! │                                                                         │
//! │    stock_after = stock_before + quantity                                │
//! │    products.current_stock = stock_after of the latest movement          │
//! │                                                                         │
//! │  restock     purchase     +qty                                          │
//! │  adjust      adjustment   ±qty  (shrinkage clamps at 0)                 │
//! │  deduct      sale         −qty  (tracked products only)                 │
//! │  restore     return       +qty  (cancelled sale, completed refund)      │
//! │  set_level   adjustment   target − current  (stock opname)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::scope::{LockTarget, ScopeMode, TxScope};
use warung_core::input::{AdjustStockInput, MovementFilter, PageRequest, RestockInput};
use warung_core::{CoreError, Page, Product, StockMovement, StockMovementKind, StockReport};

/// Reference kind written on movements caused by a sale.
pub const REF_TRANSACTION: &str = "transaction";

/// Reference kind written on movements caused by a completed refund.
pub const REF_REFUND: &str = "refund";

/// Reference kind written on movements caused by an opname session.
pub const REF_STOCK_OPNAME: &str = "stock_opname";

/// A movement about to be written.
pub(crate) struct MovementRecord<'a> {
    pub product_id: &'a str,
    pub kind: StockMovementKind,
    pub quantity: i64,
    pub stock_before: i64,
    /// `(reference_type, reference_id)`
    pub reference: Option<(&'a str, &'a str)>,
    pub cost_per_unit: Option<i64>,
    pub notes: Option<&'a str>,
    pub actor: &'a str,
}

/// Appends one movement row. The caller updates `current_stock`.
pub(crate) async fn insert_movement(scope: &mut TxScope, record: MovementRecord<'_>) -> DbResult<StockMovement> {
    let movement = StockMovement {
        id: Uuid::new_v4().to_string(),
        product_id: record.product_id.to_string(),
        kind: record.kind,
        quantity: record.quantity,
        stock_before: record.stock_before,
        stock_after: record.stock_before + record.quantity,
        reference_type: record.reference.map(|(t, _)| t.to_string()),
        reference_id: record.reference.map(|(_, id)| id.to_string()),
        cost_per_unit: record.cost_per_unit,
        notes: record.notes.map(str::to_string),
        created_by: Some(record.actor.to_string()),
        created_at: Utc::now(),
    };

    debug!(
        product_id = %movement.product_id,
        kind = movement.kind.as_str(),
        quantity = movement.quantity,
        stock_after = movement.stock_after,
        "Writing stock movement"
    );

    scope
        .execute(
            sqlx::query(
                r#"
                INSERT INTO stock_movements (
                    id, product_id, kind, quantity, stock_before, stock_after,
                    reference_type, reference_id, cost_per_unit, notes, created_by, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(&movement.id)
            .bind(&movement.product_id)
            .bind(movement.kind)
            .bind(movement.quantity)
            .bind(movement.stock_before)
            .bind(movement.stock_after)
            .bind(&movement.reference_type)
            .bind(&movement.reference_id)
            .bind(movement.cost_per_unit)
            .bind(&movement.notes)
            .bind(&movement.created_by)
            .bind(movement.created_at),
        )
        .await?;

    Ok(movement)
}

async fn set_stock(scope: &mut TxScope, product_id: &str, stock: i64) -> DbResult<()> {
    scope
        .execute(
            sqlx::query("UPDATE products SET current_stock = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(product_id)
                .bind(stock)
                .bind(Utc::now()),
        )
        .await?;
    Ok(())
}

async fn lock_product(scope: &mut TxScope, product_id: &str) -> DbResult<Product> {
    let product: Option<Product> = scope.select_for_update(LockTarget::Product, product_id).await?;
    product.ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
}

/// Repository for the stock ledger.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Standalone Operations (own scope)
    // =========================================================================

    /// Adds purchased stock.
    pub async fn restock(&self, input: &RestockInput, actor: &str) -> DbResult<StockMovement> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let movement = self.restock_in(&mut scope, input, actor).await?;
        scope.commit().await?;

        info!(product_id = %movement.product_id, quantity = input.quantity, stock = movement.stock_after, "Restocked");
        Ok(movement)
    }

    /// Applies a manual signed adjustment. See [`Self::adjust_in`].
    pub async fn adjust(&self, input: &AdjustStockInput, actor: &str) -> DbResult<StockMovement> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let movement = self.adjust_in(&mut scope, input, actor).await?;
        scope.commit().await?;

        info!(
            product_id = %movement.product_id,
            requested = input.quantity,
            applied = movement.quantity,
            stock = movement.stock_after,
            "Stock adjusted"
        );
        Ok(movement)
    }

    // =========================================================================
    // In-Scope Operations (caller owns the scope)
    // =========================================================================

    /// Adds purchased stock inside the caller's scope.
    pub async fn restock_in(&self, scope: &mut TxScope, input: &RestockInput, actor: &str) -> DbResult<StockMovement> {
        input.validate()?;

        let product = lock_product(scope, &input.product_id).await?;
        let movement = insert_movement(
            scope,
            MovementRecord {
                product_id: &product.id,
                kind: StockMovementKind::Purchase,
                quantity: input.quantity,
                stock_before: product.current_stock,
                reference: None,
                cost_per_unit: Some(input.cost_per_unit),
                notes: input.notes.as_deref(),
                actor,
            },
        )
        .await?;
        set_stock(scope, &product.id, movement.stock_after).await?;
        Ok(movement)
    }

    /// Applies a manual signed adjustment inside the caller's scope.
    ///
    /// Shrinkage that would cross zero on a tracked product is clamped, and
    /// the movement records the delta actually applied. A correction that
    /// would cross zero fails with `insufficient_stock`.
    pub async fn adjust_in(&self, scope: &mut TxScope, input: &AdjustStockInput, actor: &str) -> DbResult<StockMovement> {
        input.validate()?;

        let product = lock_product(scope, &input.product_id).await?;

        let mut delta = input.quantity;
        if product.stock_tracked && product.current_stock + delta < 0 {
            if !input.reason.clamps_at_zero() {
                return Err(CoreError::InsufficientStock {
                    product: product.name.clone(),
                    available: product.current_stock,
                    requested: -delta,
                }
                .into());
            }
            delta = -product.current_stock;
        }

        let notes = match &input.notes {
            Some(n) => format!("{}: {}", input.reason.as_str(), n),
            None => input.reason.as_str().to_string(),
        };

        let movement = insert_movement(
            scope,
            MovementRecord {
                product_id: &product.id,
                kind: StockMovementKind::Adjustment,
                quantity: delta,
                stock_before: product.current_stock,
                reference: None,
                cost_per_unit: None,
                notes: Some(&notes),
                actor,
            },
        )
        .await?;
        set_stock(scope, &product.id, movement.stock_after).await?;
        Ok(movement)
    }

    /// Deducts sold units from an already locked product.
    ///
    /// Untracked products are left untouched and `None` is returned.
    pub async fn deduct(
        &self,
        scope: &mut TxScope,
        product: &mut Product,
        transaction_id: &str,
        quantity: i64,
        actor: &str,
    ) -> DbResult<Option<StockMovement>> {
        if !product.stock_tracked {
            return Ok(None);
        }

        if product.current_stock < quantity {
            return Err(CoreError::InsufficientStock {
                product: product.name.clone(),
                available: product.current_stock,
                requested: quantity,
            }
            .into());
        }

        let movement = insert_movement(
            scope,
            MovementRecord {
                product_id: &product.id,
                kind: StockMovementKind::Sale,
                quantity: -quantity,
                stock_before: product.current_stock,
                reference: Some((REF_TRANSACTION, transaction_id)),
                cost_per_unit: None,
                notes: None,
                actor,
            },
        )
        .await?;
        set_stock(scope, &product.id, movement.stock_after).await?;
        product.current_stock = movement.stock_after;

        Ok(Some(movement))
    }

    /// Puts sold units back on the shelf as a `return` movement.
    ///
    /// `reference` names what returned them: the cancelled sale or the
    /// completed refund.
    pub async fn restore(
        &self,
        scope: &mut TxScope,
        product_id: &str,
        reference: (&str, &str),
        quantity: i64,
        notes: &str,
        actor: &str,
    ) -> DbResult<Option<StockMovement>> {
        let product = lock_product(scope, product_id).await?;
        if !product.stock_tracked {
            return Ok(None);
        }

        let movement = insert_movement(
            scope,
            MovementRecord {
                product_id,
                kind: StockMovementKind::Return,
                quantity,
                stock_before: product.current_stock,
                reference: Some(reference),
                cost_per_unit: None,
                notes: Some(notes),
                actor,
            },
        )
        .await?;
        set_stock(scope, product_id, movement.stock_after).await?;

        Ok(Some(movement))
    }

    /// Sets stock to an exact level, writing the delta as an adjustment.
    ///
    /// Returns `None` when the product already sits at `target`.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_level(
        &self,
        scope: &mut TxScope,
        product_id: &str,
        target: i64,
        reference: (&str, &str),
        cost_per_unit: Option<i64>,
        notes: &str,
        actor: &str,
    ) -> DbResult<Option<StockMovement>> {
        let product = lock_product(scope, product_id).await?;
        let delta = target - product.current_stock;
        if delta == 0 {
            return Ok(None);
        }

        let movement = insert_movement(
            scope,
            MovementRecord {
                product_id,
                kind: StockMovementKind::Adjustment,
                quantity: delta,
                stock_before: product.current_stock,
                reference: Some(reference),
                cost_per_unit,
                notes: Some(notes),
                actor,
            },
        )
        .await?;
        set_stock(scope, product_id, target).await?;

        Ok(Some(movement))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Paged movements of one product, newest first.
    pub async fn movements(&self, product_id: &str, filter: &MovementFilter) -> DbResult<Page<StockMovement>> {
        let page = PageRequest::new(filter.page, filter.per_page);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stock_movements WHERE product_id = ?1 AND (?2 IS NULL OR kind = ?2)",
        )
        .bind(product_id)
        .bind(filter.kind)
        .fetch_one(&self.pool)
        .await?;

        let items: Vec<StockMovement> = sqlx::query_as(
            r#"
            SELECT * FROM stock_movements
            WHERE product_id = ?1 AND (?2 IS NULL OR kind = ?2)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(product_id)
        .bind(filter.kind)
        .bind(page.per_page)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Latest movement of a product, if any.
    pub async fn latest_movement(&self, product_id: &str) -> DbResult<Option<StockMovement>> {
        let movement = sqlx::query_as(
            "SELECT * FROM stock_movements WHERE product_id = ?1 ORDER BY rowid DESC LIMIT 1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(movement)
    }

    /// Stock value and alert counts over active products.
    pub async fn stock_report(&self) -> DbResult<StockReport> {
        let report = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total_products,
                COALESCE(SUM(current_stock * cost_price), 0) AS total_stock_value,
                COALESCE(SUM(CASE WHEN stock_tracked = 1 AND current_stock <= min_stock_alert THEN 1 ELSE 0 END), 0)
                    AS low_stock_count,
                COALESCE(SUM(CASE WHEN stock_tracked = 1 AND current_stock <= 0 THEN 1 ELSE 0 END), 0)
                    AS out_of_stock_count
            FROM products
            WHERE is_active = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(report)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use warung_core::input::{AdjustReason, NewProduct};

    async fn setup(stock: i64) -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(
                &NewProduct {
                    name: "Minyak Goreng 1L".into(),
                    barcode: None,
                    unit: "botol".into(),
                    base_price: 18_000,
                    cost_price: 16_000,
                    stock_tracked: true,
                    initial_stock: stock,
                    min_stock_alert: 5,
                    is_refillable: false,
                    empty_product_id: None,
                },
                "owner",
            )
            .await
            .unwrap();
        (db, product)
    }

    #[tokio::test]
    async fn test_restock_then_adjust_keeps_ledger_consistent() {
        let (db, product) = setup(10).await;
        let inventory = db.inventory();

        let restock = inventory
            .restock(
                &RestockInput {
                    product_id: product.id.clone(),
                    quantity: 24,
                    cost_per_unit: 16_000,
                    notes: None,
                },
                "owner",
            )
            .await
            .unwrap();
        assert_eq!((restock.stock_before, restock.stock_after), (10, 34));

        let adjust = inventory
            .adjust(
                &AdjustStockInput {
                    product_id: product.id.clone(),
                    quantity: -4,
                    reason: AdjustReason::Correction,
                    notes: Some("miscount".into()),
                },
                "owner",
            )
            .await
            .unwrap();
        assert_eq!(adjust.stock_after, 30);

        let current = db.products().get(&product.id).await.unwrap().current_stock;
        let latest = inventory.latest_movement(&product.id).await.unwrap().unwrap();
        assert_eq!(current, latest.stock_after);

        let page = inventory.movements(&product.id, &MovementFilter::default()).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].kind, StockMovementKind::Adjustment);
    }

    #[tokio::test]
    async fn test_shrinkage_clamps_and_correction_fails() {
        let (db, product) = setup(3).await;
        let inventory = db.inventory();

        let err = inventory
            .adjust(
                &AdjustStockInput {
                    product_id: product.id.clone(),
                    quantity: -5,
                    reason: AdjustReason::Correction,
                    notes: None,
                },
                "owner",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_stock");

        let clamped = inventory
            .adjust(
                &AdjustStockInput {
                    product_id: product.id.clone(),
                    quantity: -5,
                    reason: AdjustReason::Shrinkage,
                    notes: Some("botol pecah".into()),
                },
                "owner",
            )
            .await
            .unwrap();
        assert_eq!(clamped.quantity, -3);
        assert_eq!(clamped.stock_after, 0);
    }

    #[tokio::test]
    async fn test_deduct_rejects_short_stock_and_scope_rolls_back() {
        let (db, product) = setup(10).await;
        let inventory = db.inventory();

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        let mut locked = db.products().lock(&mut scope, &product.id).await.unwrap();
        inventory
            .deduct(&mut scope, &mut locked, "tx-1", 4, "kasir")
            .await
            .unwrap();
        let err = inventory
            .deduct(&mut scope, &mut locked, "tx-1", 15, "kasir")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_stock");
        scope.rollback().await.unwrap();

        assert_eq!(db.products().get(&product.id).await.unwrap().current_stock, 10);
    }

    #[tokio::test]
    async fn test_set_level_writes_delta() {
        let (db, product) = setup(100).await;
        let inventory = db.inventory();

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        let movement = inventory
            .set_level(&mut scope, &product.id, 95, (REF_STOCK_OPNAME, "so-1"), Some(7_000), "count", "auditor")
            .await
            .unwrap()
            .unwrap();
        let unchanged = inventory
            .set_level(&mut scope, &product.id, 95, (REF_STOCK_OPNAME, "so-1"), None, "count", "auditor")
            .await
            .unwrap();
        scope.commit().await.unwrap();

        assert_eq!((movement.stock_before, movement.stock_after, movement.quantity), (100, 95, -5));
        assert!(unchanged.is_none());
    }

    #[tokio::test]
    async fn test_stock_report() {
        let (db, _) = setup(2).await;
        let report = db.inventory().stock_report().await.unwrap();
        assert_eq!(report.total_products, 1);
        assert_eq!(report.total_stock_value, 32_000);
        assert_eq!(report.low_stock_count, 1);
        assert_eq!(report.out_of_stock_count, 0);
    }
}
