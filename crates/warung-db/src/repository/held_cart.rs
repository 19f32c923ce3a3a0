//! # Held Carts
//!
//! Carts parked at the counter. The engine prices the cart and hands a
//! finished [`HeldCart`] to [`HeldCartRepository::insert`]; nothing here
//! touches stock.
//!
//! ```text
//!   hold ──► HLD-20250114-0001 (held) ──┬── resume  → resumed
//!                                       └── discard → discarded
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::scope::{LockTarget, TxScope};
use warung_core::{CoreError, HeldCart, HeldCartItem, HeldCartStatus};

#[derive(Debug, Clone)]
pub struct HeldCartRepository {
    pool: SqlitePool,
}

impl HeldCartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        HeldCartRepository { pool }
    }

    // =========================================================================
    // In-Scope Writes
    // =========================================================================

    /// Inserts a held cart and its lines.
    pub async fn insert(&self, scope: &mut TxScope, cart: &HeldCart) -> DbResult<()> {
        debug!(id = %cart.id, code = %cart.hold_code, lines = cart.items.len(), "Holding cart");

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO held_carts (
                        id, hold_code, customer_id, customer_name, status, subtotal,
                        notes, held_by, held_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )
                .bind(&cart.id)
                .bind(&cart.hold_code)
                .bind(&cart.customer_id)
                .bind(&cart.customer_name)
                .bind(cart.status)
                .bind(cart.subtotal)
                .bind(&cart.notes)
                .bind(&cart.held_by)
                .bind(cart.held_at)
                .bind(cart.updated_at),
            )
            .await?;

        for item in &cart.items {
            scope
                .execute(
                    sqlx::query(
                        r#"
                        INSERT INTO held_cart_items (
                            id, cart_id, line_no, product_id, product_name, product_barcode,
                            quantity, unit, unit_price, discount_amount, total_amount, notes
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                        "#,
                    )
                    .bind(&item.id)
                    .bind(&item.cart_id)
                    .bind(item.line_no)
                    .bind(&item.product_id)
                    .bind(&item.product_name)
                    .bind(&item.product_barcode)
                    .bind(item.quantity)
                    .bind(&item.unit)
                    .bind(item.unit_price)
                    .bind(item.discount_amount)
                    .bind(item.total_amount)
                    .bind(&item.notes),
                )
                .await?;
        }

        Ok(())
    }

    /// Locks a held cart header.
    pub async fn lock(&self, scope: &mut TxScope, id: &str) -> DbResult<HeldCart> {
        let cart: Option<HeldCart> = scope.select_for_update(LockTarget::HeldCart, id).await?;
        cart.ok_or_else(|| CoreError::HeldCartNotFound(id.to_string()).into())
    }

    /// Moves a held cart out of `held`.
    ///
    /// `resumed_by` is recorded only for [`HeldCartStatus::Resumed`].
    pub async fn set_status(
        &self,
        scope: &mut TxScope,
        id: &str,
        status: HeldCartStatus,
        actor: &str,
    ) -> DbResult<()> {
        debug!(id, %status, "Updating held cart status");
        let now = Utc::now();
        let resumed = (status == HeldCartStatus::Resumed).then_some(actor);

        scope
            .execute(
                sqlx::query(
                    r#"
                    UPDATE held_carts
                    SET status = ?2,
                        resumed_by = COALESCE(?3, resumed_by),
                        resumed_at = CASE WHEN ?3 IS NULL THEN resumed_at ELSE ?4 END,
                        updated_at = ?4
                    WHERE id = ?1
                    "#,
                )
                .bind(id)
                .bind(status)
                .bind(resumed)
                .bind(now),
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Held cart with lines.
    pub async fn get(&self, id: &str) -> DbResult<HeldCart> {
        let mut conn = self.pool.acquire().await?;
        load(&mut *conn, id).await
    }

    pub async fn get_in(&self, scope: &mut TxScope, id: &str) -> DbResult<HeldCart> {
        load(scope.conn(), id).await
    }

    /// Carts still waiting at the counter, newest first. Lines are not loaded.
    pub async fn list_held(&self) -> DbResult<Vec<HeldCart>> {
        let carts = sqlx::query_as(
            "SELECT * FROM held_carts WHERE status = 'held' ORDER BY held_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(carts)
    }
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<HeldCart> {
    let cart: Option<HeldCart> = sqlx::query_as("SELECT * FROM held_carts WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let mut cart = cart.ok_or_else(|| CoreError::HeldCartNotFound(id.to_string()))?;

    cart.items = sqlx::query_as::<_, HeldCartItem>("SELECT * FROM held_cart_items WHERE cart_id = ?1 ORDER BY line_no")
        .bind(id)
        .fetch_all(conn)
        .await?;
    Ok(cart)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::scope::ScopeMode;
    use warung_core::input::NewProduct;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(
                &NewProduct {
                    name: "Teh Celup".into(),
                    barcode: None,
                    unit: "box".into(),
                    base_price: 6_000,
                    cost_price: 4_500,
                    stock_tracked: true,
                    initial_stock: 10,
                    min_stock_alert: 0,
                    is_refillable: false,
                    empty_product_id: None,
                },
                "owner",
            )
            .await
            .unwrap();
        (db, product.id)
    }

    fn sample(product_id: &str, code: &str) -> HeldCart {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        HeldCart {
            id: id.clone(),
            hold_code: code.into(),
            customer_id: None,
            customer_name: None,
            status: HeldCartStatus::Held,
            subtotal: 12_000,
            notes: None,
            held_by: "Sari".into(),
            resumed_by: None,
            held_at: now,
            resumed_at: None,
            updated_at: now,
            items: vec![HeldCartItem {
                id: uuid::Uuid::new_v4().to_string(),
                cart_id: id,
                line_no: 1,
                product_id: product_id.into(),
                product_name: "Teh Celup".into(),
                product_barcode: None,
                quantity: 2,
                unit: "box".into(),
                unit_price: 6_000,
                discount_amount: 0,
                total_amount: 12_000,
                notes: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_hold_resume_and_list() {
        let (db, product_id) = setup().await;
        let repo = db.held_carts();
        let first = sample(&product_id, "HLD-TEST-0001");
        let second = sample(&product_id, "HLD-TEST-0002");

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        repo.insert(&mut scope, &first).await.unwrap();
        repo.insert(&mut scope, &second).await.unwrap();
        scope.commit().await.unwrap();

        assert_eq!(repo.list_held().await.unwrap().len(), 2);

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        repo.lock(&mut scope, &first.id).await.unwrap();
        repo.set_status(&mut scope, &first.id, HeldCartStatus::Resumed, "Budi")
            .await
            .unwrap();
        scope.commit().await.unwrap();

        let resumed = repo.get(&first.id).await.unwrap();
        assert_eq!(resumed.status, HeldCartStatus::Resumed);
        assert_eq!(resumed.resumed_by.as_deref(), Some("Budi"));
        assert!(resumed.resumed_at.is_some());
        assert_eq!(resumed.items.len(), 1);

        let held = repo.list_held().await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].id, second.id);
    }

    #[tokio::test]
    async fn test_missing_cart() {
        let (db, _) = setup().await;
        let err = db.held_carts().get("missing").await.unwrap_err();
        assert_eq!(err.code(), "held_cart_not_found");
    }
}
