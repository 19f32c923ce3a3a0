//! # Refillable Container Ledger
//!
//! Empty/full counts for products sold by exchange (LPG, gallon water).
//!
//! ## Exchange Flow
//! ```text
//!   sale_exchange      customer brings 1 empty, leaves with 1 full
//!                      empty +qty, full −qty   (needs full ≥ qty)
//!
//!   restock_exchange   supplier takes empties, drops fulls
//!                      empty −qty, full +qty   (needs empty ≥ qty)
//!
//!   adjustment, purchase_*, return_empty
//!                      arbitrary signed deltas, neither side below 0
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::inventory::REF_TRANSACTION;
use crate::scope::{LockTarget, ScopeMode, TxScope};
use warung_core::input::{ContainerMovementInput, NewContainer, PageRequest};
use warung_core::validation::validate_positive;
use warung_core::{ContainerMovement, ContainerMovementKind, CoreError, Page, RefillableContainer};

/// A container change about to be applied.
struct ContainerChange<'a> {
    kind: ContainerMovementKind,
    empty_change: i64,
    full_change: i64,
    reference: Option<(&'a str, &'a str)>,
    notes: Option<&'a str>,
    actor: &'a str,
}

#[derive(Debug, Clone)]
pub struct ContainerRepository {
    pool: SqlitePool,
}

impl ContainerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ContainerRepository { pool }
    }

    /// Links a container pair to a product in its own scope.
    pub async fn create(&self, input: &NewContainer) -> DbResult<RefillableContainer> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let container = self.create_in(&mut scope, input).await?;
        scope.commit().await?;

        info!(id = %container.id, container_type = %container.container_type, "Container created");
        Ok(container)
    }

    /// Links a container pair to a product.
    pub async fn create_in(&self, scope: &mut TxScope, input: &NewContainer) -> DbResult<RefillableContainer> {
        input.validate()?;

        let now = Utc::now();
        let container = RefillableContainer {
            id: Uuid::new_v4().to_string(),
            product_id: input.product_id.clone(),
            container_type: input.container_type.trim().to_string(),
            empty_count: input.empty_count,
            full_count: input.full_count,
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        debug!(id = %container.id, product_id = %container.product_id, "Inserting container");

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO refillable_containers (
                        id, product_id, container_type, empty_count, full_count, notes, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    "#,
                )
                .bind(&container.id)
                .bind(&container.product_id)
                .bind(&container.container_type)
                .bind(container.empty_count)
                .bind(container.full_count)
                .bind(&container.notes)
                .bind(now),
            )
            .await?;

        Ok(container)
    }

    pub async fn get(&self, id: &str) -> DbResult<RefillableContainer> {
        let container: Option<RefillableContainer> =
            sqlx::query_as("SELECT * FROM refillable_containers WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        container.ok_or_else(|| CoreError::ContainerNotFound(id.to_string()).into())
    }

    pub async fn list(&self) -> DbResult<Vec<RefillableContainer>> {
        let containers = sqlx::query_as("SELECT * FROM refillable_containers ORDER BY container_type, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(containers)
    }

    /// The container backing a product, read inside the caller's scope.
    ///
    /// `None` means the product is not sold by exchange.
    pub async fn for_product(&self, scope: &mut TxScope, product_id: &str) -> DbResult<Option<RefillableContainer>> {
        let container = sqlx::query_as("SELECT * FROM refillable_containers WHERE product_id = ?1")
            .bind(product_id)
            .fetch_optional(scope.conn())
            .await?;
        Ok(container)
    }

    pub async fn lock(&self, scope: &mut TxScope, id: &str) -> DbResult<RefillableContainer> {
        let container: Option<RefillableContainer> = scope.select_for_update(LockTarget::Container, id).await?;
        container.ok_or_else(|| CoreError::ContainerNotFound(id.to_string()).into())
    }

    // =========================================================================
    // In-Scope Operations
    // =========================================================================

    /// Swaps `qty` fulls for empties on a sale.
    pub async fn on_sale(
        &self,
        scope: &mut TxScope,
        container_id: &str,
        qty: i64,
        transaction_id: &str,
        actor: &str,
    ) -> DbResult<ContainerMovement> {
        validate_positive("quantity", qty)?;
        self.apply(
            scope,
            container_id,
            ContainerChange {
                kind: ContainerMovementKind::SaleExchange,
                empty_change: qty,
                full_change: -qty,
                reference: Some((REF_TRANSACTION, transaction_id)),
                notes: None,
                actor,
            },
        )
        .await
    }

    /// Swaps `qty` empties for fulls from the supplier.
    pub async fn on_restock(
        &self,
        scope: &mut TxScope,
        container_id: &str,
        qty: i64,
        notes: Option<&str>,
        actor: &str,
    ) -> DbResult<ContainerMovement> {
        validate_positive("quantity", qty)?;
        self.apply(
            scope,
            container_id,
            ContainerChange {
                kind: ContainerMovementKind::RestockExchange,
                empty_change: -qty,
                full_change: qty,
                reference: None,
                notes,
                actor,
            },
        )
        .await
    }

    /// Applies arbitrary signed deltas as an adjustment.
    pub async fn adjust_in(
        &self,
        scope: &mut TxScope,
        container_id: &str,
        empty_change: i64,
        full_change: i64,
        notes: Option<&str>,
        actor: &str,
    ) -> DbResult<ContainerMovement> {
        self.apply(
            scope,
            container_id,
            ContainerChange {
                kind: ContainerMovementKind::Adjustment,
                empty_change,
                full_change,
                reference: None,
                notes,
                actor,
            },
        )
        .await
    }

    /// Records any movement kind with caller-supplied deltas.
    pub async fn record_in(
        &self,
        scope: &mut TxScope,
        input: &ContainerMovementInput,
        actor: &str,
    ) -> DbResult<ContainerMovement> {
        input.validate()?;
        self.apply(
            scope,
            &input.container_id,
            ContainerChange {
                kind: input.kind,
                empty_change: input.empty_change,
                full_change: input.full_change,
                reference: None,
                notes: input.notes.as_deref(),
                actor,
            },
        )
        .await
    }

    // =========================================================================
    // Standalone Operations
    // =========================================================================

    /// Supplier exchange in its own scope.
    pub async fn restock(&self, container_id: &str, qty: i64, notes: Option<&str>, actor: &str) -> DbResult<ContainerMovement> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let movement = self.on_restock(&mut scope, container_id, qty, notes, actor).await?;
        scope.commit().await?;
        Ok(movement)
    }

    /// Manual correction in its own scope.
    pub async fn adjust(
        &self,
        container_id: &str,
        empty_change: i64,
        full_change: i64,
        notes: Option<&str>,
        actor: &str,
    ) -> DbResult<ContainerMovement> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let movement = self
            .adjust_in(&mut scope, container_id, empty_change, full_change, notes, actor)
            .await?;
        scope.commit().await?;
        Ok(movement)
    }

    /// Records any movement kind in its own scope.
    pub async fn record(&self, input: &ContainerMovementInput, actor: &str) -> DbResult<ContainerMovement> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let movement = self.record_in(&mut scope, input, actor).await?;
        scope.commit().await?;
        Ok(movement)
    }

    /// Paged movements of one container, newest first.
    pub async fn movements(&self, container_id: &str, page: Option<i64>, per_page: Option<i64>) -> DbResult<Page<ContainerMovement>> {
        let page = PageRequest::new(page, per_page);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM container_movements WHERE container_id = ?1")
            .bind(container_id)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as(
            r#"
            SELECT * FROM container_movements
            WHERE container_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(container_id)
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

    // =========================================================================
    // Internal
    // =========================================================================

    async fn apply(&self, scope: &mut TxScope, container_id: &str, change: ContainerChange<'_>) -> DbResult<ContainerMovement> {
        let container = self.lock(scope, container_id).await?;

        let empty_after = container.empty_count + change.empty_change;
        let full_after = container.full_count + change.full_change;
        if empty_after < 0 {
            return Err(insufficient(&container, "empty", container.empty_count, -change.empty_change));
        }
        if full_after < 0 {
            return Err(insufficient(&container, "full", container.full_count, -change.full_change));
        }

        let now = Utc::now();
        let movement = ContainerMovement {
            id: Uuid::new_v4().to_string(),
            container_id: container.id.clone(),
            kind: change.kind,
            empty_change: change.empty_change,
            full_change: change.full_change,
            empty_before: container.empty_count,
            empty_after,
            full_before: container.full_count,
            full_after,
            reference_type: change.reference.map(|(t, _)| t.to_string()),
            reference_id: change.reference.map(|(_, id)| id.to_string()),
            notes: change.notes.map(str::to_string),
            created_by: Some(change.actor.to_string()),
            created_at: now,
        };

        debug!(
            container_id = %movement.container_id,
            kind = ?movement.kind,
            empty_after,
            full_after,
            "Writing container movement"
        );

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO container_movements (
                        id, container_id, kind, empty_change, full_change,
                        empty_before, empty_after, full_before, full_after,
                        reference_type, reference_id, notes, created_by, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                )
                .bind(&movement.id)
                .bind(&movement.container_id)
                .bind(movement.kind)
                .bind(movement.empty_change)
                .bind(movement.full_change)
                .bind(movement.empty_before)
                .bind(movement.empty_after)
                .bind(movement.full_before)
                .bind(movement.full_after)
                .bind(&movement.reference_type)
                .bind(&movement.reference_id)
                .bind(&movement.notes)
                .bind(&movement.created_by)
                .bind(now),
            )
            .await?;

        scope
            .execute(
                sqlx::query(
                    "UPDATE refillable_containers SET empty_count = ?2, full_count = ?3, updated_at = ?4 WHERE id = ?1",
                )
                .bind(&container.id)
                .bind(empty_after)
                .bind(full_after)
                .bind(now),
            )
            .await?;

        Ok(movement)
    }
}

fn insufficient(container: &RefillableContainer, side: &str, available: i64, requested: i64) -> crate::error::DbError {
    CoreError::InsufficientContainers {
        container: container.container_type.clone(),
        side: side.to_string(),
        available,
        requested,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use warung_core::input::NewProduct;

    async fn setup(empty: i64, full: i64) -> (Database, RefillableContainer) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(
                &NewProduct {
                    name: "LPG 3kg".into(),
                    barcode: None,
                    unit: "tabung".into(),
                    base_price: 22_000,
                    cost_price: 19_000,
                    stock_tracked: true,
                    initial_stock: full,
                    min_stock_alert: 2,
                    is_refillable: true,
                    empty_product_id: None,
                },
                "owner",
            )
            .await
            .unwrap();
        let container = db
            .containers()
            .create(&NewContainer {
                product_id: product.id,
                container_type: "LPG 3kg".into(),
                empty_count: empty,
                full_count: full,
                notes: None,
            })
            .await
            .unwrap();
        (db, container)
    }

    #[tokio::test]
    async fn test_sale_exchange_swaps_counts() {
        let (db, container) = setup(5, 10).await;
        let repo = db.containers();

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        let movement = repo.on_sale(&mut scope, &container.id, 3, "tx-1", "kasir").await.unwrap();
        scope.commit().await.unwrap();

        assert_eq!((movement.empty_after, movement.full_after), (8, 7));
        assert_eq!(movement.reference_id.as_deref(), Some("tx-1"));

        let reloaded = repo.get(&container.id).await.unwrap();
        assert_eq!((reloaded.empty_count, reloaded.full_count), (8, 7));
    }

    #[tokio::test]
    async fn test_sale_rejects_short_full_count() {
        let (db, container) = setup(5, 2).await;
        let repo = db.containers();

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        let err = repo.on_sale(&mut scope, &container.id, 3, "tx-1", "kasir").await.unwrap_err();
        scope.rollback().await.unwrap();

        assert_eq!(err.code(), "insufficient_containers");
        assert_eq!(repo.get(&container.id).await.unwrap().full_count, 2);
    }

    #[tokio::test]
    async fn test_restock_and_adjust_guard_both_sides() {
        let (db, container) = setup(4, 1).await;
        let repo = db.containers();

        let movement = repo.restock(&container.id, 4, Some("Agen"), "owner").await.unwrap();
        assert_eq!((movement.empty_after, movement.full_after), (0, 5));

        let err = repo.restock(&container.id, 1, None, "owner").await.unwrap_err();
        assert_eq!(err.code(), "insufficient_containers");

        let err = repo.adjust(&container.id, -1, 2, None, "owner").await.unwrap_err();
        assert_eq!(err.code(), "insufficient_containers");

        let bought = repo
            .record(
                &ContainerMovementInput {
                    container_id: container.id.clone(),
                    kind: ContainerMovementKind::PurchaseEmpty,
                    empty_change: 3,
                    full_change: 0,
                    notes: None,
                },
                "owner",
            )
            .await
            .unwrap();
        assert_eq!(bought.empty_after, 3);

        let page = repo.movements(&container.id, None, None).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].kind, ContainerMovementKind::PurchaseEmpty);
    }
}
