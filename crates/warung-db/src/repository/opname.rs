//! # Stock Opname
//!
//! Physical-count reconciliation sessions.
//!
//! ## Session Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  start()          → SO-20250114-0001, in_progress                       │
//! │     │                                                                   │
//! │     ├── record_count(product, physical)                                 │
//! │     │     first count snapshots system_stock and cost_per_unit          │
//! │     │     recount overwrites physical, notes, counted_by                │
//! │     │                                                                   │
//! │     ├──► finalize(apply_adjustments)                                    │
//! │     │      counters folded from items                                   │
//! │     │      apply: current_stock ← physical, adjustment movement each    │
//! │     │      status completed                                             │
//! │     │                                                                   │
//! │     └──► cancel()   (draft or in_progress only)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Finalisation runs in one scope: the counters, every stock change and the
//! status flip land together or not at all.

use chrono::{Local, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::inventory::{InventoryRepository, REF_STOCK_OPNAME};
use crate::repository::product::load_product;
use crate::scope::{LockTarget, ScopeMode, TxScope};
use warung_core::input::{OpnameFilter, PageRequest, RecordCountInput};
use warung_core::numbering::DocumentKind;
use warung_core::{CoreError, OpnameItem, OpnameSession, OpnameStatus, Page, VarianceReport, VarianceTotals};

const ITEM_SELECT: &str = r#"
    SELECT i.*, p.name AS product_name, p.barcode AS product_barcode
    FROM stock_opname_items i
    JOIN products p ON p.id = i.product_id
"#;

#[derive(Debug, Clone)]
pub struct OpnameRepository {
    pool: SqlitePool,
}

impl OpnameRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OpnameRepository { pool }
    }

    // =========================================================================
    // Standalone Operations (own scope)
    // =========================================================================

    /// Starts a session in its own scope.
    pub async fn start(&self, notes: Option<&str>, actor: &str) -> DbResult<OpnameSession> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let session = self.start_in(&mut scope, notes, actor).await?;
        scope.commit().await?;

        info!(id = %session.id, code = %session.session_code, "Stock opname started");
        Ok(session)
    }

    pub async fn record_count(&self, input: &RecordCountInput, actor: &str) -> DbResult<OpnameItem> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let item = self.record_count_in(&mut scope, input, actor).await?;
        scope.commit().await?;
        Ok(item)
    }

    pub async fn finalize(&self, session_id: &str, actor: &str, apply_adjustments: bool) -> DbResult<VarianceReport> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let report = self.finalize_in(&mut scope, session_id, actor, apply_adjustments).await?;
        scope.commit().await?;

        info!(
            code = %report.session_code,
            loss = report.total_loss_value,
            gain = report.total_gain_value,
            applied = apply_adjustments,
            "Stock opname finalized"
        );
        Ok(report)
    }

    pub async fn cancel(&self, session_id: &str) -> DbResult<OpnameSession> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let session = self.cancel_in(&mut scope, session_id).await?;
        scope.commit().await?;

        info!(code = %session.session_code, "Stock opname cancelled");
        Ok(session)
    }

    // =========================================================================
    // In-Scope Operations
    // =========================================================================

    /// Starts a session with a fresh `SO-` code.
    pub async fn start_in(&self, scope: &mut TxScope, notes: Option<&str>, actor: &str) -> DbResult<OpnameSession> {
        let today = Local::now().date_naive();

        let seq = scope.next_sequence(&DocumentKind::Opname.sequence_name(today)).await?;
        let now = Utc::now();
        let session = OpnameSession {
            id: Uuid::new_v4().to_string(),
            session_code: DocumentKind::Opname.format(today, seq),
            status: OpnameStatus::InProgress,
            notes: notes.map(str::to_string),
            total_products: 0,
            total_variance: 0,
            total_loss_value: 0,
            total_gain_value: 0,
            created_by: Some(actor.to_string()),
            completed_by: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
            items: Vec::new(),
        };
        debug!(id = %session.id, code = %session.session_code, "Inserting opname session");

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO stock_opname_sessions (
                        id, session_code, status, notes, created_by, started_at, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                    "#,
                )
                .bind(&session.id)
                .bind(&session.session_code)
                .bind(session.status)
                .bind(&session.notes)
                .bind(&session.created_by)
                .bind(now),
            )
            .await?;
        Ok(session)
    }

    /// Records or overwrites the physical count of one product.
    pub async fn record_count_in(&self, scope: &mut TxScope, input: &RecordCountInput, actor: &str) -> DbResult<OpnameItem> {
        input.validate()?;

        let session = lock_session(scope, &input.session_id).await?;
        require_in_progress(&session)?;

        let product = load_product(scope.conn(), &input.product_id).await?;
        let system_stock = product.current_stock;
        let variance = input.physical_stock - system_stock;

        debug!(
            session = %session.session_code,
            product_id = %product.id,
            system_stock,
            physical_stock = input.physical_stock,
            "Recording count"
        );

        // system_stock and cost_per_unit keep their first-count snapshot
        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO stock_opname_items (
                        id, session_id, product_id, system_stock, physical_stock, variance,
                        cost_per_unit, variance_value, notes, counted_by, counted_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT(session_id, product_id) DO UPDATE SET
                        physical_stock = excluded.physical_stock,
                        variance = excluded.physical_stock - system_stock,
                        variance_value = (excluded.physical_stock - system_stock) * cost_per_unit,
                        notes = excluded.notes,
                        counted_by = excluded.counted_by,
                        counted_at = excluded.counted_at
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&session.id)
                .bind(&product.id)
                .bind(system_stock)
                .bind(input.physical_stock)
                .bind(variance)
                .bind(product.cost_price)
                .bind(variance * product.cost_price)
                .bind(&input.notes)
                .bind(actor)
                .bind(Utc::now()),
            )
            .await?;

        let sql = format!("{ITEM_SELECT} WHERE i.session_id = ?1 AND i.product_id = ?2");
        let item: OpnameItem = sqlx::query_as(&sql)
            .bind(&session.id)
            .bind(&product.id)
            .fetch_one(scope.conn())
            .await?;

        Ok(item)
    }

    /// Completes a session, optionally setting every counted product's stock
    /// to its physical count.
    pub async fn finalize_in(
        &self,
        scope: &mut TxScope,
        session_id: &str,
        actor: &str,
        apply_adjustments: bool,
    ) -> DbResult<VarianceReport> {
        let session = lock_session(scope, session_id).await?;
        require_in_progress(&session)?;

        let items = items(scope.conn(), &session.id).await?;
        let totals = VarianceTotals::from_items(&items);

        if apply_adjustments {
            let inventory = InventoryRepository::new(self.pool.clone());
            let note = format!("Stock Opname Adjustment - Session: {}", session.session_code);
            for item in items.iter().filter(|i| i.variance != 0) {
                inventory
                    .set_level(
                        scope,
                        &item.product_id,
                        item.physical_stock,
                        (REF_STOCK_OPNAME, session.id.as_str()),
                        Some(item.cost_per_unit),
                        &note,
                        actor,
                    )
                    .await?;
            }
        }

        scope
            .execute(
                sqlx::query(
                    r#"
                    UPDATE stock_opname_sessions
                    SET status = 'completed', total_products = ?2, total_variance = ?3,
                        total_loss_value = ?4, total_gain_value = ?5,
                        completed_by = ?6, completed_at = ?7
                    WHERE id = ?1
                    "#,
                )
                .bind(&session.id)
                .bind(totals.total_products)
                .bind(totals.total_variance)
                .bind(totals.total_loss_value)
                .bind(totals.total_gain_value)
                .bind(actor)
                .bind(Utc::now()),
            )
            .await?;
        Ok(report(&session, totals, items))
    }

    /// Cancels a draft or in-progress session. Counts are kept for reference.
    pub async fn cancel_in(&self, scope: &mut TxScope, session_id: &str) -> DbResult<OpnameSession> {
        let session = lock_session(scope, session_id).await?;

        if !matches!(session.status, OpnameStatus::Draft | OpnameStatus::InProgress) {
            return Err(CoreError::OpnameNotCancellable {
                id: session.id,
                status: session.status.as_str().to_string(),
            }
            .into());
        }

        scope
            .execute(sqlx::query("UPDATE stock_opname_sessions SET status = 'cancelled' WHERE id = ?1").bind(&session.id))
            .await?;
        Ok(OpnameSession {
            status: OpnameStatus::Cancelled,
            ..session
        })
    }

    /// Session with all counted items.
    pub async fn get(&self, session_id: &str) -> DbResult<OpnameSession> {
        let mut conn = self.pool.acquire().await?;
        let session: Option<OpnameSession> = sqlx::query_as("SELECT * FROM stock_opname_sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&mut *conn)
            .await?;
        let mut session = session.ok_or_else(|| CoreError::OpnameNotFound(session_id.to_string()))?;
        session.items = items(&mut *conn, session_id).await?;
        Ok(session)
    }

    /// Paged sessions, newest first. Items are not loaded.
    pub async fn list(&self, filter: &OpnameFilter) -> DbResult<Page<OpnameSession>> {
        let page = PageRequest::new(filter.page, filter.per_page);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_opname_sessions WHERE (?1 IS NULL OR status = ?1)")
            .bind(filter.status)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as(
            r#"
            SELECT * FROM stock_opname_sessions
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(filter.status)
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

    /// Variance of a session in any status, computed from its items.
    pub async fn variance_report(&self, session_id: &str) -> DbResult<VarianceReport> {
        let mut session = self.get(session_id).await?;
        let items = std::mem::take(&mut session.items);
        let totals = VarianceTotals::from_items(&items);
        Ok(report(&session, totals, items))
    }
}

async fn lock_session(scope: &mut TxScope, id: &str) -> DbResult<OpnameSession> {
    let session: Option<OpnameSession> = scope.select_for_update(LockTarget::OpnameSession, id).await?;
    session.ok_or_else(|| CoreError::OpnameNotFound(id.to_string()).into())
}

fn require_in_progress(session: &OpnameSession) -> DbResult<()> {
    if session.status != OpnameStatus::InProgress {
        return Err(CoreError::SessionNotInProgress {
            id: session.id.clone(),
            status: session.status.as_str().to_string(),
        }
        .into());
    }
    Ok(())
}

async fn items(conn: &mut SqliteConnection, session_id: &str) -> DbResult<Vec<OpnameItem>> {
    let sql = format!("{ITEM_SELECT} WHERE i.session_id = ?1 ORDER BY p.name, i.product_id");
    let items = sqlx::query_as(&sql).bind(session_id).fetch_all(conn).await?;
    Ok(items)
}

fn report(session: &OpnameSession, totals: VarianceTotals, items: Vec<OpnameItem>) -> VarianceReport {
    VarianceReport {
        session_id: session.id.clone(),
        session_code: session.session_code.clone(),
        total_products: totals.total_products,
        total_variance: totals.total_variance,
        total_loss_value: totals.total_loss_value,
        total_gain_value: totals.total_gain_value,
        net_value: totals.net_value(),
        items: items.into_iter().filter(|i| i.variance != 0).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use warung_core::input::NewProduct;
    use warung_core::{Product, StockMovementKind};

    async fn product(db: &Database, name: &str, stock: i64, cost: i64) -> Product {
        db.products()
            .create(
                &NewProduct {
                    name: name.into(),
                    barcode: None,
                    unit: "pcs".into(),
                    base_price: cost + 1_000,
                    cost_price: cost,
                    stock_tracked: true,
                    initial_stock: stock,
                    min_stock_alert: 0,
                    is_refillable: false,
                    empty_product_id: None,
                },
                "owner",
            )
            .await
            .unwrap()
    }

    fn count(session: &OpnameSession, product: &Product, physical: i64) -> RecordCountInput {
        RecordCountInput {
            session_id: session.id.clone(),
            product_id: product.id.clone(),
            physical_stock: physical,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_finalize_applies_adjustments() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gula = product(&db, "Gula", 100, 7_000).await;
        let teh = product(&db, "Teh", 20, 3_000).await;
        let opname = db.opname();

        let session = opname.start(None, "auditor").await.unwrap();
        assert!(session.session_code.starts_with("SO-"));
        assert!(session.session_code.ends_with("-0001"));

        opname.record_count(&count(&session, &gula, 90), "auditor").await.unwrap();
        // recount overwrites the first count
        let item = opname.record_count(&count(&session, &gula, 95), "auditor").await.unwrap();
        assert_eq!((item.system_stock, item.variance, item.variance_value), (100, -5, -35_000));
        opname.record_count(&count(&session, &teh, 22), "auditor").await.unwrap();

        let report = opname.finalize(&session.id, "auditor", true).await.unwrap();
        assert_eq!(report.total_products, 2);
        assert_eq!(report.total_variance, 7);
        assert_eq!(report.total_loss_value, 35_000);
        assert_eq!(report.total_gain_value, 6_000);
        assert_eq!(report.net_value, -29_000);

        assert_eq!(db.products().get(&gula.id).await.unwrap().current_stock, 95);
        let movement = db.inventory().latest_movement(&gula.id).await.unwrap().unwrap();
        assert_eq!(movement.kind, StockMovementKind::Adjustment);
        assert_eq!((movement.stock_before, movement.stock_after), (100, 95));
        assert_eq!(movement.reference_type.as_deref(), Some(REF_STOCK_OPNAME));

        let stored = opname.get(&session.id).await.unwrap();
        assert_eq!(stored.status, OpnameStatus::Completed);
        assert_eq!(stored.items.len(), 2);

        let err = opname.record_count(&count(&session, &teh, 1), "auditor").await.unwrap_err();
        assert_eq!(err.code(), "session_not_in_progress");
        let err = opname.cancel(&session.id).await.unwrap_err();
        assert_eq!(err.code(), "opname_not_cancellable");
    }

    #[tokio::test]
    async fn test_finalize_without_adjustments_leaves_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gula = product(&db, "Gula", 100, 7_000).await;
        let opname = db.opname();

        let session = opname.start(Some("bulanan"), "auditor").await.unwrap();
        opname.record_count(&count(&session, &gula, 95), "auditor").await.unwrap();
        let report = opname.finalize(&session.id, "auditor", false).await.unwrap();

        assert_eq!(report.total_loss_value, 35_000);
        assert_eq!(db.products().get(&gula.id).await.unwrap().current_stock, 100);
    }

    #[tokio::test]
    async fn test_cancel_and_list() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let opname = db.opname();

        let first = opname.start(None, "auditor").await.unwrap();
        let second = opname.start(None, "auditor").await.unwrap();
        assert!(second.session_code.ends_with("-0002"));

        let cancelled = opname.cancel(&first.id).await.unwrap();
        assert_eq!(cancelled.status, OpnameStatus::Cancelled);

        let page = opname
            .list(&OpnameFilter {
                status: Some(OpnameStatus::InProgress),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, second.id);

        assert_eq!(opname.get("missing").await.unwrap_err().code(), "opname_not_found");
    }
}
