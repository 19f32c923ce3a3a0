//! # Cash Drawer Sessions & Cash Flow
//!
//! At most one drawer session is open at a time. Storage enforces this with
//! the `uq_drawer_single_open` partial unique index, so two concurrent opens
//! cannot both succeed even though each checked first.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open(opening_balance)                                                  │
//! │       │                                                                 │
//! │       ├── cash sale      → income  "Penjualan"   ref (transaction, id)  │
//! │       ├── cancelled sale → expense "Pembatalan"  ref (transaction, id)  │
//! │       ├── manual record  → income / expense                             │
//! │       ▼                                                                 │
//! │  close(closing_balance)                                                 │
//! │       expected   = opening + Σ income − Σ expense                       │
//! │       difference = closing − expected                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Local, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::scope::{LockTarget, ScopeMode, TxScope};
use warung_core::input::{CashFlowFilter, CloseDrawerInput, NewCashFlow, OpenDrawerInput, PageRequest};
use warung_core::{
    CashFlowCategory, CashFlowKind, CashFlowRecord, CoreError, DrawerClosing, DrawerSession, DrawerStatus, Page,
    ValidationError,
};

/// Seeded category for cash sales.
pub const CATEGORY_SALES: &str = "6f1c3b8e-0001-4a51-9c1e-5a1e00000001";

/// Seeded category for refunds of cancelled cash sales.
pub const CATEGORY_CANCELLATION: &str = "6f1c3b8e-0003-4a51-9c1e-5a1e00000003";

/// Seeded category for cash paid back on a completed refund.
pub const CATEGORY_REFUND: &str = "6f1c3b8e-0006-4a51-9c1e-5a1e00000006";

#[derive(Debug, Clone)]
pub struct DrawerRepository {
    pool: SqlitePool,
}

impl DrawerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DrawerRepository { pool }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Opens a drawer session in its own scope. See [`Self::open_in`].
    pub async fn open(&self, input: &OpenDrawerInput, actor: &str) -> DbResult<DrawerSession> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let session = self.open_in(&mut scope, input, actor).await?;
        scope.commit().await?;

        info!(id = %session.id, opened_by = %session.opened_by, "Drawer session opened");
        Ok(session)
    }

    /// Opens a drawer session dated today (local time).
    ///
    /// Fails with `session_already_open` when one is already open.
    pub async fn open_in(&self, scope: &mut TxScope, input: &OpenDrawerInput, actor: &str) -> DbResult<DrawerSession> {
        input.validate()?;

        let session = DrawerSession {
            id: Uuid::new_v4().to_string(),
            session_date: Local::now().date_naive(),
            opening_balance: input.opening_balance,
            closing_balance: None,
            expected_closing: None,
            difference: None,
            status: DrawerStatus::Open,
            opened_by: actor.to_string(),
            closed_by: None,
            notes: input.notes.clone(),
            opened_at: Utc::now(),
            closed_at: None,
        };
        debug!(id = %session.id, opening_balance = session.opening_balance, "Opening drawer session");

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO cash_drawer_sessions (
                        id, session_date, opening_balance, status, opened_by, notes, opened_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(&session.id)
                .bind(session.session_date)
                .bind(session.opening_balance)
                .bind(session.status)
                .bind(&session.opened_by)
                .bind(&session.notes)
                .bind(session.opened_at),
            )
            .await?;

        Ok(session)
    }

    /// Closes a session in its own scope. See [`Self::close_in`].
    pub async fn close(&self, input: &CloseDrawerInput, actor: &str) -> DbResult<DrawerClosing> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let closing = self.close_in(&mut scope, input, actor).await?;
        scope.commit().await?;

        log_closing(&closing);
        Ok(closing)
    }

    /// Closes a session and computes expected vs counted cash.
    ///
    /// Fails with `session_not_found` or `session_not_open`.
    pub async fn close_in(&self, scope: &mut TxScope, input: &CloseDrawerInput, actor: &str) -> DbResult<DrawerClosing> {
        input.validate()?;

        let session: DrawerSession = scope
            .select_for_update(LockTarget::DrawerSession, &input.session_id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(input.session_id.clone()))?;

        if session.status != DrawerStatus::Open {
            return Err(CoreError::SessionNotOpen(session.id).into());
        }

        let (total_income, total_expense): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN kind = 'income' THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount ELSE 0 END), 0)
            FROM cash_flow_records
            WHERE session_id = ?1
            "#,
        )
        .bind(&session.id)
        .fetch_one(scope.conn())
        .await?;

        let expected = session.opening_balance + total_income - total_expense;
        let difference = input.closing_balance - expected;
        let closed_at = Utc::now();
        let notes = input.notes.clone().or(session.notes.clone());

        scope
            .execute(
                sqlx::query(
                    r#"
                    UPDATE cash_drawer_sessions
                    SET closing_balance = ?2, expected_closing = ?3, difference = ?4,
                        status = 'closed', closed_by = ?5, notes = ?6, closed_at = ?7
                    WHERE id = ?1
                    "#,
                )
                .bind(&session.id)
                .bind(input.closing_balance)
                .bind(expected)
                .bind(difference)
                .bind(actor)
                .bind(&notes)
                .bind(closed_at),
            )
            .await?;

        Ok(DrawerClosing {
            session: DrawerSession {
                closing_balance: Some(input.closing_balance),
                expected_closing: Some(expected),
                difference: Some(difference),
                status: DrawerStatus::Closed,
                closed_by: Some(actor.to_string()),
                notes,
                closed_at: Some(closed_at),
                ..session
            },
            total_income,
            total_expense,
        })
    }

    /// The open session, if any.
    pub async fn current(&self) -> DbResult<Option<DrawerSession>> {
        let session = sqlx::query_as("SELECT * FROM cash_drawer_sessions WHERE status = 'open' LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    /// The open session, read inside the caller's scope.
    pub async fn current_in(&self, scope: &mut TxScope) -> DbResult<Option<DrawerSession>> {
        let session = sqlx::query_as("SELECT * FROM cash_drawer_sessions WHERE status = 'open' LIMIT 1")
            .fetch_optional(scope.conn())
            .await?;
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> DbResult<DrawerSession> {
        let session: Option<DrawerSession> = sqlx::query_as("SELECT * FROM cash_drawer_sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        session.ok_or_else(|| CoreError::SessionNotFound(id.to_string()).into())
    }

    // =========================================================================
    // Cash Flow
    // =========================================================================

    /// Records a manual cash flow, linked to the open session if there is one.
    pub async fn record(&self, input: &NewCashFlow, actor: &str) -> DbResult<CashFlowRecord> {
        input.validate()?;

        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let record = self.record_in(&mut scope, input, actor).await?;
        scope.commit().await?;
        Ok(record)
    }

    /// Records a cash flow inside the caller's scope.
    pub async fn record_in(&self, scope: &mut TxScope, input: &NewCashFlow, actor: &str) -> DbResult<CashFlowRecord> {
        input.validate()?;

        if let Some(category_id) = &input.category_id {
            let kind: Option<CashFlowKind> =
                sqlx::query_scalar("SELECT kind FROM cash_flow_categories WHERE id = ?1")
                    .bind(category_id)
                    .fetch_optional(scope.conn())
                    .await?;
            match kind {
                None => {
                    return Err(ValidationError::InvalidFormat {
                        field: "category_id".to_string(),
                        reason: format!("unknown category {category_id}"),
                    }
                    .into())
                }
                Some(kind) if kind != input.kind => {
                    return Err(ValidationError::InvalidFormat {
                        field: "category_id".to_string(),
                        reason: "category kind does not match cash flow kind".to_string(),
                    }
                    .into())
                }
                Some(_) => {}
            }
        }

        let session = self.current_in(scope).await?;
        let record = CashFlowRecord {
            id: Uuid::new_v4().to_string(),
            session_id: session.map(|s| s.id),
            category_id: input.category_id.clone(),
            kind: input.kind,
            amount: input.amount,
            description: input.description.clone(),
            reference_type: input.reference_type.clone(),
            reference_id: input.reference_id.clone(),
            created_by: actor.to_string(),
            created_at: Utc::now(),
        };
        debug!(
            id = %record.id,
            kind = ?record.kind,
            amount = record.amount,
            session_id = ?record.session_id,
            "Writing cash flow"
        );

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO cash_flow_records (
                        id, session_id, category_id, kind, amount, description,
                        reference_type, reference_id, created_by, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )
                .bind(&record.id)
                .bind(&record.session_id)
                .bind(&record.category_id)
                .bind(record.kind)
                .bind(record.amount)
                .bind(&record.description)
                .bind(&record.reference_type)
                .bind(&record.reference_id)
                .bind(&record.created_by)
                .bind(record.created_at),
            )
            .await?;

        Ok(record)
    }

    /// Whether a cash flow referencing this document was written.
    pub async fn has_reference_in(
        &self,
        scope: &mut TxScope,
        reference_type: &str,
        reference_id: &str,
        kind: CashFlowKind,
    ) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cash_flow_records WHERE reference_type = ?1 AND reference_id = ?2 AND kind = ?3",
        )
        .bind(reference_type)
        .bind(reference_id)
        .bind(kind)
        .fetch_one(scope.conn())
        .await?;
        Ok(count > 0)
    }

    pub async fn categories(&self) -> DbResult<Vec<CashFlowCategory>> {
        let categories = sqlx::query_as("SELECT * FROM cash_flow_categories WHERE is_active = 1 ORDER BY kind, name")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    /// Paged cash flows, newest first.
    pub async fn cash_flows(&self, filter: &CashFlowFilter) -> DbResult<Page<CashFlowRecord>> {
        let page = PageRequest::new(filter.page, filter.per_page);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM cash_flow_records
            WHERE (?1 IS NULL OR session_id = ?1) AND (?2 IS NULL OR kind = ?2)
            "#,
        )
        .bind(&filter.session_id)
        .bind(filter.kind)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as(
            r#"
            SELECT * FROM cash_flow_records
            WHERE (?1 IS NULL OR session_id = ?1) AND (?2 IS NULL OR kind = ?2)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(&filter.session_id)
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
}

/// Logs a committed closing; a drawer that does not balance gets a warning.
pub fn log_closing(closing: &DrawerClosing) {
    let session = &closing.session;
    let expected = session.expected_closing.unwrap_or_default();
    let difference = session.difference.unwrap_or_default();
    if difference != 0 {
        warn!(
            id = %session.id,
            expected,
            counted = session.closing_balance.unwrap_or_default(),
            difference,
            "Drawer does not balance"
        );
    }
    info!(id = %session.id, expected, difference, "Drawer session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn flow(kind: CashFlowKind, amount: i64) -> NewCashFlow {
        NewCashFlow {
            category_id: None,
            kind,
            amount,
            description: None,
            reference_type: None,
            reference_id: None,
        }
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let db = db().await;
        let drawer = db.drawer();

        let input = OpenDrawerInput {
            opening_balance: 200_000,
            notes: None,
        };
        drawer.open(&input, "kasir").await.unwrap();
        let err = drawer.open(&input, "kasir").await.unwrap_err();
        assert_eq!(err.code(), "session_already_open");
    }

    #[tokio::test]
    async fn test_close_reconciles_cash_flow() {
        let db = db().await;
        let drawer = db.drawer();

        let session = drawer
            .open(
                &OpenDrawerInput {
                    opening_balance: 200_000,
                    notes: None,
                },
                "kasir",
            )
            .await
            .unwrap();
        drawer.record(&flow(CashFlowKind::Income, 150_000), "kasir").await.unwrap();
        drawer.record(&flow(CashFlowKind::Expense, 30_000), "kasir").await.unwrap();

        let closing = drawer
            .close(
                &CloseDrawerInput {
                    session_id: session.id.clone(),
                    closing_balance: 315_000,
                    notes: None,
                },
                "kasir",
            )
            .await
            .unwrap();
        assert_eq!(closing.session.expected_closing, Some(320_000));
        assert_eq!(closing.session.difference, Some(-5_000));
        assert_eq!(closing.total_income, 150_000);

        let again = drawer
            .close(
                &CloseDrawerInput {
                    session_id: session.id.clone(),
                    closing_balance: 315_000,
                    notes: None,
                },
                "kasir",
            )
            .await
            .unwrap_err();
        assert_eq!(again.code(), "session_not_open");

        let missing = drawer
            .close(
                &CloseDrawerInput {
                    session_id: "missing".into(),
                    closing_balance: 0,
                    notes: None,
                },
                "kasir",
            )
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "session_not_found");

        assert!(drawer.current().await.unwrap().is_none());
        drawer
            .open(
                &OpenDrawerInput {
                    opening_balance: 315_000,
                    notes: None,
                },
                "kasir",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_flow_without_session_is_unlinked() {
        let db = db().await;
        let drawer = db.drawer();

        let record = drawer.record(&flow(CashFlowKind::Expense, 10_000), "owner").await.unwrap();
        assert!(record.session_id.is_none());

        let mut wrong = flow(CashFlowKind::Expense, 10_000);
        wrong.category_id = Some(CATEGORY_SALES.to_string());
        let err = drawer.record(&wrong, "owner").await.unwrap_err();
        assert_eq!(err.code(), "validation");

        assert_eq!(drawer.categories().await.unwrap().len(), 5);
        let page = drawer.cash_flows(&CashFlowFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }
}
