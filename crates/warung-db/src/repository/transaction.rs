//! # Transaction Repository
//!
//! Sale headers and their lines. Writes only happen inside the orchestrator's
//! scope; this module never opens a write scope of its own.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Transaction Lifecycle                               │
//! │                                                                         │
//! │  1. CHECKOUT (one scope)                                                │
//! │     └── insert() → header + lines, status completed or pending          │
//! │                                                                         │
//! │  2. (GATEWAY) MARK COMPLETED                                            │
//! │     └── set_status(Completed) → pending becomes completed               │
//! │                                                                         │
//! │  3. (OPTIONAL) CANCEL                                                   │
//! │     └── set_status(Cancelled) → stock restored by the caller            │
//! │         refused once a refund has completed                             │
//! │                                                                         │
//! │  4. (OPTIONAL) REFUND                                                   │
//! │     └── set_status(Refunded) → once every sold unit has come back       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::scope::{LockTarget, TxScope};
use warung_core::input::{PageRequest, TransactionFilter};
use warung_core::{CoreError, DailySummary, Page, Transaction, TransactionItem, TransactionStatus};

#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    // =========================================================================
    // In-Scope Writes
    // =========================================================================

    /// Inserts a header and all of its lines.
    pub async fn insert(&self, scope: &mut TxScope, tx: &Transaction) -> DbResult<()> {
        debug!(id = %tx.id, invoice = %tx.invoice_number, lines = tx.items.len(), "Inserting transaction");

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO transactions (
                        id, invoice_number, customer_id,
                        subtotal, discount_amount, tax_amount, total_amount,
                        payment_method, amount_paid, change_amount, status,
                        notes, cashier_name, created_at, updated_at, completed_at
                    ) VALUES (
                        ?1, ?2, ?3,
                        ?4, ?5, ?6, ?7,
                        ?8, ?9, ?10, ?11,
                        ?12, ?13, ?14, ?15, ?16
                    )
                    "#,
                )
                .bind(&tx.id)
                .bind(&tx.invoice_number)
                .bind(&tx.customer_id)
                .bind(tx.subtotal)
                .bind(tx.discount_amount)
                .bind(tx.tax_amount)
                .bind(tx.total_amount)
                .bind(tx.payment_method)
                .bind(tx.amount_paid)
                .bind(tx.change_amount)
                .bind(tx.status)
                .bind(&tx.notes)
                .bind(&tx.cashier_name)
                .bind(tx.created_at)
                .bind(tx.updated_at)
                .bind(tx.completed_at),
            )
            .await?;

        for item in &tx.items {
            scope
                .execute(
                    sqlx::query(
                        r#"
                        INSERT INTO transaction_items (
                            id, transaction_id, line_no, product_id, product_name, product_barcode,
                            quantity, unit, unit_price, cost_price, subtotal, discount_amount,
                            total_amount, pricing_tier_id, pricing_tier_name, notes
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                        "#,
                    )
                    .bind(&item.id)
                    .bind(&item.transaction_id)
                    .bind(item.line_no)
                    .bind(&item.product_id)
                    .bind(&item.product_name)
                    .bind(&item.product_barcode)
                    .bind(item.quantity)
                    .bind(&item.unit)
                    .bind(item.unit_price)
                    .bind(item.cost_price)
                    .bind(item.subtotal)
                    .bind(item.discount_amount)
                    .bind(item.total_amount)
                    .bind(&item.pricing_tier_id)
                    .bind(&item.pricing_tier_name)
                    .bind(&item.notes),
                )
                .await?;
        }

        Ok(())
    }

    /// Locks a header inside a write scope. Lines are not loaded.
    pub async fn lock(&self, scope: &mut TxScope, id: &str) -> DbResult<Transaction> {
        let tx: Option<Transaction> = scope.select_for_update(LockTarget::Transaction, id).await?;
        tx.ok_or_else(|| CoreError::TransactionNotFound(id.to_string()).into())
    }

    /// Lines of a transaction in cart order, read inside the scope.
    pub async fn items_in(&self, scope: &mut TxScope, id: &str) -> DbResult<Vec<TransactionItem>> {
        items(scope.conn(), id).await
    }

    /// Moves a transaction to `status`.
    ///
    /// The caller has already checked the transition.
    pub async fn set_status(
        &self,
        scope: &mut TxScope,
        id: &str,
        status: TransactionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        debug!(id, %status, "Updating transaction status");
        scope
            .execute(
                sqlx::query(
                    r#"
                    UPDATE transactions
                    SET status = ?2, completed_at = COALESCE(?3, completed_at), updated_at = ?4
                    WHERE id = ?1
                    "#,
                )
                .bind(id)
                .bind(status)
                .bind(completed_at)
                .bind(Utc::now()),
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Header with lines.
    pub async fn get(&self, id: &str) -> DbResult<Transaction> {
        let mut conn = self.pool.acquire().await?;
        load(&mut *conn, id).await
    }

    /// Header with lines, read inside the caller's scope.
    pub async fn get_in(&self, scope: &mut TxScope, id: &str) -> DbResult<Transaction> {
        load(scope.conn(), id).await
    }

    /// Paged headers, newest first. Lines are not loaded.
    pub async fn list(&self, filter: &TransactionFilter) -> DbResult<Page<Transaction>> {
        let page = PageRequest::new(filter.page, filter.per_page);

        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR customer_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR payment_method = ?3)
              AND (?4 IS NULL OR created_at >= ?4)
              AND (?5 IS NULL OR created_at < ?5)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM transactions {WHERE}"))
            .bind(&filter.customer_id)
            .bind(filter.status)
            .bind(filter.payment_method)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as(&format!(
            "SELECT * FROM transactions {WHERE} ORDER BY created_at DESC, rowid DESC LIMIT ?6 OFFSET ?7"
        ))
        .bind(&filter.customer_id)
        .bind(filter.status)
        .bind(filter.payment_method)
        .bind(filter.from)
        .bind(filter.to)
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

    /// Completed sales of one local calendar day.
    pub async fn daily_summary(&self, date: NaiveDate) -> DbResult<DailySummary> {
        let (start, end) = local_day_bounds(date);

        let (transaction_count, total_sales): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(total_amount), 0)
            FROM transactions
            WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let gross_profit: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(i.total_amount - i.cost_price * i.quantity), 0)
            FROM transaction_items i
            JOIN transactions t ON t.id = i.transaction_id
            WHERE t.status = 'completed' AND t.created_at >= ?1 AND t.created_at < ?2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(DailySummary {
            date,
            transaction_count,
            total_sales,
            gross_profit,
        })
    }
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Transaction> {
    let tx: Option<Transaction> = sqlx::query_as("SELECT * FROM transactions WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let mut tx = tx.ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))?;
    tx.items = items(conn, id).await?;
    Ok(tx)
}

async fn items(conn: &mut SqliteConnection, id: &str) -> DbResult<Vec<TransactionItem>> {
    let items = sqlx::query_as("SELECT * FROM transaction_items WHERE transaction_id = ?1 ORDER BY line_no")
        .bind(id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// UTC instants bounding a local calendar day, `[start, end)`.
fn local_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let to_utc = |day: NaiveDate| {
        let midnight = day.and_time(chrono::NaiveTime::MIN);
        Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    };
    let next = date.succ_opt().unwrap_or(date);
    (to_utc(date), to_utc(next))
}
