//! # Refunds
//!
//! Refund requests against completed sales and the lines they return.
//!
//! ## Refund Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create   REF-20250114-0001, pending                                    │
//! │           quantities checked against sold − already claimed             │
//! │     │                                                                   │
//! │     ├──► approve (one scope, in the engine)                             │
//! │     │      restock lines → `return` movements referencing the refund    │
//! │     │      credit sale   → kasbon payment                               │
//! │     │      cash sale     → drawer expense                               │
//! │     │      every line fully returned → sale becomes `refunded`          │
//! │     │      status completed                                             │
//! │     │                                                                   │
//! │     └──► reject → status rejected, quantities released                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Like the transaction repository, this module never opens a write scope of
//! its own.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::scope::{LockTarget, TxScope};
use warung_core::{CoreError, Refund, RefundItem, RefundStatus};

#[derive(Debug, Clone)]
pub struct RefundRepository {
    pool: SqlitePool,
}

impl RefundRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RefundRepository { pool }
    }

    // =========================================================================
    // In-Scope Writes
    // =========================================================================

    /// Inserts a refund request and its lines.
    pub async fn insert(&self, scope: &mut TxScope, refund: &Refund) -> DbResult<()> {
        debug!(
            id = %refund.id,
            number = %refund.refund_number,
            transaction_id = %refund.transaction_id,
            amount = refund.total_refund_amount,
            "Inserting refund"
        );

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO refund_records (
                        id, refund_number, transaction_id, customer_id, refund_method,
                        total_refund_amount, status, reason, notes, requested_by,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                )
                .bind(&refund.id)
                .bind(&refund.refund_number)
                .bind(&refund.transaction_id)
                .bind(&refund.customer_id)
                .bind(refund.refund_method)
                .bind(refund.total_refund_amount)
                .bind(refund.status)
                .bind(&refund.reason)
                .bind(&refund.notes)
                .bind(&refund.requested_by)
                .bind(refund.created_at)
                .bind(refund.updated_at),
            )
            .await?;

        for item in &refund.items {
            scope
                .execute(
                    sqlx::query(
                        r#"
                        INSERT INTO refund_items (
                            id, refund_id, transaction_item_id, product_id, product_name,
                            quantity, unit_price, refund_amount, reason, restock
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                        "#,
                    )
                    .bind(&item.id)
                    .bind(&item.refund_id)
                    .bind(&item.transaction_item_id)
                    .bind(&item.product_id)
                    .bind(&item.product_name)
                    .bind(item.quantity)
                    .bind(item.unit_price)
                    .bind(item.refund_amount)
                    .bind(&item.reason)
                    .bind(item.restock),
                )
                .await?;
        }

        Ok(())
    }

    /// Locks a refund header.
    pub async fn lock(&self, scope: &mut TxScope, id: &str) -> DbResult<Refund> {
        let refund: Option<Refund> = scope.select_for_update(LockTarget::Refund, id).await?;
        refund.ok_or_else(|| CoreError::RefundNotFound(id.to_string()).into())
    }

    /// Moves a pending refund to `completed` or `rejected`.
    pub async fn set_status(
        &self,
        scope: &mut TxScope,
        id: &str,
        status: RefundStatus,
        processed_by: &str,
        completed_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        debug!(id, %status, "Updating refund status");
        scope
            .execute(
                sqlx::query(
                    r#"
                    UPDATE refund_records
                    SET status = ?2, processed_by = ?3, completed_at = ?4, updated_at = ?5
                    WHERE id = ?1
                    "#,
                )
                .bind(id)
                .bind(status)
                .bind(processed_by)
                .bind(completed_at)
                .bind(Utc::now()),
            )
            .await?;
        Ok(())
    }

    /// Lines of a refund, read inside the scope.
    pub async fn items_in(&self, scope: &mut TxScope, id: &str) -> DbResult<Vec<RefundItem>> {
        items(scope.conn(), id).await
    }

    /// Quantity per sale line that pending and completed refunds already claim.
    pub async fn claimed_in(&self, scope: &mut TxScope, transaction_id: &str) -> DbResult<HashMap<String, i64>> {
        quantities(scope.conn(), transaction_id, &[RefundStatus::Pending, RefundStatus::Completed]).await
    }

    /// Quantity per sale line that completed refunds have returned.
    pub async fn returned_in(&self, scope: &mut TxScope, transaction_id: &str) -> DbResult<HashMap<String, i64>> {
        quantities(scope.conn(), transaction_id, &[RefundStatus::Completed]).await
    }

    /// True when the sale has at least one completed refund.
    pub async fn has_completed_in(&self, scope: &mut TxScope, transaction_id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM refund_records WHERE transaction_id = ?1 AND status = 'completed' LIMIT 1",
        )
        .bind(transaction_id)
        .fetch_optional(scope.conn())
        .await?;
        Ok(found.is_some())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Refund with lines.
    pub async fn get(&self, id: &str) -> DbResult<Refund> {
        let mut conn = self.pool.acquire().await?;
        load(&mut *conn, id).await
    }

    pub async fn get_in(&self, scope: &mut TxScope, id: &str) -> DbResult<Refund> {
        load(scope.conn(), id).await
    }

    /// Every refund of one sale, oldest first, with lines.
    pub async fn for_transaction(&self, transaction_id: &str) -> DbResult<Vec<Refund>> {
        let mut conn = self.pool.acquire().await?;
        let mut refunds: Vec<Refund> =
            sqlx::query_as("SELECT * FROM refund_records WHERE transaction_id = ?1 ORDER BY created_at, rowid")
                .bind(transaction_id)
                .fetch_all(&mut *conn)
                .await?;
        for refund in &mut refunds {
            refund.items = items(&mut *conn, &refund.id).await?;
        }
        Ok(refunds)
    }
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Refund> {
    let refund: Option<Refund> = sqlx::query_as("SELECT * FROM refund_records WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let mut refund = refund.ok_or_else(|| CoreError::RefundNotFound(id.to_string()))?;
    refund.items = items(conn, id).await?;
    Ok(refund)
}

async fn items(conn: &mut SqliteConnection, refund_id: &str) -> DbResult<Vec<RefundItem>> {
    let items = sqlx::query_as("SELECT * FROM refund_items WHERE refund_id = ?1 ORDER BY rowid")
        .bind(refund_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

async fn quantities(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    statuses: &[RefundStatus],
) -> DbResult<HashMap<String, i64>> {
    let mut totals = HashMap::new();
    for status in statuses {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT i.transaction_item_id, SUM(i.quantity)
            FROM refund_items i
            JOIN refund_records r ON r.id = i.refund_id
            WHERE r.transaction_id = ?1 AND r.status = ?2
            GROUP BY i.transaction_item_id
            "#,
        )
        .bind(transaction_id)
        .bind(*status)
        .fetch_all(&mut *conn)
        .await?;

        for (item_id, qty) in rows {
            *totals.entry(item_id).or_insert(0) += qty;
        }
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::scope::ScopeMode;
    use warung_core::input::NewProduct;
    use warung_core::{PaymentMethod, Transaction, TransactionItem, TransactionStatus};

    async fn setup() -> (Database, Transaction) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(
                &NewProduct {
                    name: "Sabun Cuci".into(),
                    barcode: None,
                    unit: "pcs".into(),
                    base_price: 5_000,
                    cost_price: 4_000,
                    stock_tracked: false,
                    initial_stock: 0,
                    min_stock_alert: 0,
                    is_refillable: false,
                    empty_product_id: None,
                },
                "owner",
            )
            .await
            .unwrap();

        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let sale = Transaction {
            id: id.clone(),
            invoice_number: "INV-TEST-0001".into(),
            customer_id: None,
            subtotal: 20_000,
            discount_amount: 0,
            tax_amount: 0,
            total_amount: 20_000,
            payment_method: PaymentMethod::Cash,
            amount_paid: 20_000,
            change_amount: 0,
            status: TransactionStatus::Completed,
            notes: None,
            cashier_name: "Sari".into(),
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
            items: vec![TransactionItem {
                id: uuid::Uuid::new_v4().to_string(),
                transaction_id: id,
                line_no: 1,
                product_id: product.id,
                product_name: "Sabun Cuci".into(),
                product_barcode: None,
                quantity: 4,
                unit: "pcs".into(),
                unit_price: 5_000,
                cost_price: 4_000,
                subtotal: 20_000,
                discount_amount: 0,
                total_amount: 20_000,
                pricing_tier_id: None,
                pricing_tier_name: None,
                notes: None,
            }],
        };

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        db.transactions().insert(&mut scope, &sale).await.unwrap();
        scope.commit().await.unwrap();
        (db, sale)
    }

    fn request(sale: &Transaction, number: &str, qty: i64) -> Refund {
        let line = &sale.items[0];
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        Refund {
            id: id.clone(),
            refund_number: number.into(),
            transaction_id: sale.id.clone(),
            customer_id: None,
            refund_method: sale.payment_method,
            total_refund_amount: RefundItem::prorate(line, qty),
            status: RefundStatus::Pending,
            reason: "kemasan bocor".into(),
            notes: None,
            requested_by: "Sari".into(),
            processed_by: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            items: vec![RefundItem {
                id: uuid::Uuid::new_v4().to_string(),
                refund_id: id,
                transaction_item_id: line.id.clone(),
                product_id: line.product_id.clone(),
                product_name: line.product_name.clone(),
                quantity: qty,
                unit_price: line.unit_price,
                refund_amount: RefundItem::prorate(line, qty),
                reason: None,
                restock: false,
            }],
        }
    }

    #[tokio::test]
    async fn test_claimed_and_returned_quantities() {
        let (db, sale) = setup().await;
        let repo = db.refunds();
        let line_id = sale.items[0].id.clone();

        let kept = request(&sale, "REF-TEST-0001", 1);
        let dropped = request(&sale, "REF-TEST-0002", 2);

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        repo.insert(&mut scope, &kept).await.unwrap();
        repo.insert(&mut scope, &dropped).await.unwrap();
        assert_eq!(repo.claimed_in(&mut scope, &sale.id).await.unwrap()[&line_id], 3);
        assert!(repo.returned_in(&mut scope, &sale.id).await.unwrap().is_empty());

        repo.set_status(&mut scope, &kept.id, RefundStatus::Completed, "owner", Some(Utc::now()))
            .await
            .unwrap();
        repo.set_status(&mut scope, &dropped.id, RefundStatus::Rejected, "owner", None)
            .await
            .unwrap();

        assert_eq!(repo.claimed_in(&mut scope, &sale.id).await.unwrap()[&line_id], 1);
        assert_eq!(repo.returned_in(&mut scope, &sale.id).await.unwrap()[&line_id], 1);
        assert!(repo.has_completed_in(&mut scope, &sale.id).await.unwrap());
        scope.commit().await.unwrap();

        let all = repo.for_transaction(&sale.id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].refund_number, "REF-TEST-0001");
        assert_eq!(all[0].status, RefundStatus::Completed);
        assert_eq!(all[0].processed_by.as_deref(), Some("owner"));
        assert_eq!(all[1].items[0].quantity, 2);
        assert!(!all[1].items[0].restock);
    }

    #[tokio::test]
    async fn test_missing_refund() {
        let (db, _) = setup().await;
        assert_eq!(db.refunds().get("missing").await.unwrap_err().code(), "refund_not_found");
    }
}
