//! # Kasbon (Store Credit) Ledger
//!
//! Debt and payment entries per customer. `customers.current_debt` is the
//! running balance; every change to it writes one `kasbon_records` row in
//! the same scope.
//!
//! ## Balance Rules
//! ```text
//! debt     balance_after = balance_before + amount   (limit checked)
//! payment  amount ← min(amount, balance_before)       (excess discarded)
//!          balance_after = balance_before − amount
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::scope::{LockTarget, ScopeMode, TxScope};
use warung_core::input::{KasbonFilter, KasbonPaymentInput, PageRequest};
use warung_core::validation::validate_positive;
use warung_core::{CoreError, Customer, KasbonEntry, KasbonKind, KasbonReport, KasbonSummary, Page};

/// Number of customers listed in [`KasbonReport::top_debtors`].
const TOP_DEBTORS: i64 = 10;

const SUMMARY_SELECT: &str = r#"
    SELECT
        c.id AS customer_id,
        c.name AS customer_name,
        COALESCE((SELECT SUM(amount) FROM kasbon_records WHERE customer_id = c.id AND kind = 'debt'), 0)
            AS total_debt,
        COALESCE((SELECT SUM(amount) FROM kasbon_records WHERE customer_id = c.id AND kind = 'payment'), 0)
            AS total_payment,
        c.current_debt AS current_balance,
        c.credit_limit,
        CASE WHEN c.credit_limit = 0 THEN -1 ELSE MAX(c.credit_limit - c.current_debt, 0) END
            AS remaining_credit,
        (SELECT MAX(created_at) FROM kasbon_records WHERE customer_id = c.id) AS last_transaction_at
    FROM customers c
"#;

#[derive(Debug, Clone)]
pub struct KasbonRepository {
    pool: SqlitePool,
}

impl KasbonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        KasbonRepository { pool }
    }

    /// Posts a credit sale to the customer's balance.
    ///
    /// Runs inside the checkout scope. Fails with `credit_limit_exceeded`
    /// when the new balance would pass a non-zero limit.
    pub async fn record_debt(
        &self,
        scope: &mut TxScope,
        customer_id: &str,
        amount: i64,
        transaction_id: Option<&str>,
        notes: Option<&str>,
        actor: &str,
    ) -> DbResult<KasbonEntry> {
        validate_positive("amount", amount)?;
        let customer = lock_customer(scope, customer_id).await?;

        if !customer.can_incur(amount) {
            return Err(CoreError::CreditLimitExceeded {
                customer: customer.name.clone(),
                current_debt: customer.current_debt,
                credit_limit: customer.credit_limit,
                requested: amount,
            }
            .into());
        }

        write_entry(scope, &customer, KasbonKind::Debt, amount, transaction_id, notes, actor).await
    }

    /// Records a repayment in its own scope. See [`Self::record_payment_in`].
    pub async fn record_payment(&self, input: &KasbonPaymentInput, actor: &str) -> DbResult<KasbonEntry> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let entry = self.record_payment_in(&mut scope, input, actor).await?;
        scope.commit().await?;

        info!(
            customer_id = %input.customer_id,
            paid = entry.amount,
            balance = entry.balance_after,
            "Kasbon payment recorded"
        );
        Ok(entry)
    }

    /// Records a repayment inside the caller's scope.
    ///
    /// The amount is clamped to the outstanding balance. A customer who owes
    /// nothing gets `no_debt`.
    pub async fn record_payment_in(
        &self,
        scope: &mut TxScope,
        input: &KasbonPaymentInput,
        actor: &str,
    ) -> DbResult<KasbonEntry> {
        input.validate()?;

        let entry = self
            .settle_in(scope, &input.customer_id, input.amount, None, input.notes.as_deref(), actor)
            .await?;
        match entry {
            Some(entry) => Ok(entry),
            None => {
                let customer = lock_customer(scope, &input.customer_id).await?;
                Err(CoreError::NoDebt { customer: customer.name }.into())
            }
        }
    }

    /// Writes a clamped payment inside the caller's scope.
    ///
    /// Returns `None` when the customer owes nothing; no row is written.
    pub async fn settle_in(
        &self,
        scope: &mut TxScope,
        customer_id: &str,
        amount: i64,
        transaction_id: Option<&str>,
        notes: Option<&str>,
        actor: &str,
    ) -> DbResult<Option<KasbonEntry>> {
        validate_positive("amount", amount)?;
        let customer = lock_customer(scope, customer_id).await?;

        let applied = amount.min(customer.current_debt);
        if applied <= 0 {
            return Ok(None);
        }
        if applied < amount {
            debug!(customer_id, requested = amount, applied, "Payment clamped to outstanding debt");
        }

        let entry = write_entry(scope, &customer, KasbonKind::Payment, applied, transaction_id, notes, actor).await?;
        Ok(Some(entry))
    }

    /// Paged ledger entries of one customer, newest first.
    pub async fn history(&self, customer_id: &str, filter: &KasbonFilter) -> DbResult<Page<KasbonEntry>> {
        let page = PageRequest::new(filter.page, filter.per_page);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM kasbon_records WHERE customer_id = ?1 AND (?2 IS NULL OR kind = ?2)",
        )
        .bind(customer_id)
        .bind(filter.kind)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as(
            r#"
            SELECT * FROM kasbon_records
            WHERE customer_id = ?1 AND (?2 IS NULL OR kind = ?2)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(customer_id)
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

    pub async fn summary(&self, customer_id: &str) -> DbResult<KasbonSummary> {
        let sql = format!("{SUMMARY_SELECT} WHERE c.id = ?1");
        let summary: Option<KasbonSummary> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        summary.ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()).into())
    }

    /// Outstanding credit across active customers.
    pub async fn report(&self) -> DbResult<KasbonReport> {
        let (total_customers, total_outstanding, customers_with_debt): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(current_debt), 0),
                COALESCE(SUM(CASE WHEN current_debt > 0 THEN 1 ELSE 0 END), 0)
            FROM customers
            WHERE is_active = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "{SUMMARY_SELECT} WHERE c.is_active = 1 AND c.current_debt > 0 \
             ORDER BY c.current_debt DESC, c.name LIMIT ?1"
        );
        let top_debtors = sqlx::query_as(&sql).bind(TOP_DEBTORS).fetch_all(&self.pool).await?;

        Ok(KasbonReport {
            total_outstanding,
            total_customers,
            customers_with_debt,
            top_debtors,
        })
    }
}

async fn lock_customer(scope: &mut TxScope, customer_id: &str) -> DbResult<Customer> {
    let customer: Option<Customer> = scope.select_for_update(LockTarget::Customer, customer_id).await?;
    customer.ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()).into())
}

async fn write_entry(
    scope: &mut TxScope,
    customer: &Customer,
    kind: KasbonKind,
    amount: i64,
    transaction_id: Option<&str>,
    notes: Option<&str>,
    actor: &str,
) -> DbResult<KasbonEntry> {
    let balance_after = match kind {
        KasbonKind::Debt => customer.current_debt + amount,
        KasbonKind::Payment => customer.current_debt - amount,
    };
    let now = Utc::now();

    let entry = KasbonEntry {
        id: Uuid::new_v4().to_string(),
        customer_id: customer.id.clone(),
        transaction_id: transaction_id.map(str::to_string),
        kind,
        amount,
        balance_before: customer.current_debt,
        balance_after,
        notes: notes.map(str::to_string),
        created_by: Some(actor.to_string()),
        created_at: now,
    };
    debug!(customer_id = %entry.customer_id, ?kind, amount, balance_after, "Writing kasbon entry");

    scope
        .execute(
            sqlx::query(
                r#"
                INSERT INTO kasbon_records (
                    id, customer_id, transaction_id, kind, amount,
                    balance_before, balance_after, notes, created_by, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.customer_id)
            .bind(&entry.transaction_id)
            .bind(entry.kind)
            .bind(entry.amount)
            .bind(entry.balance_before)
            .bind(entry.balance_after)
            .bind(&entry.notes)
            .bind(&entry.created_by)
            .bind(now),
        )
        .await?;

    scope
        .execute(
            sqlx::query("UPDATE customers SET current_debt = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(&customer.id)
                .bind(balance_after)
                .bind(now),
        )
        .await?;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use warung_core::input::NewCustomer;

    async fn setup(limit: i64) -> (Database, Customer) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer = db
            .customers()
            .create(&NewCustomer {
                name: "Pak Budi".into(),
                phone: None,
                credit_limit: limit,
            })
            .await
            .unwrap();
        (db, customer)
    }

    async fn debt(db: &Database, customer_id: &str, amount: i64) -> DbResult<KasbonEntry> {
        let mut scope = db.begin(ScopeMode::Write).await?;
        let entry = db
            .kasbon()
            .record_debt(&mut scope, customer_id, amount, None, None, "kasir")
            .await?;
        scope.commit().await?;
        Ok(entry)
    }

    #[tokio::test]
    async fn test_debt_respects_limit() {
        let (db, customer) = setup(500_000).await;

        let entry = debt(&db, &customer.id, 400_000).await.unwrap();
        assert_eq!((entry.balance_before, entry.balance_after), (0, 400_000));

        let err = debt(&db, &customer.id, 150_000).await.unwrap_err();
        assert_eq!(err.code(), "credit_limit_exceeded");

        debt(&db, &customer.id, 100_000).await.unwrap();
        assert_eq!(db.customers().get(&customer.id).await.unwrap().current_debt, 500_000);
    }

    #[tokio::test]
    async fn test_payment_is_clamped_to_debt() {
        let (db, customer) = setup(0).await;
        debt(&db, &customer.id, 75_000).await.unwrap();

        let entry = db
            .kasbon()
            .record_payment(
                &KasbonPaymentInput {
                    customer_id: customer.id.clone(),
                    amount: 100_000,
                    notes: None,
                },
                "kasir",
            )
            .await
            .unwrap();
        assert_eq!(entry.amount, 75_000);
        assert_eq!(entry.balance_after, 0);

        let err = db
            .kasbon()
            .record_payment(
                &KasbonPaymentInput {
                    customer_id: customer.id.clone(),
                    amount: 1_000,
                    notes: None,
                },
                "kasir",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_debt");
    }

    #[tokio::test]
    async fn test_summary_and_report() {
        let (db, customer) = setup(200_000).await;
        debt(&db, &customer.id, 120_000).await.unwrap();
        db.kasbon()
            .record_payment(
                &KasbonPaymentInput {
                    customer_id: customer.id.clone(),
                    amount: 20_000,
                    notes: Some("cicilan".into()),
                },
                "kasir",
            )
            .await
            .unwrap();

        let summary = db.kasbon().summary(&customer.id).await.unwrap();
        assert_eq!(summary.total_debt, 120_000);
        assert_eq!(summary.total_payment, 20_000);
        assert_eq!(summary.current_balance, 100_000);
        assert_eq!(summary.remaining_credit, 100_000);
        assert!(summary.last_transaction_at.is_some());

        let report = db.kasbon().report().await.unwrap();
        assert_eq!(report.total_customers, 1);
        assert_eq!(report.customers_with_debt, 1);
        assert_eq!(report.total_outstanding, 100_000);
        assert_eq!(report.top_debtors[0].customer_id, customer.id);

        let history = db.kasbon().history(&customer.id, &KasbonFilter::default()).await.unwrap();
        assert_eq!(history.total, 2);
        assert_eq!(history.items[0].kind, KasbonKind::Payment);
    }
}
