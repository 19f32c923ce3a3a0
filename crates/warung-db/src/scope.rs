//! # Transactional Scope
//!
//! The persistence adapter every ledger write goes through.
//!
//! ## Scope Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        TxScope lifecycle                                │
//! │                                                                         │
//! │  db.begin(ScopeMode::Write)     ── BEGIN IMMEDIATE (write lock taken)   │
//! │       │                                                                 │
//! │       ├── select_for_update(Product, id)                                │
//! │       ├── execute(UPDATE ... / INSERT ...)                              │
//! │       ├── next_sequence("invoice:20250114")                             │
//! │       │                                                                 │
//! │       ├──► commit(self)    consumes the scope, changes land             │
//! │       ├──► rollback(self)  consumes the scope, nothing lands            │
//! │       └──► drop            rolls back                                   │
//! │                                                                         │
//! │  Repositories borrow `&mut TxScope`; they can never keep it.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Row Locks on SQLite
//! SQLite has no `SELECT ... FOR UPDATE`. A write scope starts with
//! `BEGIN IMMEDIATE`, which takes the database write lock up front; every
//! read inside the scope is therefore stable until commit, which is at least
//! as strong as locking the individual rows. `select_for_update` keeps the
//! row-lock vocabulary at call sites.
//!
//! ## Single-connection pools
//! In-memory test databases run on one connection. While a scope is held,
//! every read must go through the scope, never through the pool.

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// How a scope is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Deferred transaction for consistent multi-statement reads.
    Read,
    /// `BEGIN IMMEDIATE`: the write lock is held for the whole scope.
    Write,
}

/// Rows that can be read under lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTarget {
    Product,
    Customer,
    Container,
    DrawerSession,
    OpnameSession,
    Transaction,
    HeldCart,
    Refund,
}

impl LockTarget {
    pub fn table(&self) -> &'static str {
        match self {
            LockTarget::Product => "products",
            LockTarget::Customer => "customers",
            LockTarget::Container => "refillable_containers",
            LockTarget::DrawerSession => "cash_drawer_sessions",
            LockTarget::OpnameSession => "stock_opname_sessions",
            LockTarget::Transaction => "transactions",
            LockTarget::HeldCart => "held_carts",
            LockTarget::Refund => "refund_records",
        }
    }
}

/// A statement ready to run inside a scope.
pub type ScopedQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// An open atomic scope.
///
/// Consumed by [`TxScope::commit`] and [`TxScope::rollback`], so it cannot be
/// used after either. Dropping it without committing rolls back.
pub struct TxScope {
    tx: Transaction<'static, Sqlite>,
    mode: ScopeMode,
    id: Uuid,
}

impl std::fmt::Debug for TxScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxScope")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish()
    }
}

impl TxScope {
    /// Opens a scope on a pooled connection.
    pub async fn begin(pool: &SqlitePool, mode: ScopeMode) -> DbResult<Self> {
        let tx = match mode {
            ScopeMode::Write => pool.begin_with("BEGIN IMMEDIATE").await,
            ScopeMode::Read => pool.begin().await,
        }
        .map_err(|e| match e {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            other => DbError::TransactionFailed(other.to_string()),
        })?;

        let id = Uuid::new_v4();
        debug!(scope = %id, ?mode, "Scope opened");
        Ok(TxScope { tx, mode, id })
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    /// Identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The scope's connection, for repository queries.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Makes every change of the scope durable.
    pub async fn commit(self) -> DbResult<()> {
        let id = self.id;
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!(scope = %id, "Scope committed");
        Ok(())
    }

    /// Discards every change of the scope.
    pub async fn rollback(self) -> DbResult<()> {
        let id = self.id;
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!(scope = %id, "Scope rolled back");
        Ok(())
    }

    /// Rolls back, logging instead of returning a rollback failure.
    ///
    /// Used on error paths where the original error is what the caller needs.
    pub async fn abandon(self) {
        let id = self.id;
        if let Err(e) = self.tx.rollback().await {
            warn!(scope = %id, error = %e, "Rollback failed, connection will be discarded");
        }
    }

    /// Reads one row by id under the scope's lock.
    pub async fn select_for_update<T>(&mut self, target: LockTarget, id: &str) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        if self.mode != ScopeMode::Write {
            return Err(DbError::Internal(format!(
                "select_for_update on {} requires a write scope",
                target.table()
            )));
        }

        let sql = format!("SELECT * FROM {} WHERE id = ?", target.table());
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    /// Runs a statement and returns the number of affected rows.
    pub async fn execute(&mut self, query: ScopedQuery<'_>) -> DbResult<u64> {
        let result = query.execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    /// Allocates the next value of a named counter.
    ///
    /// The counter row is written inside this scope, so a rollback leaves a
    /// gap at worst and two committed scopes can never get the same value.
    pub async fn next_sequence(&mut self, name: &str) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (name, value) VALUES (?1, 1)
            ON CONFLICT(name) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&mut *self.tx)
        .await?;

        debug!(scope = %self.id, sequence = %name, value, "Sequence allocated");
        Ok(value)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_sequence_is_monotonic_per_name() {
        let db = db().await;
        let mut scope = db.begin(ScopeMode::Write).await.unwrap();

        assert_eq!(scope.next_sequence("invoice:20250114").await.unwrap(), 1);
        assert_eq!(scope.next_sequence("invoice:20250114").await.unwrap(), 2);
        assert_eq!(scope.next_sequence("invoice:20250115").await.unwrap(), 1);
        scope.commit().await.unwrap();

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        assert_eq!(scope.next_sequence("invoice:20250114").await.unwrap(), 3);
        scope.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_discards_sequence_value() {
        let db = db().await;

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        assert_eq!(scope.next_sequence("opname:20250114").await.unwrap(), 1);
        scope.rollback().await.unwrap();

        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        assert_eq!(scope.next_sequence("opname:20250114").await.unwrap(), 1);
        scope.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let db = db().await;
        {
            let mut scope = db.begin(ScopeMode::Write).await.unwrap();
            scope
                .execute(sqlx::query("INSERT INTO sequences (name, value) VALUES ('x', 7)"))
                .await
                .unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sequences")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_select_for_update_requires_write_scope() {
        let db = db().await;
        let mut scope = db.begin(ScopeMode::Read).await.unwrap();
        let result = scope
            .select_for_update::<warung_core::Product>(LockTarget::Product, "missing")
            .await;
        assert!(matches!(result, Err(DbError::Internal(_))));
    }
}
