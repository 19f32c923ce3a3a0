//! # Database Migrations
//!
//! Embedded SQL migrations for the warung schema.
//!
//! ## Migration Set
//! ```text
//! migrations/sqlite/
//! ├── 001_catalog.sql        products, pricing_tiers, customers
//! ├── 002_ledgers.sql        stock_movements, containers, kasbon_records
//! ├── 003_transactions.sql   transactions, transaction_items, sequences
//! ├── 004_cash_drawer.sql    categories, drawer sessions (+ single-open index)
//! ├── 005_stock_opname.sql   opname sessions and items
//! └── 006_held_carts_refunds.sql  parked carts, refund requests
//! ```
//!
//! Applied in version order and recorded in `_sqlx_migrations`.
//! Never edit an applied migration; add a new file instead.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the workspace `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(
        available = MIGRATOR.migrations.len(),
        "Checking for pending migrations"
    );

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((total, applied as usize))
}
