//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Engine startup                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├── reads: any connection, concurrently (WAL)                     │
//! │       └── write scopes: BEGIN IMMEDIATE, one at a time,                 │
//! │           others wait up to busy_timeout                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::customer::CustomerRepository;
use crate::repository::drawer::DrawerRepository;
use crate::repository::held_cart::HeldCartRepository;
use crate::repository::inventory::InventoryRepository;
use crate::repository::kasbon::KasbonRepository;
use crate::repository::opname::OpnameRepository;
use crate::repository::product::ProductRepository;
use crate::repository::refillable::ContainerRepository;
use crate::repository::refund::RefundRepository;
use crate::repository::transaction::TransactionRepository;
use crate::scope::{ScopeMode, TxScope};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/warung/warung.db")
///     .max_connections(5)
///     .busy_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Pool acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// How long a write scope waits for another writer to finish.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// Every call yields an isolated database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing scopes and repository access.
///
/// Cheap to clone; all clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled
    ///    - busy_timeout so competing write scopes queue instead of failing
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens an atomic scope.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut scope = db.begin(ScopeMode::Write).await?;
    /// let seq = scope.next_sequence("invoice:20250114").await?;
    /// scope.commit().await?;
    /// ```
    pub async fn begin(&self, mode: ScopeMode) -> DbResult<TxScope> {
        TxScope::begin(&self.pool, mode).await
    }

    /// Products and pricing tiers.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Customers.
    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    /// Stock ledger (C2).
    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone())
    }

    /// Refillable container ledger (C3).
    pub fn containers(&self) -> ContainerRepository {
        ContainerRepository::new(self.pool.clone())
    }

    /// Kasbon ledger (C4).
    pub fn kasbon(&self) -> KasbonRepository {
        KasbonRepository::new(self.pool.clone())
    }

    /// Drawer sessions and cash flow (C5).
    pub fn drawer(&self) -> DrawerRepository {
        DrawerRepository::new(self.pool.clone())
    }

    /// Sale headers and lines.
    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.pool.clone())
    }

    /// Stock opname sessions (C8).
    pub fn opname(&self) -> OpnameRepository {
        OpnameRepository::new(self.pool.clone())
    }

    /// Parked carts.
    pub fn held_carts(&self) -> HeldCartRepository {
        HeldCartRepository::new(self.pool.clone())
    }

    /// Refund requests.
    pub fn refunds(&self) -> RefundRepository {
        RefundRepository::new(self.pool.clone())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
