//! # warung-db: Persistence Layer
//!
//! SQLite storage for the warung backend: pool, migrations, the atomic
//! scope every ledger write goes through, and the ledger repositories.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Checkout Data Flow                               │
//! │                                                                         │
//! │  warung-engine (checkout, cancel, opname, drawer)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     warung-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ Inventory     │    │              │   │   │
//! │  │   │ SqlitePool    │    │ Containers    │    │ 001_catalog  │   │   │
//! │  │   │ TxScope ◄─────┼────│ Kasbon        │    │ 002_ledgers  │   │   │
//! │  │   │ (scope.rs)    │    │ Drawer, ...   │    │ ...          │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`scope`] - Atomic scopes, row locks, named sequences
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Ledger and catalog repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warung_db::{Database, DbConfig, ScopeMode};
//!
//! let db = Database::new(DbConfig::new("warung.db")).await?;
//!
//! let mut scope = db.begin(ScopeMode::Write).await?;
//! let mut product = db.products().lock(&mut scope, &product_id).await?;
//! db.inventory().deduct(&mut scope, &mut product, &tx_id, 2, "Sari").await?;
//! scope.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod scope;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use scope::{LockTarget, ScopeMode, TxScope};

pub use repository::{
    ContainerRepository, CustomerRepository, DrawerRepository, HeldCartRepository, InventoryRepository,
    KasbonRepository, OpnameRepository, ProductRepository, RefundRepository, TransactionRepository,
};
