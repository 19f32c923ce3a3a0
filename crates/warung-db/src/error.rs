//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Ledger rule (CoreError)            │
//! │       │                                     │                           │
//! │       ▼                                     ▼                           │
//! │  DbError::{NotFound, UniqueViolation, ...}  DbError::Domain             │
//! │       │                                                                 │
//! │       │  uq_drawer_single_open violation ─► Domain(SessionAlreadyOpen)  │
//! │       ▼                                                                 │
//! │  EngineError (warung-engine) ← unwraps Domain back to CoreError        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError { code, message, status }                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use warung_core::{CoreError, ErrorKind, ValidationError};

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// A business rule failed inside a scope (insufficient stock, credit limit...).
    ///
    /// Raised by repositories so the enclosing scope can be rolled back
    /// with the domain error intact.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate barcode
    /// - Duplicate invoice number
    /// - Any UNIQUE index violation other than the open-drawer index
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Begin, commit or rollback failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Error kind used by transport mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Domain(err) => err.kind(),
            DbError::NotFound { .. } => ErrorKind::NotFound,
            DbError::UniqueViolation { .. } => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DbError::Domain(err) => err.code(),
            DbError::NotFound { .. } => "not_found",
            DbError::UniqueViolation { .. } => "conflict",
            _ => "internal",
        }
    }

    /// Returns the domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

/// Index name whose violation means a second drawer session was opened.
const SINGLE_OPEN_DRAWER: &str = "cash_drawer_sessions.status";

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    if field.contains(SINGLE_OPEN_DRAWER) {
                        return DbError::Domain(CoreError::SessionAlreadyOpen);
                    }
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
