//! # Engine Error Types
//!
//! What engine operations return, and what a transport sends back.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Engine                             │
//! │                                                                         │
//! │  Input check ─── CoreError ──────────────────┐                          │
//! │                                               ▼                         │
//! │  Scope work ──── DbError::Domain(e) ───► EngineError::Domain(e)         │
//! │       │                                                                 │
//! │       └───────── DbError::<fault> ─────► EngineError::Db(fault)         │
//! │                                                                         │
//! │  Token fired ─────────────────────────► EngineError::Cancelled          │
//! │  Deadline passed ─────────────────────► EngineError::DeadlineExceeded   │
//! │                                               │                         │
//! │                                               ▼                         │
//! │                   ApiError { code, message, status }                    │
//! │                                                                         │
//! │   kind = not_found  → 404                                               │
//! │   kind = internal   → 500  (message replaced, request id attached)      │
//! │   any other kind    → 400                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transport Contract
//! Mapping looks at the variant only. Message text is never parsed.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use warung_core::{CoreError, ErrorKind, ValidationError};
use warung_db::DbError;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule failed. The scope, if any, was rolled back.
    #[error(transparent)]
    Domain(CoreError),

    /// The persistence layer failed.
    #[error(transparent)]
    Db(DbError),

    /// The request's cancellation token fired before commit.
    #[error("Request cancelled")]
    Cancelled,

    /// The request ran past its deadline before commit.
    #[error("Request exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

impl EngineError {
    /// Coarse kind used for status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Domain(err) => err.kind(),
            EngineError::Db(err) => err.kind(),
            EngineError::Cancelled | EngineError::DeadlineExceeded(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Domain(err) => err.code(),
            EngineError::Db(err) => err.code(),
            EngineError::Cancelled => "cancelled",
            EngineError::DeadlineExceeded(_) => "deadline_exceeded",
        }
    }

    /// Returns the domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            EngineError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(err) => EngineError::Domain(err),
            other => EngineError::Db(other),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        EngineError::Domain(err)
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Domain(CoreError::Validation(err))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// API Error
// =============================================================================

/// Error body a transport returns to the client.
///
/// ## Serialization
/// ```json
/// {
///   "code": "insufficient_stock",
///   "message": "Insufficient stock for Gula 1kg: available 10, requested 15",
///   "status": 400
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// Machine-readable error code
    pub code: &'static str,

    /// Human-readable message
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Set on internal errors so support can find the log line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

const INTERNAL_MESSAGE: &str = "Something went wrong, please try again";

impl ApiError {
    /// Builds the client-facing error for `err` raised by request `request_id`.
    pub fn from_engine(err: &EngineError, request_id: Uuid) -> Self {
        let kind = err.kind();
        let status = status_for(kind);

        if kind == ErrorKind::Internal {
            ApiError {
                code: err.code(),
                message: match err {
                    EngineError::Cancelled | EngineError::DeadlineExceeded(_) => err.to_string(),
                    _ => INTERNAL_MESSAGE.to_string(),
                },
                status,
                request_id: Some(request_id.to_string()),
            }
        } else {
            ApiError {
                code: err.code(),
                message: err.to_string(),
                status,
                request_id: None,
            }
        }
    }
}

/// Status code for an error kind.
pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::NotFound => 404,
        ErrorKind::Internal => 500,
        _ => 400,
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} {}] {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
