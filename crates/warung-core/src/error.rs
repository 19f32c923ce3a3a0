//! # Error Types
//!
//! Domain-specific error types for warung-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  warung-core errors (this file)                                        │
//! │  ├── ErrorKind        - Closed taxonomy consulted by transport mapping │
//! │  ├── CoreError        - Domain rule violations (one code each)         │
//! │  └── ValidationError  - Field-level input failures                     │
//! │                                                                         │
//! │  warung-db errors (separate crate)                                     │
//! │  └── DbError          - Persistence failures + Domain(CoreError)       │
//! │                                                                         │
//! │  warung-engine errors                                                  │
//! │  ├── EngineError      - Domain | Db | Cancelled | DeadlineExceeded     │
//! │  └── ApiError         - What a client sees (code, message, status)     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → EngineError → ApiError  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product, customer, session)
//! 3. Errors are enum variants, never String
//! 4. Every variant carries a stable snake_case `code()` and a `kind()`

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse error taxonomy.
///
/// Transport layers map a kind to a status code. They never inspect the
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, empty cart, unrecognized enum value.
    Validation,
    /// Entity lookup miss.
    NotFound,
    /// State conflict (drawer already open, already cancelled, ...).
    Conflict,
    /// Not enough stock, containers, or credit.
    ResourceExhausted,
    /// Payment amount does not settle the total.
    Payment,
    /// Product or customer flagged inactive.
    Inactive,
    /// Persistence failure, sequence allocation failure, panic.
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name, as used in logs and API bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::Payment => "payment",
            ErrorKind::Inactive => "inactive",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. Ledger code raises them
/// inside an atomic scope, which is then rolled back by the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Checkout or preview called without lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but was soft-deleted.
    #[error("Product {name} is inactive")]
    ProductInactive { name: String },

    /// Insufficient stock to complete sale.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 15)
    ///      │
    ///      ▼
    /// Lock product row: current_stock = 10
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Gula 1kg", available: 10, requested: 15 }
    ///      │
    ///      ▼
    /// Scope rolled back, stock untouched
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Customer cannot be found.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Customer exists but was deactivated.
    #[error("Customer {name} is inactive")]
    CustomerInactive { name: String },

    /// Credit sale would push the customer over their limit.
    #[error(
        "Credit limit exceeded for {customer}: debt {current_debt} + {requested} > limit {credit_limit}"
    )]
    CreditLimitExceeded {
        customer: String,
        current_debt: i64,
        credit_limit: i64,
        requested: i64,
    },

    /// Payment recorded against a customer who owes nothing.
    #[error("Customer {customer} has no outstanding debt")]
    NoDebt { customer: String },

    /// Payment amount is invalid.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Payment method is recognized but has no checkout path.
    #[error("Payment method {0} is not supported")]
    UnsupportedPaymentMethod(String),

    /// Transaction cannot be found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Cancel called on a transaction that is already cancelled.
    #[error("Transaction {0} is already cancelled")]
    AlreadyCancelled(String),

    /// Transaction is not in a state that allows the requested operation.
    #[error("Transaction {id} is {status}, cannot perform operation")]
    InvalidTransactionStatus { id: String, status: String },

    /// Refillable container cannot be found.
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// A container movement would drive a count below zero.
    #[error("Not enough {side} containers in {container}: available {available}, requested {requested}")]
    InsufficientContainers {
        container: String,
        side: String,
        available: i64,
        requested: i64,
    },

    /// A drawer session is already open.
    #[error("A cash drawer session is already open")]
    SessionAlreadyOpen,

    /// Drawer session cannot be found.
    #[error("Cash drawer session not found: {0}")]
    SessionNotFound(String),

    /// Drawer session exists but is already closed.
    #[error("Cash drawer session {0} is not open")]
    SessionNotOpen(String),

    /// Stock opname session cannot be found.
    #[error("Stock opname session not found: {0}")]
    OpnameNotFound(String),

    /// Stock opname session is not accepting counts or finalisation.
    #[error("Stock opname session {id} is {status}, not in progress")]
    SessionNotInProgress { id: String, status: String },

    /// Stock opname session can no longer be cancelled.
    #[error("Stock opname session {id} is {status} and cannot be cancelled")]
    OpnameNotCancellable { id: String, status: String },

    /// Transaction still carries completed refunds and cannot be cancelled.
    #[error("Transaction {0} has completed refunds")]
    TransactionHasRefunds(String),

    /// Held cart cannot be found.
    #[error("Held cart not found: {0}")]
    HeldCartNotFound(String),

    /// Held cart was already resumed or discarded.
    #[error("Cart {code} is {status}, not held")]
    CartNotHeld { code: String, status: String },

    /// Refund cannot be found.
    #[error("Refund not found: {0}")]
    RefundNotFound(String),

    /// Refund was already completed or rejected.
    #[error("Refund {number} is {status}, not pending")]
    RefundNotPending { number: String, status: String },

    /// A refund line names an item the sale does not have.
    #[error("Item {item} does not belong to transaction {transaction}")]
    RefundItemNotInTransaction { item: String, transaction: String },

    /// A refund line asks for more than is still refundable.
    ///
    /// `refundable` is the sold quantity minus what earlier pending or
    /// completed refunds already claim.
    #[error("Cannot refund {requested} of {product}: only {refundable} refundable")]
    RefundQuantityExceeded {
        product: String,
        refundable: i64,
        requested: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::EmptyCart
            | CoreError::CartTooLarge { .. }
            | CoreError::NoDebt { .. }
            | CoreError::UnsupportedPaymentMethod(_)
            | CoreError::RefundItemNotInTransaction { .. }
            | CoreError::RefundQuantityExceeded { .. }
            | CoreError::Validation(_) => ErrorKind::Validation,

            CoreError::ProductNotFound(_)
            | CoreError::CustomerNotFound(_)
            | CoreError::TransactionNotFound(_)
            | CoreError::ContainerNotFound(_)
            | CoreError::OpnameNotFound(_)
            | CoreError::HeldCartNotFound(_)
            | CoreError::RefundNotFound(_) => ErrorKind::NotFound,

            // Drawer close answers a missing session like a closed one (400).
            CoreError::SessionNotFound(_)
            | CoreError::AlreadyCancelled(_)
            | CoreError::InvalidTransactionStatus { .. }
            | CoreError::SessionAlreadyOpen
            | CoreError::SessionNotOpen(_)
            | CoreError::SessionNotInProgress { .. }
            | CoreError::OpnameNotCancellable { .. }
            | CoreError::TransactionHasRefunds(_)
            | CoreError::CartNotHeld { .. }
            | CoreError::RefundNotPending { .. } => ErrorKind::Conflict,

            CoreError::InsufficientStock { .. }
            | CoreError::CreditLimitExceeded { .. }
            | CoreError::InsufficientContainers { .. } => ErrorKind::ResourceExhausted,

            CoreError::InvalidPaymentAmount { .. } => ErrorKind::Payment,

            CoreError::ProductInactive { .. } | CoreError::CustomerInactive { .. } => {
                ErrorKind::Inactive
            }
        }
    }

    /// Returns the stable machine-readable code of this error.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::EmptyCart => "empty_cart",
            CoreError::CartTooLarge { .. } => "cart_too_large",
            CoreError::ProductNotFound(_) => "product_not_found",
            CoreError::ProductInactive { .. } => "product_inactive",
            CoreError::InsufficientStock { .. } => "insufficient_stock",
            CoreError::CustomerNotFound(_) => "customer_not_found",
            CoreError::CustomerInactive { .. } => "customer_inactive",
            CoreError::CreditLimitExceeded { .. } => "credit_limit_exceeded",
            CoreError::NoDebt { .. } => "no_debt",
            CoreError::InvalidPaymentAmount { .. } => "invalid_payment_amount",
            CoreError::UnsupportedPaymentMethod(_) => "unsupported_payment_method",
            CoreError::TransactionNotFound(_) => "not_found",
            CoreError::AlreadyCancelled(_) => "already_cancelled",
            CoreError::InvalidTransactionStatus { .. } => "invalid_transaction_status",
            CoreError::ContainerNotFound(_) => "container_not_found",
            CoreError::InsufficientContainers { .. } => "insufficient_containers",
            CoreError::SessionAlreadyOpen => "session_already_open",
            CoreError::SessionNotFound(_) => "session_not_found",
            CoreError::SessionNotOpen(_) => "session_not_open",
            CoreError::OpnameNotFound(_) => "opname_not_found",
            CoreError::SessionNotInProgress { .. } => "session_not_in_progress",
            CoreError::OpnameNotCancellable { .. } => "opname_not_cancellable",
            CoreError::TransactionHasRefunds(_) => "transaction_has_refunds",
            CoreError::HeldCartNotFound(_) => "held_cart_not_found",
            CoreError::CartNotHeld { .. } => "cart_not_held",
            CoreError::RefundNotFound(_) => "refund_not_found",
            CoreError::RefundNotPending { .. } => "refund_not_pending",
            CoreError::RefundItemNotInTransaction { .. } => "refund_item_not_in_transaction",
            CoreError::RefundQuantityExceeded { .. } => "refund_quantity_exceeded",
            CoreError::Validation(_) => "validation",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before any scope is opened.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
