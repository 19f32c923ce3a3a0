//! # Validation Module
//!
//! Input validation shared by every entry point of the engine.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  └── Unknown enum tags, wrong JSON types                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any scope is opened)                     │
//! │  ├── Quantities, amounts, names, ids                                   │
//! │  └── Page normalisation                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints on counters                                     │
//! │  ├── UNIQUE constraints (invoice, single open drawer)                  │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use warung_core::validation::{validate_quantity, validate_positive};
//!
//! validate_quantity(5).unwrap();
//! assert!(validate_positive("amount", 0).is_err());
//! ```

use crate::error::ValidationError;
use crate::{DEFAULT_PAGE_SIZE, MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_PAGE_SIZE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (product, customer, container type).
///
/// ## Rules
/// - Must not be blank
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates an actor name (cashier, counter, opener).
pub fn validate_actor(actor: &str) -> ValidationResult<()> {
    validate_name("actor", actor)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
///
/// ## User Workflow
/// ```text
/// Cashier scans "Gula 1kg", types 15
///       │
///       ▼
/// validate_quantity(15) ← THIS FUNCTION
///       │
///       ├── qty <= 0?      → "quantity must be positive"
///       ├── qty > 9999?    → "quantity must be between 1 and 9999"
///       └── OK             → line is priced
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount that must be strictly positive.
pub fn validate_positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an amount that may be zero but not negative.
///
/// ## Example
/// ```rust
/// use warung_core::validation::validate_non_negative;
///
/// assert!(validate_non_negative("opening_balance", 0).is_ok());
/// assert!(validate_non_negative("opening_balance", 200_000).is_ok());
/// assert!(validate_non_negative("opening_balance", -1).is_err());
/// ```
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a pricing tier band.
pub fn validate_tier_band(min_qty: i64, max_qty: Option<i64>, price: i64) -> ValidationResult<()> {
    validate_positive("min_qty", min_qty)?;
    if let Some(max) = max_qty {
        if max < min_qty {
            return Err(ValidationError::OutOfRange {
                field: "max_qty".to_string(),
                min: min_qty,
                max: i64::MAX,
            });
        }
    }
    validate_non_negative("price", price)
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in a cart.
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }
    Ok(())
}

/// Normalises a paging request to `(page, per_page, offset)`.
///
/// Missing or non-positive values fall back to page 1 and the default size;
/// `per_page` is capped at MAX_PAGE_SIZE.
pub fn normalize_page(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let per_page = per_page
        .filter(|p| *p > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    (page, per_page, (page - 1) * per_page)
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ## Example
/// ```rust
/// use warung_core::validation::validate_uuid;
///
/// assert!(validate_uuid("customer_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("customer_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
