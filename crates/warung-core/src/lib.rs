//! # warung-core: Pure Business Logic for the Warung Backend
//!
//! Everything the shop counter decides without touching a disk or a socket.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Warung Backend                                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              warung-engine (orchestration)                      │   │
//! │  │    checkout, cancel, calculate, mark_completed, ledgers         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ warung-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐  │   │
//! │  │   │  types  │ │ pricing │ │  cart   │ │numbering │ │ money  │  │   │
//! │  │   │ entities│ │  tiers  │ │ totals  │ │ INV- SO- │ │  Rp    │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  warung-db (persistence)                        │   │
//! │  │        SQLite scope, migrations, ledger repositories            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities and enums (Product, Transaction, HeldCart, Refund, ...)
//! - [`input`] - Command inputs and list filters
//! - [`money`] - Money type with integer arithmetic
//! - [`pricing`] - Tiered price evaluation
//! - [`cart`] - Line pricing, totals and payment settlement
//! - [`numbering`] - Invoice, opname, hold and refund document numbers
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input rules
//!
//! ## Example Usage
//!
//! ```rust
//! use warung_core::cart::{settle_payment, CartTotals};
//! use warung_core::{PaymentMethod, TransactionStatus};
//!
//! let totals = CartTotals::compute([30_000, 135_000], 0, 0).unwrap();
//! let settlement = settle_payment(PaymentMethod::Cash, 200_000, totals.total_amount).unwrap();
//!
//! assert_eq!(settlement.change_amount, 35_000);
//! assert_eq!(settlement.status, TransactionStatus::Completed);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod input;
pub mod money;
pub mod numbering;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity on a single line.
///
/// Sacks of rice and bulk sugar are sold by the hundred, so the bound is
/// looser than a supermarket lane would use.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Page size when a list request does not specify one.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Upper bound on any requested page size.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Tier label reported when the base price applies.
pub const BASE_PRICE_LABEL: &str = "base";
