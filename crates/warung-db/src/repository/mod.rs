//! # Repository Module
//!
//! One repository per table family. Each holds a pool clone and is handed
//! out by [`Database`](crate::Database).
//!
//! ## Two Kinds of Operation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Standalone                        In-scope                             │
//! │  ─────────────────────────         ──────────────────────────────────   │
//! │  inventory.restock(&input)         inventory.deduct(&mut scope, ..)     │
//! │  kasbon.record_payment(&input)     kasbon.record_debt(&mut scope, ..)   │
//! │  drawer.open(&input)               drawer.record_in(&mut scope, ..)     │
//! │                                                                         │
//! │  opens, commits and drops its      borrows the caller's scope; the      │
//! │  own write scope                   caller decides commit or rollback    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`] - products, pricing tiers, shopping list
//! - [`CustomerRepository`] - kasbon customers
//! - [`InventoryRepository`] - stock ledger
//! - [`ContainerRepository`] - refillable empty/full ledger
//! - [`KasbonRepository`] - store credit ledger
//! - [`DrawerRepository`] - drawer sessions and cash flow
//! - [`TransactionRepository`] - sale headers and lines
//! - [`OpnameRepository`] - stock opname sessions
//! - [`HeldCartRepository`] - parked carts
//! - [`RefundRepository`] - refund requests and returned lines

pub mod customer;
pub mod drawer;
pub mod held_cart;
pub mod inventory;
pub mod kasbon;
pub mod opname;
pub mod product;
pub mod refillable;
pub mod refund;
pub mod transaction;

pub use customer::CustomerRepository;
pub use drawer::DrawerRepository;
pub use held_cart::HeldCartRepository;
pub use inventory::InventoryRepository;
pub use kasbon::KasbonRepository;
pub use opname::OpnameRepository;
pub use product::ProductRepository;
pub use refillable::ContainerRepository;
pub use refund::RefundRepository;
pub use transaction::TransactionRepository;
