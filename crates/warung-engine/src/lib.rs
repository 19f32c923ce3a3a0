//! # warung-engine: Transaction Orchestration
//!
//! The entry point a transport calls. It composes the ledgers in
//! `warung-db` into sales, cancellations and previews, and runs every
//! operation under a request context.
//!
//! ## Module Organization
//! ```text
//! warung_engine/
//! ├── lib.rs          ◄─── You are here
//! ├── engine.rs       ◄─── Engine handle, deadline/cancellation guard
//! ├── macros.rs       ◄─── write_scope! (guarded scope, unraced commit)
//! ├── checkout.rs     ◄─── checkout, cancel, calculate, mark_completed
//! ├── ledgers.rs      ◄─── inventory, containers, kasbon, drawer
//! ├── opname.rs       ◄─── stock opname sessions
//! ├── held_carts.rs   ◄─── parked carts (hold, resume, discard)
//! ├── refunds.rs      ◄─── refund requests, approval, rejection
//! ├── catalog.rs      ◄─── products, tiers, customers
//! ├── context.rs      ◄─── RequestContext (actor, request id, token, span)
//! ├── config.rs       ◄─── EngineConfig from WARUNG_* variables
//! ├── error.rs        ◄─── EngineError, ApiError, status mapping
//! └── telemetry.rs    ◄─── tracing subscriber
//! ```
//!
//! ## Example Usage
//! ```rust,ignore
//! let engine = Engine::connect(EngineConfig::load()?).await?;
//! let ctx = RequestContext::new("kasir-1");
//!
//! match engine.checkout(&ctx, &input).await {
//!     Ok(tx) => println!("{} {}", tx.invoice_number, tx.total_amount),
//!     Err(err) => {
//!         let body = ApiError::from_engine(&err, ctx.request_id());
//!         // respond with body.status and the JSON body
//!     }
//! }
//! ```

#[macro_use]
mod macros;

pub mod catalog;
pub mod checkout;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod held_carts;
pub mod ledgers;
pub mod opname;
pub mod refunds;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, EngineConfig};
pub use context::RequestContext;
pub use engine::Engine;
pub use error::{status_for, ApiError, EngineError, EngineResult};
pub use telemetry::init_tracing;
