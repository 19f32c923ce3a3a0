//! # Engine
//!
//! The handle a transport holds. It owns the database and the configuration
//! and runs every operation under the request's deadline and token.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  validate input (no scope yet)                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌───────────────── guard ─────────────────────────────┐                │
//! │  │  select! (biased)                                    │                │
//! │  │   ├── token.cancelled()        → Cancelled           │                │
//! │  │   └── timeout(deadline, work)  → DeadlineExceeded    │                │
//! │  │         │                                            │                │
//! │  │         ▼                                            │                │
//! │  │      begin scope → locks → ledger writes            │                │
//! │  │      (losing the race drops the scope = rollback)    │                │
//! │  └──────────────────────┬───────────────────────────────┘                │
//! │                         ▼                                               │
//! │                    scope.commit()   ◄── never raced                     │
//! │                         │                                               │
//! │                         ▼                                               │
//! │                 re-read and return                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;

use tracing::{error, warn, Instrument};
use warung_db::{Database, TxScope};

use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use warung_core::ErrorKind;

/// Transaction engine.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) db: Database,
    pub(crate) config: EngineConfig,
}

impl Engine {
    /// Wraps an already connected database.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Engine { db, config }
    }

    /// Connects to the configured database and applies migrations.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(Engine { db, config })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Closes the pool, waiting at most the configured shutdown timeout.
    pub async fn shutdown(&self) {
        if tokio::time::timeout(self.config.shutdown_timeout, self.db.close())
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.config.shutdown_timeout,
                "Database did not close before the shutdown deadline"
            );
        }
    }

    /// Runs `work` against the request's token and deadline.
    ///
    /// Dropping `work` drops any scope it holds, which rolls it back.
    /// Internal failures are logged here, once, inside the request span.
    pub(crate) async fn guard<T, F>(&self, ctx: &RequestContext, op: &'static str, work: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        let deadline = self.config.request_timeout;

        let outcome = async {
            tokio::select! {
                biased;
                _ = ctx.token().cancelled() => Err(EngineError::Cancelled),
                result = tokio::time::timeout(deadline, work) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(EngineError::DeadlineExceeded(deadline)),
                },
            }
        }
        .instrument(ctx.span().clone())
        .await;

        if let Err(err) = &outcome {
            let _entered = ctx.span().enter();
            match err {
                EngineError::Cancelled | EngineError::DeadlineExceeded(_) => {
                    warn!(op, code = err.code(), "Request abandoned before commit")
                }
                _ if err.kind() == ErrorKind::Internal => error!(op, error = %err, "Request failed"),
                _ => {}
            }
        }
        outcome
    }

    /// Commits a scope that survived the guard.
    pub(crate) async fn commit(&self, ctx: &RequestContext, scope: TxScope) -> EngineResult<()> {
        scope.commit().instrument(ctx.span().clone()).await.map_err(|err| {
            let _entered = ctx.span().enter();
            error!(error = %err, "Commit failed");
            EngineError::from(err)
        })
    }
}

/// Hands the scope back on success, rolls it back on failure.
pub(crate) async fn keep_or_abandon<T>(scope: TxScope, result: EngineResult<T>) -> EngineResult<(TxScope, T)> {
    match result {
        Ok(value) => Ok((scope, value)),
        Err(err) => {
            scope.abandon().await;
            Err(err)
        }
    }
}
