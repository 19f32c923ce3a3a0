//! # Request Context
//!
//! Everything an engine call needs to know about the request that made it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Transport handler                                                      │
//! │     │                                                                   │
//! │     │  RequestContext::new("kasir-1")                                   │
//! │     │    request_id  = uuid v4                                          │
//! │     │    actor       = "kasir-1"   → created_by / cashier on writes     │
//! │     │    token       = CancellationToken (client gone → cancel())       │
//! │     │    span        = request{request_id, actor}                       │
//! │     ▼                                                                   │
//! │  engine.checkout(&ctx, &input)                                          │
//! │     every log line inside carries request_id and actor                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The context is passed explicitly; there is no global request state.

use tokio_util::sync::CancellationToken;
use tracing::{info_span, Span};
use uuid::Uuid;

/// Per-request identity, cancellation and logging span.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    actor: String,
    token: CancellationToken,
    span: Span,
}

impl RequestContext {
    /// New context with a fresh request id and its own token.
    pub fn new(actor: impl Into<String>) -> Self {
        Self::with_token(actor, CancellationToken::new())
    }

    /// New context bound to an existing token, e.g. a child of the
    /// server's shutdown token.
    pub fn with_token(actor: impl Into<String>, token: CancellationToken) -> Self {
        let request_id = Uuid::new_v4();
        let actor = actor.into();
        let span = info_span!("request", %request_id, actor = %actor);
        RequestContext {
            request_id,
            actor,
            token,
            span,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Who is acting; written to `created_by` columns.
    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Cancels the request. Work that has not committed is rolled back.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_token_follows_parent() {
        let shutdown = CancellationToken::new();
        let ctx = RequestContext::with_token("kasir-1", shutdown.child_token());
        assert!(!ctx.is_cancelled());

        shutdown.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.actor(), "kasir-1");
    }

    #[test]
    fn test_each_request_gets_its_own_id() {
        let a = RequestContext::new("kasir-1");
        let b = RequestContext::new("kasir-1");
        assert_ne!(a.request_id(), b.request_id());
    }
}
