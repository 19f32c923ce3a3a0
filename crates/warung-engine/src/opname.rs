//! Stock opname: physical counts reconciled against system stock.
//!
//! ```text
//! start ──► in_progress ──record_count*──► finalize(apply?) ──► completed
//!               │
//!               └──► cancel ──► cancelled
//! ```

use tracing::info;
use warung_core::input::{OpnameFilter, RecordCountInput};
use warung_core::{OpnameItem, OpnameSession, Page, VarianceReport};

use crate::context::RequestContext;
use crate::engine::Engine;
use crate::error::EngineResult;

impl Engine {
    pub async fn start_opname(&self, ctx: &RequestContext, notes: Option<&str>) -> EngineResult<OpnameSession> {
        let session = write_scope!(self, ctx, "start_opname", |scope| {
            self.db.opname().start_in(&mut scope, notes, ctx.actor()).await
        });

        let _entered = ctx.span().enter();
        info!(id = %session.id, code = %session.session_code, "Stock opname started");
        Ok(session)
    }

    /// Records or overwrites the physical count of one product.
    pub async fn record_count(&self, ctx: &RequestContext, input: &RecordCountInput) -> EngineResult<OpnameItem> {
        let item = write_scope!(self, ctx, "record_count", |scope| {
            self.db.opname().record_count_in(&mut scope, input, ctx.actor()).await
        });
        Ok(item)
    }

    /// Closes the session. With `apply_adjustments`, every counted product
    /// is set to its physical count in the same scope.
    pub async fn finalize_opname(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        apply_adjustments: bool,
    ) -> EngineResult<VarianceReport> {
        let report = write_scope!(self, ctx, "finalize_opname", |scope| {
            self.db
                .opname()
                .finalize_in(&mut scope, session_id, ctx.actor(), apply_adjustments)
                .await
        });

        let _entered = ctx.span().enter();
        info!(
            session = %report.session_code,
            loss = report.total_loss_value,
            gain = report.total_gain_value,
            apply_adjustments,
            "Stock opname finalized"
        );
        Ok(report)
    }

    pub async fn cancel_opname(&self, ctx: &RequestContext, session_id: &str) -> EngineResult<OpnameSession> {
        let session = write_scope!(self, ctx, "cancel_opname", |scope| {
            self.db.opname().cancel_in(&mut scope, session_id).await
        });

        let _entered = ctx.span().enter();
        info!(code = %session.session_code, "Stock opname cancelled");
        Ok(session)
    }

    pub async fn opname_session(&self, ctx: &RequestContext, session_id: &str) -> EngineResult<OpnameSession> {
        self.guard(ctx, "get_opname", async { Ok(self.db.opname().get(session_id).await?) })
            .await
    }

    pub async fn opname_sessions(&self, ctx: &RequestContext, filter: &OpnameFilter) -> EngineResult<Page<OpnameSession>> {
        self.guard(ctx, "list_opname", async { Ok(self.db.opname().list(filter).await?) })
            .await
    }

    pub async fn variance_report(&self, ctx: &RequestContext, session_id: &str) -> EngineResult<VarianceReport> {
        self.guard(ctx, "variance_report", async {
            Ok(self.db.opname().variance_report(session_id).await?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use warung_core::input::MovementFilter;
    use warung_core::{OpnameStatus, StockMovementKind};

    fn count(session: &OpnameSession, product_id: &str, physical_stock: i64) -> RecordCountInput {
        RecordCountInput {
            session_id: session.id.clone(),
            product_id: product_id.to_string(),
            physical_stock,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_finalize_applies_counted_stock() {
        let engine = engine().await;
        let beras = product(&engine, "Beras 5kg", 10_000, 100).await;
        let gula = product(&engine, "Gula Pasir 1kg", 15_000, 20).await;

        let session = engine.start_opname(&ctx(), Some("akhir bulan")).await.unwrap();
        assert_eq!(session.status, OpnameStatus::InProgress);

        let item = engine.record_count(&ctx(), &count(&session, &beras.id, 95)).await.unwrap();
        assert_eq!((item.system_stock, item.variance), (100, -5));
        assert_eq!(item.variance_value, -35_000);
        engine.record_count(&ctx(), &count(&session, &gula.id, 20)).await.unwrap();

        let report = engine.finalize_opname(&ctx(), &session.id, true).await.unwrap();
        assert_eq!(report.total_products, 2);
        assert_eq!(report.total_variance, 5);
        assert_eq!(report.total_loss_value, 35_000);
        assert_eq!(report.total_gain_value, 0);
        assert_eq!(report.net_value, -35_000);

        assert_eq!(engine.product(&ctx(), &beras.id).await.unwrap().current_stock, 95);
        let movements = engine
            .stock_movements(&ctx(), &beras.id, &MovementFilter::default())
            .await
            .unwrap();
        let adjustment = &movements.items[0];
        assert_eq!(adjustment.kind, StockMovementKind::Adjustment);
        assert_eq!((adjustment.stock_before, adjustment.stock_after), (100, 95));
        assert_eq!(adjustment.reference_id.as_deref(), Some(session.id.as_str()));

        // a matching count writes no movement
        let gula_moves = engine
            .stock_movements(&ctx(), &gula.id, &MovementFilter::default())
            .await
            .unwrap();
        assert_eq!(gula_moves.total, 1);

        let closed = engine.opname_session(&ctx(), &session.id).await.unwrap();
        assert_eq!(closed.status, OpnameStatus::Completed);
        let err = engine
            .record_count(&ctx(), &count(&session, &beras.id, 90))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "session_not_in_progress");
    }

    #[tokio::test]
    async fn test_finalize_without_adjustments_reports_only() {
        let engine = engine().await;
        let beras = product(&engine, "Beras 5kg", 10_000, 100).await;

        let session = engine.start_opname(&ctx(), None).await.unwrap();
        engine.record_count(&ctx(), &count(&session, &beras.id, 103)).await.unwrap();

        let report = engine.finalize_opname(&ctx(), &session.id, false).await.unwrap();
        assert_eq!(report.total_gain_value, 21_000);
        assert_eq!(engine.product(&ctx(), &beras.id).await.unwrap().current_stock, 100);

        let again = engine.variance_report(&ctx(), &session.id).await.unwrap();
        assert_eq!(again.total_gain_value, report.total_gain_value);
    }

    #[tokio::test]
    async fn test_cancel_opname() {
        let engine = engine().await;
        let session = engine.start_opname(&ctx(), None).await.unwrap();

        let cancelled = engine.cancel_opname(&ctx(), &session.id).await.unwrap();
        assert_eq!(cancelled.status, OpnameStatus::Cancelled);

        let err = engine.cancel_opname(&ctx(), &session.id).await.unwrap_err();
        assert_eq!(err.code(), "opname_not_cancellable");

        let listed = engine.opname_sessions(&ctx(), &OpnameFilter::default()).await.unwrap();
        assert_eq!(listed.total, 1);
    }
}
