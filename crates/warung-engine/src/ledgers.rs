//! # Ledger Operations
//!
//! Stand-alone ledger writes and reads, each run under the request's
//! deadline and token. Every write runs in an engine-owned scope through the
//! repositories' in-scope variants and commits after the guard has let go,
//! the same way checkout does.
//!
//! | Ledger     | Writes                                   | Reads                          |
//! |------------|------------------------------------------|--------------------------------|
//! | inventory  | restock, adjust                          | movements, stock report        |
//! | containers | create, restock, adjust, record          | get, list, movements           |
//! | kasbon     | pay                                      | history, summary, report       |
//! | drawer     | open, close, record cash flow            | current, categories, flows     |

use tracing::info;
use warung_core::input::{
    AdjustStockInput, CashFlowFilter, CloseDrawerInput, ContainerMovementInput, KasbonFilter, KasbonPaymentInput,
    MovementFilter, NewCashFlow, NewContainer, OpenDrawerInput, RestockInput,
};
use warung_core::{
    CashFlowCategory, CashFlowRecord, ContainerMovement, DrawerClosing, DrawerSession, KasbonEntry, KasbonReport,
    KasbonSummary, Page, RefillableContainer, StockMovement, StockReport,
};
use warung_db::repository::drawer::log_closing;

use crate::context::RequestContext;
use crate::engine::Engine;
use crate::error::EngineResult;

impl Engine {
    // =========================================================================
    // Inventory
    // =========================================================================

    /// Adds purchased stock.
    pub async fn restock(&self, ctx: &RequestContext, input: &RestockInput) -> EngineResult<StockMovement> {
        let movement = write_scope!(self, ctx, "restock", |scope| {
            self.db.inventory().restock_in(&mut scope, input, ctx.actor()).await
        });

        let _entered = ctx.span().enter();
        info!(product_id = %movement.product_id, quantity = movement.quantity, stock = movement.stock_after, "Restocked");
        Ok(movement)
    }

    /// Manual stock adjustment (correction, damage, shrinkage).
    pub async fn adjust_stock(&self, ctx: &RequestContext, input: &AdjustStockInput) -> EngineResult<StockMovement> {
        let movement = write_scope!(self, ctx, "adjust_stock", |scope| {
            self.db.inventory().adjust_in(&mut scope, input, ctx.actor()).await
        });

        let _entered = ctx.span().enter();
        info!(
            product_id = %movement.product_id,
            requested = input.quantity,
            applied = movement.quantity,
            stock = movement.stock_after,
            "Stock adjusted"
        );
        Ok(movement)
    }

    pub async fn stock_movements(
        &self,
        ctx: &RequestContext,
        product_id: &str,
        filter: &MovementFilter,
    ) -> EngineResult<Page<StockMovement>> {
        self.guard(ctx, "stock_movements", async {
            Ok(self.db.inventory().movements(product_id, filter).await?)
        })
        .await
    }

    pub async fn stock_report(&self, ctx: &RequestContext) -> EngineResult<StockReport> {
        self.guard(ctx, "stock_report", async { Ok(self.db.inventory().stock_report().await?) })
            .await
    }

    // =========================================================================
    // Refillable Containers
    // =========================================================================

    pub async fn create_container(&self, ctx: &RequestContext, input: &NewContainer) -> EngineResult<RefillableContainer> {
        let container = write_scope!(self, ctx, "create_container", |scope| {
            self.db.containers().create_in(&mut scope, input).await
        });
        Ok(container)
    }

    pub async fn container(&self, ctx: &RequestContext, container_id: &str) -> EngineResult<RefillableContainer> {
        self.guard(ctx, "get_container", async {
            Ok(self.db.containers().get(container_id).await?)
        })
        .await
    }

    pub async fn containers(&self, ctx: &RequestContext) -> EngineResult<Vec<RefillableContainer>> {
        self.guard(ctx, "list_containers", async { Ok(self.db.containers().list().await?) })
            .await
    }

    /// Supplier swap: `qty` empties out, `qty` fulls in.
    pub async fn restock_container(
        &self,
        ctx: &RequestContext,
        container_id: &str,
        qty: i64,
        notes: Option<&str>,
    ) -> EngineResult<ContainerMovement> {
        let movement = write_scope!(self, ctx, "restock_container", |scope| {
            self.db
                .containers()
                .on_restock(&mut scope, container_id, qty, notes, ctx.actor())
                .await
        });
        Ok(movement)
    }

    pub async fn adjust_container(
        &self,
        ctx: &RequestContext,
        container_id: &str,
        empty_change: i64,
        full_change: i64,
        notes: Option<&str>,
    ) -> EngineResult<ContainerMovement> {
        let movement = write_scope!(self, ctx, "adjust_container", |scope| {
            self.db
                .containers()
                .adjust_in(&mut scope, container_id, empty_change, full_change, notes, ctx.actor())
                .await
        });
        Ok(movement)
    }

    /// Purchases and returns of bare containers.
    pub async fn record_container_movement(
        &self,
        ctx: &RequestContext,
        input: &ContainerMovementInput,
    ) -> EngineResult<ContainerMovement> {
        let movement = write_scope!(self, ctx, "record_container_movement", |scope| {
            self.db.containers().record_in(&mut scope, input, ctx.actor()).await
        });
        Ok(movement)
    }

    pub async fn container_movements(
        &self,
        ctx: &RequestContext,
        container_id: &str,
        page: Option<i64>,
        per_page: Option<i64>,
    ) -> EngineResult<Page<ContainerMovement>> {
        self.guard(ctx, "container_movements", async {
            Ok(self.db.containers().movements(container_id, page, per_page).await?)
        })
        .await
    }

    // =========================================================================
    // Kasbon
    // =========================================================================

    /// Records a repayment, clamped to what the customer owes.
    pub async fn pay_kasbon(&self, ctx: &RequestContext, input: &KasbonPaymentInput) -> EngineResult<KasbonEntry> {
        let entry = write_scope!(self, ctx, "pay_kasbon", |scope| {
            self.db.kasbon().record_payment_in(&mut scope, input, ctx.actor()).await
        });

        let _entered = ctx.span().enter();
        info!(
            customer_id = %entry.customer_id,
            paid = entry.amount,
            balance = entry.balance_after,
            "Kasbon payment recorded"
        );
        Ok(entry)
    }

    pub async fn kasbon_history(
        &self,
        ctx: &RequestContext,
        customer_id: &str,
        filter: &KasbonFilter,
    ) -> EngineResult<Page<KasbonEntry>> {
        self.guard(ctx, "kasbon_history", async {
            Ok(self.db.kasbon().history(customer_id, filter).await?)
        })
        .await
    }

    pub async fn kasbon_summary(&self, ctx: &RequestContext, customer_id: &str) -> EngineResult<KasbonSummary> {
        self.guard(ctx, "kasbon_summary", async {
            Ok(self.db.kasbon().summary(customer_id).await?)
        })
        .await
    }

    pub async fn kasbon_report(&self, ctx: &RequestContext) -> EngineResult<KasbonReport> {
        self.guard(ctx, "kasbon_report", async { Ok(self.db.kasbon().report().await?) })
            .await
    }

    // =========================================================================
    // Drawer & Cash Flow
    // =========================================================================

    pub async fn open_drawer(&self, ctx: &RequestContext, input: &OpenDrawerInput) -> EngineResult<DrawerSession> {
        let session = write_scope!(self, ctx, "open_drawer", |scope| {
            self.db.drawer().open_in(&mut scope, input, ctx.actor()).await
        });

        let _entered = ctx.span().enter();
        info!(id = %session.id, opening_balance = session.opening_balance, "Drawer session opened");
        Ok(session)
    }

    /// Closes the session and reports expected vs counted cash.
    pub async fn close_drawer(&self, ctx: &RequestContext, input: &CloseDrawerInput) -> EngineResult<DrawerClosing> {
        let closing = write_scope!(self, ctx, "close_drawer", |scope| {
            self.db.drawer().close_in(&mut scope, input, ctx.actor()).await
        });

        let _entered = ctx.span().enter();
        log_closing(&closing);
        Ok(closing)
    }

    pub async fn current_drawer(&self, ctx: &RequestContext) -> EngineResult<Option<DrawerSession>> {
        self.guard(ctx, "current_drawer", async { Ok(self.db.drawer().current().await?) })
            .await
    }

    pub async fn record_cash_flow(&self, ctx: &RequestContext, input: &NewCashFlow) -> EngineResult<CashFlowRecord> {
        let record = write_scope!(self, ctx, "record_cash_flow", |scope| {
            self.db.drawer().record_in(&mut scope, input, ctx.actor()).await
        });
        Ok(record)
    }

    pub async fn cash_flow_categories(&self, ctx: &RequestContext) -> EngineResult<Vec<CashFlowCategory>> {
        self.guard(ctx, "cash_flow_categories", async {
            Ok(self.db.drawer().categories().await?)
        })
        .await
    }

    pub async fn cash_flows(&self, ctx: &RequestContext, filter: &CashFlowFilter) -> EngineResult<Page<CashFlowRecord>> {
        self.guard(ctx, "cash_flows", async {
            Ok(self.db.drawer().cash_flows(filter).await?)
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
