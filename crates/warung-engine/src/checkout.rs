//! # Transaction Orchestrator
//!
//! Checkout, cancel, preview and gateway completion.
//!
//! ## Checkout Scope
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate (empty cart, mixed payment, credit without customer)          │
//! │                                                                         │
//! │  BEGIN IMMEDIATE ───────────────────────────────────────────────┐       │
//! │   1. lock customer (if any)            customer_inactive        │       │
//! │   2. for line in lines sorted by product id:                    │       │
//! │        lock product                    product_not_found/inactive│      │
//! │        price (tiers)                                            │       │
//! │        deduct stock                    insufficient_stock       │       │
//! │        swap containers (refillables)   insufficient_containers  │       │
//! │   3. totals                                                     │       │
//! │   4. payment leg                       invalid_payment_amount   │       │
//! │        credit → debt entry             credit_limit_exceeded    │       │
//! │   5. INV-YYYYMMDD-NNNN, insert header + lines                   │       │
//! │   6. cash sale + open drawer → income cash flow                 │       │
//! │  COMMIT ────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  re-read with lines and return                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure inside the scope rolls every write back: no stock moves,
//! no ledger entry, no invoice row.

use std::collections::{HashMap, HashSet};

use chrono::{Local, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warung_core::cart::{price_line, settle_payment, CalculateInput, CartPreview, CartTotals, CheckoutInput, PreviewLine};
use warung_core::input::{NewCashFlow, TransactionFilter};
use warung_core::numbering::DocumentKind;
use warung_core::{
    CashFlowKind, CoreError, DailySummary, Page, PaymentMethod, Transaction, TransactionItem, TransactionStatus,
};
use warung_db::repository::drawer::{CATEGORY_CANCELLATION, CATEGORY_SALES};
use warung_db::repository::inventory::REF_TRANSACTION;
use warung_db::{ScopeMode, TxScope};

use crate::context::RequestContext;
use crate::engine::{keep_or_abandon, Engine};
use crate::error::EngineResult;

impl Engine {
    // =========================================================================
    // Checkout
    // =========================================================================

    /// Sells a cart in one atomic scope and returns the stored transaction.
    pub async fn checkout(&self, ctx: &RequestContext, input: &CheckoutInput) -> EngineResult<Transaction> {
        input.validate()?;

        let (scope, transaction_id) = self
            .guard(ctx, "checkout", async {
                let mut scope = self.db.begin(ScopeMode::Write).await?;
                let written = self.write_sale(&mut scope, ctx, input).await;
                keep_or_abandon(scope, written).await
            })
            .await?;
        self.commit(ctx, scope).await?;

        let transaction = self.db.transactions().get(&transaction_id).await?;
        {
            let _entered = ctx.span().enter();
            info!(
                id = %transaction.id,
                invoice = %transaction.invoice_number,
                total = transaction.total_amount,
                method = %transaction.payment_method,
                status = %transaction.status,
                lines = transaction.items.len(),
                "Checkout committed"
            );
        }
        Ok(transaction)
    }

    async fn write_sale(&self, scope: &mut TxScope, ctx: &RequestContext, input: &CheckoutInput) -> EngineResult<String> {
        let transaction_id = Uuid::new_v4().to_string();
        let actor = ctx.actor();

        // 1. Customer
        if let Some(customer_id) = input.customer_id.as_deref() {
            let customer = self.db.customers().lock(scope, customer_id).await?;
            if !customer.is_active {
                return Err(CoreError::CustomerInactive { name: customer.name }.into());
            }
        }

        // 2. Lines, locked in product id order
        let mut items = Vec::with_capacity(input.items.len());
        for (line_no, line) in input.lines_in_lock_order() {
            let mut product = self.db.products().lock(scope, &line.product_id).await?;
            if !product.is_active {
                return Err(CoreError::ProductInactive { name: product.name }.into());
            }

            let priced = price_line(&product, line, line_no)?;
            debug!(
                product_id = %product.id,
                qty = line.quantity,
                unit_price = priced.quote.unit_price,
                tier = %priced.quote.tier_label,
                "Line priced"
            );

            self.db
                .inventory()
                .deduct(scope, &mut product, &transaction_id, line.quantity, actor)
                .await?;

            if let Some(container) = self.db.containers().for_product(scope, &product.id).await? {
                self.db
                    .containers()
                    .on_sale(scope, &container.id, line.quantity, &transaction_id, actor)
                    .await?;
            }

            items.push(TransactionItem {
                id: Uuid::new_v4().to_string(),
                transaction_id: transaction_id.clone(),
                line_no: priced.line_no,
                product_id: priced.product_id,
                product_name: priced.product_name,
                product_barcode: priced.product_barcode,
                quantity: priced.quantity,
                unit: priced.unit,
                unit_price: priced.quote.unit_price,
                cost_price: priced.cost_price,
                subtotal: priced.subtotal,
                discount_amount: priced.discount_amount,
                total_amount: priced.total_amount,
                pricing_tier_id: priced.quote.tier_id.clone(),
                pricing_tier_name: priced.quote.tier_name(),
                notes: priced.notes,
            });
        }
        items.sort_by_key(|item| item.line_no);

        // 3. Totals
        let totals = CartTotals::compute(
            items.iter().map(|item| item.total_amount),
            input.discount_amount,
            input.tax_amount,
        )?;

        // 4. Payment leg
        let settlement = settle_payment(input.payment_method, input.amount_paid, totals.total_amount)?;
        if input.payment_method == PaymentMethod::Credit && totals.total_amount > 0 {
            let customer_id = input.customer_id.as_deref().unwrap_or_default();
            self.db
                .kasbon()
                .record_debt(
                    scope,
                    customer_id,
                    totals.total_amount,
                    Some(&transaction_id),
                    input.notes.as_deref(),
                    actor,
                )
                .await?;
        }

        // 5. Invoice number and rows
        let today = Local::now().date_naive();
        let seq = scope.next_sequence(&DocumentKind::Invoice.sequence_name(today)).await?;
        let invoice_number = DocumentKind::Invoice.format(today, seq);

        let now = Utc::now();
        let transaction = Transaction {
            id: transaction_id.clone(),
            invoice_number,
            customer_id: input.customer_id.clone(),
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            tax_amount: totals.tax_amount,
            total_amount: totals.total_amount,
            payment_method: input.payment_method,
            amount_paid: settlement.amount_paid,
            change_amount: settlement.change_amount,
            status: settlement.status,
            notes: input.notes.clone(),
            cashier_name: input.cashier_name.clone(),
            created_at: now,
            updated_at: now,
            completed_at: (settlement.status == TransactionStatus::Completed).then_some(now),
            items,
        };
        self.db.transactions().insert(scope, &transaction).await?;

        // 6. Drawer
        if transaction.payment_method == PaymentMethod::Cash && transaction.total_amount > 0 {
            if self.db.drawer().current_in(scope).await?.is_some() {
                let flow = NewCashFlow {
                    category_id: Some(CATEGORY_SALES.to_string()),
                    kind: CashFlowKind::Income,
                    amount: transaction.total_amount,
                    description: Some(format!("Sale {}", transaction.invoice_number)),
                    reference_type: Some(REF_TRANSACTION.to_string()),
                    reference_id: Some(transaction.id.clone()),
                };
                self.db.drawer().record_in(scope, &flow, actor).await?;
            } else {
                debug!(id = %transaction.id, "No open drawer session, cash sale not recorded as cash flow");
            }
        }

        Ok(transaction_id)
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Cancels a sale: stock goes back, credit is compensated, the status
    /// becomes `cancelled`.
    ///
    /// Refillable container swaps are left as they are.
    pub async fn cancel(&self, ctx: &RequestContext, transaction_id: &str) -> EngineResult<Transaction> {
        let (scope, ()) = self
            .guard(ctx, "cancel", async {
                let mut scope = self.db.begin(ScopeMode::Write).await?;
                let written = self.write_cancel(&mut scope, ctx, transaction_id).await;
                keep_or_abandon(scope, written).await
            })
            .await?;
        self.commit(ctx, scope).await?;

        let transaction = self.db.transactions().get(transaction_id).await?;
        {
            let _entered = ctx.span().enter();
            info!(id = %transaction.id, invoice = %transaction.invoice_number, "Transaction cancelled");
        }
        Ok(transaction)
    }

    async fn write_cancel(&self, scope: &mut TxScope, ctx: &RequestContext, transaction_id: &str) -> EngineResult<()> {
        let actor = ctx.actor();
        let transaction = self.db.transactions().lock(scope, transaction_id).await?;

        if transaction.status == TransactionStatus::Cancelled {
            return Err(CoreError::AlreadyCancelled(transaction_id.to_string()).into());
        }
        if !transaction.status.can_transition_to(TransactionStatus::Cancelled) {
            return Err(CoreError::InvalidTransactionStatus {
                id: transaction_id.to_string(),
                status: transaction.status.to_string(),
            }
            .into());
        }
        if self.db.refunds().has_completed_in(scope, transaction_id).await? {
            return Err(CoreError::TransactionHasRefunds(transaction.invoice_number).into());
        }

        let mut items = self.db.transactions().items_in(scope, transaction_id).await?;
        items.sort_by(|a, b| a.product_id.cmp(&b.product_id).then(a.line_no.cmp(&b.line_no)));
        for item in &items {
            self.db
                .inventory()
                .restore(
                    scope,
                    &item.product_id,
                    (REF_TRANSACTION, transaction_id),
                    item.quantity,
                    "Transaction cancelled",
                    actor,
                )
                .await?;
        }

        self.db
            .transactions()
            .set_status(scope, transaction_id, TransactionStatus::Cancelled, None)
            .await?;

        if transaction.payment_method == PaymentMethod::Credit && transaction.total_amount > 0 {
            if let Some(customer_id) = transaction.customer_id.as_deref() {
                let note = format!("Cancellation of {}", transaction.invoice_number);
                let settled = self
                    .db
                    .kasbon()
                    .settle_in(
                        scope,
                        customer_id,
                        transaction.total_amount,
                        Some(transaction_id),
                        Some(&note),
                        actor,
                    )
                    .await?;
                if settled.is_none() {
                    warn!(
                        id = transaction_id,
                        customer_id,
                        "Customer owes nothing, no compensating payment written"
                    );
                }
            }
        }

        if transaction.payment_method == PaymentMethod::Cash
            && self
                .db
                .drawer()
                .has_reference_in(scope, REF_TRANSACTION, transaction_id, CashFlowKind::Income)
                .await?
        {
            let flow = NewCashFlow {
                category_id: Some(CATEGORY_CANCELLATION.to_string()),
                kind: CashFlowKind::Expense,
                amount: transaction.total_amount,
                description: Some(format!("Cancellation of {}", transaction.invoice_number)),
                reference_type: Some(REF_TRANSACTION.to_string()),
                reference_id: Some(transaction_id.to_string()),
            };
            self.db.drawer().record_in(scope, &flow, actor).await?;
        }

        Ok(())
    }

    // =========================================================================
    // Gateway Completion
    // =========================================================================

    /// Marks a pending transfer or QRIS sale as paid.
    ///
    /// Calling it again on a completed sale returns it unchanged.
    pub async fn mark_completed(&self, ctx: &RequestContext, transaction_id: &str) -> EngineResult<Transaction> {
        let (scope, changed) = self
            .guard(ctx, "mark_completed", async {
                let mut scope = self.db.begin(ScopeMode::Write).await?;
                let written = self.write_completion(&mut scope, transaction_id).await;
                keep_or_abandon(scope, written).await
            })
            .await?;
        self.commit(ctx, scope).await?;

        if changed {
            let _entered = ctx.span().enter();
            info!(id = transaction_id, "Pending transaction completed");
        }
        Ok(self.db.transactions().get(transaction_id).await?)
    }

    async fn write_completion(&self, scope: &mut TxScope, transaction_id: &str) -> EngineResult<bool> {
        let transaction = self.db.transactions().lock(scope, transaction_id).await?;
        match transaction.status {
            TransactionStatus::Completed => Ok(false),
            TransactionStatus::Pending => {
                self.db
                    .transactions()
                    .set_status(scope, transaction_id, TransactionStatus::Completed, Some(Utc::now()))
                    .await?;
                Ok(true)
            }
            other => Err(CoreError::InvalidTransactionStatus {
                id: transaction_id.to_string(),
                status: other.to_string(),
            }
            .into()),
        }
    }

    // =========================================================================
    // Preview & Reads
    // =========================================================================

    /// Prices a cart without locking or writing anything.
    ///
    /// Missing and inactive products are reported instead of failing the
    /// whole preview.
    pub async fn calculate(&self, ctx: &RequestContext, input: &CalculateInput) -> EngineResult<CartPreview> {
        input.validate()?;

        self.guard(ctx, "calculate", async {
            let mut ids: Vec<String> = input.items.iter().map(|line| line.product_id.clone()).collect();
            ids.sort();
            ids.dedup();

            let products: HashMap<String, _> = self
                .db
                .products()
                .get_many(&ids)
                .await?
                .into_iter()
                .map(|product| (product.id.clone(), product))
                .collect();

            let mut lines = Vec::with_capacity(input.items.len());
            let mut unavailable = Vec::new();
            let mut seen = HashSet::new();

            for (idx, line) in input.items.iter().enumerate() {
                match products.get(&line.product_id) {
                    Some(product) if product.is_active => {
                        let priced = price_line(product, line, idx as i64 + 1)?;
                        lines.push(PreviewLine::from_priced(priced, product));
                    }
                    _ => {
                        if seen.insert(line.product_id.clone()) {
                            unavailable.push(line.product_id.clone());
                        }
                    }
                }
            }

            Ok(CartPreview::build(lines, unavailable, input.discount_amount, input.tax_amount)?)
        })
        .await
    }

    /// One transaction with its lines.
    pub async fn transaction(&self, ctx: &RequestContext, transaction_id: &str) -> EngineResult<Transaction> {
        self.guard(ctx, "get_transaction", async {
            Ok(self.db.transactions().get(transaction_id).await?)
        })
        .await
    }

    /// Paged transaction headers, newest first.
    pub async fn transactions(&self, ctx: &RequestContext, filter: &TransactionFilter) -> EngineResult<Page<Transaction>> {
        self.guard(ctx, "list_transactions", async {
            Ok(self.db.transactions().list(filter).await?)
        })
        .await
    }

    /// Completed sales of one local day.
    pub async fn daily_summary(&self, ctx: &RequestContext, date: NaiveDate) -> EngineResult<DailySummary> {
        self.guard(ctx, "daily_summary", async {
            Ok(self.db.transactions().daily_summary(date).await?)
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::testing::*;
    use warung_core::cart::CartLine;
    use warung_core::input::{CloseDrawerInput, KasbonFilter, MovementFilter, OpenDrawerInput};
    use warung_core::{ContainerMovementKind, KasbonKind, StockMovementKind};

    fn today_code() -> String {
        Local::now().date_naive().format("%Y%m%d").to_string()
    }

    async fn stock_of(engine: &Engine, product_id: &str) -> i64 {
        engine.product(&ctx(), product_id).await.unwrap().current_stock
    }

    async fn movements(engine: &Engine, product_id: &str) -> Page<warung_core::StockMovement> {
        engine
            .stock_movements(&ctx(), product_id, &MovementFilter::default())
            .await
            .unwrap()
    }

    async fn transaction_count(engine: &Engine) -> i64 {
        engine
            .transactions(&ctx(), &TransactionFilter::default())
            .await
            .unwrap()
            .total
    }

    // -------------------------------------------------------------------------
    // End-to-end scenarios
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_base_price_cash_sale() {
        let engine = engine().await;
        let a = product(&engine, "Indomie Goreng", 10_000, 100).await;

        let tx = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 3)], 30_000))
            .await
            .unwrap();

        assert_eq!(tx.total_amount, 30_000);
        assert_eq!(tx.change_amount, 0);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.completed_at.is_some());
        assert_eq!(tx.items.len(), 1);
        assert_eq!(tx.items[0].unit_price, 10_000);
        assert_eq!(tx.items[0].pricing_tier_id, None);
        assert_eq!(stock_of(&engine, &a.id).await, 97);

        let ledger = movements(&engine, &a.id).await;
        let sale = &ledger.items[0];
        assert_eq!(sale.kind, StockMovementKind::Sale);
        assert_eq!((sale.stock_before, sale.stock_after, sale.quantity), (100, 97, -3));
        assert_eq!(sale.reference_id.as_deref(), Some(tx.id.as_str()));
        assert_eq!(
            ledger.items.iter().filter(|m| m.kind == StockMovementKind::Sale).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_tiered_pricing() {
        let engine = engine().await;
        let b = product(&engine, "Gula Pasir 1kg", 10_000, 500).await;
        tier(&engine, &b, "Grosir", 10, Some(49), 9_000).await;
        tier(&engine, &b, "Grosir Besar", 50, None, 8_000).await;

        let tx = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&b.id, 15)], 135_000))
            .await
            .unwrap();

        let line = &tx.items[0];
        assert_eq!(line.unit_price, 9_000);
        assert_eq!(line.pricing_tier_name.as_deref(), Some("Grosir"));
        assert_eq!(tx.total_amount, 135_000);
        assert_eq!(tx.change_amount, 0);
    }

    #[tokio::test]
    async fn test_tier_boundaries_in_preview() {
        let engine = engine().await;
        let b = product(&engine, "Gula Pasir 1kg", 10_000, 500).await;
        tier(&engine, &b, "Grosir", 10, Some(49), 9_000).await;
        tier(&engine, &b, "Grosir Besar", 50, None, 8_000).await;

        let preview = engine
            .calculate(
                &ctx(),
                &CalculateInput {
                    items: vec![
                        CartLine::new(&b.id, 9),
                        CartLine::new(&b.id, 10),
                        CartLine::new(&b.id, 49),
                        CartLine::new(&b.id, 50),
                    ],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let prices: Vec<i64> = preview.lines.iter().map(|l| l.unit_price).collect();
        assert_eq!(prices, vec![10_000, 9_000, 9_000, 8_000]);
        assert_eq!(preview.lines[0].tier_label, "base");
        assert_eq!(preview.lines[3].tier_label, "Grosir Besar");
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back() {
        let engine = engine().await;
        let c = product(&engine, "Minyak Goreng 1L", 18_000, 10).await;

        let err = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&c.id, 15)], 270_000))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "insufficient_stock");
        assert_eq!(crate::status_for(err.kind()), 400);
        assert_eq!(stock_of(&engine, &c.id).await, 10);
        assert_eq!(transaction_count(&engine).await, 0);
        assert!(movements(&engine, &c.id)
            .await
            .items
            .iter()
            .all(|m| m.kind == StockMovementKind::Initial));
    }

    #[tokio::test]
    async fn test_credit_sale_over_limit_is_rejected() {
        let engine = engine().await;
        let beras = product(&engine, "Beras 5kg", 50_000, 100).await;
        let x = customer(&engine, 500_000, 400_000).await;

        let err = engine
            .checkout(&ctx(), &credit(vec![CartLine::new(&beras.id, 3)], &x))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "credit_limit_exceeded");
        assert_eq!(stock_of(&engine, &beras.id).await, 100);
        assert_eq!(engine.customer(&ctx(), &x.id).await.unwrap().current_debt, 400_000);

        let history = engine
            .kasbon_history(&ctx(), &x.id, &KasbonFilter::default())
            .await
            .unwrap();
        assert_eq!(history.total, 1);
    }

    #[tokio::test]
    async fn test_credit_sale_within_limit() {
        let engine = engine().await;
        let beras = product(&engine, "Beras 5kg", 50_000, 100).await;
        let x = customer(&engine, 500_000, 400_000).await;

        let tx = engine
            .checkout(&ctx(), &credit(vec![CartLine::new(&beras.id, 1)], &x))
            .await
            .unwrap();

        assert_eq!(tx.total_amount, 50_000);
        assert_eq!((tx.amount_paid, tx.change_amount), (0, 0));
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(engine.customer(&ctx(), &x.id).await.unwrap().current_debt, 450_000);

        let history = engine
            .kasbon_history(&ctx(), &x.id, &KasbonFilter::default())
            .await
            .unwrap();
        let entry = &history.items[0];
        assert_eq!(entry.kind, KasbonKind::Debt);
        assert_eq!((entry.balance_before, entry.balance_after), (400_000, 450_000));
        assert_eq!(entry.transaction_id.as_deref(), Some(tx.id.as_str()));
    }

    #[tokio::test]
    async fn test_refillable_swap() {
        let engine = engine().await;
        let g = product(&engine, "LPG 3kg", 22_000, 40).await;
        let tabung = container(&engine, &g, 10, 40).await;

        let tx = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&g.id, 3)], 70_000))
            .await
            .unwrap();
        assert_eq!(tx.change_amount, 4_000);

        assert_eq!(stock_of(&engine, &g.id).await, 37);
        let after = engine.container(&ctx(), &tabung.id).await.unwrap();
        assert_eq!((after.empty_count, after.full_count), (13, 37));

        let moves = engine
            .container_movements(&ctx(), &tabung.id, None, None)
            .await
            .unwrap();
        assert_eq!(moves.total, 1);
        let swap = &moves.items[0];
        assert_eq!(swap.kind, ContainerMovementKind::SaleExchange);
        assert_eq!((swap.empty_change, swap.full_change), (3, -3));
        assert_eq!(swap.reference_id.as_deref(), Some(tx.id.as_str()));
    }

    #[tokio::test]
    async fn test_container_shortage_rolls_back_stock() {
        let engine = engine().await;
        let g = product(&engine, "LPG 3kg", 22_000, 40).await;
        let tabung = container(&engine, &g, 10, 2).await;

        let err = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&g.id, 3)], 66_000))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "insufficient_containers");
        assert_eq!(stock_of(&engine, &g.id).await, 40);
        let after = engine.container(&ctx(), &tabung.id).await.unwrap();
        assert_eq!((after.empty_count, after.full_count), (10, 2));
    }

    // -------------------------------------------------------------------------
    // Invariants
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_totals_with_discounts_and_tax() {
        let engine = engine().await;
        let kopi = product(&engine, "Kopi Sachet", 1_500, 200).await;
        let teh = product(&engine, "Teh Botol", 5_000, 50).await;

        let mut input = cash(
            vec![
                CartLine::new(&kopi.id, 10).with_discount(1_000),
                CartLine::new(&teh.id, 2),
            ],
            30_000,
        );
        input.discount_amount = 500;
        input.tax_amount = 1_100;

        let tx = engine.checkout(&ctx(), &input).await.unwrap();

        for item in &tx.items {
            assert_eq!(item.subtotal, item.unit_price * item.quantity);
            assert_eq!(item.total_amount, item.subtotal - item.discount_amount);
        }
        let line_sum: i64 = tx.items.iter().map(|i| i.total_amount).sum();
        assert_eq!(line_sum, 14_000 + 10_000);
        assert_eq!(tx.subtotal, line_sum);
        assert_eq!(tx.total_amount, line_sum - 500 + 1_100);
        assert_eq!(tx.change_amount, 30_000 - tx.total_amount);
    }

    #[tokio::test]
    async fn test_lines_keep_cart_order() {
        let engine = engine().await;
        let a = product(&engine, "Sabun", 4_000, 10).await;
        let b = product(&engine, "Sampo", 12_000, 10).await;
        let (first, second) = if a.id > b.id { (&a, &b) } else { (&b, &a) };

        let tx = engine
            .checkout(
                &ctx(),
                &cash(vec![CartLine::new(&first.id, 1), CartLine::new(&second.id, 1)], 16_000),
            )
            .await
            .unwrap();

        assert_eq!(tx.items[0].product_id, first.id);
        assert_eq!(tx.items[0].line_no, 1);
        assert_eq!(tx.items[1].product_id, second.id);
        assert_eq!(tx.items[1].line_no, 2);
    }

    #[tokio::test]
    async fn test_stock_matches_latest_movement() {
        let engine = engine().await;
        let a = product(&engine, "Indomie Goreng", 3_500, 50).await;

        let first = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 5)], 17_500))
            .await
            .unwrap();
        engine
            .checkout(
                &ctx(),
                &cash(vec![CartLine::new(&a.id, 2), CartLine::new(&a.id, 1)], 10_500),
            )
            .await
            .unwrap();
        engine.cancel(&ctx(), &first.id).await.unwrap();

        let current = stock_of(&engine, &a.id).await;
        let latest = &movements(&engine, &a.id).await.items[0];
        assert_eq!(current, 47);
        assert_eq!(latest.stock_after, current);
        assert_eq!(latest.kind, StockMovementKind::Return);
    }

    #[tokio::test]
    async fn test_invoice_numbers_increase_per_day() {
        let engine = engine().await;
        let a = product(&engine, "Aqua 600ml", 4_000, 100).await;

        let mut numbers = Vec::new();
        for _ in 0..3 {
            let tx = engine
                .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 1)], 4_000))
                .await
                .unwrap();
            numbers.push(tx.invoice_number);
        }

        let day = today_code();
        assert_eq!(
            numbers,
            vec![
                format!("INV-{day}-0001"),
                format!("INV-{day}-0002"),
                format!("INV-{day}-0003"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_checkout_does_not_reuse_visible_number() {
        let engine = engine().await;
        let a = product(&engine, "Aqua 600ml", 4_000, 1).await;

        engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 2)], 8_000))
            .await
            .unwrap_err();
        engine
            .restock(
                &ctx(),
                &warung_core::input::RestockInput {
                    product_id: a.id.clone(),
                    quantity: 10,
                    cost_per_unit: 3_000,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let first = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 1)], 4_000))
            .await
            .unwrap();
        let second = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 1)], 4_000))
            .await
            .unwrap();

        assert!(first.invoice_number < second.invoice_number);
    }

    #[tokio::test]
    async fn test_calculate_has_no_effects_and_matches_checkout() {
        let engine = engine().await;
        let b = product(&engine, "Gula Pasir 1kg", 10_000, 100).await;
        tier(&engine, &b, "Grosir", 10, None, 9_000).await;
        let kopi = product(&engine, "Kopi Sachet", 1_500, 100).await;

        let items = vec![
            CartLine::new(&b.id, 12).with_discount(2_000),
            CartLine::new(&kopi.id, 4),
        ];
        let request = CalculateInput {
            items: items.clone(),
            discount_amount: 1_000,
            tax_amount: 0,
        };

        let first = engine.calculate(&ctx(), &request).await.unwrap();
        let second = engine.calculate(&ctx(), &request).await.unwrap();
        assert_eq!(first, second);
        assert!(first.can_checkout);
        assert_eq!(stock_of(&engine, &b.id).await, 100);
        assert_eq!(transaction_count(&engine).await, 0);

        let mut input = cash(items, first.totals.total_amount);
        input.discount_amount = 1_000;
        let tx = engine.checkout(&ctx(), &input).await.unwrap();

        let preview_totals: Vec<i64> = first.lines.iter().map(|l| l.total_amount).collect();
        let sold_totals: Vec<i64> = tx.items.iter().map(|i| i.total_amount).collect();
        assert_eq!(preview_totals, sold_totals);
        assert_eq!(first.totals.total_amount, tx.total_amount);
        assert_eq!(tx.change_amount, 0);
    }

    #[tokio::test]
    async fn test_calculate_reports_unavailable_products() {
        let engine = engine().await;
        let a = product(&engine, "Roti Tawar", 15_000, 2).await;
        let gone = product(&engine, "Susu Kaleng", 11_000, 5).await;
        engine.deactivate_product(&ctx(), &gone.id).await.unwrap();

        let preview = engine
            .calculate(
                &ctx(),
                &CalculateInput {
                    items: vec![
                        CartLine::new(&a.id, 3),
                        CartLine::new(&gone.id, 1),
                        CartLine::new("no-such-product", 1),
                    ],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(preview.lines.len(), 1);
        assert!(!preview.lines[0].is_available);
        assert_eq!(preview.lines[0].available_qty, Some(2));
        assert_eq!(preview.unavailable_product_ids, vec![gone.id.clone(), "no-such-product".to_string()]);
        assert!(!preview.can_checkout);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_and_credit() {
        let engine = engine().await;
        let a = product(&engine, "Rokok Surya 12", 25_000, 30).await;
        let x = customer(&engine, 0, 100_000).await;

        let tx = engine
            .checkout(&ctx(), &credit(vec![CartLine::new(&a.id, 2)], &x))
            .await
            .unwrap();
        assert_eq!(stock_of(&engine, &a.id).await, 28);
        assert_eq!(engine.customer(&ctx(), &x.id).await.unwrap().current_debt, 150_000);

        let cancelled = engine.cancel(&ctx(), &tx.id).await.unwrap();
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);
        assert_eq!(stock_of(&engine, &a.id).await, 30);
        assert_eq!(engine.customer(&ctx(), &x.id).await.unwrap().current_debt, 100_000);

        let history = engine
            .kasbon_history(&ctx(), &x.id, &KasbonFilter::default())
            .await
            .unwrap();
        let compensation = &history.items[0];
        assert_eq!(compensation.kind, KasbonKind::Payment);
        assert_eq!(compensation.amount, tx.total_amount);
        assert_eq!(compensation.transaction_id.as_deref(), Some(tx.id.as_str()));
    }

    #[tokio::test]
    async fn test_cancel_leaves_container_swap() {
        let engine = engine().await;
        let g = product(&engine, "LPG 3kg", 22_000, 40).await;
        let tabung = container(&engine, &g, 10, 40).await;

        let tx = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&g.id, 1)], 22_000))
            .await
            .unwrap();
        engine.cancel(&ctx(), &tx.id).await.unwrap();

        assert_eq!(stock_of(&engine, &g.id).await, 40);
        let after = engine.container(&ctx(), &tabung.id).await.unwrap();
        assert_eq!((after.empty_count, after.full_count), (11, 39));
    }

    #[tokio::test]
    async fn test_cancel_twice_and_missing() {
        let engine = engine().await;
        let a = product(&engine, "Aqua 600ml", 4_000, 10).await;
        let tx = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 1)], 5_000))
            .await
            .unwrap();

        engine.cancel(&ctx(), &tx.id).await.unwrap();
        let err = engine.cancel(&ctx(), &tx.id).await.unwrap_err();
        assert_eq!(err.code(), "already_cancelled");
        assert_eq!(stock_of(&engine, &a.id).await, 10);

        let err = engine.cancel(&ctx(), "missing").await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert_eq!(crate::status_for(err.kind()), 404);
    }

    // -------------------------------------------------------------------------
    // Payment legs and validation
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_transfer_pending_then_completed() {
        let engine = engine().await;
        let a = product(&engine, "Minyak Goreng 2L", 36_000, 10).await;

        let mut input = cash(vec![CartLine::new(&a.id, 1)], 0);
        input.payment_method = PaymentMethod::Qris;
        let tx = engine.checkout(&ctx(), &input).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.completed_at.is_none());
        // stock leaves the shelf as soon as the sale is recorded
        assert_eq!(stock_of(&engine, &a.id).await, 9);

        let done = engine.mark_completed(&ctx(), &tx.id).await.unwrap();
        assert_eq!(done.status, TransactionStatus::Completed);
        assert!(done.completed_at.is_some());

        let again = engine.mark_completed(&ctx(), &tx.id).await.unwrap();
        assert_eq!(again.status, TransactionStatus::Completed);
        assert_eq!(again.completed_at, done.completed_at);

        engine.cancel(&ctx(), &tx.id).await.unwrap();
        let err = engine.mark_completed(&ctx(), &tx.id).await.unwrap_err();
        assert_eq!(err.code(), "invalid_transaction_status");
    }

    #[tokio::test]
    async fn test_transfer_paid_in_full_completes_immediately() {
        let engine = engine().await;
        let a = product(&engine, "Minyak Goreng 2L", 36_000, 10).await;

        let mut input = cash(vec![CartLine::new(&a.id, 1)], 36_000);
        input.payment_method = PaymentMethod::Transfer;
        let tx = engine.checkout(&ctx(), &input).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.change_amount, 0);
    }

    #[tokio::test]
    async fn test_cash_underpayment() {
        let engine = engine().await;
        let a = product(&engine, "Teh Botol", 5_000, 10).await;

        let err = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 2)], 9_999))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_payment_amount");
        assert_eq!(stock_of(&engine, &a.id).await, 10);

        let exact = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 2)], 10_000))
            .await
            .unwrap();
        assert_eq!(exact.change_amount, 0);
    }

    #[tokio::test]
    async fn test_input_rejected_before_scope() {
        let engine = engine().await;
        let a = product(&engine, "Teh Botol", 5_000, 10).await;

        let err = engine.checkout(&ctx(), &cash(vec![], 0)).await.unwrap_err();
        assert_eq!(err.code(), "empty_cart");

        let mut mixed = cash(vec![CartLine::new(&a.id, 1)], 5_000);
        mixed.payment_method = PaymentMethod::Mixed;
        let err = engine.checkout(&ctx(), &mixed).await.unwrap_err();
        assert_eq!(err.code(), "unsupported_payment_method");

        let mut anonymous_credit = cash(vec![CartLine::new(&a.id, 1)], 0);
        anonymous_credit.payment_method = PaymentMethod::Credit;
        let err = engine.checkout(&ctx(), &anonymous_credit).await.unwrap_err();
        assert_eq!(err.code(), "validation");

        let err = engine
            .calculate(&ctx(), &CalculateInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "empty_cart");
    }

    #[tokio::test]
    async fn test_inactive_product_and_customer() {
        let engine = engine().await;
        let a = product(&engine, "Teh Botol", 5_000, 10).await;
        let b = product(&engine, "Kopi Sachet", 1_500, 10).await;
        engine.deactivate_product(&ctx(), &b.id).await.unwrap();

        let err = engine
            .checkout(
                &ctx(),
                &cash(vec![CartLine::new(&a.id, 1), CartLine::new(&b.id, 1)], 10_000),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "product_inactive");
        assert_eq!(stock_of(&engine, &a.id).await, 10);

        let x = customer(&engine, 0, 0).await;
        engine.deactivate_customer(&ctx(), &x.id).await.unwrap();
        let err = engine
            .checkout(&ctx(), &credit(vec![CartLine::new(&a.id, 1)], &x))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "customer_inactive");

        let err = engine
            .checkout(&ctx(), &cash(vec![CartLine::new("no-such-product", 1)], 1_000))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "product_not_found");
    }

    #[tokio::test]
    async fn test_untracked_product_has_no_movements() {
        let engine = engine().await;
        let es = untracked_product(&engine, "Es Teh", 3_000).await;

        engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&es.id, 4)], 12_000))
            .await
            .unwrap();

        assert_eq!(stock_of(&engine, &es.id).await, 0);
        assert_eq!(movements(&engine, &es.id).await.total, 0);
    }

    // -------------------------------------------------------------------------
    // Drawer feed, cancellation
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cash_sales_feed_the_open_drawer() {
        let engine = engine().await;
        let a = product(&engine, "Indomie Goreng", 3_500, 100).await;

        let session = engine
            .open_drawer(
                &ctx(),
                &OpenDrawerInput {
                    opening_balance: 200_000,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let kept = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 10)], 50_000))
            .await
            .unwrap();
        let voided = engine
            .checkout(&ctx(), &cash(vec![CartLine::new(&a.id, 2)], 7_000))
            .await
            .unwrap();
        engine.cancel(&ctx(), &voided.id).await.unwrap();

        let closing = engine
            .close_drawer(
                &ctx(),
                &CloseDrawerInput {
                    session_id: session.id.clone(),
                    closing_balance: 235_000,
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(closing.total_income, kept.total_amount + voided.total_amount);
        assert_eq!(closing.total_expense, voided.total_amount);
        assert_eq!(closing.session.expected_closing, Some(200_000 + kept.total_amount));
        assert_eq!(closing.session.difference, Some(0));
    }

    #[tokio::test]
    async fn test_cancelled_request_writes_nothing() {
        let engine = engine().await;
        let a = product(&engine, "Indomie Goreng", 3_500, 100).await;

        let request = ctx();
        request.cancel();
        let err = engine
            .checkout(&request, &cash(vec![CartLine::new(&a.id, 1)], 3_500))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(stock_of(&engine, &a.id).await, 100);
        assert_eq!(transaction_count(&engine).await, 0);
    }

    // -------------------------------------------------------------------------
    // Pool concurrency
    // -------------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_checkouts_never_oversell() {
        let (_dir, engine) = file_engine(5).await;
        let a = product(&engine, "Gas Melon 3kg", 22_000, 10).await;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let engine = engine.clone();
            let product_id = a.id.clone();
            tasks.spawn(async move {
                engine
                    .checkout(&ctx(), &cash(vec![CartLine::new(&product_id, 1)], 22_000))
                    .await
            });
        }

        let mut invoices = std::collections::HashSet::new();
        let mut rejected = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(sale) => assert!(invoices.insert(sale.invoice_number)),
                Err(err) => {
                    assert_eq!(err.code(), "insufficient_stock");
                    rejected += 1;
                }
            }
        }

        assert_eq!(invoices.len(), 10);
        assert_eq!(rejected, 10);
        assert_eq!(stock_of(&engine, &a.id).await, 0);
        assert_eq!(transaction_count(&engine).await, 10);

        let ledger = movements(&engine, &a.id).await;
        assert!(ledger.items.iter().all(|m| m.stock_after >= 0));
    }
}
