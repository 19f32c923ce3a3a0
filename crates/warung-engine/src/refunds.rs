//! Refunds of completed sales.
//!
//! ## Approval Scope
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN IMMEDIATE ───────────────────────────────────────────────┐       │
//! │   1. lock refund                   refund_not_pending           │       │
//! │   2. lock sale                     invalid_transaction_status   │       │
//! │   3. restock lines → return movements (ref: refund)             │       │
//! │   4. money back                                                 │       │
//! │        credit → kasbon payment                                  │       │
//! │        cash   → drawer expense (if a drawer is open)            │       │
//! │   5. refund completed                                           │       │
//! │   6. every sold unit returned → sale refunded                   │       │
//! │  COMMIT ────────────────────────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request claims its quantities as soon as it is created, so two pending
//! requests can never return more than was sold. Rejecting releases them.

use std::collections::HashMap;

use chrono::{Local, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warung_core::input::{CreateRefundInput, NewCashFlow};
use warung_core::numbering::DocumentKind;
use warung_core::{
    CashFlowKind, CoreError, PaymentMethod, Refund, RefundItem, RefundStatus, TransactionItem, TransactionStatus,
};
use warung_db::repository::drawer::CATEGORY_REFUND;
use warung_db::repository::inventory::REF_REFUND;
use warung_db::TxScope;

use crate::context::RequestContext;
use crate::engine::Engine;
use crate::error::EngineResult;

impl Engine {
    // =========================================================================
    // Request
    // =========================================================================

    /// Records a pending refund request against a completed sale.
    ///
    /// Each line is refunded its share of the sale line total. Nothing moves
    /// until the request is approved.
    pub async fn create_refund(&self, ctx: &RequestContext, input: &CreateRefundInput) -> EngineResult<Refund> {
        input.validate()?;

        let refund_id = write_scope!(self, ctx, "create_refund", |scope| {
            self.write_refund_request(&mut scope, ctx, input).await
        });

        let refund = self.db.refunds().get(&refund_id).await?;
        let _entered = ctx.span().enter();
        info!(
            id = %refund.id,
            number = %refund.refund_number,
            transaction_id = %refund.transaction_id,
            amount = refund.total_refund_amount,
            "Refund requested"
        );
        Ok(refund)
    }

    async fn write_refund_request(
        &self,
        scope: &mut TxScope,
        ctx: &RequestContext,
        input: &CreateRefundInput,
    ) -> EngineResult<String> {
        let sale = self.db.transactions().lock(scope, &input.transaction_id).await?;
        if sale.status != TransactionStatus::Completed {
            return Err(CoreError::InvalidTransactionStatus {
                id: sale.id,
                status: sale.status.to_string(),
            }
            .into());
        }

        let sold: HashMap<String, TransactionItem> = self
            .db
            .transactions()
            .items_in(scope, &sale.id)
            .await?
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();
        let claimed = self.db.refunds().claimed_in(scope, &sale.id).await?;

        let refund_id = Uuid::new_v4().to_string();
        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let Some(sold_line) = sold.get(&line.transaction_item_id) else {
                return Err(CoreError::RefundItemNotInTransaction {
                    item: line.transaction_item_id.clone(),
                    transaction: sale.id.clone(),
                }
                .into());
            };

            let refundable = sold_line.quantity - claimed.get(&sold_line.id).copied().unwrap_or(0);
            if line.quantity > refundable {
                return Err(CoreError::RefundQuantityExceeded {
                    product: sold_line.product_name.clone(),
                    refundable,
                    requested: line.quantity,
                }
                .into());
            }

            items.push(RefundItem {
                id: Uuid::new_v4().to_string(),
                refund_id: refund_id.clone(),
                transaction_item_id: sold_line.id.clone(),
                product_id: sold_line.product_id.clone(),
                product_name: sold_line.product_name.clone(),
                quantity: line.quantity,
                unit_price: sold_line.unit_price,
                refund_amount: RefundItem::prorate(sold_line, line.quantity),
                reason: line.reason.clone(),
                restock: line.restock,
            });
        }

        let today = Local::now().date_naive();
        let seq = scope.next_sequence(&DocumentKind::Refund.sequence_name(today)).await?;

        let now = Utc::now();
        let refund = Refund {
            id: refund_id.clone(),
            refund_number: DocumentKind::Refund.format(today, seq),
            transaction_id: sale.id.clone(),
            customer_id: sale.customer_id.clone(),
            refund_method: sale.payment_method,
            total_refund_amount: items.iter().map(|item| item.refund_amount).sum(),
            status: RefundStatus::Pending,
            reason: input.reason.clone(),
            notes: input.notes.clone(),
            requested_by: ctx.actor().to_string(),
            processed_by: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            items,
        };
        self.db.refunds().insert(scope, &refund).await?;

        Ok(refund_id)
    }

    // =========================================================================
    // Approval & Rejection
    // =========================================================================

    /// Completes a pending refund: stock, kasbon and drawer are updated in
    /// one scope, and the sale becomes `refunded` once every sold unit has
    /// come back.
    pub async fn approve_refund(&self, ctx: &RequestContext, refund_id: &str) -> EngineResult<Refund> {
        write_scope!(self, ctx, "approve_refund", |scope| {
            self.write_refund_completion(&mut scope, ctx, refund_id).await
        });

        let refund = self.db.refunds().get(refund_id).await?;
        let _entered = ctx.span().enter();
        info!(
            number = %refund.refund_number,
            amount = refund.total_refund_amount,
            method = %refund.refund_method,
            "Refund completed"
        );
        Ok(refund)
    }

    async fn write_refund_completion(&self, scope: &mut TxScope, ctx: &RequestContext, refund_id: &str) -> EngineResult<()> {
        let actor = ctx.actor();
        let refund = self.pending_refund(scope, refund_id).await?;

        let sale = self.db.transactions().lock(scope, &refund.transaction_id).await?;
        if sale.status != TransactionStatus::Completed {
            return Err(CoreError::InvalidTransactionStatus {
                id: sale.id,
                status: sale.status.to_string(),
            }
            .into());
        }

        // 1. Stock back on the shelf
        let note = format!("Refund {}", refund.refund_number);
        let mut items = self.db.refunds().items_in(scope, refund_id).await?;
        items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        for item in items.iter().filter(|item| item.restock) {
            self.db
                .inventory()
                .restore(scope, &item.product_id, (REF_REFUND, refund_id), item.quantity, &note, actor)
                .await?;
        }

        // 2. Money back the way it came in
        if refund.total_refund_amount > 0 {
            match refund.refund_method {
                PaymentMethod::Credit => {
                    if let Some(customer_id) = refund.customer_id.as_deref() {
                        let settled = self
                            .db
                            .kasbon()
                            .settle_in(
                                scope,
                                customer_id,
                                refund.total_refund_amount,
                                Some(&sale.id),
                                Some(&note),
                                actor,
                            )
                            .await?;
                        if settled.is_none() {
                            warn!(refund_id, customer_id, "Customer owes nothing, refund not credited to kasbon");
                        }
                    }
                }
                PaymentMethod::Cash => {
                    if self.db.drawer().current_in(scope).await?.is_some() {
                        let flow = NewCashFlow {
                            category_id: Some(CATEGORY_REFUND.to_string()),
                            kind: CashFlowKind::Expense,
                            amount: refund.total_refund_amount,
                            description: Some(note.clone()),
                            reference_type: Some(REF_REFUND.to_string()),
                            reference_id: Some(refund_id.to_string()),
                        };
                        self.db.drawer().record_in(scope, &flow, actor).await?;
                    } else {
                        debug!(refund_id, "No open drawer session, cash refund not recorded as cash flow");
                    }
                }
                other => debug!(refund_id, method = %other, "Refund paid back outside the drawer"),
            }
        }

        // 3. Refund, then the sale once nothing is left to return
        self.db
            .refunds()
            .set_status(scope, refund_id, RefundStatus::Completed, actor, Some(Utc::now()))
            .await?;

        let returned = self.db.refunds().returned_in(scope, &sale.id).await?;
        let sold = self.db.transactions().items_in(scope, &sale.id).await?;
        let fully_returned = sold
            .iter()
            .all(|line| returned.get(&line.id).copied().unwrap_or(0) >= line.quantity);
        if fully_returned && sale.status.can_transition_to(TransactionStatus::Refunded) {
            self.db
                .transactions()
                .set_status(scope, &sale.id, TransactionStatus::Refunded, None)
                .await?;
            debug!(id = %sale.id, "Every line returned, transaction refunded");
        }

        Ok(())
    }

    /// Rejects a pending refund and releases its quantities.
    pub async fn reject_refund(&self, ctx: &RequestContext, refund_id: &str) -> EngineResult<Refund> {
        let refund = write_scope!(self, ctx, "reject_refund", |scope| {
            self.write_refund_rejection(&mut scope, ctx, refund_id).await
        });

        let _entered = ctx.span().enter();
        info!(number = %refund.refund_number, "Refund rejected");
        Ok(refund)
    }

    async fn write_refund_rejection(&self, scope: &mut TxScope, ctx: &RequestContext, refund_id: &str) -> EngineResult<Refund> {
        self.pending_refund(scope, refund_id).await?;
        self.db
            .refunds()
            .set_status(scope, refund_id, RefundStatus::Rejected, ctx.actor(), None)
            .await?;
        Ok(self.db.refunds().get_in(scope, refund_id).await?)
    }

    async fn pending_refund(&self, scope: &mut TxScope, refund_id: &str) -> EngineResult<Refund> {
        let refund = self.db.refunds().lock(scope, refund_id).await?;
        if refund.status != RefundStatus::Pending {
            return Err(CoreError::RefundNotPending {
                number: refund.refund_number,
                status: refund.status.to_string(),
            }
            .into());
        }
        Ok(refund)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn refund(&self, ctx: &RequestContext, refund_id: &str) -> EngineResult<Refund> {
        self.guard(ctx, "get_refund", async { Ok(self.db.refunds().get(refund_id).await?) })
            .await
    }

    /// Every refund of one sale, oldest first.
    pub async fn refunds_for(&self, ctx: &RequestContext, transaction_id: &str) -> EngineResult<Vec<Refund>> {
        self.guard(ctx, "list_refunds", async {
            Ok(self.db.refunds().for_transaction(transaction_id).await?)
        })
        .await
    }
}
