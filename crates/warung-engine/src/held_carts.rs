//! Parked carts.
//!
//! A held cart is priced with the same tier rules as checkout and keeps that
//! quote as a snapshot, but moves no stock and writes no ledger entry.
//! Resuming hands the lines back; the cashier then checks them out at the
//! prices in force at that moment.

use chrono::{Local, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use warung_core::cart::{price_line, CartTotals, HoldCartInput};
use warung_core::numbering::DocumentKind;
use warung_core::{CoreError, HeldCart, HeldCartItem, HeldCartStatus};
use warung_db::TxScope;

use crate::context::RequestContext;
use crate::engine::Engine;
use crate::error::EngineResult;

impl Engine {
    /// Prices a cart and parks it under a fresh `HLD-` code.
    pub async fn hold_cart(&self, ctx: &RequestContext, input: &HoldCartInput) -> EngineResult<HeldCart> {
        input.validate()?;

        let cart_id = write_scope!(self, ctx, "hold_cart", |scope| {
            self.write_hold(&mut scope, ctx, input).await
        });

        let cart = self.db.held_carts().get(&cart_id).await?;
        let _entered = ctx.span().enter();
        info!(id = %cart.id, code = %cart.hold_code, subtotal = cart.subtotal, lines = cart.items.len(), "Cart held");
        Ok(cart)
    }

    async fn write_hold(&self, scope: &mut TxScope, ctx: &RequestContext, input: &HoldCartInput) -> EngineResult<String> {
        let customer_name = match input.customer_id.as_deref() {
            Some(customer_id) => {
                let customer = self.db.customers().lock(scope, customer_id).await?;
                if !customer.is_active {
                    return Err(CoreError::CustomerInactive { name: customer.name }.into());
                }
                Some(customer.name)
            }
            None => None,
        };

        let cart_id = Uuid::new_v4().to_string();
        let mut items = Vec::with_capacity(input.items.len());
        for (idx, line) in input.items.iter().enumerate() {
            let product = self.db.products().lock(scope, &line.product_id).await?;
            if !product.is_active {
                return Err(CoreError::ProductInactive { name: product.name }.into());
            }

            let priced = price_line(&product, line, idx as i64 + 1)?;
            debug!(product_id = %product.id, qty = line.quantity, tier = %priced.quote.tier_label, "Held line priced");

            items.push(HeldCartItem {
                id: Uuid::new_v4().to_string(),
                cart_id: cart_id.clone(),
                line_no: priced.line_no,
                product_id: priced.product_id,
                product_name: priced.product_name,
                product_barcode: priced.product_barcode,
                quantity: priced.quantity,
                unit: priced.unit,
                unit_price: priced.quote.unit_price,
                discount_amount: priced.discount_amount,
                total_amount: priced.total_amount,
                notes: priced.notes,
            });
        }
        let totals = CartTotals::compute(items.iter().map(|item| item.total_amount), 0, 0)?;

        let today = Local::now().date_naive();
        let seq = scope.next_sequence(&DocumentKind::HeldCart.sequence_name(today)).await?;

        let now = Utc::now();
        let cart = HeldCart {
            id: cart_id.clone(),
            hold_code: DocumentKind::HeldCart.format(today, seq),
            customer_id: input.customer_id.clone(),
            customer_name,
            status: HeldCartStatus::Held,
            subtotal: totals.subtotal,
            notes: input.notes.clone(),
            held_by: ctx.actor().to_string(),
            resumed_by: None,
            held_at: now,
            resumed_at: None,
            updated_at: now,
            items,
        };
        self.db.held_carts().insert(scope, &cart).await?;

        Ok(cart_id)
    }

    /// Takes a cart off hold and returns it with its lines.
    ///
    /// Use [`HeldCart::cart_lines`] to build the checkout request.
    pub async fn resume_cart(&self, ctx: &RequestContext, cart_id: &str) -> EngineResult<HeldCart> {
        let cart = write_scope!(self, ctx, "resume_cart", |scope| {
            self.leave_hold(&mut scope, ctx, cart_id, HeldCartStatus::Resumed).await
        });

        let _entered = ctx.span().enter();
        info!(code = %cart.hold_code, "Held cart resumed");
        Ok(cart)
    }

    pub async fn discard_held_cart(&self, ctx: &RequestContext, cart_id: &str) -> EngineResult<()> {
        let cart = write_scope!(self, ctx, "discard_held_cart", |scope| {
            self.leave_hold(&mut scope, ctx, cart_id, HeldCartStatus::Discarded).await
        });

        let _entered = ctx.span().enter();
        info!(code = %cart.hold_code, "Held cart discarded");
        Ok(())
    }

    async fn leave_hold(
        &self,
        scope: &mut TxScope,
        ctx: &RequestContext,
        cart_id: &str,
        next: HeldCartStatus,
    ) -> EngineResult<HeldCart> {
        let cart = self.db.held_carts().lock(scope, cart_id).await?;
        if cart.status != HeldCartStatus::Held {
            return Err(CoreError::CartNotHeld {
                code: cart.hold_code,
                status: cart.status.to_string(),
            }
            .into());
        }

        self.db.held_carts().set_status(scope, cart_id, next, ctx.actor()).await?;
        Ok(self.db.held_carts().get_in(scope, cart_id).await?)
    }

    /// Carts still on hold, newest first, without lines.
    pub async fn held_carts(&self, ctx: &RequestContext) -> EngineResult<Vec<HeldCart>> {
        self.guard(ctx, "list_held_carts", async { Ok(self.db.held_carts().list_held().await?) })
            .await
    }

    pub async fn held_cart(&self, ctx: &RequestContext, cart_id: &str) -> EngineResult<HeldCart> {
        self.guard(ctx, "get_held_cart", async { Ok(self.db.held_carts().get(cart_id).await?) })
            .await
    }
}
