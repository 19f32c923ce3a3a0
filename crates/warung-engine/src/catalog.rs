//! Catalog operations: products, pricing tiers, customers.

use warung_core::input::{NewCustomer, NewPricingTier, NewProduct};
use warung_core::{Customer, PricingTier, Product, ShoppingListItem};

use crate::context::RequestContext;
use crate::engine::Engine;
use crate::error::EngineResult;

impl Engine {
    /// Creates a product; a non-zero tracked opening stock is written as an
    /// `initial` movement.
    pub async fn create_product(&self, ctx: &RequestContext, input: &NewProduct) -> EngineResult<Product> {
        input.validate()?;
        let product = write_scope!(self, ctx, "create_product", |scope| {
            self.db.products().create_in(&mut scope, input, ctx.actor()).await
        });
        Ok(product)
    }

    pub async fn product(&self, ctx: &RequestContext, product_id: &str) -> EngineResult<Product> {
        self.guard(ctx, "get_product", async { Ok(self.db.products().get(product_id).await?) })
            .await
    }

    pub async fn active_products(&self, ctx: &RequestContext, limit: i64) -> EngineResult<Vec<Product>> {
        self.guard(ctx, "list_products", async {
            Ok(self.db.products().list_active(limit).await?)
        })
        .await
    }

    pub async fn deactivate_product(&self, ctx: &RequestContext, product_id: &str) -> EngineResult<()> {
        write_scope!(self, ctx, "deactivate_product", |scope| {
            self.db.products().deactivate_in(&mut scope, product_id).await
        });
        Ok(())
    }

    pub async fn add_pricing_tier(
        &self,
        ctx: &RequestContext,
        product_id: &str,
        input: &NewPricingTier,
    ) -> EngineResult<PricingTier> {
        input.validate()?;
        let tier = write_scope!(self, ctx, "add_pricing_tier", |scope| {
            self.db.products().add_tier_in(&mut scope, product_id, input).await
        });
        Ok(tier)
    }

    /// Tracked products at or under their alert level, with reorder suggestions.
    pub async fn shopping_list(&self, ctx: &RequestContext) -> EngineResult<Vec<ShoppingListItem>> {
        self.guard(ctx, "shopping_list", async { Ok(self.db.products().low_stock().await?) })
            .await
    }

    pub async fn create_customer(&self, ctx: &RequestContext, input: &NewCustomer) -> EngineResult<Customer> {
        input.validate()?;
        let customer = write_scope!(self, ctx, "create_customer", |scope| {
            self.db.customers().create_in(&mut scope, input).await
        });
        Ok(customer)
    }

    pub async fn customer(&self, ctx: &RequestContext, customer_id: &str) -> EngineResult<Customer> {
        self.guard(ctx, "get_customer", async {
            Ok(self.db.customers().get(customer_id).await?)
        })
        .await
    }

    pub async fn deactivate_customer(&self, ctx: &RequestContext, customer_id: &str) -> EngineResult<()> {
        write_scope!(self, ctx, "deactivate_customer", |scope| {
            self.db.customers().deactivate_in(&mut scope, customer_id).await
        });
        Ok(())
    }

    /// Active customers that owe something, largest debt first.
    pub async fn debtors(&self, ctx: &RequestContext) -> EngineResult<Vec<Customer>> {
        self.guard(ctx, "debtors", async { Ok(self.db.customers().with_debt().await?) })
            .await
    }
}
