//! Shared fixtures for engine tests.

use warung_core::cart::{CartLine, CheckoutInput};
use warung_core::input::{NewContainer, NewCustomer, NewPricingTier, NewProduct};
use warung_core::{Customer, PaymentMethod, Product, RefillableContainer};
use tempfile::TempDir;
use warung_db::{Database, DbConfig, ScopeMode};

use crate::{Engine, EngineConfig, RequestContext};

pub async fn engine() -> Engine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    Engine::new(db, EngineConfig::default())
}

/// Engine over a real database file with a pool of `max_connections`, so
/// write scopes actually race each other. Keep the `TempDir` alive for the
/// length of the test.
pub async fn file_engine(max_connections: u32) -> (TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        database_path: dir.path().join("warung.db"),
        db_max_connections: max_connections,
        ..EngineConfig::default()
    };
    let engine = Engine::connect(config).await.unwrap();
    (dir, engine)
}

pub fn ctx() -> RequestContext {
    RequestContext::new("kasir-1")
}

pub async fn product(engine: &Engine, name: &str, base_price: i64, stock: i64) -> Product {
    engine
        .create_product(
            &ctx(),
            &NewProduct {
                name: name.into(),
                barcode: None,
                unit: "pcs".into(),
                base_price,
                cost_price: base_price * 7 / 10,
                stock_tracked: true,
                initial_stock: stock,
                min_stock_alert: 0,
                is_refillable: false,
                empty_product_id: None,
            },
        )
        .await
        .unwrap()
}

pub async fn untracked_product(engine: &Engine, name: &str, base_price: i64) -> Product {
    engine
        .create_product(
            &ctx(),
            &NewProduct {
                name: name.into(),
                barcode: None,
                unit: "porsi".into(),
                base_price,
                cost_price: 0,
                stock_tracked: false,
                initial_stock: 0,
                min_stock_alert: 0,
                is_refillable: false,
                empty_product_id: None,
            },
        )
        .await
        .unwrap()
}

pub async fn tier(engine: &Engine, product: &Product, name: &str, min_qty: i64, max_qty: Option<i64>, price: i64) {
    engine
        .add_pricing_tier(
            &ctx(),
            &product.id,
            &NewPricingTier {
                name: name.into(),
                min_qty,
                max_qty,
                price,
            },
        )
        .await
        .unwrap();
}

pub async fn container(engine: &Engine, product: &Product, empty: i64, full: i64) -> RefillableContainer {
    engine
        .create_container(
            &ctx(),
            &NewContainer {
                product_id: product.id.clone(),
                container_type: "Tabung 3kg".into(),
                empty_count: empty,
                full_count: full,
                notes: None,
            },
        )
        .await
        .unwrap()
}

/// Customer with `debt` already on the ledger.
pub async fn customer(engine: &Engine, credit_limit: i64, debt: i64) -> Customer {
    let customer = engine
        .create_customer(
            &ctx(),
            &NewCustomer {
                name: "Bu Sri".into(),
                phone: Some("0812-1111-2222".into()),
                credit_limit,
            },
        )
        .await
        .unwrap();

    if debt > 0 {
        let db = engine.db();
        let mut scope = db.begin(ScopeMode::Write).await.unwrap();
        db.kasbon()
            .record_debt(&mut scope, &customer.id, debt, None, Some("saldo awal"), "owner")
            .await
            .unwrap();
        scope.commit().await.unwrap();
    }

    engine.customer(&ctx(), &customer.id).await.unwrap()
}

pub fn cash(items: Vec<CartLine>, amount_paid: i64) -> CheckoutInput {
    CheckoutInput {
        items,
        payment_method: PaymentMethod::Cash,
        amount_paid,
        customer_id: None,
        discount_amount: 0,
        tax_amount: 0,
        notes: None,
        cashier_name: "Kasir 1".into(),
    }
}

pub fn credit(items: Vec<CartLine>, customer: &Customer) -> CheckoutInput {
    CheckoutInput {
        payment_method: PaymentMethod::Credit,
        amount_paid: 0,
        customer_id: Some(customer.id.clone()),
        ..cash(items, 0)
    }
}
