//! # Demo Warung Seeder
//!
//! Fills a database with a small, realistic shop and rings up a few sales
//! through the engine, so every ledger has rows to look at.
//!
//! ## Usage
//! ```bash
//! # Seed ./warung.db (or $WARUNG_DATABASE_PATH)
//! cargo run -p warung-engine --bin seed
//!
//! # Seed a specific file
//! cargo run -p warung-engine --bin seed -- --db ./data/demo.db
//!
//! # Keep the process up until Ctrl+C / SIGTERM (handy with a DB browser)
//! cargo run -p warung-engine --bin seed -- --stay
//! ```
//!
//! ## What Gets Created
//! - Staples with wholesale tiers (beras, gula, minyak)
//! - LPG 3kg with its refillable tabung stock
//! - One kasbon customer with a credit limit
//! - An open drawer, two cash sales, one credit sale, one cancelled sale

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{info, warn};
use warung_core::cart::{CartLine, CheckoutInput};
use warung_core::input::{NewContainer, NewCustomer, NewPricingTier, NewProduct, OpenDrawerInput};
use warung_core::PaymentMethod;
use warung_engine::{init_tracing, Engine, EngineConfig, RequestContext};

/// (name, unit, base price, cost price, opening stock, tiers as (name, min, max, price))
type Staple = (&'static str, &'static str, i64, i64, i64, &'static [(&'static str, i64, Option<i64>, i64)]);

const STAPLES: &[Staple] = &[
    (
        "Beras Pandan Wangi 5kg",
        "karung",
        72_000,
        65_000,
        40,
        &[("Grosir", 5, Some(9), 70_000), ("Grosir Besar", 10, None, 68_000)],
    ),
    (
        "Gula Pasir 1kg",
        "pcs",
        17_000,
        15_000,
        120,
        &[("Grosir", 10, Some(49), 16_000), ("Grosir Besar", 50, None, 15_500)],
    ),
    ("Minyak Goreng 2L", "pcs", 36_000, 32_000, 60, &[("Grosir", 6, None, 34_500)]),
    ("Indomie Goreng", "pcs", 3_500, 2_900, 240, &[("Dus", 40, None, 3_100)]),
    ("Telur Ayam 1kg", "kg", 28_000, 25_500, 30, &[]),
    ("Kopi Kapal Api Sachet", "pcs", 1_500, 1_150, 300, &[("Renceng", 10, None, 1_350)]),
];

struct Args {
    db: Option<PathBuf>,
    stay: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args { db: None, stay: false };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                let Some(path) = args.get(i + 1) else {
                    bail!("--db needs a path");
                };
                parsed.db = Some(PathBuf::from(path));
                i += 1;
            }
            "--stay" => parsed.stay = true,
            "--help" | "-h" => {
                println!("Warung demo seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file (default: $WARUNG_DATABASE_PATH or ./warung.db)");
                println!("      --stay         Wait for Ctrl+C before closing the database");
                println!("  -h, --help         Show this help message");
                return Ok(None);
            }
            other => bail!("unknown argument: {other}"),
        }
        i += 1;
    }
    Ok(Some(parsed))
}

#[tokio::main]
async fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let mut config = EngineConfig::load().context("invalid WARUNG_* configuration")?;
    if let Some(db) = args.db {
        config.database_path = db;
    }
    init_tracing(&config.log_filter);

    info!(path = %config.database_path.display(), "Seeding warung database");
    let engine = Engine::connect(config).await.context("could not open the database")?;
    let ctx = RequestContext::new("seed");

    if !engine.active_products(&ctx, 1).await?.is_empty() {
        warn!("Database already has products, skipping seed");
        engine.shutdown().await;
        return Ok(());
    }

    let summary = seed(&engine, &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if args.stay {
        info!("Seed done, waiting for shutdown signal");
        shutdown_signal().await;
    }
    engine.shutdown().await;
    Ok(())
}

async fn seed(engine: &Engine, ctx: &RequestContext) -> Result<serde_json::Value> {
    // ---- Catalog ----
    let mut products = Vec::new();
    for (name, unit, base_price, cost_price, stock, tiers) in STAPLES {
        let product = engine
            .create_product(
                ctx,
                &NewProduct {
                    name: (*name).into(),
                    barcode: None,
                    unit: (*unit).into(),
                    base_price: *base_price,
                    cost_price: *cost_price,
                    stock_tracked: true,
                    initial_stock: *stock,
                    min_stock_alert: 10,
                    is_refillable: false,
                    empty_product_id: None,
                },
            )
            .await?;
        for (tier_name, min_qty, max_qty, price) in tiers.iter() {
            engine
                .add_pricing_tier(
                    ctx,
                    &product.id,
                    &NewPricingTier {
                        name: (*tier_name).into(),
                        min_qty: *min_qty,
                        max_qty: *max_qty,
                        price: *price,
                    },
                )
                .await?;
        }
        products.push(product);
    }

    let lpg = engine
        .create_product(
            ctx,
            &NewProduct {
                name: "LPG 3kg (isi ulang)".into(),
                barcode: None,
                unit: "tabung".into(),
                base_price: 22_000,
                cost_price: 19_000,
                stock_tracked: true,
                initial_stock: 25,
                min_stock_alert: 5,
                is_refillable: true,
                empty_product_id: None,
            },
        )
        .await?;
    let tabung = engine
        .create_container(
            ctx,
            &NewContainer {
                product_id: lpg.id.clone(),
                container_type: "Tabung 3kg".into(),
                empty_count: 5,
                full_count: 25,
                notes: Some("stok awal".into()),
            },
        )
        .await?;

    let customer = engine
        .create_customer(
            ctx,
            &NewCustomer {
                name: "Bu Siti".into(),
                phone: Some("0812-3456-7890".into()),
                credit_limit: 500_000,
            },
        )
        .await?;

    // ---- Sales ----
    let drawer = engine
        .open_drawer(
            ctx,
            &OpenDrawerInput {
                opening_balance: 200_000,
                notes: Some("modal pagi".into()),
            },
        )
        .await?;

    let by_name = |needle: &str| {
        products
            .iter()
            .find(|p| p.name.starts_with(needle))
            .map(|p| p.id.clone())
            .with_context(|| format!("seed product {needle} missing"))
    };

    let cash_sale = |items: Vec<CartLine>, amount_paid: i64| CheckoutInput {
        items,
        payment_method: PaymentMethod::Cash,
        amount_paid,
        customer_id: None,
        discount_amount: 0,
        tax_amount: 0,
        notes: None,
        cashier_name: "Kasir Pagi".into(),
    };

    let first = engine
        .checkout(
            ctx,
            &cash_sale(
                vec![CartLine::new(by_name("Indomie")?, 5), CartLine::new(by_name("Telur")?, 1)],
                50_000,
            ),
        )
        .await?;
    let wholesale = engine
        .checkout(
            ctx,
            &cash_sale(
                vec![CartLine::new(by_name("Gula")?, 12), CartLine::new(lpg.id.clone(), 2)],
                250_000,
            ),
        )
        .await?;
    let kasbon = engine
        .checkout(
            ctx,
            &CheckoutInput {
                payment_method: PaymentMethod::Credit,
                amount_paid: 0,
                customer_id: Some(customer.id.clone()),
                notes: Some("bayar akhir bulan".into()),
                ..cash_sale(vec![CartLine::new(by_name("Beras")?, 2)], 0)
            },
        )
        .await?;
    let voided = engine
        .checkout(ctx, &cash_sale(vec![CartLine::new(by_name("Minyak")?, 1)], 40_000))
        .await?;
    engine.cancel(ctx, &voided.id).await?;

    let tabung = engine.container(ctx, &tabung.id).await?;
    let debt = engine.kasbon_summary(ctx, &customer.id).await?;
    let drawer_now = engine.current_drawer(ctx).await?;

    Ok(json!({
        "products": products.len() + 1,
        "invoices": [
            first.invoice_number,
            wholesale.invoice_number,
            kasbon.invoice_number,
            voided.invoice_number,
        ],
        "cancelled": voided.invoice_number,
        "tabung": { "empty": tabung.empty_count, "full": tabung.full_count },
        "kasbon": { "customer": debt.customer_name, "balance": debt.current_balance },
        "drawer": {
            "session_id": drawer.id,
            "open": drawer_now.is_some(),
        },
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
