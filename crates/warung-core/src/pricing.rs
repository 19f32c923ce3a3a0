//! # Pricing Evaluator
//!
//! Resolves the unit price of a product for a given quantity.
//!
//! ## Tier Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product B: base 10.000                                                 │
//! │    Grosir        min 10, max 49  →  9.000                               │
//! │    Grosir Besar  min 50, max ∞   →  8.000                               │
//! │                                                                         │
//! │  qty  1..9    → 10.000  "base"                                          │
//! │  qty 10..49   →  9.000  "Grosir"                                        │
//! │  qty 50..     →  8.000  "Grosir Besar"                                  │
//! │                                                                         │
//! │  1. drop inactive tiers                                                 │
//! │  2. order by min_qty DESC, then id ASC (duplicate min_qty)              │
//! │  3. first tier whose [min_qty, max_qty] contains qty wins               │
//! │  4. no match → base price                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pure and total: no stock reads, no clock, no failure path.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{PricingTier, Product};
use crate::BASE_PRICE_LABEL;

/// Outcome of pricing one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PriceQuote {
    pub unit_price: i64,
    /// Tier name, or `"base"` when no tier applies.
    pub tier_label: String,
    pub tier_id: Option<String>,
}

impl PriceQuote {
    /// True when the base price was used.
    pub fn is_base(&self) -> bool {
        self.tier_id.is_none()
    }

    /// Tier name to snapshot on a sale line, `None` for the base price.
    pub fn tier_name(&self) -> Option<String> {
        self.tier_id.as_ref().map(|_| self.tier_label.clone())
    }
}

/// Prices `qty` units of `product` against the tiers loaded on it.
pub fn price_for(product: &Product, qty: i64) -> PriceQuote {
    match select_tier(&product.tiers, qty) {
        Some(tier) => PriceQuote {
            unit_price: tier.price,
            tier_label: tier.name.clone(),
            tier_id: Some(tier.id.clone()),
        },
        None => PriceQuote {
            unit_price: product.base_price,
            tier_label: BASE_PRICE_LABEL.to_string(),
            tier_id: None,
        },
    }
}

/// Picks the winning tier for `qty`, if any.
pub fn select_tier(tiers: &[PricingTier], qty: i64) -> Option<&PricingTier> {
    let mut candidates: Vec<&PricingTier> = tiers.iter().filter(|t| t.is_active).collect();
    candidates.sort_by(|a, b| b.min_qty.cmp(&a.min_qty).then_with(|| a.id.cmp(&b.id)));
    candidates.into_iter().find(|t| t.contains(qty))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tier(id: &str, name: &str, min: i64, max: Option<i64>, price: i64) -> PricingTier {
        PricingTier {
            id: id.into(),
            product_id: "p-b".into(),
            name: name.into(),
            min_qty: min,
            max_qty: max,
            price,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn product(tiers: Vec<PricingTier>) -> Product {
        Product {
            id: "p-b".into(),
            name: "Beras 5kg".into(),
            barcode: None,
            unit: "karung".into(),
            base_price: 10_000,
            cost_price: 7_000,
            stock_tracked: true,
            current_stock: 500,
            min_stock_alert: 10,
            is_active: true,
            is_refillable: false,
            empty_product_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tiers,
        }
    }

    fn wholesale() -> Product {
        product(vec![
            tier("t-1", "Grosir", 10, Some(49), 9_000),
            tier("t-2", "Grosir Besar", 50, None, 8_000),
        ])
    }

    #[test]
    fn test_base_price_below_first_tier() {
        let quote = price_for(&wholesale(), 9);
        assert_eq!(quote.unit_price, 10_000);
        assert_eq!(quote.tier_label, "base");
        assert!(quote.is_base());
        assert_eq!(quote.tier_name(), None);
    }

    #[test]
    fn test_tier_boundaries() {
        let p = wholesale();

        let at_min = price_for(&p, 10);
        assert_eq!(at_min.unit_price, 9_000);
        assert_eq!(at_min.tier_label, "Grosir");
        assert_eq!(at_min.tier_id.as_deref(), Some("t-1"));

        assert_eq!(price_for(&p, 15).unit_price, 9_000);
        assert_eq!(price_for(&p, 49).unit_price, 9_000);
        assert_eq!(price_for(&p, 50).unit_price, 8_000);
        assert_eq!(price_for(&p, 5_000).tier_label, "Grosir Besar");
    }

    #[test]
    fn test_inactive_tier_is_skipped() {
        let mut p = wholesale();
        p.tiers[1].is_active = false;

        // 60 no longer matches "Grosir Besar" and exceeds Grosir's max
        let quote = price_for(&p, 60);
        assert_eq!(quote.unit_price, 10_000);
        assert!(quote.is_base());
    }

    #[test]
    fn test_duplicate_min_qty_resolved_by_id() {
        let p = product(vec![
            tier("t-b", "Dus B", 12, None, 8_500),
            tier("t-a", "Dus A", 12, None, 8_700),
        ]);
        let quote = price_for(&p, 12);
        assert_eq!(quote.tier_id.as_deref(), Some("t-a"));
        assert_eq!(quote.unit_price, 8_700);
    }

    #[test]
    fn test_highest_min_qty_wins_on_overlap() {
        let p = product(vec![
            tier("t-1", "Lusin", 12, None, 9_500),
            tier("t-2", "Dus", 24, Some(100), 9_000),
        ]);
        assert_eq!(price_for(&p, 30).tier_label, "Dus");
        assert_eq!(price_for(&p, 150).tier_label, "Lusin");
    }
}
