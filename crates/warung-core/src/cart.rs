//! # Cart Math
//!
//! Line pricing, header totals and payment settlement for a checkout.
//! Everything the orchestrator computes between locking rows and writing
//! them lives here, so `calculate` and `checkout` share one code path.
//!
//! ## Checkout Arithmetic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per line                                                               │
//! │    unit_price  = price_for(product, qty)                                │
//! │    subtotal    = unit_price × qty                                       │
//! │    total       = subtotal − line_discount                               │
//! │                                                                         │
//! │  header                                                                 │
//! │    subtotal    = Σ line.total                                           │
//! │    total       = subtotal − discount + tax                              │
//! │                                                                         │
//! │  payment                                                                │
//! │    cash        amount_paid ≥ total, change = amount_paid − total        │
//! │    credit      amount_paid = 0, change = 0, debt += total               │
//! │    transfer    completed when amount_paid ≥ total, else pending         │
//! │    qris        same as transfer                                         │
//! │    mixed       rejected                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::pricing::{price_for, PriceQuote};
use crate::types::{PaymentMethod, Product, TransactionStatus};
use crate::validation::{validate_cart_size, validate_non_negative, validate_quantity};
use crate::MAX_CART_ITEMS;

// =============================================================================
// Input
// =============================================================================

/// One requested line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub discount_amount: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            discount_amount: 0,
            notes: None,
        }
    }

    pub fn with_discount(mut self, discount_amount: i64) -> Self {
        self.discount_amount = discount_amount;
        self
    }

    fn validate(&self) -> CoreResult<()> {
        if self.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product_id".to_string(),
            }
            .into());
        }
        validate_quantity(self.quantity)?;
        validate_non_negative("discount_amount", self.discount_amount)?;
        Ok(())
    }
}

/// A checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutInput {
    pub items: Vec<CartLine>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub discount_amount: i64,
    #[serde(default)]
    pub tax_amount: i64,
    #[serde(default)]
    pub notes: Option<String>,
    pub cashier_name: String,
}

impl CheckoutInput {
    /// Checks everything that can be checked without the database.
    ///
    /// Runs before the atomic scope is opened.
    pub fn validate(&self) -> CoreResult<()> {
        validate_cart(&self.items)?;

        if self.payment_method == PaymentMethod::Mixed {
            return Err(CoreError::UnsupportedPaymentMethod(
                self.payment_method.to_string(),
            ));
        }

        if self.payment_method == PaymentMethod::Credit
            && self.customer_id.as_deref().map_or(true, |id| id.trim().is_empty())
        {
            return Err(ValidationError::Required {
                field: "customer_id".to_string(),
            }
            .into());
        }

        validate_non_negative("amount_paid", self.amount_paid)?;
        validate_non_negative("discount_amount", self.discount_amount)?;
        validate_non_negative("tax_amount", self.tax_amount)?;
        Ok(())
    }

    /// Lines paired with their cart position, in row-lock order.
    ///
    /// Sorted by product id so concurrent checkouts lock in the same order;
    /// ties keep cart order.
    pub fn lines_in_lock_order(&self) -> Vec<(i64, &CartLine)> {
        let mut lines: Vec<(i64, &CartLine)> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, line)| (i as i64 + 1, line))
            .collect();
        lines.sort_by(|a, b| a.1.product_id.cmp(&b.1.product_id).then(a.0.cmp(&b.0)));
        lines
    }
}

/// A preview request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CalculateInput {
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub discount_amount: i64,
    #[serde(default)]
    pub tax_amount: i64,
}

impl CalculateInput {
    pub fn validate(&self) -> CoreResult<()> {
        validate_cart(&self.items)?;
        validate_non_negative("discount_amount", self.discount_amount)?;
        validate_non_negative("tax_amount", self.tax_amount)?;
        Ok(())
    }
}

/// A request to park a cart without selling it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HoldCartInput {
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl HoldCartInput {
    pub fn validate(&self) -> CoreResult<()> {
        validate_cart(&self.items)
    }
}

fn validate_cart(items: &[CartLine]) -> CoreResult<()> {
    if items.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    if validate_cart_size(items.len()).is_err() {
        return Err(CoreError::CartTooLarge {
            max: MAX_CART_ITEMS,
        });
    }
    items.iter().try_for_each(CartLine::validate)
}

// =============================================================================
// Priced Lines
// =============================================================================

/// A line after pricing, with the product snapshot taken at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub line_no: i64,
    pub product_id: String,
    pub product_name: String,
    pub product_barcode: Option<String>,
    pub quantity: i64,
    pub unit: String,
    pub cost_price: i64,
    pub quote: PriceQuote,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub notes: Option<String>,
}

/// Prices one cart line against a loaded product.
///
/// Fails when the line discount exceeds the line subtotal.
pub fn price_line(product: &Product, line: &CartLine, line_no: i64) -> CoreResult<PricedLine> {
    let quote = price_for(product, line.quantity);
    let subtotal = Money::new(quote.unit_price).multiply_quantity(line.quantity);

    if line.discount_amount > subtotal.amount() {
        return Err(ValidationError::OutOfRange {
            field: "discount_amount".to_string(),
            min: 0,
            max: subtotal.amount(),
        }
        .into());
    }
    let total = subtotal - Money::new(line.discount_amount);

    Ok(PricedLine {
        line_no,
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        product_barcode: product.barcode.clone(),
        quantity: line.quantity,
        unit: product.unit.clone(),
        cost_price: product.cost_price,
        quote,
        subtotal: subtotal.amount(),
        discount_amount: line.discount_amount,
        total_amount: total.amount(),
        notes: line.notes.clone(),
    })
}

// =============================================================================
// Totals & Settlement
// =============================================================================

/// Header amounts of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    pub subtotal: i64,
    pub discount_amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
}

impl CartTotals {
    /// Sums line totals and applies the header discount and tax.
    pub fn compute(
        line_totals: impl IntoIterator<Item = i64>,
        discount_amount: i64,
        tax_amount: i64,
    ) -> CoreResult<Self> {
        let subtotal: Money = line_totals.into_iter().map(Money::new).sum();
        let total = subtotal - Money::new(discount_amount) + Money::new(tax_amount);

        if total.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "discount_amount".to_string(),
                min: 0,
                max: (subtotal + Money::new(tax_amount)).amount(),
            }
            .into());
        }

        Ok(Self {
            subtotal: subtotal.amount(),
            discount_amount,
            tax_amount,
            total_amount: total.amount(),
        })
    }
}

/// Payment leg outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub amount_paid: i64,
    pub change_amount: i64,
    pub status: TransactionStatus,
}

/// Settles the payment leg for `total`.
///
/// Credit limit checks need the locked customer row and happen in the
/// credit ledger, not here.
pub fn settle_payment(method: PaymentMethod, amount_paid: i64, total: i64) -> CoreResult<Settlement> {
    match method {
        PaymentMethod::Cash => {
            if amount_paid < total {
                return Err(CoreError::InvalidPaymentAmount {
                    reason: format!(
                        "amount paid {} is less than total {}",
                        Money::new(amount_paid),
                        Money::new(total)
                    ),
                });
            }
            Ok(Settlement {
                amount_paid,
                change_amount: amount_paid - total,
                status: TransactionStatus::Completed,
            })
        }
        PaymentMethod::Credit => Ok(Settlement {
            amount_paid: 0,
            change_amount: 0,
            status: TransactionStatus::Completed,
        }),
        PaymentMethod::Transfer | PaymentMethod::Qris => Ok(Settlement {
            amount_paid,
            change_amount: 0,
            status: if amount_paid >= total {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Pending
            },
        }),
        PaymentMethod::Mixed => Err(CoreError::UnsupportedPaymentMethod(method.to_string())),
    }
}

// =============================================================================
// Preview
// =============================================================================

/// One line of a `calculate` preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PreviewLine {
    pub line_no: i64,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit: String,
    pub unit_price: i64,
    pub tier_label: String,
    pub pricing_tier_id: Option<String>,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub is_available: bool,
    /// Current stock, only for tracked products.
    pub available_qty: Option<i64>,
}

impl PreviewLine {
    pub fn from_priced(line: PricedLine, product: &Product) -> Self {
        PreviewLine {
            line_no: line.line_no,
            product_id: line.product_id,
            product_name: line.product_name,
            quantity: line.quantity,
            unit: line.unit,
            unit_price: line.quote.unit_price,
            tier_label: line.quote.tier_label,
            pricing_tier_id: line.quote.tier_id,
            subtotal: line.subtotal,
            discount_amount: line.discount_amount,
            total_amount: line.total_amount,
            is_available: product.can_sell(line.quantity),
            available_qty: product.stock_tracked.then_some(product.current_stock),
        }
    }
}

/// Result of `calculate`: priced lines plus products that could not be priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartPreview {
    pub lines: Vec<PreviewLine>,
    /// Requested products that are missing or inactive.
    pub unavailable_product_ids: Vec<String>,
    pub totals: CartTotals,
    /// True when every line is priced and in stock.
    pub can_checkout: bool,
}

impl CartPreview {
    pub fn build(
        mut lines: Vec<PreviewLine>,
        unavailable_product_ids: Vec<String>,
        discount_amount: i64,
        tax_amount: i64,
    ) -> CoreResult<Self> {
        lines.sort_by_key(|l| l.line_no);
        let totals = CartTotals::compute(
            lines.iter().map(|l| l.total_amount),
            discount_amount,
            tax_amount,
        )?;
        let can_checkout =
            unavailable_product_ids.is_empty() && lines.iter().all(|l| l.is_available);
        Ok(Self {
            lines,
            unavailable_product_ids,
            totals,
            can_checkout,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PricingTier;
    use chrono::Utc;

    fn product(id: &str, base: i64, stock: i64) -> Product {
        Product {
            id: id.into(),
            name: format!("Produk {id}"),
            barcode: Some("8991234567890".into()),
            unit: "pcs".into(),
            base_price: base,
            cost_price: base * 7 / 10,
            stock_tracked: true,
            current_stock: stock,
            min_stock_alert: 5,
            is_active: true,
            is_refillable: false,
            empty_product_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tiers: vec![],
        }
    }

    fn checkout(items: Vec<CartLine>, method: PaymentMethod) -> CheckoutInput {
        CheckoutInput {
            items,
            payment_method: method,
            amount_paid: 0,
            customer_id: None,
            discount_amount: 0,
            tax_amount: 0,
            notes: None,
            cashier_name: "Andi".into(),
        }
    }

    #[test]
    fn test_validate_rejects_empty_cart() {
        let input = checkout(vec![], PaymentMethod::Cash);
        assert_eq!(input.validate(), Err(CoreError::EmptyCart));
    }

    #[test]
    fn test_validate_credit_requires_customer() {
        let input = checkout(vec![CartLine::new("p", 1)], PaymentMethod::Credit);
        assert_eq!(input.validate().unwrap_err().code(), "validation");

        let mut with_customer = input.clone();
        with_customer.customer_id = Some("c-1".into());
        assert!(with_customer.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_mixed() {
        let input = checkout(vec![CartLine::new("p", 1)], PaymentMethod::Mixed);
        let err = input.validate().unwrap_err();
        assert_eq!(err.code(), "unsupported_payment_method");
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_hold_rejects_empty_cart() {
        assert_eq!(HoldCartInput::default().validate(), Err(CoreError::EmptyCart));
        let held = HoldCartInput {
            items: vec![CartLine::new("p", 2)],
            ..Default::default()
        };
        assert!(held.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_quantity() {
        let input = checkout(vec![CartLine::new("p", 0)], PaymentMethod::Cash);
        assert!(matches!(input.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_lock_order_sorted_by_product_id() {
        let input = checkout(
            vec![
                CartLine::new("c", 1),
                CartLine::new("a", 2),
                CartLine::new("b", 3),
                CartLine::new("a", 4),
            ],
            PaymentMethod::Cash,
        );
        let order: Vec<(i64, &str)> = input
            .lines_in_lock_order()
            .into_iter()
            .map(|(no, l)| (no, l.product_id.as_str()))
            .collect();
        assert_eq!(order, vec![(2, "a"), (4, "a"), (3, "b"), (1, "c")]);
    }

    #[test]
    fn test_price_line_with_tier_and_discount() {
        let mut p = product("b", 10_000, 100);
        p.tiers.push(PricingTier {
            id: "t-1".into(),
            product_id: "b".into(),
            name: "Grosir".into(),
            min_qty: 10,
            max_qty: Some(49),
            price: 9_000,
            is_active: true,
            created_at: Utc::now(),
        });

        let line = price_line(&p, &CartLine::new("b", 15).with_discount(5_000), 1).unwrap();
        assert_eq!(line.quote.unit_price, 9_000);
        assert_eq!(line.subtotal, 135_000);
        assert_eq!(line.total_amount, 130_000);
        assert_eq!(line.quote.tier_name().as_deref(), Some("Grosir"));
    }

    #[test]
    fn test_price_line_rejects_oversized_discount() {
        let p = product("a", 1_000, 10);
        assert!(price_line(&p, &CartLine::new("a", 2).with_discount(2_001), 1).is_err());
    }

    #[test]
    fn test_totals() {
        let totals = CartTotals::compute([30_000, 135_000], 5_000, 1_500).unwrap();
        assert_eq!(totals.subtotal, 165_000);
        assert_eq!(totals.total_amount, 161_500);

        assert!(CartTotals::compute([1_000], 2_000, 0).is_err());
    }

    #[test]
    fn test_settle_cash() {
        let exact = settle_payment(PaymentMethod::Cash, 30_000, 30_000).unwrap();
        assert_eq!(exact.change_amount, 0);
        assert_eq!(exact.status, TransactionStatus::Completed);

        let with_change = settle_payment(PaymentMethod::Cash, 50_000, 30_000).unwrap();
        assert_eq!(with_change.change_amount, 20_000);

        let short = settle_payment(PaymentMethod::Cash, 29_999, 30_000).unwrap_err();
        assert_eq!(short.code(), "invalid_payment_amount");
    }

    #[test]
    fn test_settle_credit_and_gateway() {
        let credit = settle_payment(PaymentMethod::Credit, 99_000, 50_000).unwrap();
        assert_eq!((credit.amount_paid, credit.change_amount), (0, 0));

        let pending = settle_payment(PaymentMethod::Qris, 0, 50_000).unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);

        let paid = settle_payment(PaymentMethod::Transfer, 50_000, 50_000).unwrap();
        assert_eq!(paid.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_preview_marks_short_stock() {
        let p = product("c", 2_000, 10);
        let priced = price_line(&p, &CartLine::new("c", 15), 1).unwrap();
        let line = PreviewLine::from_priced(priced, &p);
        assert!(!line.is_available);
        assert_eq!(line.available_qty, Some(10));

        let preview = CartPreview::build(vec![line], vec!["gone".into()], 0, 0).unwrap();
        assert_eq!(preview.totals.total_amount, 30_000);
        assert!(!preview.can_checkout);
    }
}
