//! # Domain Types
//!
//! Core domain types used throughout the warung backend.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Catalog            Ledgers                    Sales                    │
//! │  ─────────────      ─────────────────────      ─────────────────────    │
//! │  Product            StockMovement        (C2)  Transaction              │
//! │  PricingTier        RefillableContainer  (C3)  TransactionItem          │
//! │  Customer           ContainerMovement    (C3)  PaymentMethod            │
//! │                     KasbonEntry          (C4)  TransactionStatus        │
//! │                     DrawerSession        (C5)                           │
//! │                     CashFlowRecord       (C5)  Reconciliation           │
//! │                                                ─────────────────────    │
//! │                                                OpnameSession     (C8)   │
//! │                                                OpnameItem        (C8)   │
//! │                                                                         │
//! │  Counter                                                                │
//! │  ─────────────────────                                                  │
//! │  HeldCart, HeldCartItem                                                 │
//! │  Refund, RefundItem                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conventions
//! - `id`: UUID v4 string, immutable, used for relations
//! - Business ids (`invoice_number`, `session_code`) are human-readable
//! - Money columns are `i64` minor units; arithmetic goes through [`Money`]
//! - Ledger rows carry `*_before` / `*_after` snapshots so a reader can
//!   replay the running balance without the parent row

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::CartLine;
use crate::money::Money;

// =============================================================================
// Product & Pricing Tier
// =============================================================================

/// A product available for sale.
///
/// `current_stock` may only go negative when `stock_tracked` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Barcode (EAN-13 etc.), if the product carries one.
    pub barcode: Option<String>,

    /// Unit label ("pcs", "kg", "tabung").
    pub unit: String,

    /// Price when no tier applies.
    pub base_price: i64,

    /// Purchase cost, snapshotted onto sale lines for margin reports.
    pub cost_price: i64,

    /// Whether sales deduct stock and may fail for lack of it.
    pub stock_tracked: bool,

    /// Units on hand.
    pub current_stock: i64,

    /// Threshold for the low-stock shopping list.
    pub min_stock_alert: i64,

    /// Soft delete flag.
    pub is_active: bool,

    /// Whether units come as exchangeable empty/full pairs.
    pub is_refillable: bool,

    /// Product that represents the empty counterpart, if modelled.
    pub empty_product_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Pricing tiers, loaded separately by the catalog repository.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub tiers: Vec<PricingTier>,
}

impl Product {
    /// Returns true when `qty` can be sold from the current stock.
    ///
    /// Untracked products can always be sold.
    pub fn can_sell(&self, qty: i64) -> bool {
        !self.stock_tracked || self.current_stock >= qty
    }

    /// Base price as [`Money`].
    pub fn base_price(&self) -> Money {
        Money::new(self.base_price)
    }

    /// True when stock is tracked and at or under the alert threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock_tracked && self.current_stock <= self.min_stock_alert
    }
}

/// A quantity-band price rule belonging to a product.
///
/// ## Example
/// ```text
/// min 10, max 49, price 9.000  → "Grosir"
/// min 50, max ∞,  price 8.000  → "Grosir Besar"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PricingTier {
    pub id: String,
    pub product_id: String,
    /// Label surfaced on the line ("Grosir", "Eceran").
    pub name: String,
    /// Inclusive lower bound, at least 1.
    pub min_qty: i64,
    /// Inclusive upper bound, `None` means unbounded.
    pub max_qty: Option<i64>,
    /// Unit price within the band.
    pub price: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PricingTier {
    /// Returns true when `qty` falls inside `[min_qty, max_qty]`.
    pub fn contains(&self, qty: i64) -> bool {
        qty >= self.min_qty && self.max_qty.map_or(true, |max| qty <= max)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer who may buy on store credit (kasbon).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Maximum debt. Zero means unlimited.
    pub credit_limit: i64,
    /// Running balance, equal to Σ debt − Σ payment over the ledger.
    pub current_debt: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Returns true when a new debt of `amount` stays within the limit.
    ///
    /// ## Rule
    /// ```text
    /// credit_limit == 0                      → always allowed
    /// current_debt + amount <= credit_limit  → allowed
    /// otherwise                              → credit_limit_exceeded
    /// ```
    pub fn can_incur(&self, amount: i64) -> bool {
        self.credit_limit == 0 || self.current_debt + amount <= self.credit_limit
    }

    /// Remaining credit, `-1` when unlimited, never below zero otherwise.
    pub fn remaining_credit(&self) -> i64 {
        if self.credit_limit == 0 {
            -1
        } else {
            (self.credit_limit - self.current_debt).max(0)
        }
    }
}

// =============================================================================
// Inventory Ledger (C2)
// =============================================================================

/// Kind of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementKind {
    /// Opening balance when the product is created.
    Initial,
    /// Restock from a supplier.
    Purchase,
    /// Deduction by a checkout.
    Sale,
    /// Manual or opname-driven correction.
    Adjustment,
    /// Stock coming back, e.g. a cancelled sale.
    Return,
    /// Shrinkage written off.
    Damage,
    TransferIn,
    TransferOut,
}

impl StockMovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockMovementKind::Initial => "initial",
            StockMovementKind::Purchase => "purchase",
            StockMovementKind::Sale => "sale",
            StockMovementKind::Adjustment => "adjustment",
            StockMovementKind::Return => "return",
            StockMovementKind::Damage => "damage",
            StockMovementKind::TransferIn => "transfer_in",
            StockMovementKind::TransferOut => "transfer_out",
        }
    }
}

/// An append-only stock ledger row.
///
/// Invariant: `stock_after = stock_before + quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub kind: StockMovementKind,
    /// Signed change in units.
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    /// What caused the movement ("transaction", "stock_opname", ...).
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub cost_per_unit: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Aggregate stock figures over active products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockReport {
    pub total_products: i64,
    /// Σ current_stock × cost_price.
    pub total_stock_value: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
}

/// One entry of the restock shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ShoppingListItem {
    pub product_id: String,
    pub product_name: String,
    pub barcode: Option<String>,
    pub current_stock: i64,
    pub min_stock_alert: i64,
    pub suggested_qty: i64,
    pub estimated_cost: i64,
}

// =============================================================================
// Refillable Ledger (C3)
// =============================================================================

/// Paired empty/full counts backing a refillable product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RefillableContainer {
    pub id: String,
    /// The "full" product that is sold.
    pub product_id: String,
    /// Free-form type label ("LPG 3kg", "Galon 19L").
    pub container_type: String,
    pub empty_count: i64,
    pub full_count: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Kind of a container movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ContainerMovementKind {
    /// Customer hands in an empty and leaves with a full.
    SaleExchange,
    /// Supplier takes empties and delivers fulls.
    RestockExchange,
    PurchaseEmpty,
    PurchaseFull,
    ReturnEmpty,
    Adjustment,
}

/// An append-only container ledger row.
///
/// Invariant: `*_after = *_before + *_change` for both sides, never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ContainerMovement {
    pub id: String,
    pub container_id: String,
    pub kind: ContainerMovementKind,
    pub empty_change: i64,
    pub full_change: i64,
    pub empty_before: i64,
    pub empty_after: i64,
    pub full_before: i64,
    pub full_after: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Credit Ledger (C4)
// =============================================================================

/// Kind of a kasbon entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum KasbonKind {
    /// New debt (hutang).
    Debt,
    /// Repayment (pembayaran).
    Payment,
}

/// An append-only credit ledger row.
///
/// Invariant: `balance_after = balance_before ± amount` by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct KasbonEntry {
    pub id: String,
    pub customer_id: String,
    pub transaction_id: Option<String>,
    pub kind: KasbonKind,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Running balance view of one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct KasbonSummary {
    pub customer_id: String,
    pub customer_name: String,
    pub total_debt: i64,
    pub total_payment: i64,
    pub current_balance: i64,
    pub credit_limit: i64,
    /// `-1` when the limit is unlimited.
    pub remaining_credit: i64,
    #[ts(as = "Option<String>")]
    pub last_transaction_at: Option<DateTime<Utc>>,
}

/// Outstanding kasbon across all active customers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KasbonReport {
    pub total_outstanding: i64,
    pub total_customers: i64,
    pub customers_with_debt: i64,
    /// Top debtors, largest balance first.
    pub top_debtors: Vec<KasbonSummary>,
}

// =============================================================================
// Sales (C6)
// =============================================================================

/// How a checkout is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash, change is returned.
    Cash,
    /// Store credit, posted to the customer's kasbon.
    #[serde(alias = "kasbon")]
    Credit,
    /// Bank transfer, may settle later through the gateway.
    Transfer,
    /// QRIS, may settle later through the gateway.
    Qris,
    /// Declared but has no checkout path.
    Mixed,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Credit => "credit",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Qris => "qris",
            PaymentMethod::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a sale.
///
/// ## State Machine
/// ```text
///   pending ──► completed ──► cancelled
///      │            │
///      │            └───────► refunded
///      └──────────────────────► cancelled
/// ```
/// No transition leaves `cancelled` or `refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Waiting for the payment gateway.
    #[default]
    Pending,
    Completed,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// Returns true when the state machine allows `self → next`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Cancelled) | (Completed, Cancelled) | (Completed, Refunded)
        )
    }

    /// Cancelled and refunded sales never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Cancelled | TransactionStatus::Refunded)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sale header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    /// `INV-YYYYMMDD-NNNN`.
    pub invoice_number: String,
    pub customer_id: Option<String>,
    /// Σ line totals.
    pub subtotal: i64,
    pub discount_amount: i64,
    pub tax_amount: i64,
    /// subtotal − discount + tax.
    pub total_amount: i64,
    pub payment_method: PaymentMethod,
    pub amount_paid: i64,
    pub change_amount: i64,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub cashier_name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Lines in cart order.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<TransactionItem>,
}

/// A sale line.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransactionItem {
    pub id: String,
    pub transaction_id: String,
    /// Position of the line in the submitted cart.
    pub line_no: i64,
    pub product_id: String,
    pub product_name: String,
    pub product_barcode: Option<String>,
    pub quantity: i64,
    pub unit: String,
    pub unit_price: i64,
    pub cost_price: i64,
    /// unit_price × quantity.
    pub subtotal: i64,
    pub discount_amount: i64,
    /// subtotal − discount_amount.
    pub total_amount: i64,
    pub pricing_tier_id: Option<String>,
    pub pricing_tier_name: Option<String>,
    pub notes: Option<String>,
}

impl TransactionItem {
    /// Gross profit of the line at the snapshotted cost.
    pub fn profit(&self) -> i64 {
        self.total_amount - self.cost_price * self.quantity
    }
}

/// Completed sales for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailySummary {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub transaction_count: i64,
    pub total_sales: i64,
    pub gross_profit: i64,
}

// =============================================================================
// Held Carts
// =============================================================================

/// Held cart status.
///
/// ```text
///   held ──► resumed
///     └────► discarded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum HeldCartStatus {
    Held,
    Resumed,
    Discarded,
}

impl HeldCartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeldCartStatus::Held => "held",
            HeldCartStatus::Resumed => "resumed",
            HeldCartStatus::Discarded => "discarded",
        }
    }
}

impl std::fmt::Display for HeldCartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cart parked at the counter while the customer fetches one more thing.
///
/// Holding a cart prices it but moves no stock; the cashier checks it out
/// later through the normal checkout path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct HeldCart {
    pub id: String,
    /// `HLD-YYYYMMDD-NNNN`.
    pub hold_code: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub status: HeldCartStatus,
    /// Σ line totals at hold time.
    pub subtotal: i64,
    pub notes: Option<String>,
    pub held_by: String,
    pub resumed_by: Option<String>,
    #[ts(as = "String")]
    pub held_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub resumed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<HeldCartItem>,
}

/// A parked line with the price it was quoted at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct HeldCartItem {
    pub id: String,
    pub cart_id: String,
    pub line_no: i64,
    pub product_id: String,
    pub product_name: String,
    pub product_barcode: Option<String>,
    pub quantity: i64,
    pub unit: String,
    pub unit_price: i64,
    pub discount_amount: i64,
    /// unit_price × quantity − discount_amount.
    pub total_amount: i64,
    pub notes: Option<String>,
}

impl HeldCart {
    /// Lines to hand back to checkout. Prices are recomputed there.
    pub fn cart_lines(&self) -> Vec<CartLine> {
        self.items
            .iter()
            .map(|item| CartLine {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                discount_amount: item.discount_amount,
                notes: item.notes.clone(),
            })
            .collect()
    }
}

// =============================================================================
// Refunds
// =============================================================================

/// Refund request status.
///
/// ```text
///   pending ──► completed   (stock, kasbon and drawer updated)
///      └──────► rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
    Rejected,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Completed => "completed",
            RefundStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to return goods from a completed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Refund {
    pub id: String,
    /// `REF-YYYYMMDD-NNNN`.
    pub refund_number: String,
    pub transaction_id: String,
    pub customer_id: Option<String>,
    /// Paid back the way the sale was paid.
    pub refund_method: PaymentMethod,
    /// Σ item refund amounts.
    pub total_refund_amount: i64,
    pub status: RefundStatus,
    pub reason: String,
    pub notes: Option<String>,
    pub requested_by: String,
    /// Who completed or rejected the request.
    pub processed_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,

    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<RefundItem>,
}

/// One returned sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RefundItem {
    pub id: String,
    pub refund_id: String,
    pub transaction_item_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: i64,
    /// Share of the line total for `quantity` units.
    pub refund_amount: i64,
    pub reason: Option<String>,
    /// Put the units back on the shelf when the refund completes.
    pub restock: bool,
}

impl RefundItem {
    /// Refund for `quantity` of a sold line, prorated from the line total so
    /// a line discount is never paid back twice.
    ///
    /// ```text
    /// line: 3 × 10.000, discount 1.500 → total 28.500
    /// refund 2 → 28.500 × 2 / 3 = 19.000
    /// ```
    pub fn prorate(line: &TransactionItem, quantity: i64) -> i64 {
        if line.quantity <= 0 {
            return 0;
        }
        let amount = i128::from(line.total_amount) * i128::from(quantity) / i128::from(line.quantity);
        i64::try_from(amount).unwrap_or(line.total_amount)
    }
}

// =============================================================================
// Drawer Sessions & Cash Flow (C5)
// =============================================================================

/// Drawer session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DrawerStatus {
    Open,
    Closed,
}

/// An open-to-close cash box shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DrawerSession {
    pub id: String,
    #[ts(as = "String")]
    pub session_date: NaiveDate,
    pub opening_balance: i64,
    pub closing_balance: Option<i64>,
    /// opening + Σ income − Σ expense, set on close.
    pub expected_closing: Option<i64>,
    /// closing − expected, set on close.
    pub difference: Option<i64>,
    pub status: DrawerStatus,
    pub opened_by: String,
    pub closed_by: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Direction of a cash flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CashFlowKind {
    Income,
    Expense,
}

/// A named bucket for cash flows ("Penjualan", "Belanja Stok").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashFlowCategory {
    pub id: String,
    pub name: String,
    pub kind: CashFlowKind,
    pub is_active: bool,
}

/// A cash movement in or out of the drawer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashFlowRecord {
    pub id: String,
    pub session_id: Option<String>,
    pub category_id: Option<String>,
    pub kind: CashFlowKind,
    pub amount: i64,
    pub description: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Result of closing a drawer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DrawerClosing {
    pub session: DrawerSession,
    pub total_income: i64,
    pub total_expense: i64,
}

// =============================================================================
// Stock Opname (C8)
// =============================================================================

/// Opname session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OpnameStatus {
    Draft,
    InProgress,
    Completed,
    Cancelled,
}

impl OpnameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpnameStatus::Draft => "draft",
            OpnameStatus::InProgress => "in_progress",
            OpnameStatus::Completed => "completed",
            OpnameStatus::Cancelled => "cancelled",
        }
    }
}

/// A physical-count reconciliation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OpnameSession {
    pub id: String,
    /// `SO-YYYYMMDD-NNNN`.
    pub session_code: String,
    pub status: OpnameStatus,
    pub notes: Option<String>,
    pub total_products: i64,
    /// Σ |variance|.
    pub total_variance: i64,
    /// Σ |variance_value| over negative variances.
    pub total_loss_value: i64,
    /// Σ variance_value over positive variances.
    pub total_gain_value: i64,
    pub created_by: Option<String>,
    pub completed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub started_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<OpnameItem>,
}

/// One counted product in an opname session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OpnameItem {
    pub id: String,
    pub session_id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_barcode: Option<String>,
    /// Stock snapshotted at first count.
    pub system_stock: i64,
    pub physical_stock: i64,
    /// physical − system.
    pub variance: i64,
    pub cost_per_unit: i64,
    /// variance × cost_per_unit.
    pub variance_value: i64,
    pub notes: Option<String>,
    pub counted_by: Option<String>,
    #[ts(as = "String")]
    pub counted_at: DateTime<Utc>,
}

/// Variance totals of a session and its non-zero lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VarianceReport {
    pub session_id: String,
    pub session_code: String,
    pub total_products: i64,
    pub total_variance: i64,
    pub total_loss_value: i64,
    pub total_gain_value: i64,
    /// gain − loss.
    pub net_value: i64,
    pub items: Vec<OpnameItem>,
}

/// Counters aggregated over opname items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VarianceTotals {
    pub total_products: i64,
    pub total_variance: i64,
    pub total_loss_value: i64,
    pub total_gain_value: i64,
}

impl VarianceTotals {
    /// Folds item variances into session counters.
    ///
    /// ## Example
    /// ```text
    /// Gula: system 100, physical 95, cost 7.000 → variance −5, value −35.000
    /// Teh:  system  20, physical 22, cost 3.000 → variance +2, value  +6.000
    ///
    /// total_products 2, total_variance 7, loss 35.000, gain 6.000
    /// ```
    pub fn from_items(items: &[OpnameItem]) -> Self {
        let mut totals = VarianceTotals {
            total_products: items.len() as i64,
            ..Default::default()
        };
        for item in items.iter().filter(|i| i.variance != 0) {
            totals.total_variance += item.variance.abs();
            if item.variance_value < 0 {
                totals.total_loss_value += item.variance_value.abs();
            } else {
                totals.total_gain_value += item.variance_value;
            }
        }
        totals
    }

    pub fn net_value(&self) -> i64 {
        self.total_gain_value - self.total_loss_value
    }
}

// =============================================================================
// Paging
// =============================================================================

/// One page of a ledger or list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
