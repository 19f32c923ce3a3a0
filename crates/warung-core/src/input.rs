//! # Command Inputs & Filters
//!
//! Request shapes for every operation other than checkout (see [`crate::cart`]).
//! Each input validates itself before a scope is opened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::types::{
    CashFlowKind, ContainerMovementKind, KasbonKind, OpnameStatus, PaymentMethod,
    StockMovementKind, TransactionStatus,
};
use crate::validation::{
    normalize_page, validate_name, validate_non_negative, validate_positive, validate_tier_band,
};

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    pub unit: String,
    pub base_price: i64,
    #[serde(default)]
    pub cost_price: i64,
    #[serde(default = "default_true")]
    pub stock_tracked: bool,
    /// Opening stock, recorded as an `initial` movement.
    #[serde(default)]
    pub initial_stock: i64,
    #[serde(default)]
    pub min_stock_alert: i64,
    #[serde(default)]
    pub is_refillable: bool,
    #[serde(default)]
    pub empty_product_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl NewProduct {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("name", &self.name)?;
        validate_name("unit", &self.unit)?;
        validate_non_negative("base_price", self.base_price)?;
        validate_non_negative("cost_price", self.cost_price)?;
        validate_non_negative("initial_stock", self.initial_stock)?;
        validate_non_negative("min_stock_alert", self.min_stock_alert)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPricingTier {
    pub name: String,
    pub min_qty: i64,
    #[serde(default)]
    pub max_qty: Option<i64>,
    pub price: i64,
}

impl NewPricingTier {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("name", &self.name)?;
        validate_tier_band(self.min_qty, self.max_qty, self.price)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Zero means unlimited.
    #[serde(default)]
    pub credit_limit: i64,
}

impl NewCustomer {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("name", &self.name)?;
        validate_non_negative("credit_limit", self.credit_limit)?;
        Ok(())
    }
}

// =============================================================================
// Inventory (C2)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockInput {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub cost_per_unit: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RestockInput {
    pub fn validate(&self) -> CoreResult<()> {
        require("product_id", &self.product_id)?;
        validate_positive("quantity", self.quantity)?;
        validate_non_negative("cost_per_unit", self.cost_per_unit)?;
        Ok(())
    }
}

/// Why a manual adjustment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustReason {
    /// Counting error or data fix.
    #[default]
    Correction,
    /// Broken, expired or lost goods. Clamps at zero.
    Shrinkage,
}

impl AdjustReason {
    /// Shrinkage never drives tracked stock below zero; corrections must not.
    pub fn clamps_at_zero(&self) -> bool {
        matches!(self, AdjustReason::Shrinkage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustReason::Correction => "correction",
            AdjustReason::Shrinkage => "shrinkage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustStockInput {
    pub product_id: String,
    /// Signed delta.
    pub quantity: i64,
    #[serde(default)]
    pub reason: AdjustReason,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AdjustStockInput {
    pub fn validate(&self) -> CoreResult<()> {
        require("product_id", &self.product_id)?;
        if self.quantity == 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementFilter {
    #[serde(default)]
    pub kind: Option<StockMovementKind>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

// =============================================================================
// Refillable Containers (C3)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewContainer {
    pub product_id: String,
    pub container_type: String,
    #[serde(default)]
    pub empty_count: i64,
    #[serde(default)]
    pub full_count: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewContainer {
    pub fn validate(&self) -> CoreResult<()> {
        require("product_id", &self.product_id)?;
        validate_name("container_type", &self.container_type)?;
        validate_non_negative("empty_count", self.empty_count)?;
        validate_non_negative("full_count", self.full_count)?;
        Ok(())
    }
}

/// A container movement other than a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContainerMovementInput {
    pub container_id: String,
    pub kind: ContainerMovementKind,
    #[serde(default)]
    pub empty_change: i64,
    #[serde(default)]
    pub full_change: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ContainerMovementInput {
    pub fn validate(&self) -> CoreResult<()> {
        require("container_id", &self.container_id)?;
        if self.empty_change == 0 && self.full_change == 0 {
            return Err(ValidationError::Required {
                field: "empty_change or full_change".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// Credit Ledger (C4)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KasbonPaymentInput {
    pub customer_id: String,
    pub amount: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl KasbonPaymentInput {
    pub fn validate(&self) -> CoreResult<()> {
        require("customer_id", &self.customer_id)?;
        validate_positive("amount", self.amount)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KasbonFilter {
    #[serde(default)]
    pub kind: Option<KasbonKind>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

// =============================================================================
// Drawer & Cash Flow (C5)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenDrawerInput {
    pub opening_balance: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CloseDrawerInput {
    pub session_id: String,
    pub closing_balance: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OpenDrawerInput {
    pub fn validate(&self) -> CoreResult<()> {
        validate_non_negative("opening_balance", self.opening_balance)?;
        Ok(())
    }
}

impl CloseDrawerInput {
    pub fn validate(&self) -> CoreResult<()> {
        require("session_id", &self.session_id)?;
        validate_non_negative("closing_balance", self.closing_balance)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCashFlow {
    #[serde(default)]
    pub category_id: Option<String>,
    pub kind: CashFlowKind,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

impl NewCashFlow {
    pub fn validate(&self) -> CoreResult<()> {
        validate_positive("amount", self.amount)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashFlowFilter {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub kind: Option<CashFlowKind>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

// =============================================================================
// Transactions (C6)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionFilter {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

// =============================================================================
// Refunds
// =============================================================================

fn default_restock() -> bool {
    true
}

/// One sale line to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundLineInput {
    pub transaction_item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
    /// Damaged goods go in the bin, not back on the shelf.
    #[serde(default = "default_restock")]
    pub restock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateRefundInput {
    pub transaction_id: String,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<RefundLineInput>,
}

impl CreateRefundInput {
    pub fn validate(&self) -> CoreResult<()> {
        require("transaction_id", &self.transaction_id)?;
        require("reason", &self.reason)?;
        if self.items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            }
            .into());
        }

        let mut seen = std::collections::HashSet::new();
        for line in &self.items {
            require("transaction_item_id", &line.transaction_item_id)?;
            validate_positive("quantity", line.quantity)?;
            if !seen.insert(line.transaction_item_id.as_str()) {
                return Err(ValidationError::InvalidFormat {
                    field: "items".to_string(),
                    reason: format!("{} listed twice", line.transaction_item_id),
                }
                .into());
            }
        }
        Ok(())
    }
}

// =============================================================================
// Stock Opname (C8)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecordCountInput {
    pub session_id: String,
    pub product_id: String,
    pub physical_stock: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RecordCountInput {
    pub fn validate(&self) -> CoreResult<()> {
        require("session_id", &self.session_id)?;
        require("product_id", &self.product_id)?;
        validate_non_negative("physical_stock", self.physical_stock)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpnameFilter {
    #[serde(default)]
    pub status: Option<OpnameStatus>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

// =============================================================================
// Paging
// =============================================================================

/// Normalised paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
    pub offset: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        let (page, per_page, offset) = normalize_page(page, per_page);
        Self {
            page,
            per_page,
            offset,
        }
    }
}

fn require(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}
