//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Integer Minor Units
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every amount in the shop is a whole number of the smallest unit.       │
//! │                                                                         │
//! │    Gula 1kg        Rp 15.000   → Money(15_000)                          │
//! │    3 × Gula 1kg    Rp 45.000   → Money(45_000)                          │
//! │    Kasbon limit    Rp 500.000  → Money(500_000)                         │
//! │                                                                         │
//! │  No floats anywhere: prices, tier prices, debt, drawer balances and    │
//! │  variance values all flow through this type or a plain i64 column.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use warung_core::money::Money;
//!
//! let price = Money::new(9_000);
//! let line = price.multiply_quantity(15);
//! assert_eq!(line.amount(), 135_000);
//! assert_eq!(line.to_string(), "Rp 135.000");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in integer minor units.
///
/// ## Design Decisions
/// - **i64 (signed)**: negative values appear in variance values and refunds
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Newtype serde**: serialized as a bare number
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn new(amount: i64) -> Self {
        Money(amount)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Tier price: Rp 9.000 (Grosir, 10-49)
    /// Quantity: 15
    ///      │
    ///      ▼
    /// multiply_quantity(15) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Line subtotal: Rp 135.000
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Rupiah-style display with dot thousands separators.
///
/// ## Note
/// This is for receipts and logs. Clients should format for their locale.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}Rp {}", sign, grouped)
    }
}

impl From<i64> for Money {
    fn from(amount: i64) -> Self {
        Money(amount)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by a quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
