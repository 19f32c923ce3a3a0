//! # Document Numbering
//!
//! Human-readable business ids built from a per-day counter.
//!
//! ```text
//! INV-20250114-0001     sale invoice
//! SO-20250114-0001      stock opname session
//! HLD-20250114-0001     held (parked) cart
//! REF-20250114-0001     refund request
//! └┬┘ └──┬───┘ └┬─┘
//!  │     │      └── day counter, zero padded to 4
//!  │     └───────── local calendar date
//!  └─────────────── document prefix
//! ```
//!
//! The counter itself lives in the database (`sequences` table); this module
//! only names counters and formats values.

use chrono::NaiveDate;

/// Kinds of numbered documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Invoice,
    Opname,
    HeldCart,
    Refund,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INV",
            DocumentKind::Opname => "SO",
            DocumentKind::HeldCart => "HLD",
            DocumentKind::Refund => "REF",
        }
    }

    fn counter_namespace(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Opname => "opname",
            DocumentKind::HeldCart => "hold",
            DocumentKind::Refund => "refund",
        }
    }

    /// Name of the sequence row for `date`, e.g. `invoice:20250114`.
    pub fn sequence_name(&self, date: NaiveDate) -> String {
        format!("{}:{}", self.counter_namespace(), date.format("%Y%m%d"))
    }

    /// Formats the document number for the `seq`-th document of `date`.
    pub fn format(&self, date: NaiveDate, seq: i64) -> String {
        format!("{}-{}-{:04}", self.prefix(), date.format("%Y%m%d"), seq)
    }
}

/// Shorthand for `DocumentKind::Invoice.format`.
pub fn invoice_number(date: NaiveDate, seq: i64) -> String {
    DocumentKind::Invoice.format(date, seq)
}

/// Shorthand for `DocumentKind::Opname.format`.
pub fn opname_code(date: NaiveDate, seq: i64) -> String {
    DocumentKind::Opname.format(date, seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 14).unwrap()
    }

    #[test]
    fn test_invoice_format() {
        assert_eq!(invoice_number(day(), 1), "INV-20250114-0001");
        assert_eq!(invoice_number(day(), 42), "INV-20250114-0042");
        assert_eq!(invoice_number(day(), 12345), "INV-20250114-12345");
    }

    #[test]
    fn test_opname_format() {
        assert_eq!(opname_code(day(), 3), "SO-20250114-0003");
    }

    #[test]
    fn test_hold_and_refund_numbers() {
        assert_eq!(DocumentKind::HeldCart.format(day(), 7), "HLD-20250114-0007");
        assert_eq!(DocumentKind::Refund.format(day(), 1), "REF-20250114-0001");
        assert_eq!(DocumentKind::Refund.sequence_name(day()), "refund:20250114");
    }

    #[test]
    fn test_sequence_names_are_per_day() {
        assert_eq!(DocumentKind::Invoice.sequence_name(day()), "invoice:20250114");
        assert_eq!(DocumentKind::Opname.sequence_name(day()), "opname:20250114");
        let next = day().succ_opt().unwrap();
        assert_ne!(
            DocumentKind::Invoice.sequence_name(day()),
            DocumentKind::Invoice.sequence_name(next)
        );
    }
}
