//! # Invoice Numbering
//!
//! Human-readable invoice numbers: `{PREFIX}-{YEAR}-{SEQ:06}`, e.g.
//! `SAT-2026-000042`. The sequence is per branch, prefix and year; the
//! allocator that hands out sequences lives in the storage layer.

/// Prefix used when a type label is not recognized.
pub const FALLBACK_PREFIX: &str = "FAT";

/// Maps an invoice type label to its number prefix.
///
/// Labels are matched case-insensitively, ignoring `_` and `-`, so
/// `"sales_return"`, `"SalesReturn"` and `"sales-return"` all map to `SIA`.
pub fn number_prefix(label: &str) -> &'static str {
    let normalized: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "sales" => "SAT",
        "purchase" => "ALI",
        "salesreturn" => "SIA",
        "purchasereturn" => "AIA",
        "expense" => "MAS",
        _ => FALLBACK_PREFIX,
    }
}

/// Formats an invoice number.
pub fn format_invoice_number(prefix: &str, year: i32, sequence: u32) -> String {
    format!("{}-{}-{:06}", prefix, year, sequence)
}

/// Components of a formatted invoice number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceNumber {
    pub prefix: String,
    pub year: i32,
    pub sequence: u32,
}

/// Parses `{PREFIX}-{YEAR}-{SEQ}`; returns `None` for anything else.
pub fn parse_invoice_number(number: &str) -> Option<InvoiceNumber> {
    let mut parts = number.trim().splitn(3, '-');
    let prefix = parts.next().filter(|p| !p.is_empty())?;
    let year = parts.next()?.parse().ok()?;
    let sequence = parts.next()?.parse().ok()?;

    Some(InvoiceNumber {
        prefix: prefix.to_string(),
        year,
        sequence,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InvoiceType;

    #[test]
    fn test_prefix_per_type() {
        assert_eq!(InvoiceType::Sales.number_prefix(), "SAT");
        assert_eq!(InvoiceType::Purchase.number_prefix(), "ALI");
        assert_eq!(InvoiceType::SalesReturn.number_prefix(), "SIA");
        assert_eq!(InvoiceType::PurchaseReturn.number_prefix(), "AIA");
        assert_eq!(InvoiceType::Expense.number_prefix(), "MAS");
    }

    #[test]
    fn test_prefix_label_variants() {
        assert_eq!(number_prefix("SalesReturn"), "SIA");
        assert_eq!(number_prefix("purchase-return"), "AIA");
        assert_eq!(number_prefix("Proforma"), "FAT");
        assert_eq!(number_prefix(""), "FAT");
    }

    #[test]
    fn test_format_and_parse() {
        let number = format_invoice_number("SAT", 2026, 42);
        assert_eq!(number, "SAT-2026-000042");

        let parsed = parse_invoice_number(&number).unwrap();
        assert_eq!(parsed.prefix, "SAT");
        assert_eq!(parsed.year, 2026);
        assert_eq!(parsed.sequence, 42);

        assert_eq!(format_invoice_number("ALI", 2026, 1_234_567), "ALI-2026-1234567");
        assert!(parse_invoice_number("SAT-2026").is_none());
        assert!(parse_invoice_number("SAT-abcd-000001").is_none());
    }
}
