//! # Validation Module
//!
//! Input validation for invoice and payment commands.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  ├── Decimal strings parsed with category precision                    │
//! │  └── Unknown invoice types rejected                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any database access)                     │
//! │  ├── Required fields, ranges, lengths                                  │
//! │  └── Currency whitelist                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE(branch_id, invoice_number)                                 │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::error::{CoreResult, ValidationError};
use crate::money::Precision;
use crate::types::{Currency, InvoiceDraft, LineDraft};
use crate::{DEFAULT_CURRENCY, DEFAULT_DOCUMENT_TYPE, MAX_RATE_PERCENT};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of free-text header fields (waybill, document type).
pub const MAX_REFERENCE_LENGTH: usize = 64;

/// Maximum length of payment descriptions.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Largest accepted line quantity.
pub const MAX_QUANTITY: i64 = 1_000_000_000;

/// Largest accepted unit price.
pub const MAX_UNIT_PRICE: i64 = 1_000_000_000_000;

/// Largest accepted line gross (quantity × unit price) or payment amount.
///
/// Header sums of many such lines still fit the cent columns.
pub const MAX_AMOUNT: i64 = 10_000_000_000_000;

fn ensure_at_most(field: String, value: Decimal, max: i64) -> ValidationResult<()> {
    if value > Decimal::from(max) {
        return Err(ValidationError::TooLarge {
            field,
            max: max.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Header Validators
// =============================================================================

/// Normalizes and checks a currency code.
///
/// Empty or missing codes default to TRY; anything outside the
/// supported set is a business-rule error.
///
/// ## Example
/// ```rust
/// use defter_core::validation::normalize_currency;
/// use defter_core::Currency;
///
/// assert_eq!(normalize_currency(Some(" usd ")).unwrap(), Currency::Usd);
/// assert_eq!(normalize_currency(None).unwrap(), Currency::Try);
/// assert!(normalize_currency(Some("JPY")).is_err());
/// ```
pub fn normalize_currency(code: Option<&str>) -> CoreResult<Currency> {
    match code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => code.parse(),
        None => Ok(DEFAULT_CURRENCY),
    }
}

/// Validates a referenced id (contact, account, ...).
pub fn validate_id(field: &str, id: i64) -> ValidationResult<()> {
    if id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Trims optional free text, turning blanks into `None`.
pub fn normalize_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(Some(value.to_string()))
}

/// Document type, defaulting to "Invoice".
pub fn normalize_document_type(value: Option<&str>) -> ValidationResult<String> {
    Ok(normalize_text("documentType", value, MAX_REFERENCE_LENGTH)?
        .unwrap_or_else(|| DEFAULT_DOCUMENT_TYPE.to_string()))
}

/// Currency rate snapshot, defaulting to 1.0000; must be positive.
pub fn normalize_currency_rate(value: Option<Decimal>) -> ValidationResult<Decimal> {
    let rate = Precision::Currency.round(value.unwrap_or(Decimal::ONE));
    if rate <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "currencyRate".to_string(),
        });
    }
    Ok(rate)
}

// =============================================================================
// Line Validators
// =============================================================================

fn validate_percent(field: String, value: Decimal) -> ValidationResult<()> {
    if value < Decimal::ZERO || value > Decimal::from(MAX_RATE_PERCENT) {
        return Err(ValidationError::OutOfRange {
            field,
            min: 0,
            max: MAX_RATE_PERCENT,
        });
    }
    Ok(())
}

/// Validates one requested line.
///
/// ## Rules
/// - item id present
/// - quantity > 0
/// - unit price ≥ 0
/// - quantity, unit price and their product within [`MAX_QUANTITY`],
///   [`MAX_UNIT_PRICE`] and [`MAX_AMOUNT`]
/// - VAT, discount and withholding rates within 0-100
pub fn validate_line(index: usize, line: &LineDraft) -> ValidationResult<()> {
    let field = |name: &str| format!("lines[{}].{}", index, name);

    if line.item_id.is_none() {
        return Err(ValidationError::Required {
            field: field("itemId"),
        });
    }

    if line.quantity <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: field("quantity"),
        });
    }

    if line.unit_price < Decimal::ZERO {
        return Err(ValidationError::MustNotBeNegative {
            field: field("unitPrice"),
        });
    }

    ensure_at_most(field("quantity"), line.quantity, MAX_QUANTITY)?;
    ensure_at_most(field("unitPrice"), line.unit_price, MAX_UNIT_PRICE)?;
    let gross = line.quantity.checked_mul(line.unit_price).unwrap_or(Decimal::MAX);
    ensure_at_most(format!("lines[{}]", index), gross, MAX_AMOUNT)?;

    validate_percent(field("vatRate"), Decimal::from(line.vat_rate))?;

    if let Some(discount) = line.discount_rate {
        validate_percent(field("discountRate"), discount)?;
    }

    if let Some(withholding) = line.withholding_rate {
        validate_percent(field("withholdingRate"), Decimal::from(withholding))?;
    }

    Ok(())
}

/// Validates a full invoice draft (header fields and every line).
pub fn validate_invoice_draft(draft: &InvoiceDraft) -> ValidationResult<()> {
    validate_id("contactId", draft.contact_id)?;

    if draft.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    for (index, line) in draft.lines.iter().enumerate() {
        validate_line(index, line)?;
    }

    normalize_text("waybillNumber", draft.waybill_number.as_deref(), MAX_REFERENCE_LENGTH)?;
    normalize_document_type(draft.document_type.as_deref())?;
    normalize_currency_rate(draft.currency_rate)?;

    Ok(())
}

/// Validates a payment amount (must be > 0).
pub fn validate_payment_amount(amount: Decimal) -> ValidationResult<()> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    ensure_at_most("amount".to_string(), amount, MAX_AMOUNT)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::types::InvoiceType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn line() -> LineDraft {
        LineDraft {
            id: None,
            item_id: Some(1),
            quantity: dec!(1),
            unit_price: dec!(100),
            vat_rate: 20,
            discount_rate: None,
            withholding_rate: None,
        }
    }

    fn draft() -> InvoiceDraft {
        InvoiceDraft {
            contact_id: 3,
            order_id: None,
            date_utc: Utc::now(),
            currency: Some("try".to_string()),
            currency_rate: None,
            invoice_type: InvoiceType::Sales,
            document_type: None,
            waybill_number: None,
            waybill_date_utc: None,
            payment_due_date_utc: None,
            lines: vec![line()],
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(validate_invoice_draft(&draft()).is_ok());
    }

    #[test]
    fn test_requires_contact_and_lines() {
        let mut d = draft();
        d.contact_id = 0;
        assert!(matches!(
            validate_invoice_draft(&d),
            Err(ValidationError::MustBePositive { field }) if field == "contactId"
        ));

        let mut d = draft();
        d.lines.clear();
        assert!(matches!(
            validate_invoice_draft(&d),
            Err(ValidationError::Required { field }) if field == "lines"
        ));
    }

    #[test]
    fn test_line_rules() {
        let mut l = line();
        l.item_id = None;
        assert_eq!(
            validate_line(0, &l).unwrap_err().field(),
            "lines[0].itemId"
        );

        let mut l = line();
        l.quantity = dec!(0);
        assert!(validate_line(0, &l).is_err());

        let mut l = line();
        l.unit_price = dec!(-0.01);
        assert!(validate_line(0, &l).is_err());

        let mut l = line();
        l.unit_price = dec!(0);
        assert!(validate_line(0, &l).is_ok());

        let mut l = line();
        l.vat_rate = 101;
        assert_eq!(validate_line(2, &l).unwrap_err().field(), "lines[2].vatRate");

        let mut l = line();
        l.discount_rate = Some(dec!(100.01));
        assert!(validate_line(0, &l).is_err());

        let mut l = line();
        l.withholding_rate = Some(-1);
        assert!(validate_line(0, &l).is_err());

        let mut l = line();
        l.discount_rate = Some(dec!(100));
        l.withholding_rate = Some(100);
        assert!(validate_line(0, &l).is_ok());
    }

    #[test]
    fn test_line_magnitude_limits() {
        let mut l = line();
        l.quantity = dec!(1000000000000000);
        l.unit_price = dec!(1000000000000000);
        assert!(matches!(
            validate_line(0, &l),
            Err(ValidationError::TooLarge { field, .. }) if field == "lines[0].quantity"
        ));

        let mut l = line();
        l.unit_price = dec!(1000000000000.0001);
        assert_eq!(validate_line(1, &l).unwrap_err().field(), "lines[1].unitPrice");

        let mut l = line();
        l.quantity = dec!(1000000);
        l.unit_price = dec!(100000000);
        assert_eq!(validate_line(0, &l).unwrap_err().field(), "lines[0]");

        let mut l = line();
        l.quantity = dec!(1000);
        l.unit_price = dec!(10000000000);
        assert!(validate_line(0, &l).is_ok());

        assert!(validate_payment_amount(Decimal::from(MAX_AMOUNT)).is_ok());
        assert!(validate_payment_amount(dec!(10000000000000.01)).is_err());
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency(Some("eur")).unwrap(), Currency::Eur);
        assert_eq!(normalize_currency(Some("  ")).unwrap(), Currency::Try);
        assert!(matches!(
            normalize_currency(Some("CHF")),
            Err(CoreError::UnsupportedCurrency { .. })
        ));
    }

    #[test]
    fn test_normalize_text_and_defaults() {
        assert_eq!(normalize_text("waybillNumber", Some("  "), 10).unwrap(), None);
        assert_eq!(
            normalize_text("waybillNumber", Some(" IRS-1 "), 10).unwrap(),
            Some("IRS-1".to_string())
        );
        assert!(normalize_text("waybillNumber", Some("A-VERY-LONG-WAYBILL"), 10).is_err());

        assert_eq!(normalize_document_type(None).unwrap(), "Invoice");
        assert_eq!(normalize_document_type(Some("Proforma")).unwrap(), "Proforma");

        assert_eq!(normalize_currency_rate(None).unwrap(), dec!(1.0000));
        assert_eq!(normalize_currency_rate(Some(dec!(32.123456))).unwrap(), dec!(32.1235));
        assert!(normalize_currency_rate(Some(dec!(0))).is_err());
    }

    #[test]
    fn test_payment_amount() {
        assert!(validate_payment_amount(dec!(0.01)).is_ok());
        assert!(validate_payment_amount(dec!(0)).is_err());
        assert!(validate_payment_amount(dec!(-5)).is_err());
    }
}
