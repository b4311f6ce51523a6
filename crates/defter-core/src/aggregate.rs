//! # Invoice Aggregate Builder
//!
//! Turns validated drafts into invoice headers and lines, and reconciles an
//! incoming line set against the persisted one.
//!
//! ## Line Reconciliation (update)
//! ```text
//!   persisted active lines          incoming lines
//!   ┌────┬────┬────┐                ┌────┬────┬──────┐
//!   │ 11 │ 12 │ 13 │                │ 11 │ 13 │ None │
//!   └────┴────┴────┘                └────┴────┴──────┘
//!          │                               │
//!          └──────────────┬────────────────┘
//!                         ▼
//!   to_update: 11, 13   (recalculated in place)
//!   to_insert: None     (new line)
//!   to_delete: 12       (soft-deleted)
//! ```
//!
//! Nothing here touches storage; the caller persists the plan inside one
//! transaction and re-sums the header from [`LinePlan::totals`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::calculation::{calculate_line, InvoiceTotals, LineInput};
use crate::concurrency::RowVersion;
use crate::error::ValidationError;
use crate::types::{Currency, Invoice, InvoiceDraft, InvoiceLine, InvoiceType, LineDraft, ReferenceMap};
use crate::validation::{normalize_currency_rate, normalize_document_type, normalize_text, ValidationResult, MAX_REFERENCE_LENGTH};
use crate::{DEFAULT_UNIT, MAX_RATE_PERCENT};

// =============================================================================
// Header
// =============================================================================

/// Builds a new, unsaved invoice header with zero totals.
pub fn new_invoice(
    branch_id: i64,
    invoice_number: String,
    draft: &InvoiceDraft,
    currency: Currency,
    now: DateTime<Utc>,
) -> ValidationResult<Invoice> {
    let mut invoice = Invoice {
        id: 0,
        branch_id,
        contact_id: draft.contact_id,
        order_id: draft.order_id,
        invoice_type: draft.invoice_type,
        document_type: String::new(),
        invoice_number,
        date_utc: draft.date_utc,
        currency,
        currency_rate: Decimal::ONE,
        waybill_number: None,
        waybill_date_utc: None,
        payment_due_date_utc: None,
        total_line_gross: Decimal::ZERO,
        total_discount: Decimal::ZERO,
        total_net: Decimal::ZERO,
        total_vat: Decimal::ZERO,
        total_withholding: Decimal::ZERO,
        total_gross: Decimal::ZERO,
        balance: Decimal::ZERO,
        created_at: now,
        updated_at: None,
        is_deleted: false,
        deleted_at: None,
        row_version: RowVersion::INITIAL,
    };
    apply_draft(&mut invoice, draft, currency)?;
    Ok(invoice)
}

/// Overwrites the header scalars from a draft and zeroes the totals.
///
/// Branch, number, audit fields and row version are left untouched.
pub fn apply_draft(invoice: &mut Invoice, draft: &InvoiceDraft, currency: Currency) -> ValidationResult<()> {
    invoice.contact_id = draft.contact_id;
    invoice.order_id = draft.order_id;
    invoice.invoice_type = draft.invoice_type;
    invoice.document_type = normalize_document_type(draft.document_type.as_deref())?;
    invoice.date_utc = draft.date_utc;
    invoice.currency = currency;
    invoice.currency_rate = normalize_currency_rate(draft.currency_rate)?;
    invoice.waybill_number = normalize_text("waybillNumber", draft.waybill_number.as_deref(), MAX_REFERENCE_LENGTH)?;
    invoice.waybill_date_utc = draft.waybill_date_utc;
    invoice.payment_due_date_utc = draft.payment_due_date_utc;
    invoice.reset_totals();
    Ok(())
}

// =============================================================================
// Lines
// =============================================================================

/// Builds one line from its draft: snapshot, normalized inputs and amounts.
///
/// The withholding rate falls back to the item's default, then to 0.
pub fn build_line(
    index: usize,
    invoice_type: InvoiceType,
    draft: &LineDraft,
    references: &ReferenceMap,
    now: DateTime<Utc>,
) -> ValidationResult<InvoiceLine> {
    let reference = references.resolve(&format!("lines[{}].itemId", index), draft.item_id)?;
    let item = reference.snapshot();

    let withholding_rate = draft
        .withholding_rate
        .or(item.default_withholding_rate)
        .unwrap_or(0);
    if !(0..=MAX_RATE_PERCENT).contains(&i64::from(withholding_rate)) {
        return Err(ValidationError::OutOfRange {
            field: format!("lines[{}].withholdingRate", index),
            min: 0,
            max: MAX_RATE_PERCENT,
        });
    }

    let input = LineInput::new(
        draft.quantity,
        draft.unit_price,
        draft.vat_rate,
        draft.discount_rate.unwrap_or(Decimal::ZERO),
        withholding_rate,
    );

    let mut line = InvoiceLine {
        id: 0,
        invoice_id: 0,
        item_id: Some(item.id),
        item_code: item.code.clone(),
        item_name: item.name.clone(),
        unit: item
            .unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_UNIT)
            .to_string(),
        account_code: item.account_code_for(invoice_type).map(str::to_string),
        quantity: input.quantity(),
        unit_price: input.unit_price(),
        vat_rate: input.vat_rate(),
        discount_rate: input.discount_rate(),
        withholding_rate,
        gross: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        net: Decimal::ZERO,
        vat: Decimal::ZERO,
        withholding_amount: Decimal::ZERO,
        grand_total: Decimal::ZERO,
        created_at: now,
        updated_at: None,
        is_deleted: false,
        deleted_at: None,
    };
    line.apply_amounts(&calculate_line(&input));
    Ok(line)
}

/// Builds every line of a new invoice, in request order.
pub fn build_lines(
    invoice_type: InvoiceType,
    drafts: &[LineDraft],
    references: &ReferenceMap,
    now: DateTime<Utc>,
) -> ValidationResult<Vec<InvoiceLine>> {
    drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| build_line(index, invoice_type, draft, references, now))
        .collect()
}

/// Outcome of reconciling an incoming line set with the persisted one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinePlan {
    /// Persisted lines kept, recalculated in place.
    pub to_update: Vec<InvoiceLine>,
    /// New lines (id 0 until inserted).
    pub to_insert: Vec<InvoiceLine>,
    /// Persisted lines absent from the request, already flagged deleted.
    pub to_delete: Vec<InvoiceLine>,
}

impl LinePlan {
    /// Lines that stay active after the plan is applied.
    pub fn active_lines(&self) -> impl Iterator<Item = &InvoiceLine> {
        self.to_update.iter().chain(self.to_insert.iter())
    }

    /// Header totals re-summed from the active set.
    pub fn totals(&self) -> InvoiceTotals {
        let amounts: Vec<_> = self.active_lines().map(InvoiceLine::amounts).collect();
        InvoiceTotals::from_lines(&amounts)
    }
}

/// Diffs `drafts` against the persisted active lines of `invoice`.
///
/// An incoming line id that is not an active line of this invoice, or that
/// appears twice, is a validation error.
pub fn reconcile_lines(
    invoice: &Invoice,
    persisted: &[InvoiceLine],
    drafts: &[LineDraft],
    references: &ReferenceMap,
    now: DateTime<Utc>,
) -> ValidationResult<LinePlan> {
    let mut existing: HashMap<i64, &InvoiceLine> = persisted
        .iter()
        .filter(|line| !line.is_deleted)
        .map(|line| (line.id, line))
        .collect();
    let mut seen = HashSet::new();
    let mut plan = LinePlan::default();

    for (index, draft) in drafts.iter().enumerate() {
        let mut line = build_line(index, invoice.invoice_type, draft, references, now)?;
        line.invoice_id = invoice.id;

        match draft.id {
            Some(id) => {
                if !seen.insert(id) {
                    return Err(ValidationError::InvalidFormat {
                        field: format!("lines[{}].id", index),
                        reason: format!("line {} appears more than once", id),
                    });
                }
                let current = existing.remove(&id).ok_or_else(|| ValidationError::UnknownReference {
                    field: format!("lines[{}].id", index),
                    id,
                })?;
                line.id = current.id;
                line.created_at = current.created_at;
                line.updated_at = Some(now);
                plan.to_update.push(line);
            }
            None => plan.to_insert.push(line),
        }
    }

    let mut removed: Vec<InvoiceLine> = existing.into_values().cloned().collect();
    removed.sort_by_key(|line| line.id);
    for line in &mut removed {
        line.is_deleted = true;
        line.deleted_at = Some(now);
    }
    plan.to_delete = removed;

    Ok(plan)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::tests::{invoice, line, references};
    use crate::types::{ItemSnapshot, ItemType};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn draft_line(id: Option<i64>, item_id: i64, quantity: Decimal) -> LineDraft {
        LineDraft {
            id,
            item_id: Some(item_id),
            quantity,
            unit_price: dec!(100),
            vat_rate: 20,
            discount_rate: None,
            withholding_rate: None,
        }
    }

    fn draft(lines: Vec<LineDraft>) -> InvoiceDraft {
        InvoiceDraft {
            contact_id: 5,
            order_id: None,
            date_utc: now(),
            currency: None,
            currency_rate: None,
            invoice_type: InvoiceType::Sales,
            document_type: None,
            waybill_number: Some("  ".to_string()),
            waybill_date_utc: None,
            payment_due_date_utc: None,
            lines,
        }
    }

    #[test]
    fn test_new_invoice_defaults() {
        let d = draft(vec![draft_line(None, 1, dec!(1))]);
        let invoice = new_invoice(1, "SAT-2026-000001".to_string(), &d, Currency::Try, now()).unwrap();

        assert_eq!(invoice.document_type, "Invoice");
        assert_eq!(invoice.currency_rate, dec!(1.0000));
        assert_eq!(invoice.waybill_number, None);
        assert_eq!(invoice.row_version, RowVersion::INITIAL);
        assert!(invoice.total_gross.is_zero());
    }

    #[test]
    fn test_build_line_snapshot_and_amounts() {
        let refs = ReferenceMap::from_items(vec![ItemSnapshot {
            id: 7,
            code: "KLM-01".to_string(),
            name: "Kalem".to_string(),
            unit: None,
            item_type: ItemType::Inventory,
            default_withholding_rate: Some(50),
            sales_account_code: Some("600.01".to_string()),
            purchase_account_code: Some("153.01".to_string()),
        }]);
        let mut d = draft_line(None, 7, dec!(2));
        d.vat_rate = 18;
        d.discount_rate = Some(dec!(10));

        let line = build_line(0, InvoiceType::Sales, &d, &refs, now()).unwrap();
        assert_eq!(line.item_code, "KLM-01");
        assert_eq!(line.unit, "adet");
        assert_eq!(line.account_code.as_deref(), Some("600.01"));
        assert_eq!(line.withholding_rate, 50);
        assert_eq!(line.net, dec!(180.00));
        assert_eq!(line.withholding_amount, dec!(16.20));

        d.withholding_rate = Some(0);
        let line = build_line(0, InvoiceType::Purchase, &d, &refs, now()).unwrap();
        assert_eq!(line.withholding_rate, 0);
        assert_eq!(line.account_code.as_deref(), Some("153.01"));
    }

    #[test]
    fn test_unknown_item_is_validation_error() {
        let d = vec![draft_line(None, 1, dec!(1)), draft_line(None, 42, dec!(1))];
        let err = build_lines(InvoiceType::Sales, &d, &references(), now()).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownReference { id: 42, .. }));
        assert_eq!(err.field(), "lines[1].itemId");
    }

    #[test]
    fn test_reconcile_update_insert_delete() {
        let header = invoice(InvoiceType::Sales);
        let mut persisted = vec![line(Some(1), dec!(1)), line(Some(3), dec!(1)), line(Some(2), dec!(1))];
        for (offset, l) in persisted.iter_mut().enumerate() {
            l.id = 11 + offset as i64;
        }

        let drafts = vec![
            draft_line(Some(11), 1, dec!(3)),
            draft_line(None, 2, dec!(1)),
            draft_line(Some(13), 2, dec!(2)),
        ];
        let plan = reconcile_lines(&header, &persisted, &drafts, &references(), now()).unwrap();

        assert_eq!(plan.to_update.iter().map(|l| l.id).collect::<Vec<_>>(), vec![11, 13]);
        assert_eq!(plan.to_insert.len(), 1);
        assert_eq!(plan.to_insert[0].id, 0);
        assert_eq!(plan.to_insert[0].invoice_id, header.id);
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_delete[0].id, 12);
        assert!(plan.to_delete[0].is_deleted);

        assert_eq!(plan.to_update[0].quantity, dec!(3.000));
        assert_eq!(plan.to_update[0].gross, dec!(300.00));

        let totals = plan.totals();
        assert_eq!(totals.total_net, dec!(600.00));
        assert_eq!(totals.total_vat, dec!(120.00));
        assert_eq!(totals.total_gross, dec!(720.00));
    }

    #[test]
    fn test_reconcile_rejects_foreign_line_id() {
        let header = invoice(InvoiceType::Sales);
        let mut persisted = vec![line(Some(1), dec!(1))];
        persisted[0].id = 11;

        let drafts = vec![draft_line(Some(99), 1, dec!(1))];
        let err = reconcile_lines(&header, &persisted, &drafts, &references(), now()).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownReference { id: 99, .. }));

        let drafts = vec![draft_line(Some(11), 1, dec!(1)), draft_line(Some(11), 1, dec!(2))];
        assert!(reconcile_lines(&header, &persisted, &drafts, &references(), now()).is_err());
    }

    #[test]
    fn test_reconcile_ignores_already_deleted_lines() {
        let header = invoice(InvoiceType::Sales);
        let mut gone = line(Some(1), dec!(1));
        gone.id = 11;
        gone.is_deleted = true;

        let drafts = vec![draft_line(Some(11), 1, dec!(1))];
        assert!(reconcile_lines(&header, &[gone.clone()], &drafts, &references(), now()).is_err());

        let plan = reconcile_lines(&header, &[gone], &[draft_line(None, 1, dec!(1))], &references(), now()).unwrap();
        assert!(plan.to_delete.is_empty());
    }
}
