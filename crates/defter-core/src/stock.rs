//! # Stock Movement Rules
//!
//! Decides which invoice lines move stock and plans the movements.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Create (Sales)                                                         │
//! │    lines ──► aggregate_requirements ──► stock guard (all shortages)    │
//! │                                                                         │
//! │  Create / Update (any type with a movement mapping)                    │
//! │    active lines ──► qualifying_lines ──► warehouse needed?             │
//! │                         │                    │                          │
//! │                         ▼                    ▼                          │
//! │                   plan_movements ◄── resolved warehouse id              │
//! │                         │                                               │
//! │                         ▼                                               │
//! │              one NewStockMovement per qualifying line                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A line qualifies when the invoice type maps to a movement type, the line
//! references an inventory item, and its quantity is non-zero.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::money::round_quantity;
use crate::types::{Invoice, InvoiceLine, LineDraft, NewStockMovement, ReferenceMap, StockDirection, StockMovement};

/// Sums requested quantities per item id.
///
/// Lines without an item id are ignored; quantities are absolute and
/// rounded to 3 places.
pub fn aggregate_requirements(lines: &[LineDraft]) -> BTreeMap<i64, Decimal> {
    let mut requirements = BTreeMap::new();
    for line in lines {
        if let Some(item_id) = line.item_id {
            *requirements.entry(item_id).or_insert(Decimal::ZERO) += round_quantity(line.quantity.abs());
        }
    }
    requirements
}

/// Nets requested quantities against an invoice's own live movements.
///
/// Used when re-saving an invoice: all of its live movements are about to be
/// soft-deleted. Stock it took out comes back, so outbound movements reduce
/// the requirement. Stock it brought in goes away, so inbound movements raise
/// it. Items whose net requirement is zero or less are removed.
pub fn net_of_posted(mut requirements: BTreeMap<i64, Decimal>, posted: &[StockMovement]) -> BTreeMap<i64, Decimal> {
    for movement in posted.iter().filter(|m| !m.is_deleted) {
        let Some(requested) = requirements.get_mut(&movement.item_id) else {
            continue;
        };
        match movement.movement_type.direction() {
            StockDirection::Out => *requested -= movement.quantity,
            StockDirection::In => *requested += movement.quantity,
        }
    }
    requirements.retain(|_, requested| *requested > Decimal::ZERO);
    requirements
}

/// Lines of `invoice` that generate a stock movement.
pub fn qualifying_lines<'a>(
    invoice: &Invoice,
    lines: &'a [InvoiceLine],
    references: &ReferenceMap,
) -> Vec<&'a InvoiceLine> {
    if invoice.invoice_type.stock_movement_type().is_none() {
        return Vec::new();
    }

    lines
        .iter()
        .filter(|line| !line.is_deleted && !line.quantity.is_zero())
        .filter(|line| {
            line.item_id
                .and_then(|id| references.get(id))
                .is_some_and(|reference| reference.moves_stock())
        })
        .collect()
}

/// Plans one movement per qualifying line, all in `warehouse_id`.
pub fn plan_movements(
    invoice: &Invoice,
    lines: &[InvoiceLine],
    references: &ReferenceMap,
    warehouse_id: i64,
) -> Vec<NewStockMovement> {
    let Some(movement_type) = invoice.invoice_type.stock_movement_type() else {
        return Vec::new();
    };

    qualifying_lines(invoice, lines, references)
        .into_iter()
        .filter_map(|line| {
            let item_id = line.item_id?;
            Some(NewStockMovement {
                branch_id: invoice.branch_id,
                warehouse_id,
                item_id,
                movement_type,
                quantity: round_quantity(line.quantity.abs()),
                transaction_date_utc: invoice.date_utc,
                note: Some(format!("{} {}", invoice.invoice_number, line.item_code)),
                invoice_id: Some(invoice.id),
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
