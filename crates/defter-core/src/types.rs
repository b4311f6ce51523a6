//! # Domain Types
//!
//! Core domain types used throughout Defter.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Invoice      │ 1 │  InvoiceLine    │ 1 │  StockMovement  │       │
//! │  │  ─────────────  │──►│  ─────────────  │──►│  ─────────────  │       │
//! │  │  branch_id      │ * │  item snapshot  │ 0..1 movement_type │       │
//! │  │  invoice_number │   │  qty / price    │   │  quantity       │       │
//! │  │  totals         │   │  derived amounts│   │  invoice_id     │       │
//! │  │  row_version    │   │  is_deleted     │   │  is_deleted     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  InvoiceType    │   │    ItemType     │   │    Currency     │       │
//! │  │  Sales          │   │  Inventory ◄─── only type that moves stock  │
//! │  │  Purchase       │   │  Service        │   │  TRY USD EUR GBP│       │
//! │  │  SalesReturn    │   │  Expense        │   └─────────────────┘       │
//! │  │  PurchaseReturn │   │  FixedAsset     │                             │
//! │  │  Expense        │   └─────────────────┘                             │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Item code, name, unit and account code are copied onto each line when the
//! line is written. Later edits to the item never change posted invoices.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculation::{InvoiceTotals, LineAmounts};
use crate::concurrency::RowVersion;
use crate::error::{CoreError, ValidationError};
use crate::numbering;

// =============================================================================
// Invoice Type
// =============================================================================

/// Commercial direction of an invoice.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Sales,
    Purchase,
    SalesReturn,
    PurchaseReturn,
    Expense,
}

impl InvoiceType {
    /// All invoice types.
    pub const ALL: [InvoiceType; 5] = [
        InvoiceType::Sales,
        InvoiceType::Purchase,
        InvoiceType::SalesReturn,
        InvoiceType::PurchaseReturn,
        InvoiceType::Expense,
    ];

    /// Storage and wire label.
    pub const fn as_str(self) -> &'static str {
        match self {
            InvoiceType::Sales => "sales",
            InvoiceType::Purchase => "purchase",
            InvoiceType::SalesReturn => "sales_return",
            InvoiceType::PurchaseReturn => "purchase_return",
            InvoiceType::Expense => "expense",
        }
    }

    /// Prefix used for invoice numbers of this type (`SAT`, `ALI`, ...).
    pub fn number_prefix(self) -> &'static str {
        numbering::number_prefix(self.as_str())
    }

    /// Stock movement generated by lines of this invoice type, if any.
    ///
    /// ```text
    /// Sales          → SalesOut        (stock out)
    /// SalesReturn    → SalesReturn     (stock in)
    /// Purchase       → PurchaseIn      (stock in)
    /// PurchaseReturn → PurchaseReturn  (stock out)
    /// Expense        → none
    /// ```
    pub const fn stock_movement_type(self) -> Option<StockMovementType> {
        match self {
            InvoiceType::Sales => Some(StockMovementType::SalesOut),
            InvoiceType::SalesReturn => Some(StockMovementType::SalesReturn),
            InvoiceType::Purchase => Some(StockMovementType::PurchaseIn),
            InvoiceType::PurchaseReturn => Some(StockMovementType::PurchaseReturn),
            InvoiceType::Expense => None,
        }
    }

    /// Whether lines snapshot the item's sales account (vs purchase account).
    pub const fn uses_sales_account(self) -> bool {
        matches!(self, InvoiceType::Sales | InvoiceType::SalesReturn)
    }

    /// Effect on the counterparty's receivable balance: +1 when the contact
    /// owes us (sales, purchase returns), -1 when we owe the contact.
    pub const fn receivable_sign(self) -> i64 {
        match self {
            InvoiceType::Sales | InvoiceType::PurchaseReturn => 1,
            InvoiceType::Purchase | InvoiceType::SalesReturn | InvoiceType::Expense => -1,
        }
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "sales" => Ok(InvoiceType::Sales),
            "purchase" => Ok(InvoiceType::Purchase),
            "salesreturn" => Ok(InvoiceType::SalesReturn),
            "purchasereturn" => Ok(InvoiceType::PurchaseReturn),
            "expense" => Ok(InvoiceType::Expense),
            _ => Err(ValidationError::InvalidFormat {
                field: "type".to_string(),
                reason: format!("unknown invoice type '{}'", s.trim()),
            }),
        }
    }
}

// =============================================================================
// Item Type
// =============================================================================

/// Classification of an item.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Inventory,
    Service,
    Expense,
    FixedAsset,
}

impl ItemType {
    /// Only inventory items are tracked in stock.
    #[inline]
    pub const fn moves_stock(self) -> bool {
        matches!(self, ItemType::Inventory)
    }
}

// =============================================================================
// Stock Movement Type
// =============================================================================

/// Kind of stock movement. Direction is encoded here, never in the sign
/// of the quantity.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementType {
    PurchaseIn,
    SalesOut,
    SalesReturn,
    PurchaseReturn,
}

impl StockMovementType {
    /// Whether the movement adds to or removes from stock.
    pub const fn direction(self) -> StockDirection {
        match self {
            StockMovementType::PurchaseIn | StockMovementType::SalesReturn => StockDirection::In,
            StockMovementType::SalesOut | StockMovementType::PurchaseReturn => StockDirection::Out,
        }
    }
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockDirection {
    In,
    Out,
}

// =============================================================================
// Currency
// =============================================================================

/// Supported ISO-4217 currencies.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Try,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Currency; 4] = [Currency::Try, Currency::Usd, Currency::Eur, Currency::Gbp];

    /// ISO-4217 code.
    pub const fn code(self) -> &'static str {
        match self {
            Currency::Try => "TRY",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    /// Parses a code case-insensitively (`" usd "` → `USD`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(CoreError::UnsupportedCurrency { code })
    }
}

// =============================================================================
// Payment Direction
// =============================================================================

/// Whether money enters (`In`) or leaves (`Out`) a cash/bank account.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDirection {
    In,
    Out,
}

// =============================================================================
// Line References
// =============================================================================

/// Read-only snapshot of an item, captured once per command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub unit: Option<String>,
    pub item_type: ItemType,
    pub default_withholding_rate: Option<i32>,
    pub sales_account_code: Option<String>,
    pub purchase_account_code: Option<String>,
}

impl ItemSnapshot {
    /// Account code copied onto a line of the given invoice type.
    pub fn account_code_for(&self, invoice_type: InvoiceType) -> Option<&str> {
        if invoice_type.uses_sales_account() {
            self.sales_account_code.as_deref()
        } else {
            self.purchase_account_code.as_deref()
        }
    }
}

/// What an invoice line points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineReference {
    Item(ItemSnapshot),
}

impl LineReference {
    pub fn id(&self) -> i64 {
        match self {
            LineReference::Item(item) => item.id,
        }
    }

    pub fn snapshot(&self) -> &ItemSnapshot {
        match self {
            LineReference::Item(item) => item,
        }
    }

    /// Whether lines pointing here generate stock movements.
    pub fn moves_stock(&self) -> bool {
        match self {
            LineReference::Item(item) => item.item_type.moves_stock(),
        }
    }
}

/// Typed lookup of line references keyed by id, resolved before the line loop.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMap {
    entries: HashMap<i64, LineReference>,
}

impl ReferenceMap {
    /// Builds the map from item snapshots.
    pub fn from_items(items: impl IntoIterator<Item = ItemSnapshot>) -> Self {
        ReferenceMap {
            entries: items
                .into_iter()
                .map(|item| (item.id, LineReference::Item(item)))
                .collect(),
        }
    }

    pub fn get(&self, id: i64) -> Option<&LineReference> {
        self.entries.get(&id)
    }

    /// Resolves a line's item reference or fails with a validation error
    /// naming the line field.
    pub fn resolve(&self, field: &str, item_id: Option<i64>) -> Result<&LineReference, ValidationError> {
        let id = item_id.ok_or_else(|| ValidationError::Required {
            field: field.to_string(),
        })?;
        self.get(id).ok_or_else(|| ValidationError::UnknownReference {
            field: field.to_string(),
            id,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// Invoice header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Surrogate id (0 until inserted).
    pub id: i64,
    pub branch_id: i64,
    pub contact_id: i64,
    pub order_id: Option<i64>,
    pub invoice_type: InvoiceType,
    /// Free-form document type ("Invoice", "Proforma", ...).
    pub document_type: String,
    /// `{PREFIX}-{YEAR}-{SEQ:06}`, unique per branch.
    pub invoice_number: String,
    pub date_utc: DateTime<Utc>,
    pub currency: Currency,
    /// Exchange rate snapshot (4 places).
    pub currency_rate: Decimal,
    pub waybill_number: Option<String>,
    pub waybill_date_utc: Option<DateTime<Utc>>,
    pub payment_due_date_utc: Option<DateTime<Utc>>,

    // Totals, all 2 places
    pub total_line_gross: Decimal,
    pub total_discount: Decimal,
    pub total_net: Decimal,
    pub total_vat: Decimal,
    pub total_withholding: Decimal,
    pub total_gross: Decimal,
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub row_version: RowVersion,
}

impl Invoice {
    /// Overwrites every monetary total, including the balance.
    pub fn apply_totals(&mut self, totals: &InvoiceTotals) {
        self.total_line_gross = totals.total_line_gross;
        self.total_discount = totals.total_discount;
        self.total_net = totals.total_net;
        self.total_vat = totals.total_vat;
        self.total_withholding = totals.total_withholding;
        self.total_gross = totals.total_gross;
        self.balance = totals.balance;
    }

    /// Zeroes every monetary total.
    pub fn reset_totals(&mut self) {
        self.apply_totals(&InvoiceTotals::default());
    }
}

// =============================================================================
// Invoice Line
// =============================================================================

/// One invoice line: raw inputs, item snapshot and derived amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// Surrogate id (0 until inserted).
    pub id: i64,
    pub invoice_id: i64,
    pub item_id: Option<i64>,

    // Snapshot (immune to later item edits)
    pub item_code: String,
    pub item_name: String,
    pub unit: String,
    pub account_code: Option<String>,

    // Raw inputs
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: i32,
    pub discount_rate: Decimal,
    pub withholding_rate: i32,

    // Derived, persisted as computed
    pub gross: Decimal,
    pub discount_amount: Decimal,
    pub net: Decimal,
    pub vat: Decimal,
    pub withholding_amount: Decimal,
    pub grand_total: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl InvoiceLine {
    /// Derived amounts as stored on the line.
    pub fn amounts(&self) -> LineAmounts {
        LineAmounts {
            gross: self.gross,
            discount_amount: self.discount_amount,
            net: self.net,
            vat: self.vat,
            withholding_rate: self.withholding_rate,
            withholding_amount: self.withholding_amount,
            grand_total: self.grand_total,
        }
    }

    pub fn apply_amounts(&mut self, amounts: &LineAmounts) {
        self.gross = amounts.gross;
        self.discount_amount = amounts.discount_amount;
        self.net = amounts.net;
        self.vat = amounts.vat;
        self.withholding_rate = amounts.withholding_rate;
        self.withholding_amount = amounts.withholding_amount;
        self.grand_total = amounts.grand_total;
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// A persisted stock movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub branch_id: i64,
    pub warehouse_id: i64,
    pub item_id: i64,
    pub movement_type: StockMovementType,
    /// Always positive, 3 places.
    pub quantity: Decimal,
    pub transaction_date_utc: DateTime<Utc>,
    pub note: Option<String>,
    /// Back-reference used for reset-and-recreate on invoice edits.
    pub invoice_id: Option<i64>,
    pub row_version: RowVersion,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A stock movement planned for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockMovement {
    pub branch_id: i64,
    pub warehouse_id: i64,
    pub item_id: i64,
    pub movement_type: StockMovementType,
    pub quantity: Decimal,
    pub transaction_date_utc: DateTime<Utc>,
    pub note: Option<String>,
    pub invoice_id: Option<i64>,
}

// =============================================================================
// Warehouse
// =============================================================================

/// A branch warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: i64,
    pub branch_id: i64,
    pub code: String,
    pub name: String,
    pub is_default: bool,
    pub is_deleted: bool,
}

// =============================================================================
// Payment
// =============================================================================

/// Money moved through a cash/bank account, optionally settling an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub branch_id: i64,
    pub account_id: i64,
    pub contact_id: Option<i64>,
    pub linked_invoice_id: Option<i64>,
    pub date_utc: DateTime<Utc>,
    pub direction: PaymentDirection,
    /// Always positive, 2 places.
    pub amount: Decimal,
    pub currency: Currency,
    pub description: Option<String>,
    pub row_version: RowVersion,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Drafts (validated command input)
// =============================================================================

/// Invoice input shared by create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDraft {
    pub contact_id: i64,
    pub order_id: Option<i64>,
    pub date_utc: DateTime<Utc>,
    pub currency: Option<String>,
    pub currency_rate: Option<Decimal>,
    pub invoice_type: InvoiceType,
    pub document_type: Option<String>,
    pub waybill_number: Option<String>,
    pub waybill_date_utc: Option<DateTime<Utc>>,
    pub payment_due_date_utc: Option<DateTime<Utc>>,
    pub lines: Vec<LineDraft>,
}

/// One requested line. `id` is `None` for new lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LineDraft {
    pub id: Option<i64>,
    pub item_id: Option<i64>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: i32,
    pub discount_rate: Option<Decimal>,
    pub withholding_rate: Option<i32>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, item_type: ItemType) -> ItemSnapshot {
        ItemSnapshot {
            id,
            code: format!("ITM-{id}"),
            name: format!("Item {id}"),
            unit: None,
            item_type,
            default_withholding_rate: None,
            sales_account_code: Some("600".to_string()),
            purchase_account_code: Some("153".to_string()),
        }
    }

    #[test]
    fn test_stock_movement_mapping() {
        assert_eq!(
            InvoiceType::Sales.stock_movement_type(),
            Some(StockMovementType::SalesOut)
        );
        assert_eq!(
            InvoiceType::SalesReturn.stock_movement_type(),
            Some(StockMovementType::SalesReturn)
        );
        assert_eq!(
            InvoiceType::Purchase.stock_movement_type(),
            Some(StockMovementType::PurchaseIn)
        );
        assert_eq!(
            InvoiceType::PurchaseReturn.stock_movement_type(),
            Some(StockMovementType::PurchaseReturn)
        );
        assert_eq!(InvoiceType::Expense.stock_movement_type(), None);

        assert_eq!(StockMovementType::SalesReturn.direction(), StockDirection::In);
        assert_eq!(StockMovementType::PurchaseReturn.direction(), StockDirection::Out);
    }

    #[test]
    fn test_only_inventory_moves_stock() {
        assert!(ItemType::Inventory.moves_stock());
        assert!(!ItemType::Service.moves_stock());
        assert!(!ItemType::Expense.moves_stock());
        assert!(!ItemType::FixedAsset.moves_stock());
    }

    #[test]
    fn test_invoice_type_parse() {
        assert_eq!("Sales".parse::<InvoiceType>().unwrap(), InvoiceType::Sales);
        assert_eq!(
            "sales_return".parse::<InvoiceType>().unwrap(),
            InvoiceType::SalesReturn
        );
        assert_eq!(
            "PurchaseReturn".parse::<InvoiceType>().unwrap(),
            InvoiceType::PurchaseReturn
        );
        assert!("proforma".parse::<InvoiceType>().is_err());

        for t in InvoiceType::ALL {
            assert_eq!(t.as_str().parse::<InvoiceType>().unwrap(), t);
        }
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(" usd ".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("try".parse::<Currency>().unwrap(), Currency::Try);
        assert!(matches!(
            "JPY".parse::<Currency>(),
            Err(CoreError::UnsupportedCurrency { code }) if code == "JPY"
        ));
        assert_eq!(serde_json::to_string(&Currency::Eur).unwrap(), "\"EUR\"");
    }

    #[test]
    fn test_account_code_snapshot() {
        let snapshot = item(1, ItemType::Inventory);
        assert_eq!(snapshot.account_code_for(InvoiceType::Sales), Some("600"));
        assert_eq!(snapshot.account_code_for(InvoiceType::SalesReturn), Some("600"));
        assert_eq!(snapshot.account_code_for(InvoiceType::Purchase), Some("153"));
        assert_eq!(snapshot.account_code_for(InvoiceType::Expense), Some("153"));
    }

    #[test]
    fn test_reference_map_resolve() {
        let refs = ReferenceMap::from_items(vec![
            item(1, ItemType::Inventory),
            item(2, ItemType::Service),
        ]);

        assert_eq!(refs.len(), 2);
        assert!(refs.resolve("lines[0].itemId", Some(1)).unwrap().moves_stock());
        assert!(!refs.resolve("lines[1].itemId", Some(2)).unwrap().moves_stock());

        assert!(matches!(
            refs.resolve("lines[0].itemId", None),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            refs.resolve("lines[2].itemId", Some(99)),
            Err(ValidationError::UnknownReference { id: 99, .. })
        ));
    }
}
