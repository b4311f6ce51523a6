//! # Repository Module
//!
//! Database repository implementations for Defter.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Backoffice command                                                    │
//! │       │                                                                 │
//! │       │  db.invoices().insert(&mut tx, &invoice)                       │
//! │       ▼                                                                 │
//! │  InvoiceRepository                                                     │
//! │  ├── get(&self, branch_id, id)              (pool)                     │
//! │  ├── insert(&self, conn, invoice)           (caller's transaction)     │
//! │  └── update_header(&self, conn, invoice)    (caller's transaction)     │
//! │       │                                                                 │
//! │       │  SQL Query → *Record (FromRow) → domain type                   │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Money Columns
//! Decimals cross the boundary as INTEGER minor units. Every value is rounded
//! to its category precision before conversion, so the round trip is exact.
//!
//! ## Available Repositories
//!
//! - [`invoice::InvoiceRepository`] - Invoice headers and lines
//! - [`item::ItemRepository`] - Item snapshots
//! - [`warehouse::WarehouseRepository`] - Warehouses and default resolution
//! - [`stock::StockRepository`] - Stock movements and availability
//! - [`payment::PaymentRepository`] - Payments
//! - [`balance::BalanceRepository`] - Invoice, contact and account balances
//! - [`numbering::SequenceAllocator`] - Invoice number sequences
//! - [`master::MasterDataRepository`] - Branches, contacts, cash/bank accounts

pub mod balance;
pub mod invoice;
pub mod item;
pub mod master;
pub mod numbering;
pub mod payment;
pub mod stock;
pub mod warehouse;

use defter_core::Precision;
use rust_decimal::Decimal;

use crate::error::DbResult;

/// Decimal → INTEGER column.
pub(crate) fn to_minor(precision: Precision, value: Decimal) -> DbResult<i64> {
    Ok(precision.to_minor(value)?)
}

/// INTEGER column → Decimal.
pub(crate) fn from_minor(precision: Precision, minor: i64) -> Decimal {
    precision.from_minor(minor)
}

/// Amount (2 dp) → cents.
pub(crate) fn cents(value: Decimal) -> DbResult<i64> {
    to_minor(Precision::Amount, value)
}

/// Cents → amount (2 dp).
pub(crate) fn amount(cents: i64) -> Decimal {
    from_minor(Precision::Amount, cents)
}

/// Quantity (3 dp) → thousandths.
pub(crate) fn milli(value: Decimal) -> DbResult<i64> {
    to_minor(Precision::Quantity, value)
}

/// Thousandths → quantity (3 dp).
pub(crate) fn quantity(milli: i64) -> Decimal {
    from_minor(Precision::Quantity, milli)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared master data for repository tests.

    use chrono::{DateTime, TimeZone, Utc};
    use defter_core::ItemType;

    use super::item::NewItem;
    use crate::pool::{Database, DbConfig};

    pub struct Seeded {
        pub db: Database,
        pub branch_id: i64,
        pub other_branch_id: i64,
        pub contact_id: i64,
        pub account_id: i64,
        pub inventory_item_id: i64,
        pub service_item_id: i64,
    }

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    pub async fn seeded() -> Seeded {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let master = db.master();

        let branch_id = master.insert_branch("IST", "Istanbul").await.unwrap();
        let other_branch_id = master.insert_branch("ANK", "Ankara").await.unwrap();
        let contact_id = master.insert_contact(branch_id, "C001", "Acme Ltd").await.unwrap();
        let account_id = master
            .insert_cash_bank_account(branch_id, "KASA", "Main cash", defter_core::Currency::Try)
            .await
            .unwrap();

        let items = db.items();
        let inventory_item_id = items
            .insert(&NewItem {
                code: "KLM-01".to_string(),
                name: "Kalem".to_string(),
                unit: Some("adet".to_string()),
                item_type: ItemType::Inventory,
                default_withholding_rate: None,
                sales_account_code: Some("600".to_string()),
                purchase_account_code: Some("153".to_string()),
            })
            .await
            .unwrap();
        let service_item_id = items
            .insert(&NewItem {
                code: "SRV-01".to_string(),
                name: "Danismanlik".to_string(),
                unit: Some("saat".to_string()),
                item_type: ItemType::Service,
                default_withholding_rate: Some(50),
                sales_account_code: Some("600".to_string()),
                purchase_account_code: Some("770".to_string()),
            })
            .await
            .unwrap();

        Seeded {
            db,
            branch_id,
            other_branch_id,
            contact_id,
            account_id,
            inventory_item_id,
            service_item_id,
        }
    }
}
