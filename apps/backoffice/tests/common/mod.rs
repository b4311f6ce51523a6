//! Shared fixture for backoffice command tests.
//!
//! Every test gets its own in-memory database seeded with:
//!
//! | Branch | Warehouse | Contacts        | Account    | Stock            |
//! |--------|-----------|-----------------|------------|------------------|
//! | IST    | MERKEZ    | C001, C002      | KASA (TRY) | KLM-01 5, DFT 50 |
//! | ANK    | none      | C101            | none       | none             |

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use defter_backoffice::collaborators::StaticBranchContext;
use defter_backoffice::commands::invoice::{InvoiceLineRequest, InvoiceRequest};
use defter_backoffice::{AppState, BackofficeConfig};
use defter_core::{Currency, ItemType, NewStockMovement, StockMovementType};
use defter_db::repository::item::NewItem;
use defter_db::{Database, DbConfig};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

pub struct Fixture {
    pub state: AppState,
    pub db: Database,
    pub branch_id: i64,
    pub warehouse_id: i64,
    pub contact_id: i64,
    pub other_contact_id: i64,
    pub account_id: i64,
    /// Inventory item with 5 units in stock.
    pub pen_id: i64,
    /// Inventory item with 50 units in stock.
    pub notebook_id: i64,
    /// Service item with a default withholding rate of 50.
    pub consulting_id: i64,
    /// Branch without any warehouse.
    pub bare_branch_id: i64,
    pub bare_contact_id: i64,
}

impl Fixture {
    /// Same database, acting as another branch (or none).
    pub fn state_for(&self, branch_id: Option<i64>) -> AppState {
        self.state
            .clone()
            .with_branch_context(Arc::new(StaticBranchContext::new(branch_id)))
    }
}

pub fn invoice_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn token() -> CancellationToken {
    CancellationToken::new()
}

async fn insert_item(db: &Database, code: &str, item_type: ItemType, withholding: Option<i32>) -> i64 {
    db.items()
        .insert(&NewItem {
            code: code.to_string(),
            name: format!("{} item", code),
            unit: Some("adet".to_string()),
            item_type,
            default_withholding_rate: withholding,
            sales_account_code: Some("600".to_string()),
            purchase_account_code: Some("153".to_string()),
        })
        .await
        .unwrap()
}

pub async fn fixture() -> Fixture {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let master = db.master();

    let branch_id = master.insert_branch("IST", "Istanbul").await.unwrap();
    let bare_branch_id = master.insert_branch("ANK", "Ankara").await.unwrap();
    let warehouse_id = db.warehouses().insert(branch_id, "MERKEZ", "Merkez depo", true).await.unwrap();

    let contact_id = master.insert_contact(branch_id, "C001", "Acme Ltd").await.unwrap();
    let other_contact_id = master.insert_contact(branch_id, "C002", "Globex AS").await.unwrap();
    let bare_contact_id = master.insert_contact(bare_branch_id, "C101", "Initech").await.unwrap();
    let account_id = master
        .insert_cash_bank_account(branch_id, "KASA", "Main cash", Currency::Try)
        .await
        .unwrap();

    let pen_id = insert_item(&db, "KLM-01", ItemType::Inventory, None).await;
    let notebook_id = insert_item(&db, "DFT-01", ItemType::Inventory, None).await;
    let consulting_id = insert_item(&db, "SRV-01", ItemType::Service, Some(50)).await;

    let opening = |item_id: i64, quantity: Decimal| NewStockMovement {
        branch_id,
        warehouse_id,
        item_id,
        movement_type: StockMovementType::PurchaseIn,
        quantity,
        transaction_date_utc: invoice_date(),
        note: Some("Opening stock".to_string()),
        invoice_id: None,
    };
    let mut tx = db.begin().await.unwrap();
    db.stock()
        .insert_movements(&mut tx, &[opening(pen_id, Decimal::from(5)), opening(notebook_id, Decimal::from(50))])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let config = BackofficeConfig {
        branch_id: Some(branch_id),
        ..BackofficeConfig::default()
    };
    let state = AppState::new(db.clone(), config);

    Fixture {
        state,
        db,
        branch_id,
        warehouse_id,
        contact_id,
        other_contact_id,
        account_id,
        pen_id,
        notebook_id,
        consulting_id,
        bare_branch_id,
        bare_contact_id,
    }
}

pub fn line(item_id: i64, quantity: Decimal, unit_price: Decimal, vat_rate: i32) -> InvoiceLineRequest {
    InvoiceLineRequest {
        id: None,
        item_id: Some(item_id),
        quantity,
        unit_price,
        vat_rate,
        discount_rate: None,
        withholding_rate: None,
    }
}

pub fn invoice(invoice_type: &str, contact_id: i64, lines: Vec<InvoiceLineRequest>) -> InvoiceRequest {
    InvoiceRequest {
        contact_id,
        order_id: None,
        date_utc: invoice_date(),
        currency: None,
        currency_rate: None,
        invoice_type: invoice_type.to_string(),
        document_type: None,
        waybill_number: None,
        waybill_date_utc: None,
        payment_due_date_utc: None,
        lines,
    }
}
