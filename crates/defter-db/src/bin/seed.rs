//! # Demo Data Seeder
//!
//! Populates a database with master data for trying invoice commands.
//!
//! ## Usage
//! ```bash
//! # Seed ./data/defter.db
//! cargo run -p defter-db --bin seed
//!
//! # Specify database path
//! cargo run -p defter-db --bin seed -- --db ./data/demo.db
//! ```
//!
//! ## Generated Data
//! - Branch `IST` with a default warehouse `MERKEZ`
//! - Customers and suppliers
//! - A TRY cash account and a USD bank account
//! - Inventory items with opening stock (purchase_in movements)
//! - Service items, some carrying a default withholding rate

use std::env;

use chrono::Utc;
use defter_core::{Currency, ItemType, NewStockMovement, StockMovementType};
use defter_db::repository::item::NewItem;
use defter_db::{Database, DbConfig};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

const BRANCH_CODE: &str = "IST";

/// (code, name)
const CONTACTS: &[(&str, &str)] = &[
    ("C001", "Anadolu Kirtasiye Ltd"),
    ("C002", "Ege Gida AS"),
    ("S001", "Marmara Toptan"),
    ("S002", "Karadeniz Lojistik"),
];

/// (code, name, unit, opening stock)
const INVENTORY_ITEMS: &[(&str, &str, &str, i64)] = &[
    ("KLM-01", "Tukenmez Kalem", "adet", 500),
    ("DFT-01", "Spiralli Defter", "adet", 200),
    ("KGT-A4", "A4 Fotokopi Kagidi", "paket", 80),
    ("TNR-01", "Yazici Toneri", "adet", 12),
];

/// (code, name, unit, default withholding rate)
const SERVICE_ITEMS: &[(&str, &str, &str, Option<i32>)] = &[
    ("SRV-DAN", "Danismanlik", "saat", Some(50)),
    ("SRV-BAK", "Bakim Onarim", "saat", Some(70)),
    ("SRV-NAK", "Nakliye", "sefer", None),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./data/defter.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Defter Demo Data Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./data/defter.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Defter Demo Data Seeder");
    println!("=======================");
    println!("Database: {}", db_path);
    println!();

    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let master = db.master();
    if let Some(existing) = master.find_branch_by_code(BRANCH_CODE).await? {
        println!("⚠ Branch {} already exists (id {})", BRANCH_CODE, existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let branch_id = master.insert_branch(BRANCH_CODE, "Istanbul Merkez").await?;
    let warehouse_id = db.warehouses().insert(branch_id, "MERKEZ", "Merkez Depo", true).await?;
    println!("✓ Branch {} (id {}), warehouse id {}", BRANCH_CODE, branch_id, warehouse_id);

    for (code, name) in CONTACTS {
        let id = master.insert_contact(branch_id, code, name).await?;
        println!("  Contact {:<6} id {}", code, id);
    }

    let cash = master
        .insert_cash_bank_account(branch_id, "KASA-TL", "Merkez Kasa", Currency::Try)
        .await?;
    let bank = master
        .insert_cash_bank_account(branch_id, "BANKA-USD", "Doviz Hesabi", Currency::Usd)
        .await?;
    println!("  Accounts: KASA-TL id {}, BANKA-USD id {}", cash, bank);

    let items = db.items();
    let mut opening = Vec::with_capacity(INVENTORY_ITEMS.len());
    let now = Utc::now();

    for (code, name, unit, stock) in INVENTORY_ITEMS {
        let id = items
            .insert(&NewItem {
                code: code.to_string(),
                name: name.to_string(),
                unit: Some(unit.to_string()),
                item_type: ItemType::Inventory,
                default_withholding_rate: None,
                sales_account_code: Some("600".to_string()),
                purchase_account_code: Some("153".to_string()),
            })
            .await?;
        println!("  Item {:<8} id {} (inventory, opening {})", code, id, stock);

        opening.push(NewStockMovement {
            branch_id,
            warehouse_id,
            item_id: id,
            movement_type: StockMovementType::PurchaseIn,
            quantity: Decimal::from(*stock),
            transaction_date_utc: now,
            note: Some("Opening stock".to_string()),
            invoice_id: None,
        });
    }

    for (code, name, unit, withholding) in SERVICE_ITEMS {
        let id = items
            .insert(&NewItem {
                code: code.to_string(),
                name: name.to_string(),
                unit: Some(unit.to_string()),
                item_type: ItemType::Service,
                default_withholding_rate: *withholding,
                sales_account_code: Some("600".to_string()),
                purchase_account_code: Some("770".to_string()),
            })
            .await?;
        println!("  Item {:<8} id {} (service)", code, id);
    }

    let mut tx = db.begin().await?;
    db.stock().insert_movements(&mut tx, &opening).await?;
    tx.commit().await?;
    println!("✓ Opening stock posted for {} items", opening.len());

    println!();
    println!("✓ Seed complete! Set DEFTER_BRANCH_ID={} for the backoffice driver.", branch_id);

    db.close().await;
    Ok(())
}
