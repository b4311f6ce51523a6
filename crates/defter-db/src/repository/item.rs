//! # Item Repository
//!
//! Items are global master data. Invoice commands read them once per request
//! as a batch of snapshots; nothing here changes an item after it is posted
//! on an invoice.

use std::collections::BTreeSet;

use chrono::Utc;
use defter_core::{ItemSnapshot, ItemType, ReferenceMap};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// An item to insert.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub code: String,
    pub name: String,
    pub unit: Option<String>,
    pub item_type: ItemType,
    pub default_withholding_rate: Option<i32>,
    pub sales_account_code: Option<String>,
    pub purchase_account_code: Option<String>,
}

/// Repository for item database operations.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    /// Creates a new ItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ItemRepository { pool }
    }

    /// Inserts an item and returns its id.
    pub async fn insert(&self, item: &NewItem) -> DbResult<i64> {
        debug!(code = %item.code, item_type = ?item.item_type, "Inserting item");

        let result = sqlx::query(
            r#"
            INSERT INTO items (
                code, name, unit, item_type, default_withholding_rate,
                sales_account_code, purchase_account_code, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.code)
        .bind(&item.name)
        .bind(&item.unit)
        .bind(item.item_type)
        .bind(item.default_withholding_rate)
        .bind(&item.sales_account_code)
        .bind(&item.purchase_account_code)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Gets one live item snapshot.
    pub async fn get(&self, id: i64) -> DbResult<Option<ItemSnapshot>> {
        let record: Option<ItemRecord> = sqlx::query_as(
            r#"
            SELECT id, code, name, unit, item_type, default_withholding_rate,
                   sales_account_code, purchase_account_code
            FROM items
            WHERE id = ?1 AND is_deleted = 0
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(ItemSnapshot::from))
    }

    /// Loads snapshots for every id in one query.
    ///
    /// Unknown and deleted ids are simply absent from the map; the caller
    /// turns a missing reference into a validation error.
    pub async fn snapshots(&self, ids: &BTreeSet<i64>) -> DbResult<ReferenceMap> {
        if ids.is_empty() {
            return Ok(ReferenceMap::default());
        }

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            r#"
            SELECT id, code, name, unit, item_type, default_withholding_rate,
                   sales_account_code, purchase_account_code
            FROM items
            WHERE is_deleted = 0 AND id IN (
            "#,
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let records: Vec<ItemRecord> = query.build_query_as().fetch_all(&self.pool).await?;

        debug!(requested = ids.len(), found = records.len(), "Loaded item snapshots");

        Ok(ReferenceMap::from_items(records.into_iter().map(ItemSnapshot::from)))
    }

    /// Soft-deletes an item.
    pub async fn soft_delete(&self, id: i64) -> DbResult<()> {
        sqlx::query("UPDATE items SET is_deleted = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct ItemRecord {
    id: i64,
    code: String,
    name: String,
    unit: Option<String>,
    item_type: ItemType,
    default_withholding_rate: Option<i32>,
    sales_account_code: Option<String>,
    purchase_account_code: Option<String>,
}

impl From<ItemRecord> for ItemSnapshot {
    fn from(r: ItemRecord) -> Self {
        ItemSnapshot {
            id: r.id,
            code: r.code,
            name: r.name,
            unit: r.unit,
            item_type: r.item_type,
            default_withholding_rate: r.default_withholding_rate,
            sales_account_code: r.sales_account_code,
            purchase_account_code: r.purchase_account_code,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
