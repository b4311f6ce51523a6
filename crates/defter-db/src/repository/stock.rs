//! # Stock Repository
//!
//! Stock movements and the availability figures derived from them.
//!
//! ## Availability
//! ```text
//! available(branch, item) = Σ live inbound quantity − Σ live outbound quantity
//!
//!   inbound:  purchase_in, sales_return
//!   outbound: sales_out,   purchase_return
//! ```
//!
//! Availability is recomputed from movements on every read; there is no
//! cached on-hand column to drift out of sync.
//!
//! ## Invoice-Linked Movements
//! Movements written for an invoice carry its id. Editing the invoice
//! soft-deletes every live movement with that id and writes a fresh set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use defter_core::{
    ItemType, NewStockMovement, RowVersion, StockDirection, StockMovement, StockMovementType, StockShortage,
};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{milli, quantity};
use crate::error::DbResult;

const INBOUND: [StockMovementType; 2] = [StockMovementType::PurchaseIn, StockMovementType::SalesReturn];

/// Repository for stock movements.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    // =========================================================================
    // Writes (caller's transaction)
    // =========================================================================

    /// Inserts movements and returns their ids, in order.
    pub async fn insert_movements(
        &self,
        conn: &mut SqliteConnection,
        movements: &[NewStockMovement],
    ) -> DbResult<Vec<i64>> {
        let now = Utc::now();
        let mut ids = Vec::with_capacity(movements.len());

        for movement in movements {
            debug!(
                item_id = movement.item_id,
                warehouse_id = movement.warehouse_id,
                movement_type = ?movement.movement_type,
                quantity = %movement.quantity,
                "Inserting stock movement"
            );

            let result = sqlx::query(
                r#"
                INSERT INTO stock_movements (
                    branch_id, warehouse_id, item_id, movement_type,
                    quantity_milli, transaction_date_utc, note, invoice_id,
                    row_version, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(movement.branch_id)
            .bind(movement.warehouse_id)
            .bind(movement.item_id)
            .bind(movement.movement_type)
            .bind(milli(movement.quantity.abs())?)
            .bind(movement.transaction_date_utc)
            .bind(&movement.note)
            .bind(movement.invoice_id)
            .bind(RowVersion::INITIAL.value())
            .bind(now)
            .execute(&mut *conn)
            .await?;

            ids.push(result.last_insert_rowid());
        }

        Ok(ids)
    }

    /// Soft-deletes every live movement linked to an invoice.
    ///
    /// Returns the number of movements removed.
    pub async fn soft_delete_for_invoice(&self, conn: &mut SqliteConnection, invoice_id: i64) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE stock_movements SET
                is_deleted = 1,
                deleted_at = ?2,
                row_version = row_version + 1
            WHERE invoice_id = ?1 AND is_deleted = 0
            "#,
        )
        .bind(invoice_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        debug!(invoice_id = invoice_id, removed = result.rows_affected(), "Reset invoice stock movements");

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Movements linked to an invoice, oldest first.
    pub async fn list_for_invoice(&self, invoice_id: i64, include_deleted: bool) -> DbResult<Vec<StockMovement>> {
        let records: Vec<MovementRecord> = sqlx::query_as(
            r#"
            SELECT id, branch_id, warehouse_id, item_id, movement_type, quantity_milli,
                   transaction_date_utc, note, invoice_id, row_version, created_at,
                   is_deleted, deleted_at
            FROM stock_movements
            WHERE invoice_id = ?1 AND (?2 OR is_deleted = 0)
            ORDER BY id
            "#,
        )
        .bind(invoice_id)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(StockMovement::from).collect())
    }

    /// Current available quantity of an item in a branch.
    pub async fn available_quantity(&self, branch_id: i64, item_id: i64) -> DbResult<Decimal> {
        let milli: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(
                CASE WHEN movement_type IN (?3, ?4) THEN quantity_milli ELSE -quantity_milli END
            ), 0)
            FROM stock_movements
            WHERE branch_id = ?1 AND item_id = ?2 AND is_deleted = 0
            "#,
        )
        .bind(branch_id)
        .bind(item_id)
        .bind(INBOUND[0])
        .bind(INBOUND[1])
        .fetch_one(&self.pool)
        .await?;

        Ok(quantity(milli))
    }

    /// Checks every requested quantity against availability.
    ///
    /// Only inventory items are checked; unknown ids are skipped. Returns
    /// every shortage found, empty when all items are covered.
    pub async fn find_shortages(
        &self,
        branch_id: i64,
        requirements: &BTreeMap<i64, Decimal>,
    ) -> DbResult<Vec<StockShortage>> {
        let mut shortages = Vec::new();

        for (&item_id, &requested) in requirements {
            let item: Option<(String, ItemType)> =
                sqlx::query_as("SELECT code, item_type FROM items WHERE id = ?1 AND is_deleted = 0")
                    .bind(item_id)
                    .fetch_optional(&self.pool)
                    .await?;

            let Some((item_code, item_type)) = item else {
                continue;
            };
            if !item_type.moves_stock() {
                continue;
            }

            let available = self.available_quantity(branch_id, item_id).await?;
            if available < requested {
                shortages.push(StockShortage {
                    item_id,
                    item_code,
                    available,
                    requested,
                });
            }
        }

        debug!(
            branch_id = branch_id,
            checked = requirements.len(),
            shortages = shortages.len(),
            "Stock availability checked"
        );

        Ok(shortages)
    }
}

/// Signed effect of a movement on availability.
pub fn signed_quantity(movement: &StockMovement) -> Decimal {
    match movement.movement_type.direction() {
        StockDirection::In => movement.quantity,
        StockDirection::Out => -movement.quantity,
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct MovementRecord {
    id: i64,
    branch_id: i64,
    warehouse_id: i64,
    item_id: i64,
    movement_type: StockMovementType,
    quantity_milli: i64,
    transaction_date_utc: DateTime<Utc>,
    note: Option<String>,
    invoice_id: Option<i64>,
    row_version: i64,
    created_at: DateTime<Utc>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<MovementRecord> for StockMovement {
    fn from(r: MovementRecord) -> Self {
        StockMovement {
            id: r.id,
            branch_id: r.branch_id,
            warehouse_id: r.warehouse_id,
            item_id: r.item_id,
            movement_type: r.movement_type,
            quantity: quantity(r.quantity_milli),
            transaction_date_utc: r.transaction_date_utc,
            note: r.note,
            invoice_id: r.invoice_id,
            row_version: RowVersion::new(r.row_version),
            created_at: r.created_at,
            is_deleted: r.is_deleted,
            deleted_at: r.deleted_at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::fixtures::{now, seeded};
    use super::*;
    use rust_decimal_macros::dec;

    fn movement(branch_id: i64, warehouse_id: i64, item_id: i64, movement_type: StockMovementType, qty: Decimal) -> NewStockMovement {
        NewStockMovement {
            branch_id,
            warehouse_id,
            item_id,
            movement_type,
            quantity: qty,
            transaction_date_utc: now(),
            note: None,
            invoice_id: None,
        }
    }

    #[tokio::test]
    async fn test_availability_from_movements() {
        let s = seeded().await;
        let warehouse = s.db.warehouses().insert(s.branch_id, "W1", "Depo", true).await.unwrap();
        let stock = s.db.stock();
        let item = s.inventory_item_id;

        let mut tx = s.db.begin().await.unwrap();
        stock
            .insert_movements(
                &mut tx,
                &[
                    movement(s.branch_id, warehouse, item, StockMovementType::PurchaseIn, dec!(10)),
                    movement(s.branch_id, warehouse, item, StockMovementType::SalesOut, dec!(3.5)),
                    movement(s.branch_id, warehouse, item, StockMovementType::SalesReturn, dec!(1)),
                    movement(s.branch_id, warehouse, item, StockMovementType::PurchaseReturn, dec!(0.25)),
                ],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stock.available_quantity(s.branch_id, item).await.unwrap(), dec!(7.250));
        assert_eq!(stock.available_quantity(s.other_branch_id, item).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn test_shortages_collect_every_inventory_item() {
        let s = seeded().await;
        let warehouse = s.db.warehouses().insert(s.branch_id, "W1", "Depo", true).await.unwrap();
        let stock = s.db.stock();

        let mut tx = s.db.begin().await.unwrap();
        stock
            .insert_movements(
                &mut tx,
                &[movement(s.branch_id, warehouse, s.inventory_item_id, StockMovementType::PurchaseIn, dec!(5))],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut requirements = BTreeMap::new();
        requirements.insert(s.inventory_item_id, dec!(100));
        requirements.insert(s.service_item_id, dec!(1000));
        requirements.insert(999, dec!(1));

        let shortages = stock.find_shortages(s.branch_id, &requirements).await.unwrap();
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].item_code, "KLM-01");
        assert_eq!(shortages[0].available, dec!(5.000));
        assert_eq!(shortages[0].requested, dec!(100));

        requirements.insert(s.inventory_item_id, dec!(5));
        assert!(stock.find_shortages(s.branch_id, &requirements).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_for_invoice_only_touches_linked_movements() {
        let s = seeded().await;
        let warehouse = s.db.warehouses().insert(s.branch_id, "W1", "Depo", true).await.unwrap();
        let stock = s.db.stock();
        let invoice_id = crate::repository::invoice::tests::insert_bare_invoice(&s).await;

        let mut linked = movement(s.branch_id, warehouse, s.inventory_item_id, StockMovementType::PurchaseIn, dec!(2));
        linked.invoice_id = Some(invoice_id);
        let unlinked = movement(s.branch_id, warehouse, s.inventory_item_id, StockMovementType::PurchaseIn, dec!(3));

        let mut tx = s.db.begin().await.unwrap();
        stock.insert_movements(&mut tx, &[linked, unlinked]).await.unwrap();
        assert_eq!(stock.soft_delete_for_invoice(&mut tx, invoice_id).await.unwrap(), 1);
        assert_eq!(stock.soft_delete_for_invoice(&mut tx, invoice_id).await.unwrap(), 0);
        tx.commit().await.unwrap();

        assert!(stock.list_for_invoice(invoice_id, false).await.unwrap().is_empty());
        let all = stock.list_for_invoice(invoice_id, true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_deleted);
        assert_eq!(all[0].row_version, RowVersion::new(2));
        assert_eq!(signed_quantity(&all[0]), dec!(2.000));

        assert_eq!(
            stock.available_quantity(s.branch_id, s.inventory_item_id).await.unwrap(),
            dec!(3.000)
        );
    }
}
