//! # Warehouse Repository
//!
//! ## Posting Warehouse Resolution
//! ```text
//! branch warehouses (live only)
//!      │
//!      ├── one flagged is_default?  → use it
//!      ├── otherwise any?           → lowest id
//!      └── none                     → None (caller fails with NoWarehouse)
//! ```

use chrono::Utc;
use defter_core::Warehouse;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Repository for warehouse database operations.
#[derive(Debug, Clone)]
pub struct WarehouseRepository {
    pool: SqlitePool,
}

impl WarehouseRepository {
    /// Creates a new WarehouseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        WarehouseRepository { pool }
    }

    /// Inserts a warehouse and returns its id.
    pub async fn insert(&self, branch_id: i64, code: &str, name: &str, is_default: bool) -> DbResult<i64> {
        debug!(branch_id = branch_id, code = %code, is_default = is_default, "Inserting warehouse");

        let result = sqlx::query(
            r#"
            INSERT INTO warehouses (branch_id, code, name, is_default, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(branch_id)
        .bind(code)
        .bind(name)
        .bind(is_default)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Lists the live warehouses of a branch, default first.
    pub async fn list_for_branch(&self, branch_id: i64) -> DbResult<Vec<Warehouse>> {
        let warehouses: Vec<Warehouse> = sqlx::query_as::<_, WarehouseRecord>(
            r#"
            SELECT id, branch_id, code, name, is_default, is_deleted
            FROM warehouses
            WHERE branch_id = ?1 AND is_deleted = 0
            ORDER BY is_default DESC, id ASC
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Warehouse::from)
        .collect();

        Ok(warehouses)
    }

    /// Resolves the warehouse that receives stock postings for a branch.
    ///
    /// Runs on the caller's transaction so the choice is consistent with the
    /// movements written next.
    pub async fn resolve_for_branch(
        &self,
        conn: &mut SqliteConnection,
        branch_id: i64,
    ) -> DbResult<Option<Warehouse>> {
        let record: Option<WarehouseRecord> = sqlx::query_as(
            r#"
            SELECT id, branch_id, code, name, is_default, is_deleted
            FROM warehouses
            WHERE branch_id = ?1 AND is_deleted = 0
            ORDER BY is_default DESC, id ASC
            LIMIT 1
            "#,
        )
        .bind(branch_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(record.map(Warehouse::from))
    }

    /// Soft-deletes a warehouse.
    pub async fn soft_delete(&self, branch_id: i64, id: i64) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE warehouses SET is_deleted = 1 WHERE id = ?1 AND branch_id = ?2 AND is_deleted = 0",
        )
        .bind(id)
        .bind(branch_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Warehouse", id));
        }

        Ok(())
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct WarehouseRecord {
    id: i64,
    branch_id: i64,
    code: String,
    name: String,
    is_default: bool,
    is_deleted: bool,
}

impl From<WarehouseRecord> for Warehouse {
    fn from(r: WarehouseRecord) -> Self {
        Warehouse {
            id: r.id,
            branch_id: r.branch_id,
            code: r.code,
            name: r.name,
            is_default: r.is_default,
            is_deleted: r.is_deleted,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::fixtures::seeded;

    #[tokio::test]
    async fn test_resolution_prefers_default_then_lowest_id() {
        let s = seeded().await;
        let repo = s.db.warehouses();

        {
            let mut tx = s.db.begin().await.unwrap();
            assert!(repo.resolve_for_branch(&mut tx, s.branch_id).await.unwrap().is_none());
        }

        let first = repo.insert(s.branch_id, "W1", "Depo 1", false).await.unwrap();
        let _second = repo.insert(s.branch_id, "W2", "Depo 2", false).await.unwrap();
        {
            let mut tx = s.db.begin().await.unwrap();
            let resolved = repo.resolve_for_branch(&mut tx, s.branch_id).await.unwrap().unwrap();
            assert_eq!(resolved.id, first);
        }

        let default = repo.insert(s.branch_id, "W3", "Ana Depo", true).await.unwrap();
        {
            let mut tx = s.db.begin().await.unwrap();
            let resolved = repo.resolve_for_branch(&mut tx, s.branch_id).await.unwrap().unwrap();
            assert_eq!(resolved.id, default);
        }

        repo.soft_delete(s.branch_id, default).await.unwrap();
        {
            let mut tx = s.db.begin().await.unwrap();
            let resolved = repo.resolve_for_branch(&mut tx, s.branch_id).await.unwrap().unwrap();
            assert_eq!(resolved.id, first);
            assert!(repo
                .resolve_for_branch(&mut tx, s.other_branch_id)
                .await
                .unwrap()
                .is_none());
        }

        let listed = repo.list_for_branch(s.branch_id).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
