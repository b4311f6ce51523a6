//! # Invoice Number Sequences
//!
//! Hands out `{PREFIX}-{YEAR}-{SEQ:06}` numbers, one counter per
//! (branch, prefix, year).
//!
//! ## Allocation
//! ```text
//! next(branch, "SAT", 2026)
//!      │
//!      ├── counter row exists?  → UPDATE last_value + 1 RETURNING
//!      │
//!      └── first use           → seed from the highest SAT-2026-* number
//!                                already stored for the branch, then
//!                                INSERT ... ON CONFLICT DO UPDATE RETURNING
//! ```
//!
//! Each step is a single statement, so two callers never receive the same
//! value. The `UNIQUE(branch_id, invoice_number)` constraint on invoices
//! still backs this up; callers retry on a collision.

use defter_core::numbering::{format_invoice_number, parse_invoice_number};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Allocator for per-branch invoice number sequences.
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    pool: SqlitePool,
}

impl SequenceAllocator {
    /// Creates a new SequenceAllocator.
    pub fn new(pool: SqlitePool) -> Self {
        SequenceAllocator { pool }
    }

    /// Allocates the next invoice number for a branch, prefix and year.
    pub async fn next(&self, branch_id: i64, prefix: &str, year: i32) -> DbResult<String> {
        let bumped: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE invoice_number_sequences
            SET last_value = last_value + 1
            WHERE branch_id = ?1 AND prefix = ?2 AND year = ?3
            RETURNING last_value
            "#,
        )
        .bind(branch_id)
        .bind(prefix)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        let value = match bumped {
            Some(value) => value,
            None => {
                let seed = self.highest_stored(branch_id, prefix, year).await?;
                sqlx::query_scalar(
                    r#"
                    INSERT INTO invoice_number_sequences (branch_id, prefix, year, last_value)
                    VALUES (?1, ?2, ?3, ?4 + 1)
                    ON CONFLICT (branch_id, prefix, year)
                    DO UPDATE SET last_value = last_value + 1
                    RETURNING last_value
                    "#,
                )
                .bind(branch_id)
                .bind(prefix)
                .bind(year)
                .bind(seed)
                .fetch_one(&self.pool)
                .await?
            }
        };

        let sequence = u32::try_from(value)
            .map_err(|_| DbError::Internal(format!("Invoice sequence {prefix}-{year} overflowed: {value}")))?;
        let number = format_invoice_number(prefix, year, sequence);

        debug!(branch_id = branch_id, number = %number, "Allocated invoice number");

        Ok(number)
    }

    /// Highest sequence already used by stored invoices (deleted ones too).
    async fn highest_stored(&self, branch_id: i64, prefix: &str, year: i32) -> DbResult<i64> {
        let pattern = format!("{prefix}-{year}-%");
        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT invoice_number FROM invoices WHERE branch_id = ?1 AND invoice_number LIKE ?2",
        )
        .bind(branch_id)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers
            .iter()
            .filter_map(|n| parse_invoice_number(n))
            .filter(|n| n.prefix == prefix && n.year == year)
            .map(|n| i64::from(n.sequence))
            .max()
            .unwrap_or(0))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::fixtures::seeded;

    #[tokio::test]
    async fn test_sequential_per_branch_prefix_and_year() {
        let s = seeded().await;
        let seq = s.db.sequences();

        assert_eq!(seq.next(s.branch_id, "SAT", 2026).await.unwrap(), "SAT-2026-000001");
        assert_eq!(seq.next(s.branch_id, "SAT", 2026).await.unwrap(), "SAT-2026-000002");
        assert_eq!(seq.next(s.branch_id, "ALI", 2026).await.unwrap(), "ALI-2026-000001");
        assert_eq!(seq.next(s.branch_id, "SAT", 2027).await.unwrap(), "SAT-2027-000001");
        assert_eq!(seq.next(s.other_branch_id, "SAT", 2026).await.unwrap(), "SAT-2026-000001");
        assert_eq!(seq.next(s.branch_id, "SAT", 2026).await.unwrap(), "SAT-2026-000003");
    }

    #[tokio::test]
    async fn test_first_allocation_continues_after_stored_numbers() {
        let s = seeded().await;
        // Stored as SAT-2026-000900
        crate::repository::invoice::tests::insert_bare_invoice(&s).await;

        let seq = s.db.sequences();
        assert_eq!(seq.next(s.branch_id, "SAT", 2026).await.unwrap(), "SAT-2026-000901");
        assert_eq!(seq.next(s.branch_id, "SAT", 2025).await.unwrap(), "SAT-2025-000001");
        assert_eq!(seq.next(s.other_branch_id, "SAT", 2026).await.unwrap(), "SAT-2026-000001");
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_distinct() {
        let s = seeded().await;
        let seq = s.db.sequences();

        let (a, b, c) = tokio::join!(
            seq.next(s.branch_id, "MAS", 2026),
            seq.next(s.branch_id, "MAS", 2026),
            seq.next(s.branch_id, "MAS", 2026),
        );
        let mut numbers = vec![a.unwrap(), b.unwrap(), c.unwrap()];
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 3);
    }
}
