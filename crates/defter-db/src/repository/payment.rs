//! # Payment Repository
//!
//! Payments move money through a cash/bank account and may settle one
//! invoice. Amounts are stored positive; `direction` carries the sign.
//!
//! Writes run on the caller's transaction, next to the balance
//! recalculation they trigger.

use chrono::{DateTime, Utc};
use defter_core::{Currency, Payment, PaymentDirection, RowVersion};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{amount, cents};
use crate::error::{DbError, DbResult};

const PAYMENT_COLUMNS: &str = r#"
    id, branch_id, account_id, contact_id, linked_invoice_id, date_utc,
    direction, amount_cents, currency, description, row_version,
    created_at, is_deleted, deleted_at
"#;

/// A payment to insert.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub branch_id: i64,
    pub account_id: i64,
    pub contact_id: Option<i64>,
    pub linked_invoice_id: Option<i64>,
    pub date_utc: DateTime<Utc>,
    pub direction: PaymentDirection,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: Option<String>,
}

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Inserts a payment and returns its id.
    pub async fn insert(&self, conn: &mut SqliteConnection, payment: &NewPayment) -> DbResult<i64> {
        debug!(
            account_id = payment.account_id,
            linked_invoice_id = ?payment.linked_invoice_id,
            direction = ?payment.direction,
            amount = %payment.amount,
            "Inserting payment"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                branch_id, account_id, contact_id, linked_invoice_id, date_utc,
                direction, amount_cents, currency, description, row_version, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(payment.branch_id)
        .bind(payment.account_id)
        .bind(payment.contact_id)
        .bind(payment.linked_invoice_id)
        .bind(payment.date_utc)
        .bind(payment.direction)
        .bind(cents(payment.amount)?)
        .bind(payment.currency)
        .bind(&payment.description)
        .bind(RowVersion::INITIAL.value())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Gets a live payment within a branch.
    pub async fn get(&self, branch_id: i64, id: i64) -> DbResult<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE id = ?1 AND branch_id = ?2 AND is_deleted = 0",
            PAYMENT_COLUMNS
        );

        let record: Option<PaymentRecord> = sqlx::query_as(&sql)
            .bind(id)
            .bind(branch_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Payment::from))
    }

    /// Live payments linked to an invoice, oldest first.
    pub async fn list_for_invoice(&self, invoice_id: i64) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE linked_invoice_id = ?1 AND is_deleted = 0 ORDER BY id",
            PAYMENT_COLUMNS
        );

        let records: Vec<PaymentRecord> = sqlx::query_as(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(Payment::from).collect())
    }

    /// Sum of live payments linked to an invoice.
    pub async fn total_linked(&self, invoice_id: i64) -> DbResult<Decimal> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE linked_invoice_id = ?1 AND is_deleted = 0",
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(amount(total))
    }

    /// Soft-deletes a payment if its row version still matches.
    pub async fn soft_delete(
        &self,
        conn: &mut SqliteConnection,
        branch_id: i64,
        id: i64,
        expected: RowVersion,
    ) -> DbResult<()> {
        debug!(payment_id = id, expected_version = expected.value(), "Soft-deleting payment");

        let result = sqlx::query(
            r#"
            UPDATE payments SET
                is_deleted = 1,
                deleted_at = ?4,
                row_version = row_version + 1
            WHERE id = ?1 AND branch_id = ?2 AND row_version = ?3 AND is_deleted = 0
            "#,
        )
        .bind(id)
        .bind(branch_id)
        .bind(expected.value())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Payment", id));
        }

        Ok(())
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct PaymentRecord {
    id: i64,
    branch_id: i64,
    account_id: i64,
    contact_id: Option<i64>,
    linked_invoice_id: Option<i64>,
    date_utc: DateTime<Utc>,
    direction: PaymentDirection,
    amount_cents: i64,
    currency: Currency,
    description: Option<String>,
    row_version: i64,
    created_at: DateTime<Utc>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<PaymentRecord> for Payment {
    fn from(r: PaymentRecord) -> Self {
        Payment {
            id: r.id,
            branch_id: r.branch_id,
            account_id: r.account_id,
            contact_id: r.contact_id,
            linked_invoice_id: r.linked_invoice_id,
            date_utc: r.date_utc,
            direction: r.direction,
            amount: amount(r.amount_cents),
            currency: r.currency,
            description: r.description,
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
