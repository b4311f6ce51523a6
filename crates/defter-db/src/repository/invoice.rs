//! # Invoice Repository
//!
//! Database operations for invoice headers and lines.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CREATE (one transaction)                                               │
//! │     insert(header)        → id, row_version = 1                         │
//! │     insert_lines(lines)   → line ids                                    │
//! │                                                                         │
//! │  UPDATE (one transaction)                                               │
//! │     update_header(header, expected_version)                             │
//! │        WHERE id = ? AND branch_id = ? AND row_version = ?               │
//! │        0 rows → ConcurrencyConflict                                     │
//! │     update_line / insert_lines / soft_delete_line                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads are always scoped to a branch: an invoice of another branch is
//! indistinguishable from a missing one.

use chrono::{DateTime, Utc};
use defter_core::{Currency, Invoice, InvoiceLine, InvoiceType, Precision, RowVersion};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{amount, cents, from_minor, milli, quantity, to_minor};
use crate::error::{DbError, DbResult};

const INVOICE_COLUMNS: &str = r#"
    id, branch_id, contact_id, order_id, invoice_type, document_type, invoice_number,
    date_utc, currency, currency_rate_e4, waybill_number, waybill_date_utc,
    payment_due_date_utc, total_line_gross_cents, total_discount_cents, total_net_cents,
    total_vat_cents, total_withholding_cents, total_gross_cents, balance_cents,
    row_version, created_at, updated_at, is_deleted, deleted_at
"#;

const LINE_COLUMNS: &str = r#"
    id, invoice_id, item_id, item_code, item_name, unit, account_code,
    quantity_milli, unit_price_e4, vat_rate, discount_rate_bps, withholding_rate,
    gross_cents, discount_amount_cents, net_cents, vat_cents, withholding_amount_cents,
    grand_total_cents, created_at, updated_at, is_deleted, deleted_at
"#;

/// Repository for invoice database operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a live invoice header of the branch.
    pub async fn get(&self, branch_id: i64, id: i64) -> DbResult<Option<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE id = ?1 AND branch_id = ?2 AND is_deleted = 0",
            INVOICE_COLUMNS
        );
        let record: Option<InvoiceRecord> = sqlx::query_as(&sql)
            .bind(id)
            .bind(branch_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Invoice::from))
    }

    /// Lines of an invoice in insertion order.
    ///
    /// With `include_deleted = false` only active lines are returned.
    pub async fn lines(&self, invoice_id: i64, include_deleted: bool) -> DbResult<Vec<InvoiceLine>> {
        let sql = format!(
            "SELECT {} FROM invoice_lines WHERE invoice_id = ?1 AND (?2 OR is_deleted = 0) ORDER BY id",
            LINE_COLUMNS
        );
        let records: Vec<LineRecord> = sqlx::query_as(&sql)
            .bind(invoice_id)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(InvoiceLine::from).collect())
    }

    /// Number of live invoices in a branch.
    pub async fn count_for_branch(&self, branch_id: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE branch_id = ?1 AND is_deleted = 0")
            .bind(branch_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Writes (caller's transaction)
    // =========================================================================

    /// Inserts a header and returns its id. The stored row version is 1.
    pub async fn insert(&self, conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<i64> {
        debug!(
            branch_id = invoice.branch_id,
            invoice_number = %invoice.invoice_number,
            invoice_type = %invoice.invoice_type,
            "Inserting invoice"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO invoices (
                branch_id, contact_id, order_id, invoice_type, document_type, invoice_number,
                date_utc, currency, currency_rate_e4, waybill_number, waybill_date_utc,
                payment_due_date_utc, total_line_gross_cents, total_discount_cents,
                total_net_cents, total_vat_cents, total_withholding_cents, total_gross_cents,
                balance_cents, row_version, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16, ?17, ?18,
                ?19, ?20, ?21
            )
            "#,
        )
        .bind(invoice.branch_id)
        .bind(invoice.contact_id)
        .bind(invoice.order_id)
        .bind(invoice.invoice_type)
        .bind(&invoice.document_type)
        .bind(&invoice.invoice_number)
        .bind(invoice.date_utc)
        .bind(invoice.currency)
        .bind(to_minor(Precision::Currency, invoice.currency_rate)?)
        .bind(&invoice.waybill_number)
        .bind(invoice.waybill_date_utc)
        .bind(invoice.payment_due_date_utc)
        .bind(cents(invoice.total_line_gross)?)
        .bind(cents(invoice.total_discount)?)
        .bind(cents(invoice.total_net)?)
        .bind(cents(invoice.total_vat)?)
        .bind(cents(invoice.total_withholding)?)
        .bind(cents(invoice.total_gross)?)
        .bind(cents(invoice.balance)?)
        .bind(RowVersion::INITIAL.value())
        .bind(invoice.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrites header scalars and totals if the stored row version still
    /// equals `expected`. Returns the new row version.
    pub async fn update_header(
        &self,
        conn: &mut SqliteConnection,
        invoice: &Invoice,
        expected: RowVersion,
    ) -> DbResult<RowVersion> {
        debug!(id = invoice.id, expected_version = expected.value(), "Updating invoice header");

        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                contact_id = ?4,
                order_id = ?5,
                invoice_type = ?6,
                document_type = ?7,
                date_utc = ?8,
                currency = ?9,
                currency_rate_e4 = ?10,
                waybill_number = ?11,
                waybill_date_utc = ?12,
                payment_due_date_utc = ?13,
                total_line_gross_cents = ?14,
                total_discount_cents = ?15,
                total_net_cents = ?16,
                total_vat_cents = ?17,
                total_withholding_cents = ?18,
                total_gross_cents = ?19,
                balance_cents = ?20,
                updated_at = ?21,
                row_version = row_version + 1
            WHERE id = ?1 AND branch_id = ?2 AND row_version = ?3 AND is_deleted = 0
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.branch_id)
        .bind(expected.value())
        .bind(invoice.contact_id)
        .bind(invoice.order_id)
        .bind(invoice.invoice_type)
        .bind(&invoice.document_type)
        .bind(invoice.date_utc)
        .bind(invoice.currency)
        .bind(to_minor(Precision::Currency, invoice.currency_rate)?)
        .bind(&invoice.waybill_number)
        .bind(invoice.waybill_date_utc)
        .bind(invoice.payment_due_date_utc)
        .bind(cents(invoice.total_line_gross)?)
        .bind(cents(invoice.total_discount)?)
        .bind(cents(invoice.total_net)?)
        .bind(cents(invoice.total_vat)?)
        .bind(cents(invoice.total_withholding)?)
        .bind(cents(invoice.total_gross)?)
        .bind(cents(invoice.balance)?)
        .bind(invoice.updated_at.unwrap_or_else(Utc::now))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Invoice", invoice.id));
        }

        Ok(expected.next())
    }

    /// Inserts lines for an invoice and returns their ids, in order.
    pub async fn insert_lines(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: i64,
        lines: &[InvoiceLine],
    ) -> DbResult<Vec<i64>> {
        let mut ids = Vec::with_capacity(lines.len());

        for line in lines {
            debug!(invoice_id = invoice_id, item_code = %line.item_code, "Inserting invoice line");

            let result = sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    invoice_id, item_id, item_code, item_name, unit, account_code,
                    quantity_milli, unit_price_e4, vat_rate, discount_rate_bps, withholding_rate,
                    gross_cents, discount_amount_cents, net_cents, vat_cents,
                    withholding_amount_cents, grand_total_cents, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6,
                    ?7, ?8, ?9, ?10, ?11,
                    ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18
                )
                "#,
            )
            .bind(invoice_id)
            .bind(line.item_id)
            .bind(&line.item_code)
            .bind(&line.item_name)
            .bind(&line.unit)
            .bind(&line.account_code)
            .bind(milli(line.quantity)?)
            .bind(to_minor(Precision::UnitPrice, line.unit_price)?)
            .bind(line.vat_rate)
            .bind(to_minor(Precision::Percent, line.discount_rate)?)
            .bind(line.withholding_rate)
            .bind(cents(line.gross)?)
            .bind(cents(line.discount_amount)?)
            .bind(cents(line.net)?)
            .bind(cents(line.vat)?)
            .bind(cents(line.withholding_amount)?)
            .bind(cents(line.grand_total)?)
            .bind(line.created_at)
            .execute(&mut *conn)
            .await?;

            ids.push(result.last_insert_rowid());
        }

        Ok(ids)
    }

    /// Rewrites an active line in place (snapshot, inputs and amounts).
    pub async fn update_line(&self, conn: &mut SqliteConnection, line: &InvoiceLine) -> DbResult<()> {
        debug!(id = line.id, invoice_id = line.invoice_id, "Updating invoice line");

        let result = sqlx::query(
            r#"
            UPDATE invoice_lines SET
                item_id = ?3,
                item_code = ?4,
                item_name = ?5,
                unit = ?6,
                account_code = ?7,
                quantity_milli = ?8,
                unit_price_e4 = ?9,
                vat_rate = ?10,
                discount_rate_bps = ?11,
                withholding_rate = ?12,
                gross_cents = ?13,
                discount_amount_cents = ?14,
                net_cents = ?15,
                vat_cents = ?16,
                withholding_amount_cents = ?17,
                grand_total_cents = ?18,
                updated_at = ?19
            WHERE id = ?1 AND invoice_id = ?2 AND is_deleted = 0
            "#,
        )
        .bind(line.id)
        .bind(line.invoice_id)
        .bind(line.item_id)
        .bind(&line.item_code)
        .bind(&line.item_name)
        .bind(&line.unit)
        .bind(&line.account_code)
        .bind(milli(line.quantity)?)
        .bind(to_minor(Precision::UnitPrice, line.unit_price)?)
        .bind(line.vat_rate)
        .bind(to_minor(Precision::Percent, line.discount_rate)?)
        .bind(line.withholding_rate)
        .bind(cents(line.gross)?)
        .bind(cents(line.discount_amount)?)
        .bind(cents(line.net)?)
        .bind(cents(line.vat)?)
        .bind(cents(line.withholding_amount)?)
        .bind(cents(line.grand_total)?)
        .bind(line.updated_at.unwrap_or_else(Utc::now))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InvoiceLine", line.id));
        }

        Ok(())
    }

    /// Soft-deletes an active line.
    pub async fn soft_delete_line(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: i64,
        line_id: i64,
        deleted_at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = line_id, invoice_id = invoice_id, "Soft-deleting invoice line");

        let result = sqlx::query(
            r#"
            UPDATE invoice_lines SET is_deleted = 1, deleted_at = ?3, updated_at = ?3
            WHERE id = ?1 AND invoice_id = ?2 AND is_deleted = 0
            "#,
        )
        .bind(line_id)
        .bind(invoice_id)
        .bind(deleted_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InvoiceLine", line_id));
        }

        Ok(())
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct InvoiceRecord {
    id: i64,
    branch_id: i64,
    contact_id: i64,
    order_id: Option<i64>,
    invoice_type: InvoiceType,
    document_type: String,
    invoice_number: String,
    date_utc: DateTime<Utc>,
    currency: Currency,
    currency_rate_e4: i64,
    waybill_number: Option<String>,
    waybill_date_utc: Option<DateTime<Utc>>,
    payment_due_date_utc: Option<DateTime<Utc>>,
    total_line_gross_cents: i64,
    total_discount_cents: i64,
    total_net_cents: i64,
    total_vat_cents: i64,
    total_withholding_cents: i64,
    total_gross_cents: i64,
    balance_cents: i64,
    row_version: i64,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<InvoiceRecord> for Invoice {
    fn from(r: InvoiceRecord) -> Self {
        Invoice {
            id: r.id,
            branch_id: r.branch_id,
            contact_id: r.contact_id,
            order_id: r.order_id,
            invoice_type: r.invoice_type,
            document_type: r.document_type,
            invoice_number: r.invoice_number,
            date_utc: r.date_utc,
            currency: r.currency,
            currency_rate: from_minor(Precision::Currency, r.currency_rate_e4),
            waybill_number: r.waybill_number,
            waybill_date_utc: r.waybill_date_utc,
            payment_due_date_utc: r.payment_due_date_utc,
            total_line_gross: amount(r.total_line_gross_cents),
            total_discount: amount(r.total_discount_cents),
            total_net: amount(r.total_net_cents),
            total_vat: amount(r.total_vat_cents),
            total_withholding: amount(r.total_withholding_cents),
            total_gross: amount(r.total_gross_cents),
            balance: amount(r.balance_cents),
            created_at: r.created_at,
            updated_at: r.updated_at,
            is_deleted: r.is_deleted,
            deleted_at: r.deleted_at,
            row_version: RowVersion::new(r.row_version),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LineRecord {
    id: i64,
    invoice_id: i64,
    item_id: Option<i64>,
    item_code: String,
    item_name: String,
    unit: String,
    account_code: Option<String>,
    quantity_milli: i64,
    unit_price_e4: i64,
    vat_rate: i32,
    discount_rate_bps: i64,
    withholding_rate: i32,
    gross_cents: i64,
    discount_amount_cents: i64,
    net_cents: i64,
    vat_cents: i64,
    withholding_amount_cents: i64,
    grand_total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<LineRecord> for InvoiceLine {
    fn from(r: LineRecord) -> Self {
        InvoiceLine {
            id: r.id,
            invoice_id: r.invoice_id,
            item_id: r.item_id,
            item_code: r.item_code,
            item_name: r.item_name,
            unit: r.unit,
            account_code: r.account_code,
            quantity: quantity(r.quantity_milli),
            unit_price: from_minor(Precision::UnitPrice, r.unit_price_e4),
            vat_rate: r.vat_rate,
            discount_rate: from_minor(Precision::Percent, r.discount_rate_bps),
            withholding_rate: r.withholding_rate,
            gross: amount(r.gross_cents),
            discount_amount: amount(r.discount_amount_cents),
            net: amount(r.net_cents),
            vat: amount(r.vat_cents),
            withholding_amount: amount(r.withholding_amount_cents),
            grand_total: amount(r.grand_total_cents),
            created_at: r.created_at,
            updated_at: r.updated_at,
            is_deleted: r.is_deleted,
            deleted_at: r.deleted_at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
