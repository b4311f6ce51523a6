//! # Invoice Commands
//!
//! Create, update and read invoices.
//!
//! ## Create
//! ```text
//! branch ─► validate ─► stock guard (Sales) ─► contact + snapshots
//!    │
//!    ▼
//! build lines + totals ─► allocate number ─► BEGIN
//!                                              ├── insert header
//!                                              ├── insert lines
//!                                              ├── warehouse + movements
//!                                              ├── invoice/contact balances
//!                                              └── COMMIT
//! ```
//! A collision on the invoice number drops the transaction and retries
//! with a fresh number, up to `number_retry_limit` times.
//!
//! ## Update
//! ```text
//! load (branch-scoped) ─► token check ─► stock guard (Sales, net of own
//! movements) ─► reconcile lines ─► BEGIN
//!                                    ├── UPDATE ... WHERE row_version = ?
//!                                    ├── soft-delete / update / insert lines
//!                                    ├── reset + recreate movements
//!                                    ├── balances
//!                                    └── COMMIT ─► fresh read
//! ```

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use defter_core::aggregate::{apply_draft, build_lines, new_invoice, reconcile_lines};
use defter_core::money::wire;
use defter_core::stock::{aggregate_requirements, net_of_posted, plan_movements, qualifying_lines};
use defter_core::validation::{normalize_currency, validate_id, validate_invoice_draft};
use defter_core::{
    CoreError, Invoice, InvoiceDraft, InvoiceLine, InvoiceTotals, InvoiceType, LineDraft, ReferenceMap,
    StockMovement, StockMovementType, ValidationError, ROUNDING_POLICY,
};
use defter_db::DbError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::ensure_not_cancelled;
use crate::error::ApiResult;
use crate::state::AppState;

// =============================================================================
// Requests
// =============================================================================

/// One requested invoice line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineRequest {
    /// Existing line id on update; absent for new lines.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub item_id: Option<i64>,
    #[serde(with = "wire::quantity")]
    pub quantity: Decimal,
    #[serde(with = "wire::unit_price")]
    pub unit_price: Decimal,
    pub vat_rate: i32,
    #[serde(default, with = "wire::percent::option")]
    pub discount_rate: Option<Decimal>,
    #[serde(default)]
    pub withholding_rate: Option<i32>,
}

/// Invoice body shared by create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub contact_id: i64,
    #[serde(default)]
    pub order_id: Option<i64>,
    pub date_utc: DateTime<Utc>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, with = "wire::currency_rate::option")]
    pub currency_rate: Option<Decimal>,
    /// "Sales", "sales_return", "PurchaseReturn", ...
    #[serde(rename = "type")]
    pub invoice_type: String,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub waybill_number: Option<String>,
    #[serde(default)]
    pub waybill_date_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_due_date_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lines: Vec<InvoiceLineRequest>,
}

impl InvoiceRequest {
    /// Converts the request into a draft; the invoice type must parse.
    pub fn to_draft(&self) -> ApiResult<InvoiceDraft> {
        Ok(InvoiceDraft {
            contact_id: self.contact_id,
            order_id: self.order_id,
            date_utc: self.date_utc,
            currency: self.currency.clone(),
            currency_rate: self.currency_rate,
            invoice_type: InvoiceType::from_str(&self.invoice_type)?,
            document_type: self.document_type.clone(),
            waybill_number: self.waybill_number.clone(),
            waybill_date_utc: self.waybill_date_utc,
            payment_due_date_utc: self.payment_due_date_utc,
            lines: self
                .lines
                .iter()
                .map(|line| LineDraft {
                    id: line.id,
                    item_id: line.item_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    vat_rate: line.vat_rate,
                    discount_rate: line.discount_rate,
                    withholding_rate: line.withholding_rate,
                })
                .collect(),
        })
    }
}

/// Update request: target id, concurrency token and the full new body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    pub id: i64,
    pub row_version: String,
    #[serde(flatten)]
    pub invoice: InvoiceRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInvoiceRequest {
    pub id: i64,
    #[serde(default)]
    pub include_deleted_lines: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMovementsRequest {
    pub invoice_id: i64,
    #[serde(default)]
    pub include_deleted: bool,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceResponse {
    pub id: i64,
    pub invoice_number: String,
    #[serde(with = "wire::amount")]
    pub total_net: Decimal,
    #[serde(with = "wire::amount")]
    pub total_vat: Decimal,
    #[serde(with = "wire::amount")]
    pub total_gross: Decimal,
    pub rounding_policy: &'static str,
}

/// Full invoice as returned by get and update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    pub id: i64,
    pub branch_id: i64,
    pub contact_id: i64,
    pub order_id: Option<i64>,
    #[serde(rename = "type")]
    pub invoice_type: InvoiceType,
    pub document_type: String,
    pub invoice_number: String,
    pub date_utc: DateTime<Utc>,
    pub currency: String,
    #[serde(with = "wire::currency_rate")]
    pub currency_rate: Decimal,
    pub waybill_number: Option<String>,
    pub waybill_date_utc: Option<DateTime<Utc>>,
    pub payment_due_date_utc: Option<DateTime<Utc>>,
    #[serde(with = "wire::amount")]
    pub total_line_gross: Decimal,
    #[serde(with = "wire::amount")]
    pub total_discount: Decimal,
    #[serde(with = "wire::amount")]
    pub total_net: Decimal,
    #[serde(with = "wire::amount")]
    pub total_vat: Decimal,
    #[serde(with = "wire::amount")]
    pub total_withholding: Decimal,
    #[serde(with = "wire::amount")]
    pub total_gross: Decimal,
    #[serde(with = "wire::amount")]
    pub balance: Decimal,
    /// Opaque token to send back with the next update.
    pub row_version: String,
    pub rounding_policy: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub lines: Vec<InvoiceLineDetail>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineDetail {
    pub id: i64,
    pub item_id: Option<i64>,
    pub item_code: String,
    pub item_name: String,
    pub unit: String,
    pub account_code: Option<String>,
    #[serde(with = "wire::quantity")]
    pub quantity: Decimal,
    #[serde(with = "wire::unit_price")]
    pub unit_price: Decimal,
    pub vat_rate: i32,
    #[serde(with = "wire::percent")]
    pub discount_rate: Decimal,
    pub withholding_rate: i32,
    #[serde(with = "wire::amount")]
    pub gross: Decimal,
    #[serde(with = "wire::amount")]
    pub discount_amount: Decimal,
    #[serde(with = "wire::amount")]
    pub net: Decimal,
    #[serde(with = "wire::amount")]
    pub vat: Decimal,
    #[serde(with = "wire::amount")]
    pub withholding_amount: Decimal,
    #[serde(with = "wire::amount")]
    pub grand_total: Decimal,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovementDto {
    pub id: i64,
    pub warehouse_id: i64,
    pub item_id: i64,
    pub movement_type: StockMovementType,
    #[serde(with = "wire::quantity")]
    pub quantity: Decimal,
    pub transaction_date_utc: DateTime<Utc>,
    pub note: Option<String>,
    pub is_deleted: bool,
}

impl InvoiceDetail {
    fn new(invoice: Invoice, lines: Vec<InvoiceLine>) -> Self {
        InvoiceDetail {
            id: invoice.id,
            branch_id: invoice.branch_id,
            contact_id: invoice.contact_id,
            order_id: invoice.order_id,
            invoice_type: invoice.invoice_type,
            document_type: invoice.document_type,
            invoice_number: invoice.invoice_number,
            date_utc: invoice.date_utc,
            currency: invoice.currency.code().to_string(),
            currency_rate: invoice.currency_rate,
            waybill_number: invoice.waybill_number,
            waybill_date_utc: invoice.waybill_date_utc,
            payment_due_date_utc: invoice.payment_due_date_utc,
            total_line_gross: invoice.total_line_gross,
            total_discount: invoice.total_discount,
            total_net: invoice.total_net,
            total_vat: invoice.total_vat,
            total_withholding: invoice.total_withholding,
            total_gross: invoice.total_gross,
            balance: invoice.balance,
            row_version: invoice.row_version.to_token(),
            rounding_policy: ROUNDING_POLICY,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
            lines: lines.into_iter().map(InvoiceLineDetail::from).collect(),
        }
    }
}

impl From<InvoiceLine> for InvoiceLineDetail {
    fn from(line: InvoiceLine) -> Self {
        InvoiceLineDetail {
            id: line.id,
            item_id: line.item_id,
            item_code: line.item_code,
            item_name: line.item_name,
            unit: line.unit,
            account_code: line.account_code,
            quantity: line.quantity,
            unit_price: line.unit_price,
            vat_rate: line.vat_rate,
            discount_rate: line.discount_rate,
            withholding_rate: line.withholding_rate,
            gross: line.gross,
            discount_amount: line.discount_amount,
            net: line.net,
            vat: line.vat,
            withholding_amount: line.withholding_amount,
            grand_total: line.grand_total,
            is_deleted: line.is_deleted,
        }
    }
}

impl From<StockMovement> for StockMovementDto {
    fn from(movement: StockMovement) -> Self {
        StockMovementDto {
            id: movement.id,
            warehouse_id: movement.warehouse_id,
            item_id: movement.item_id,
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            transaction_date_utc: movement.transaction_date_utc,
            note: movement.note,
            is_deleted: movement.is_deleted,
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Creates an invoice with its lines and stock movements in one transaction.
#[instrument(skip(state, request, cancel), fields(operation_id = %Uuid::new_v4()))]
pub async fn create_invoice(
    state: &AppState,
    request: InvoiceRequest,
    cancel: &CancellationToken,
) -> ApiResult<CreateInvoiceResponse> {
    let branch_id = state.branch_id()?;
    ensure_not_cancelled(cancel)?;

    let draft = request.to_draft()?;
    validate_invoice_draft(&draft)?;
    let currency = normalize_currency(draft.currency.as_deref())?;

    debug!(branch_id = branch_id, invoice_type = %draft.invoice_type, lines = draft.lines.len(), "create_invoice command");

    if draft.invoice_type == InvoiceType::Sales {
        let requirements = aggregate_requirements(&draft.lines);
        state.stock_guard().ensure_available(branch_id, &requirements).await?;
    }
    ensure_not_cancelled(cancel)?;

    ensure_contact(state, branch_id, draft.contact_id).await?;
    let references = load_references(state, &draft.lines).await?;

    let now = Utc::now();
    let mut lines = build_lines(draft.invoice_type, &draft.lines, &references, now)?;
    let amounts: Vec<_> = lines.iter().map(InvoiceLine::amounts).collect();
    let totals = InvoiceTotals::from_lines(&amounts);

    let invoices = state.db().invoices();
    let mut retries = 0;

    loop {
        ensure_not_cancelled(cancel)?;
        let number = state
            .numbers()
            .allocate(branch_id, draft.invoice_type, draft.date_utc)
            .await?;

        let mut invoice = new_invoice(branch_id, number, &draft, currency, now)?;
        invoice.apply_totals(&totals);

        ensure_not_cancelled(cancel)?;
        let mut tx = state.db().begin().await?;

        invoice.id = match invoices.insert(&mut tx, &invoice).await {
            Ok(id) => id,
            Err(e) if e.is_unique_violation_on("invoices.invoice_number") && retries < state.config().number_retry_limit => {
                retries += 1;
                warn!(
                    invoice_number = %invoice.invoice_number,
                    attempt = retries,
                    "Invoice number already taken, allocating another"
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        for line in &mut lines {
            line.invoice_id = invoice.id;
        }
        invoices.insert_lines(&mut tx, invoice.id, &lines).await?;
        ensure_not_cancelled(cancel)?;

        let movements = sync_stock_movements(state, &mut tx, &invoice, &lines, &references, false).await?;
        ensure_not_cancelled(cancel)?;

        state.balances().recalculate_invoice(&mut tx, invoice.id).await?;
        state.balances().recalculate_contact(&mut tx, invoice.contact_id).await?;
        ensure_not_cancelled(cancel)?;

        tx.commit().await.map_err(DbError::from)?;

        info!(
            invoice_id = invoice.id,
            invoice_number = %invoice.invoice_number,
            total_gross = %invoice.total_gross,
            lines = lines.len(),
            movements = movements,
            "Invoice created"
        );

        return Ok(CreateInvoiceResponse {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            total_net: invoice.total_net,
            total_vat: invoice.total_vat,
            total_gross: invoice.total_gross,
            rounding_policy: ROUNDING_POLICY,
        });
    }
}

/// Replaces an invoice's header and line set, guarded by its row version.
#[instrument(skip(state, request, cancel), fields(operation_id = %Uuid::new_v4(), invoice_id = request.id))]
pub async fn update_invoice(
    state: &AppState,
    request: UpdateInvoiceRequest,
    cancel: &CancellationToken,
) -> ApiResult<InvoiceDetail> {
    let branch_id = state.branch_id()?;
    ensure_not_cancelled(cancel)?;

    validate_id("id", request.id)?;
    let draft = request.invoice.to_draft()?;
    validate_invoice_draft(&draft)?;
    let currency = normalize_currency(draft.currency.as_deref())?;

    let invoices = state.db().invoices();
    let mut invoice = invoices
        .get(branch_id, request.id)
        .await?
        .ok_or(CoreError::not_found("Invoice", request.id))?;

    let expected = invoice.row_version;
    expected.ensure_matches(&request.row_version, "Invoice", invoice.id)?;

    let persisted = invoices.lines(invoice.id, false).await?;

    if draft.invoice_type == InvoiceType::Sales {
        let posted = state.db().stock().list_for_invoice(invoice.id, false).await?;
        let requirements = net_of_posted(aggregate_requirements(&draft.lines), &posted);
        if !requirements.is_empty() {
            state.stock_guard().ensure_available(branch_id, &requirements).await?;
        }
    }
    ensure_not_cancelled(cancel)?;

    ensure_contact(state, branch_id, draft.contact_id).await?;
    let references = load_references(state, &draft.lines).await?;

    let now = Utc::now();
    let previous_contact_id = invoice.contact_id;
    apply_draft(&mut invoice, &draft, currency)?;
    let plan = reconcile_lines(&invoice, &persisted, &draft.lines, &references, now)?;
    invoice.apply_totals(&plan.totals());
    invoice.updated_at = Some(now);

    debug!(
        to_update = plan.to_update.len(),
        to_insert = plan.to_insert.len(),
        to_delete = plan.to_delete.len(),
        "Line plan ready"
    );

    ensure_not_cancelled(cancel)?;
    let mut tx = state.db().begin().await?;

    invoices.update_header(&mut tx, &invoice, expected).await?;

    for line in &plan.to_delete {
        invoices.soft_delete_line(&mut tx, invoice.id, line.id, now).await?;
    }
    for line in &plan.to_update {
        invoices.update_line(&mut tx, line).await?;
    }
    invoices.insert_lines(&mut tx, invoice.id, &plan.to_insert).await?;
    ensure_not_cancelled(cancel)?;

    let active: Vec<InvoiceLine> = plan.active_lines().cloned().collect();
    let movements = sync_stock_movements(state, &mut tx, &invoice, &active, &references, true).await?;
    ensure_not_cancelled(cancel)?;

    state.balances().recalculate_invoice(&mut tx, invoice.id).await?;
    state.balances().recalculate_contact(&mut tx, invoice.contact_id).await?;
    if previous_contact_id != invoice.contact_id {
        state.balances().recalculate_contact(&mut tx, previous_contact_id).await?;
    }
    ensure_not_cancelled(cancel)?;

    tx.commit().await.map_err(DbError::from)?;

    info!(
        invoice_id = invoice.id,
        row_version = expected.next().value(),
        total_gross = %invoice.total_gross,
        removed_lines = plan.to_delete.len(),
        movements = movements,
        "Invoice updated"
    );

    get_invoice(state, invoice.id, false).await
}

/// Reads one invoice of the caller's branch.
pub async fn get_invoice(state: &AppState, id: i64, include_deleted_lines: bool) -> ApiResult<InvoiceDetail> {
    let branch_id = state.branch_id()?;

    let invoices = state.db().invoices();
    let invoice = invoices
        .get(branch_id, id)
        .await?
        .ok_or(CoreError::not_found("Invoice", id))?;
    let lines = invoices.lines(invoice.id, include_deleted_lines).await?;

    Ok(InvoiceDetail::new(invoice, lines))
}

/// Stock movements posted for an invoice of the caller's branch.
pub async fn list_invoice_movements(
    state: &AppState,
    invoice_id: i64,
    include_deleted: bool,
) -> ApiResult<Vec<StockMovementDto>> {
    let branch_id = state.branch_id()?;

    state
        .db()
        .invoices()
        .get(branch_id, invoice_id)
        .await?
        .ok_or(CoreError::not_found("Invoice", invoice_id))?;

    let movements = state.db().stock().list_for_invoice(invoice_id, include_deleted).await?;
    Ok(movements.into_iter().map(StockMovementDto::from).collect())
}

// =============================================================================
// Helpers
// =============================================================================

/// Writes the invoice's stock movements inside the caller's transaction.
///
/// With `reset` the live movements of the invoice are soft-deleted first.
/// The warehouse is only resolved when some line qualifies.
async fn sync_stock_movements(
    state: &AppState,
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    lines: &[InvoiceLine],
    references: &ReferenceMap,
    reset: bool,
) -> ApiResult<usize> {
    let stock = state.db().stock();

    if reset {
        stock.soft_delete_for_invoice(&mut *conn, invoice.id).await?;
    }

    if qualifying_lines(invoice, lines, references).is_empty() {
        return Ok(0);
    }

    let warehouse = state
        .db()
        .warehouses()
        .resolve_for_branch(&mut *conn, invoice.branch_id)
        .await?
        .ok_or(CoreError::NoWarehouse {
            branch_id: invoice.branch_id,
        })?;

    let movements = plan_movements(invoice, lines, references, warehouse.id);
    stock.insert_movements(&mut *conn, &movements).await?;

    Ok(movements.len())
}

async fn ensure_contact(state: &AppState, branch_id: i64, contact_id: i64) -> ApiResult<()> {
    state
        .db()
        .master()
        .get_contact(branch_id, contact_id)
        .await?
        .ok_or_else(|| ValidationError::UnknownReference {
            field: "contactId".to_string(),
            id: contact_id,
        })?;
    Ok(())
}

async fn load_references(state: &AppState, lines: &[LineDraft]) -> ApiResult<ReferenceMap> {
    let ids: BTreeSet<i64> = lines.iter().filter_map(|line| line.item_id).collect();
    Ok(state.db().items().snapshots(&ids).await?)
}

// =============================================================================
// Unit Tests
// =============================================================================
