//! # Payment Commands
//!
//! Payments move money through a cash/bank account and may settle one
//! invoice. Every write recalculates the balances it touches inside the
//! same transaction:
//!
//! ```text
//! BEGIN
//!   insert / soft-delete payment
//!   invoice balance  = gross − withholding − Σ linked payments  (< 0 → rollback)
//!   contact balance  = Σ signed invoice totals − Σ In + Σ Out
//!   account balance  = Σ In − Σ Out
//! COMMIT
//! ```

use chrono::{DateTime, Utc};
use defter_core::money::wire;
use defter_core::validation::{normalize_currency, normalize_text, validate_id, validate_payment_amount, MAX_DESCRIPTION_LENGTH};
use defter_core::{CoreError, Currency, Payment, PaymentDirection, RowVersion};
use defter_db::repository::payment::NewPayment;
use defter_db::DbError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::ensure_not_cancelled;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// DTOs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub account_id: i64,
    #[serde(default)]
    pub contact_id: Option<i64>,
    #[serde(default)]
    pub linked_invoice_id: Option<i64>,
    pub date_utc: DateTime<Utc>,
    pub direction: PaymentDirection,
    #[serde(with = "wire::amount")]
    pub amount: Decimal,
    /// Defaults to the linked invoice's currency, then TRY.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePaymentRequest {
    pub id: i64,
    pub row_version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: i64,
    #[serde(with = "wire::amount")]
    pub amount: Decimal,
    pub currency: Currency,
    pub row_version: String,
    #[serde(skip_serializing_if = "Option::is_none", with = "wire::amount::option")]
    pub invoice_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none", with = "wire::amount::option")]
    pub contact_balance: Option<Decimal>,
    #[serde(with = "wire::amount")]
    pub account_balance: Decimal,
}

// =============================================================================
// Commands
// =============================================================================

/// Records a payment and recalculates the affected balances.
#[instrument(skip(state, request, cancel), fields(operation_id = %Uuid::new_v4()))]
pub async fn create_payment(
    state: &AppState,
    request: CreatePaymentRequest,
    cancel: &CancellationToken,
) -> ApiResult<PaymentResponse> {
    let branch_id = state.branch_id()?;
    ensure_not_cancelled(cancel)?;

    validate_id("accountId", request.account_id)?;
    validate_payment_amount(request.amount)?;
    let description = normalize_text("description", request.description.as_deref(), MAX_DESCRIPTION_LENGTH)?;

    let master = state.db().master();
    master
        .get_account(branch_id, request.account_id)
        .await?
        .ok_or(CoreError::not_found("CashBankAccount", request.account_id))?;

    let mut contact_id = request.contact_id;
    if let Some(id) = contact_id {
        master
            .get_contact(branch_id, id)
            .await?
            .ok_or(CoreError::not_found("Contact", id))?;
    }

    let mut currency = normalize_currency(request.currency.as_deref())?;

    if let Some(invoice_id) = request.linked_invoice_id {
        let invoice = state
            .db()
            .invoices()
            .get(branch_id, invoice_id)
            .await?
            .ok_or(CoreError::not_found("Invoice", invoice_id))?;

        if request.currency.as_deref().map_or(true, |c| c.trim().is_empty()) {
            currency = invoice.currency;
        }

        if currency != invoice.currency {
            warn!(invoice_id = invoice_id, payment_currency = %currency, invoice_currency = %invoice.currency, "Payment currency mismatch");
            return Err(ApiError::business_rule(format!(
                "Payment currency {} does not match invoice currency {}",
                currency, invoice.currency
            ))
            .with_detail("currency", format!("expected {}", invoice.currency)));
        }

        if request.amount > invoice.balance {
            warn!(invoice_id = invoice_id, amount = %request.amount, balance = %invoice.balance, "Payment exceeds invoice balance");
            return Err(ApiError::business_rule(format!(
                "Payment {} exceeds invoice balance {}",
                request.amount, invoice.balance
            ))
            .with_detail("amount", format!("at most {}", invoice.balance)));
        }

        match contact_id {
            Some(id) if id != invoice.contact_id => {
                return Err(ApiError::business_rule(format!(
                    "Invoice {} belongs to contact {}, not {}",
                    invoice_id, invoice.contact_id, id
                ))
                .with_detail("contactId", format!("expected {}", invoice.contact_id)));
            }
            Some(_) => {}
            None => contact_id = Some(invoice.contact_id),
        }
    }

    let payment = NewPayment {
        branch_id,
        account_id: request.account_id,
        contact_id,
        linked_invoice_id: request.linked_invoice_id,
        date_utc: request.date_utc,
        direction: request.direction,
        amount: request.amount,
        currency,
        description,
    };

    ensure_not_cancelled(cancel)?;
    let mut tx = state.db().begin().await?;

    let id = state.db().payments().insert(&mut tx, &payment).await?;
    ensure_not_cancelled(cancel)?;

    let invoice_balance = match payment.linked_invoice_id {
        Some(invoice_id) => {
            let balance = state.balances().recalculate_invoice(&mut tx, invoice_id).await?;
            // a payment committed since the check above may have used up the balance
            if balance < Decimal::ZERO {
                let available = balance + payment.amount;
                warn!(invoice_id = invoice_id, amount = %payment.amount, balance = %available, "Payment exceeds invoice balance");
                return Err(ApiError::business_rule(format!(
                    "Payment {} exceeds invoice balance {}",
                    payment.amount, available
                ))
                .with_detail("amount", format!("at most {}", available)));
            }
            Some(balance)
        }
        None => None,
    };
    let contact_balance = match payment.contact_id {
        Some(contact_id) => Some(state.balances().recalculate_contact(&mut tx, contact_id).await?),
        None => None,
    };
    let account_balance = state.balances().recalculate_account(&mut tx, payment.account_id).await?;
    ensure_not_cancelled(cancel)?;

    tx.commit().await.map_err(DbError::from)?;

    info!(
        payment_id = id,
        account_id = payment.account_id,
        linked_invoice_id = ?payment.linked_invoice_id,
        amount = %payment.amount,
        "Payment recorded"
    );

    Ok(PaymentResponse {
        id,
        amount: payment.amount,
        currency: payment.currency,
        row_version: RowVersion::INITIAL.to_token(),
        invoice_balance,
        contact_balance,
        account_balance,
    })
}

/// Soft-deletes a payment, guarded by its row version, and restores the
/// balances it affected.
#[instrument(skip(state, request, cancel), fields(operation_id = %Uuid::new_v4(), payment_id = request.id))]
pub async fn delete_payment(
    state: &AppState,
    request: DeletePaymentRequest,
    cancel: &CancellationToken,
) -> ApiResult<PaymentResponse> {
    let branch_id = state.branch_id()?;
    ensure_not_cancelled(cancel)?;

    let payments = state.db().payments();
    let payment: Payment = payments
        .get(branch_id, request.id)
        .await?
        .ok_or(CoreError::not_found("Payment", request.id))?;
    payment
        .row_version
        .ensure_matches(&request.row_version, "Payment", payment.id)?;

    ensure_not_cancelled(cancel)?;
    let mut tx = state.db().begin().await?;

    payments
        .soft_delete(&mut tx, branch_id, payment.id, payment.row_version)
        .await?;

    let invoice_balance = match payment.linked_invoice_id {
        Some(invoice_id) => Some(state.balances().recalculate_invoice(&mut tx, invoice_id).await?),
        None => None,
    };
    let contact_balance = match payment.contact_id {
        Some(contact_id) => Some(state.balances().recalculate_contact(&mut tx, contact_id).await?),
        None => None,
    };
    let account_balance = state.balances().recalculate_account(&mut tx, payment.account_id).await?;
    ensure_not_cancelled(cancel)?;

    tx.commit().await.map_err(DbError::from)?;

    info!(payment_id = payment.id, amount = %payment.amount, "Payment deleted");

    Ok(PaymentResponse {
        id: payment.id,
        amount: payment.amount,
        currency: payment.currency,
        row_version: payment.row_version.next().to_token(),
        invoice_balance,
        contact_balance,
        account_balance,
    })
}
