//! # Commands Module
//!
//! Every operation the backoffice exposes.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs      ◄─── You are here (dispatch, cancellation)
//! ├── invoice.rs  ◄─── create / update / get / movements
//! └── payment.rs  ◄─── create / delete payments
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Command Flow                                         │
//! │                                                                         │
//! │  JSON request ──► dispatch("update", raw, &cancel)                      │
//! │                        │                                                │
//! │                        ▼                                                │
//! │  update_invoice(&AppState, UpdateInvoiceRequest, &CancellationToken)    │
//! │      -> Result<InvoiceDetail, ApiError>                                 │
//! │                        │                                                │
//! │                        ▼                                                │
//! │  JSON response (decimals as strings: "118.00")                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation
//! Write commands check their token before every step up to commit. A
//! cancelled token drops the open transaction, which rolls it back.

pub mod invoice;
pub mod payment;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::state::AppState;

/// Names accepted by [`dispatch`].
pub const COMMANDS: [&str; 6] = ["create", "update", "get", "movements", "pay", "unpay"];

/// Fails with CANCELLED once the token has fired.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> ApiResult<()> {
    if cancel.is_cancelled() {
        return Err(ApiError::cancelled());
    }
    Ok(())
}

/// Runs one command from its JSON request and returns the JSON response.
pub async fn dispatch(
    state: &AppState,
    command: &str,
    raw: &str,
    cancel: &CancellationToken,
) -> ApiResult<serde_json::Value> {
    match command {
        "create" => to_json(invoice::create_invoice(state, parse(raw)?, cancel).await?),
        "update" => to_json(invoice::update_invoice(state, parse(raw)?, cancel).await?),
        "get" => {
            let request: invoice::GetInvoiceRequest = parse(raw)?;
            to_json(invoice::get_invoice(state, request.id, request.include_deleted_lines).await?)
        }
        "movements" => {
            let request: invoice::ListMovementsRequest = parse(raw)?;
            to_json(invoice::list_invoice_movements(state, request.invoice_id, request.include_deleted).await?)
        }
        "pay" => to_json(payment::create_payment(state, parse(raw)?, cancel).await?),
        "unpay" => to_json(payment::delete_payment(state, parse(raw)?, cancel).await?),
        other => Err(ApiError::new(
            ErrorCode::ValidationError,
            format!("Unknown command '{}' (expected one of: {})", other, COMMANDS.join(", ")),
        )),
    }
}

fn parse<T: DeserializeOwned>(raw: &str) -> ApiResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| ApiError::new(ErrorCode::ValidationError, format!("Invalid request: {}", e)))
}

fn to_json<T: Serialize>(value: T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::internal(e.to_string()))
}
