//! # API Error Type
//!
//! Unified error type for backoffice commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Defter                                 │
//! │                                                                         │
//! │  Command Function  ─►  Result<T, ApiError>                              │
//! │         │                                                               │
//! │         ├── ValidationError ───────────────► VALIDATION_ERROR           │
//! │         │     (details: one per field)                                  │
//! │         ├── CoreError::NotFound / DbError::NotFound ─► NOT_FOUND        │
//! │         ├── stale token / zero-row update ─► CONCURRENCY_CONFLICT       │
//! │         ├── stock, warehouse, currency ────► BUSINESS_RULE              │
//! │         │     (details: "item:<id>" per shortage)                       │
//! │         ├── no branch context ─────────────► UNAUTHORIZED               │
//! │         ├── cancellation token fired ──────► CANCELLED                  │
//! │         └── sqlx failures ─────────────────► DATABASE_ERROR (logged)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error aborts the enclosing transaction before it reaches the caller.

use defter_core::{CoreError, MoneyError, Precision, ValidationError};
use defter_db::DbError;
use serde::{Deserialize, Serialize};

/// API error returned from commands.
///
/// ## Serialization
/// ```json
/// {
///   "code": "BUSINESS_RULE",
///   "message": "Insufficient stock: KLM-01 (available 5.000, requested 100.000)",
///   "details": [
///     { "target": "item:1", "message": "available 5.000, requested 100.000" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Per-field or per-item detail
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

/// One structured detail of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Field name (`lines[0].quantity`) or entity (`item:42`)
    pub target: String,
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Resource not found or outside the caller's branch (404)
    NotFound,

    /// Stale concurrency token (409)
    ConcurrencyConflict,

    /// Domain rule rejected the operation (422)
    BusinessRule,

    /// No branch context (401)
    Unauthorized,

    /// Caller cancelled before commit
    Cancelled,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Adds one detail.
    pub fn with_detail(mut self, target: impl Into<String>, message: impl Into<String>) -> Self {
        self.details.push(ErrorDetail {
            target: target.into(),
            message: message.into(),
        });
        self
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a business rule error.
    pub fn business_rule(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::BusinessRule, message)
    }

    /// Creates a cancellation error.
    pub fn cancelled() -> Self {
        ApiError::new(ErrorCode::Cancelled, "Operation cancelled")
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts validation errors, naming the offending field.
impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let target = err.field().to_string();
        let message = err.to_string();
        ApiError::new(ErrorCode::ValidationError, message.clone()).with_detail(target, message)
    }
}

impl From<MoneyError> for ApiError {
    fn from(err: MoneyError) -> Self {
        ApiError::new(ErrorCode::ValidationError, err.to_string())
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::ConcurrencyConflict { entity, id } => ApiError::new(
                ErrorCode::ConcurrencyConflict,
                format!("{} {} was modified by another user", entity, id),
            ),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::Decode(e) => {
                tracing::error!("Stored value could not be decoded: {}", e);
                ApiError::internal("Stored data is invalid")
            }
            DbError::ConnectionFailed(_) => ApiError::new(ErrorCode::DatabaseError, "Database connection failed"),
            DbError::MigrationFailed(_) => ApiError::new(ErrorCode::DatabaseError, "Database migration failed"),
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::PoolExhausted => ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted"),
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingBranchContext => ApiError::new(ErrorCode::Unauthorized, err.to_string()),
            CoreError::NotFound { entity, id } => ApiError::not_found(entity, &id.to_string()),
            CoreError::ConcurrencyConflict { .. } => ApiError::new(ErrorCode::ConcurrencyConflict, err.to_string()),
            CoreError::InsufficientStock { ref shortages } => {
                let mut api = ApiError::business_rule(err.to_string());
                for shortage in shortages {
                    api = api.with_detail(
                        format!("item:{}", shortage.item_id),
                        format!(
                            "available {}, requested {}",
                            Precision::Quantity.format(shortage.available),
                            Precision::Quantity.format(shortage.requested)
                        ),
                    );
                }
                api
            }
            CoreError::NoWarehouse { branch_id } => ApiError::business_rule(err.to_string())
                .with_detail(format!("branch:{}", branch_id), "no warehouse configured"),
            CoreError::UnsupportedCurrency { .. } => {
                let message = err.to_string();
                ApiError::business_rule(message.clone()).with_detail("currency", message)
            }
            CoreError::BusinessRule(message) => ApiError::business_rule(message),
            CoreError::Validation(e) => ApiError::from(e),
            CoreError::Money(e) => ApiError::from(e),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use defter_core::StockShortage;
    use rust_decimal_macros::dec;

    #[test]
    fn test_shortages_become_item_details() {
        let err: ApiError = CoreError::InsufficientStock {
            shortages: vec![
                StockShortage {
                    item_id: 1,
                    item_code: "KLM-01".to_string(),
                    available: dec!(5),
                    requested: dec!(100),
                },
                StockShortage {
                    item_id: 3,
                    item_code: "DFT-01".to_string(),
                    available: dec!(0),
                    requested: dec!(2.5),
                },
            ],
        }
        .into();

        assert_eq!(err.code, ErrorCode::BusinessRule);
        assert_eq!(err.details.len(), 2);
        assert_eq!(err.details[0].target, "item:1");
        assert_eq!(err.details[0].message, "available 5.000, requested 100.000");
        assert_eq!(err.details[1].target, "item:3");
    }

    #[test]
    fn test_validation_names_field() {
        let err: ApiError = ValidationError::Required {
            field: "lines[0].itemId".to_string(),
        }
        .into();

        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.details[0].target, "lines[0].itemId");
    }

    #[test]
    fn test_code_mapping() {
        let unauthorized: ApiError = CoreError::MissingBranchContext.into();
        assert_eq!(unauthorized.code, ErrorCode::Unauthorized);

        let conflict: ApiError = DbError::conflict("Invoice", 7).into();
        assert_eq!(conflict.code, ErrorCode::ConcurrencyConflict);

        let missing: ApiError = DbError::not_found("Invoice", 7).into();
        assert_eq!(missing.code, ErrorCode::NotFound);
        assert_eq!(missing.message, "Invoice not found: 7");

        let currency: ApiError = CoreError::UnsupportedCurrency { code: "JPY".to_string() }.into();
        assert_eq!(currency.code, ErrorCode::BusinessRule);
        assert_eq!(currency.details[0].target, "currency");
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(ApiError::business_rule("no").with_detail("item:1", "short")).unwrap();
        assert_eq!(json["code"], "BUSINESS_RULE");
        assert_eq!(json["details"][0]["target"], "item:1");

        let plain = serde_json::to_value(ApiError::cancelled()).unwrap();
        assert_eq!(plain["code"], "CANCELLED");
        assert!(plain.get("details").is_none());
    }
}
