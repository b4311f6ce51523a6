//! # Error Types
//!
//! Domain-specific error types for defter-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  defter-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule and lifecycle failures           │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── MoneyError       - Unparseable or unrepresentable amounts         │
//! │                                                                         │
//! │  defter-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Backoffice errors (in app)                                            │
//! │  └── ApiError         - What callers see (code + message + details)    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → Caller                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Invoice engine errors.
///
/// Every variant belongs to exactly one caller-facing kind: validation,
/// not found, concurrency conflict, business rule or unauthorized.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller has no resolvable branch context.
    #[error("No branch context for the current caller")]
    MissingBranchContext,

    /// Entity does not exist, is deleted, or belongs to another branch.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Supplied concurrency token does not match the stored row version.
    ///
    /// ## User Workflow
    /// ```text
    /// Clerk A loads invoice (token v1)     Clerk B loads invoice (token v1)
    ///      │                                    │
    ///      ▼                                    ▼
    /// Saves → row_version v2               Saves with v1
    ///                                           │
    ///                                           ▼
    ///                             ConcurrencyConflict { Invoice, 7 }
    ///                                           │
    ///                                           ▼
    ///                             Client re-fetches and retries
    /// ```
    #[error("{entity} {id} was modified by another user")]
    ConcurrencyConflict { entity: &'static str, id: i64 },

    /// One or more items cannot cover the requested quantity.
    ///
    /// All shortages are collected before failing.
    #[error("Insufficient stock: {}", describe_shortages(.shortages))]
    InsufficientStock { shortages: Vec<StockShortage> },

    /// Branch has no usable warehouse for stock postings.
    #[error("Branch {branch_id} has no warehouse configured")]
    NoWarehouse { branch_id: i64 },

    /// Currency code is outside the supported set.
    #[error("Unsupported currency '{code}' (allowed: TRY, USD, EUR, GBP)")]
    UnsupportedCurrency { code: String },

    /// A domain rule rejected the operation.
    #[error("{0}")]
    BusinessRule(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Amount parsing or conversion failed.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl CoreError {
    /// Creates a NotFound error for an entity and id.
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CoreError::NotFound { entity, id }
    }

    /// Creates a ConcurrencyConflict error for an entity and id.
    pub fn conflict(entity: &'static str, id: i64) -> Self {
        CoreError::ConcurrencyConflict { entity, id }
    }
}

/// A single item that cannot cover its requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockShortage {
    pub item_id: i64,
    pub item_code: String,
    pub available: Decimal,
    pub requested: Decimal,
}

fn describe_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(|s| {
            format!(
                "{} (available {}, requested {})",
                s.item_code,
                crate::Precision::Quantity.format(s.available),
                crate::Precision::Quantity.format(s.requested)
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any database access; surfaced to callers verbatim.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Numeric value exceeds what a line or payment may carry.
    #[error("{field} must be at most {max}")]
    TooLarge { field: String, max: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g. undecodable token).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A referenced id cannot be resolved.
    #[error("{field} references unknown id {id}")]
    UnknownReference { field: String, id: i64 },
}

impl ValidationError {
    /// Field (or target) the error refers to.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::TooLarge { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::MustNotBeNegative { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::UnknownReference { field, .. } => field,
        }
    }
}

// =============================================================================
// Money Error
// =============================================================================

/// Amount parsing and conversion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Input is empty or not a decimal number.
    #[error("Invalid amount: '{input}'")]
    InvalidAmount { input: String },

    /// Value does not fit the storage representation.
    #[error("Amount out of range: {value}")]
    Overflow { value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
