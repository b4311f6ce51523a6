//! # defter-core: Pure Invoice Logic for Defter
//!
//! The calculation heart of the back office. Everything here is a pure
//! function over plain data: no database, no clock reads, no network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Defter Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Backoffice Commands (apps/backoffice)            │   │
//! │  │    create_invoice, update_invoice, get_invoice, create_payment  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ defter-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌─────────────┐ ┌─────────┐ ┌────────────────┐    │   │
//! │  │  │  money  │ │ calculation │ │  stock  │ │   validation   │    │   │
//! │  │  │Precision│ │ LineAmounts │ │ planner │ │  numbering     │    │   │
//! │  │  │ rounding│ │ InvoiceTotal│ │ resolver│ │  concurrency   │    │   │
//! │  │  └─────────┘ └─────────────┘ └─────────┘ └────────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    defter-db (Database Layer)                   │   │
//! │  │       SQLite repositories, sequences, balance recalculation     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`aggregate`] - Header and line building, line-set reconciliation
//! - [`money`] - Precision categories, half-away-from-zero rounding, wire strings
//! - [`calculation`] - Line derivation and header re-summation
//! - [`types`] - Domain types (Invoice, InvoiceLine, StockMovement, Payment)
//! - [`stock`] - Invoice type → movement type, requirement aggregation, planning
//! - [`numbering`] - Invoice number prefixes and format
//! - [`concurrency`] - Row version tokens
//! - [`validation`] - Request validation rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use defter_core::calculation::{calculate_line, LineInput};
//! use rust_decimal::Decimal;
//!
//! let input = LineInput::new(Decimal::new(2, 0), Decimal::new(100, 0), 18, Decimal::new(10, 0), 50);
//! let line = calculate_line(&input);
//!
//! assert_eq!(line.net.to_string(), "180.00");
//! assert_eq!(line.vat.to_string(), "32.40");
//! assert_eq!(line.withholding_amount.to_string(), "16.20");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod aggregate;
pub mod calculation;
pub mod concurrency;
pub mod error;
pub mod money;
pub mod numbering;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use calculation::{calculate_line, InvoiceTotals, LineAmounts, LineInput};
pub use concurrency::RowVersion;
pub use error::{CoreError, CoreResult, MoneyError, StockShortage, ValidationError};
pub use money::{Precision, ROUNDING_POLICY};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Currency used when a request leaves the currency empty.
pub const DEFAULT_CURRENCY: Currency = Currency::Try;

/// Unit of measure recorded on a line when the item has none.
pub const DEFAULT_UNIT: &str = "adet";

/// Document type recorded when a request leaves it empty.
pub const DEFAULT_DOCUMENT_TYPE: &str = "Invoice";

/// Upper bound for every percentage input (VAT, discount, withholding).
pub const MAX_RATE_PERCENT: i64 = 100;
