//! # Collaborators
//!
//! Services the invoice commands depend on but do not own.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_invoice / update_invoice                                        │
//! │       │                                                                 │
//! │       ├── BranchContext            acting branch, or UNAUTHORIZED       │
//! │       ├── StockAvailabilityGuard   every shortage, before any write     │
//! │       ├── InvoiceNumberAllocator   atomic per (branch, prefix, year)    │
//! │       └── BalanceRecalculator      inside the command's transaction     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The SQLite implementations live on the `defter-db` repositories; tests
//! swap individual collaborators through [`crate::state::AppState`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use defter_core::{CoreError, InvoiceType};
use defter_db::{BalanceRepository, SequenceAllocator, StockRepository};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::warn;

use crate::error::ApiResult;

// =============================================================================
// Traits
// =============================================================================

/// Resolves the branch the caller acts for.
pub trait BranchContext: Send + Sync {
    fn current_branch_id(&self) -> Option<i64>;
}

/// Hands out unique invoice numbers.
#[async_trait]
pub trait InvoiceNumberAllocator: Send + Sync {
    /// Next number for the branch, the type's prefix and the year of `date`.
    async fn allocate(&self, branch_id: i64, invoice_type: InvoiceType, date: DateTime<Utc>) -> ApiResult<String>;
}

/// Checks requested quantities against available stock.
#[async_trait]
pub trait StockAvailabilityGuard: Send + Sync {
    /// Fails with every shortage at once; Ok when all items are covered.
    async fn ensure_available(&self, branch_id: i64, requirements: &BTreeMap<i64, Decimal>) -> ApiResult<()>;
}

/// Recomputes persisted balances within the caller's transaction.
#[async_trait]
pub trait BalanceRecalculator: Send + Sync {
    async fn recalculate_invoice(&self, conn: &mut SqliteConnection, invoice_id: i64) -> ApiResult<Decimal>;
    async fn recalculate_contact(&self, conn: &mut SqliteConnection, contact_id: i64) -> ApiResult<Decimal>;
    async fn recalculate_account(&self, conn: &mut SqliteConnection, account_id: i64) -> ApiResult<Decimal>;
}

// =============================================================================
// Implementations
// =============================================================================

/// Fixed branch, taken from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticBranchContext {
    branch_id: Option<i64>,
}

impl StaticBranchContext {
    pub fn new(branch_id: Option<i64>) -> Self {
        StaticBranchContext { branch_id }
    }
}

impl BranchContext for StaticBranchContext {
    fn current_branch_id(&self) -> Option<i64> {
        self.branch_id
    }
}

#[async_trait]
impl InvoiceNumberAllocator for SequenceAllocator {
    async fn allocate(&self, branch_id: i64, invoice_type: InvoiceType, date: DateTime<Utc>) -> ApiResult<String> {
        Ok(self.next(branch_id, invoice_type.number_prefix(), date.year()).await?)
    }
}

#[async_trait]
impl StockAvailabilityGuard for StockRepository {
    async fn ensure_available(&self, branch_id: i64, requirements: &BTreeMap<i64, Decimal>) -> ApiResult<()> {
        let shortages = self.find_shortages(branch_id, requirements).await?;
        if shortages.is_empty() {
            return Ok(());
        }

        warn!(branch_id = branch_id, shortages = shortages.len(), "Insufficient stock");
        Err(CoreError::InsufficientStock { shortages }.into())
    }
}

#[async_trait]
impl BalanceRecalculator for BalanceRepository {
    async fn recalculate_invoice(&self, conn: &mut SqliteConnection, invoice_id: i64) -> ApiResult<Decimal> {
        Ok(BalanceRepository::recalculate_invoice(self, conn, invoice_id).await?)
    }

    async fn recalculate_contact(&self, conn: &mut SqliteConnection, contact_id: i64) -> ApiResult<Decimal> {
        Ok(BalanceRepository::recalculate_contact(self, conn, contact_id).await?)
    }

    async fn recalculate_account(&self, conn: &mut SqliteConnection, account_id: i64) -> ApiResult<Decimal> {
        Ok(BalanceRepository::recalculate_account(self, conn, account_id).await?)
    }
}
