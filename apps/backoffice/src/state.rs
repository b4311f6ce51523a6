//! # Application State
//!
//! Everything a command needs: the database and its collaborators.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AppState                                                               │
//! │  ├── db          Database (SqlitePool, thread-safe)                     │
//! │  ├── config      BackofficeConfig (read-only)                           │
//! │  ├── branch      Arc<dyn BranchContext>          StaticBranchContext    │
//! │  ├── numbers     Arc<dyn InvoiceNumberAllocator> SequenceAllocator      │
//! │  ├── stock_guard Arc<dyn StockAvailabilityGuard> StockRepository        │
//! │  └── balances    Arc<dyn BalanceRecalculator>    BalanceRepository      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use defter_core::CoreError;
use defter_db::Database;

use crate::collaborators::{
    BalanceRecalculator, BranchContext, InvoiceNumberAllocator, StaticBranchContext, StockAvailabilityGuard,
};
use crate::config::BackofficeConfig;
use crate::error::ApiResult;

/// Shared state for backoffice commands.
#[derive(Clone)]
pub struct AppState {
    db: Database,
    config: BackofficeConfig,
    branch: Arc<dyn BranchContext>,
    numbers: Arc<dyn InvoiceNumberAllocator>,
    stock_guard: Arc<dyn StockAvailabilityGuard>,
    balances: Arc<dyn BalanceRecalculator>,
}

impl AppState {
    /// Wires the SQLite collaborators and the configured branch.
    pub fn new(db: Database, config: BackofficeConfig) -> Self {
        AppState {
            branch: Arc::new(StaticBranchContext::new(config.branch_id)),
            numbers: Arc::new(db.sequences()),
            stock_guard: Arc::new(db.stock()),
            balances: Arc::new(db.balances()),
            db,
            config,
        }
    }

    pub fn with_branch_context(mut self, branch: Arc<dyn BranchContext>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_number_allocator(mut self, numbers: Arc<dyn InvoiceNumberAllocator>) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn with_stock_guard(mut self, stock_guard: Arc<dyn StockAvailabilityGuard>) -> Self {
        self.stock_guard = stock_guard;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &BackofficeConfig {
        &self.config
    }

    /// Acting branch, or UNAUTHORIZED before any database access.
    pub fn branch_id(&self) -> ApiResult<i64> {
        Ok(self
            .branch
            .current_branch_id()
            .ok_or(CoreError::MissingBranchContext)?)
    }

    pub fn numbers(&self) -> &dyn InvoiceNumberAllocator {
        self.numbers.as_ref()
    }

    pub fn stock_guard(&self) -> &dyn StockAvailabilityGuard {
        self.stock_guard.as_ref()
    }

    pub fn balances(&self) -> &dyn BalanceRecalculator {
        self.balances.as_ref()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("config", &self.config)
            .field("branch_id", &self.branch.current_branch_id())
            .finish_non_exhaustive()
    }
}
