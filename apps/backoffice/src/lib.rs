//! # defter-backoffice: Invoice Lifecycle Commands
//!
//! Orchestrates invoice and payment commands over `defter-core` (pure
//! calculation) and `defter-db` (SQLite).
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Backoffice                                           │
//! │                                                                         │
//! │  dispatch(state, "create", json, &cancel)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  commands::invoice / commands::payment                                  │
//! │       │                                                                 │
//! │       ├── collaborators (branch, numbers, stock guard, balances)        │
//! │       ├── defter-core   (validation, line math, movement planning)      │
//! │       └── defter-db     (one transaction per write command)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`commands`] - Invoice and payment commands, JSON dispatch
//! - [`collaborators`] - Branch context, number allocator, stock guard, balances
//! - [`state`] - Shared state handed to every command
//! - [`config`] - Environment configuration
//! - [`error`] - API error type and codes

pub mod collaborators;
pub mod commands;
pub mod config;
pub mod error;
pub mod state;

pub use commands::dispatch;
pub use config::BackofficeConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::AppState;

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`. Calling this twice is harmless.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
