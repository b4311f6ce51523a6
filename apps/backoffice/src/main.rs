//! # Defter Backoffice Driver
//!
//! Runs one command from a JSON request file.
//!
//! ```text
//! defter-backoffice create request.json
//!      │
//!      ├── BackofficeConfig::load()      DEFTER_* environment
//!      ├── init_tracing                  RUST_LOG / DEFTER_LOG_LEVEL
//!      ├── Database::new                 migrations applied
//!      └── dispatch ──► stdout (JSON) | stderr (ApiError JSON), exit 1
//! ```
//!
//! Ctrl+C cancels the command; nothing is committed after that point.

use std::process::ExitCode;

use defter_backoffice::commands::COMMANDS;
use defter_backoffice::{dispatch, init_tracing, AppState, BackofficeConfig};
use defter_db::Database;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn print_usage() {
    eprintln!("Usage: defter-backoffice <{}> <request.json>", COMMANDS.join("|"));
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DEFTER_DATABASE_PATH       SQLite file (default ./data/defter.db)");
    eprintln!("  DEFTER_BRANCH_ID           Acting branch (required for commands)");
    eprintln!("  DEFTER_LOG_LEVEL           Default log filter (default info)");
    eprintln!("  DEFTER_MAX_CONNECTIONS     Pool size (default 5)");
    eprintln!("  DEFTER_NUMBER_RETRY_LIMIT  Invoice number collision retries (default 3)");
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }
    if args.len() != 2 {
        print_usage();
        return ExitCode::from(2);
    }
    let (command, request_path) = (&args[0], &args[1]);

    let config = match BackofficeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    init_tracing(&config.log_level);
    info!(database = %config.database_path.display(), branch_id = ?config.branch_id, "Configuration loaded");

    if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            eprintln!("Cannot create {}: {}", parent.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let db = match Database::new(config.db_config()).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let raw = match tokio::fs::read_to_string(request_path).await {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Cannot read {}: {}", request_path, e);
            db.close().await;
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling command");
            on_signal.cancel();
        }
    });

    let state = AppState::new(db.clone(), config);
    let outcome = dispatch(&state, command, &raw, &cancel).await;
    db.close().await;

    match outcome {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Cannot render response: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            match serde_json::to_string_pretty(&err) {
                Ok(text) => eprintln!("{}", text),
                Err(_) => eprintln!("{}", err),
            }
            ExitCode::FAILURE
        }
    }
}
