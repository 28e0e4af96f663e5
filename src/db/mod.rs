// Ledger storage: SQLite file recording the fate of every source post.
//
// We use rusqlite with the "bundled" feature so there's no system SQLite
// dependency. Each source account gets its own file inside its working
// directory.

pub mod models;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use models::{LedgerKey, LedgerStats, Outcome, ProcessedRecord, SkipReason};
pub use sqlite::SqliteLedger;
pub use traits::Ledger;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// File name of the ledger inside an account directory.
pub const LEDGER_FILE: &str = "tootbot.db";

/// Open (or create) the ledger and run migrations.
pub fn initialize(db_path: &Path) -> Result<Connection> {
    // Create parent directories if needed
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directory for ledger: {}", db_path.display())
            })?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open ledger at {}", db_path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)
        .with_context(|| format!("Failed to prepare ledger at {}", db_path.display()))?;

    Ok(conn)
}

/// Open an existing ledger (fails if it doesn't exist yet).
pub fn open(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        anyhow::bail!(
            "Ledger not found at {}. Run `tootbridge run` for this account first.",
            db_path.display()
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open ledger at {}", db_path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(conn)
}
