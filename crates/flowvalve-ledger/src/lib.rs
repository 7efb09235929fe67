//! # flowvalve-ledger
//!
//! Persistence layer for the valve.
//! Manages the single SQLite database at `$FLOWVALVE_DATA_DIR/flowvalve.db`.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced
//! - All timestamps are Unix epoch seconds (u64)
//! - Token amounts and flow rates are 128-bit integers stored as decimal
//!   TEXT (SQLite INTEGER is i64, which overflows at 1e18-scale rates)
//! - Schema version stored in `PRAGMA user_version`

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

use flowvalve_types::{Amount, FlowRate};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Ledger error types.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Open or create the valve ledger at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory ledger (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}

/// Encode a token amount for storage.
pub fn amount_to_text(amount: Amount) -> String {
    amount.to_string()
}

/// Decode a stored token amount.
pub fn parse_amount(text: &str) -> Result<Amount> {
    text.parse()
        .map_err(|_| LedgerError::Corrupt(format!("bad amount: {text:?}")))
}

/// Encode a flow rate for storage.
pub fn rate_to_text(rate: FlowRate) -> String {
    rate.to_string()
}

/// Decode a stored flow rate.
pub fn parse_rate(text: &str) -> Result<FlowRate> {
    text.parse()
        .map_err(|_| LedgerError::Corrupt(format!("bad flow rate: {text:?}")))
}

/// Convert a BLOB column back into a 32-byte identifier.
pub(crate) fn id_from_blob(bytes: Vec<u8>) -> Result<[u8; 32]> {
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| LedgerError::Corrupt(format!("id blob has {len} bytes, expected 32")))
}
