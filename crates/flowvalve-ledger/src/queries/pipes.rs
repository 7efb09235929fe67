//! Pipe registry query functions.

use rusqlite::Connection;

use flowvalve_types::PipeId;

use crate::{id_from_blob, LedgerError, Result};

/// Register a pipe address.
pub fn insert(conn: &Connection, pipe: &PipeId, registered_at: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO pipes (pipe_id, registered_at) VALUES (?1, ?2)",
        rusqlite::params![pipe.as_slice(), registered_at as i64],
    )?;
    Ok(())
}

/// Remove a pipe address from the registry.
pub fn delete(conn: &Connection, pipe: &PipeId) -> Result<()> {
    let deleted = conn.execute(
        "DELETE FROM pipes WHERE pipe_id = ?1",
        rusqlite::params![pipe.as_slice()],
    )?;
    if deleted == 0 {
        return Err(LedgerError::NotFound("pipe not registered".into()));
    }
    Ok(())
}

/// Whether a pipe address is currently registered.
pub fn exists(conn: &Connection, pipe: &PipeId) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pipes WHERE pipe_id = ?1",
        rusqlite::params![pipe.as_slice()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// List all registered pipe addresses, oldest registration first.
pub fn list(conn: &Connection) -> Result<Vec<PipeId>> {
    let mut stmt =
        conn.prepare("SELECT pipe_id FROM pipes ORDER BY registered_at ASC, pipe_id ASC")?;

    let blobs = stmt
        .query_map([], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    blobs.into_iter().map(id_from_blob).collect()
}
