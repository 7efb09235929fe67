//! Allocation query functions.
//!
//! One row per (account, pipe) with a positive percentage. The stored
//! `flow_rate` is the pipe's floor share of the account's inbound rate,
//! recomputed whenever the allocation batch or the inbound rate changes.

use rusqlite::Connection;

use flowvalve_types::{AccountId, FlowRate, PipeId};

use crate::{id_from_blob, parse_rate, rate_to_text, Result};

/// A stored allocation for one (account, pipe) pair.
#[derive(Debug, Clone)]
pub struct AllocationRow {
    pub pipe: PipeId,
    pub percentage: u8,
    pub flow_rate: FlowRate,
}

/// Replace the full allocation batch for an account.
///
/// Entries with a zero percentage must be filtered out by the caller; the
/// table only holds live splits.
pub fn replace_for_account(
    conn: &Connection,
    account: &AccountId,
    entries: &[(PipeId, u8, FlowRate)],
) -> Result<()> {
    conn.execute(
        "DELETE FROM allocations WHERE account = ?1",
        rusqlite::params![account.as_slice()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO allocations (account, pipe_id, percentage, flow_rate)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (pipe, percentage, rate) in entries {
        stmt.execute(rusqlite::params![
            account.as_slice(),
            pipe.as_slice(),
            i64::from(*percentage),
            rate_to_text(*rate),
        ])?;
    }

    Ok(())
}

/// Fetch one allocation, if the account currently splits to that pipe.
pub fn get(conn: &Connection, account: &AccountId, pipe: &PipeId) -> Result<Option<AllocationRow>> {
    let mut stmt = conn.prepare(
        "SELECT percentage, flow_rate FROM allocations WHERE account = ?1 AND pipe_id = ?2",
    )?;

    let row = stmt
        .query_map(
            rusqlite::params![account.as_slice(), pipe.as_slice()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )?
        .next()
        .transpose()?;

    match row {
        Some((percentage, rate_text)) => Ok(Some(AllocationRow {
            pipe: *pipe,
            percentage: percentage as u8,
            flow_rate: parse_rate(&rate_text)?,
        })),
        None => Ok(None),
    }
}

/// All live allocations for an account.
pub fn for_account(conn: &Connection, account: &AccountId) -> Result<Vec<AllocationRow>> {
    let mut stmt = conn.prepare(
        "SELECT pipe_id, percentage, flow_rate
         FROM allocations WHERE account = ?1 ORDER BY pipe_id ASC",
    )?;

    let raw = stmt
        .query_map(rusqlite::params![account.as_slice()], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(blob, percentage, rate_text)| {
            Ok(AllocationRow {
                pipe: id_from_blob(blob)?,
                percentage: percentage as u8,
                flow_rate: parse_rate(&rate_text)?,
            })
        })
        .collect()
}
