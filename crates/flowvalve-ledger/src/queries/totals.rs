//! Valve-wide pipe total query functions.
//!
//! One row per pipe ever allocated to, carrying the aggregate checkpoint
//! across all senders: booked amount, aggregate rate, and how much of the
//! pipe's outstanding balance is parked in its yield vault.

use rusqlite::Connection;

use flowvalve_types::{Amount, FlowRate, PipeId};

use crate::{amount_to_text, id_from_blob, parse_amount, parse_rate, rate_to_text, Result};

/// A stored valve-wide total for one pipe.
#[derive(Debug, Clone)]
pub struct PipeTotalsRow {
    pub booked_amount: Amount,
    pub booked_at: u64,
    pub total_rate: FlowRate,
    pub vault_deposited: Amount,
}

/// Insert or overwrite a pipe's valve-wide total.
pub fn upsert(conn: &Connection, pipe: &PipeId, row: &PipeTotalsRow) -> Result<()> {
    conn.execute(
        "INSERT INTO pipe_totals (pipe_id, booked_amount, booked_at, total_rate, vault_deposited)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (pipe_id)
         DO UPDATE SET booked_amount = ?2, booked_at = ?3, total_rate = ?4, vault_deposited = ?5",
        rusqlite::params![
            pipe.as_slice(),
            amount_to_text(row.booked_amount),
            row.booked_at as i64,
            rate_to_text(row.total_rate),
            amount_to_text(row.vault_deposited),
        ],
    )?;
    Ok(())
}

/// Fetch a pipe's valve-wide total, if anyone has ever allocated to it.
pub fn get(conn: &Connection, pipe: &PipeId) -> Result<Option<PipeTotalsRow>> {
    let mut stmt = conn.prepare(
        "SELECT booked_amount, booked_at, total_rate, vault_deposited
         FROM pipe_totals WHERE pipe_id = ?1",
    )?;

    let row = stmt
        .query_map(rusqlite::params![pipe.as_slice()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .next()
        .transpose()?;

    match row {
        Some((booked_text, booked_at, rate_text, vault_text)) => Ok(Some(PipeTotalsRow {
            booked_amount: parse_amount(&booked_text)?,
            booked_at,
            total_rate: parse_rate(&rate_text)?,
            vault_deposited: parse_amount(&vault_text)?,
        })),
        None => Ok(None),
    }
}

/// All valve-wide totals.
pub fn all(conn: &Connection) -> Result<Vec<(PipeId, PipeTotalsRow)>> {
    let mut stmt = conn.prepare(
        "SELECT pipe_id, booked_amount, booked_at, total_rate, vault_deposited
         FROM pipe_totals ORDER BY pipe_id ASC",
    )?;

    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(blob, booked_text, booked_at, rate_text, vault_text)| {
            Ok((
                id_from_blob(blob)?,
                PipeTotalsRow {
                    booked_amount: parse_amount(&booked_text)?,
                    booked_at,
                    total_rate: parse_rate(&rate_text)?,
                    vault_deposited: parse_amount(&vault_text)?,
                },
            ))
        })
        .collect()
}
