//! Per-account checkpoint query functions.
//!
//! A checkpoint books the amount a pipe had earned from one account as of
//! `booked_at`; everything after that accrues lazily from the allocation
//! rate. Rows are upserted on every freeze and zeroed on withdrawal, but
//! never deleted — the row doubles as proof that the pipe was ever part of
//! the account's allocation history.

use rusqlite::Connection;

use flowvalve_types::{AccountId, Amount, PipeId};

use crate::{amount_to_text, id_from_blob, parse_amount, Result};

/// A stored checkpoint for one (account, pipe) pair.
#[derive(Debug, Clone)]
pub struct CheckpointRow {
    pub pipe: PipeId,
    pub booked_amount: Amount,
    pub booked_at: u64,
}

/// Insert or overwrite a checkpoint.
pub fn upsert(
    conn: &Connection,
    account: &AccountId,
    pipe: &PipeId,
    booked_amount: Amount,
    booked_at: u64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO checkpoints (account, pipe_id, booked_amount, booked_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (account, pipe_id)
         DO UPDATE SET booked_amount = ?3, booked_at = ?4",
        rusqlite::params![
            account.as_slice(),
            pipe.as_slice(),
            amount_to_text(booked_amount),
            booked_at as i64,
        ],
    )?;
    Ok(())
}

/// Fetch one checkpoint, if the pair has ever been booked.
pub fn get(conn: &Connection, account: &AccountId, pipe: &PipeId) -> Result<Option<CheckpointRow>> {
    let mut stmt = conn.prepare(
        "SELECT booked_amount, booked_at FROM checkpoints WHERE account = ?1 AND pipe_id = ?2",
    )?;

    let row = stmt
        .query_map(
            rusqlite::params![account.as_slice(), pipe.as_slice()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
        )?
        .next()
        .transpose()?;

    match row {
        Some((amount_text, booked_at)) => Ok(Some(CheckpointRow {
            pipe: *pipe,
            booked_amount: parse_amount(&amount_text)?,
            booked_at,
        })),
        None => Ok(None),
    }
}

/// Whether a checkpoint row exists for the pair.
pub fn exists(conn: &Connection, account: &AccountId, pipe: &PipeId) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM checkpoints WHERE account = ?1 AND pipe_id = ?2",
        rusqlite::params![account.as_slice(), pipe.as_slice()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// All checkpoints booked for an account, across its whole allocation history.
pub fn for_account(conn: &Connection, account: &AccountId) -> Result<Vec<CheckpointRow>> {
    let mut stmt = conn.prepare(
        "SELECT pipe_id, booked_amount, booked_at
         FROM checkpoints WHERE account = ?1 ORDER BY pipe_id ASC",
    )?;

    let raw = stmt
        .query_map(rusqlite::params![account.as_slice()], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(blob, amount_text, booked_at)| {
            Ok(CheckpointRow {
                pipe: id_from_blob(blob)?,
                booked_amount: parse_amount(&amount_text)?,
                booked_at,
            })
        })
        .collect()
}

/// All accounts holding a checkpoint against a pipe.
pub fn for_pipe(conn: &Connection, pipe: &PipeId) -> Result<Vec<(AccountId, CheckpointRow)>> {
    let mut stmt = conn.prepare(
        "SELECT account, booked_amount, booked_at
         FROM checkpoints WHERE pipe_id = ?1 ORDER BY account ASC",
    )?;

    let raw = stmt
        .query_map(rusqlite::params![pipe.as_slice()], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(blob, amount_text, booked_at)| {
            Ok((
                id_from_blob(blob)?,
                CheckpointRow {
                    pipe: *pipe,
                    booked_amount: parse_amount(&amount_text)?,
                    booked_at,
                },
            ))
        })
        .collect()
}
