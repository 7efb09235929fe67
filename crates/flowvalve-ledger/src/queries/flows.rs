//! Account flow query functions.
//!
//! Row presence in `account_flows` is the flow-active predicate: an account
//! has at most one inbound flow, and deleting the row ends it.

use rusqlite::Connection;

use flowvalve_types::{AccountId, FlowRate};

use crate::{id_from_blob, parse_rate, rate_to_text, LedgerError, Result};

/// A stored account flow.
#[derive(Debug, Clone)]
pub struct FlowRow {
    pub flow_rate: FlowRate,
    pub started_at: u64,
    pub updated_at: u64,
}

/// Start tracking a flow for an account.
pub fn insert(conn: &Connection, account: &AccountId, rate: FlowRate, now: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO account_flows (account, flow_rate, started_at, updated_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![account.as_slice(), rate_to_text(rate), now as i64, now as i64],
    )?;
    Ok(())
}

/// Update the stored rate of an active flow.
pub fn update_rate(conn: &Connection, account: &AccountId, rate: FlowRate, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE account_flows SET flow_rate = ?1, updated_at = ?2 WHERE account = ?3",
        rusqlite::params![rate_to_text(rate), now as i64, account.as_slice()],
    )?;
    if updated == 0 {
        return Err(LedgerError::NotFound("no active flow for account".into()));
    }
    Ok(())
}

/// End an account's flow. Allocation rows cascade away with it.
pub fn delete(conn: &Connection, account: &AccountId) -> Result<()> {
    let deleted = conn.execute(
        "DELETE FROM account_flows WHERE account = ?1",
        rusqlite::params![account.as_slice()],
    )?;
    if deleted == 0 {
        return Err(LedgerError::NotFound("no active flow for account".into()));
    }
    Ok(())
}

/// Fetch an account's flow, if one is active.
pub fn get(conn: &Connection, account: &AccountId) -> Result<Option<FlowRow>> {
    let mut stmt = conn.prepare(
        "SELECT flow_rate, started_at, updated_at FROM account_flows WHERE account = ?1",
    )?;

    let row = stmt
        .query_map(rusqlite::params![account.as_slice()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .next()
        .transpose()?;

    match row {
        Some((rate_text, started_at, updated_at)) => Ok(Some(FlowRow {
            flow_rate: parse_rate(&rate_text)?,
            started_at,
            updated_at,
        })),
        None => Ok(None),
    }
}

/// Number of active flows.
pub fn count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM account_flows", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// All active flows, for aggregate reporting.
pub fn all(conn: &Connection) -> Result<Vec<(AccountId, FlowRow)>> {
    let mut stmt = conn.prepare(
        "SELECT account, flow_rate, started_at, updated_at
         FROM account_flows ORDER BY started_at ASC",
    )?;

    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, i64>(3)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(blob, rate_text, started_at, updated_at)| {
            Ok((
                id_from_blob(blob)?,
                FlowRow {
                    flow_rate: parse_rate(&rate_text)?,
                    started_at,
                    updated_at,
                },
            ))
        })
        .collect()
}
