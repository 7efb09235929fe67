//! Settlement audit-trail query functions.

use rusqlite::Connection;

use flowvalve_types::{AccountId, Amount};

use crate::{amount_to_text, id_from_blob, parse_amount, Result};

/// A recorded withdrawal.
#[derive(Debug, Clone)]
pub struct SettlementRow {
    pub account: AccountId,
    pub amount: Amount,
    pub pipe_count: u32,
    pub settled_at: u64,
}

/// Record a completed withdrawal.
pub fn record(
    conn: &Connection,
    account: &AccountId,
    amount: Amount,
    pipe_count: u32,
    settled_at: u64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO settlements (account, amount, pipe_count, settled_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            account.as_slice(),
            amount_to_text(amount),
            pipe_count as i64,
            settled_at as i64,
        ],
    )?;
    Ok(())
}

/// List recent settlements, newest first.
pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<SettlementRow>> {
    let mut stmt = conn.prepare(
        "SELECT account, amount, pipe_count, settled_at
         FROM settlements ORDER BY settled_at DESC, id DESC LIMIT ?1",
    )?;

    let raw = stmt
        .query_map([limit], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u32,
                row.get::<_, i64>(3)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(blob, amount_text, pipe_count, settled_at)| {
            Ok(SettlementRow {
                account: id_from_blob(blob)?,
                amount: parse_amount(&amount_text)?,
                pipe_count,
                settled_at,
            })
        })
        .collect()
}
