//! Flow reconciliation: applying create, update, and delete events.
//!
//! Each event is applied atomically. The freeze rule is the core of the
//! lazy accounting: every pipe in the union of the account's old and new
//! allocation sets gets its per-account checkpoint and its valve-wide
//! checkpoint settled to `now` before any rate changes, so accrual before
//! the event is booked under the old rates and accrual after it runs
//! under the new ones.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rusqlite::Transaction;

use flowvalve_accrual::balance::settle;
use flowvalve_accrual::AccrualError;
use flowvalve_alloc::rules::{decode_entries, derive_rate, validate_entries};
use flowvalve_ledger::queries::totals::PipeTotalsRow;
use flowvalve_ledger::queries::{allocations, checkpoints, flows, pipes, totals};
use flowvalve_ledger::LedgerError;
use flowvalve_types::events::ValveEventKind;
use flowvalve_types::flow::FlowEvent;
use flowvalve_types::{AccountId, FlowRate, PipeId, Timestamp};

use crate::valve::Valve;
use crate::{id_hex, EngineError, Result};

impl Valve {
    /// Apply one flow reconciliation event from the streaming collaborator.
    ///
    /// Rejected events leave the ledger untouched. On success the account's
    /// checkpoints are frozen at `now`, its committed allocation batch is
    /// replaced, and every touched pipe's aggregate rate is adjusted.
    pub fn apply_flow_event(&mut self, event: &FlowEvent, now: Timestamp) -> Result<()> {
        let account = *event.account();
        let tx = self.conn.transaction().map_err(LedgerError::from)?;

        let stored = flows::get(&tx, &account)?;

        // State machine first, then the inbound rate, then the payload.
        let new_rate: FlowRate = match event {
            FlowEvent::Created { rate, .. } => {
                if stored.is_some() {
                    return Err(EngineError::FlowAlreadyActive {
                        account: id_hex(&account),
                    });
                }
                if *rate <= 0 {
                    return Err(EngineError::InvalidFlowRate { rate: *rate });
                }
                *rate
            }
            FlowEvent::Updated {
                old_rate, new_rate, ..
            } => {
                let Some(row) = &stored else {
                    return Err(EngineError::NoActiveFlow {
                        account: id_hex(&account),
                    });
                };
                warn_on_rate_drift(&account, *old_rate, row.flow_rate);
                if *new_rate <= 0 {
                    return Err(EngineError::InvalidFlowRate { rate: *new_rate });
                }
                *new_rate
            }
            FlowEvent::Deleted { old_rate, .. } => {
                let Some(row) = &stored else {
                    return Err(EngineError::NoActiveFlow {
                        account: id_hex(&account),
                    });
                };
                warn_on_rate_drift(&account, *old_rate, row.flow_rate);
                0
            }
        };

        let decoded = decode_entries(event.payload())?;
        let registered: HashSet<PipeId> = pipes::list(&tx)?.into_iter().collect();
        let batch = validate_entries(&decoded, |pipe| registered.contains(pipe))?;

        // New per-pipe rates. Deletion zeroes everything regardless of the
        // echoed percentages; zero-percentage entries are dropped.
        let mut new_entries: Vec<(PipeId, u8, FlowRate)> = Vec::new();
        if !matches!(event, FlowEvent::Deleted { .. }) {
            for entry in &batch {
                if entry.percentage == 0 {
                    continue;
                }
                let rate = derive_rate(new_rate, entry.percentage)?;
                new_entries.push((entry.pipe, entry.percentage, rate));
            }
        }
        let new_rates: BTreeMap<PipeId, FlowRate> =
            new_entries.iter().map(|(p, _, r)| (*p, *r)).collect();

        let old_rates: BTreeMap<PipeId, FlowRate> = allocations::for_account(&tx, &account)?
            .into_iter()
            .map(|a| (a.pipe, a.flow_rate))
            .collect();

        // Freeze everything the event touches, old side and new side.
        let mut touched: BTreeSet<PipeId> = old_rates.keys().copied().collect();
        touched.extend(new_rates.keys().copied());
        for pipe in &touched {
            let old = old_rates.get(pipe).copied().unwrap_or(0);
            let new = new_rates.get(pipe).copied().unwrap_or(0);
            freeze_account_checkpoint(&tx, &account, pipe, old, now)?;
            freeze_pipe_total(&tx, pipe, old, new, now)?;
        }

        let ledger_old_rate = stored.map(|row| row.flow_rate).unwrap_or(0);
        let (kind, payload) = match event {
            FlowEvent::Created { .. } => {
                flows::insert(&tx, &account, new_rate, now)?;
                allocations::replace_for_account(&tx, &account, &new_entries)?;
                (
                    ValveEventKind::FlowCreated,
                    serde_json::json!({
                        "account": id_hex(&account),
                        "rate": new_rate.to_string(),
                        "pipes": new_entries.len(),
                    }),
                )
            }
            FlowEvent::Updated { .. } => {
                flows::update_rate(&tx, &account, new_rate, now)?;
                allocations::replace_for_account(&tx, &account, &new_entries)?;
                (
                    ValveEventKind::FlowUpdated,
                    serde_json::json!({
                        "account": id_hex(&account),
                        "old_rate": ledger_old_rate.to_string(),
                        "new_rate": new_rate.to_string(),
                        "pipes": new_entries.len(),
                    }),
                )
            }
            FlowEvent::Deleted { .. } => {
                // Allocation rows cascade away with the flow row.
                flows::delete(&tx, &account)?;
                (
                    ValveEventKind::FlowDeleted,
                    serde_json::json!({
                        "account": id_hex(&account),
                        "old_rate": ledger_old_rate.to_string(),
                    }),
                )
            }
        };

        tx.commit().map_err(LedgerError::from)?;
        self.emit(kind, now, payload);
        Ok(())
    }
}

/// Log a disagreement between an event's reported old rate and the ledger.
/// The ledger wins.
fn warn_on_rate_drift(account: &AccountId, event_rate: FlowRate, ledger_rate: FlowRate) {
    if event_rate != ledger_rate {
        tracing::warn!(
            "Flow event for {} reports old rate {event_rate} but ledger has {ledger_rate}; \
             using ledger value",
            id_hex(account)
        );
    }
}

/// Settle one (account, pipe) checkpoint to `now` under the rate that was
/// in force, creating the row at zero if this is the pipe's first booking.
fn freeze_account_checkpoint(
    tx: &Transaction<'_>,
    account: &AccountId,
    pipe: &PipeId,
    old_rate: FlowRate,
    now: Timestamp,
) -> Result<()> {
    let (booked, booked_at) = match checkpoints::get(tx, account, pipe)? {
        Some(cp) => (cp.booked_amount, cp.booked_at),
        None => (0, now),
    };
    let settled = settle(booked, old_rate, booked_at, now)?;
    checkpoints::upsert(tx, account, pipe, settled, now)?;
    Ok(())
}

/// Settle a pipe's valve-wide checkpoint to `now` under its aggregate
/// rate, then shift the aggregate by this account's rate change.
fn freeze_pipe_total(
    tx: &Transaction<'_>,
    pipe: &PipeId,
    old_rate: FlowRate,
    new_rate: FlowRate,
    now: Timestamp,
) -> Result<()> {
    let t = totals::get(tx, pipe)?.unwrap_or(PipeTotalsRow {
        booked_amount: 0,
        booked_at: now,
        total_rate: 0,
        vault_deposited: 0,
    });
    let settled = settle(t.booked_amount, t.total_rate, t.booked_at, now)?;
    let adjusted = t
        .total_rate
        .checked_sub(old_rate)
        .and_then(|r| r.checked_add(new_rate))
        .ok_or(AccrualError::Overflow)?;

    totals::upsert(
        tx,
        pipe,
        &PipeTotalsRow {
            booked_amount: settled,
            booked_at: now,
            total_rate: adjusted,
            vault_deposited: t.vault_deposited,
        },
    )?;
    Ok(())
}
