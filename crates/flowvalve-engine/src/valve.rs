//! The valve: pipe registry, lazy balance reads, and aggregate reporting.
//!
//! Mutating operations take `&mut self` and run inside a single ledger
//! transaction; reads settle checkpoints against the caller's clock
//! without writing anything. Wrap the valve in [`crate::SharedValve`]
//! to serve concurrent callers.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::broadcast;

use flowvalve_accrual::balance::settle;
use flowvalve_accrual::AccrualError;
use flowvalve_ledger::queries::{allocations, checkpoints, flows, pipes, settlements, totals};
use flowvalve_ledger::queries::{flows::FlowRow, settlements::SettlementRow};
use flowvalve_types::events::{ValveEvent, ValveEventKind};
use flowvalve_types::{AccountId, Amount, FlowRate, PipeId, Timestamp};
use flowvalve_vault::YieldVault;

use crate::events::EventBus;
use crate::{id_hex, EngineError, Result};

/// Aggregate view over the whole valve, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ValveSummary {
    pub registered_pipes: u64,
    pub active_flows: u64,
    /// Sum of all pipes' aggregate inbound rates, tokens/sec scaled 1e18.
    pub aggregate_rate: FlowRate,
    /// Everything earned and not yet withdrawn, settled at `as_of`.
    pub outstanding_total: Amount,
    /// Portion of the outstanding total parked in yield vaults.
    pub vault_deposited_total: Amount,
    pub as_of: Timestamp,
}

/// The money-streaming valve.
pub struct Valve {
    pub(crate) conn: Connection,
    pub(crate) admin: AccountId,
    pub(crate) bus: EventBus,
    pub(crate) vaults: HashMap<PipeId, Box<dyn YieldVault>>,
}

impl Valve {
    /// Open or create a valve backed by the ledger at `path`.
    pub fn open(path: &Path, admin: AccountId, event_buffer: usize) -> Result<Self> {
        let conn = flowvalve_ledger::open(path)?;
        Ok(Self {
            conn,
            admin,
            bus: EventBus::new(event_buffer),
            vaults: HashMap::new(),
        })
    }

    /// Open a valve on an in-memory ledger (for testing).
    pub fn open_memory(admin: AccountId) -> Result<Self> {
        let conn = flowvalve_ledger::open_memory()?;
        Ok(Self {
            conn,
            admin,
            bus: EventBus::new(64),
            vaults: HashMap::new(),
        })
    }

    /// Wrap the valve for concurrent callers.
    pub fn shared(self) -> crate::SharedValve {
        std::sync::Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Bind a yield vault to a pipe. Deployment wiring, not persisted.
    pub fn bind_vault(&mut self, pipe: &PipeId, vault: Box<dyn YieldVault>) {
        self.vaults.insert(*pipe, vault);
    }

    /// Subscribe to valve events.
    pub fn subscribe(&self) -> broadcast::Receiver<ValveEvent> {
        self.bus.subscribe()
    }

    /// The event bus handle.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub(crate) fn require_admin(&self, caller: &AccountId) -> Result<()> {
        if caller != &self.admin {
            return Err(EngineError::PermissionDenied);
        }
        Ok(())
    }

    pub(crate) fn emit(&self, kind: ValveEventKind, now: Timestamp, payload: serde_json::Value) {
        self.bus.emit(ValveEvent {
            kind,
            timestamp: now,
            payload,
        });
    }

    // ------------------------------------------------------------
    // Pipe registry (admin-only)
    // ------------------------------------------------------------

    /// Register a destination pipe.
    pub fn add_pipe_address(
        &mut self,
        caller: &AccountId,
        pipe: &PipeId,
        now: Timestamp,
    ) -> Result<()> {
        self.require_admin(caller)?;
        if pipes::exists(&self.conn, pipe)? {
            return Err(EngineError::AlreadyRegistered { pipe: id_hex(pipe) });
        }
        pipes::insert(&self.conn, pipe, now)?;

        tracing::info!("Registered pipe {}", id_hex(pipe));
        self.emit(
            ValveEventKind::PipeAdded,
            now,
            serde_json::json!({ "pipe": id_hex(pipe) }),
        );
        Ok(())
    }

    /// Remove a destination pipe from the registry.
    ///
    /// Refused while any account still streams into the pipe. Balances
    /// already booked against it survive removal and stay withdrawable.
    pub fn remove_pipe_address(
        &mut self,
        caller: &AccountId,
        pipe: &PipeId,
        now: Timestamp,
    ) -> Result<()> {
        self.require_admin(caller)?;
        if !pipes::exists(&self.conn, pipe)? {
            return Err(EngineError::NotRegistered { pipe: id_hex(pipe) });
        }
        if let Some(t) = totals::get(&self.conn, pipe)? {
            if t.total_rate != 0 {
                return Err(EngineError::PipeStillFlowing { pipe: id_hex(pipe) });
            }
        }
        pipes::delete(&self.conn, pipe)?;

        tracing::info!("Removed pipe {}", id_hex(pipe));
        self.emit(
            ValveEventKind::PipeRemoved,
            now,
            serde_json::json!({ "pipe": id_hex(pipe) }),
        );
        Ok(())
    }

    // ------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------

    /// All currently registered pipe addresses.
    pub fn valid_pipe_addresses(&self) -> Result<Vec<PipeId>> {
        Ok(pipes::list(&self.conn)?)
    }

    /// Whether a pipe is currently in the registry.
    pub fn is_valid_pipe_address(&self, pipe: &PipeId) -> Result<bool> {
        Ok(pipes::exists(&self.conn, pipe)?)
    }

    /// The percentage an account currently routes to a pipe (0 if none).
    pub fn user_pipe_allocation(&self, account: &AccountId, pipe: &PipeId) -> Result<u8> {
        Ok(allocations::get(&self.conn, account, pipe)?
            .map(|a| a.percentage)
            .unwrap_or(0))
    }

    /// The per-second rate an account currently streams to a pipe (0 if none).
    pub fn user_pipe_flow_rate(&self, account: &AccountId, pipe: &PipeId) -> Result<FlowRate> {
        Ok(allocations::get(&self.conn, account, pipe)?
            .map(|a| a.flow_rate)
            .unwrap_or(0))
    }

    /// An account's flow, if one is active.
    pub fn account_flow(&self, account: &AccountId) -> Result<Option<FlowRow>> {
        Ok(flows::get(&self.conn, account)?)
    }

    /// What one pipe could pay the account right now (0 if no history).
    pub fn user_pipe_withdrawable(
        &self,
        account: &AccountId,
        pipe: &PipeId,
        now: Timestamp,
    ) -> Result<Amount> {
        let Some(cp) = checkpoints::get(&self.conn, account, pipe)? else {
            return Ok(0);
        };
        let rate = allocations::get(&self.conn, account, pipe)?
            .map(|a| a.flow_rate)
            .unwrap_or(0);
        Ok(settle(cp.booked_amount, rate, cp.booked_at, now)?)
    }

    /// Everything the account has streamed out and not yet withdrawn,
    /// summed across its whole allocation history. Returns the total and
    /// the instant it was settled at.
    pub fn user_total_flowed_balance(
        &self,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<(Amount, Timestamp)> {
        let mut total: Amount = 0;
        for cp in checkpoints::for_account(&self.conn, account)? {
            let rate = allocations::get(&self.conn, account, &cp.pipe)?
                .map(|a| a.flow_rate)
                .unwrap_or(0);
            let due = settle(cp.booked_amount, rate, cp.booked_at, now)?;
            total = total.checked_add(due).ok_or(AccrualError::Overflow)?;
        }
        Ok((total, now))
    }

    /// Valve-wide outstanding balance and aggregate inbound rate.
    pub fn total_valve_balance(&self, now: Timestamp) -> Result<(Amount, FlowRate)> {
        let mut total: Amount = 0;
        let mut rate: FlowRate = 0;
        for (_pipe, t) in totals::all(&self.conn)? {
            let outstanding = settle(t.booked_amount, t.total_rate, t.booked_at, now)?;
            total = total
                .checked_add(outstanding)
                .ok_or(AccrualError::Overflow)?;
            rate = rate.checked_add(t.total_rate).ok_or(AccrualError::Overflow)?;
        }
        Ok((total, rate))
    }

    /// Aggregate view for reporting.
    pub fn valve_summary(&self, now: Timestamp) -> Result<ValveSummary> {
        let mut outstanding_total: Amount = 0;
        let mut vault_deposited_total: Amount = 0;
        let mut aggregate_rate: FlowRate = 0;
        for (_pipe, t) in totals::all(&self.conn)? {
            let outstanding = settle(t.booked_amount, t.total_rate, t.booked_at, now)?;
            outstanding_total = outstanding_total
                .checked_add(outstanding)
                .ok_or(AccrualError::Overflow)?;
            vault_deposited_total = vault_deposited_total
                .checked_add(t.vault_deposited)
                .ok_or(AccrualError::Overflow)?;
            aggregate_rate = aggregate_rate
                .checked_add(t.total_rate)
                .ok_or(AccrualError::Overflow)?;
        }

        Ok(ValveSummary {
            registered_pipes: pipes::list(&self.conn)?.len() as u64,
            active_flows: flows::count(&self.conn)?,
            aggregate_rate,
            outstanding_total,
            vault_deposited_total,
            as_of: now,
        })
    }

    /// Recent withdrawals, newest first.
    pub fn recent_settlements(&self, limit: u32) -> Result<Vec<SettlementRow>> {
        Ok(settlements::recent(&self.conn, limit)?)
    }

    /// Cross-check per-account checkpoints against valve-wide totals.
    ///
    /// For every pipe, the settled sum of all account checkpoints must
    /// equal the settled valve-wide total. Returns the pipes where it
    /// does not.
    pub fn check_booked_totals(&self, now: Timestamp) -> Result<Vec<PipeId>> {
        let mut mismatched = Vec::new();
        for (pipe, t) in totals::all(&self.conn)? {
            let valve_side = settle(t.booked_amount, t.total_rate, t.booked_at, now)?;

            let mut account_side: Amount = 0;
            for (account, cp) in checkpoints::for_pipe(&self.conn, &pipe)? {
                let rate = allocations::get(&self.conn, &account, &pipe)?
                    .map(|a| a.flow_rate)
                    .unwrap_or(0);
                let due = settle(cp.booked_amount, rate, cp.booked_at, now)?;
                account_side = account_side
                    .checked_add(due)
                    .ok_or(AccrualError::Overflow)?;
            }

            if valve_side != account_side {
                tracing::warn!(
                    "Pipe {} booked mismatch: valve {valve_side}, accounts {account_side}",
                    id_hex(&pipe)
                );
                mismatched.push(pipe);
            }
        }
        Ok(mismatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowvalve_ledger::queries::totals::PipeTotalsRow;

    const ADMIN: AccountId = [0xAD; 32];
    const PIPE_A: PipeId = [0xA1; 32];

    fn test_valve() -> Valve {
        Valve::open_memory(ADMIN).expect("open valve")
    }

    #[test]
    fn test_add_and_list_pipes() {
        let mut valve = test_valve();
        valve.add_pipe_address(&ADMIN, &PIPE_A, 1000).expect("add");
        assert_eq!(valve.valid_pipe_addresses().expect("list"), vec![PIPE_A]);
        assert!(valve.is_valid_pipe_address(&PIPE_A).expect("check"));
        assert!(!valve.is_valid_pipe_address(&[0x55; 32]).expect("check"));
    }

    #[test]
    fn test_add_requires_admin() {
        let mut valve = test_valve();
        let err = valve
            .add_pipe_address(&[1u8; 32], &PIPE_A, 1000)
            .expect_err("must fail");
        assert!(matches!(err, EngineError::PermissionDenied));
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let mut valve = test_valve();
        valve.add_pipe_address(&ADMIN, &PIPE_A, 1000).expect("add");
        let err = valve
            .add_pipe_address(&ADMIN, &PIPE_A, 1001)
            .expect_err("must fail");
        assert!(matches!(err, EngineError::AlreadyRegistered { .. }));
    }

    #[test]
    fn test_remove_missing_rejected() {
        let mut valve = test_valve();
        let err = valve
            .remove_pipe_address(&ADMIN, &PIPE_A, 1000)
            .expect_err("must fail");
        assert!(matches!(err, EngineError::NotRegistered { .. }));
    }

    #[test]
    fn test_remove_refused_while_flowing() {
        let mut valve = test_valve();
        valve.add_pipe_address(&ADMIN, &PIPE_A, 1000).expect("add");
        totals::upsert(
            &valve.conn,
            &PIPE_A,
            &PipeTotalsRow {
                booked_amount: 0,
                booked_at: 1000,
                total_rate: 50,
                vault_deposited: 0,
            },
        )
        .expect("seed totals");

        let err = valve
            .remove_pipe_address(&ADMIN, &PIPE_A, 2000)
            .expect_err("must fail");
        assert!(matches!(err, EngineError::PipeStillFlowing { .. }));
    }

    #[test]
    fn test_remove_allowed_once_rate_zero() {
        let mut valve = test_valve();
        valve.add_pipe_address(&ADMIN, &PIPE_A, 1000).expect("add");
        totals::upsert(
            &valve.conn,
            &PIPE_A,
            &PipeTotalsRow {
                booked_amount: 5000,
                booked_at: 1500,
                total_rate: 0,
                vault_deposited: 0,
            },
        )
        .expect("seed totals");

        valve
            .remove_pipe_address(&ADMIN, &PIPE_A, 2000)
            .expect("remove");
        assert!(valve.valid_pipe_addresses().expect("list").is_empty());

        // Booked balance survives removal
        let t = totals::get(&valve.conn, &PIPE_A).expect("get").expect("some");
        assert_eq!(t.booked_amount, 5000);
    }

    #[test]
    fn test_registry_events_emitted() {
        let mut valve = test_valve();
        let mut rx = valve.subscribe();

        valve.add_pipe_address(&ADMIN, &PIPE_A, 1000).expect("add");
        valve.remove_pipe_address(&ADMIN, &PIPE_A, 2000).expect("remove");

        assert_eq!(rx.try_recv().expect("first").kind, ValveEventKind::PipeAdded);
        let removed = rx.try_recv().expect("second");
        assert_eq!(removed.kind, ValveEventKind::PipeRemoved);
        assert_eq!(removed.payload["pipe"], hex::encode(PIPE_A));
    }

    #[test]
    fn test_reads_default_to_zero() {
        let valve = test_valve();
        let account = [1u8; 32];
        assert_eq!(valve.user_pipe_allocation(&account, &PIPE_A).expect("pct"), 0);
        assert_eq!(valve.user_pipe_flow_rate(&account, &PIPE_A).expect("rate"), 0);
        assert_eq!(
            valve.user_pipe_withdrawable(&account, &PIPE_A, 1000).expect("due"),
            0
        );
        let (total, as_of) = valve.user_total_flowed_balance(&account, 1000).expect("total");
        assert_eq!(total, 0);
        assert_eq!(as_of, 1000);
    }

    #[test]
    fn test_empty_valve_summary() {
        let valve = test_valve();
        let summary = valve.valve_summary(1000).expect("summary");
        assert_eq!(summary.registered_pipes, 0);
        assert_eq!(summary.active_flows, 0);
        assert_eq!(summary.aggregate_rate, 0);
        assert_eq!(summary.outstanding_total, 0);
        assert_eq!(summary.as_of, 1000);
    }

    #[test]
    fn test_total_valve_balance_settles_lazily() {
        let valve = test_valve();
        totals::upsert(
            &valve.conn,
            &PIPE_A,
            &PipeTotalsRow {
                booked_amount: 1000,
                booked_at: 1000,
                total_rate: 10,
                vault_deposited: 0,
            },
        )
        .expect("seed totals");

        let (total, rate) = valve.total_valve_balance(1030).expect("balance");
        assert_eq!(total, 1000 + 10 * 30);
        assert_eq!(rate, 10);
    }
}
