//! Settlement: withdrawals and idle-fund vault sweeps.
//!
//! A withdrawal runs in three phases. First the amount due is settled
//! read-only. Then each paying pipe is made liquid, redeeming from its
//! yield vault where on-hand funds fall short — redemptions are external
//! calls, so their bookkeeping commits immediately and independently of
//! the payout. Only then does one transaction zero the account's
//! checkpoints, shrink the valve-wide totals, and book the settlement.
//! A vault that cannot free enough aborts between phases with the
//! ledger's claims intact, so the same withdrawal can be retried.

use std::collections::BTreeSet;

use flowvalve_accrual::balance::settle;
use flowvalve_accrual::AccrualError;
use flowvalve_ledger::queries::totals::PipeTotalsRow;
use flowvalve_ledger::queries::{allocations, checkpoints, settlements, totals};
use flowvalve_ledger::LedgerError;
use flowvalve_types::events::ValveEventKind;
use flowvalve_types::{AccountId, Amount, PipeId, Timestamp};

use crate::valve::Valve;
use crate::{id_hex, EngineError, Result};

impl Valve {
    /// Withdraw everything the named pipes owe the account.
    ///
    /// Every pipe must appear in the account's allocation history; pipes
    /// since removed from the registry still pay out their frozen
    /// balances. Returns the total paid.
    pub fn withdraw(
        &mut self,
        account: &AccountId,
        pipes: &[PipeId],
        now: Timestamp,
    ) -> Result<Amount> {
        // A pipe listed twice must not pay twice.
        let unique: BTreeSet<PipeId> = pipes.iter().copied().collect();

        // Phase 1: settle what each pipe owes, read-only.
        let mut due: Vec<(PipeId, Amount)> = Vec::with_capacity(unique.len());
        let mut total: Amount = 0;
        for pipe in &unique {
            let Some(cp) = checkpoints::get(&self.conn, account, pipe)? else {
                return Err(EngineError::NotRegisteredPipe { pipe: id_hex(pipe) });
            };
            let rate = allocations::get(&self.conn, account, pipe)?
                .map(|a| a.flow_rate)
                .unwrap_or(0);
            let amount = settle(cp.booked_amount, rate, cp.booked_at, now)?;
            if amount > 0 {
                total = total.checked_add(amount).ok_or(AccrualError::Overflow)?;
                due.push((*pipe, amount));
            }
        }
        if total == 0 {
            return Ok(0);
        }

        // Phase 2: make every paying pipe liquid.
        for (pipe, amount) in &due {
            self.ensure_liquidity(pipe, *amount, now)?;
        }

        // Phase 3: zero checkpoints and book the settlement, atomically.
        let tx = self.conn.transaction().map_err(LedgerError::from)?;
        for (pipe, amount) in &due {
            checkpoints::upsert(&tx, account, pipe, 0, now)?;

            let t = totals::get(&tx, pipe)?.ok_or_else(|| {
                LedgerError::Corrupt(format!(
                    "pipe {} has checkpoints but no totals row",
                    id_hex(pipe)
                ))
            })?;
            let settled = settle(t.booked_amount, t.total_rate, t.booked_at, now)?;
            let remaining = settled.checked_sub(*amount).ok_or_else(|| {
                LedgerError::Corrupt(format!(
                    "pipe {} owes {amount} but valve-wide balance is {settled}",
                    id_hex(pipe)
                ))
            })?;
            totals::upsert(
                &tx,
                pipe,
                &PipeTotalsRow {
                    booked_amount: remaining,
                    booked_at: now,
                    total_rate: t.total_rate,
                    vault_deposited: t.vault_deposited,
                },
            )?;
        }
        settlements::record(&tx, account, total, due.len() as u32, now)?;
        tx.commit().map_err(LedgerError::from)?;

        tracing::info!(
            "Settled {total} to {} across {} pipes",
            id_hex(account),
            due.len()
        );
        self.emit(
            ValveEventKind::Withdrawal,
            now,
            serde_json::json!({
                "account": id_hex(account),
                "amount": total.to_string(),
                "pipes": due.len(),
            }),
        );
        Ok(total)
    }

    /// Sweep a pipe's on-hand funds into its yield vault. Admin-only.
    ///
    /// Returns the amount deposited (0 when nothing is on hand).
    pub fn deposit_idle_funds(
        &mut self,
        caller: &AccountId,
        pipe: &PipeId,
        now: Timestamp,
    ) -> Result<Amount> {
        self.require_admin(caller)?;
        if !self.vaults.contains_key(pipe) {
            return Err(EngineError::NoVault { pipe: id_hex(pipe) });
        }

        let Some(t) = totals::get(&self.conn, pipe)? else {
            return Ok(0);
        };
        let outstanding = settle(t.booked_amount, t.total_rate, t.booked_at, now)?;
        let on_hand = outstanding.checked_sub(t.vault_deposited).ok_or_else(|| {
            LedgerError::Corrupt(format!(
                "pipe {} vault deposit exceeds outstanding balance",
                id_hex(pipe)
            ))
        })?;
        if on_hand == 0 {
            return Ok(0);
        }

        let shares = match self.vaults.get_mut(pipe) {
            Some(vault) => vault.deposit(on_hand)?,
            None => return Err(EngineError::NoVault { pipe: id_hex(pipe) }),
        };
        let new_deposited = t
            .vault_deposited
            .checked_add(on_hand)
            .ok_or(AccrualError::Overflow)?;
        totals::upsert(
            &self.conn,
            pipe,
            &PipeTotalsRow {
                vault_deposited: new_deposited,
                ..t
            },
        )?;

        tracing::info!(
            "Deposited {on_hand} from pipe {} into its vault for {shares} shares",
            id_hex(pipe)
        );
        self.emit(
            ValveEventKind::VaultDeposit,
            now,
            serde_json::json!({
                "pipe": id_hex(pipe),
                "amount": on_hand.to_string(),
                "shares": shares.to_string(),
            }),
        );
        Ok(on_hand)
    }

    /// Redeem from the pipe's vault until `amount` is coverable on hand.
    ///
    /// Successful redemptions are persisted immediately: the tokens have
    /// already moved out of the vault, so the ledger must reflect that
    /// even if the withdrawal aborts afterwards.
    fn ensure_liquidity(&mut self, pipe: &PipeId, amount: Amount, now: Timestamp) -> Result<()> {
        let t = totals::get(&self.conn, pipe)?.ok_or_else(|| {
            LedgerError::Corrupt(format!("pipe {} has no totals row", id_hex(pipe)))
        })?;
        let outstanding = settle(t.booked_amount, t.total_rate, t.booked_at, now)?;
        let on_hand = outstanding.checked_sub(t.vault_deposited).ok_or_else(|| {
            LedgerError::Corrupt(format!(
                "pipe {} vault deposit exceeds outstanding balance",
                id_hex(pipe)
            ))
        })?;
        if amount <= on_hand {
            return Ok(());
        }
        let short = amount - on_hand;

        let Some(vault) = self.vaults.get_mut(pipe) else {
            return Err(EngineError::InsufficientLiquidity {
                pipe: id_hex(pipe),
                requested: short,
                available: 0,
            });
        };
        let redeemed = vault.redeem(short)?;
        if redeemed > 0 {
            let new_deposited = t.vault_deposited.checked_sub(redeemed).ok_or_else(|| {
                LedgerError::Corrupt(format!(
                    "pipe {} redeemed more than its recorded deposit",
                    id_hex(pipe)
                ))
            })?;
            totals::upsert(
                &self.conn,
                pipe,
                &PipeTotalsRow {
                    vault_deposited: new_deposited,
                    ..t
                },
            )?;
        }
        if redeemed < short {
            tracing::warn!(
                "Pipe {} vault freed {redeemed} of {short}; withdrawal aborted",
                id_hex(pipe)
            );
            return Err(EngineError::InsufficientLiquidity {
                pipe: id_hex(pipe),
                requested: short,
                available: redeemed,
            });
        }
        Ok(())
    }
}
