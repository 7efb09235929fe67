//! In-memory vault for development and tests.
//!
//! Shares price 1:1 against assets and no yield accrues. A settable
//! redemption cap simulates a vault whose liquidity is temporarily
//! locked, which is how partial-redemption handling is exercised.

use std::sync::{Arc, Mutex};

use flowvalve_types::{Amount, Shares};

use crate::{Result, VaultError, YieldVault};

/// A stub vault with 1:1 share pricing.
#[derive(Debug, Clone, Default)]
pub struct StubVault {
    assets: Amount,
    shares: Shares,
    redeem_cap: Option<Amount>,
}

impl StubVault {
    /// Create an empty stub vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Outstanding shares (equals assets at 1:1 pricing).
    pub fn total_shares(&self) -> Shares {
        self.shares
    }

    /// Cap the amount a single `redeem` call may return
    /// (development/testing only).
    pub fn dev_set_redeem_cap(&mut self, cap: Option<Amount>) {
        tracing::warn!(?cap, "stub vault: redeem cap changed (dev only)");
        self.redeem_cap = cap;
    }
}

impl YieldVault for StubVault {
    fn deposit(&mut self, amount: Amount) -> Result<Shares> {
        self.assets = self.assets.checked_add(amount).ok_or(VaultError::Overflow)?;
        self.shares = self.shares.checked_add(amount).ok_or(VaultError::Overflow)?;
        Ok(amount)
    }

    fn redeem(&mut self, amount: Amount) -> Result<Amount> {
        let mut available = amount.min(self.assets);
        if let Some(cap) = self.redeem_cap {
            available = available.min(cap);
        }
        self.assets -= available;
        self.shares -= available;
        Ok(available)
    }

    fn balance_of(&self) -> Amount {
        self.assets
    }
}

/// Shared handle to a stub vault.
///
/// Lets a test keep poking the stub (caps, inspection) after handing the
/// engine its boxed copy.
impl YieldVault for Arc<Mutex<StubVault>> {
    fn deposit(&mut self, amount: Amount) -> Result<Shares> {
        self.lock()
            .map_err(|_| VaultError::Unavailable("stub vault lock poisoned".into()))?
            .deposit(amount)
    }

    fn redeem(&mut self, amount: Amount) -> Result<Amount> {
        self.lock()
            .map_err(|_| VaultError::Unavailable("stub vault lock poisoned".into()))?
            .redeem(amount)
    }

    fn balance_of(&self) -> Amount {
        self.lock().map(|vault| vault.balance_of()).unwrap_or(0)
    }
}
