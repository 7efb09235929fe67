//! # flowvalve-vault
//!
//! The yield-vault collaborator boundary. Pipes may park accrued funds
//! in a vault; the settlement engine redeems from it when on-hand
//! liquidity cannot cover a withdrawal.
//!
//! ## Modules
//!
//! - [`stub`] — In-memory vault for development and tests

pub mod stub;

use flowvalve_types::{Amount, Shares};

/// Error types for vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The vault refused the operation.
    #[error("vault unavailable: {0}")]
    Unavailable(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in vault accounting")]
    Overflow,
}

/// Convenience result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// A yield vault holding a pipe's parked funds.
///
/// `redeem` may return less than asked; the caller decides whether a
/// shortfall is fatal. Implementations are owned by the engine behind a
/// boxed trait object, one per pipe.
pub trait YieldVault: Send {
    /// Deposit `amount` and receive shares.
    fn deposit(&mut self, amount: Amount) -> Result<Shares>;

    /// Redeem up to `amount`; returns what actually came back.
    fn redeem(&mut self, amount: Amount) -> Result<Amount>;

    /// Current asset balance held for the depositor.
    fn balance_of(&self) -> Amount;
}
