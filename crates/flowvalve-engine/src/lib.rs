//! # flowvalve-engine
//!
//! The valve itself: routes each account's single inbound money stream
//! to its registered destination pipes and settles earned balances on
//! demand.
//!
//! All state lives in the SQLite ledger; nothing ticks. Flow events
//! freeze checkpoints and swap rates, reads settle lazily against the
//! caller's clock, and withdrawals zero checkpoints after the pipe's
//! liquidity (on hand plus yield vault) has covered the amount due.

pub mod config;
pub mod events;
pub mod reconcile;
pub mod settle;
pub mod valve;

use std::sync::Arc;

use flowvalve_accrual::AccrualError;
use flowvalve_alloc::AllocError;
use flowvalve_ledger::LedgerError;
use flowvalve_vault::VaultError;

pub use config::ValveConfig;
pub use events::EventBus;
pub use valve::{Valve, ValveSummary};

/// Engine error types.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Ledger access failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Allocation payload rejected.
    #[error("allocation error: {0}")]
    Alloc(#[from] AllocError),

    /// Checkpoint arithmetic failed.
    #[error("accrual error: {0}")]
    Accrual(#[from] AccrualError),

    /// Yield vault call failed.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// Flow events must carry a positive inbound rate.
    #[error("flow rate {rate} is not positive")]
    InvalidFlowRate { rate: i128 },

    /// A creation event arrived for an account that already streams.
    #[error("account {account} already has an active flow")]
    FlowAlreadyActive { account: String },

    /// An update or delete event arrived for an account with no flow.
    #[error("account {account} has no active flow")]
    NoActiveFlow { account: String },

    /// Registry changes are admin-only.
    #[error("caller is not the valve admin")]
    PermissionDenied,

    /// The pipe is already in the registry.
    #[error("pipe {pipe} is already registered")]
    AlreadyRegistered { pipe: String },

    /// The pipe is not in the registry.
    #[error("pipe {pipe} is not registered")]
    NotRegistered { pipe: String },

    /// A pipe cannot be removed while money still streams into it.
    #[error("pipe {pipe} still has an aggregate inbound rate")]
    PipeStillFlowing { pipe: String },

    /// Withdrawal names a pipe the account never allocated to.
    #[error("pipe {pipe} was never part of the account's allocations")]
    NotRegisteredPipe { pipe: String },

    /// The pipe's vault could not free enough to cover the shortfall.
    #[error("pipe {pipe} liquidity shortfall: needed {requested}, freed {available}")]
    InsufficientLiquidity {
        pipe: String,
        requested: u128,
        available: u128,
    },

    /// The pipe has no yield vault bound.
    #[error("pipe {pipe} has no yield vault bound")]
    NoVault { pipe: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Shared handle to the valve for concurrent callers.
pub type SharedValve = Arc<tokio::sync::Mutex<Valve>>;

/// Hex form of a 32-byte identifier, for error and event payloads.
pub(crate) fn id_hex(id: &[u8; 32]) -> String {
    hex::encode(id)
}
