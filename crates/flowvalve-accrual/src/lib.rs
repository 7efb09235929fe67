//! # flowvalve-accrual
//!
//! Pure time/rate arithmetic for lazy balance accrual. No state, no
//! clock: every function takes explicit timestamps, so a balance is
//! always computable as `booked + rate × elapsed` without any ticking.
//!
//! ## Modules
//!
//! - [`balance`] — Elapsed-time clamp, accrual, checkpoint settlement
//! - [`rate`] — Monthly-to-per-second rate conversion

pub mod balance;
pub mod rate;

/// Error types for accrual arithmetic.
#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    /// A derived rate turned out negative; this is an invariant
    /// violation upstream, never a caller error.
    #[error("negative flow rate in accrual: {rate}")]
    NegativeRate {
        /// The offending rate in tokens per second.
        rate: i128,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in accrual calculation")]
    Overflow,
}

/// Convenience result type for accrual operations.
pub type Result<T> = std::result::Result<T, AccrualError>;
