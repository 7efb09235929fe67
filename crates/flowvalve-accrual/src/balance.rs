//! Elapsed-time clamp, accrual, and checkpoint settlement.
//!
//! The load-bearing identity of the whole ledger:
//!
//! ```text
//! withdrawable(now) = booked_amount + rate * max(0, now - booked_at)
//! ```
//!
//! `booked_amount` captures all accrual before `booked_at`; the product
//! term covers everything since. Nothing here mutates state.

use flowvalve_types::{Amount, FlowRate, Timestamp};

use crate::{AccrualError, Result};

/// Seconds elapsed since `booked_at`, clamped at zero.
///
/// A `now` earlier than `booked_at` can only come from clock skew at
/// the caller; it accrues nothing rather than underflowing.
pub fn elapsed_since(booked_at: Timestamp, now: Timestamp) -> u64 {
    now.saturating_sub(booked_at)
}

/// Amount accrued by `rate` over `seconds`.
///
/// # Errors
///
/// - [`AccrualError::NegativeRate`] if `rate` is negative
/// - [`AccrualError::Overflow`] on arithmetic overflow
pub fn accrue(rate: FlowRate, seconds: u64) -> Result<Amount> {
    if rate < 0 {
        return Err(AccrualError::NegativeRate { rate });
    }
    (rate as Amount)
        .checked_mul(seconds as Amount)
        .ok_or(AccrualError::Overflow)
}

/// Settle a checkpoint to `now`: booked amount plus accrual since.
///
/// # Errors
///
/// - [`AccrualError::NegativeRate`] if `rate` is negative
/// - [`AccrualError::Overflow`] on arithmetic overflow
///
/// # Examples
///
/// ```
/// use flowvalve_accrual::balance::settle;
///
/// // 500 booked, 10 tokens/sec, 30 seconds elapsed
/// let value = settle(500, 10, 1_000, 1_030).unwrap();
/// assert_eq!(value, 800);
/// ```
pub fn settle(
    booked_amount: Amount,
    rate: FlowRate,
    booked_at: Timestamp,
    now: Timestamp,
) -> Result<Amount> {
    let accrued = accrue(rate, elapsed_since(booked_at, now))?;
    booked_amount
        .checked_add(accrued)
        .ok_or(AccrualError::Overflow)
}
