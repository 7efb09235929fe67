//! Decode, validate, and derive rates for an allocation batch.
//!
//! Validation runs in a fixed priority order so callers always see the
//! most specific rejection first:
//!
//! 1. payload shape (equal-length sequences, checked at decode),
//! 2. pipe validity against the registry, then duplicates,
//! 3. per-entry range 0..=100,
//! 4. sum exactly 0 or exactly [`FULL_ALLOCATION`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use flowvalve_types::flow::AllocationPayload;
use flowvalve_types::{FlowRate, PipeId, FULL_ALLOCATION};

use crate::{AllocError, Result};

/// A validated allocation batch entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub pipe: PipeId,
    /// Plain integer percentage, 0..=100.
    pub percentage: u8,
}

/// Pair the payload's sequences by index.
///
/// # Errors
///
/// - [`AllocError::LengthMismatch`] if the sequences differ in length
pub fn decode_entries(payload: &AllocationPayload) -> Result<Vec<(PipeId, i64)>> {
    if payload.pipes.len() != payload.percentages.len() {
        return Err(AllocError::LengthMismatch {
            pipes: payload.pipes.len(),
            percentages: payload.percentages.len(),
        });
    }
    Ok(payload
        .pipes
        .iter()
        .copied()
        .zip(payload.percentages.iter().copied())
        .collect())
}

/// Validate decoded entries against the registry and the sum rule.
///
/// `is_valid` answers registry membership for a pipe. Returns the
/// normalized batch with percentages narrowed to `u8`.
///
/// # Errors
///
/// - [`AllocError::InvalidPipeAddress`] for an unregistered pipe
/// - [`AllocError::DuplicatePipe`] for a pipe named twice
/// - [`AllocError::PercentageOutOfRange`] for a percentage outside 0..=100
/// - [`AllocError::AllocationsNotFullOrZero`] if the sum is neither 0 nor 100
pub fn validate_entries<F>(entries: &[(PipeId, i64)], is_valid: F) -> Result<Vec<AllocationEntry>>
where
    F: Fn(&PipeId) -> bool,
{
    let mut seen: HashSet<PipeId> = HashSet::with_capacity(entries.len());
    for (pipe, _) in entries {
        if !is_valid(pipe) {
            return Err(AllocError::InvalidPipeAddress {
                pipe: hex::encode(pipe),
            });
        }
        if !seen.insert(*pipe) {
            return Err(AllocError::DuplicatePipe {
                pipe: hex::encode(pipe),
            });
        }
    }

    for (pipe, percentage) in entries {
        if *percentage < 0 || *percentage > FULL_ALLOCATION {
            return Err(AllocError::PercentageOutOfRange {
                pipe: hex::encode(pipe),
                percentage: *percentage,
            });
        }
    }

    let total: i64 = entries.iter().map(|(_, pct)| pct).sum();
    if total != 0 && total != FULL_ALLOCATION {
        return Err(AllocError::AllocationsNotFullOrZero { total });
    }

    tracing::trace!(entries = entries.len(), total, "allocation batch validated");

    Ok(entries
        .iter()
        .map(|(pipe, percentage)| AllocationEntry {
            pipe: *pipe,
            percentage: *percentage as u8,
        })
        .collect())
}

/// Derive a pipe's flow rate: `floor(total_rate * percentage / 100)`.
///
/// # Errors
///
/// - [`AllocError::NegativeRate`] if `total_rate` is negative
/// - [`AllocError::Overflow`] on arithmetic overflow
pub fn derive_rate(total_rate: FlowRate, percentage: u8) -> Result<FlowRate> {
    if total_rate < 0 {
        return Err(AllocError::NegativeRate { rate: total_rate });
    }
    let shared = total_rate
        .checked_mul(percentage as FlowRate)
        .ok_or(AllocError::Overflow)?;
    Ok(shared / FULL_ALLOCATION as FlowRate)
}
