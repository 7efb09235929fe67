//! Inbound flow lifecycle events and allocation payloads.
//!
//! The streaming collaborator delivers every rate change as one tagged
//! [`FlowEvent`] carrying the new allocation batch, so rate and
//! percentages always change together.

use serde::{Deserialize, Serialize};

use crate::{AccountId, FlowRate, PipeId};

/// Allocation batch riding on a flow event.
///
/// `pipes` and `percentages` pair by index and must have equal length.
/// Percentages are plain integers; out-of-range values are rejected at
/// validation time, not by the type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPayload {
    pub pipes: Vec<PipeId>,
    pub percentages: Vec<i64>,
}

impl AllocationPayload {
    /// Build a payload from paired sequences.
    pub fn new(pipes: Vec<PipeId>, percentages: Vec<i64>) -> Self {
        Self { pipes, percentages }
    }

    /// An all-zero payload naming the given pipes (used on flow delete).
    pub fn zeroed(pipes: &[PipeId]) -> Self {
        Self {
            percentages: vec![0; pipes.len()],
            pipes: pipes.to_vec(),
        }
    }
}

/// A lifecycle notification from the inbound streaming collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    /// A new inbound flow opened for the account.
    Created {
        account: AccountId,
        rate: FlowRate,
        payload: AllocationPayload,
    },
    /// The account's inbound flow changed rate and/or allocations.
    Updated {
        account: AccountId,
        old_rate: FlowRate,
        new_rate: FlowRate,
        payload: AllocationPayload,
    },
    /// The account's inbound flow closed.
    Deleted {
        account: AccountId,
        old_rate: FlowRate,
        payload: AllocationPayload,
    },
}

impl FlowEvent {
    /// The account this event concerns.
    pub fn account(&self) -> &AccountId {
        match self {
            FlowEvent::Created { account, .. }
            | FlowEvent::Updated { account, .. }
            | FlowEvent::Deleted { account, .. } => account,
        }
    }

    /// The allocation batch carried by this event.
    pub fn payload(&self) -> &AllocationPayload {
        match self {
            FlowEvent::Created { payload, .. }
            | FlowEvent::Updated { payload, .. }
            | FlowEvent::Deleted { payload, .. } => payload,
        }
    }
}
