//! Observability event envelope.
//!
//! Every state-changing valve operation emits one event on the engine's
//! broadcast bus for auditing and UI consumption.

use serde::{Deserialize, Serialize};

/// Envelope for all valve events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValveEvent {
    pub kind: ValveEventKind,
    /// Unix timestamp of the operation that produced the event.
    pub timestamp: u64,
    /// Kind-specific payload (hex-encoded ids, decimal amounts).
    pub payload: serde_json::Value,
}

/// All valve event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveEventKind {
    PipeAdded,
    PipeRemoved,
    FlowCreated,
    FlowUpdated,
    FlowDeleted,
    Withdrawal,
    VaultDeposit,
}
