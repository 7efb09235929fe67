//! # flowvalve-alloc
//!
//! Allocation batch rules: payload decoding, validation, and per-pipe
//! rate derivation. Everything here is pure; the engine owns state.
//!
//! ## Modules
//!
//! - [`rules`] — Decode, validate, and derive rates for a batch

pub mod rules;

/// Error types for allocation operations.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// Payload sequences differ in length; pairing by index is broken.
    #[error("allocation payload length mismatch: {pipes} pipes, {percentages} percentages")]
    LengthMismatch {
        /// Number of pipe ids in the payload.
        pipes: usize,
        /// Number of percentages in the payload.
        percentages: usize,
    },

    /// The same pipe appears more than once in one batch.
    #[error("pipe {pipe} named more than once in allocation batch")]
    DuplicatePipe {
        /// Hex-encoded pipe id.
        pipe: String,
    },

    /// A named pipe is not in the registry's valid set.
    #[error("pipe {pipe} is not a registered destination")]
    InvalidPipeAddress {
        /// Hex-encoded pipe id.
        pipe: String,
    },

    /// A percentage falls outside 0..=100.
    #[error("percentage {percentage} for pipe {pipe} is outside 0..=100")]
    PercentageOutOfRange {
        /// Hex-encoded pipe id.
        pipe: String,
        /// The offending percentage.
        percentage: i64,
    },

    /// Percentages sum to neither 0 nor 100.
    #[error("allocation percentages must sum to 0 or 100, got {total}")]
    AllocationsNotFullOrZero {
        /// The actual total.
        total: i64,
    },

    /// A rate was derived from a negative total; unreachable when
    /// upstream validation holds.
    #[error("negative total flow rate in derivation: {rate}")]
    NegativeRate {
        /// The offending total rate.
        rate: i128,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in rate derivation")]
    Overflow,
}

/// Convenience result type for allocation operations.
pub type Result<T> = std::result::Result<T, AllocError>;
