//! # flowvalve-types
//!
//! Shared domain types used across the flowvalve workspace.
//!
//! ## Modules
//!
//! - [`flow`] — Inbound flow lifecycle events and allocation payloads
//! - [`events`] — Observability event envelope

pub mod events;
pub mod flow;

/// Common type aliases.
pub type AccountId = [u8; 32];
pub type PipeId = [u8; 32];
/// Token amount in the smallest unit.
pub type Amount = u128;
/// Tokens per second, signed.
pub type FlowRate = i128;
/// Unix epoch seconds.
pub type Timestamp = u64;
/// Vault share units.
pub type Shares = u128;

/// A fully allocated account's percentages sum to exactly this.
pub const FULL_ALLOCATION: i64 = 100;

/// Seconds in the 30-day accounting month used for rate conversion.
pub const SECONDS_PER_MONTH: u64 = 30 * 24 * 3600;

/// Smallest-unit scale of the streamed token (10^18 per whole token).
pub const RATE_SCALE: u128 = 1_000_000_000_000_000_000;
