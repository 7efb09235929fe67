//! Integration test crate for the flowvalve engine.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end streaming flows across multiple workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p flowvalve-integration-tests -- --ignored
//! ```
