//! Integration test crate for the Keel workspace.
//!
//! This crate has no library code. Its tests drive price feeds and the
//! incentives controller through multi-step time-travel scenarios that
//! span several workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p keel-integration-tests
//! ```
