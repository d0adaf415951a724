//! Integration test crate for the Gossip client engine.
//!
//! This crate has no library code — it only contains integration tests
//! that drive complete engine pairs (stub ratchet + in-memory bulletin)
//! through end-to-end messaging flows.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p gossip-integration-tests
//! ```
