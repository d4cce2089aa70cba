//! The monitor binary's library surface.
//!
//! Split out from `main.rs` so the correlator and ingestion plumbing are
//! reachable from integration tests.

pub mod bus;
pub mod cli;
pub mod correlator;
pub mod key_lock;
