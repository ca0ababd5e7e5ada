//! Provable Fairness
//!
//! The commit-reveal audit trail for round outcomes:
//! - At round open the server publishes a hash commitment to its seed.
//! - At the crash it reveals the seed.
//! - Anyone can recompute the crash point from the reveal and check both
//!   against what was published.
//!
//! The derivation itself lives in `core/`; this module is the observer's
//! side of the protocol.

pub mod verify;

// Re-export key types
pub use verify::{verify_round, FairnessError};
