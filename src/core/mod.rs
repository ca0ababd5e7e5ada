//! Core deterministic primitives.
//!
//! Pure value types and derivations with no I/O and no clocks. Everything
//! here is reproducible from its inputs, which is what makes the game's
//! fairness claims checkable after the fact.

pub mod crash_point;
pub mod multiplier;
pub mod seed;

// Re-export core types
pub use crash_point::{crash_point, CrashParams};
pub use multiplier::{Multiplier, MultiplierCurve};
pub use seed::{SeedCommitment, SeedError, ServerSeed};
