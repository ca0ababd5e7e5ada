//! Fairness Verification
//!
//! Recompute a crashed round's outcome from its revealed seed and check
//! it against what the server published. Anyone holding the archived
//! record can run this; no server state is involved.

use thiserror::Error;

use crate::core::crash_point::{crash_point, CrashParams};
use crate::core::multiplier::Multiplier;
use crate::game::round::ArchivedRound;

/// A published round outcome that fails re-derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FairnessError {
    /// The revealed seed does not hash to the published commitment.
    #[error("revealed seed does not match the published commitment")]
    CommitmentMismatch,

    /// The published crash point is not the one the seed derives.
    #[error("crash point mismatch: expected {expected}, got {got}")]
    CrashPointMismatch {
        /// Crash point re-derived from the revealed seed.
        expected: Multiplier,
        /// Crash point the server published.
        got: Multiplier,
    },
}

/// Check a crashed round's published outcome against its revealed seed.
///
/// Passes exactly when the seed hashes to the commitment that was
/// published at round open, and re-deriving the crash point from the
/// seed and round id reproduces the published value.
pub fn verify_round(record: &ArchivedRound, params: &CrashParams) -> Result<(), FairnessError> {
    if !record.commitment.matches(&record.server_seed) {
        return Err(FairnessError::CommitmentMismatch);
    }

    let expected = crash_point(&record.server_seed, record.round_id.as_uuid(), params);
    if expected != record.crash_point {
        return Err(FairnessError::CrashPointMismatch {
            expected,
            got: record.crash_point,
        });
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
