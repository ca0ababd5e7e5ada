//! Round Lifecycle
//!
//! One round runs betting -> flying -> crashed, then is archived into a
//! bounded history and replaced. The seed, its commitment, and the crash
//! point are all fixed at creation; only the published commitment leaves
//! the server before the crash.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::core::crash_point::{crash_point, CrashParams};
use crate::core::multiplier::Multiplier;
use crate::core::seed::{SeedCommitment, SeedError, ServerSeed};

// =============================================================================
// ROUND ID
// =============================================================================

/// Unique round identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundId(Uuid);

impl RoundId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID.
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ROUND PHASE
// =============================================================================

/// Current phase of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Accepting bets until the betting deadline.
    Betting,
    /// Multiplier climbing; cashouts accepted.
    Flying,
    /// Bust. Seed revealed, bets settled.
    Crashed,
}

/// Illegal phase transition. These indicate a driver bug, never a player
/// request gone wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// `begin_flight` called outside the betting phase.
    #[error("cannot begin flight from {0:?}")]
    NotBetting(RoundPhase),
    /// `record_crash` called outside the flying phase.
    #[error("cannot record crash from {0:?}")]
    NotFlying(RoundPhase),
}

// =============================================================================
// ROUND
// =============================================================================

/// One play of the game.
///
/// `seed` and `crash_point` are decided at creation and must not reach
/// clients before the crash; the snapshot layer withholds them until
/// `phase == Crashed`.
#[derive(Clone, Debug)]
pub struct Round {
    /// Unique round id.
    pub id: RoundId,

    /// Secret seed, revealed at crash.
    pub seed: ServerSeed,

    /// Published commitment to the seed.
    pub commitment: SeedCommitment,

    /// Predetermined bust multiplier. Concealed until crash.
    pub crash_point: Multiplier,

    /// Current phase.
    pub phase: RoundPhase,

    /// When betting opened (round creation).
    pub betting_opened_at: DateTime<Utc>,

    /// How long betting stays open.
    pub betting_duration_ms: u64,

    /// Set exactly once, on the transition to flying.
    pub flying_started_at: Option<DateTime<Utc>>,

    /// Set exactly once, on the transition to crashed.
    pub crashed_at: Option<DateTime<Utc>>,
}

impl Round {
    /// Open a fresh round: draw a seed, commit to it, fix the crash point.
    ///
    /// The seed draw is the engine's only fatal-class failure; a round is
    /// never opened without strong entropy.
    pub fn open(
        betting_duration_ms: u64,
        params: &CrashParams,
        now: DateTime<Utc>,
    ) -> Result<Self, SeedError> {
        let id = RoundId::generate();
        let seed = ServerSeed::generate()?;
        let commitment = seed.commitment();
        let crash_point = crash_point(&seed, id.as_uuid(), params);

        Ok(Self {
            id,
            seed,
            commitment,
            crash_point,
            phase: RoundPhase::Betting,
            betting_opened_at: now,
            betting_duration_ms,
            flying_started_at: None,
            crashed_at: None,
        })
    }

    /// The instant the betting window closes.
    pub fn betting_deadline(&self) -> DateTime<Utc> {
        self.betting_opened_at + Duration::milliseconds(self.betting_duration_ms as i64)
    }

    /// True while new bets may land. Strict: a bet arriving exactly at
    /// the deadline is already too late.
    pub fn accepting_bets(&self, now: DateTime<Utc>) -> bool {
        self.phase == RoundPhase::Betting && now < self.betting_deadline()
    }

    /// Transition betting -> flying, recording `flying_started_at`.
    pub fn begin_flight(&mut self, now: DateTime<Utc>) -> Result<(), PhaseError> {
        if self.phase != RoundPhase::Betting {
            return Err(PhaseError::NotBetting(self.phase));
        }
        self.phase = RoundPhase::Flying;
        self.flying_started_at = Some(now);
        Ok(())
    }

    /// Transition flying -> crashed, recording `crashed_at`.
    pub fn record_crash(&mut self, now: DateTime<Utc>) -> Result<(), PhaseError> {
        if self.phase != RoundPhase::Flying {
            return Err(PhaseError::NotFlying(self.phase));
        }
        self.phase = RoundPhase::Crashed;
        self.crashed_at = Some(now);
        Ok(())
    }

    /// Milliseconds of flight elapsed at `now`. None before the flight.
    pub fn flight_elapsed_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        let started = self.flying_started_at?;
        Some((now - started).num_milliseconds().max(0) as u64)
    }

    /// Immutable projection of a crashed round. None until the crash.
    pub fn archive(&self) -> Option<ArchivedRound> {
        if self.phase != RoundPhase::Crashed {
            return None;
        }
        Some(ArchivedRound {
            round_id: self.id,
            crash_point: self.crash_point,
            server_seed: self.seed.clone(),
            commitment: self.commitment,
            betting_opened_at: self.betting_opened_at,
            flying_started_at: self.flying_started_at?,
            crashed_at: self.crashed_at?,
        })
    }
}

// =============================================================================
// ARCHIVED ROUND
// =============================================================================

/// The archived, immutable record of a crashed round. Everything an
/// observer needs to audit the outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRound {
    /// Round id.
    pub round_id: RoundId,

    /// Published bust multiplier.
    pub crash_point: Multiplier,

    /// Revealed seed.
    pub server_seed: ServerSeed,

    /// Commitment published at round open.
    pub commitment: SeedCommitment,

    /// When betting opened.
    pub betting_opened_at: DateTime<Utc>,

    /// When the flight began.
    pub flying_started_at: DateTime<Utc>,

    /// When the round crashed.
    pub crashed_at: DateTime<Utc>,
}

impl ArchivedRound {
    /// Serialize for hand-off to external history storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize a stored record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

// =============================================================================
// ROUND HISTORY
// =============================================================================

/// Bounded trailing window of archived rounds, oldest evicted first.
#[derive(Clone, Debug)]
pub struct RoundHistory {
    entries: VecDeque<ArchivedRound>,
    capacity: usize,
}

impl RoundHistory {
    /// Create an empty history holding at most `capacity` rounds.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a round, evicting the oldest when full.
    pub fn push(&mut self, entry: ArchivedRound) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries in arrival order, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &ArchivedRound> {
        self.entries.iter()
    }

    /// Most recently archived round.
    pub fn latest(&self) -> Option<&ArchivedRound> {
        self.entries.back()
    }

    /// Number of retained rounds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been archived yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
