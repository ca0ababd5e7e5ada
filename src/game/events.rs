//! Round Events
//!
//! The three event kinds the round driver publishes: round started,
//! multiplier tick, round crashed. The network layer subscribes and fans
//! wire messages out to observers; nothing here depends on a transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::multiplier::Multiplier;
use crate::core::seed::{SeedCommitment, ServerSeed};
use super::round::RoundId;

/// Broadcast event from the round driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RoundEvent {
    /// A new round opened: betting is on, the commitment is public.
    Started {
        /// New round's id.
        round_id: RoundId,
        /// Published commitment to the concealed seed.
        commitment: SeedCommitment,
        /// How long betting stays open.
        betting_duration_ms: u64,
        /// Server clock at emission.
        server_time: DateTime<Utc>,
    },

    /// The multiplier advanced while flying.
    Tick {
        /// Flying round's id.
        round_id: RoundId,
        /// Current settlement multiplier.
        multiplier: Multiplier,
        /// Server clock at emission.
        server_time: DateTime<Utc>,
    },

    /// The round busted; the seed is revealed.
    Crashed {
        /// Crashed round's id.
        round_id: RoundId,
        /// Committed bust multiplier.
        crash_point: Multiplier,
        /// Revealed seed for fairness verification.
        server_seed: ServerSeed,
        /// Server clock at emission.
        server_time: DateTime<Utc>,
    },
}

impl RoundEvent {
    /// The round this event belongs to.
    pub fn round_id(&self) -> RoundId {
        match self {
            RoundEvent::Started { round_id, .. }
            | RoundEvent::Tick { round_id, .. }
            | RoundEvent::Crashed { round_id, .. } => *round_id,
        }
    }

    /// Server clock at emission.
    pub fn server_time(&self) -> DateTime<Utc> {
        match self {
            RoundEvent::Started { server_time, .. }
            | RoundEvent::Tick { server_time, .. }
            | RoundEvent::Crashed { server_time, .. } => *server_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::seed::ServerSeed;

    #[test]
    fn test_event_accessors() {
        let round_id = RoundId::generate();
        let now = Utc::now();
        let seed = ServerSeed::from_bytes([9; 32]);

        let started = RoundEvent::Started {
            round_id,
            commitment: seed.commitment(),
            betting_duration_ms: 10_000,
            server_time: now,
        };
        let crashed = RoundEvent::Crashed {
            round_id,
            crash_point: Multiplier::from_hundredths(250),
            server_seed: seed,
            server_time: now,
        };

        assert_eq!(started.round_id(), round_id);
        assert_eq!(crashed.round_id(), round_id);
        assert_eq!(started.server_time(), now);
    }
}
