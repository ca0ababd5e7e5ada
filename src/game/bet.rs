//! Bet Records
//!
//! A bet ties a stake to exactly one round and one owner. Its state moves
//! forward only: open, then either cashed out (at most once) or lost at
//! the crash. The ledger enforces the transitions; the types here make
//! illegal states unrepresentable on the way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::multiplier::Multiplier;
use super::round::RoundId;

// =============================================================================
// OWNER ID
// =============================================================================

/// Unique bet owner identifier, derived from the authenticated subject.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct OwnerId(pub [u8; 16]);

impl OwnerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hex encoding for logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// =============================================================================
// BET ID
// =============================================================================

/// Unique bet identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BetId(Uuid);

impl BetId {
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

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// CURRENCY
// =============================================================================

/// Stake currency. Amounts are integer minor units: nanotons for TON,
/// whole stars for Stars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Toncoin, in nanotons (1 TON = 1_000_000_000).
    Ton,
    /// Telegram Stars, whole units.
    Stars,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Ton => write!(f, "ton"),
            Currency::Stars => write!(f, "stars"),
        }
    }
}

/// Per-currency stake bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetLimits {
    /// Minimum TON stake in nanotons (0.1 TON).
    pub min_ton: u64,
    /// Maximum TON stake in nanotons (1000 TON).
    pub max_ton: u64,
    /// Minimum Stars stake.
    pub min_stars: u64,
    /// Maximum Stars stake.
    pub max_stars: u64,
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min_ton: 100_000_000,
            max_ton: 1_000_000_000_000,
            min_stars: 10,
            max_stars: 100_000,
        }
    }
}

impl BetLimits {
    /// Check a stake against the bounds for its currency.
    pub fn allows(&self, currency: Currency, amount: u64) -> bool {
        let (min, max) = match currency {
            Currency::Ton => (self.min_ton, self.max_ton),
            Currency::Stars => (self.min_stars, self.max_stars),
        };
        amount >= min && amount <= max
    }
}

// =============================================================================
// BET
// =============================================================================

/// Lifecycle state of a bet. Moves forward only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BetState {
    /// Placed, still riding the round.
    Open,
    /// Cashed out while flying; pays `stake * multiplier`.
    CashedOut {
        /// Server-computed multiplier at the processed cashout instant.
        multiplier: Multiplier,
    },
    /// Round crashed before a cashout.
    Lost,
}

/// One player's stake in exactly one round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    /// Unique bet id.
    pub id: BetId,

    /// Round this bet belongs to. Never reassigned.
    pub round_id: RoundId,

    /// Authenticated owner.
    pub owner: OwnerId,

    /// Stake in minor units of `currency`.
    pub amount: u64,

    /// Stake currency.
    pub currency: Currency,

    /// Server time the bet was recorded.
    pub placed_at: DateTime<Utc>,

    /// Current lifecycle state.
    pub state: BetState,
}

impl Bet {
    /// Record a fresh open bet.
    pub fn new(
        round_id: RoundId,
        owner: OwnerId,
        amount: u64,
        currency: Currency,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BetId::generate(),
            round_id,
            owner,
            amount,
            currency,
            placed_at,
            state: BetState::Open,
        }
    }

    /// Still riding the round?
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self.state, BetState::Open)
    }

    /// The locked-in multiplier, if this bet cashed out.
    pub fn cashout_multiplier(&self) -> Option<Multiplier> {
        match self.state {
            BetState::CashedOut { multiplier } => Some(multiplier),
            _ => None,
        }
    }

    /// Total paid out, if this bet cashed out.
    pub fn payout(&self) -> Option<u64> {
        self.cashout_multiplier().map(|m| m.payout(self.amount))
    }

    /// Winnings above the stake, if this bet cashed out.
    pub fn profit(&self) -> Option<u64> {
        self.cashout_multiplier().map(|m| m.profit(self.amount))
    }
}

// =============================================================================
// TESTS
// =============================================================================
