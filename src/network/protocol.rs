//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. All
//! messages are JSON, tagged with a `type` field. The server never
//! trusts a client-supplied multiplier or timestamp; requests carry
//! identifiers and stakes only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::multiplier::Multiplier;
use crate::core::seed::{SeedCommitment, ServerSeed};
use crate::game::bet::{BetId, Currency};
use crate::game::ledger::{BetError, CashoutReceipt};
use crate::game::round::{ArchivedRound, RoundId, RoundPhase};
use crate::game::scheduler::RoundSnapshot;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with a JWT from the external auth provider.
    Auth {
        /// Bearer token; the subject claim becomes the owner id.
        token: String,
    },

    /// Place a bet on the round currently taking bets.
    PlaceBet {
        /// Stake in minor units of `currency`.
        amount: u64,
        /// Stake currency.
        currency: Currency,
    },

    /// Cash an open bet out at the server's current multiplier.
    CashOut {
        /// The bet to cash out. The multiplier is never client-supplied.
        bet_id: BetId,
    },

    /// Request the current round state (reconnection/late join).
    SyncRequest,

    /// Request the trailing round history.
    HistoryRequest,

    /// Ping for latency measurement.
    Ping {
        /// Echoed back verbatim in the pong.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Current round state, sent on connect and on `SyncRequest`.
    RoundInfo(RoundInfo),

    /// A new round opened for betting.
    RoundStarted {
        /// New round's id.
        round_id: RoundId,
        /// Commitment to the concealed server seed.
        hashed_server_seed: SeedCommitment,
        /// How long betting stays open.
        betting_duration_ms: u64,
        /// Server clock at emission.
        server_time: DateTime<Utc>,
    },

    /// Multiplier update while the round is flying.
    MultiplierTick {
        /// Flying round's id.
        round_id: RoundId,
        /// Current settlement multiplier.
        multiplier: Multiplier,
        /// Server clock at emission.
        server_time: DateTime<Utc>,
    },

    /// The round busted; the seed is revealed for verification.
    RoundCrashed {
        /// Crashed round's id.
        round_id: RoundId,
        /// Committed bust multiplier.
        crash_point: Multiplier,
        /// Revealed seed; hashes to the published commitment.
        server_seed: ServerSeed,
        /// Server clock at emission.
        server_time: DateTime<Utc>,
    },

    /// Bet accepted.
    BetPlaced {
        /// Assigned bet id, needed for cashout.
        bet_id: BetId,
        /// Accepted stake.
        amount: u64,
        /// Stake currency.
        currency: Currency,
    },

    /// Cashout succeeded.
    CashedOut {
        /// The cashed-out bet.
        bet_id: BetId,
        /// Server-computed settlement multiplier.
        multiplier: Multiplier,
        /// Total credited.
        payout: u64,
        /// Winnings above the stake.
        profit: u64,
        /// Stake currency.
        currency: Currency,
    },

    /// Trailing round history, oldest first.
    History {
        /// Archived rounds with revealed seeds.
        rounds: Vec<ArchivedRound>,
    },

    /// Pong response.
    Pong {
        /// Client timestamp echoed from the ping.
        timestamp: u64,
        /// Server clock at emission.
        server_time: DateTime<Utc>,
    },

    /// Request rejected.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Derived owner id (hex) if successful.
    pub owner_id: Option<String>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Current round state for late joiners.
///
/// `crash_point` and `server_seed` appear only once the round has
/// crashed; until then the commitment is all a client sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundInfo {
    /// Active round's id.
    pub round_id: RoundId,
    /// Phase at capture time.
    pub phase: RoundPhase,
    /// Server clock at capture time.
    pub server_time: DateTime<Utc>,
    /// Commitment to the concealed seed.
    pub hashed_server_seed: SeedCommitment,
    /// Length of the betting window.
    pub betting_duration_ms: u64,
    /// When betting opened.
    pub betting_opened_at: DateTime<Utc>,
    /// When the flight began, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flying_started_at: Option<DateTime<Utc>>,
    /// When the round crashed, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crashed_at: Option<DateTime<Utc>>,
    /// Multiplier at capture time.
    pub multiplier: Multiplier,
    /// Bust multiplier, revealed after the crash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_point: Option<Multiplier>,
    /// Server seed, revealed after the crash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_seed: Option<ServerSeed>,
}

impl From<RoundSnapshot> for RoundInfo {
    fn from(snapshot: RoundSnapshot) -> Self {
        Self {
            round_id: snapshot.round_id,
            phase: snapshot.phase,
            server_time: snapshot.server_time,
            hashed_server_seed: snapshot.commitment,
            betting_duration_ms: snapshot.betting_duration_ms,
            betting_opened_at: snapshot.betting_opened_at,
            flying_started_at: snapshot.flying_started_at,
            crashed_at: snapshot.crashed_at,
            multiplier: snapshot.multiplier,
            crash_point: snapshot.crash_point,
            server_seed: snapshot.server_seed,
        }
    }
}

impl ServerMessage {
    /// Ack for a successful cashout.
    pub fn cashed_out(receipt: CashoutReceipt) -> Self {
        ServerMessage::CashedOut {
            bet_id: receipt.bet_id,
            multiplier: receipt.multiplier,
            payout: receipt.payout,
            profit: receipt.profit,
            currency: receipt.currency,
        }
    }

    /// Error reply for a rejected bet or cashout.
    pub fn bet_error(err: BetError) -> Self {
        ServerMessage::Error(ServerError {
            code: err.into(),
            message: err.to_string(),
        })
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Request requires authentication.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Message was not valid JSON or not a known type.
    InvalidMessage,
    /// The betting window is closed.
    RoundNotAcceptingBets,
    /// Stake outside the configured limits.
    InvalidAmount,
    /// The wallet refused the debit.
    InsufficientFunds,
    /// The bet already has its one cashout.
    AlreadyCashedOut,
    /// The round busted before the request was processed.
    RoundAlreadyCrashed,
    /// No such bet in the active round.
    BetNotFound,
    /// The bet belongs to another player.
    Unauthorized,
    /// Cashout before the flight started.
    RoundNotFlying,
    /// Server connection limit reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<BetError> for ErrorCode {
    fn from(err: BetError) -> Self {
        match err {
            BetError::RoundNotAcceptingBets => ErrorCode::RoundNotAcceptingBets,
            BetError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            BetError::InsufficientFunds => ErrorCode::InsufficientFunds,
            BetError::AlreadyCashedOut => ErrorCode::AlreadyCashedOut,
            BetError::RoundAlreadyCrashed => ErrorCode::RoundAlreadyCrashed,
            BetError::BetNotFound => ErrorCode::BetNotFound,
            BetError::Unauthorized => ErrorCode::Unauthorized,
            BetError::RoundNotFlying => ErrorCode::RoundNotFlying,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
