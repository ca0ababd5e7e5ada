//! # Crash Game Server
//!
//! Authoritative round engine and WebSocket sync layer for a provably-fair
//! crash betting game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CRASH GAME SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  ├── multiplier.rs- Quantized multiplier + growth curve      │
//! │  ├── crash_point.rs- House-edge crash point derivation       │
//! │  └── seed.rs      - Server seed + SHA-256 commitment         │
//! │                                                              │
//! │  game/            - Authoritative round lifecycle            │
//! │  ├── round.rs     - Phase machine, archival, history         │
//! │  ├── bet.rs       - Bets, owners, currencies, limits         │
//! │  ├── ledger.rs    - Bet table and cashout arbitration        │
//! │  ├── balance.rs   - External wallet gateway seam             │
//! │  ├── events.rs    - Round event broadcast types              │
//! │  └── scheduler.rs - The round driver loop                    │
//! │                                                              │
//! │  fairness/        - Commit-reveal audit for archived rounds  │
//! │                                                              │
//! │  network/         - Transport (non-deterministic)            │
//! │  ├── protocol.rs  - JSON wire messages                       │
//! │  ├── auth.rs      - JWT validation for bettors               │
//! │  └── server.rs    - WebSocket accept loop + event fan-out    │
//! │                                                              │
//! │  client/          - Observer-side reconciliation (display)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority Boundary
//!
//! Everything that decides money lives server-side in `core/` and
//! `game/`: the crash point is fixed (and committed to) before betting
//! opens, and every cashout settles at the multiplier the server
//! computes when the request is processed. The `client/` module
//! reconstructs phase and multiplier for display, and nothing it
//! produces ever crosses back into settlement - a cashout request
//! carries only a bet id.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod core;
pub mod fairness;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::crash_point::{crash_point, CrashParams};
pub use crate::core::multiplier::{Multiplier, MultiplierCurve};
pub use crate::core::seed::{SeedCommitment, ServerSeed};
pub use game::bet::{Bet, BetId, Currency, OwnerId};
pub use game::ledger::{BetError, CashoutReceipt};
pub use game::round::{ArchivedRound, Round, RoundId, RoundPhase};
pub use game::scheduler::{EngineConfig, EngineError, RoundScheduler};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
