//! Game Logic Module
//!
//! The authoritative round engine and everything it owns.
//!
//! ## Module Structure
//!
//! - `round`: Round lifecycle, archival, bounded history
//! - `bet`: Bets, owners, currencies, stake limits
//! - `ledger`: Bet table and cashout arbitration for the active round
//! - `balance`: Wallet gateway trait and in-memory implementation
//! - `events`: Round events broadcast to the network layer
//! - `scheduler`: The driver loop that moves rounds through their phases

pub mod balance;
pub mod bet;
pub mod events;
pub mod ledger;
pub mod round;
pub mod scheduler;

// Re-export key types
pub use balance::{BalanceError, BalanceGateway, InMemoryBalance};
pub use bet::{Bet, BetId, BetLimits, BetState, Currency, OwnerId};
pub use events::RoundEvent;
pub use ledger::{BetError, CashoutReceipt, RoundLedger, Settlement};
pub use round::{ArchivedRound, Round, RoundHistory, RoundId, RoundPhase};
pub use scheduler::{EngineConfig, EngineError, RoundScheduler, RoundSnapshot};
