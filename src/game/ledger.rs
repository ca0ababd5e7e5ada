//! Round Ledger
//!
//! Bet table and cashout arbitration for the active round. One ledger
//! lives exactly as long as its round; at archival the bets become
//! read-only history.
//!
//! Every mutation here runs under the engine's single write lock. Within
//! that critical section cashout is a check-then-set on the bet's state,
//! which is what makes "at most one successful cashout per bet" hold no
//! matter how many requests race.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::multiplier::{Multiplier, MultiplierCurve};
use super::balance::{BalanceError, BalanceGateway};
use super::bet::{Bet, BetId, BetLimits, BetState, Currency, OwnerId};
use super::round::{Round, RoundPhase};

// =============================================================================
// ERRORS
// =============================================================================

/// Typed rejection of a bet or cashout request.
///
/// All of these are normal player-facing outcomes. None affect the round
/// or other players, and none are ever silently swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BetError {
    /// The betting window is closed (or the round left the betting phase).
    #[error("round is not accepting bets")]
    RoundNotAcceptingBets,

    /// Stake outside the configured per-currency bounds.
    #[error("amount {amount} is outside the {currency} stake limits")]
    InvalidAmount {
        /// Stake currency.
        currency: Currency,
        /// Offending amount in minor units.
        amount: u64,
    },

    /// The wallet refused the debit.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// The bet already has its one cashout.
    #[error("bet was already cashed out")]
    AlreadyCashedOut,

    /// The round busted before this request was processed.
    #[error("round already crashed")]
    RoundAlreadyCrashed,

    /// No bet with that id in the active round.
    #[error("bet not found")]
    BetNotFound,

    /// The bet belongs to a different owner.
    #[error("bet belongs to another player")]
    Unauthorized,

    /// Cashout while the round is still in its betting phase.
    #[error("round has not started flying")]
    RoundNotFlying,
}

impl From<BalanceError> for BetError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientFunds => BetError::InsufficientFunds,
        }
    }
}

// =============================================================================
// RECEIPTS
// =============================================================================

/// Successful cashout summary, returned to the caller and echoed on the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashoutReceipt {
    /// The cashed-out bet.
    pub bet_id: BetId,
    /// Server-computed multiplier at the processing instant.
    pub multiplier: Multiplier,
    /// Total credited: `stake * multiplier`, floored.
    pub payout: u64,
    /// Winnings above the stake.
    pub profit: u64,
    /// Stake currency.
    pub currency: Currency,
}

/// Counts from settling a crashed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settlement {
    /// Bets marked lost by this call.
    pub lost: usize,
    /// Bets that had cashed out before the crash.
    pub cashed_out: usize,
}

// =============================================================================
// ROUND LEDGER
// =============================================================================

/// All bets of the currently active round.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct RoundLedger {
    bets: BTreeMap<BetId, Bet>,
}

impl RoundLedger {
    /// Fresh, empty ledger for a new round.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bet for `owner`.
    ///
    /// Checks the betting window and stake limits, then debits the stake
    /// through the gateway, then records. The debit sits last so a
    /// rejected request never touches the wallet.
    pub fn place(
        &mut self,
        round: &Round,
        owner: OwnerId,
        amount: u64,
        currency: Currency,
        limits: &BetLimits,
        balance: &dyn BalanceGateway,
        now: DateTime<Utc>,
    ) -> Result<Bet, BetError> {
        if !round.accepting_bets(now) {
            return Err(BetError::RoundNotAcceptingBets);
        }
        if !limits.allows(currency, amount) {
            return Err(BetError::InvalidAmount { currency, amount });
        }
        balance.debit(owner, amount, currency)?;

        let bet = Bet::new(round.id, owner, amount, currency, now);
        self.bets.insert(bet.id, bet.clone());
        Ok(bet)
    }

    /// Cash a bet out at the server-computed multiplier.
    ///
    /// The settled multiplier is `curve.at(now - flying_started_at)` at
    /// the instant this call runs, never a caller-supplied value. If the
    /// curve has already reached the committed crash point the round is
    /// over even when the driver's tick has not recorded it yet, and the
    /// request fails `RoundAlreadyCrashed`.
    pub fn cash_out(
        &mut self,
        round: &Round,
        owner: OwnerId,
        bet_id: BetId,
        curve: &MultiplierCurve,
        balance: &dyn BalanceGateway,
        now: DateTime<Utc>,
    ) -> Result<CashoutReceipt, BetError> {
        let bet = self.bets.get_mut(&bet_id).ok_or(BetError::BetNotFound)?;
        if bet.owner != owner {
            return Err(BetError::Unauthorized);
        }
        match bet.state {
            BetState::CashedOut { .. } => return Err(BetError::AlreadyCashedOut),
            BetState::Lost => return Err(BetError::RoundAlreadyCrashed),
            BetState::Open => {}
        }
        match round.phase {
            RoundPhase::Betting => return Err(BetError::RoundNotFlying),
            RoundPhase::Crashed => return Err(BetError::RoundAlreadyCrashed),
            RoundPhase::Flying => {}
        }

        let elapsed = round.flight_elapsed_ms(now).ok_or(BetError::RoundNotFlying)?;
        let multiplier = curve.at(elapsed);
        if multiplier >= round.crash_point {
            return Err(BetError::RoundAlreadyCrashed);
        }

        bet.state = BetState::CashedOut { multiplier };
        let payout = multiplier.payout(bet.amount);
        let receipt = CashoutReceipt {
            bet_id,
            multiplier,
            payout,
            profit: multiplier.profit(bet.amount),
            currency: bet.currency,
        };
        balance.credit(owner, payout, bet.currency);
        Ok(receipt)
    }

    /// Mark every still-open bet as lost. Called once at the crash
    /// transition; calling it again is a no-op.
    pub fn settle_all(&mut self) -> Settlement {
        let mut settlement = Settlement::default();
        for bet in self.bets.values_mut() {
            match bet.state {
                BetState::Open => {
                    bet.state = BetState::Lost;
                    settlement.lost += 1;
                }
                BetState::CashedOut { .. } => settlement.cashed_out += 1,
                BetState::Lost => {}
            }
        }
        settlement
    }

    /// Look up a bet.
    pub fn get(&self, bet_id: BetId) -> Option<&Bet> {
        self.bets.get(&bet_id)
    }

    /// All bets in id order.
    pub fn bets(&self) -> impl Iterator<Item = &Bet> {
        self.bets.values()
    }

    /// Number of recorded bets.
    pub fn len(&self) -> usize {
        self.bets.len()
    }

    /// True when no bets landed this round.
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
