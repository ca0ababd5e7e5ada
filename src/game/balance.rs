//! Balance Gateway
//!
//! The engine never stores player balances. Stakes leave and payouts
//! return through this seam to whatever wallet system hosts the
//! deployment. Calls happen inside the engine's critical section, so
//! implementations must not block on I/O.

use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

use super::bet::{Currency, OwnerId};

/// Wallet-side rejection of a debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// The owner's balance does not cover the stake.
    #[error("insufficient funds")]
    InsufficientFunds,
}

/// Narrow seam to the external wallet.
///
/// A bet placement debits the stake before the bet is recorded; a
/// successful cashout credits the full payout. Lost stakes need no call,
/// the debit already happened.
pub trait BalanceGateway: Send + Sync {
    /// Remove a stake from the owner's balance.
    fn debit(&self, owner: OwnerId, amount: u64, currency: Currency) -> Result<(), BalanceError>;

    /// Return a payout to the owner's balance.
    fn credit(&self, owner: OwnerId, amount: u64, currency: Currency);
}

// =============================================================================
// IN-MEMORY GATEWAY
// =============================================================================

/// In-memory balances for tests and the demo server.
///
/// Accounts it has never seen start at the configured grant, which is
/// what lets a demo client bet without a deposit flow.
#[derive(Debug, Default)]
pub struct InMemoryBalance {
    accounts: Mutex<BTreeMap<(OwnerId, Currency), u64>>,
    ton_grant: u64,
    stars_grant: u64,
}

impl InMemoryBalance {
    /// Empty gateway: every account starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway where unseen accounts start with the given balances.
    pub fn with_starting_balance(ton_grant: u64, stars_grant: u64) -> Self {
        Self {
            accounts: Mutex::new(BTreeMap::new()),
            ton_grant,
            stars_grant,
        }
    }

    fn grant_for(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Ton => self.ton_grant,
            Currency::Stars => self.stars_grant,
        }
    }

    /// Add funds to an account.
    pub fn deposit(&self, owner: OwnerId, amount: u64, currency: Currency) {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let grant = self.grant_for(currency);
        let balance = accounts.entry((owner, currency)).or_insert(grant);
        *balance = balance.saturating_add(amount);
    }

    /// Current balance of an account.
    pub fn balance(&self, owner: OwnerId, currency: Currency) -> u64 {
        let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(&(owner, currency))
            .copied()
            .unwrap_or_else(|| self.grant_for(currency))
    }
}

impl BalanceGateway for InMemoryBalance {
    fn debit(&self, owner: OwnerId, amount: u64, currency: Currency) -> Result<(), BalanceError> {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let grant = self.grant_for(currency);
        let balance = accounts.entry((owner, currency)).or_insert(grant);
        if *balance < amount {
            return Err(BalanceError::InsufficientFunds);
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&self, owner: OwnerId, amount: u64, currency: Currency) {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let grant = self.grant_for(currency);
        let balance = accounts.entry((owner, currency)).or_insert(grant);
        *balance = balance.saturating_add(amount);
    }
}

// =============================================================================
// TESTS
// =============================================================================
