//! Round Scheduler
//!
//! The authoritative round driver. A single task owns every phase
//! transition: betting opens, the flight starts, the crash lands, the
//! cooldown expires, the next round opens. Player-facing calls (bets,
//! cashouts, snapshots) share one lock with those transitions, so a
//! request observes the state either before a transition or after it,
//! never halfway through.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info};

use crate::core::crash_point::CrashParams;
use crate::core::multiplier::{Multiplier, MultiplierCurve};
use crate::core::seed::{SeedCommitment, SeedError, ServerSeed};
use super::balance::BalanceGateway;
use super::bet::{Bet, BetId, BetLimits, Currency, OwnerId};
use super::events::RoundEvent;
use super::ledger::{BetError, CashoutReceipt, RoundLedger};
use super::round::{ArchivedRound, PhaseError, Round, RoundHistory, RoundId, RoundPhase};

// =============================================================================
// ENGINE CONFIG
// =============================================================================

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long the betting window stays open (ms).
    pub betting_duration_ms: u64,
    /// Multiplier broadcast cadence while flying (ms).
    pub tick_interval_ms: u64,
    /// Pause between a crash and the next round opening (ms).
    pub crash_cooldown_ms: u64,
    /// Archived rounds retained for display and audit.
    pub history_capacity: usize,
    /// Multiplier growth law.
    pub curve: MultiplierCurve,
    /// Crash point distribution parameters.
    pub crash: CrashParams,
    /// Per-currency stake bounds.
    pub limits: BetLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            betting_duration_ms: 10_000, // 10 seconds to place bets
            tick_interval_ms: 100,       // 10 multiplier updates per second
            crash_cooldown_ms: 3_000,    // Pause before the next round opens
            history_capacity: 10,
            curve: MultiplierCurve::default(),
            crash: CrashParams::default(),
            limits: BetLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, keeping defaults for
    /// anything unset or unparsable.
    ///
    /// Recognized: `BETTING_DURATION_MS`, `TICK_INTERVAL_MS`,
    /// `CRASH_COOLDOWN_MS`, `HISTORY_CAPACITY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            betting_duration_ms: env_u64("BETTING_DURATION_MS", defaults.betting_duration_ms),
            tick_interval_ms: env_u64("TICK_INTERVAL_MS", defaults.tick_interval_ms),
            crash_cooldown_ms: env_u64("CRASH_COOLDOWN_MS", defaults.crash_cooldown_ms),
            history_capacity: env_u64("HISTORY_CAPACITY", defaults.history_capacity as u64)
                as usize,
            ..defaults
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// =============================================================================
// ERRORS
// =============================================================================

/// Fatal faults in the round driver. Player mistakes never land here;
/// those are [`BetError`]s returned to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Seed entropy was unavailable. The engine never opens a round
    /// without a fresh unpredictable seed.
    #[error("seed generation failed: {0}")]
    Seed(#[from] SeedError),

    /// A phase transition ran out of order.
    #[error("round phase error: {0}")]
    Phase(#[from] PhaseError),
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Point-in-time view of the active round, for late joiners and
/// reconnecting clients.
///
/// `crash_point` and `server_seed` are `None` until the round has
/// crashed; before that only the commitment is visible.
#[derive(Debug, Clone)]
pub struct RoundSnapshot {
    /// Active round id.
    pub round_id: RoundId,
    /// Phase at capture time.
    pub phase: RoundPhase,
    /// Server clock at capture time.
    pub server_time: DateTime<Utc>,
    /// Published commitment to the concealed seed.
    pub commitment: SeedCommitment,
    /// Length of the betting window.
    pub betting_duration_ms: u64,
    /// When betting opened.
    pub betting_opened_at: DateTime<Utc>,
    /// When the flight began, once flying.
    pub flying_started_at: Option<DateTime<Utc>>,
    /// When the round crashed, once crashed.
    pub crashed_at: Option<DateTime<Utc>>,
    /// Multiplier at capture time: 1.00 while betting, the curve value
    /// while flying, the committed crash point after the bust.
    pub multiplier: Multiplier,
    /// Committed bust multiplier, revealed after the crash.
    pub crash_point: Option<Multiplier>,
    /// Server seed, revealed after the crash.
    pub server_seed: Option<ServerSeed>,
}

// =============================================================================
// ROUND SCHEDULER
// =============================================================================

/// State shared between the driver loop and player-facing calls.
struct SharedState {
    round: Round,
    ledger: RoundLedger,
    history: RoundHistory,
}

/// The crash-game engine.
///
/// Owns the active round, its bet ledger, and recent history behind a
/// single lock. [`RoundScheduler::run`] drives phases forward; the
/// public methods are safe to call from any number of connection tasks.
pub struct RoundScheduler {
    /// Engine configuration.
    config: EngineConfig,
    /// Active round, ledger, and history.
    shared: Arc<RwLock<SharedState>>,
    /// Wallet gateway for stake debits and payout credits.
    balance: Arc<dyn BalanceGateway>,
    /// Round event broadcast.
    event_tx: broadcast::Sender<RoundEvent>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RoundScheduler {
    /// Create the engine and open its first betting round.
    pub fn new(
        config: EngineConfig,
        balance: Arc<dyn BalanceGateway>,
    ) -> Result<Self, EngineError> {
        let round = Round::open(config.betting_duration_ms, &config.crash, Utc::now())?;
        info!("Round {} opened, commitment {}", round.id, round.commitment);

        let history = RoundHistory::new(config.history_capacity);
        let (event_tx, _) = broadcast::channel(256);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            shared: Arc::new(RwLock::new(SharedState {
                round,
                ledger: RoundLedger::new(),
                history,
            })),
            balance,
            event_tx,
            shutdown_tx,
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to the round event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.event_tx.subscribe()
    }

    /// Signal the driver loop to stop at its next await point.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Place a bet on the active round.
    pub async fn place_bet(
        &self,
        owner: OwnerId,
        amount: u64,
        currency: Currency,
    ) -> Result<Bet, BetError> {
        self.place_bet_at(owner, amount, currency, Utc::now()).await
    }

    async fn place_bet_at(
        &self,
        owner: OwnerId,
        amount: u64,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Result<Bet, BetError> {
        let mut guard = self.shared.write().await;
        let state = &mut *guard;
        let result = state.ledger.place(
            &state.round,
            owner,
            amount,
            currency,
            &self.config.limits,
            self.balance.as_ref(),
            now,
        );
        match &result {
            Ok(bet) => debug!(
                "Bet {} placed on round {} ({} {})",
                bet.id, state.round.id, amount, currency
            ),
            Err(e) => debug!("Bet rejected on round {}: {}", state.round.id, e),
        }
        result
    }

    /// Cash an open bet out at the server-computed multiplier.
    pub async fn cash_out(
        &self,
        owner: OwnerId,
        bet_id: BetId,
    ) -> Result<CashoutReceipt, BetError> {
        self.cash_out_at(owner, bet_id, Utc::now()).await
    }

    async fn cash_out_at(
        &self,
        owner: OwnerId,
        bet_id: BetId,
        now: DateTime<Utc>,
    ) -> Result<CashoutReceipt, BetError> {
        let mut guard = self.shared.write().await;
        let state = &mut *guard;
        let result = state.ledger.cash_out(
            &state.round,
            owner,
            bet_id,
            &self.config.curve,
            self.balance.as_ref(),
            now,
        );
        match &result {
            Ok(receipt) => info!(
                "Bet {} cashed out at {} on round {}",
                bet_id, receipt.multiplier, state.round.id
            ),
            Err(e) => debug!("Cashout of bet {} rejected: {}", bet_id, e),
        }
        result
    }

    /// Point-in-time view of the active round. The crash point and seed
    /// stay concealed until the round has crashed.
    pub async fn snapshot(&self) -> RoundSnapshot {
        let state = self.shared.read().await;
        let now = Utc::now();
        let round = &state.round;

        let multiplier = match round.phase {
            RoundPhase::Betting => Multiplier::ONE,
            RoundPhase::Flying => self
                .config
                .curve
                .at(round.flight_elapsed_ms(now).unwrap_or(0)),
            RoundPhase::Crashed => round.crash_point,
        };
        let (crash_point, server_seed) = if round.phase == RoundPhase::Crashed {
            (Some(round.crash_point), Some(round.seed.clone()))
        } else {
            (None, None)
        };

        RoundSnapshot {
            round_id: round.id,
            phase: round.phase,
            server_time: now,
            commitment: round.commitment,
            betting_duration_ms: round.betting_duration_ms,
            betting_opened_at: round.betting_opened_at,
            flying_started_at: round.flying_started_at,
            crashed_at: round.crashed_at,
            multiplier,
            crash_point,
            server_seed,
        }
    }

    /// Recently archived rounds, oldest first.
    pub async fn history(&self) -> Vec<ArchivedRound> {
        let state = self.shared.read().await;
        state.history.entries().cloned().collect()
    }

    /// Drive rounds until shutdown.
    ///
    /// Betting window, flight ticks, crash settlement, and cooldown all
    /// run here in order, one round at a time.
    pub async fn run(&self) -> Result<(), EngineError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!("Round driver started");

        'rounds: loop {
            // Phase 1: betting. Announce the round, wait out the window.
            let deadline = {
                let state = self.shared.read().await;
                self.emit(RoundEvent::Started {
                    round_id: state.round.id,
                    commitment: state.round.commitment,
                    betting_duration_ms: state.round.betting_duration_ms,
                    server_time: Utc::now(),
                });
                state.round.betting_deadline()
            };
            let wait = (deadline - Utc::now()).num_milliseconds().max(0) as u64;
            tokio::select! {
                _ = sleep(Duration::from_millis(wait)) => {}
                _ = shutdown_rx.recv() => break 'rounds,
            }

            // Phase 2: flight. Tick until the curve reaches the
            // committed crash point.
            {
                let mut state = self.shared.write().await;
                state.round.begin_flight(Utc::now())?;
                info!("Round {} flying", state.round.id);
            }

            let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.recv() => break 'rounds,
                }
                if self.step_flight(Utc::now()).await? {
                    break;
                }
            }

            // Phase 3: cooldown, then the next round.
            tokio::select! {
                _ = sleep(Duration::from_millis(self.config.crash_cooldown_ms)) => {}
                _ = shutdown_rx.recv() => break 'rounds,
            }
            self.open_next_round().await?;
        }

        info!("Round driver stopped");
        Ok(())
    }

    /// One flight step: broadcast a multiplier tick, or land the crash.
    /// Returns true once the round has crashed.
    async fn step_flight(&self, now: DateTime<Utc>) -> Result<bool, EngineError> {
        let mut guard = self.shared.write().await;
        let state = &mut *guard;

        if state.round.phase != RoundPhase::Flying {
            return Ok(true);
        }
        let elapsed = state.round.flight_elapsed_ms(now).unwrap_or(0);
        let multiplier = self.config.curve.at(elapsed);

        if multiplier >= state.round.crash_point {
            // The committed crash point settles the round, not the tick
            // value that happened to cross it.
            let crash_point = state.round.crash_point;
            state.round.record_crash(now)?;
            let settlement = state.ledger.settle_all();
            if let Some(entry) = state.round.archive() {
                state.history.push(entry);
            }
            info!(
                "Round {} crashed at {} ({} lost, {} cashed out)",
                state.round.id, crash_point, settlement.lost, settlement.cashed_out
            );
            let event = RoundEvent::Crashed {
                round_id: state.round.id,
                crash_point,
                server_seed: state.round.seed.clone(),
                server_time: now,
            };
            drop(guard);
            self.emit(event);
            return Ok(true);
        }

        let event = RoundEvent::Tick {
            round_id: state.round.id,
            multiplier,
            server_time: now,
        };
        drop(guard);
        self.emit(event);
        Ok(false)
    }

    /// Replace the settled round with a fresh one and clear the ledger.
    /// The crashed round was archived at the crash transition.
    async fn open_next_round(&self) -> Result<(), EngineError> {
        let round = Round::open(self.config.betting_duration_ms, &self.config.crash, Utc::now())?;
        info!("Round {} opened, commitment {}", round.id, round.commitment);

        let mut state = self.shared.write().await;
        state.round = round;
        state.ledger = RoundLedger::new();
        Ok(())
    }

    /// Broadcast an event. A send error only means nobody is subscribed.
    fn emit(&self, event: RoundEvent) {
        let _ = self.event_tx.send(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crash_point::crash_point;
    use crate::game::balance::InMemoryBalance;
    use crate::game::bet::BetState;

    const OWNER: OwnerId = OwnerId::new([7; 16]);

    fn engine_with_balance() -> (RoundScheduler, Arc<InMemoryBalance>) {
        let balance = Arc::new(InMemoryBalance::with_starting_balance(10_000_000_000, 10_000));
        let engine = RoundScheduler::new(EngineConfig::default(), balance.clone()).unwrap();
        (engine, balance)
    }

    fn test_engine(config: EngineConfig) -> RoundScheduler {
        let balance = Arc::new(InMemoryBalance::with_starting_balance(10_000_000_000, 10_000));
        RoundScheduler::new(config, balance).unwrap()
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.betting_duration_ms, 10_000);
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.crash_cooldown_ms, 3_000);
        assert_eq!(config.history_capacity, 10);
    }

    #[tokio::test]
    async fn test_place_bet_and_cash_out() {
        let (engine, balance) = engine_with_balance();

        let bet = engine
            .place_bet(OWNER, 1_000_000_000, Currency::Ton)
            .await
            .unwrap();
        assert_eq!(balance.balance(OWNER, Currency::Ton), 9_000_000_000);

        // Anchor the flight start in the past so 10.6s of flight have
        // elapsed, putting the curve at 1.87. Bust stays out of reach.
        let start = Utc::now() - chrono::Duration::milliseconds(10_600);
        {
            let mut state = engine.shared.write().await;
            state.round.crash_point = Multiplier::from_hundredths(100_000);
            state.round.begin_flight(start).unwrap();
        }

        let receipt = engine
            .cash_out_at(OWNER, bet.id, start + chrono::Duration::milliseconds(10_600))
            .await
            .unwrap();
        assert_eq!(receipt.multiplier, Multiplier::from_hundredths(187));
        assert_eq!(receipt.payout, 1_870_000_000);
        assert_eq!(receipt.profit, 870_000_000);
        assert_eq!(balance.balance(OWNER, Currency::Ton), 10_870_000_000);
    }

    #[tokio::test]
    async fn test_cash_out_requires_flight() {
        let (engine, _) = engine_with_balance();
        let bet = engine
            .place_bet(OWNER, 1_000_000_000, Currency::Ton)
            .await
            .unwrap();

        let err = engine.cash_out(OWNER, bet.id).await.unwrap_err();
        assert_eq!(err, BetError::RoundNotFlying);
    }

    #[tokio::test]
    async fn test_betting_window_enforced() {
        let config = EngineConfig {
            betting_duration_ms: 5_000,
            ..Default::default()
        };
        let engine = test_engine(config);
        let opened = engine.shared.read().await.round.betting_opened_at;

        let on_time = engine
            .place_bet_at(
                OWNER,
                1_000_000_000,
                Currency::Ton,
                opened + chrono::Duration::milliseconds(4_999),
            )
            .await;
        assert!(on_time.is_ok());

        let late = engine
            .place_bet_at(
                OWNER,
                1_000_000_000,
                Currency::Ton,
                opened + chrono::Duration::milliseconds(5_001),
            )
            .await;
        assert_eq!(late.unwrap_err(), BetError::RoundNotAcceptingBets);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cashouts_single_winner() {
        let (engine, _) = engine_with_balance();
        let engine = Arc::new(engine);

        let bet = engine
            .place_bet(OWNER, 1_000_000_000, Currency::Ton)
            .await
            .unwrap();
        {
            let mut state = engine.shared.write().await;
            state.round.crash_point = Multiplier::from_hundredths(100_000);
            state.round.begin_flight(Utc::now()).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let bet_id = bet.id;
            handles.push(tokio::spawn(
                async move { engine.cash_out(OWNER, bet_id).await },
            ));
        }

        let mut won = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(BetError::AlreadyCashedOut) => already += 1,
                Err(e) => panic!("unexpected rejection: {e}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(already, 7);
    }

    #[tokio::test]
    async fn test_step_flight_ticks_then_crashes() {
        let (engine, _) = engine_with_balance();
        let mut events = engine.subscribe();

        let bet = engine
            .place_bet(OWNER, 1_000_000_000, Currency::Ton)
            .await
            .unwrap();

        let start = Utc::now();
        {
            let mut state = engine.shared.write().await;
            state.round.crash_point = Multiplier::from_hundredths(150);
            state.round.begin_flight(start).unwrap();
        }

        // Early in the flight: a tick, no crash
        let crashed = engine
            .step_flight(start + chrono::Duration::milliseconds(1_000))
            .await
            .unwrap();
        assert!(!crashed);
        match events.try_recv().unwrap() {
            RoundEvent::Tick { multiplier, .. } => {
                assert_eq!(multiplier, Multiplier::from_hundredths(105));
            }
            other => panic!("expected tick, got {other:?}"),
        }

        // Past the bust threshold: crash lands, settles, archives
        let crashed = engine
            .step_flight(start + chrono::Duration::milliseconds(10_000))
            .await
            .unwrap();
        assert!(crashed);
        match events.try_recv().unwrap() {
            RoundEvent::Crashed {
                crash_point,
                server_seed,
                ..
            } => {
                // The committed point, not the curve value that crossed it
                assert_eq!(crash_point, Multiplier::from_hundredths(150));
                assert!(engine.snapshot().await.commitment.matches(&server_seed));
            }
            other => panic!("expected crash, got {other:?}"),
        }

        let state = engine.shared.read().await;
        assert_eq!(state.round.phase, RoundPhase::Crashed);
        assert_eq!(state.history.len(), 1);
        assert!(matches!(
            state.ledger.get(bet.id).unwrap().state,
            BetState::Lost
        ));
    }

    #[tokio::test]
    async fn test_snapshot_conceals_until_crash() {
        let (engine, _) = engine_with_balance();

        let snap = engine.snapshot().await;
        assert_eq!(snap.phase, RoundPhase::Betting);
        assert_eq!(snap.multiplier, Multiplier::ONE);
        assert!(snap.crash_point.is_none());
        assert!(snap.server_seed.is_none());

        let start = Utc::now();
        {
            let mut state = engine.shared.write().await;
            state.round.crash_point = Multiplier::from_hundredths(200);
            state.round.begin_flight(start).unwrap();
        }
        let snap = engine.snapshot().await;
        assert_eq!(snap.phase, RoundPhase::Flying);
        assert!(snap.flying_started_at.is_some());
        assert!(snap.crash_point.is_none());
        assert!(snap.server_seed.is_none());

        engine
            .step_flight(start + chrono::Duration::milliseconds(12_000))
            .await
            .unwrap();
        let snap = engine.snapshot().await;
        assert_eq!(snap.phase, RoundPhase::Crashed);
        assert_eq!(snap.crash_point, Some(Multiplier::from_hundredths(200)));
        assert_eq!(snap.multiplier, Multiplier::from_hundredths(200));
        assert!(snap.server_seed.is_some());
    }

    #[tokio::test]
    async fn test_next_round_gets_fresh_ledger_and_seed() {
        let (engine, _) = engine_with_balance();
        engine
            .place_bet(OWNER, 1_000_000_000, Currency::Ton)
            .await
            .unwrap();

        let (first_id, first_commitment) = {
            let state = engine.shared.read().await;
            (state.round.id, state.round.commitment)
        };

        let start = Utc::now();
        {
            let mut state = engine.shared.write().await;
            state.round.crash_point = Multiplier::from_hundredths(110);
            state.round.begin_flight(start).unwrap();
        }
        engine
            .step_flight(start + chrono::Duration::milliseconds(5_000))
            .await
            .unwrap();
        engine.open_next_round().await.unwrap();

        let state = engine.shared.read().await;
        assert_ne!(state.round.id, first_id);
        assert_ne!(state.round.commitment, first_commitment);
        assert_eq!(state.round.phase, RoundPhase::Betting);
        assert!(state.ledger.is_empty());
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history.latest().unwrap().round_id, first_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_drives_full_round_cycle() {
        let config = EngineConfig {
            betting_duration_ms: 50,
            tick_interval_ms: 10,
            crash_cooldown_ms: 20,
            // Steep curve so any crash point is reached within a second
            curve: MultiplierCurve {
                growth_base: 1_000_000.0,
                growth_scale: 1.0,
            },
            ..Default::default()
        };
        let engine = Arc::new(test_engine(config));
        let mut events = engine.subscribe();

        let driver = engine.clone();
        let handle = tokio::spawn(async move { driver.run().await });

        let mut started: Option<(RoundId, SeedCommitment)> = None;
        let mut crashed = false;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
                .await
                .expect("driver stalled")
                .unwrap();
            match event {
                RoundEvent::Started {
                    round_id,
                    commitment,
                    ..
                } => {
                    if crashed {
                        // Second round announced after the first crash
                        break;
                    }
                    started = Some((round_id, commitment));
                }
                RoundEvent::Tick { round_id, .. } => {
                    assert_eq!(round_id, started.unwrap().0);
                }
                RoundEvent::Crashed {
                    round_id,
                    crash_point: point,
                    server_seed,
                    ..
                } => {
                    let (id, commitment) = started.unwrap();
                    assert_eq!(round_id, id);
                    // The reveal must match the commitment and reproduce
                    // the published crash point
                    assert!(commitment.matches(&server_seed));
                    assert_eq!(
                        crash_point(&server_seed, id.as_uuid(), &engine.config.crash),
                        point
                    );
                    crashed = true;
                }
            }
        }

        assert_eq!(engine.history().await.len(), 1);

        engine.shutdown();
        handle.await.unwrap().unwrap();
    }
}
