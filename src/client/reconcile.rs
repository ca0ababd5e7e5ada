//! Round Tracker
//!
//! Reconstructs the server's phase clock on an observer's machine. The
//! trick is anchoring: every server message carries the server's own
//! clock, so on receipt the tracker computes
//!
//! ```text
//! anchor_local = local_receipt - (server_time - phase_started_at)
//! ```
//!
//! and from then on `local_now - anchor_local` tracks the server's
//! elapsed phase time exactly, independent of any constant offset
//! between the two wall clocks. Between ticks the tracker evaluates the
//! same growth curve the server uses, so the displayed multiplier moves
//! smoothly instead of stepping at the tick cadence.
//!
//! All of this is display-only. The multiplier a cashout settles at is
//! whatever the server computes when the request arrives; the tracker's
//! estimate never leaves the screen.

use chrono::{DateTime, Utc};

use crate::core::multiplier::{Multiplier, MultiplierCurve};
use crate::game::round::{RoundId, RoundPhase};
use crate::network::protocol::{RoundInfo, ServerMessage};

/// What the observer should display right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoundView {
    /// Betting window open; counts down to the flight.
    Betting {
        /// Milliseconds until betting closes (0 once the window is spent).
        remaining_ms: u64,
    },
    /// Round flying; the continuous curve value for smooth animation.
    Flying {
        /// Display multiplier. Advisory, never used for settlement.
        multiplier: f64,
    },
    /// Round over; show the bust.
    Crashed {
        /// Final crash point, as published by the server.
        crash_point: Multiplier,
    },
}

/// Tracked phase with its local anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TrackedPhase {
    Betting {
        /// Local clock value corresponding to the server's betting open.
        anchor_local_ms: i64,
        betting_duration_ms: u64,
    },
    Flying {
        /// Local clock value corresponding to the server's flight start.
        anchor_local_ms: i64,
    },
    Crashed {
        crash_point: Multiplier,
    },
}

/// Per-observer reconciliation state.
///
/// Pure: the caller supplies its local clock as milliseconds from any
/// fixed epoch (monotonic preferred). Feed every incoming server message
/// through [`RoundTracker::apply`], render from [`RoundTracker::view`].
#[derive(Debug, Clone)]
pub struct RoundTracker {
    curve: MultiplierCurve,
    round_id: Option<RoundId>,
    phase: Option<TrackedPhase>,
}

impl RoundTracker {
    /// Create a tracker using the same curve constants as the server.
    pub fn new(curve: MultiplierCurve) -> Self {
        Self {
            curve,
            round_id: None,
            phase: None,
        }
    }

    /// The round currently being tracked, once any message has arrived.
    pub fn round_id(&self) -> Option<RoundId> {
        self.round_id
    }

    /// Absorb a server message received at local time `local_ms`.
    ///
    /// Messages that carry no phase information (acks, errors, pongs)
    /// are ignored.
    pub fn apply(&mut self, msg: &ServerMessage, local_ms: i64) {
        match msg {
            ServerMessage::RoundInfo(info) => self.apply_info(info, local_ms),
            ServerMessage::RoundStarted {
                round_id,
                betting_duration_ms,
                ..
            } => {
                // The start announcement is emitted at betting open, so
                // its receipt time is the anchor.
                self.round_id = Some(*round_id);
                self.phase = Some(TrackedPhase::Betting {
                    anchor_local_ms: local_ms,
                    betting_duration_ms: *betting_duration_ms,
                });
            }
            ServerMessage::MultiplierTick {
                round_id,
                multiplier,
                ..
            } => {
                // Every tick re-anchors the flight clock from the
                // authoritative multiplier, pulling any accumulated
                // extrapolation drift back to zero.
                self.round_id = Some(*round_id);
                let elapsed = self.elapsed_for(multiplier.to_value());
                self.phase = Some(TrackedPhase::Flying {
                    anchor_local_ms: local_ms - elapsed,
                });
            }
            ServerMessage::RoundCrashed {
                round_id,
                crash_point,
                ..
            } => {
                self.round_id = Some(*round_id);
                self.phase = Some(TrackedPhase::Crashed {
                    crash_point: *crash_point,
                });
            }
            _ => {}
        }
    }

    /// Absorb a full snapshot (connect or explicit sync).
    fn apply_info(&mut self, info: &RoundInfo, local_ms: i64) {
        self.round_id = Some(info.round_id);
        self.phase = match info.phase {
            RoundPhase::Betting => Some(TrackedPhase::Betting {
                anchor_local_ms: anchor(local_ms, info.server_time, info.betting_opened_at),
                betting_duration_ms: info.betting_duration_ms,
            }),
            RoundPhase::Flying => info.flying_started_at.map(|started| TrackedPhase::Flying {
                anchor_local_ms: anchor(local_ms, info.server_time, started),
            }),
            RoundPhase::Crashed => info.crash_point.map(|crash_point| TrackedPhase::Crashed {
                crash_point,
            }),
        };
    }

    /// Phase and multiplier estimate at local time `local_ms`. `None`
    /// until the first phase-bearing message arrives.
    pub fn view(&self, local_ms: i64) -> Option<RoundView> {
        Some(match self.phase? {
            TrackedPhase::Betting {
                anchor_local_ms,
                betting_duration_ms,
            } => {
                let elapsed = (local_ms - anchor_local_ms).max(0) as u64;
                RoundView::Betting {
                    remaining_ms: betting_duration_ms.saturating_sub(elapsed),
                }
            }
            TrackedPhase::Flying { anchor_local_ms } => {
                let elapsed = (local_ms - anchor_local_ms).max(0) as u64;
                RoundView::Flying {
                    multiplier: self.curve.raw_at(elapsed),
                }
            }
            TrackedPhase::Crashed { crash_point } => RoundView::Crashed { crash_point },
        })
    }

    /// Invert the growth curve: flight milliseconds at which the raw
    /// curve reaches `multiplier`.
    fn elapsed_for(&self, multiplier: f64) -> i64 {
        if multiplier <= 1.0 {
            return 0;
        }
        let exponent = (multiplier - 1.0) / self.curve.growth_scale + 1.0;
        let seconds = exponent.ln() / self.curve.growth_base.ln();
        (seconds * 1000.0).round() as i64
    }
}

/// Local clock value corresponding to the server's `phase_started_at`.
fn anchor(local_ms: i64, server_time: DateTime<Utc>, phase_started_at: DateTime<Utc>) -> i64 {
    local_ms - (server_time - phase_started_at).num_milliseconds()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::seed::ServerSeed;
    use chrono::Duration;

    fn tracker() -> RoundTracker {
        RoundTracker::new(MultiplierCurve::default())
    }

    fn info(
        phase: RoundPhase,
        server_time: DateTime<Utc>,
        betting_opened_at: DateTime<Utc>,
        flying_started_at: Option<DateTime<Utc>>,
    ) -> RoundInfo {
        let seed = ServerSeed::from_bytes([1; 32]);
        RoundInfo {
            round_id: RoundId::generate(),
            phase,
            server_time,
            hashed_server_seed: seed.commitment(),
            betting_duration_ms: 10_000,
            betting_opened_at,
            flying_started_at,
            crashed_at: None,
            multiplier: Multiplier::ONE,
            crash_point: None,
            server_seed: None,
        }
    }

    #[test]
    fn test_empty_tracker_has_no_view() {
        assert_eq!(tracker().view(0), None);
        assert_eq!(tracker().round_id(), None);
    }

    #[test]
    fn test_betting_countdown_anchored_to_server_clock() {
        let mut t = tracker();
        let opened = Utc::now();

        // Snapshot captured 2s into a 10s window, received at local 50_000.
        // The local epoch is arbitrary; only differences matter.
        let snapshot = info(
            RoundPhase::Betting,
            opened + Duration::milliseconds(2_000),
            opened,
            None,
        );
        t.apply(&ServerMessage::RoundInfo(snapshot), 50_000);

        // At receipt: 8s remain
        assert_eq!(
            t.view(50_000),
            Some(RoundView::Betting { remaining_ms: 8_000 })
        );
        // 3s later: 5s remain
        assert_eq!(
            t.view(53_000),
            Some(RoundView::Betting { remaining_ms: 5_000 })
        );
        // Window spent: clamps at zero until the server says flying
        assert_eq!(
            t.view(60_000),
            Some(RoundView::Betting { remaining_ms: 0 })
        );
    }

    #[test]
    fn test_round_started_anchors_at_receipt() {
        let mut t = tracker();
        let seed = ServerSeed::from_bytes([2; 32]);
        let round_id = RoundId::generate();

        t.apply(
            &ServerMessage::RoundStarted {
                round_id,
                hashed_server_seed: seed.commitment(),
                betting_duration_ms: 5_000,
                server_time: Utc::now(),
            },
            1_000,
        );

        assert_eq!(t.round_id(), Some(round_id));
        assert_eq!(
            t.view(2_500),
            Some(RoundView::Betting { remaining_ms: 3_500 })
        );
    }

    #[test]
    fn test_mid_flight_join_reconstructs_multiplier() {
        let mut t = tracker();
        let started = Utc::now();

        // Snapshot captured 10s into the flight
        let snapshot = info(
            RoundPhase::Flying,
            started + Duration::milliseconds(10_000),
            started - Duration::milliseconds(10_000),
            Some(started),
        );
        t.apply(&ServerMessage::RoundInfo(snapshot), 7_000);

        // Immediately at receipt the curve reads 10s of flight: ~1.796
        match t.view(7_000).unwrap() {
            RoundView::Flying { multiplier } => {
                assert!((multiplier - 1.7969).abs() < 0.001);
            }
            other => panic!("expected flying, got {other:?}"),
        }

        // Display keeps advancing between ticks
        let a = match t.view(7_100).unwrap() {
            RoundView::Flying { multiplier } => multiplier,
            other => panic!("expected flying, got {other:?}"),
        };
        let b = match t.view(7_400).unwrap() {
            RoundView::Flying { multiplier } => multiplier,
            other => panic!("expected flying, got {other:?}"),
        };
        assert!(b > a);
    }

    #[test]
    fn test_tick_reanchors_flight_clock() {
        let mut t = tracker();
        let round_id = RoundId::generate();

        // First contact is a tick: 1.79 corresponds to ~10s of flight
        t.apply(
            &ServerMessage::MultiplierTick {
                round_id,
                multiplier: Multiplier::from_hundredths(179),
                server_time: Utc::now(),
            },
            20_000,
        );

        match t.view(20_000).unwrap() {
            RoundView::Flying { multiplier } => {
                // Quantization floors, so the estimate sits within a cent
                assert!((multiplier - 1.79).abs() < 0.01);
            }
            other => panic!("expected flying, got {other:?}"),
        }

        // 600ms later the extrapolation has moved past the tick value
        match t.view(20_600).unwrap() {
            RoundView::Flying { multiplier } => {
                assert!(multiplier > 1.79);
                assert!(multiplier < 2.0);
            }
            other => panic!("expected flying, got {other:?}"),
        }
    }

    #[test]
    fn test_anchor_cancels_clock_offset() {
        // Two observers with wildly different local epochs receive the
        // same snapshot; both reconstruct the same remaining time.
        let opened = Utc::now();
        let snapshot = info(
            RoundPhase::Betting,
            opened + Duration::milliseconds(4_000),
            opened,
            None,
        );

        let mut ahead = tracker();
        ahead.apply(&ServerMessage::RoundInfo(snapshot.clone()), 1_000_000);
        let mut behind = tracker();
        behind.apply(&ServerMessage::RoundInfo(snapshot), -500);

        assert_eq!(
            ahead.view(1_001_000),
            Some(RoundView::Betting { remaining_ms: 5_000 })
        );
        assert_eq!(
            behind.view(500),
            Some(RoundView::Betting { remaining_ms: 5_000 })
        );
    }

    #[test]
    fn test_crash_freezes_view() {
        let mut t = tracker();
        let seed = ServerSeed::from_bytes([3; 32]);
        let round_id = RoundId::generate();

        t.apply(
            &ServerMessage::RoundCrashed {
                round_id,
                crash_point: Multiplier::from_hundredths(350),
                server_seed: seed,
                server_time: Utc::now(),
            },
            9_000,
        );

        let expected = RoundView::Crashed {
            crash_point: Multiplier::from_hundredths(350),
        };
        assert_eq!(t.view(9_000), Some(expected));
        // No drift after the bust; the view is frozen
        assert_eq!(t.view(99_000), Some(expected));
    }

    #[test]
    fn test_acks_do_not_disturb_tracking() {
        let mut t = tracker();
        let seed = ServerSeed::from_bytes([4; 32]);

        t.apply(
            &ServerMessage::RoundStarted {
                round_id: RoundId::generate(),
                hashed_server_seed: seed.commitment(),
                betting_duration_ms: 10_000,
                server_time: Utc::now(),
            },
            0,
        );
        let before = t.view(1_000);

        t.apply(
            &ServerMessage::Pong {
                timestamp: 1,
                server_time: Utc::now(),
            },
            500,
        );
        assert_eq!(t.view(1_000), before);
    }

    #[test]
    fn test_elapsed_inversion_matches_curve() {
        let t = tracker();
        for ms in [0i64, 1_000, 5_000, 10_000, 30_000] {
            let value = t.curve.raw_at(ms as u64);
            let recovered = t.elapsed_for(value);
            assert!((recovered - ms).abs() <= 1, "ms={ms} recovered={recovered}");
        }
    }
}
