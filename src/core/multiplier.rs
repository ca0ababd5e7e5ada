//! Multiplier Arithmetic
//!
//! The payout multiplier is the game's central quantity. It exists in two
//! representations:
//!
//! - **Raw**: `f64`, the continuous value of the growth curve. Used for
//!   display interpolation only.
//! - **Quantized**: integer hundredths (`1.87x` = 187). Every settlement
//!   (cashout, crash point comparison, payout) happens on the quantized
//!   value, and payout math is integer-only, so two machines computing the
//!   same settlement can never disagree by a minor unit.
//!
//! Quantization floors: a bet never settles above the true curve value.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// =============================================================================
// MULTIPLIER (quantized hundredths)
// =============================================================================

/// A payout multiplier in integer hundredths.
///
/// `Multiplier(187)` is `1.87x`. Serializes as a JSON number (`1.87`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u64);

impl Multiplier {
    /// 1.00x, the curve's starting value.
    pub const ONE: Self = Self(100);

    /// Create from raw hundredths (187 = 1.87x).
    #[inline]
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    /// Raw hundredths value.
    #[inline]
    pub const fn hundredths(self) -> u64 {
        self.0
    }

    /// Quantize a continuous curve value, flooring to hundredths.
    ///
    /// Non-finite and sub-1.0 inputs clamp to 1.00x; the curve never
    /// produces them, but the floor keeps settlement total.
    #[inline]
    pub fn from_value(value: f64) -> Self {
        if !value.is_finite() || value < 1.0 {
            return Self::ONE;
        }
        Self((value * 100.0).floor() as u64)
    }

    /// Continuous representation, for display and logs.
    #[inline]
    pub fn to_value(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Total returned for a stake cashed out at this multiplier.
    ///
    /// Integer floor: `187 * stake / 100`. Widens through u128 so the
    /// intermediate product cannot overflow.
    #[inline]
    pub fn payout(self, stake: u64) -> u64 {
        ((stake as u128 * self.0 as u128) / 100) as u64
    }

    /// Winnings above the stake: `payout - stake`.
    #[inline]
    pub fn profit(self, stake: u64) -> u64 {
        self.payout(stake).saturating_sub(stake)
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_value())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        if !value.is_finite() || value < 0.0 {
            return Err(serde::de::Error::custom(
                "multiplier must be a non-negative number",
            ));
        }
        // Wire values originate from a quantized multiplier, so the nearest
        // hundredth recovers it exactly (1.87 parses as 1.8699999...).
        Ok(Self((value * 100.0).round() as u64))
    }
}

// =============================================================================
// GROWTH CURVE
// =============================================================================

/// The multiplier growth law: `1 + (base^seconds - 1) * scale`.
///
/// Strictly increasing for `base > 1` and `scale > 0`, starts at exactly
/// 1.0 and is unbounded. Faster and steeper than linear, which is what
/// makes late cashouts tempting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplierCurve {
    /// Exponential base applied per elapsed second.
    pub growth_base: f64,
    /// Scale on the exponential's excess over 1.
    pub growth_scale: f64,
}

impl Default for MultiplierCurve {
    fn default() -> Self {
        Self {
            growth_base: 1.1,
            growth_scale: 0.5,
        }
    }
}

impl MultiplierCurve {
    /// Continuous curve value at `elapsed_ms` since flight start.
    ///
    /// Display only. Settlement always goes through [`Self::at`].
    #[inline]
    pub fn raw_at(&self, elapsed_ms: u64) -> f64 {
        let seconds = elapsed_ms as f64 / 1000.0;
        1.0 + (self.growth_base.powf(seconds) - 1.0) * self.growth_scale
    }

    /// Quantized (settlement) multiplier at `elapsed_ms` since flight start.
    #[inline]
    pub fn at(&self, elapsed_ms: u64) -> Multiplier {
        Multiplier::from_value(self.raw_at(elapsed_ms))
    }
}

// =============================================================================
// TESTS
// =============================================================================
