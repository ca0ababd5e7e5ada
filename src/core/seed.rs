//! Server Seed Commitment Protocol
//!
//! Every round's crash point derives from a secret server seed. When a
//! round opens, only the seed's SHA-256 commitment is published; the seed
//! itself is revealed when the round crashes. Anyone can then recompute
//! the commitment and the crash point, so the operator cannot steer an
//! outcome after bets are in without breaking the published hash.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Domain separator for seed commitments.
const SEED_COMMITMENT_DOMAIN: &[u8] = b"CRASH_GAME_COMMIT_V1";

/// OS entropy source failure.
///
/// The one fatal-class error in the engine: a round must never be opened
/// with a predictable seed, so creation aborts instead of degrading.
#[derive(Debug, Error)]
#[error("failed to draw server seed entropy: {0}")]
pub struct SeedError(#[from] rand::Error);

// =============================================================================
// SERVER SEED (secret until reveal)
// =============================================================================

/// Secret per-round seed. Revealed only after the round crashes.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSeed([u8; 32]);

impl ServerSeed {
    /// Draw a fresh seed from OS entropy.
    pub fn generate() -> Result<Self, SeedError> {
        let mut bytes = [0u8; 32];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Construct from raw bytes (verification and tests).
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw seed bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding, as published in the reveal.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex encoding used on the wire.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes: [u8; 32] = hex::decode(s)?
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(bytes))
    }

    /// The commitment published when the round opens.
    pub fn commitment(&self) -> SeedCommitment {
        let mut hasher = Sha256::new();
        hasher.update(SEED_COMMITMENT_DOMAIN);
        hasher.update(self.0);
        SeedCommitment(hasher.finalize().into())
    }
}

// The seed is secret until the round crashes. Debug output feeds logs,
// so it must not carry the bytes.
impl fmt::Debug for ServerSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerSeed(<concealed>)")
    }
}

impl Serialize for ServerSeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ServerSeed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// SEED COMMITMENT (public from round open)
// =============================================================================

/// SHA-256 commitment to a server seed, published at round open.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SeedCommitment([u8; 32]);

impl SeedCommitment {
    /// Construct from raw hash bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding, as published at round open.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex encoding used on the wire.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes: [u8; 32] = hex::decode(s)?
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(bytes))
    }

    /// Check that a revealed seed produces this commitment.
    pub fn matches(&self, seed: &ServerSeed) -> bool {
        seed.commitment() == *self
    }
}

impl fmt::Debug for SeedCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeedCommitment({})", self.to_hex())
    }
}

impl fmt::Display for SeedCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for SeedCommitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SeedCommitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_fresh() {
        let a = ServerSeed::generate().unwrap();
        let b = ServerSeed::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_commitment_determinism() {
        let seed = ServerSeed::from_bytes([7; 32]);
        assert_eq!(seed.commitment(), seed.commitment());
        assert!(seed.commitment().matches(&seed));
    }

    #[test]
    fn test_tampered_seed_fails_commitment() {
        let seed = ServerSeed::from_bytes([7; 32]);
        let commitment = seed.commitment();

        let mut tampered = *seed.as_bytes();
        tampered[0] ^= 1;
        assert!(!commitment.matches(&ServerSeed::from_bytes(tampered)));
    }

    #[test]
    fn test_hex_roundtrip() {
        let seed = ServerSeed::from_bytes([0xAB; 32]);
        let hex = seed.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(ServerSeed::from_hex(&hex).unwrap(), seed);

        assert!(ServerSeed::from_hex("abcd").is_err());
        assert!(ServerSeed::from_hex("not hex").is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let seed = ServerSeed::from_bytes([1; 32]);
        let json = serde_json::to_string(&seed).unwrap();
        assert_eq!(json, format!("\"{}\"", seed.to_hex()));

        let back: ServerSeed = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seed);

        let commitment = seed.commitment();
        let json = serde_json::to_string(&commitment).unwrap();
        let back: SeedCommitment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, commitment);
    }

    #[test]
    fn test_debug_conceals_seed() {
        let seed = ServerSeed::from_bytes([0xAB; 32]);
        let debug = format!("{:?}", seed);
        assert!(!debug.contains("abab"));
        assert!(debug.contains("concealed"));
    }
}
