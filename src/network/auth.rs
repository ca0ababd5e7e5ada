//! JWT Authentication
//!
//! Validates bearer tokens issued by an external auth provider; the
//! server never mints tokens itself. A validated subject claim is
//! hashed into the 16-byte owner id that bets are keyed on, so the
//! same account always maps to the same owner.

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::game::bet::OwnerId;

/// Domain separator for owner id derivation.
const OWNER_ID_DOMAIN: &[u8] = b"crash-game-owner:";

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format (preferred for external providers).
    pub public_key_pem: Option<String>,
    /// HS256 secret (fallback for simple setups).
    pub secret: Option<String>,
    /// Skip expiry validation. Test configurations only.
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Check if a verification key is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Standard JWT claims expected from auth providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the account id at the auth provider.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued-at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer (auth provider).
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Derive the deterministic owner id from the subject claim.
    ///
    /// SHA-256 over a domain prefix and the subject, truncated to 16
    /// bytes. The same subject always yields the same owner.
    pub fn owner_id(&self) -> OwnerId {
        let mut hasher = Sha256::new();
        hasher.update(OWNER_ID_DOMAIN);
        hasher.update(self.sub.as_bytes());
        let hash = hasher.finalize();

        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        OwnerId::new(id)
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No verification key configured on the server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match the expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match the expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Validate a JWT and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    // RS256 when a public key is present, HS256 otherwise
    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else {
        Algorithm::HS256
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }
    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;

    // An owner id needs a subject
    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // Manual expiry check in case validation was configured off
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "crash-test-secret-256-bits-long!";

    fn sign(claims: &TokenClaims, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, claims, &key).unwrap()
    }

    fn fresh_claims() -> TokenClaims {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        TokenClaims {
            sub: "player-42".into(),
            exp: now + 3600, // 1 hour from now
            iat: now,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("crash-game")),
        }
    }

    fn secret_config() -> AuthConfig {
        AuthConfig {
            secret: Some(SECRET.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_token_accepted() {
        let token = sign(&fresh_claims(), SECRET);
        let claims = validate_token(&token, &secret_config()).unwrap();
        assert_eq!(claims.sub, "player-42");
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = fresh_claims();
        claims.exp = 1; // Expired in 1970
        let token = sign(&claims, SECRET);

        let result = validate_token(&token, &secret_config());
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(&fresh_claims(), "the-real-signing-secret-here!!!!");

        let config = AuthConfig {
            secret: Some("a-different-secret-entirely!!!!!".into()),
            ..Default::default()
        };
        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_empty_subject_rejected() {
        let mut claims = fresh_claims();
        claims.sub = String::new();
        let token = sign(&claims, SECRET);

        let result = validate_token(&token, &secret_config());
        assert!(matches!(result, Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let token = sign(&fresh_claims(), SECRET);

        let config = AuthConfig {
            secret: Some(SECRET.into()),
            issuer: Some("some-other-issuer".into()),
            ..Default::default()
        };
        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn test_not_configured_error() {
        let result = validate_token("some.jwt.token", &AuthConfig::default());
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_skip_expiry_accepts_stale_token() {
        let mut claims = fresh_claims();
        claims.exp = 1;
        let token = sign(&claims, SECRET);

        let config = AuthConfig {
            secret: Some(SECRET.into()),
            skip_expiry: true,
            ..Default::default()
        };
        assert!(validate_token(&token, &config).is_ok());
    }

    #[test]
    fn test_owner_id_is_stable_per_subject() {
        let claims = TokenClaims {
            sub: "player-42".into(),
            exp: 0,
            iat: 0,
            iss: None,
            aud: None,
        };

        // Same subject, same owner
        assert_eq!(claims.owner_id(), claims.owner_id());

        // Different subject, different owner
        let other = TokenClaims {
            sub: "player-43".into(),
            ..claims.clone()
        };
        assert_ne!(claims.owner_id(), other.owner_id());
    }
}
