//! Identity token issuance and verification (HS256 JWT).
//!
//! Tokens are self-contained: the server keeps no session record, so validity
//! is decided by the signature and the `[iat, exp)` window alone.

use chrono::{DateTime, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::TokenError;
use crate::config::AuthConfig;

/// Claims carried by every identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub id: i64,
    pub username: String,
    /// Issued-at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// A verified caller, produced only by [`TokenService::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
}

/// HMAC signing secret. Never printed.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Returns `None` for an empty or whitespace-only secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Option<Self> {
        let bytes = secret.as_ref();
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }
        Some(Self(bytes.to_vec()))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct TokenService {
    key: Option<SigningKey>,
}

/// Lifetime of every issued token, in seconds
pub const TOKEN_TTL_SECS: i64 = 3600;

impl TokenService {
    pub fn new(key: Option<SigningKey>) -> Self {
        Self { key }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let key = config.jwt_secret.as_deref().and_then(SigningKey::new);
        Self::new(key)
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn issue(&self, id: i64, username: &str) -> Result<String, TokenError> {
        self.issue_at(id, username, Utc::now())
    }

    pub fn issue_at(&self, id: i64, username: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let key = self.key.as_ref().ok_or(TokenError::MissingKey)?;

        let iat = now.timestamp();
        let claims = Claims {
            id,
            username: username.to_string(),
            iat,
            exp: iat + TOKEN_TTL_SECS,
        };

        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&key.0),
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Check signature, then require `iat <= now < exp`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError> {
        let key = self.key.as_ref().ok_or(TokenError::MissingKey)?;

        // The window is checked below against `now` with no leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&key.0), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        let now = now.timestamp();
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        if now < claims.iat {
            return Err(TokenError::Malformed("issued in the future".to_string()));
        }

        Ok(Identity {
            id: claims.id,
            username: claims.username,
        })
    }
}
