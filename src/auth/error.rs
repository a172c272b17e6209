//! Authentication error types.

use thiserror::Error;

/// Failures of the credential store.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid work factor: {0}")]
    InvalidParams(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Failures of token issuance and verification.
///
/// Callers treat every verification failure as "unauthenticated"; the
/// variants only exist so logs can tell them apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("signing key is not configured")]
    MissingKey,

    #[error("token signature does not match")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl TokenError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::MissingKey => "missing_key",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::Malformed(_) => "malformed",
            TokenError::Signing(_) => "signing",
        }
    }
}

/// Rejections produced at the request boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("missing or malformed bearer credential")]
    MissingCredential,

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl GuardError {
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::MissingCredential => "missing_credential",
            GuardError::Token(e) => e.kind(),
        }
    }
}
