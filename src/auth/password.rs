//! Password hashing and verification using Argon2id.
//!
//! The work factor is configuration: `hash_cost` is the Argon2 time cost and
//! `hash_memory_kib` the memory cost. Stored hashes are PHC strings, so a hash
//! produced under an older work factor still verifies after the factor is raised.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use super::error::AuthError;
use crate::config::AuthConfig;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    params: Params,
}

impl CredentialStore {
    pub fn new(cost: u32, memory_kib: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| AuthError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::new(config.hash_cost, config.hash_memory_kib)
    }

    /// Cheapest parameters Argon2 accepts, for tests only.
    #[cfg(test)]
    pub(crate) fn insecure_fast() -> Self {
        Self::new(1, 8).unwrap()
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash.
    ///
    /// Mismatch and unparseable hashes both yield `false`. The digest comparison
    /// inside argon2 is constant-time.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, "Stored password hash is not a valid PHC string");
                return false;
            }
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// [`hash`](Self::hash) on the blocking pool so request tasks keep running.
    pub async fn hash_blocking(&self, password: String) -> Result<String, AuthError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.hash(&password))
            .await
            .map_err(|e| AuthError::Hashing(format!("hashing task failed: {e}")))?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    pub async fn verify_blocking(&self, password: String, hash: String) -> bool {
        let store = self.clone();
        match tokio::task::spawn_blocking(move || store.verify(&password, &hash)).await {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!(error = %e, "Password verification task failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_matches() {
        let store = CredentialStore::insecure_fast();
        let hash = store.hash("pw1").unwrap();
        assert!(store.verify("pw1", &hash));
    }

    #[test]
    fn wrong_password_does_not_match() {
        let store = CredentialStore::insecure_fast();
        let hash = store.hash("pw1").unwrap();
        assert!(!store.verify("pw2", &hash));
        assert!(!store.verify("", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let store = CredentialStore::insecure_fast();
        let a = store.hash("same").unwrap();
        let b = store.hash("same").unwrap();
        assert_ne!(a, b);
        assert!(store.verify("same", &a));
        assert!(store.verify("same", &b));
    }

    #[test]
    fn hash_never_contains_plaintext() {
        let store = CredentialStore::insecure_fast();
        let hash = store.hash("newpw").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("newpw"));
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        let store = CredentialStore::insecure_fast();
        assert!(!store.verify("pw", "not-a-hash"));
    }

    #[test]
    fn hash_from_other_work_factor_still_verifies() {
        let old = CredentialStore::new(2, 16).unwrap();
        let hash = old.hash("pw").unwrap();
        assert!(CredentialStore::insecure_fast().verify("pw", &hash));
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(matches!(
            CredentialStore::new(0, 8),
            Err(AuthError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn blocking_variants_agree() {
        let store = CredentialStore::insecure_fast();
        let hash = store.hash_blocking("pw".to_string()).await.unwrap();
        assert!(store.verify_blocking("pw".to_string(), hash.clone()).await);
        assert!(!store.verify_blocking("nope".to_string(), hash).await);
    }
}
