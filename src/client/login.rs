//! Device-side login surface with brute-force lockout.
//!
//! Attempts are refused locally, without any network call, while the
//! persisted lockout deadline is in the future. A background ticker clears
//! an expired lockout once per second and is stopped when the surface is
//! dropped. Only one login may be in flight at a time.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

use super::storage::{ClientState, StateFile, StorageError};
use super::{ClientError, LoginTransport};
use crate::auth::{LockoutPolicy, LockoutStatus};

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("too many failed attempts, try again after {until}")]
    LockedOut { until: DateTime<Utc> },

    /// Unknown username and wrong password are deliberately indistinguishable
    #[error("invalid credentials ({remaining_attempts} attempts left)")]
    InvalidCredentials { remaining_attempts: u32 },

    #[error("a login attempt is already in progress")]
    InFlight,

    #[error("the server is refusing logins for this account, try again later")]
    ServerThrottled,

    #[error(transparent)]
    Client(ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

struct Shared {
    policy: LockoutPolicy,
    state: Mutex<ClientState>,
    store: StateFile,
}

impl Shared {
    fn persist(&self, state: &ClientState) -> Result<(), StorageError> {
        self.store.save(state)
    }

    /// Timer-driven transition out of Locked
    fn tick(&self, now: DateTime<Utc>) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        if !self.policy.tick(&mut state.lockout, now) {
            return Ok(false);
        }
        self.persist(&state)?;
        Ok(true)
    }
}

/// Resets the in-flight flag when the attempt finishes, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct LoginSurface {
    transport: Arc<dyn LoginTransport>,
    shared: Arc<Shared>,
    in_flight: AtomicBool,
    ticker: JoinHandle<()>,
}

impl LoginSurface {
    /// Load persisted state and start the lockout ticker. Must be called
    /// from within a Tokio runtime.
    pub fn open(
        transport: Arc<dyn LoginTransport>,
        policy: LockoutPolicy,
        store: StateFile,
    ) -> Result<Self, StorageError> {
        let state = store.load()?;
        let shared = Arc::new(Shared {
            policy,
            state: Mutex::new(state),
            store,
        });

        let ticker_shared = shared.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                match ticker_shared.tick(Utc::now()) {
                    Ok(true) => tracing::debug!("Login lockout expired"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, "Failed to persist lockout reset"),
                }
            }
        });

        Ok(Self {
            transport,
            shared,
            in_flight: AtomicBool::new(false),
            ticker,
        })
    }

    pub fn status(&self) -> LockoutStatus {
        let state = self.shared.state.lock();
        self.shared.policy.status(&state.lockout)
    }

    pub fn state(&self) -> ClientState {
        self.shared.state.lock().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.shared.state.lock().token.clone()
    }

    /// Last username that logged in, for pre-filling the prompt
    pub fn cached_username(&self) -> Option<String> {
        self.shared.state.lock().username.clone()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String, LoginError> {
        self.login_at(username, password, Utc::now()).await
    }

    /// Attempt a login, evaluating the lockout at `now`. A failure is
    /// recorded at `now` plus the time the server took to answer.
    pub async fn login_at(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<String, LoginError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(LoginError::InFlight)?;

        {
            let mut state = self.shared.state.lock();
            let before = state.lockout.clone();
            let checked = self.shared.policy.check(&mut state.lockout, now);
            if state.lockout != before {
                self.shared.persist(&state)?;
            }
            if let Err(until) = checked {
                tracing::info!(until = %until, "Login refused locally while locked out");
                return Err(LoginError::LockedOut { until });
            }
        }

        let started = Instant::now();
        let result = self.transport.login(username, password).await;
        let settled_at =
            now + ChronoDuration::from_std(started.elapsed()).unwrap_or_else(|_| ChronoDuration::zero());

        let mut state = self.shared.state.lock();
        match result {
            Ok(token) => {
                self.shared.policy.record_success(&mut state.lockout);
                state.token = Some(token.clone());
                state.username = Some(username.to_string());
                self.shared.persist(&state)?;
                tracing::info!(username = %username, "Logged in");
                Ok(token)
            }
            Err(err) => match err.status() {
                Some(StatusCode::NOT_FOUND) | Some(StatusCode::BAD_REQUEST) => {
                    let status = self.shared.policy.record_failure(&mut state.lockout, settled_at);
                    self.shared.persist(&state)?;
                    match status {
                        LockoutStatus::Open { remaining_attempts } => {
                            Err(LoginError::InvalidCredentials { remaining_attempts })
                        }
                        LockoutStatus::Locked { until } => {
                            tracing::warn!(until = %until, "Login locked after repeated failures");
                            Err(LoginError::LockedOut { until })
                        }
                    }
                }
                Some(StatusCode::TOO_MANY_REQUESTS) => Err(LoginError::ServerThrottled),
                _ => Err(LoginError::Client(err)),
            },
        }
    }

    /// Discard the session token. Returns false if there was none; the
    /// cached username and lockout counters are kept.
    pub fn logout(&self) -> Result<bool, StorageError> {
        let mut state = self.shared.state.lock();
        if state.token.take().is_none() {
            return Ok(false);
        }
        self.shared.persist(&state)?;
        tracing::info!("Logged out");
        Ok(true)
    }

    /// Run the timer transition at `now`; returns true if a lockout was cleared.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<bool, StorageError> {
        self.shared.tick(now)
    }
}

impl Drop for LoginSurface {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    struct FakeTransport {
        calls: AtomicUsize,
        password: &'static str,
        gate: Option<Arc<Notify>>,
        latency: Option<Duration>,
        status_on_failure: StatusCode,
    }

    impl FakeTransport {
        fn new(password: &'static str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                password,
                gate: None,
                latency: None,
                status_on_failure: StatusCode::BAD_REQUEST,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LoginTransport for FakeTransport {
        async fn login(&self, _username: &str, password: &str) -> Result<String, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if password == self.password {
                Ok("signed.token.value".to_string())
            } else {
                Err(ClientError::Api {
                    status: self.status_on_failure,
                    code: "invalid_credentials".to_string(),
                    message: "Invalid password".to_string(),
                })
            }
        }
    }

    fn surface(dir: &TempDir, transport: Arc<FakeTransport>) -> LoginSurface {
        LoginSurface::open(
            transport,
            LockoutPolicy::default(),
            StateFile::new(dir.path().join("client.json")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn successful_login_persists_token_and_username() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new("pw1"));
        let surface = surface(&dir, transport.clone());

        let token = surface.login("alice", "pw1").await.unwrap();
        assert_eq!(token, "signed.token.value");
        drop(surface);

        let reopened = self::surface(&dir, transport);
        assert_eq!(reopened.token().as_deref(), Some("signed.token.value"));
        assert_eq!(reopened.cached_username().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn sixth_attempt_makes_no_network_call() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new("pw1"));
        let surface = surface(&dir, transport.clone());
        let t0 = Utc::now();

        for expected_remaining in (1..=4).rev() {
            match surface.login_at("alice", "wrong", t0).await {
                Err(LoginError::InvalidCredentials { remaining_attempts }) => {
                    assert_eq!(remaining_attempts, expected_remaining)
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        let until = match surface.login_at("alice", "wrong", t0).await {
            Err(LoginError::LockedOut { until }) => until,
            other => panic!("unexpected {:?}", other),
        };
        assert!(until >= t0 + ChronoDuration::minutes(5));
        assert!(until < t0 + ChronoDuration::minutes(5) + ChronoDuration::seconds(1));
        assert_eq!(transport.calls(), 5);

        // Correct password during the window still never reaches the server
        let later = t0 + ChronoDuration::minutes(4);
        assert!(matches!(
            surface.login_at("alice", "pw1", later).await,
            Err(LoginError::LockedOut { .. })
        ));
        assert_eq!(transport.calls(), 5);
    }

    #[tokio::test]
    async fn failure_after_window_counts_as_first_attempt() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new("pw1"));
        let surface = surface(&dir, transport.clone());
        let t0 = Utc::now();

        for _ in 0..5 {
            let _ = surface.login_at("alice", "wrong", t0).await;
        }
        assert!(matches!(surface.status(), LockoutStatus::Locked { .. }));

        let after = t0 + ChronoDuration::minutes(5) + ChronoDuration::seconds(1);
        match surface.login_at("alice", "wrong", after).await {
            Err(LoginError::InvalidCredentials { remaining_attempts }) => {
                assert_eq!(remaining_attempts, 4)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(transport.calls(), 6);
        assert_eq!(surface.state().lockout.failed_attempts, 1);
    }

    #[tokio::test]
    async fn unknown_user_is_reported_like_wrong_password() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport {
            status_on_failure: StatusCode::NOT_FOUND,
            ..FakeTransport::new("pw1")
        });
        let surface = surface(&dir, transport);

        assert!(matches!(
            surface.login("ghost", "pw").await,
            Err(LoginError::InvalidCredentials { remaining_attempts: 4 })
        ));
    }

    #[tokio::test]
    async fn lockout_survives_restart() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new("pw1"));
        let t0 = Utc::now();
        {
            let surface = surface(&dir, transport.clone());
            for _ in 0..5 {
                let _ = surface.login_at("alice", "wrong", t0).await;
            }
        }

        let reopened = surface(&dir, transport.clone());
        assert!(matches!(
            reopened.login_at("alice", "pw1", t0).await,
            Err(LoginError::LockedOut { .. })
        ));
        assert_eq!(transport.calls(), 5);
    }

    #[tokio::test]
    async fn corrupt_state_file_locks_instead_of_resetting() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new("pw1"));
        let t0 = Utc::now();
        {
            let surface = surface(&dir, transport.clone());
            for _ in 0..3 {
                let _ = surface.login_at("alice", "wrong", t0).await;
            }
        }
        std::fs::write(dir.path().join("client.json"), "{\"failed_attempts\": 3,").unwrap();

        let reopened = surface(&dir, transport.clone());
        let until = match reopened.login_at("alice", "pw1", t0).await {
            Err(LoginError::LockedOut { until }) => until,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(until, t0 + ChronoDuration::minutes(5));
        assert_eq!(transport.calls(), 3);

        // The repaired lock is written back over the corrupt file
        drop(reopened);
        let state = StateFile::new(dir.path().join("client.json")).load().unwrap();
        assert_eq!(state.lockout.lockout_until, Some(until));
    }

    #[tokio::test]
    async fn tick_clears_expired_lockout() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new("pw1"));
        let surface = surface(&dir, transport);
        let t0 = Utc::now();
        for _ in 0..5 {
            let _ = surface.login_at("alice", "wrong", t0).await;
        }

        assert!(!surface.tick_at(t0 + ChronoDuration::seconds(299)).unwrap());
        assert!(surface.tick_at(t0 + ChronoDuration::seconds(301)).unwrap());
        assert_eq!(
            surface.status(),
            LockoutStatus::Open {
                remaining_attempts: 5
            }
        );
    }

    #[tokio::test]
    async fn lockout_window_starts_when_the_server_answers() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport {
            latency: Some(Duration::from_millis(1100)),
            ..FakeTransport::new("pw1")
        });
        let surface = surface(&dir, transport);
        let t0 = Utc::now();
        for _ in 0..4 {
            let _ = surface.login_at("alice", "wrong", t0).await;
        }

        let until = match surface.login_at("alice", "wrong", t0).await {
            Err(LoginError::LockedOut { until }) => until,
            other => panic!("unexpected {:?}", other),
        };
        assert!(until >= t0 + ChronoDuration::minutes(5) + ChronoDuration::milliseconds(1100));
        assert_eq!(surface.state().lockout.lockout_until, Some(until));
    }

    #[tokio::test]
    async fn concurrent_attempt_is_refused() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport {
            gate: Some(gate.clone()),
            ..FakeTransport::new("pw1")
        });
        let surface = surface(&dir, transport.clone());

        let (first, second) = tokio::join!(surface.login("alice", "pw1"), async {
            let result = surface.login("alice", "pw1").await;
            gate.notify_one();
            result
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(LoginError::InFlight)));
        assert_eq!(transport.calls(), 1);

        // The flag is released once the first attempt resolves
        gate.notify_one();
        assert!(surface.login("alice", "pw1").await.is_ok());
    }

    #[tokio::test]
    async fn server_throttle_does_not_count_locally() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport {
            status_on_failure: StatusCode::TOO_MANY_REQUESTS,
            ..FakeTransport::new("pw1")
        });
        let surface = surface(&dir, transport);

        assert!(matches!(
            surface.login("alice", "wrong").await,
            Err(LoginError::ServerThrottled)
        ));
        assert_eq!(surface.state().lockout.failed_attempts, 0);
    }

    #[tokio::test]
    async fn logout_discards_token() {
        let dir = TempDir::new().unwrap();
        let surface = surface(&dir, Arc::new(FakeTransport::new("pw1")));
        surface.login("alice", "pw1").await.unwrap();

        assert!(surface.logout().unwrap());
        assert!(surface.token().is_none());
        assert_eq!(surface.cached_username().as_deref(), Some("alice"));
        assert!(!surface.logout().unwrap());
    }
}
