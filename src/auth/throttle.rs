//! Server-side login throttle.
//!
//! Keeps one [`LockoutState`] per username, so a lockout cannot be reset by
//! reinstalling the client or switching devices. Failures for unknown
//! usernames are counted the same way as wrong passwords.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use super::lockout::{LockoutPolicy, LockoutState, LockoutStatus};
use crate::config::ServerLockoutConfig;

#[derive(Debug, Clone)]
struct ThrottleEntry {
    state: LockoutState,
    last_failure: DateTime<Utc>,
    /// Attempts admitted but not yet settled
    in_flight: u32,
}

/// Why an attempt was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Lockout window in force until the deadline
    Locked { until: DateTime<Utc> },
    /// Every remaining attempt is already being evaluated
    Saturated,
}

/// Thread-safe per-username lockout tracker using dashmap
#[derive(Debug)]
pub struct LoginThrottle {
    entries: DashMap<String, ThrottleEntry>,
    policy: LockoutPolicy,
    enabled: bool,
}

impl LoginThrottle {
    pub fn new(policy: LockoutPolicy, enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            enabled,
        }
    }

    pub fn from_config(config: &ServerLockoutConfig) -> Self {
        Self::new(
            LockoutPolicy::new(config.max_attempts, Duration::seconds(config.lockout_secs)),
            config.enabled,
        )
    }

    fn key(username: &str) -> String {
        username.trim().to_lowercase()
    }

    /// Admit one login attempt for `username`.
    ///
    /// The slot is reserved under the entry lock, so at most
    /// `max_attempts - failed_attempts` credential checks run concurrently.
    /// The returned [`LoginAttempt`] must be settled with `fail` or `succeed`;
    /// dropping it releases the slot without counting a failure.
    pub fn begin(&self, username: &str, now: DateTime<Utc>) -> Result<LoginAttempt<'_>, Refusal> {
        let key = Self::key(username);
        if !self.enabled {
            return Ok(LoginAttempt {
                throttle: self,
                key,
                settled: true,
            });
        }

        let mut entry = self.entries.entry(key.clone()).or_insert_with(|| ThrottleEntry {
            state: LockoutState::default(),
            last_failure: now,
            in_flight: 0,
        });
        if let Err(until) = self.policy.check(&mut entry.state, now) {
            return Err(Refusal::Locked { until });
        }
        if entry.state.failed_attempts.saturating_add(entry.in_flight) >= self.policy.max_attempts {
            return Err(Refusal::Saturated);
        }
        entry.in_flight += 1;

        Ok(LoginAttempt {
            throttle: self,
            key,
            settled: false,
        })
    }

    fn release(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
        }
    }

    fn settle_failure(&self, key: &str, now: DateTime<Utc>) -> LockoutStatus {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| ThrottleEntry {
            state: LockoutState::default(),
            last_failure: now,
            in_flight: 0,
        });
        entry.in_flight = entry.in_flight.saturating_sub(1);
        entry.last_failure = now;
        let status = self.policy.record_failure(&mut entry.state, now);

        if let LockoutStatus::Locked { until } = status {
            tracing::warn!(username = %key, until = %until, "Login locked after repeated failures");
        }
        status
    }

    fn settle_success(&self, key: &str) {
        // Other attempts may still hold slots on the same entry
        self.entries.remove_if_mut(key, |_, entry| {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            self.policy.record_success(&mut entry.state);
            entry.in_flight == 0
        });
    }

    /// Drop expired lockouts and counters idle for longer than one lockout window.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) {
        let idle = self.policy.lockout_duration;
        self.entries.retain(|_, entry| {
            entry.in_flight > 0
                || match entry.state.lockout_until {
                    Some(until) => now < until,
                    None => now - entry.last_failure < idle,
                }
        });
    }

    /// Get the number of tracked entries (for monitoring)
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// A reserved attempt slot. See [`LoginThrottle::begin`].
#[must_use = "settle the attempt with `fail` or `succeed`"]
pub struct LoginAttempt<'a> {
    throttle: &'a LoginThrottle,
    key: String,
    settled: bool,
}

impl LoginAttempt<'_> {
    /// Count a failed credential check, taken at `now`.
    pub fn fail(mut self, now: DateTime<Utc>) -> LockoutStatus {
        if self.settled {
            return LockoutStatus::Open {
                remaining_attempts: self.throttle.policy.max_attempts,
            };
        }
        self.settled = true;
        self.throttle.settle_failure(&self.key, now)
    }

    pub fn succeed(mut self) {
        if !self.settled {
            self.settled = true;
            self.throttle.settle_success(&self.key);
        }
    }
}

impl Drop for LoginAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.throttle.release(&self.key);
        }
    }
}

/// Spawn a background task to periodically clean up expired throttle entries
pub fn spawn_cleanup_task(throttle: Arc<LoginThrottle>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            throttle.cleanup_expired(Utc::now());
            tracing::debug!(
                "Login throttle cleanup complete, {} entries remaining",
                throttle.entry_count()
            );
        }
    });
}
