//! Login lockout state machine.
//!
//! Two states: Open (`failed_attempts < max_attempts`) and Locked
//! (`lockout_until` set). Every transition takes an explicit `now`, so the
//! same policy drives the device-side login surface and the server-side
//! throttle and can be tested without sleeping.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lockout
    pub max_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    /// 5 failures, 5 minute lockout
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration: Duration::minutes(5),
        }
    }
}

/// Failure counter and lockout deadline for one login surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default)]
    pub lockout_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    Open { remaining_attempts: u32 },
    Locked { until: DateTime<Utc> },
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout_duration,
        }
    }

    pub fn status(&self, state: &LockoutState) -> LockoutStatus {
        match state.lockout_until {
            Some(until) => LockoutStatus::Locked { until },
            None => LockoutStatus::Open {
                remaining_attempts: self.max_attempts.saturating_sub(state.failed_attempts),
            },
        }
    }

    /// Time-driven transition: Locked -> Open once `now >= lockout_until`.
    /// Returns whether the state changed.
    pub fn tick(&self, state: &mut LockoutState, now: DateTime<Utc>) -> bool {
        match state.lockout_until {
            Some(until) if now >= until => {
                *state = LockoutState::default();
                true
            }
            _ => false,
        }
    }

    /// Gate an attempt. Applies [`tick`](Self::tick) first, then refuses with
    /// the lockout deadline while still locked. A refused attempt does not
    /// change the counter.
    pub fn check(&self, state: &mut LockoutState, now: DateTime<Utc>) -> Result<(), DateTime<Utc>> {
        self.repair(state, now);
        self.tick(state, now);
        match state.lockout_until {
            Some(until) => Err(until),
            None => Ok(()),
        }
    }

    pub fn record_failure(&self, state: &mut LockoutState, now: DateTime<Utc>) -> LockoutStatus {
        if let Some(until) = state.lockout_until {
            return LockoutStatus::Locked { until };
        }

        state.failed_attempts = state.failed_attempts.saturating_add(1);
        if state.failed_attempts >= self.max_attempts {
            state.lockout_until = Some(now + self.lockout_duration);
        }
        self.status(state)
    }

    pub fn record_success(&self, state: &mut LockoutState) {
        *state = LockoutState::default();
    }

    /// Persisted state may be inconsistent (hand-edited file, clock moved
    /// backwards). A full counter without a deadline locks from now, and a
    /// deadline further out than one lockout window is pulled in.
    fn repair(&self, state: &mut LockoutState, now: DateTime<Utc>) {
        let latest = now + self.lockout_duration;
        match state.lockout_until {
            None if state.failed_attempts >= self.max_attempts => {
                state.lockout_until = Some(latest);
            }
            Some(until) if until > latest => {
                state.lockout_until = Some(latest);
            }
            _ => {}
        }
    }
}
