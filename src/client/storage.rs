//! Device-local client state: session token, cached username and the
//! lockout counters, kept in one JSON file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::LockoutState;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode client state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Pre-fills the login prompt; never used for authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub lockout: LockoutState,
}

impl ClientState {
    /// No session and a failure count past any lockout threshold
    pub fn saturated() -> Self {
        Self {
            lockout: LockoutState {
                failed_attempts: u32::MAX,
                lockout_until: None,
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty state. A corrupt one is logged and loads
    /// with a saturated failure counter, so the next attempt starts a full
    /// lockout window instead of resetting the counter.
    pub fn load(&self) -> Result<ClientState, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ClientState::default()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt client state, locking login");
                Ok(ClientState::saturated())
            }
        }
    }

    /// Write through a temp file and rename so a crash never leaves half a file.
    pub fn save(&self, state: &ClientState) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("client.json"));
        assert_eq!(file.load().unwrap(), ClientState::default());
    }

    #[test]
    fn save_creates_parent_dirs_and_reloads() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("nested/.mealplan/client.json"));
        let state = ClientState {
            token: Some("abc".to_string()),
            username: Some("alice".to_string()),
            lockout: LockoutState {
                failed_attempts: 5,
                lockout_until: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
            },
        };

        file.save(&state).unwrap();
        assert_eq!(file.load().unwrap(), state);
    }

    #[test]
    fn persisted_keys_are_flat() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("client.json"));
        file.save(&ClientState {
            token: Some("abc".to_string()),
            lockout: LockoutState {
                failed_attempts: 2,
                lockout_until: None,
            },
            ..Default::default()
        })
        .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(raw["token"], "abc");
        assert_eq!(raw["failed_attempts"], 2);
        assert!(raw["lockout_until"].is_null());
    }

    #[test]
    fn corrupt_file_loads_saturated_counter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.json");
        fs::write(&path, "{not json").unwrap();

        let state = StateFile::new(path).load().unwrap();
        assert_eq!(state, ClientState::saturated());
        assert!(state.token.is_none());
        assert_eq!(state.lockout.failed_attempts, u32::MAX);
    }
}
