//! Persisted session snapshot
//!
//! One JSON file holding the credential pair and user, written atomically at
//! lifecycle boundaries (post-login, post-refresh, post-logout) and loaded
//! once at startup for rehydration. Writes go through a temp file so a crash
//! mid-write never leaves a truncated snapshot.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::types::User;
use crate::api::ApiError;

/// Snapshot contents, mirroring the session's persisted fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
}

/// File-backed store for the session snapshot
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("drivekit").join("session.json"))
    }

    /// Load the snapshot, or None when no snapshot exists
    pub fn load(&self) -> Result<Option<PersistedSession>, ApiError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ApiError::Request(format!(
                    "failed to read session snapshot: {}",
                    e
                )))
            }
        };

        match serde_json::from_slice(&data) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                // A corrupt snapshot is not fatal; the user just signs in again
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable session snapshot");
                Ok(None)
            }
        }
    }

    /// Write the snapshot atomically (temp file + rename)
    pub fn save(&self, snapshot: &PersistedSession) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ApiError::Request(format!("failed to create snapshot dir: {}", e)))?;
        }

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| ApiError::Request(format!("failed to encode snapshot: {}", e)))?;

        let parent = self.path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| ApiError::Request(format!("failed to create temp snapshot: {}", e)))?;
        tmp.write_all(&json)
            .map_err(|e| ApiError::Request(format!("failed to write snapshot: {}", e)))?;
        tmp.persist(&self.path)
            .map_err(|e| ApiError::Request(format!("failed to persist snapshot: {}", e)))?;

        debug!(path = %self.path.display(), "Saved session snapshot");
        Ok(())
    }

    /// Remove the snapshot; missing file is not an error
    pub fn clear(&self) -> Result<(), ApiError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Cleared session snapshot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Request(format!(
                "failed to clear session snapshot: {}",
                e
            ))),
        }
    }
}
