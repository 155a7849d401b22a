//! Locally-tracked requests to join a team.
//!
//! A request stays Pending until the remote side grants roster access
//! (Approved), it ages past seven days (Expired), or the user withdraws it.
//! All three terminal states end with the local record being deleted; the
//! lifecycle driver lives in the sync orchestrator.

use crate::team::{Fingerprint, TeamUuid};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

/// A pending request is abandoned once it is older than this.
pub const REQUEST_TTL_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum RequestStoreError {
    #[error("request store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt request store: {0}")]
    Corrupt(String),
}

/// A locally recorded request to join a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToJoinTeam {
    pub uuid: Uuid,
    pub team_uuid: TeamUuid,
    pub fingerprint: Fingerprint,
    pub email: String,
    pub requested_at: DateTime<Utc>,
}

impl RequestToJoinTeam {
    pub fn new(team_uuid: TeamUuid, fingerprint: Fingerprint, email: String) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            team_uuid,
            fingerprint,
            email,
            requested_at: Utc::now(),
        }
    }

    /// Whether this request is past the seven-day deadline at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.requested_at) > Duration::days(REQUEST_TTL_DAYS)
    }
}

/// JSON-file-backed store of pending join requests.
pub struct RequestStore {
    path: PathBuf,
}

impl RequestStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RequestStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// All locally pending requests.
    pub fn list(&self) -> Result<Vec<RequestToJoinTeam>, RequestStoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read(&self.path)?;
        serde_json::from_slice(&json).map_err(|e| RequestStoreError::Corrupt(e.to_string()))
    }

    /// Record a request, replacing any earlier one for the same team and
    /// requester key.
    pub fn add(&self, request: RequestToJoinTeam) -> Result<(), RequestStoreError> {
        let mut requests = self.list()?;
        requests
            .retain(|r| !(r.team_uuid == request.team_uuid && r.fingerprint == request.fingerprint));
        requests.push(request);
        self.write(&requests)
    }

    /// Delete the record for a team+requester pair, if present.
    pub fn remove(
        &self,
        team: &TeamUuid,
        fingerprint: &Fingerprint,
    ) -> Result<(), RequestStoreError> {
        let mut requests = self.list()?;
        requests.retain(|r| !(&r.team_uuid == team && &r.fingerprint == fingerprint));
        self.write(&requests)
    }

    fn write(&self, requests: &[RequestToJoinTeam]) -> Result<(), RequestStoreError> {
        let json = serde_json::to_vec_pretty(requests)
            .map_err(|e| RequestStoreError::Corrupt(e.to_string()))?;

        let dir = self
            .path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
