//! Trusted roster store.
//!
//! One directory per team under the data dir, holding the last accepted
//! roster+signature (`trusted.json`) and the digests of superseded versions
//! (`superseded.json`). Saves go through write-temp-then-rename so a crash
//! mid-write can never leave a half-written roster that looks verified.

use crate::crypto::{CryptoError, Signature};
use crate::team::{RosterDigest, TeamUuid};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use tempfile::NamedTempFile;
use thiserror::Error;

const TRUSTED_FILE: &str = "trusted.json";
const SUPERSEDED_FILE: &str = "superseded.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("roster store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt store entry for team {team}: {detail}")]
    Corrupt { team: TeamUuid, detail: String },
}

/// The last roster+signature this client durably accepted for a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedRoster {
    pub roster: Vec<u8>,
    pub signature: Signature,
}

/// Disk form: roster text plus hex signature.
#[derive(Serialize, Deserialize)]
struct StoredRoster {
    roster: String,
    signature: String,
}

/// Per-team trusted roster storage rooted at a directory.
pub struct RosterStore {
    dir: PathBuf,
}

impl RosterStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn team_dir(&self, team: &TeamUuid) -> PathBuf {
        self.dir.join(team.to_string())
    }

    /// Load the trusted baseline, if any.
    pub fn load(&self, team: &TeamUuid) -> Result<Option<TrustedRoster>, StoreError> {
        let path = self.team_dir(team).join(TRUSTED_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read(&path)?;
        let stored: StoredRoster = serde_json::from_slice(&json).map_err(|e| {
            StoreError::Corrupt {
                team: *team,
                detail: e.to_string(),
            }
        })?;
        let signature =
            Signature::from_hex(&stored.signature).map_err(|e: CryptoError| StoreError::Corrupt {
                team: *team,
                detail: e.to_string(),
            })?;

        Ok(Some(TrustedRoster {
            roster: stored.roster.into_bytes(),
            signature,
        }))
    }

    /// Atomically replace the trusted baseline.
    pub fn save(
        &self,
        team: &TeamUuid,
        roster: &[u8],
        signature: &Signature,
    ) -> Result<(), StoreError> {
        let roster = String::from_utf8(roster.to_vec()).map_err(|e| StoreError::Corrupt {
            team: *team,
            detail: format!("roster is not utf-8: {e}"),
        })?;
        let stored = StoredRoster {
            roster,
            signature: signature.to_hex(),
        };
        let json = serde_json::to_vec_pretty(&stored).map_err(|e| StoreError::Corrupt {
            team: *team,
            detail: e.to_string(),
        })?;

        self.write_atomic(team, TRUSTED_FILE, &json)
    }

    /// Digests of roster versions this team has already moved past.
    pub fn superseded(&self, team: &TeamUuid) -> Result<HashSet<RosterDigest>, StoreError> {
        let path = self.team_dir(team).join(SUPERSEDED_FILE);
        if !path.exists() {
            return Ok(HashSet::new());
        }

        let json = fs::read(&path)?;
        let digests: Vec<RosterDigest> =
            serde_json::from_slice(&json).map_err(|e| StoreError::Corrupt {
                team: *team,
                detail: e.to_string(),
            })?;
        Ok(digests.into_iter().collect())
    }

    /// Record that a roster version has been superseded.
    pub fn mark_superseded(
        &self,
        team: &TeamUuid,
        digest: RosterDigest,
    ) -> Result<(), StoreError> {
        let mut digests = self.superseded(team)?;
        digests.insert(digest);

        let mut sorted: Vec<_> = digests.into_iter().collect();
        sorted.sort_by_key(|d| d.to_string());
        let json = serde_json::to_vec_pretty(&sorted).map_err(|e| StoreError::Corrupt {
            team: *team,
            detail: e.to_string(),
        })?;

        self.write_atomic(team, SUPERSEDED_FILE, &json)
    }

    /// Teams with a stored trusted roster.
    pub fn list_teams(&self) -> Result<Vec<TeamUuid>, StoreError> {
        let mut teams = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Ok(team) = TeamUuid::from_str(name) {
                if entry.path().join(TRUSTED_FILE).exists() {
                    teams.push(team);
                }
            }
        }
        teams.sort_by_key(|t| t.to_string());
        Ok(teams)
    }

    fn write_atomic(&self, team: &TeamUuid, file: &str, contents: &[u8]) -> Result<(), StoreError> {
        let dir = self.team_dir(team);
        fs::create_dir_all(&dir)?;

        // Temp file in the same directory so the rename stays on one
        // filesystem and is atomic.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(file)).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, RosterStore) {
        let dir = TempDir::new().unwrap();
        let store = RosterStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_load_before_save_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.load(&TeamUuid::new()).unwrap(), None);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, store) = store();
        let team = TeamUuid::new();
        let roster = b"uuid = \"x\"\nname = \"Acme\"\n".to_vec();
        let signature = Signature::from_bytes(vec![1, 2, 3]);

        store.save(&team, &roster, &signature).unwrap();
        let trusted = store.load(&team).unwrap().unwrap();
        assert_eq!(trusted.roster, roster);
        assert_eq!(trusted.signature, signature);
    }

    #[test]
    fn test_save_overwrites_whole_baseline() {
        let (_dir, store) = store();
        let team = TeamUuid::new();
        let sig = Signature::from_bytes(vec![1]);

        store.save(&team, b"version one", &sig).unwrap();
        store.save(&team, b"version two", &sig).unwrap();

        let trusted = store.load(&team).unwrap().unwrap();
        assert_eq!(trusted.roster, b"version two");
    }

    #[test]
    fn test_superseded_digests_accumulate() {
        let (_dir, store) = store();
        let team = TeamUuid::new();

        assert!(store.superseded(&team).unwrap().is_empty());

        let d1 = RosterDigest::of(b"one");
        let d2 = RosterDigest::of(b"two");
        store.mark_superseded(&team, d1.clone()).unwrap();
        store.mark_superseded(&team, d2.clone()).unwrap();
        store.mark_superseded(&team, d1.clone()).unwrap(); // idempotent

        let digests = store.superseded(&team).unwrap();
        assert_eq!(digests.len(), 2);
        assert!(digests.contains(&d1) && digests.contains(&d2));
    }

    #[test]
    fn test_list_teams_only_sees_saved_rosters() {
        let (_dir, store) = store();
        let a = TeamUuid::new();
        let b = TeamUuid::new();
        let sig = Signature::from_bytes(vec![1]);

        store.save(&a, b"roster a", &sig).unwrap();
        store.save(&b, b"roster b", &sig).unwrap();
        // A directory without a trusted roster doesn't count.
        std::fs::create_dir_all(store.team_dir(&TeamUuid::new())).unwrap();

        let mut expected = vec![a, b];
        expected.sort_by_key(|t| t.to_string());
        assert_eq!(store.list_teams().unwrap(), expected);
    }

    #[test]
    fn test_corrupt_trusted_file_reported() {
        let (_dir, store) = store();
        let team = TeamUuid::new();
        let dir = store.team_dir(&team);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(TRUSTED_FILE), b"not json").unwrap();

        assert!(matches!(
            store.load(&team),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_no_stray_temp_files_after_save() {
        let (_dir, store) = store();
        let team = TeamUuid::new();
        store
            .save(&team, b"roster", &Signature::from_bytes(vec![1]))
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(store.team_dir(&team))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![TRUSTED_FILE.to_string()]);
    }
}
