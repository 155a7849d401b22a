//! Team data model and roster codec.
//!
//! A roster is the canonical TOML serialization of a [`Team`]. The detached
//! signature covering a roster is computed over exactly these bytes, so the
//! serialization must be deterministic: field order is fixed by the struct
//! definitions and people keep their document order. Two clients holding the
//! same logical team always produce identical roster bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub mod validate;

/// Number of bytes of the SHA-256 public-key hash kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 20;

/// Errors from parsing or serializing a roster document.
#[derive(Debug, Error)]
pub enum TeamError {
    /// The roster bytes are not a structurally valid team document.
    #[error("malformed roster: {0}")]
    MalformedRoster(String),
}

/// Stable key identity: 40 lowercase hex characters (20 bytes of the
/// SHA-256 hash of the raw public key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the fingerprint of a raw Ed25519 public key.
    pub fn of_public_key(key_bytes: &[u8]) -> Self {
        let digest = Sha256::digest(key_bytes);
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// Parse from the stable hex string form.
    pub fn parse(s: &str) -> Result<Self, TeamError> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized.len() != FINGERPRINT_BYTES * 2
            || !normalized.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(TeamError::MalformedRoster(format!(
                "invalid fingerprint: {s:?}"
            )));
        }
        Ok(Self(normalized))
    }

    /// The stable hex string form.
    pub fn hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fingerprint::parse(&value).map_err(|e| e.to_string())
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> String {
        fp.0
    }
}

/// Immutable team identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamUuid(pub Uuid);

impl TeamUuid {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TeamUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TeamUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TeamUuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A member of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub email: String,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub is_admin: bool,
}

/// A team: immutable UUID and name plus its membership.
///
/// Field order here defines the canonical roster layout; scalar fields must
/// stay ahead of the `[[person]]` array of tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub uuid: TeamUuid,
    pub name: String,
    #[serde(rename = "person", default)]
    pub people: Vec<Person>,
}

impl Team {
    /// Parse a roster document.
    pub fn from_roster(roster: &[u8]) -> Result<Self, TeamError> {
        let text = std::str::from_utf8(roster)
            .map_err(|e| TeamError::MalformedRoster(format!("not utf-8: {e}")))?;
        toml::from_str(text).map_err(|e| TeamError::MalformedRoster(e.to_string()))
    }

    /// Serialize to the canonical roster bytes the signature covers.
    pub fn roster(&self) -> Vec<u8> {
        toml::to_string(self)
            .expect("team serialization cannot fail: all fields are TOML-representable")
            .into_bytes()
    }

    /// The members flagged as admins.
    pub fn admins(&self) -> impl Iterator<Item = &Person> {
        self.people.iter().filter(|p| p.is_admin)
    }

    /// Look up a member by fingerprint.
    pub fn person(&self, fingerprint: &Fingerprint) -> Option<&Person> {
        self.people.iter().find(|p| &p.fingerprint == fingerprint)
    }

    /// Whether the given fingerprint belongs to an admin of this team.
    pub fn is_admin(&self, fingerprint: &Fingerprint) -> bool {
        self.person(fingerprint).is_some_and(|p| p.is_admin)
    }
}

/// SHA-256 digest of a roster's canonical bytes, hex-encoded.
///
/// Superseded roster versions are remembered by digest; a replayed roster is
/// bytewise identical to an old version, so digest equality suffices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RosterDigest(String);

impl RosterDigest {
    pub fn of(roster: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(roster)))
    }
}

impl fmt::Display for RosterDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fp(seed: u8) -> Fingerprint {
        Fingerprint::of_public_key(&[seed; 32])
    }

    fn sample_team() -> Team {
        Team {
            uuid: TeamUuid(Uuid::parse_str("74bb40b4-3510-11e9-968e-53c38df634be").unwrap()),
            name: "Acme".to_string(),
            people: vec![
                Person {
                    email: "alice@example.com".to_string(),
                    fingerprint: fp(1),
                    is_admin: true,
                },
                Person {
                    email: "bob@example.com".to_string(),
                    fingerprint: fp(2),
                    is_admin: false,
                },
            ],
        }
    }

    #[test]
    fn test_roster_round_trip() {
        let team = sample_team();
        let roster = team.roster();
        let parsed = Team::from_roster(&roster).unwrap();
        assert_eq!(team, parsed, "roster must parse back to the same team");
    }

    #[test]
    fn test_roster_is_deterministic() {
        let team = sample_team();
        assert_eq!(
            team.roster(),
            team.clone().roster(),
            "same logical team must serialize to identical bytes"
        );
    }

    #[test]
    fn test_roster_layout_is_readable_toml() {
        let roster = sample_team().roster();
        let text = String::from_utf8(roster).unwrap();
        assert!(text.contains("name = \"Acme\""));
        assert!(text.contains("[[person]]"));
        assert!(text.contains("email = \"alice@example.com\""));
    }

    #[test]
    fn test_malformed_roster_rejected() {
        let result = Team::from_roster(b"this is not a roster {{{");
        assert!(matches!(result, Err(TeamError::MalformedRoster(_))));
    }

    #[test]
    fn test_roster_missing_uuid_rejected() {
        let result = Team::from_roster(b"name = \"Acme\"\n");
        assert!(matches!(result, Err(TeamError::MalformedRoster(_))));
    }

    #[test]
    fn test_non_utf8_roster_rejected() {
        let result = Team::from_roster(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(TeamError::MalformedRoster(_))));
    }

    #[test]
    fn test_fingerprint_derivation_is_stable() {
        let key = [7u8; 32];
        assert_eq!(
            Fingerprint::of_public_key(&key),
            Fingerprint::of_public_key(&key)
        );
        assert_eq!(Fingerprint::of_public_key(&key).hex().len(), 40);
    }

    #[test]
    fn test_fingerprint_parse_normalizes_case() {
        let fp = Fingerprint::of_public_key(&[9u8; 32]);
        let upper = fp.hex().to_ascii_uppercase();
        assert_eq!(Fingerprint::parse(&upper).unwrap(), fp);
    }

    #[test]
    fn test_fingerprint_parse_rejects_bad_input() {
        assert!(Fingerprint::parse("short").is_err());
        assert!(Fingerprint::parse(&"g".repeat(40)).is_err());
    }

    #[test]
    fn test_admins_and_lookup() {
        let team = sample_team();
        let admins: Vec<_> = team.admins().collect();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "alice@example.com");
        assert!(team.is_admin(&fp(1)));
        assert!(!team.is_admin(&fp(2)));
        assert!(team.person(&fp(3)).is_none());
    }

    #[test]
    fn test_roster_digest_tracks_content() {
        let team = sample_team();
        let mut renamed = team.clone();
        renamed.name = "Acme2".to_string();

        let d1 = RosterDigest::of(&team.roster());
        let d2 = RosterDigest::of(&renamed.roster());
        assert_ne!(d1, d2, "different rosters must have different digests");
        assert_eq!(d1, RosterDigest::of(&team.roster()));
    }

    proptest! {
        /// Canonical bytes are deterministic across parse/serialize cycles
        /// for arbitrary member sets.
        #[test]
        fn prop_roster_canonical_form_stable(
            name in "[A-Za-z][A-Za-z0-9 ]{0,30}",
            emails in proptest::collection::vec("[a-z]{1,10}@[a-z]{1,10}\\.com", 1..6),
        ) {
            let people = emails
                .iter()
                .enumerate()
                .map(|(i, email)| Person {
                    email: email.clone(),
                    fingerprint: Fingerprint::of_public_key(&[i as u8 + 1; 32]),
                    is_admin: i == 0,
                })
                .collect();
            let team = Team { uuid: TeamUuid::new(), name, people };

            let first = team.roster();
            let reparsed = Team::from_roster(&first).unwrap();
            let second = reparsed.roster();
            prop_assert_eq!(first, second, "parse then serialize must be byte-stable");
        }
    }
}
