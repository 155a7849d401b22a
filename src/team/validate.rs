//! Roster update validation.
//!
//! Compares a proposed roster against the last trusted roster and enforces
//! the immutability and consistency rules. Checks run in a fixed order and
//! fail fast on the first violation.
//!
//! The signer rule operates on the *updated* roster: a signer who is absent
//! from, or demoted in, the new roster cannot push it. This symmetrically
//! blocks self-removal and self-demotion, so a single compromised admin
//! cannot lock the team out of its own roster.

use super::{Fingerprint, RosterDigest, Team};
use std::collections::HashSet;
use thiserror::Error;

/// A rejected roster update, with the first rule that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    /// The team UUID or name changed.
    #[error("can't change team {0}")]
    ImmutableFieldChanged(&'static str),

    /// The signing key is missing from the updated roster, or listed but
    /// not an admin.
    #[error("signing key {0} is not an admin in the updated roster")]
    SignerNotAdmin(Fingerprint),

    /// The update would leave the team without any admin.
    #[error("update would leave the team with no admin")]
    NoAdminRemaining,

    /// An email or fingerprint appears more than once.
    #[error("duplicate {field} in roster: {value}")]
    DuplicateMember { field: &'static str, value: String },

    /// The update is bytewise identical to a previously superseded roster.
    #[error("roster matches a previously superseded version")]
    ReplayedRoster,
}

/// Validate a proposed roster update against the trusted baseline.
///
/// `signer` is the fingerprint of the key whose signature verified over the
/// proposed roster. `superseded` holds the digests of roster versions this
/// client has already replaced; re-submitting any of them is a replay.
pub fn validate_update(
    before: &Team,
    after: &Team,
    signer: &Fingerprint,
    superseded: &HashSet<RosterDigest>,
) -> Result<(), ValidateError> {
    if before.uuid != after.uuid {
        return Err(ValidateError::ImmutableFieldChanged("uuid"));
    }

    if before.name != after.name {
        return Err(ValidateError::ImmutableFieldChanged("name"));
    }

    if !after.is_admin(signer) {
        return Err(ValidateError::SignerNotAdmin(signer.clone()));
    }

    if after.admins().next().is_none() {
        return Err(ValidateError::NoAdminRemaining);
    }

    check_duplicates("email", after.people.iter().map(|p| p.email.as_str()))?;
    check_duplicates(
        "fingerprint",
        after.people.iter().map(|p| p.fingerprint.hex()),
    )?;

    let digest = RosterDigest::of(&after.roster());
    if superseded.contains(&digest) {
        return Err(ValidateError::ReplayedRoster);
    }

    Ok(())
}

fn check_duplicates<'a>(
    field: &'static str,
    values: impl Iterator<Item = &'a str>,
) -> Result<(), ValidateError> {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(ValidateError::DuplicateMember {
                field,
                value: value.to_string(),
            });
        }
    }
    Ok(())
}

/// Convenience for callers with no replay history (e.g. first bootstrap).
pub fn no_history() -> HashSet<RosterDigest> {
    HashSet::new()
}
