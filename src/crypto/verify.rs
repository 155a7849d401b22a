//! Roster signature verification.
//!
//! A roster carries a single detached signature; verification succeeds if
//! that signature validates against any one of the candidate admin keys.
//! This is a quorum-of-one scheme, not a threshold scheme. Verification is
//! pure: it never touches trusted state.

use super::{PublicKey, Signature};
use crate::team::Fingerprint;
use ring::signature::{UnparsedPublicKey, ED25519};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// No candidate key validates the signature.
    #[error("roster signature does not match any candidate admin key")]
    SignatureInvalid,
}

/// Verify a detached signature over roster bytes against a candidate key
/// set, returning the fingerprint of the key that validated.
///
/// The returned fingerprint identifies the signer for the update validator's
/// signer-is-admin rule.
pub fn verify_roster(
    roster: &[u8],
    signature: &Signature,
    candidate_keys: &[PublicKey],
) -> Result<Fingerprint, VerifyError> {
    for key in candidate_keys {
        let public = UnparsedPublicKey::new(&ED25519, key.as_bytes());
        if public.verify(roster, signature.as_bytes()).is_ok() {
            return Ok(key.fingerprint().clone());
        }
    }
    Err(VerifyError::SignatureInvalid)
}
