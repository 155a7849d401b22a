//! Admin key resolution.
//!
//! For each admin in a team, try the local keyring first (cheap, possibly
//! stale) and fall back to the remote key directory. Resolution is
//! all-or-nothing: one unresolvable admin fails the lot, because verifying
//! against a partial admin set would let an attacker exploit the missing
//! signer to slip past quorum-of-one verification.

use crate::api::RemoteClient;
use crate::crypto::PublicKey;
use crate::keyring::{Keyring, KeyringError};
use crate::team::{Fingerprint, Team};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// An admin's key could not be obtained from any source.
    #[error("could not resolve public key for admin {fingerprint}")]
    KeyResolutionFailed { fingerprint: Fingerprint },

    /// The local keyring failed in a way that isn't "key not present".
    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

/// Resolve the public keys of all admins of `team`.
pub async fn resolve_admin_keys(
    team: &Team,
    keyring: &Keyring,
    client: &dyn RemoteClient,
) -> Result<Vec<PublicKey>, ResolveError> {
    let mut keys = Vec::new();
    for admin in team.admins() {
        keys.push(resolve_key(&admin.fingerprint, keyring, client).await?);
    }
    Ok(keys)
}

/// Resolve one key through the fallback chain: keyring, then remote.
async fn resolve_key(
    fingerprint: &Fingerprint,
    keyring: &Keyring,
    client: &dyn RemoteClient,
) -> Result<PublicKey, ResolveError> {
    match keyring.lookup(fingerprint) {
        Ok(key) => return Ok(key),
        Err(KeyringError::NotFound(_)) => {
            tracing::debug!(%fingerprint, "key not in local keyring, trying remote");
        }
        Err(e) => return Err(e.into()),
    }

    let key = match client.get_public_key(fingerprint).await {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(%fingerprint, error = %e, "remote key fetch failed");
            return Err(ResolveError::KeyResolutionFailed {
                fingerprint: fingerprint.clone(),
            });
        }
    };

    // The service is not trusted: a key that doesn't hash to the requested
    // fingerprint is a substitution, not a lookup result.
    if key.fingerprint() != fingerprint {
        tracing::warn!(
            requested = %fingerprint,
            received = %key.fingerprint(),
            "remote returned a key with the wrong fingerprint"
        );
        return Err(ResolveError::KeyResolutionFailed {
            fingerprint: fingerprint.clone(),
        });
    }
    Ok(key)
}
