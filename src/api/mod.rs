//! Remote roster service client.
//!
//! The trait abstraction keeps the sync engine independent of the transport
//! and enables the in-memory mock used by tests. The error taxonomy matters
//! more than the wire format: `Forbidden` during join-request polling is the
//! expected "still waiting" signal, not a failure.

use crate::crypto::{PublicKey, Signature};
use crate::team::{Fingerprint, TeamUuid};
use async_trait::async_trait;
use thiserror::Error;

pub mod http;
pub mod mock;

/// Errors from the remote roster service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The resource does not exist.
    #[error("not found")]
    NotFound,

    /// The authenticated key has no access to the resource.
    #[error("forbidden")]
    Forbidden,

    /// Network or protocol failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A pending join request as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequestSummary {
    pub fingerprint: Fingerprint,
    pub email: String,
}

/// Operations the sync engine needs from the remote service.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch a team's roster and its detached signature, authenticated as
    /// `auth`. `Forbidden` means the key is not (yet) a member.
    async fn get_roster(
        &self,
        team: &TeamUuid,
        auth: &Fingerprint,
    ) -> Result<(Vec<u8>, Signature), ApiError>;

    /// Upload a signed roster, authenticated as the signer.
    async fn put_roster(
        &self,
        roster: &[u8],
        signature: &Signature,
        auth: &Fingerprint,
    ) -> Result<(), ApiError>;

    /// Fetch an armored public key by fingerprint.
    async fn get_public_key(&self, fingerprint: &Fingerprint) -> Result<PublicKey, ApiError>;

    /// Publish our own public key so others can fetch it.
    async fn publish_public_key(&self, key: &PublicKey) -> Result<(), ApiError>;

    /// Ask to join a team.
    async fn create_join_request(
        &self,
        team: &TeamUuid,
        fingerprint: &Fingerprint,
        email: &str,
    ) -> Result<(), ApiError>;

    /// List pending join requests for a team (admin operation).
    async fn list_join_requests(
        &self,
        team: &TeamUuid,
        auth: &Fingerprint,
    ) -> Result<Vec<JoinRequestSummary>, ApiError>;

    /// Withdraw or discard a join request, keyed by team and requester.
    async fn delete_join_request(
        &self,
        team: &TeamUuid,
        fingerprint: &Fingerprint,
    ) -> Result<(), ApiError>;
}
