//! In-memory mock of the remote roster service, for tests.

use super::{ApiError, JoinRequestSummary, RemoteClient};
use crate::crypto::{PublicKey, Signature};
use crate::team::{Fingerprint, TeamUuid};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Scriptable mock service.
///
/// Rosters are only served to fingerprints registered via [`allow`]; anyone
/// else gets `Forbidden`, mirroring the real service's membership check.
#[derive(Clone)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    rosters: HashMap<TeamUuid, (Vec<u8>, Signature)>,
    members: HashSet<(TeamUuid, Fingerprint)>,
    keys: HashMap<Fingerprint, PublicKey>,
    join_requests: HashMap<TeamUuid, Vec<JoinRequestSummary>>,
    failing_keys: HashSet<Fingerprint>,
    roster_fetches: usize,
    key_fetches: usize,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Install a team's current roster and signature.
    pub fn put_roster_state(&self, team: TeamUuid, roster: Vec<u8>, signature: Signature) {
        let mut s = self.state.lock().unwrap();
        s.rosters.insert(team, (roster, signature));
    }

    /// Grant a fingerprint roster access (member or approved requester).
    pub fn allow(&self, team: TeamUuid, fingerprint: Fingerprint) {
        let mut s = self.state.lock().unwrap();
        s.members.insert((team, fingerprint));
    }

    /// Publish a key into the mock directory (test setup).
    pub fn put_key(&self, key: PublicKey) {
        let mut s = self.state.lock().unwrap();
        s.keys.insert(key.fingerprint().clone(), key);
    }

    /// Make fetches of the given key fail with a transport error.
    pub fn fail_key_fetches(&self, fingerprint: Fingerprint) {
        let mut s = self.state.lock().unwrap();
        s.failing_keys.insert(fingerprint);
    }

    /// How many roster fetches have been served (incl. forbidden ones).
    pub fn roster_fetch_count(&self) -> usize {
        self.state.lock().unwrap().roster_fetches
    }

    /// How many public-key fetches have been served.
    pub fn key_fetch_count(&self) -> usize {
        self.state.lock().unwrap().key_fetches
    }

    /// Pending join requests recorded for a team.
    pub fn join_requests_for(&self, team: &TeamUuid) -> Vec<JoinRequestSummary> {
        let s = self.state.lock().unwrap();
        s.join_requests.get(team).cloned().unwrap_or_default()
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteClient for MockClient {
    async fn get_roster(
        &self,
        team: &TeamUuid,
        auth: &Fingerprint,
    ) -> Result<(Vec<u8>, Signature), ApiError> {
        let mut s = self.state.lock().unwrap();
        s.roster_fetches += 1;

        if !s.members.contains(&(*team, auth.clone())) {
            return Err(ApiError::Forbidden);
        }
        s.rosters.get(team).cloned().ok_or(ApiError::NotFound)
    }

    async fn put_roster(
        &self,
        roster: &[u8],
        signature: &Signature,
        auth: &Fingerprint,
    ) -> Result<(), ApiError> {
        let team = crate::team::Team::from_roster(roster)
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let mut s = self.state.lock().unwrap();
        if !s.members.contains(&(team.uuid, auth.clone())) {
            return Err(ApiError::Forbidden);
        }
        s.rosters
            .insert(team.uuid, (roster.to_vec(), signature.clone()));
        Ok(())
    }

    async fn get_public_key(&self, fingerprint: &Fingerprint) -> Result<PublicKey, ApiError> {
        let mut s = self.state.lock().unwrap();
        s.key_fetches += 1;

        if s.failing_keys.contains(fingerprint) {
            return Err(ApiError::Transport("simulated outage".to_string()));
        }
        s.keys.get(fingerprint).cloned().ok_or(ApiError::NotFound)
    }

    async fn publish_public_key(&self, key: &PublicKey) -> Result<(), ApiError> {
        let mut s = self.state.lock().unwrap();
        s.keys.insert(key.fingerprint().clone(), key.clone());
        Ok(())
    }

    async fn create_join_request(
        &self,
        team: &TeamUuid,
        fingerprint: &Fingerprint,
        email: &str,
    ) -> Result<(), ApiError> {
        let mut s = self.state.lock().unwrap();
        s.join_requests
            .entry(*team)
            .or_default()
            .push(JoinRequestSummary {
                fingerprint: fingerprint.clone(),
                email: email.to_string(),
            });
        Ok(())
    }

    async fn list_join_requests(
        &self,
        team: &TeamUuid,
        auth: &Fingerprint,
    ) -> Result<Vec<JoinRequestSummary>, ApiError> {
        let s = self.state.lock().unwrap();
        if !s.members.contains(&(*team, auth.clone())) {
            return Err(ApiError::Forbidden);
        }
        Ok(s.join_requests.get(team).cloned().unwrap_or_default())
    }

    async fn delete_join_request(
        &self,
        team: &TeamUuid,
        fingerprint: &Fingerprint,
    ) -> Result<(), ApiError> {
        let mut s = self.state.lock().unwrap();
        match s.join_requests.get_mut(team) {
            Some(requests) => {
                requests.retain(|r| &r.fingerprint != fingerprint);
                Ok(())
            }
            None => Err(ApiError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(seed: u8) -> Fingerprint {
        Fingerprint::of_public_key(&[seed; 32])
    }

    #[tokio::test]
    async fn test_roster_access_requires_membership() {
        let client = MockClient::new();
        let team = TeamUuid::new();
        client.put_roster_state(team, b"roster".to_vec(), Signature::from_bytes(vec![0]));

        let outsider = fp(1);
        assert_eq!(
            client.get_roster(&team, &outsider).await,
            Err(ApiError::Forbidden)
        );

        client.allow(team, outsider.clone());
        let (roster, _) = client.get_roster(&team, &outsider).await.unwrap();
        assert_eq!(roster, b"roster");
    }

    #[tokio::test]
    async fn test_missing_roster_is_not_found() {
        let client = MockClient::new();
        let team = TeamUuid::new();
        let member = fp(1);
        client.allow(team, member.clone());

        assert_eq!(
            client.get_roster(&team, &member).await,
            Err(ApiError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_key_directory_round_trip() {
        let client = MockClient::new();
        let (_, public) = crate::crypto::generate_keypair().unwrap();

        client.publish_public_key(&public).await.unwrap();
        let fetched = client.get_public_key(public.fingerprint()).await.unwrap();
        assert_eq!(fetched, public);
        assert_eq!(client.key_fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_key_fetch_is_transport_error() {
        let client = MockClient::new();
        let fingerprint = fp(9);
        client.fail_key_fetches(fingerprint.clone());

        assert!(matches!(
            client.get_public_key(&fingerprint).await,
            Err(ApiError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_join_request_lifecycle() {
        let client = MockClient::new();
        let team = TeamUuid::new();
        let requester = fp(3);

        client
            .create_join_request(&team, &requester, "new@example.com")
            .await
            .unwrap();
        assert_eq!(client.join_requests_for(&team).len(), 1);

        client.delete_join_request(&team, &requester).await.unwrap();
        assert!(client.join_requests_for(&team).is_empty());
    }
}
