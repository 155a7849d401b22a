//! Sync orchestrator.
//!
//! One pass has two phases: settle pending join requests, then bring every
//! local membership up to date. Each phase is a result-collecting fold -
//! every request, membership and key import yields an outcome record, and
//! [`SyncReport`] reduces them. No outcome ever aborts the pass; the caller
//! turns `has_errors` into an exit code.
//!
//! Trust rules enforced here:
//! - admin keys are resolved against the *prior* trusted roster, so a
//!   malicious update can't vouch for itself
//! - a new roster is persisted as the trusted baseline before it is used
//!   for anything else
//! - a join approval is a bootstrap: admin keys are resolved fresh, which
//!   is a weaker guarantee than an update against an existing baseline

use crate::api::{ApiError, RemoteClient};
use crate::keyring::{Keyring, KeyringError, PasswordPrompter};
use crate::requests::{RequestStore, RequestToJoinTeam};
use crate::resolver::resolve_admin_keys;
use crate::store::{RosterStore, StoreError};
use crate::team::validate::validate_update;
use crate::team::{Fingerprint, Person, RosterDigest, Team, TeamUuid};
use chrono::Utc;
use thiserror::Error;

/// Failures of the sync machinery itself, as opposed to per-item outcomes.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

/// One local team membership: the trusted team plus who we are in it.
#[derive(Debug, Clone)]
pub struct Membership {
    pub team: Team,
    pub me: Person,
}

/// What happened to one join request during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The admin hasn't decided yet; the request stays recorded.
    StillPending { team: TeamUuid },
    /// Roster access granted; the roster was verified and trusted.
    Approved { team: TeamUuid },
    /// Older than the TTL; the record was deleted.
    Expired { team: TeamUuid },
    Failed { team: TeamUuid, error: String },
}

impl RequestOutcome {
    /// Expiry is reported as an error so scheduled runs draw attention to it.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Expired { .. } | Self::Failed { .. })
    }
}

/// What happened to one membership's roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterOutcome {
    /// A new version was verified, validated and persisted.
    Updated,
    /// Remote roster is byte-identical to the baseline; nothing to do.
    Unchanged,
    /// The old trusted baseline remains authoritative.
    Failed { error: String },
}

/// Result of fetching and importing one member's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyImportOutcome {
    pub email: String,
    pub fingerprint: Fingerprint,
    pub result: Result<(), String>,
}

#[derive(Debug, Clone)]
pub struct MembershipOutcome {
    pub team: TeamUuid,
    pub team_name: String,
    pub roster: RosterOutcome,
    pub key_imports: Vec<KeyImportOutcome>,
}

impl MembershipOutcome {
    pub fn has_errors(&self) -> bool {
        matches!(self.roster, RosterOutcome::Failed { .. })
            || self.key_imports.iter().any(|k| k.result.is_err())
    }

    fn failed(team: TeamUuid, team_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            team,
            team_name: team_name.into(),
            roster: RosterOutcome::Failed {
                error: error.into(),
            },
            key_imports: Vec::new(),
        }
    }
}

/// Aggregated result of one sync pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub requests: Vec<RequestOutcome>,
    pub request_store_error: Option<String>,
    pub memberships: Vec<MembershipOutcome>,
}

impl SyncReport {
    /// True if anything at all went wrong, even though the pass completed.
    pub fn has_errors(&self) -> bool {
        self.request_store_error.is_some()
            || self.requests.iter().any(|r| r.is_error())
            || self.memberships.iter().any(|m| m.has_errors())
    }
}

/// Explicit session context for one sync pass.
pub struct Syncer<'a> {
    pub client: &'a dyn RemoteClient,
    pub keyring: &'a Keyring,
    pub store: &'a RosterStore,
    pub requests: &'a RequestStore,
    pub prompter: &'a dyn PasswordPrompter,
}

impl Syncer<'_> {
    /// Run one full pass: join requests first, then every membership.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        match self.requests.list() {
            Ok(pending) => {
                for request in pending {
                    report.requests.push(self.process_join_request(request).await);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to read pending join requests");
                report.request_store_error = Some(e.to_string());
            }
        }

        let (memberships, mut broken) = self.memberships()?;
        report.memberships.append(&mut broken);
        for membership in &memberships {
            report.memberships.push(self.sync_membership(membership).await);
        }

        Ok(report)
    }

    /// Enumerate local memberships from the trusted store: each stored team
    /// in which one of our secret keys appears. Teams with unreadable local
    /// state become failed outcomes rather than stopping the pass.
    pub fn memberships(&self) -> Result<(Vec<Membership>, Vec<MembershipOutcome>), SyncError> {
        let secrets = self.keyring.secret_fingerprints()?;
        let mut memberships = Vec::new();
        let mut broken = Vec::new();

        for team_id in self.store.list_teams()? {
            let trusted = match self.store.load(&team_id) {
                Ok(Some(trusted)) => trusted,
                Ok(None) => continue,
                Err(e) => {
                    broken.push(MembershipOutcome::failed(team_id, "", e.to_string()));
                    continue;
                }
            };

            let team = match Team::from_roster(&trusted.roster) {
                Ok(team) => team,
                Err(e) => {
                    broken.push(MembershipOutcome::failed(
                        team_id,
                        "",
                        format!("corrupt trusted roster: {e}"),
                    ));
                    continue;
                }
            };

            match team
                .people
                .iter()
                .find(|p| secrets.contains(&p.fingerprint))
                .cloned()
            {
                Some(me) => memberships.push(Membership { team, me }),
                None => {
                    broken.push(MembershipOutcome::failed(
                        team_id,
                        team.name.clone(),
                        "no local secret key is a member of this team",
                    ));
                }
            }
        }

        Ok((memberships, broken))
    }

    /// Drive one join request through its lifecycle.
    async fn process_join_request(&self, request: RequestToJoinTeam) -> RequestOutcome {
        let team = request.team_uuid;

        if request.is_expired(Utc::now()) {
            tracing::warn!(
                %team,
                requested_at = %request.requested_at,
                "join request expired without approval; deleting it"
            );
            return match self.requests.remove(&team, &request.fingerprint) {
                Ok(()) => RequestOutcome::Expired { team },
                Err(e) => RequestOutcome::Failed {
                    team,
                    error: format!("failed to delete expired request: {e}"),
                },
            };
        }

        // Unlock proves we control the requesting key before using it as
        // the authorization identity.
        if let Err(e) = self.keyring.unlock(&request.fingerprint, self.prompter) {
            return RequestOutcome::Failed {
                team,
                error: format!("failed to unlock requesting key: {e}"),
            };
        }

        let (roster, signature) = match self.client.get_roster(&team, &request.fingerprint).await {
            Ok(fetched) => fetched,
            Err(ApiError::Forbidden) => {
                tracing::info!(%team, "join request not yet approved");
                return RequestOutcome::StillPending { team };
            }
            Err(e) => {
                return RequestOutcome::Failed {
                    team,
                    error: format!("failed to fetch roster: {e}"),
                }
            }
        };

        match self.trust_first_roster(&team, &roster, &signature).await {
            Ok(team_name) => {
                tracing::info!(%team, name = %team_name, "join request approved");
                match self.requests.remove(&team, &request.fingerprint) {
                    Ok(()) => RequestOutcome::Approved { team },
                    Err(e) => RequestOutcome::Failed {
                        team,
                        error: format!("approved, but failed to delete request record: {e}"),
                    },
                }
            }
            Err(error) => RequestOutcome::Failed { team, error },
        }
    }

    /// Bootstrap trust in a team we have no baseline for. Admin keys are
    /// resolved fresh from the fetched roster itself; this is the weaker
    /// first-contact guarantee.
    async fn trust_first_roster(
        &self,
        expected: &TeamUuid,
        roster: &[u8],
        signature: &crate::crypto::Signature,
    ) -> Result<String, String> {
        let team = Team::from_roster(roster).map_err(|e| e.to_string())?;
        if &team.uuid != expected {
            return Err(format!(
                "service returned roster for team {}, expected {expected}",
                team.uuid
            ));
        }

        tracing::warn!(
            team = %team.uuid,
            "bootstrapping trust from a fresh admin key set; no prior baseline exists"
        );
        let admin_keys = resolve_admin_keys(&team, self.keyring, self.client)
            .await
            .map_err(|e| e.to_string())?;
        crate::crypto::verify::verify_roster(roster, signature, &admin_keys)
            .map_err(|e| e.to_string())?;

        self.store
            .save(&team.uuid, roster, signature)
            .map_err(|e| e.to_string())?;
        Ok(team.name)
    }

    /// Steps 1-6 of the per-membership sync.
    async fn sync_membership(&self, membership: &Membership) -> MembershipOutcome {
        let Membership { team, me } = membership;
        tracing::info!(team = %team.uuid, name = %team.name, "syncing membership");

        let mut current = team.clone();
        let roster = match self.keyring.unlock(&me.fingerprint, self.prompter) {
            Err(e) => {
                // Carry on degraded: we can still fetch the members' keys.
                tracing::warn!(team = %team.uuid, error = %e, "could not unlock member key");
                RosterOutcome::Failed {
                    error: format!("failed to unlock key: {e}"),
                }
            }
            Ok(_unlocked) => match self.fetch_and_update_roster(team, &me.fingerprint).await {
                Ok(Some(updated)) => {
                    current = updated;
                    RosterOutcome::Updated
                }
                Ok(None) => RosterOutcome::Unchanged,
                Err(error) => {
                    tracing::warn!(team = %team.uuid, %error, "roster update rejected");
                    RosterOutcome::Failed { error }
                }
            },
        };

        let key_imports = self.import_member_keys(&current).await;

        MembershipOutcome {
            team: team.uuid,
            team_name: team.name.clone(),
            roster,
            key_imports,
        }
    }

    /// Fetch the remote roster and, if it changed, verify it against the
    /// prior baseline's admins, validate the update, and persist it.
    ///
    /// Returns `Ok(None)` on the idempotent no-change path.
    async fn fetch_and_update_roster(
        &self,
        prior: &Team,
        me: &Fingerprint,
    ) -> Result<Option<Team>, String> {
        let trusted = self
            .store
            .load(&prior.uuid)
            .map_err(|e| e.to_string())?
            .ok_or("trusted baseline disappeared mid-pass")?;

        let (roster, signature) = self
            .client
            .get_roster(&prior.uuid, me)
            .await
            .map_err(|e| format!("failed to download roster: {e}"))?;

        if roster == trusted.roster {
            tracing::debug!(team = %prior.uuid, "roster unchanged; nothing to do");
            return Ok(None);
        }

        // Resolve against the roster we already trust, never the new one.
        let admin_keys = resolve_admin_keys(prior, self.keyring, self.client)
            .await
            .map_err(|e| e.to_string())?;
        let signer = crate::crypto::verify::verify_roster(&roster, &signature, &admin_keys)
            .map_err(|e| e.to_string())?;

        let updated = Team::from_roster(&roster).map_err(|e| e.to_string())?;
        let superseded = self.store.superseded(&prior.uuid).map_err(|e| e.to_string())?;
        validate_update(prior, &updated, &signer, &superseded).map_err(|e| e.to_string())?;

        // Persist before use: the new baseline must be durable before
        // anything acts on the updated membership.
        self.store
            .save(&prior.uuid, &roster, &signature)
            .map_err(|e| e.to_string())?;
        self.store
            .mark_superseded(&prior.uuid, RosterDigest::of(&trusted.roster))
            .map_err(|e| e.to_string())?;

        tracing::info!(team = %prior.uuid, signer = %signer, "roster update verified and trusted");
        Ok(Some(updated))
    }

    /// Fetch and import every member's public key, continuing past
    /// individual failures.
    async fn import_member_keys(&self, team: &Team) -> Vec<KeyImportOutcome> {
        let mut outcomes = Vec::new();
        for person in &team.people {
            let result = self.import_key(person).await;
            if let Err(error) = &result {
                tracing::warn!(
                    email = %person.email,
                    fingerprint = %person.fingerprint,
                    %error,
                    "failed to import member key"
                );
            }
            outcomes.push(KeyImportOutcome {
                email: person.email.clone(),
                fingerprint: person.fingerprint.clone(),
                result,
            });
        }
        outcomes
    }

    async fn import_key(&self, person: &Person) -> Result<(), String> {
        let key = self
            .client
            .get_public_key(&person.fingerprint)
            .await
            .map_err(|e| e.to_string())?;
        if key.fingerprint() != &person.fingerprint {
            return Err(format!(
                "service returned key {} for fingerprint {}",
                key.fingerprint(),
                person.fingerprint
            ));
        }
        self.keyring.import(&key).map_err(|e| e.to_string())
    }
}
