//! `teamsync join`: ask to join a team, or withdraw a pending request.
//!
//! Joining publishes our public key (so an admin can fetch and verify it),
//! files the request with the service, and records it locally so `fetch`
//! can poll until an admin decides or the request expires.

use super::Session;
use std::str::FromStr;
use teamsync::api::RemoteClient;
use teamsync::keyring::Keyring;
use teamsync::requests::RequestToJoinTeam;
use teamsync::team::{Fingerprint, TeamUuid};

pub async fn execute(
    team: String,
    email: Option<String>,
    fingerprint: Option<String>,
    withdraw: bool,
    config_path: Option<String>,
    data_dir: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let team_uuid = TeamUuid::from_str(&team).map_err(|_| format!("Invalid team UUID: {team}"))?;

    let session = super::open_session(config_path, data_dir)?;

    if withdraw {
        return withdraw_request(&session, &team_uuid).await;
    }

    let email = email.ok_or("--email is required when requesting to join")?;
    let fingerprint = select_key(&session.keyring, fingerprint)?;

    // Publish our key first: an approval is useless if the admin cannot
    // fetch the key to put in the roster.
    let public = session.keyring.lookup(&fingerprint)?;
    session.client.publish_public_key(&public).await?;

    session
        .client
        .create_join_request(&team_uuid, &fingerprint, &email)
        .await?;

    let request = RequestToJoinTeam::new(team_uuid, fingerprint.clone(), email.clone());
    session.requests.add(request)?;

    println!("✔ Requested to join team {} as {}", team_uuid, email);
    println!("  Key fingerprint: {}", fingerprint);
    println!("  Run `teamsync fetch` periodically; an admin has 7 days to approve.");
    Ok(())
}

async fn withdraw_request(
    session: &Session,
    team: &TeamUuid,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = session
        .requests
        .list()?
        .into_iter()
        .find(|r| &r.team_uuid == team)
        .ok_or_else(|| format!("No pending join request for team {team}"))?;

    session
        .client
        .delete_join_request(team, &request.fingerprint)
        .await?;
    session.requests.remove(team, &request.fingerprint)?;

    println!("✔ Withdrew join request for team {}", team);
    Ok(())
}

/// Pick the key to join with: the one named on the command line, or the
/// only local secret key.
fn select_key(
    keyring: &Keyring,
    fingerprint: Option<String>,
) -> Result<Fingerprint, Box<dyn std::error::Error>> {
    if let Some(s) = fingerprint {
        return Ok(Fingerprint::parse(&s)?);
    }

    let mut secrets = keyring.secret_fingerprints()?;
    match secrets.len() {
        0 => Err("No local key found. Run `teamsync keygen` first.".into()),
        1 => Ok(secrets.remove(0)),
        _ => Err("Multiple local keys found; pick one with --fingerprint".into()),
    }
}
