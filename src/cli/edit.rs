//! `teamsync edit`: open the team roster in $EDITOR, validate the result,
//! sign it and publish it.
//!
//! The published signature covers the canonical re-serialization of the
//! edited document, not the raw editor bytes, so whitespace and comments in
//! the editor never affect verification.

use super::passphrase::{determine_passphrase_source, SourcePrompter};
use super::Session;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use teamsync::api::{JoinRequestSummary, RemoteClient};
use teamsync::keyring::Keyring;
use teamsync::team::validate::validate_update;
use teamsync::team::{Fingerprint, Person, RosterDigest, Team, TeamUuid};

pub async fn execute(
    team: String,
    config_path: Option<String>,
    data_dir: Option<String>,
    passphrase_file: Option<String>,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let team_uuid = TeamUuid::from_str(&team).map_err(|_| format!("Invalid team UUID: {team}"))?;

    let Session {
        keyring,
        store,
        client,
        ..
    } = super::open_session(config_path, data_dir)?;

    let trusted = store
        .load(&team_uuid)?
        .ok_or("No trusted roster for this team. Run `teamsync fetch` first.")?;
    let prior = Team::from_roster(&trusted.roster)?;

    let me = my_admin_fingerprint(&prior, &keyring)?;

    // Pending join requests are appended as comments so the admin can
    // approve one by copying it into the roster.
    let pending = match client.list_join_requests(&team_uuid, &me).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!(error = %e, "could not list pending join requests");
            Vec::new()
        }
    };

    let edited = edit_in_editor(&trusted.roster, &pending)?;
    let updated = Team::from_roster(&edited)?;
    let canonical = updated.roster();

    if canonical == prior.roster() {
        println!("No changes made.");
        return Ok(());
    }

    let superseded = store.superseded(&team_uuid)?;
    validate_update(&prior, &updated, &me, &superseded)?;

    print_changes(&prior, &updated);
    if !yes && !confirm("Sign and publish this roster? [y/N] ")? {
        println!("Aborted; nothing was published.");
        return Ok(());
    }

    let prompter = SourcePrompter::new(determine_passphrase_source(passphrase_file));
    let unlocked = keyring.unlock(&me, &prompter)?;
    let signature = unlocked.sign(&canonical);

    client.put_roster(&canonical, &signature, &me).await?;
    store.save(&team_uuid, &canonical, &signature)?;
    store.mark_superseded(&team_uuid, RosterDigest::of(&trusted.roster))?;

    discard_approved_requests(&client, &updated, &pending).await;

    println!("✔ Published new roster for {} ({})", updated.name, team_uuid);
    Ok(())
}

/// The signing identity: a member whose secret key we hold and who is an
/// admin of the current roster.
fn my_admin_fingerprint(
    team: &Team,
    keyring: &Keyring,
) -> Result<Fingerprint, Box<dyn std::error::Error>> {
    let secrets = keyring.secret_fingerprints()?;
    team.admins()
        .map(|p| &p.fingerprint)
        .find(|fp| secrets.contains(fp))
        .cloned()
        .ok_or_else(|| "None of your keys is an admin of this team".into())
}

/// Write the roster (plus pending requests as comments) to a temp file, run
/// the editor on it, and read the result back.
fn edit_in_editor(
    roster: &[u8],
    pending: &[JoinRequestSummary],
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut tmp = tempfile::Builder::new()
        .prefix("teamsync-roster-")
        .suffix(".toml")
        .tempfile()?;
    tmp.write_all(roster)?;
    if !pending.is_empty() {
        writeln!(tmp)?;
        writeln!(tmp, "# Pending requests to join this team.")?;
        writeln!(tmp, "# To approve one, uncomment its [[person]] block.")?;
        for request in pending {
            writeln!(tmp, "#")?;
            writeln!(tmp, "# [[person]]")?;
            writeln!(tmp, "# email = \"{}\"", request.email)?;
            writeln!(tmp, "# fingerprint = \"{}\"", request.fingerprint)?;
        }
    }
    tmp.flush()?;

    run_editor(tmp.path())?;

    let edited = std::fs::read(tmp.path())?;
    Ok(edited)
}

fn run_editor(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = Command::new(&editor)
        .arg(path)
        .status()
        .map_err(|e| format!("Failed to launch editor '{}': {}", editor, e))?;
    if !status.success() {
        return Err(format!("Editor '{}' exited with {}", editor, status).into());
    }
    Ok(())
}

fn print_changes(before: &Team, after: &Team) {
    for person in &after.people {
        match before.person(&person.fingerprint) {
            None => println!("  + {} ({})", person.email, person.fingerprint),
            Some(prior) if prior != person => {
                println!("  ~ {} ({})", person.email, person.fingerprint)
            }
            Some(_) => {}
        }
    }
    for person in &before.people {
        if after.person(&person.fingerprint).is_none() {
            println!("  - {} ({})", person.email, person.fingerprint);
        }
    }
}

fn confirm(prompt: &str) -> Result<bool, Box<dyn std::error::Error>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

/// Delete the server-side join requests for people who are now members.
/// Failures here are cosmetic; the server expires stale requests itself.
async fn discard_approved_requests(
    client: &dyn RemoteClient,
    updated: &Team,
    pending: &[JoinRequestSummary],
) {
    for request in pending {
        if let Some(Person { fingerprint, .. }) = updated.person(&request.fingerprint) {
            if let Err(e) = client.delete_join_request(&updated.uuid, fingerprint).await {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "could not discard approved join request"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamsync::crypto::{generate_keypair, seal_secret_key};
    use tempfile::TempDir;

    fn fp(seed: u8) -> Fingerprint {
        Fingerprint::of_public_key(&[seed; 32])
    }

    fn team_of(people: Vec<Person>) -> Team {
        Team {
            uuid: TeamUuid::new(),
            name: "Acme".to_string(),
            people,
        }
    }

    #[test]
    fn test_my_admin_fingerprint_requires_secret_admin_key() {
        let dir = TempDir::new().unwrap();
        let keyring = Keyring::open(dir.path()).unwrap();

        let (pkcs8, public) = generate_keypair().unwrap();
        let sealed = seal_secret_key(&pkcs8, "pw").unwrap();
        keyring.store_secret(&sealed, public.fingerprint()).unwrap();

        // Our key is only a plain member.
        let team = team_of(vec![
            Person {
                email: "admin@example.com".to_string(),
                fingerprint: fp(1),
                is_admin: true,
            },
            Person {
                email: "me@example.com".to_string(),
                fingerprint: public.fingerprint().clone(),
                is_admin: false,
            },
        ]);
        assert!(my_admin_fingerprint(&team, &keyring).is_err());

        // Promote it and the lookup succeeds.
        let mut team = team;
        team.people[1].is_admin = true;
        let me = my_admin_fingerprint(&team, &keyring).unwrap();
        assert_eq!(&me, public.fingerprint());
    }

    #[test]
    fn test_pending_requests_rendered_as_comments() {
        let team = team_of(vec![Person {
            email: "admin@example.com".to_string(),
            fingerprint: fp(1),
            is_admin: true,
        }]);
        let pending = vec![JoinRequestSummary {
            fingerprint: fp(2),
            email: "joiner@example.com".to_string(),
        }];

        // "cat" leaves the file untouched, so we get back exactly what was
        // written for the editor.
        std::env::set_var("EDITOR", "cat");
        let edited = edit_in_editor(&team.roster(), &pending).unwrap();
        let text = String::from_utf8(edited.clone()).unwrap();

        assert!(text.contains("# [[person]]"));
        assert!(text.contains("# email = \"joiner@example.com\""));

        // The commented block must not change the parsed team.
        let parsed = Team::from_roster(&edited).unwrap();
        assert_eq!(parsed, team);
    }
}
