//! `teamsync fetch`: one full synchronization pass.
//!
//! Designed to be safe under cron: partial failure never aborts the pass,
//! and a non-zero exit only signals that at least one item needs attention.

use super::passphrase::{determine_passphrase_source, SourcePrompter};
use super::Session;
use teamsync::sync::{
    MembershipOutcome, RequestOutcome, RosterOutcome, SyncReport, Syncer,
};

pub async fn execute(
    config_path: Option<String>,
    data_dir: Option<String>,
    passphrase_file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Session {
        keyring,
        store,
        requests,
        client,
        ..
    } = super::open_session(config_path, data_dir)?;

    let prompter = SourcePrompter::new(determine_passphrase_source(passphrase_file));

    let syncer = Syncer {
        client: &client,
        keyring: &keyring,
        store: &store,
        requests: &requests,
        prompter: &prompter,
    };
    let report = syncer.run().await?;

    print_report(&report);

    if report.has_errors() {
        return Err("Synchronization completed with errors (see above)".into());
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if let Some(error) = &report.request_store_error {
        println!("✗ Could not read pending join requests: {}", error);
    }
    for outcome in &report.requests {
        print_request(outcome);
    }
    for outcome in &report.memberships {
        print_membership(outcome);
    }
    if report.requests.is_empty()
        && report.memberships.is_empty()
        && report.request_store_error.is_none()
    {
        println!("Nothing to synchronize: no pending requests and no team memberships.");
        println!("Use `teamsync join` to request access to a team.");
    }
}

fn print_request(outcome: &RequestOutcome) {
    match outcome {
        RequestOutcome::StillPending { team } => {
            println!("… Join request for team {} is awaiting approval", team);
        }
        RequestOutcome::Approved { team } => {
            println!("✔ Join request for team {} approved; roster trusted", team);
        }
        RequestOutcome::Expired { team } => {
            println!(
                "✗ Join request for team {} expired after 7 days and was discarded",
                team
            );
            println!("  Ask an admin to approve sooner, then run `teamsync join` again.");
        }
        RequestOutcome::Failed { team, error } => {
            println!("✗ Join request for team {}: {}", team, error);
        }
    }
}

fn print_membership(outcome: &MembershipOutcome) {
    let label = if outcome.team_name.is_empty() {
        outcome.team.to_string()
    } else {
        format!("{} ({})", outcome.team_name, outcome.team)
    };

    match &outcome.roster {
        RosterOutcome::Updated => println!("✔ {}: roster updated", label),
        RosterOutcome::Unchanged => println!("✔ {}: up to date", label),
        RosterOutcome::Failed { error } => println!("✗ {}: {}", label, error),
    }

    for import in &outcome.key_imports {
        if let Err(error) = &import.result {
            println!(
                "  ✗ key for {} ({}): {}",
                import.email, import.fingerprint, error
            );
        }
    }
}
