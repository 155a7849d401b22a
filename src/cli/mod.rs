use clap::{Parser, Subcommand};
use std::path::PathBuf;
use teamsync::api::http::HttpClient;
use teamsync::keyring::Keyring;
use teamsync::requests::RequestStore;
use teamsync::store::RosterStore;

pub mod config;
pub mod edit;
pub mod fetch;
pub mod join;
pub mod keygen;
pub mod passphrase;

#[derive(Parser)]
#[command(name = "teamsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verified team roster synchronization", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize all teams: settle join requests, verify roster updates,
    /// import member keys
    Fetch {
        /// Path to config file (default: <data-dir>/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Data directory (default: platform data dir + "teamsync")
        #[arg(long)]
        data_dir: Option<String>,

        /// Path to file containing the key passphrase (non-interactive)
        #[arg(long)]
        passphrase_file: Option<String>,
    },

    /// Edit a team's roster in $EDITOR, sign it and publish it (admin only)
    Edit {
        /// UUID of the team to edit
        #[arg(long)]
        team: String,

        /// Path to config file (default: <data-dir>/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Data directory (default: platform data dir + "teamsync")
        #[arg(long)]
        data_dir: Option<String>,

        /// Path to file containing the key passphrase (non-interactive)
        #[arg(long)]
        passphrase_file: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Request to join a team, or withdraw a pending request
    Join {
        /// UUID of the team to join
        #[arg(long)]
        team: String,

        /// Email address to appear in the roster
        #[arg(long)]
        email: Option<String>,

        /// Fingerprint of the key to join with (defaults to the only local
        /// secret key)
        #[arg(long)]
        fingerprint: Option<String>,

        /// Withdraw the pending request instead of creating one
        #[arg(long)]
        withdraw: bool,

        /// Path to config file (default: <data-dir>/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Data directory (default: platform data dir + "teamsync")
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// Generate a new keypair, store it locally and publish the public half
    Keygen {
        /// Email address this key identifies
        #[arg(long)]
        email: String,

        /// Path to config file (default: <data-dir>/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Data directory (default: platform data dir + "teamsync")
        #[arg(long)]
        data_dir: Option<String>,

        /// Path to file containing the passphrase for the new key
        #[arg(long)]
        passphrase_file: Option<String>,
    },
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Fetch {
            config,
            data_dir,
            passphrase_file,
        } => fetch::execute(config, data_dir, passphrase_file).await,
        Commands::Edit {
            team,
            config,
            data_dir,
            passphrase_file,
            yes,
        } => edit::execute(team, config, data_dir, passphrase_file, yes).await,
        Commands::Join {
            team,
            email,
            fingerprint,
            withdraw,
            config,
            data_dir,
        } => join::execute(team, email, fingerprint, withdraw, config, data_dir).await,
        Commands::Keygen {
            email,
            config,
            data_dir,
            passphrase_file,
        } => keygen::execute(email, config, data_dir, passphrase_file).await,
    }
}

/// Everything a command needs: config, stores and the HTTP client.
pub struct Session {
    pub config: config::TeamsyncConfig,
    pub keyring: Keyring,
    pub store: RosterStore,
    pub requests: RequestStore,
    pub client: HttpClient,
}

/// Resolve paths, load (or create) the config, initialize logging and open
/// the on-disk stores.
pub fn open_session(
    config_path: Option<String>,
    data_dir: Option<String>,
) -> Result<Session, Box<dyn std::error::Error>> {
    let data_dir = data_dir
        .map(PathBuf::from)
        .unwrap_or_else(config::default_data_dir);
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(|| config::default_config_path(&data_dir));

    let config = if config_path.exists() {
        config::TeamsyncConfig::load(&config_path)?
    } else {
        config::TeamsyncConfig::create_default(&config_path, &data_dir)?;
        eprintln!("Created default config: {}", config_path.display());
        config::TeamsyncConfig::load(&config_path)?
    };

    init_logging(&config.logging.level);

    let keyring = Keyring::open(data_dir.join("keyring"))?;
    let store = RosterStore::open(data_dir.join("teams"))?;
    let requests = RequestStore::open(data_dir.join("requests.json"))?;
    let client = HttpClient::new(&config.api.base_url);

    Ok(Session {
        config,
        keyring,
        store,
        requests,
        client,
    })
}

/// Initialize tracing to stderr. `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_fetch_defaults() {
        let cli = Cli::parse_from(["teamsync", "fetch"]);

        match cli.command {
            Commands::Fetch {
                config,
                data_dir,
                passphrase_file,
            } => {
                assert_eq!(config, None);
                assert_eq!(data_dir, None);
                assert_eq!(passphrase_file, None);
            }
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_cli_parse_fetch_with_all_options() {
        let cli = Cli::parse_from([
            "teamsync",
            "fetch",
            "--config",
            "/etc/teamsync/config.toml",
            "--data-dir",
            "/var/lib/teamsync",
            "--passphrase-file",
            "/run/secrets/passphrase",
        ]);

        match cli.command {
            Commands::Fetch {
                config,
                data_dir,
                passphrase_file,
            } => {
                assert_eq!(config, Some("/etc/teamsync/config.toml".to_string()));
                assert_eq!(data_dir, Some("/var/lib/teamsync".to_string()));
                assert_eq!(passphrase_file, Some("/run/secrets/passphrase".to_string()));
            }
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_cli_parse_edit() {
        let cli = Cli::parse_from([
            "teamsync",
            "edit",
            "--team",
            "74bb40b4-3510-11e9-968e-53c38df634be",
            "--yes",
        ]);

        match cli.command {
            Commands::Edit { team, yes, .. } => {
                assert_eq!(team, "74bb40b4-3510-11e9-968e-53c38df634be");
                assert!(yes);
            }
            _ => panic!("Expected Edit command"),
        }
    }

    #[test]
    fn test_cli_parse_join() {
        let cli = Cli::parse_from([
            "teamsync",
            "join",
            "--team",
            "74bb40b4-3510-11e9-968e-53c38df634be",
            "--email",
            "me@example.com",
        ]);

        match cli.command {
            Commands::Join {
                team,
                email,
                fingerprint,
                withdraw,
                ..
            } => {
                assert_eq!(team, "74bb40b4-3510-11e9-968e-53c38df634be");
                assert_eq!(email, Some("me@example.com".to_string()));
                assert_eq!(fingerprint, None);
                assert!(!withdraw);
            }
            _ => panic!("Expected Join command"),
        }
    }

    #[test]
    fn test_cli_parse_join_withdraw() {
        let cli = Cli::parse_from([
            "teamsync",
            "join",
            "--team",
            "74bb40b4-3510-11e9-968e-53c38df634be",
            "--withdraw",
        ]);

        match cli.command {
            Commands::Join { withdraw, email, .. } => {
                assert!(withdraw);
                assert_eq!(email, None);
            }
            _ => panic!("Expected Join command"),
        }
    }

    #[test]
    fn test_cli_parse_keygen() {
        let cli = Cli::parse_from(["teamsync", "keygen", "--email", "me@example.com"]);

        match cli.command {
            Commands::Keygen { email, .. } => {
                assert_eq!(email, "me@example.com");
            }
            _ => panic!("Expected Keygen command"),
        }
    }
}
