//! Passphrase delivery for key unlock.
//!
//! Three sources, checked in order: a file named on the command line, the
//! `TEAMSYNC_PASSPHRASE` environment variable, then an interactive masked
//! prompt. Scheduled runs use the file or the environment; the prompt is the
//! interactive default.

use std::fs;
use std::path::Path;
use teamsync::keyring::{KeyringError, PasswordPrompter};

/// Environment variable consulted when no passphrase file is given.
pub const PASSPHRASE_ENV_VAR: &str = "TEAMSYNC_PASSPHRASE";

/// Modes for passphrase delivery
#[derive(Debug, Clone)]
pub enum PassphraseSource {
    /// From --passphrase-file /path/to/file
    File(String),
    /// From stdin prompt (interactive, masked input)
    Stdin,
    /// From TEAMSYNC_PASSPHRASE env var
    EnvVar,
}

/// Determine passphrase source from CLI arguments
///
/// 1. If passphrase_file is Some, use File
/// 2. If TEAMSYNC_PASSPHRASE is set, use EnvVar
/// 3. Otherwise, use Stdin
pub fn determine_passphrase_source(passphrase_file: Option<String>) -> PassphraseSource {
    if let Some(file) = passphrase_file {
        PassphraseSource::File(file)
    } else if std::env::var(PASSPHRASE_ENV_VAR).is_ok() {
        PassphraseSource::EnvVar
    } else {
        PassphraseSource::Stdin
    }
}

/// Read a passphrase from the given source.
pub fn read_passphrase(
    source: &PassphraseSource,
    prompt: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    match source {
        PassphraseSource::File(path) => {
            if !Path::new(path).exists() {
                return Err(format!("Passphrase file not found: {}", path).into());
            }

            let passphrase = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read passphrase file: {}", e))?
                .trim()
                .to_string();

            if passphrase.is_empty() {
                return Err("Passphrase file is empty".into());
            }

            Ok(passphrase)
        }
        PassphraseSource::Stdin => {
            let passphrase = rpassword::prompt_password(prompt)
                .map_err(|e| format!("Failed to read passphrase from stdin: {}", e))?;

            if passphrase.is_empty() {
                return Err("Passphrase cannot be empty".into());
            }

            Ok(passphrase)
        }
        PassphraseSource::EnvVar => std::env::var(PASSPHRASE_ENV_VAR)
            .map_err(|_| format!("{} env var not set", PASSPHRASE_ENV_VAR).into()),
    }
}

/// Prompt twice for a brand-new passphrase and require the entries to match.
/// File and env sources are read once without confirmation.
pub fn read_new_passphrase(
    source: &PassphraseSource,
) -> Result<String, Box<dyn std::error::Error>> {
    match source {
        PassphraseSource::Stdin => {
            let first = read_passphrase(source, "Passphrase for the new key: ")?;
            let second = read_passphrase(source, "Repeat passphrase: ")?;
            if first != second {
                return Err("Passphrases did not match".into());
            }
            Ok(first)
        }
        _ => read_passphrase(source, ""),
    }
}

/// [`PasswordPrompter`] backed by a [`PassphraseSource`], for handing to the
/// sync engine.
pub struct SourcePrompter {
    source: PassphraseSource,
}

impl SourcePrompter {
    pub fn new(source: PassphraseSource) -> Self {
        Self { source }
    }
}

impl PasswordPrompter for SourcePrompter {
    fn prompt(&self, context: &str) -> Result<String, KeyringError> {
        let prompt = format!("Passphrase for key {}: ", context);
        read_passphrase(&self.source, &prompt).map_err(|e| KeyringError::Prompt(e.to_string()))
    }
}
