//! Local keyring: public keys and passphrase-locked secret keys on disk.
//!
//! Layout under the keyring directory:
//! - `<fingerprint>.pub` - armored (hex) public key
//! - `<fingerprint>.key` - JSON [`EncryptedSecretKey`], mode 0600
//!
//! `lookup` distinguishes a typed not-found from hard errors so the admin
//! key resolver can fall through to a remote fetch on not-found but abort
//! on anything else.

use crate::crypto::{
    open_secret_key, CryptoError, EncryptedSecretKey, PublicKey, UnlockedKey,
};
use crate::team::Fingerprint;
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum KeyringError {
    /// No public key stored for this fingerprint (the resolver's
    /// "try the next source" signal).
    #[error("key {0} not found in local keyring")]
    NotFound(Fingerprint),

    /// No secret key stored for this fingerprint.
    #[error("no secret key stored for {0}")]
    NoSecretKey(Fingerprint),

    /// The secret key exists but could not be unlocked.
    #[error("key {0} is locked: wrong or missing passphrase")]
    KeyLocked(Fingerprint),

    /// Stored key material is corrupt or does not match its fingerprint.
    #[error("malformed key material for {0}: {1}")]
    Malformed(Fingerprint, String),

    /// The password prompt failed or was aborted.
    #[error("password prompt failed: {0}")]
    Prompt(String),

    #[error("keyring i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability for obtaining a passphrase.
///
/// The interactive implementation lives in the CLI; automated runs supply a
/// file- or environment-backed source instead.
pub trait PasswordPrompter: Send + Sync {
    /// Ask for the passphrase, with `context` naming the key being unlocked.
    fn prompt(&self, context: &str) -> Result<String, KeyringError>;
}

/// A fixed passphrase, for tests and non-interactive credentials.
pub struct StaticPrompter(pub String);

impl PasswordPrompter for StaticPrompter {
    fn prompt(&self, _context: &str) -> Result<String, KeyringError> {
        Ok(self.0.clone())
    }
}

/// On-disk keyring rooted at a directory.
pub struct Keyring {
    dir: PathBuf,
}

impl Keyring {
    /// Open (creating if necessary) a keyring at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KeyringError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn public_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.pub", fingerprint.hex()))
    }

    fn secret_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.key", fingerprint.hex()))
    }

    /// Look up a public key. `NotFound` is the only soft failure.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Result<PublicKey, KeyringError> {
        let path = self.public_path(fingerprint);
        if !path.exists() {
            return Err(KeyringError::NotFound(fingerprint.clone()));
        }

        let armored = fs::read_to_string(&path)?;
        let key = PublicKey::from_hex(&armored)
            .map_err(|e| KeyringError::Malformed(fingerprint.clone(), e.to_string()))?;

        if key.fingerprint() != fingerprint {
            return Err(KeyringError::Malformed(
                fingerprint.clone(),
                format!("stored key has fingerprint {}", key.fingerprint()),
            ));
        }
        Ok(key)
    }

    /// Import (or overwrite) a public key.
    pub fn import(&self, key: &PublicKey) -> Result<(), KeyringError> {
        let path = self.public_path(key.fingerprint());
        fs::write(path, key.to_hex())?;
        Ok(())
    }

    /// Store a secret key encrypted under `passphrase`, file mode 0600.
    pub fn store_secret(
        &self,
        sealed: &EncryptedSecretKey,
        fingerprint: &Fingerprint,
    ) -> Result<(), KeyringError> {
        let json = serde_json::to_vec(sealed)
            .map_err(|e| KeyringError::Malformed(fingerprint.clone(), e.to_string()))?;
        write_private(&self.secret_path(fingerprint), &json)?;
        Ok(())
    }

    /// Unlock the secret key for `fingerprint`, prompting for the passphrase.
    pub fn unlock(
        &self,
        fingerprint: &Fingerprint,
        prompter: &dyn PasswordPrompter,
    ) -> Result<UnlockedKey, KeyringError> {
        let path = self.secret_path(fingerprint);
        if !path.exists() {
            return Err(KeyringError::NoSecretKey(fingerprint.clone()));
        }

        let json = fs::read(&path)?;
        let sealed: EncryptedSecretKey = serde_json::from_slice(&json)
            .map_err(|e| KeyringError::Malformed(fingerprint.clone(), e.to_string()))?;

        let passphrase = Zeroizing::new(prompter.prompt(fingerprint.hex())?);
        let pkcs8 = Zeroizing::new(match open_secret_key(&sealed, &passphrase) {
            Ok(pkcs8) => pkcs8,
            Err(CryptoError::KeyLocked) => {
                return Err(KeyringError::KeyLocked(fingerprint.clone()))
            }
            Err(e) => return Err(KeyringError::Malformed(fingerprint.clone(), e.to_string())),
        });

        let unlocked = UnlockedKey::from_pkcs8(&pkcs8)
            .map_err(|e| KeyringError::Malformed(fingerprint.clone(), e.to_string()))?;

        if unlocked.fingerprint() != fingerprint {
            return Err(KeyringError::Malformed(
                fingerprint.clone(),
                format!("stored key has fingerprint {}", unlocked.fingerprint()),
            ));
        }
        Ok(unlocked)
    }

    /// Fingerprints of all keys we hold secret material for. These are the
    /// identities whose team memberships get synchronized.
    pub fn secret_fingerprints(&self) -> Result<Vec<Fingerprint>, KeyringError> {
        let mut fingerprints = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("key") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(fp) = Fingerprint::parse(stem) {
                    fingerprints.push(fp);
                }
            }
        }
        fingerprints.sort_by(|a, b| a.hex().cmp(b.hex()));
        Ok(fingerprints)
    }
}

/// Write a file readable only by the owner (mode 0600).
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}
