//! Key material and detached signatures.
//!
//! Signing and verification delegate to `ring` (Ed25519). Secret keys are
//! PKCS#8 documents encrypted at rest with AES-256-GCM under a key derived
//! from the owner's passphrase via HKDF-SHA256; a failed decryption is
//! indistinguishable from a wrong passphrase and surfaces as [`CryptoError::KeyLocked`].

use crate::team::Fingerprint;
use hkdf::Hkdf;
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

pub mod verify;

/// Domain separation string for the passphrase-derived storage key.
const SECRET_KEY_CONTEXT: &[u8] = b"teamsync-secret-key-v1";

/// Salt length for passphrase key derivation.
const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key bytes could not be parsed as a valid key.
    #[error("malformed key material: {0}")]
    MalformedKey(String),

    /// A private-key operation was attempted but the stored key could not
    /// be unlocked (wrong or missing passphrase).
    #[error("secret key is locked: wrong or missing passphrase")]
    KeyLocked,

    /// Key generation failed (entropy source unavailable).
    #[error("key generation failed")]
    Generation,
}

/// An Ed25519 public key plus its derived fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    fingerprint: Fingerprint,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Wrap raw Ed25519 public key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::MalformedKey(format!(
                "expected 32 byte Ed25519 key, got {}",
                bytes.len()
            )));
        }
        let fingerprint = Fingerprint::of_public_key(&bytes);
        Ok(Self { fingerprint, bytes })
    }

    /// Parse the armored (hex) transport form.
    pub fn from_hex(armored: &str) -> Result<Self, CryptoError> {
        let bytes =
            hex::decode(armored.trim()).map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Armored (hex) transport form.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A detached signature over a roster's canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// An unlocked signing key, held in memory only.
pub struct UnlockedKey {
    fingerprint: Fingerprint,
    keypair: Ed25519KeyPair,
}

impl UnlockedKey {
    /// Load from a decrypted PKCS#8 document.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, CryptoError> {
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let fingerprint = Fingerprint::of_public_key(keypair.public_key().as_ref());
        Ok(Self {
            fingerprint,
            keypair,
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            fingerprint: self.fingerprint.clone(),
            bytes: self.keypair.public_key().as_ref().to_vec(),
        }
    }

    /// Produce a detached signature over the given bytes.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.keypair.sign(message).as_ref().to_vec())
    }
}

/// Generate a fresh Ed25519 key pair.
///
/// Returns the PKCS#8 document (to be sealed with [`seal_secret_key`]) and
/// the corresponding public key.
pub fn generate_keypair() -> Result<(Vec<u8>, PublicKey), CryptoError> {
    let rng = SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| CryptoError::Generation)?;
    let keypair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
    let public = PublicKey::from_bytes(keypair.public_key().as_ref().to_vec())?;
    Ok((pkcs8.as_ref().to_vec(), public))
}

/// A secret key encrypted under a passphrase, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSecretKey {
    /// HKDF salt for passphrase key derivation (16 bytes)
    pub salt: Vec<u8>,
    /// AES-256-GCM nonce (12 bytes)
    pub nonce: Vec<u8>,
    /// PKCS#8 document ciphertext with appended GCM tag
    pub ciphertext: Vec<u8>,
}

fn derive_storage_key(passphrase: &str, salt: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(salt), passphrase.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(SECRET_KEY_CONTEXT, &mut key)
        .expect("HKDF expand should never fail with valid length");
    key
}

/// Encrypt a PKCS#8 secret key document under a passphrase.
pub fn seal_secret_key(pkcs8: &[u8], passphrase: &str) -> Result<EncryptedSecretKey, CryptoError> {
    let mut salt = vec![0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut nonce_bytes = vec![0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let key = Zeroizing::new(derive_storage_key(passphrase, &salt));
    let unbound = UnboundKey::new(&AES_256_GCM, key.as_ref())
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
    let sealing = LessSafeKey::new(unbound);

    let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
    let mut in_out = pkcs8.to_vec();
    sealing
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Generation)?;

    Ok(EncryptedSecretKey {
        salt,
        nonce: nonce_bytes,
        ciphertext: in_out,
    })
}

/// Decrypt a stored secret key with the given passphrase.
///
/// Any authentication failure is reported as [`CryptoError::KeyLocked`]:
/// AES-GCM cannot distinguish a wrong passphrase from tampered ciphertext,
/// and neither should be unlocked.
pub fn open_secret_key(
    sealed: &EncryptedSecretKey,
    passphrase: &str,
) -> Result<Vec<u8>, CryptoError> {
    let key = Zeroizing::new(derive_storage_key(passphrase, &sealed.salt));
    let unbound = UnboundKey::new(&AES_256_GCM, key.as_ref())
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
    let opening = LessSafeKey::new(unbound);

    let nonce = Nonce::try_assume_unique_for_key(&sealed.nonce)
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
    let mut in_out = sealed.ciphertext.clone();
    let plaintext = opening
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::KeyLocked)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keypair_fingerprint_matches_public_key() {
        let (pkcs8, public) = generate_keypair().unwrap();
        let unlocked = UnlockedKey::from_pkcs8(&pkcs8).unwrap();

        assert_eq!(unlocked.fingerprint(), public.fingerprint());
        assert_eq!(unlocked.public_key(), public);
    }

    #[test]
    fn test_public_key_hex_round_trip() {
        let (_, public) = generate_keypair().unwrap();
        let parsed = PublicKey::from_hex(&public.to_hex()).unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn test_public_key_rejects_wrong_length() {
        assert!(matches!(
            PublicKey::from_bytes(vec![0u8; 16]),
            Err(CryptoError::MalformedKey(_))
        ));
        assert!(PublicKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_signature_hex_round_trip() {
        let sig = Signature::from_bytes(vec![1, 2, 3, 4]);
        assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);
    }

    #[test]
    fn test_seal_and_open_secret_key() {
        let (pkcs8, _) = generate_keypair().unwrap();
        let sealed = seal_secret_key(&pkcs8, "correct horse").unwrap();

        let opened = open_secret_key(&sealed, "correct horse").unwrap();
        assert_eq!(opened, pkcs8, "decrypted key must match the original");
    }

    #[test]
    fn test_open_with_wrong_passphrase_is_locked() {
        let (pkcs8, _) = generate_keypair().unwrap();
        let sealed = seal_secret_key(&pkcs8, "correct horse").unwrap();

        let result = open_secret_key(&sealed, "battery staple");
        assert!(
            matches!(result, Err(CryptoError::KeyLocked)),
            "wrong passphrase must surface as KeyLocked"
        );
    }

    #[test]
    fn test_sealing_is_salted() {
        let (pkcs8, _) = generate_keypair().unwrap();
        let a = seal_secret_key(&pkcs8, "pass").unwrap();
        let b = seal_secret_key(&pkcs8, "pass").unwrap();
        assert_ne!(
            a.ciphertext, b.ciphertext,
            "fresh salt and nonce must randomize the ciphertext"
        );
    }

    #[test]
    fn test_tampered_ciphertext_is_locked() {
        let (pkcs8, _) = generate_keypair().unwrap();
        let mut sealed = seal_secret_key(&pkcs8, "pass").unwrap();
        sealed.ciphertext[0] ^= 0xff;

        assert!(matches!(
            open_secret_key(&sealed, "pass"),
            Err(CryptoError::KeyLocked)
        ));
    }
}
