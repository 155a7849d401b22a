//! `teamsync keygen`: generate a keypair, store it passphrase-locked, and
//! publish the public half.

use super::passphrase::{determine_passphrase_source, read_new_passphrase};
use teamsync::api::RemoteClient;
use teamsync::crypto::{generate_keypair, seal_secret_key};
use zeroize::Zeroizing;

pub async fn execute(
    email: String,
    config_path: Option<String>,
    data_dir: Option<String>,
    passphrase_file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = super::open_session(config_path, data_dir)?;

    let source = determine_passphrase_source(passphrase_file);
    let passphrase = Zeroizing::new(read_new_passphrase(&source)?);

    let (pkcs8, public) = generate_keypair()?;
    let pkcs8 = Zeroizing::new(pkcs8);
    let sealed = seal_secret_key(&pkcs8, &passphrase)?;

    // Local state first: a published key we can't sign with is useless,
    // an unpublished local key can be re-published later.
    session.keyring.store_secret(&sealed, public.fingerprint())?;
    session.keyring.import(&public)?;

    if let Err(e) = session.client.publish_public_key(&public).await {
        tracing::warn!(error = %e, "could not publish public key");
        println!("⚠ Key created but not published: {}", e);
        println!("  It will be published the next time you run `teamsync join`.");
    }

    println!("✔ Generated key for {}", email);
    println!("  Fingerprint: {}", public.fingerprint());
    Ok(())
}
