//! SSH trust mesh: in-container commands and file payloads.

use anyhow::Result;

use crate::domain::context::KeyStore;

/// Generate an RSA key pair with no passphrase.
pub const KEYGEN_COMMAND: &str = "ssh-keygen -t rsa -N '' -f /root/.ssh/id_rsa";
/// Print the generated public key.
pub const READ_PUBLIC_KEY_COMMAND: &str = "cat /root/.ssh/id_rsa.pub";
/// Start the SSH daemon.
pub const START_DAEMON_COMMAND: &str = "service ssh start";

pub const AUTHORIZED_KEYS_PATH: &str = "/root/.ssh/authorized_keys";
pub const KNOWN_HOSTS_PATH: &str = "/root/.ssh/known_hosts";

/// Scan `host`'s SSH host keys, hashed.
#[must_use]
pub fn keyscan_command(host: &str) -> String {
    format!("ssh-keyscan -H {host}")
}

/// Validates an OpenSSH public key line: `<type> <base64-material> [comment]`.
///
/// # Errors
///
/// Returns an error if the key type is not an `ssh-`/`ecdsa-` type or the key
/// has no material after it.
pub fn validate_public_key(key: &str) -> Result<()> {
    let mut parts = key.split_whitespace();
    let kind = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("public key is empty"))?;
    anyhow::ensure!(
        kind.starts_with("ssh-") || kind.starts_with("ecdsa-"),
        "unsupported public key type (got: {kind:?})"
    );
    anyhow::ensure!(
        parts.next().is_some_and(|m| !m.is_empty()),
        "public key has no key material"
    );
    Ok(())
}

/// `authorized_keys` contents for `host`: every other host's key, one per line.
#[must_use]
pub fn authorized_keys_for(host: &str, keys: &KeyStore) -> String {
    keys.iter()
        .filter(|(h, _)| *h != host)
        .map(|(_, k)| format!("{}\n", k.trim_end()))
        .collect()
}
