//! Host key trust policy

use russh::keys::PublicKey;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::error::{SshError, SshResult};

/// How a server's host key is checked during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept every host key (like `ssh -o StrictHostKeyChecking=no`)
    #[default]
    AcceptAny,
    /// Require the key to be listed in a known_hosts file.
    /// `None` means `~/.ssh/known_hosts`.
    KnownHosts(Option<PathBuf>),
    /// Require the key to equal this base64-encoded public key
    PublicKey(String),
}

impl HostKeyPolicy {
    /// Check `server_key` for `host:port`.
    ///
    /// Returns `Ok(true)` when the key is trusted and an error otherwise, so
    /// the rejection reason reaches the caller of `open`.
    pub fn verify(&self, host: &str, port: u16, server_key: &PublicKey) -> SshResult<bool> {
        let rejected = || SshError::HostKeyVerification {
            host: format!("{host}:{port}"),
        };

        match self {
            HostKeyPolicy::AcceptAny => {
                tracing::debug!(host = %host, port, "Host key checking disabled");
                Ok(true)
            }
            HostKeyPolicy::KnownHosts(path) => {
                let path = match path {
                    Some(path) => path.clone(),
                    None => default_known_hosts_path().ok_or_else(rejected)?,
                };
                match russh::keys::check_known_hosts_path(host, port, server_key, &path) {
                    Ok(true) => Ok(true),
                    Ok(false) => {
                        tracing::warn!(host = %host, port, known_hosts = %path.display(), "Host key not found in known_hosts");
                        Err(rejected())
                    }
                    Err(e) => {
                        tracing::warn!(host = %host, port, error = %e, "Host key check failed");
                        Err(rejected())
                    }
                }
            }
            HostKeyPolicy::PublicKey(expected) => {
                let expected = russh::keys::parse_public_key_base64(expected).map_err(|e| {
                    tracing::warn!(error = %e, "Pinned host key could not be parsed");
                    rejected()
                })?;
                if expected.key_data() == server_key.key_data() {
                    Ok(true)
                } else {
                    tracing::warn!(host = %host, port, "Host key does not match pinned key");
                    Err(rejected())
                }
            }
        }
    }
}

fn default_known_hosts_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no" | "false" | "accept-any" => Ok(Self::AcceptAny),
            "yes" | "true" | "known-hosts" => Ok(Self::KnownHosts(None)),
            other => Err(format!(
                "unknown host key policy '{other}' (expected 'no' or 'yes')"
            )),
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyPolicy::AcceptAny => write!(f, "no"),
            HostKeyPolicy::KnownHosts(None) => write!(f, "yes"),
            HostKeyPolicy::KnownHosts(Some(path)) => write!(f, "known-hosts:{}", path.display()),
            HostKeyPolicy::PublicKey(_) => write!(f, "pinned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::keys::{Algorithm, PrivateKey};
    use tempfile::TempDir;

    fn random_key() -> PublicKey {
        PrivateKey::random(&mut rand::rng(), Algorithm::Ed25519)
            .expect("host key")
            .public_key()
            .clone()
    }

    #[test]
    fn default_policy_accepts_any_key() {
        assert_eq!(HostKeyPolicy::default(), HostKeyPolicy::AcceptAny);
        assert!(
            HostKeyPolicy::AcceptAny
                .verify("example.com", 22, &random_key())
                .unwrap()
        );
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("no".parse::<HostKeyPolicy>(), Ok(HostKeyPolicy::AcceptAny));
        assert_eq!(
            "accept-any".parse::<HostKeyPolicy>(),
            Ok(HostKeyPolicy::AcceptAny)
        );
        assert_eq!(
            "yes".parse::<HostKeyPolicy>(),
            Ok(HostKeyPolicy::KnownHosts(None))
        );
        assert_eq!(
            "Known-Hosts".parse::<HostKeyPolicy>(),
            Ok(HostKeyPolicy::KnownHosts(None))
        );
        assert!("maybe".parse::<HostKeyPolicy>().is_err());
    }

    #[test]
    fn pinned_key_accepts_matching_key() {
        let key = random_key();
        let encoded = key.to_openssh().expect("encode key");
        let base64 = encoded.split_whitespace().nth(1).expect("base64 part");

        let policy = HostKeyPolicy::PublicKey(base64.to_string());
        assert!(policy.verify("example.com", 22, &key).unwrap());
    }

    #[test]
    fn pinned_key_rejects_other_key() {
        let pinned = random_key();
        let encoded = pinned.to_openssh().expect("encode key");
        let base64 = encoded.split_whitespace().nth(1).expect("base64 part");

        let policy = HostKeyPolicy::PublicKey(base64.to_string());
        let err = policy.verify("example.com", 22, &random_key()).unwrap_err();
        assert!(matches!(err, SshError::HostKeyVerification { ref host } if host == "example.com:22"));
    }

    #[test]
    fn known_hosts_rejects_unlisted_host() {
        let temp = TempDir::new().unwrap();
        let known_hosts = temp.path().join("known_hosts");
        std::fs::write(&known_hosts, "").unwrap();

        let policy = HostKeyPolicy::KnownHosts(Some(known_hosts));
        let err = policy.verify("example.com", 22, &random_key()).unwrap_err();
        assert!(matches!(err, SshError::HostKeyVerification { .. }));
    }
}
