//! The resolved jump host target and the host key policy.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// What to do with a host key that known_hosts does not vouch for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Only hosts already in known_hosts are accepted.
    Strict,

    /// Unknown hosts are accepted and logged; changed keys are rejected.
    /// known_hosts is never written.
    #[default]
    Warn,

    /// No checking at all.
    Disabled,
}

/// A jump host alias after SSH config resolution.
#[derive(Debug, Clone)]
pub struct SshTarget {
    /// The alias the target was resolved from.
    pub alias: String,

    pub host: String,

    pub port: u16,

    pub username: String,

    pub identity: Identity,
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// The key offered to the jump host.
#[derive(Debug, Clone)]
pub enum Identity {
    /// No identity file was found; only the `none` method is tried.
    None,

    Key {
        path: PathBuf,
        passphrase: Option<Arc<SecretString>>,
    },
}
