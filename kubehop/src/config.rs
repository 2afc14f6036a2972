//! Explicit configuration passed to sessions, operations and the dispatcher.
//!
//! Every value has a default matching the original deployment, can be
//! overridden from the environment with [`Config::from_env`], or
//! deserialized with serde from whatever the host application stores.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::sanitize::validate_identifier;
use crate::transport::HostKeyVerification;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The three hops from the jump host to the service account.
    pub chain: HostChain,

    /// How the jump host connection is made.
    pub ssh: SshSettings,

    /// Prompt and polling timings.
    pub timeouts: Timeouts,

    /// Kubernetes namespace and log options.
    pub kube: KubeSettings,

    /// Metrics polling cadence and retry limits.
    pub metrics: MetricsPolicy,
}

impl Config {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Recognized keys: `ARGO_JUMP_HOST`, `ARGO_INTERNAL_HOST`,
    /// `ARGO_SERVICE_ACCOUNT`, `ARGO_NAMESPACE`,
    /// `ARGO_STRICT_HOST_KEY_CHECKING`, `SSH_CONFIG_PATH`, `ARGO_SSH_FOLDER`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("ARGO_JUMP_HOST") {
            config.chain.jump_host = host;
        }
        if let Some(host) = lookup("ARGO_INTERNAL_HOST") {
            config.chain.internal_host = host;
        }
        if let Some(account) = lookup("ARGO_SERVICE_ACCOUNT") {
            config.chain.service_account = account;
        }
        if let Some(namespace) = lookup("ARGO_NAMESPACE") {
            config.kube.namespace = namespace;
        }
        if let Some(value) = lookup("ARGO_STRICT_HOST_KEY_CHECKING") {
            let strict = parse_flag("ARGO_STRICT_HOST_KEY_CHECKING", &value)?;
            config.ssh.host_key_verification = if strict {
                HostKeyVerification::Strict
            } else {
                HostKeyVerification::Warn
            };
        }
        if let Some(path) = lookup("SSH_CONFIG_PATH") {
            config.ssh.config_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("ARGO_SSH_FOLDER") {
            config.ssh.key_dir = Some(PathBuf::from(dir));
        }

        debug!(
            "Configuration: jump={} internal={} account={} namespace={}",
            config.chain.jump_host,
            config.chain.internal_host,
            config.chain.service_account,
            config.kube.namespace
        );

        config.validate()?;
        Ok(config)
    }

    /// Check every value that ends up in remote command text.
    pub fn validate(&self) -> Result<()> {
        self.chain.validate()?;
        validate_identifier("namespace", &self.kube.namespace)?;
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
        .into()),
    }
}

/// The hop chain: jump host alias, internal host, elevated service account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostChain {
    /// SSH config alias of the jump host.
    pub jump_host: String,

    /// Host reached with `ssh` from the jump host.
    pub internal_host: String,

    /// Account reached with `sudo su -` on the internal host.
    pub service_account: String,
}

impl Default for HostChain {
    fn default() -> Self {
        Self {
            jump_host: "usejump".to_string(),
            internal_host: "10.0.34.231".to_string(),
            service_account: "solutions01-prod-us-east-1-eks".to_string(),
        }
    }
}

impl HostChain {
    /// Reject hop values that are unsafe to type into a shell.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("jump host", &self.jump_host)?;
        validate_identifier("internal host", &self.internal_host)?;
        validate_identifier("service account", &self.service_account)?;
        Ok(())
    }

    /// The in-shell hops performed after the jump host shell is open.
    pub fn hops(&self) -> [Hop<'_>; 2] {
        [
            Hop::Internal(&self.internal_host),
            Hop::Elevate(&self.service_account),
        ]
    }
}

/// One in-shell hop of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop<'a> {
    /// `ssh <host>` from the jump host.
    Internal(&'a str),

    /// `sudo su - <account>` on the internal host.
    Elevate(&'a str),
}

impl Hop<'_> {
    /// The command typed into the shell.
    pub fn command(&self) -> String {
        match self {
            Hop::Internal(host) => format!("ssh {}", host),
            Hop::Elevate(account) => format!("sudo su - {}", account),
        }
    }

    /// Progress text emitted once the hop succeeded.
    pub fn done_message(&self) -> String {
        match self {
            Hop::Internal(_) => "[OK] Connected to internal server\n".to_string(),
            Hop::Elevate(account) => format!("[OK] Switched to {}\n", account),
        }
    }

    /// How long to wait for the prompt after this hop.
    pub fn timeout(&self, timeouts: &Timeouts) -> Duration {
        match self {
            Hop::Internal(_) => timeouts.internal_hop,
            Hop::Elevate(_) => timeouts.elevation,
        }
    }
}

/// Settings for the SSH connection to the jump host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// SSH config file; defaults to `<key_dir>/config` if present, then
    /// `~/.ssh/config`.
    pub config_path: Option<PathBuf>,

    /// Secondary key-search directory (custom SSH folder).
    pub key_dir: Option<PathBuf>,

    /// Unknown host key policy.
    pub host_key_verification: HostKeyVerification,

    /// Alternative known_hosts file.
    pub known_hosts_path: Option<PathBuf>,

    /// TCP connect + handshake timeout.
    pub connect_timeout: Duration,

    /// PTY width. Wide, so kubectl tables are not wrapped.
    pub terminal_width: u32,

    /// PTY height.
    pub terminal_height: u32,

    /// Passphrase for an encrypted identity file.
    #[serde(skip)]
    pub passphrase: Option<Arc<SecretString>>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            config_path: None,
            key_dir: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(30),
            terminal_width: 511,
            terminal_height: 24,
            passphrase: None,
        }
    }
}

impl SshSettings {
    /// Directory searched for identity files when the configured path is
    /// missing.
    pub fn key_dir(&self) -> std::result::Result<PathBuf, ConfigError> {
        match &self.key_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".ssh"))
                .ok_or(ConfigError::NoHomeDir),
        }
    }

    /// The SSH config file to read.
    pub fn config_path(&self) -> std::result::Result<PathBuf, ConfigError> {
        if let Some(path) = &self.config_path {
            return Ok(path.clone());
        }
        if let Some(dir) = &self.key_dir {
            let custom = dir.join("config");
            if custom.exists() {
                return Ok(custom);
            }
        }
        dirs::home_dir()
            .map(|home| home.join(".ssh").join("config"))
            .ok_or(ConfigError::NoHomeDir)
    }
}

/// Timings for prompt detection and streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wait for the jump host's first prompt.
    pub initial_prompt: Duration,

    /// Wait after `ssh <internal-host>`.
    pub internal_hop: Duration,

    /// Wait after `sudo su - <account>`.
    pub elevation: Duration,

    /// Default for [`RemoteSession::execute`](crate::RemoteSession::execute).
    pub command: Duration,

    /// Pod listings and describe.
    pub listing: Duration,

    /// One `kubectl top` query.
    pub metrics_query: Duration,

    /// Silence required before the prompt is trusted.
    pub idle_threshold: Duration,

    /// Sleep between non-blocking channel polls; also the stop-flag latency.
    pub poll_interval: Duration,

    /// Delay between sending a streaming command and the first read.
    pub stream_settle: Duration,

    /// Delay between the interrupt and draining leftover output.
    pub interrupt_drain: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            initial_prompt: Duration::from_secs(5),
            internal_hop: Duration::from_secs(10),
            elevation: Duration::from_secs(5),
            command: Duration::from_secs(5),
            listing: Duration::from_secs(10),
            metrics_query: Duration::from_secs(10),
            idle_threshold: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            stream_settle: Duration::from_millis(500),
            interrupt_drain: Duration::from_millis(500),
        }
    }
}

/// Kubernetes-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeSettings {
    /// Namespace every command is scoped to.
    pub namespace: String,

    /// `--tail` for log streams; `None` streams the full log.
    pub log_tail_lines: Option<u32>,
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            namespace: "argo".to_string(),
            log_tail_lines: None,
        }
    }
}

/// Metrics polling cadence and retry limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsPolicy {
    /// Delay between successful samples.
    pub interval: Duration,

    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,

    /// Fixed delay while the pod is too new to have metrics.
    pub not_ready_backoff: Duration,

    /// Linear backoff step for other failures.
    pub backoff_step: Duration,

    /// Upper bound of the linear backoff.
    pub backoff_cap: Duration,
}

impl Default for MetricsPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 7,
            not_ready_backoff: Duration::from_secs(3),
            backoff_step: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(5),
        }
    }
}

impl MetricsPolicy {
    /// Linear backoff after the `attempt`-th consecutive failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        (self.backoff_step * attempt).min(self.backoff_cap)
    }
}
