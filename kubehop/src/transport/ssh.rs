//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use russh::Channel;
use russh::client::{self, Handle, Msg};
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use secrecy::ExposeSecret;

use super::config::{HostKeyVerification, Identity, SshTarget};
use crate::config::SshSettings;
use crate::error::{Result, TransportError};

/// Keepalive sent while a log stream sits idle.
const KEEPALIVE: Duration = Duration::from_secs(30);

/// An authenticated russh connection to the jump host.
pub struct SshTransport {
    session: Handle<SshHandler>,
    target: SshTarget,
    /// PTY columns and rows.
    pty_size: (u32, u32),
}

impl SshTransport {
    /// Connect to `target`, check its host key and authenticate.
    pub async fn connect(target: SshTarget, settings: &SshSettings) -> Result<Self> {
        let client_config = Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(KEEPALIVE),
            ..Default::default()
        });

        let rejection = Arc::new(Mutex::new(None));
        let handler = SshHandler {
            host: target.host.clone(),
            port: target.port,
            policy: settings.host_key_verification.clone(),
            known_hosts_path: settings.known_hosts_path.clone(),
            rejection: rejection.clone(),
        };

        debug!("Connecting to {} (alias '{}')", target, target.alias);
        let limit = settings.connect_timeout;
        let connected = tokio::time::timeout(
            limit,
            client::connect(client_config, (target.host.as_str(), target.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(limit))?;

        let mut session = match connected {
            Ok(session) => session,
            Err(e) => {
                // russh only reports UnknownKey; the handler kept the reason.
                let rejected = rejection.lock().ok().and_then(|mut slot| slot.take());
                return Err(match (rejected, e) {
                    (Some(reason), _) => reason,
                    (None, russh::Error::IO(source)) => TransportError::ConnectionFailed {
                        host: target.host.clone(),
                        port: target.port,
                        source,
                    },
                    (None, e) => TransportError::Ssh(e),
                }
                .into());
            }
        };

        if !Self::authenticate(&mut session, &target).await? {
            return Err(TransportError::AuthenticationFailed {
                user: target.username.clone(),
            }
            .into());
        }
        info!("Authenticated to {}", target);

        Ok(Self {
            session,
            target,
            pty_size: (settings.terminal_width, settings.terminal_height),
        })
    }

    /// Open a PTY session channel and start a login shell on it.
    pub async fn open_shell(&self) -> Result<Channel<Msg>> {
        let (columns, rows) = self.pty_size;
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .request_pty(true, "xterm", columns, rows, 0, 0, &[])
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;
        debug!("Shell opened on {}", self.target);
        Ok(channel)
    }

    /// Try the target's identity. Returns whether the server accepted it.
    async fn authenticate(session: &mut Handle<SshHandler>, target: &SshTarget) -> Result<bool> {
        let user = target.username.as_str();
        let result = match &target.identity {
            Identity::None => session.authenticate_none(user).await,
            Identity::Key { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(format!("{}: {}", path.display(), e)))?;
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();
                session
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                    .await
            }
        };
        Ok(result.map_err(TransportError::Ssh)?.success())
    }

    /// Whether the session's background task is still running.
    pub fn is_alive(&self) -> bool {
        !self.session.is_closed()
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// Host key checking for one connection attempt.
struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Why the key was refused, read back by [`SshTransport::connect`].
    rejection: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// `Ok(true)` for a known key, `Ok(false)` for an unknown host.
    fn lookup_known_hosts(&self, key: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, key),
        };
        result.map_err(|e| match e {
            russh::keys::Error::KeyChanged { line } => TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            },
            other => TransportError::KnownHosts(other.to_string()),
        })
    }
}

/// Apply `policy` to the outcome of a known_hosts lookup.
fn host_key_verdict(
    policy: &HostKeyVerification,
    known: std::result::Result<bool, TransportError>,
    host: &str,
    port: u16,
) -> std::result::Result<(), TransportError> {
    match (policy, known) {
        (HostKeyVerification::Disabled, _) | (_, Ok(true)) => Ok(()),
        (HostKeyVerification::Warn, Ok(false)) => {
            warn!(
                "SECURITY: accepting unknown host key for {}:{} - consider strict checking",
                host, port
            );
            Ok(())
        }
        (HostKeyVerification::Warn, Err(TransportError::KnownHosts(reason))) => {
            warn!("Could not read known_hosts ({}), accepting host key", reason);
            Ok(())
        }
        (HostKeyVerification::Strict, Ok(false)) => Err(TransportError::HostKeyUnknown {
            host: host.to_string(),
            port,
        }),
        (_, Err(e)) => Err(e),
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let known = match self.policy {
            HostKeyVerification::Disabled => Ok(true),
            _ => self.lookup_known_hosts(server_public_key),
        };
        debug!(
            "Host key for {}:{}: {}",
            self.host,
            self.port,
            server_public_key.fingerprint(HashAlg::Sha256)
        );

        match host_key_verdict(&self.policy, known, &self.host, self.port) {
            Ok(()) => Ok(true),
            Err(reason) => {
                if let Ok(mut slot) = self.rejection.lock() {
                    *slot = Some(reason);
                }
                Ok(false)
            }
        }
    }
}
