//! Interactive shell channel abstraction and its russh implementation.
//!
//! [`RemoteSession`](crate::RemoteSession) only ever talks to a
//! [`ShellChannel`]: bytes in, bytes out, polled without blocking. The
//! [`Connector`] produces one per connect, already sitting at the jump
//! host's shell.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::FutureExt;
use log::{debug, warn};
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::config::{Identity, SshTarget};
use super::ssh::SshTransport;
use super::ssh_config::{HostEntry, SshClientConfig};
use crate::config::SshSettings;
use crate::error::{ChannelError, ConfigError, Result, TransportError};

/// Default identity files tried when none is configured.
const DEFAULT_IDENTITIES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// A byte-oriented interactive shell.
#[async_trait]
pub trait ShellChannel: Send {
    /// Write raw bytes to the shell.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Return whatever output is available right now, or `None`.
    ///
    /// Never waits. A closed channel is an error.
    fn try_read(&mut self) -> Result<Option<Vec<u8>>>;

    /// Whether the channel (and its transport) is still usable.
    fn is_open(&self) -> bool;

    /// Close the channel and its transport.
    async fn close(&mut self) -> Result<()>;
}

/// Opens an interactive shell on the jump host.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `jump_host` (an SSH config alias) and open a shell.
    async fn open_shell(&self, jump_host: &str) -> Result<Box<dyn ShellChannel>>;
}

/// [`Connector`] backed by russh and the user's SSH config.
#[derive(Debug, Clone)]
pub struct SshConnector {
    settings: SshSettings,
}

impl SshConnector {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    /// Resolve `alias` through the SSH config file.
    pub async fn resolve(&self, alias: &str) -> Result<SshTarget> {
        let path = self.settings.config_path()?;
        let entry = SshClientConfig::load(&path).await?.lookup(alias);

        let username = entry
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .ok_or_else(|| ConfigError::MissingUser {
                alias: alias.to_string(),
            })?;

        let identity = match self.find_identity(&entry)? {
            Some(path) => {
                check_identity(&path, self.settings.passphrase.is_some())?;
                debug!("Using identity file: {}", path.display());
                Identity::Key {
                    path,
                    passphrase: self.settings.passphrase.clone(),
                }
            }
            None => {
                warn!("No identity file found for '{}'", alias);
                Identity::None
            }
        };

        Ok(SshTarget {
            alias: alias.to_string(),
            host: entry.effective_hostname().to_string(),
            port: entry.effective_port(),
            username,
            identity,
        })
    }

    /// The configured identity file, else the same file name in the key
    /// directory, else the first default identity present there.
    fn find_identity(&self, entry: &HostEntry) -> Result<Option<PathBuf>> {
        let key_dir = self.settings.key_dir()?;

        if let Some(configured) = &entry.identity_file {
            if configured.exists() {
                return Ok(Some(configured.clone()));
            }
            if let Some(name) = configured.file_name() {
                let fallback = key_dir.join(name);
                if fallback.exists() {
                    debug!("Using key from key directory: {}", fallback.display());
                    return Ok(Some(fallback));
                }
            }
            warn!("Identity file not found: {}", configured.display());
        }

        Ok(DEFAULT_IDENTITIES
            .iter()
            .map(|name| key_dir.join(name))
            .find(|path| path.exists()))
    }
}

/// Fail early, with a clear message, on an encrypted key without passphrase.
fn check_identity(path: &Path, has_passphrase: bool) -> Result<()> {
    match ssh_key::PrivateKey::read_openssh_file(path) {
        Ok(key) if key.is_encrypted() && !has_passphrase => Err(TransportError::Key(format!(
            "{} is encrypted and no passphrase is configured",
            path.display()
        ))
        .into()),
        Ok(_) => Ok(()),
        // Legacy PEM keys are not OpenSSH format; russh still loads them.
        Err(e) => {
            debug!("Could not pre-read {}: {}", path.display(), e);
            Ok(())
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open_shell(&self, jump_host: &str) -> Result<Box<dyn ShellChannel>> {
        let target = self.resolve(jump_host).await?;
        let transport = SshTransport::connect(target, &self.settings).await?;

        match transport.open_shell().await {
            Ok(channel) => Ok(Box::new(SshShell::new(transport, channel))),
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    warn!("Error closing transport after failed shell open: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// A russh PTY shell channel together with the transport that owns it.
pub struct SshShell {
    transport: Option<SshTransport>,
    channel: Channel<Msg>,
    open: bool,
}

impl SshShell {
    pub fn new(transport: SshTransport, channel: Channel<Msg>) -> Self {
        Self {
            transport: Some(transport),
            channel,
            open: true,
        }
    }
}

#[async_trait]
impl ShellChannel for SshShell {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if let Err(e) = self.channel.data(data).await {
            self.open = false;
            return Err(ChannelError::Ssh(e).into());
        }
        Ok(())
    }

    fn try_read(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.channel.wait().now_or_never() {
                None => return Ok(None),
                Some(Some(ChannelMsg::Data { data })) => return Ok(Some(data.to_vec())),
                Some(Some(ChannelMsg::ExtendedData { data, .. })) => {
                    return Ok(Some(data.to_vec()));
                }
                Some(None | Some(ChannelMsg::Eof | ChannelMsg::Close)) => {
                    self.open = false;
                    return Err(ChannelError::Closed.into());
                }
                Some(Some(other)) => {
                    debug!("Ignoring channel message: {:?}", other);
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open && self.transport.as_ref().is_some_and(SshTransport::is_alive)
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        let channel_result = self.channel.close().await.map_err(ChannelError::Ssh);
        if let Some(transport) = self.transport.take() {
            transport.close().await?;
        }
        channel_result?;
        Ok(())
    }
}
