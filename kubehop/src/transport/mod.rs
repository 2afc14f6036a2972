//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level SSH connection management to the
//! jump host: SSH config resolution, authentication, host key policy and
//! the interactive shell channel the session drives.

pub mod config;
mod shell;
mod ssh;
pub mod ssh_config;

pub use config::{HostKeyVerification, Identity, SshTarget};
pub use shell::{Connector, ShellChannel, SshConnector, SshShell};
pub use ssh::SshTransport;
