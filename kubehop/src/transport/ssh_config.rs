//! Alias-keyed lookup in an OpenSSH client config file.
//!
//! Only the directives the jump-host connection needs are read: `HostName`,
//! `Port`, `User` and `IdentityFile`. As in OpenSSH, every `Host` block whose
//! pattern matches the alias contributes, and the first value seen wins.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, warn};
use tokio::fs;

use crate::error::ConfigError;

/// Effective settings for one host alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEntry {
    /// The alias that was looked up.
    pub alias: String,
    /// `HostName` directive.
    pub hostname: Option<String>,
    /// `User` directive.
    pub user: Option<String>,
    /// `Port` directive.
    pub port: Option<u16>,
    /// `IdentityFile` directive, `~` expanded.
    pub identity_file: Option<PathBuf>,
}

impl HostEntry {
    /// The hostname to connect to (falls back to the alias).
    pub fn effective_hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.alias)
    }

    /// The port to connect to (falls back to 22).
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(22)
    }
}

/// A parsed config file: `Host` blocks in file order.
#[derive(Debug, Clone, Default)]
pub struct SshClientConfig {
    blocks: Vec<HostBlock>,
}

#[derive(Debug, Clone)]
struct HostBlock {
    patterns: Vec<String>,
    options: IndexMap<String, String>,
}

impl HostBlock {
    fn matches(&self, alias: &str) -> bool {
        let mut matched = false;
        for pattern in &self.patterns {
            if let Some(negated) = pattern.strip_prefix('!') {
                if glob_match(negated, alias) {
                    return false;
                }
            } else if glob_match(pattern, alias) {
                matched = true;
            }
        }
        matched
    }
}

impl SshClientConfig {
    /// Read and parse a config file. A missing file is an empty config.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path).await {
            Ok(content) => {
                debug!("Loading SSH config from {}", path.display());
                Self::parse(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("SSH config not found at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    /// Parse config file content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut blocks = Vec::new();
        let mut current: Option<HostBlock> = None;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // "Key Value" or "Key=Value"
            let (key, value) = match line.split_once(|c: char| c == '=' || c.is_whitespace()) {
                Some((key, value)) => (key.trim(), value.trim().trim_start_matches('=').trim()),
                None => {
                    return Err(ConfigError::Parse {
                        line: index + 1,
                        message: format!("directive '{}' has no value", line),
                    });
                }
            };
            let value = value.trim_matches('"');

            let key = key.to_ascii_lowercase();
            if key == "host" {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some(HostBlock {
                    patterns: value.split_whitespace().map(str::to_string).collect(),
                    options: IndexMap::new(),
                });
            } else if key == "match" {
                // Match blocks are not evaluated. An empty pattern list never
                // matches, so their directives are kept out of every lookup.
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some(HostBlock {
                    patterns: Vec::new(),
                    options: IndexMap::new(),
                });
            } else if let Some(block) = current.as_mut() {
                block.options.entry(key).or_insert_with(|| value.to_string());
            } else {
                // Directives before the first Host apply to every host.
                current = Some(HostBlock {
                    patterns: vec!["*".to_string()],
                    options: IndexMap::from([(key, value.to_string())]),
                });
            }
        }

        if let Some(block) = current {
            blocks.push(block);
        }

        Ok(Self { blocks })
    }

    /// Effective settings for `alias`.
    pub fn lookup(&self, alias: &str) -> HostEntry {
        let mut entry = HostEntry {
            alias: alias.to_string(),
            ..Default::default()
        };

        for block in self.blocks.iter().filter(|b| b.matches(alias)) {
            for (key, value) in &block.options {
                match key.as_str() {
                    "hostname" if entry.hostname.is_none() => {
                        entry.hostname = Some(value.replace("%h", alias));
                    }
                    "user" if entry.user.is_none() => entry.user = Some(value.clone()),
                    "port" if entry.port.is_none() => match value.parse() {
                        Ok(port) => entry.port = Some(port),
                        Err(_) => warn!("Ignoring invalid port '{}' for host '{}'", value, alias),
                    },
                    "identityfile" if entry.identity_file.is_none() => {
                        entry.identity_file = Some(expand_home(value));
                    }
                    _ => {}
                }
            }
        }

        entry
    }
}

/// Expand a leading `~/`.
fn expand_home(value: &str) -> PathBuf {
    if let Some(stripped) = value.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(value)
}

/// OpenSSH host pattern matching: `*` and `?` wildcards.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
