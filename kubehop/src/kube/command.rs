//! kubectl command construction.
//!
//! Only read-only verbs exist in [`Verb`], so nothing built here can change
//! cluster state. Arguments that come from callers are typed
//! ([`PodName`], [`SearchPattern`]) and therefore already sanitized; they are
//! additionally single-quoted.

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::sanitize::{PodName, SearchPattern, shell_quote, validate_identifier};
use crate::session::CommandRequest;

/// The kubectl verbs kubehop issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Logs,
    Describe,
    Top,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Logs => "logs",
            Verb::Describe => "describe",
            Verb::Top => "top",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kubectl invocation scoped to one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubectlCommand {
    verb: Verb,
    args: Vec<String>,
    namespace: String,
    flags: Vec<String>,
    grep: Option<String>,
}

impl KubectlCommand {
    fn new(verb: Verb, namespace: &str, args: Vec<String>) -> Result<Self> {
        validate_identifier("namespace", namespace)?;
        Ok(Self {
            verb,
            args,
            namespace: namespace.to_string(),
            flags: Vec::new(),
            grep: None,
        })
    }

    /// `kubectl get pods -n <ns>`
    pub fn get_pods(namespace: &str) -> Result<Self> {
        Self::new(Verb::Get, namespace, vec!["pods".to_string()])
    }

    /// `kubectl logs '<pod>' -n <ns>`
    pub fn logs(pod: &PodName, namespace: &str) -> Result<Self> {
        Self::new(Verb::Logs, namespace, vec![shell_quote(pod.as_str())])
    }

    /// `kubectl describe pod '<pod>' -n <ns>`
    pub fn describe_pod(pod: &PodName, namespace: &str) -> Result<Self> {
        Self::new(
            Verb::Describe,
            namespace,
            vec!["pod".to_string(), shell_quote(pod.as_str())],
        )
    }

    /// `kubectl top pod '<pod>' -n <ns>`
    pub fn top_pod(pod: &PodName, namespace: &str) -> Result<Self> {
        Self::new(
            Verb::Top,
            namespace,
            vec!["pod".to_string(), shell_quote(pod.as_str())],
        )
    }

    /// Append a fixed flag such as `-f` or `--no-headers`.
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Keep only the most recent `lines` lines of a log.
    pub fn tail(self, lines: u32) -> Self {
        self.flag(format!("--tail={}", lines))
    }

    /// Pipe the output through `grep '<pattern>'`.
    pub fn grep(mut self, pattern: &SearchPattern) -> Self {
        self.grep = Some(shell_quote(pattern.as_str()));
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The command line typed into the shell.
    pub fn render(&self) -> String {
        let mut parts = vec!["kubectl", self.verb.as_str()];
        parts.extend(self.args.iter().map(String::as_str));
        parts.push("-n");
        parts.push(&self.namespace);
        parts.extend(self.flags.iter().map(String::as_str));

        let mut command = parts.join(" ");
        if let Some(pattern) = &self.grep {
            command.push_str(" | grep ");
            command.push_str(pattern);
        }
        command
    }

    /// A one-shot request for this command.
    pub fn request(&self, timeout: Duration) -> CommandRequest {
        CommandRequest::one_shot(self.render(), timeout)
    }
}

impl fmt::Display for KubectlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
