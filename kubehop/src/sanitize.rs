//! Input sanitization for values interpolated into remote command text.
//!
//! There is no parameterized execution primitive across nested shell hops:
//! every command is a line of text typed into the elevated shell. The
//! functions here are therefore the security boundary. Anything a caller
//! supplies must come out of [`sanitize_identifier`] or
//! [`sanitize_pod_name`] before it reaches the command builder, and
//! non-identifier arguments are additionally wrapped with [`shell_quote`].

use std::fmt;

use log::{debug, warn};

use crate::error::ValidationError;

/// Maximum length of a Kubernetes object name (RFC 1123 subdomain).
pub const MAX_POD_NAME_LEN: usize = 253;

/// Prefix used when a sanitized identifier would otherwise look like a flag.
///
/// As a grep pattern `.` still matches any leading character.
const FLAG_GUARD: char = '.';

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_pod_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-')
}

/// A search keyword that passed [`sanitize_identifier`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchPattern(String);

impl SearchPattern {
    /// Sanitize `raw` into a search pattern.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        sanitize_identifier(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pod name that passed [`sanitize_pod_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodName(String);

impl PodName {
    /// Sanitize `raw` into a pod name.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        sanitize_pod_name(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip everything outside `[A-Za-z0-9_.-]`.
///
/// Fails if nothing is left. A result beginning with `-` gets a leading `.`
/// so the downstream command cannot parse it as an option.
pub fn sanitize_identifier(raw: &str) -> Result<String, ValidationError> {
    let mut sanitized: String = raw.chars().filter(|&c| is_identifier_char(c)).collect();

    if sanitized.is_empty() {
        return Err(ValidationError::NoValidCharacters {
            what: "search pattern",
            raw: raw.to_string(),
        });
    }

    if sanitized.starts_with('-') {
        sanitized.insert(0, FLAG_GUARD);
    }

    debug!("Sanitized identifier: {:?} -> {:?}", raw, sanitized);
    Ok(sanitized)
}

/// Filter a pod name to `[A-Za-z0-9.-]` and check its shape.
///
/// The result must start and end with an alphanumeric character and be at
/// most [`MAX_POD_NAME_LEN`] characters. Any change to the input is logged
/// as a security-relevant downgrade.
pub fn sanitize_pod_name(raw: &str) -> Result<String, ValidationError> {
    let sanitized: String = raw.chars().filter(|&c| is_pod_name_char(c)).collect();

    if sanitized.is_empty() {
        return Err(ValidationError::NoValidCharacters {
            what: "pod name",
            raw: raw.to_string(),
        });
    }

    if sanitized != raw {
        warn!("SECURITY: pod name sanitized: {:?} -> {:?}", raw, sanitized);
    }

    let bounded = sanitized
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && sanitized
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric());
    if !bounded {
        return Err(ValidationError::InvalidBoundary { name: sanitized });
    }

    if sanitized.len() > MAX_POD_NAME_LEN {
        return Err(ValidationError::TooLong {
            len: sanitized.len(),
            max: MAX_POD_NAME_LEN,
        });
    }

    Ok(sanitized)
}

/// Reject (rather than strip) configuration values with characters outside
/// `[A-Za-z0-9_.-]`, or that are empty or look like a flag.
pub fn validate_identifier(what: &'static str, raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() || raw.starts_with('-') || !raw.chars().all(is_identifier_char) {
        return Err(ValidationError::DisallowedCharacters {
            what,
            raw: raw.to_string(),
        });
    }
    Ok(())
}

/// Quote `arg` for a POSIX shell using single quotes.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    const SAMPLES: &[&str] = &[
        "worker",
        "-rf",
        "--all-namespaces",
        "a b; rm -rf /",
        "$(reboot)",
        "`id`",
        "pod_name.v1-2",
        "ünïcödé-pod",
        "---",
        "x|y&&z",
        "'quoted'",
    ];

    #[test]
    fn test_identifier_alphabet_and_no_leading_dash() {
        for raw in SAMPLES {
            let safe = sanitize_identifier(raw).unwrap();
            assert!(!safe.is_empty(), "{raw:?}");
            assert!(!safe.starts_with('-'), "{raw:?} -> {safe:?}");
            assert!(safe.chars().all(is_identifier_char), "{raw:?} -> {safe:?}");
        }
    }

    #[test]
    fn test_identifier_keeps_allowed_characters() {
        assert_eq!(sanitize_identifier("argo-worker_1.2").unwrap(), "argo-worker_1.2");
        assert_eq!(sanitize_identifier("a b; rm -rf /").unwrap(), "abrm-rf");
        assert_eq!(sanitize_identifier("-rf").unwrap(), ".-rf");
    }

    #[test]
    fn test_no_allowed_characters_is_rejected() {
        for raw in ["", "   ", "$;|&`", "!!!", "ü"] {
            assert!(matches!(
                sanitize_identifier(raw),
                Err(ValidationError::NoValidCharacters { .. })
            ));
            assert!(matches!(
                sanitize_pod_name(raw),
                Err(ValidationError::NoValidCharacters { .. })
            ));
        }
    }

    #[test]
    fn test_pod_name_boundaries() {
        assert!(matches!(
            sanitize_pod_name("-bad-"),
            Err(ValidationError::InvalidBoundary { .. })
        ));
        assert_err!(sanitize_pod_name("ends-with-dot."));
        assert_eq!(sanitize_pod_name("My_Pod!!").unwrap(), "MyPod");
        assert_eq!(
            sanitize_pod_name("workflow-abc12-3456789").unwrap(),
            "workflow-abc12-3456789"
        );
    }

    #[test]
    fn test_pod_name_length_limit() {
        let ok = "a".repeat(MAX_POD_NAME_LEN);
        assert_ok!(sanitize_pod_name(&ok));

        let long = "a".repeat(MAX_POD_NAME_LEN + 1);
        assert_eq!(
            sanitize_pod_name(&long),
            Err(ValidationError::TooLong {
                len: MAX_POD_NAME_LEN + 1,
                max: MAX_POD_NAME_LEN
            })
        );
    }

    #[test]
    fn test_newtypes() {
        let pod = PodName::new("api-7d9f").unwrap();
        assert_eq!(pod.as_str(), "api-7d9f");
        assert_eq!(pod.to_string(), "api-7d9f");

        let pattern = SearchPattern::new("-api").unwrap();
        assert_eq!(pattern.as_str(), ".-api");
    }

    #[test]
    fn test_validate_identifier() {
        assert_ok!(validate_identifier("namespace", "argo"));
        assert_ok!(validate_identifier("host", "10.0.34.231"));
        assert!(validate_identifier("namespace", "argo; id").is_err());
        assert_err!(validate_identifier("namespace", "-n"));
        assert_err!(validate_identifier("namespace", ""));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("worker"), "'worker'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
