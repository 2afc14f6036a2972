//! Parsing of kubectl text output.
//!
//! The shell hands back the echoed command and the trailing prompt along
//! with kubectl's output, so every parser first drops those lines.

use std::fmt;

use log::debug;

use crate::channel::strip_ansi;
use crate::error::KubeError;
use crate::sanitize::PodName;

/// Shortest metrics output that can hold a header and one row.
const MIN_METRICS_TEXT: usize = 10;

/// Error wording meaning the cluster has no metrics backend.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "Metrics server not available",
    "Metrics API not available",
    "metrics.k8s.io",
];

const NOT_FOUND_MARKERS: &[&str] = &["NotFound", "not found"];

/// Lowercase wording meaning the pod is too new to have metrics yet.
const NOT_READY_MARKERS: &[&str] = &[
    "not ready",
    "not yet available",
    "metrics collecting",
    "metrics not available yet",
];

/// CPU and memory usage as printed by `kubectl top`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSample {
    pub cpu: String,
    pub memory: String,
}

impl fmt::Display for MetricsSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU: {} | Memory: {}", self.cpu, self.memory)
    }
}

/// Whether a trimmed line is the echoed command or a shell prompt.
fn is_echo_or_prompt(line: &str) -> bool {
    line.starts_with("kubectl")
        || line.contains("kubectl ")
        || line.ends_with('$')
        || line.ends_with('#')
        || line.ends_with('>')
}

/// Whether a trimmed line is the column header of `kubectl get`.
fn is_header(line: &str) -> bool {
    line.starts_with("NAME") && line.contains("READY")
}

fn looks_like_pod_name(name: &str) -> bool {
    name.chars().any(char::is_alphanumeric) && !name.starts_with(['-', '_', '.', '['])
}

/// Non-blank lines of `output` with escapes, echoes and prompts removed.
fn content_lines(output: &str) -> Vec<String> {
    strip_ansi(output)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_echo_or_prompt(line))
        .map(str::to_string)
        .collect()
}

/// Pod names from `kubectl get pods` output, in order.
///
/// Works with and without the header line.
pub fn parse_pod_names(output: &str) -> Vec<String> {
    content_lines(output)
        .iter()
        .filter(|line| !is_header(line))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| looks_like_pod_name(name))
        .inspect(|name| debug!("Parsed pod: {}", name))
        .map(str::to_string)
        .collect()
}

/// Map kubectl error wording to a [`KubeError`], if the output is an error.
///
/// This is plain substring matching over kubectl's messages, checked in
/// order: backend missing, pod missing, pod too new.
pub fn classify_metrics_error(output: &str, pod: &PodName) -> Option<KubeError> {
    let message = output.trim().to_string();

    if UNAVAILABLE_MARKERS.iter().any(|m| output.contains(m)) {
        return Some(KubeError::MetricsUnavailable { message });
    }

    if NOT_FOUND_MARKERS.iter().any(|m| output.contains(m)) {
        return Some(KubeError::NotFound {
            pod: pod.to_string(),
        });
    }

    let lower = output.to_lowercase();
    if output.contains("Pod too new") || NOT_READY_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(KubeError::MetricsNotReady {
            pod: pod.to_string(),
            message,
        });
    }

    None
}

/// Extract CPU and memory for `pod` from `kubectl top pod` output.
pub fn parse_metrics(output: &str, pod: &PodName) -> Result<MetricsSample, KubeError> {
    let lines = content_lines(output);
    let text = lines.join("\n");

    if let Some(err) = classify_metrics_error(&text, pod) {
        return Err(err);
    }

    if text.len() < MIN_METRICS_TEXT {
        return Err(KubeError::Parse {
            message: format!("metrics output too short: {:?}", text),
        });
    }

    for line in &lines {
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        if !(name.contains(pod.as_str()) && name.contains('-')) {
            continue;
        }
        if let (Some(cpu), Some(memory)) = (tokens.next(), tokens.next()) {
            return Ok(MetricsSample {
                cpu: cpu.to_string(),
                memory: memory.to_string(),
            });
        }
    }

    Err(KubeError::Parse {
        message: format!("no metrics row for pod '{}'", pod),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = "svc@internal:~$ ";

    fn pod(name: &str) -> PodName {
        PodName::new(name).unwrap()
    }

    #[test]
    fn test_header_pods_and_echo() {
        let output = format!(
            "kubectl get pods -n argo --field-selector=status.phase=Running\r\n\
             NAME                 READY   STATUS    RESTARTS   AGE\r\n\
             web-7d9f-x2x         1/1     Running   0          3d\r\n\
             \x1b[32mworker-5c6b-q8k\x1b[0m      1/1     Running   2          1h\r\n\
             {}",
            PROMPT
        );
        assert_eq!(parse_pod_names(&output), vec!["web-7d9f-x2x", "worker-5c6b-q8k"]);
    }

    #[test]
    fn test_grep_echo_is_skipped() {
        let output = format!(
            "{}kubectl get pods -n argo --no-headers | grep 'web'\r\n\
             web-1   1/1   Running   0   5m\r\n{}",
            PROMPT, PROMPT
        );
        assert_eq!(parse_pod_names(&output), vec!["web-1"]);
    }

    #[test]
    fn test_no_matches() {
        let output = format!("kubectl get pods -n argo --no-headers | grep 'zzz'\r\n{}", PROMPT);
        assert!(parse_pod_names(&output).is_empty());
        assert!(parse_pod_names("").is_empty());
    }

    #[test]
    fn test_junk_tokens_rejected() {
        let output = "---- separator\r\n[1]+ Done\r\n_tmp x\r\n.hidden y\r\nreal-pod 1/1\r\n";
        assert_eq!(parse_pod_names(output), vec!["real-pod"]);
    }

    #[test]
    fn test_parse_metrics() {
        let output = format!(
            "kubectl top pod 'web-7d9f-x2x' -n argo\r\n\
             NAME           CPU(cores)   MEMORY(bytes)\r\n\
             web-7d9f-x2x   12m          256Mi\r\n{}",
            PROMPT
        );
        let sample = parse_metrics(&output, &pod("web-7d9f-x2x")).unwrap();
        assert_eq!(sample.cpu, "12m");
        assert_eq!(sample.memory, "256Mi");
        assert_eq!(sample.to_string(), "CPU: 12m | Memory: 256Mi");
    }

    #[test]
    fn test_metrics_classification() {
        let web = pod("web-1");
        let cases = [
            (
                "error: Metrics API not available",
                "MetricsUnavailable",
            ),
            (
                "Error from server (NotFound): pods \"web-1\" not found",
                "NotFound",
            ),
            ("error: metrics not available yet", "MetricsNotReady"),
            ("Pod too new", "MetricsNotReady"),
            ("Metrics Collecting, try later", "MetricsNotReady"),
        ];

        for (text, expected) in cases {
            let output = format!("kubectl top pod 'web-1' -n argo\r\n{}\r\n{}", text, PROMPT);
            let err = parse_metrics(&output, &web).unwrap_err();
            let kind = match err {
                KubeError::MetricsUnavailable { .. } => "MetricsUnavailable",
                KubeError::NotFound { .. } => "NotFound",
                KubeError::MetricsNotReady { .. } => "MetricsNotReady",
                KubeError::Parse { .. } => "Parse",
            };
            assert_eq!(kind, expected, "for {:?}", text);
        }
    }

    #[test]
    fn test_metrics_parse_failures() {
        let web = pod("web-1");
        let short = format!("kubectl top pod 'web-1' -n argo\r\nok\r\n{}", PROMPT);
        assert!(matches!(
            parse_metrics(&short, &web),
            Err(KubeError::Parse { .. })
        ));

        let other = "NAME   CPU(cores)   MEMORY(bytes)\r\napi-2   1m   10Mi\r\n";
        assert!(matches!(
            parse_metrics(other, &web),
            Err(KubeError::Parse { .. })
        ));
    }
}
