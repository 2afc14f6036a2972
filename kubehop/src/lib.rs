//! # kubehop
//!
//! Async read-only Kubernetes access through an SSH hop chain.
//!
//! kubehop opens an interactive shell on a jump host, walks it to an
//! internal host, switches to a service account and then types `kubectl`
//! commands into that shell. There is no framing once inside the nested
//! shells, so command completion is detected from the prompt returning
//! after a quiet period.
//!
//! ## Features
//!
//! - Async SSH connections via russh, configured from `~/.ssh/config`
//! - Prompt detection on the last non-blank line of output
//! - Streaming output with cooperative cancellation (Ctrl-C and drain)
//! - Sanitized, quoted command construction over read-only kubectl verbs
//! - A background dispatcher running log streaming and metrics polling on
//!   independent sessions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kubehop::{Config, KubeOperations, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kubehop::Error> {
//!     let config = Config::from_env()?;
//!     let mut session = SessionBuilder::from_config(&config)
//!         .output_sink(|text: &str| print!("{}", text))
//!         .build()?;
//!
//!     session.connect().await?;
//!
//!     let mut kube = KubeOperations::new(&mut session, &config.kube);
//!     for pod in kube.list_matching("worker").await? {
//!         println!("{}: {}", pod, kube.metrics(&pod).await?);
//!     }
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod kube;
pub mod sanitize;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use config::{Config, HostChain, KubeSettings, MetricsPolicy, SshSettings, Timeouts};
pub use dispatch::{Action, EventStream, StopFlag, TaskDispatcher, TaskEvent, TaskHandle, TaskState};
pub use error::{Error, Result};
pub use kube::{KubeOperations, MetricsSample};
pub use sanitize::{PodName, SearchPattern};
pub use session::{
    CommandRequest, NullSink, OutputSink, RemoteSession, SessionBuilder, SessionState,
    StreamOptions, StreamOutcome,
};
pub use transport::{Connector, ShellChannel, SshConnector};
