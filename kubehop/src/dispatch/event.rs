//! Events reported by dispatched tasks.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use log::trace;
use tokio::sync::mpsc;

/// Something a task wants its caller to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Console text: progress lines, command output, log chunks.
    Output(String),

    /// Pod names from a listing, possibly empty.
    PodList(Vec<String>),

    /// A formatted metrics sample.
    Metrics(String),

    /// Metrics are not ready yet; polling will retry.
    MetricsWaiting { attempt: u32, max: u32 },

    Connected,

    Disconnected,

    /// A task failed; reported once per failure.
    Error(String),
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEvent::Output(text) | TaskEvent::Metrics(text) => f.write_str(text),
            TaskEvent::PodList(pods) => write!(f, "pods: [{}]", pods.join(", ")),
            TaskEvent::MetricsWaiting { attempt, max } => write!(
                f,
                "Pod too new, waiting for metrics... (attempt {}/{})",
                attempt, max
            ),
            TaskEvent::Connected => f.write_str("connected"),
            TaskEvent::Disconnected => f.write_str("disconnected"),
            TaskEvent::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Sending half, cloned into every task and session sink.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl EventSender {
    pub(crate) fn send(&self, event: TaskEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event dropped, receiver is gone");
        }
    }

    pub(crate) fn output(&self, text: impl Into<String>) {
        self.send(TaskEvent::Output(text.into()));
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        self.send(TaskEvent::Error(message.into()));
    }
}

/// Receiving half of the dispatcher's events.
///
/// Ends once the dispatcher and all of its tasks are gone.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl EventStream {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.rx.recv().await
    }

    /// The next event, if one is already queued.
    pub fn try_recv(&mut self) -> Option<TaskEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = TaskEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<TaskEvent>> {
        self.rx.poll_recv(cx)
    }
}

pub(crate) fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventStream { rx })
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_stream_yields_in_order_and_ends() {
        let (sender, mut stream) = event_channel();
        sender.output("[INFO] hello\n");
        sender.send(TaskEvent::PodList(vec!["a-1".into(), "b-2".into()]));
        sender.error("boom");
        drop(sender);

        assert_eq!(stream.next().await, Some(TaskEvent::Output("[INFO] hello\n".into())));
        assert_eq!(
            stream.next().await.map(|e| e.to_string()),
            Some("pods: [a-1, b-2]".to_string())
        );
        assert_eq!(stream.recv().await, Some(TaskEvent::Error("boom".into())));
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (sender, stream) = event_channel();
        drop(stream);
        sender.send(TaskEvent::Connected);
    }

    #[test]
    fn test_waiting_display() {
        let event = TaskEvent::MetricsWaiting { attempt: 2, max: 7 };
        assert_eq!(
            event.to_string(),
            "Pod too new, waiting for metrics... (attempt 2/7)"
        );
    }
}
