//! Progress events for whoever renders convergence to a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status of a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    /// The operation has started
    Working,
    /// The operation finished successfully
    Done,
    /// The operation failed
    Error,
}

/// A status transition for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Identity the event is keyed by, e.g. `Service "web"`
    pub id: String,
    /// New status
    pub status: EventStatus,
    /// Human readable status text, e.g. `Recreated`
    pub status_text: String,
    /// When the transition happened
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Event for a service
    pub fn service(name: &str, status: EventStatus, status_text: &str) -> Self {
        Self {
            id: format!("Service {:?}", name),
            status,
            status_text: status_text.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for progress events.
///
/// Cloning is cheap; all clones feed the same receiver. Events are also
/// logged, so a discarding sink still leaves a trace.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    sender: Option<async_channel::Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink paired with the receiver that observes its events
    pub fn channel() -> (Self, async_channel::Receiver<ProgressEvent>) {
        let (sender, receiver) = async_channel::unbounded();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that only logs
    pub fn discard() -> Self {
        Self::default()
    }

    /// Publish an event
    pub fn event(&self, event: ProgressEvent) {
        info!("{} {}", event.id, event.status_text);
        if let Some(sender) = &self.sender {
            // A dropped receiver only means nobody is watching
            let _ = sender.try_send(event);
        }
    }

    /// Publish a `Working` event for a service
    pub fn working(&self, service: &str, status_text: &str) {
        self.event(ProgressEvent::service(service, EventStatus::Working, status_text));
    }

    /// Publish a `Done` event for a service
    pub fn done(&self, service: &str, status_text: &str) {
        self.event(ProgressEvent::service(service, EventStatus::Done, status_text));
    }

    /// Publish an `Error` event for a service
    pub fn error(&self, service: &str, status_text: &str) {
        self.event(ProgressEvent::service(service, EventStatus::Error, status_text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_receiver() {
        let (sink, receiver) = ProgressSink::channel();
        sink.working("web", "Create");
        sink.clone().done("web", "Created");

        let first = receiver.try_recv().unwrap();
        assert_eq!(first.id, "Service \"web\"");
        assert_eq!(first.status, EventStatus::Working);
        assert_eq!(first.status_text, "Create");

        let second = receiver.try_recv().unwrap();
        assert_eq!(second.status, EventStatus::Done);
        assert_eq!(second.status_text, "Created");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (sink, receiver) = ProgressSink::channel();
        drop(receiver);
        sink.done("web", "Created");
        ProgressSink::discard().done("web", "Created");
    }
}
