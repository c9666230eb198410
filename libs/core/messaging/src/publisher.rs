//! Publisher trait and in-process implementations.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PublishError;

/// Broker confirmation that an event was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub topic: String,
    /// Broker-assigned position, when the broker has one.
    pub sequence: Option<u64>,
    pub acknowledged_at: DateTime<Utc>,
}

impl Acknowledgement {
    pub fn new(topic: impl Into<String>, sequence: Option<u64>) -> Self {
        Self {
            topic: topic.into(),
            sequence,
            acknowledged_at: Utc::now(),
        }
    }
}

/// Fire-and-acknowledge delivery of an event to a named topic.
///
/// `emit` resolves once the broker acknowledged the event or fails within a
/// bounded time. Implementations never retry; callers decide.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn emit(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<Acknowledgement, PublishError>;

    /// Used for logging and metrics labels.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn emit(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<Acknowledgement, PublishError> {
        (**self).emit(topic, payload).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Typed convenience over [`EventPublisher::emit`].
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    async fn publish<E>(&self, topic: &str, event: &E) -> Result<Acknowledgement, PublishError>
    where
        E: Serialize + Sync,
    {
        let payload = serde_json::to_value(event)?;
        self.emit(topic, &payload).await
    }
}

impl<P: EventPublisher + ?Sized> EventPublisherExt for P {}

/// Bound a pending acknowledgement by `timeout`.
pub async fn with_ack_timeout<F>(
    topic: &str,
    timeout: Duration,
    ack: F,
) -> Result<Acknowledgement, PublishError>
where
    F: Future<Output = Result<Acknowledgement, PublishError>>,
{
    tokio::time::timeout(timeout, ack)
        .await
        .unwrap_or_else(|_| {
            Err(PublishError::Timeout {
                topic: topic.to_string(),
                timeout,
            })
        })
}

/// An event captured by [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Acknowledges every event and keeps it for inspection.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<PublishedEvent>>>,
    sequence: Arc<AtomicU64>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PublishedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.lock().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.topic.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn emit(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<Acknowledgement, PublishError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock().push(PublishedEvent {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        debug!(topic, sequence, "Event recorded");
        Ok(Acknowledgement::new(topic, Some(sequence)))
    }

    fn name(&self) -> &'static str {
        "recording_publisher"
    }
}

/// Refuses every event as if the broker were unreachable.
#[derive(Debug, Clone)]
pub struct FailingPublisher {
    reason: String,
    attempts: Arc<AtomicUsize>,
}

impl FailingPublisher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for FailingPublisher {
    fn default() -> Self {
        Self::new("broker unavailable")
    }
}

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn emit(
        &self,
        _topic: &str,
        _payload: &serde_json::Value,
    ) -> Result<Acknowledgement, PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PublishError::Unavailable(self.reason.clone()))
    }

    fn name(&self) -> &'static str {
        "failing_publisher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_recording_publisher_acknowledges_in_order() {
        let publisher = RecordingPublisher::new();

        let first = publisher.emit("order_created", &json!({"n": 1})).await.unwrap();
        let second = publisher.emit("order_updated", &json!({"n": 2})).await.unwrap();

        assert_eq!(first.sequence, Some(1));
        assert_eq!(second.sequence, Some(2));
        assert_eq!(publisher.topics(), vec!["order_created", "order_updated"]);
        assert_eq!(publisher.events()[1].payload, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_recording_publisher_clones_share_events() {
        let publisher = RecordingPublisher::new();
        let clone = publisher.clone();

        clone.emit("order_created", &json!({})).await.unwrap();
        assert_eq!(publisher.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_publisher_counts_attempts() {
        let publisher = FailingPublisher::new("connection refused");

        let err = publisher.emit("order_created", &json!({})).await.unwrap_err();
        assert!(matches!(err, PublishError::Unavailable(ref m) if m == "connection refused"));
        assert_eq!(publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_publish_serializes_typed_events() {
        #[derive(Serialize)]
        struct Ping {
            seq: u32,
        }

        let publisher = RecordingPublisher::new();
        publisher.publish("ping", &Ping { seq: 7 }).await.unwrap();
        assert_eq!(publisher.events()[0].payload, json!({"seq": 7}));
    }

    #[tokio::test]
    async fn test_publish_through_arc_dyn() {
        let publisher: Arc<dyn EventPublisher> = Arc::new(RecordingPublisher::new());
        let ack = publisher.emit("order_created", &json!({})).await.unwrap();
        assert_eq!(ack.topic, "order_created");
        assert_eq!(publisher.name(), "recording_publisher");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_timeout_elapses() {
        let pending = std::future::pending::<Result<Acknowledgement, PublishError>>();
        let err = with_ack_timeout("order_created", Duration::from_secs(5), pending)
            .await
            .unwrap_err();

        match err {
            PublishError::Timeout { topic, timeout } => {
                assert_eq!(topic, "order_created");
                assert_eq!(timeout, Duration::from_secs(5));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ack_within_timeout_passes_through() {
        let ack = with_ack_timeout("order_created", Duration::from_secs(5), async {
            Ok(Acknowledgement::new("order_created", Some(9)))
        })
        .await
        .unwrap();
        assert_eq!(ack.sequence, Some(9));
    }
}
