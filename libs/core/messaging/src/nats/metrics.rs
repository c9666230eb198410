//! Prometheus metrics for event publishing.

use metrics::{counter, histogram};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PublisherMetrics {
    stream_name: String,
}

impl PublisherMetrics {
    pub fn new(stream_name: &str) -> Self {
        Self {
            stream_name: stream_name.to_string(),
        }
    }

    pub fn published(&self, topic: &str, latency: Duration) {
        counter!(
            "messaging_events_published_total",
            "stream" => self.stream_name.clone(),
            "topic" => topic.to_string()
        )
        .increment(1);

        histogram!(
            "messaging_publish_ack_seconds",
            "stream" => self.stream_name.clone(),
            "topic" => topic.to_string()
        )
        .record(latency.as_secs_f64());
    }

    pub fn failed(&self, topic: &str, kind: &'static str) {
        counter!(
            "messaging_publish_failures_total",
            "stream" => self.stream_name.clone(),
            "topic" => topic.to_string(),
            "kind" => kind
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = PublisherMetrics::new("ORDERS");
        metrics.published("order_created", Duration::from_millis(3));
        metrics.failed("order_created", "timeout");
    }
}
