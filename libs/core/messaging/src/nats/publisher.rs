use std::sync::Arc;
use std::time::{Duration, Instant};

use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::PublisherMetrics;
use crate::config::PublisherConfig;
use crate::error::PublishError;
use crate::publisher::{with_ack_timeout, Acknowledgement, EventPublisher};

/// [`EventPublisher`] backed by NATS JetStream.
///
/// Each topic is used as the subject. The stream covering the subjects must
/// exist; see [`NatsPublisher::ensure_stream`].
#[derive(Clone)]
pub struct NatsPublisher {
    jetstream: Arc<Context>,
    stream_name: String,
    ack_timeout: Duration,
    metrics: PublisherMetrics,
}

impl NatsPublisher {
    pub fn new(jetstream: Context, stream_name: impl Into<String>, ack_timeout: Duration) -> Self {
        let stream_name = stream_name.into();
        Self {
            jetstream: Arc::new(jetstream),
            metrics: PublisherMetrics::new(&stream_name),
            stream_name,
            ack_timeout,
        }
    }

    /// Connect to the server named in `config`.
    pub async fn connect(config: &PublisherConfig) -> Result<Self, PublishError> {
        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connect(config.url.as_str())
            .await
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;

        info!(url = %config.url, stream = %config.stream_name, "Connected to NATS");
        Ok(Self::new(
            jetstream::new(client),
            config.stream_name.clone(),
            config.ack_timeout,
        ))
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Create the stream capturing `subjects` if it does not exist yet.
    pub async fn ensure_stream(&self, subjects: Vec<String>) -> Result<(), PublishError> {
        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream_name.clone(),
                subjects,
                ..Default::default()
            })
            .await
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;
        debug!(stream = %self.stream_name, "Stream ready");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    #[instrument(skip(self, payload), fields(stream = %self.stream_name))]
    async fn emit(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<Acknowledgement, PublishError> {
        let body = serde_json::to_vec(payload)?;
        let started = Instant::now();
        let jetstream = Arc::clone(&self.jetstream);

        let result = with_ack_timeout(topic, self.ack_timeout, async move {
            let ack = jetstream
                .publish(topic.to_string(), body.into())
                .await
                .map_err(|e| PublishError::Unavailable(e.to_string()))?
                .await
                .map_err(|e| PublishError::Rejected {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Acknowledgement::new(topic, Some(ack.sequence)))
        })
        .await;

        match &result {
            Ok(ack) => {
                self.metrics.published(topic, started.elapsed());
                debug!(sequence = ?ack.sequence, "Event acknowledged");
            }
            Err(e) => {
                self.metrics.failed(topic, e.kind());
                warn!(error = %e, "Event was not acknowledged");
            }
        }
        result
    }

    fn name(&self) -> &'static str {
        "nats_publisher"
    }
}
