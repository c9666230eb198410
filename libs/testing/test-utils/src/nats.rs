//! NATS test infrastructure
//!
//! Provides a `TestNats` helper backed by a JetStream-enabled NATS container,
//! plus helpers to read back what a publisher wrote to a stream.

use std::time::Duration;

use async_nats::Client;
use async_nats::jetstream::{self, consumer, stream};
use futures::StreamExt;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::nats::Nats;

/// A message read back from a JetStream stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Test NATS wrapper that ensures proper cleanup
///
/// The container is stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestNats;
///
/// # async fn example() {
/// let nats = TestNats::new().await;
/// nats.create_stream("ORDERS", &["order_created"]).await;
///
/// // ... publish through the code under test ...
///
/// let messages = nats.read_stream("ORDERS", 10).await;
/// # }
/// ```
pub struct TestNats {
    #[allow(dead_code)]
    container: ContainerAsync<Nats>,
    client: Client,
    url: String,
}

impl TestNats {
    /// Start NATS with JetStream enabled (`-js`).
    pub async fn new() -> Self {
        let container = Nats::default()
            .with_tag("latest")
            .with_cmd(["-js"])
            .start()
            .await
            .expect("Failed to start NATS container");

        let host_port = container
            .get_host_port_ipv4(4222)
            .await
            .expect("Failed to get NATS port");

        let url = format!("nats://127.0.0.1:{}", host_port);
        let client = async_nats::connect(&url)
            .await
            .expect("Failed to connect to NATS");

        tracing::info!(port = host_port, "Test NATS ready with JetStream");

        Self {
            container,
            client,
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn jetstream(&self) -> jetstream::Context {
        jetstream::new(self.client.clone())
    }

    /// Create a stream capturing `subjects`.
    pub async fn create_stream(&self, name: &str, subjects: &[&str]) {
        self.jetstream()
            .create_stream(stream::Config {
                name: name.to_string(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            })
            .await
            .expect("Failed to create stream");
    }

    /// Read up to `max` messages from the start of stream `name`.
    pub async fn read_stream(&self, name: &str, max: usize) -> Vec<StoredMessage> {
        let stream = self
            .jetstream()
            .get_stream(name)
            .await
            .expect("Failed to get stream");

        let consumer: consumer::PullConsumer = stream
            .create_consumer(consumer::pull::Config {
                deliver_policy: consumer::DeliverPolicy::All,
                ..Default::default()
            })
            .await
            .expect("Failed to create consumer");

        let mut batch = consumer
            .fetch()
            .max_messages(max)
            .expires(Duration::from_secs(1))
            .messages()
            .await
            .expect("Failed to fetch messages");

        let mut messages = Vec::new();
        while let Some(message) = batch.next().await {
            let message = message.expect("Failed to receive message");
            messages.push(StoredMessage {
                subject: message.subject.to_string(),
                payload: message.payload.to_vec(),
            });
            message.ack().await.expect("Failed to ack message");
        }
        messages
    }
}

impl Drop for TestNats {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test NATS container");
    }
}
