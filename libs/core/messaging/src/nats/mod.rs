//! NATS JetStream publisher.
//!
//! Events are published to JetStream so they are persisted by a stream and
//! acknowledged by the server before `emit` returns.

mod metrics;
mod publisher;

pub use metrics::PublisherMetrics;
pub use publisher::NatsPublisher;
