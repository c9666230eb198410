//! Event publishing for state-changing operations.
//!
//! Services notify interested parties through the backend-agnostic
//! [`EventPublisher`] trait. A publish either returns an [`Acknowledgement`]
//! from the broker or fails with a [`PublishError`] within a bounded time;
//! publishers never retry on their own.
//!
//! ```text
//! ┌───────────────┐  emit(topic, payload)  ┌──────────────────────┐
//! │ domain service│───────────────────────▶│ EventPublisher       │
//! └───────────────┘                        │  ├ NatsPublisher     │
//!                                          │  ├ RecordingPublisher│
//!                                          │  └ FailingPublisher  │
//!                                          └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use messaging::{EventPublisherExt, MutationAction, MutationEvent};
//!
//! let event = MutationEvent::new(order.id, MutationAction::Created, request_json);
//! let ack = publisher.publish(&event.topic("order"), &event).await?;
//! ```

mod config;
mod error;
mod event;
mod publisher;

#[cfg(feature = "nats")]
pub mod nats;

pub use config::PublisherConfig;
pub use error::{ErrorCategory, PublishError};
pub use event::{topic_for, MutationAction, MutationEvent};
pub use publisher::{
    with_ack_timeout, Acknowledgement, EventPublisher, EventPublisherExt, FailingPublisher,
    PublishedEvent, RecordingPublisher,
};
