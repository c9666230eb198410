//! Orders Domain
//!
//! Order management on top of a transactional document store. Every create and
//! update is announced to an event broker (`order_created`, `order_updated`)
//! before the store transaction commits, so a write that could not be
//! announced is rolled back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │     OrderService     │  ← Validation, DTOs → store documents
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐      ┌────────────────┐
//! │ MutationCoordinator  │─────▶│ EventPublisher │  ← emit + ack
//! └──────────┬───────────┘      └────────────────┘
//!            │ start / commit / abort / end
//! ┌──────────▼───────────┐
//! │  DocumentStore<Order>│  ← MongoDB or in-memory
//! └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use core_config::FromEnv;
//! use domain_orders::{CreateOrder, OrderService, OrdersConfig, mongodb};
//! use messaging::RecordingPublisher;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrdersConfig::from_env()?;
//! let store = mongodb::connect(&config).await?;
//!
//! let service = OrderService::new(store, RecordingPublisher::new())
//!     .with_ordering(config.ordering);
//!
//! let order = service
//!     .create_order(CreateOrder {
//!         name: "Standing desk".to_string(),
//!         price: 499.0,
//!         phone_number: "+14155550100".to_string(),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod mongodb;
pub mod service;

pub use config::OrdersConfig;
pub use coordinator::{MutationCoordinator, MutationError, MutationRequest, NotifyOrdering};
pub use error::{OrderError, OrderResult};
pub use models::{CreateOrder, ORDER_RESOURCE, Order, UpdateOrder};
pub use service::OrderService;
