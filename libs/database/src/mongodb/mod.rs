//! MongoDB backend.
//!
//! Multi-document transactions require a replica set or sharded cluster;
//! against a standalone server `start_transaction` fails with a
//! [`crate::StoreError::Transaction`].

mod config;
mod connector;
mod session;
mod store;

pub use config::MongoConfig;
pub use connector::{MongoError, connect_from_config, connect_from_config_with_retry};
pub use session::MongoSession;
pub use store::MongoDocumentStore;

// Re-export MongoDB types for convenience
pub use mongodb::{Client, Database};
