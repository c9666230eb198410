//! Transactional document storage.
//!
//! The [`document`] module defines the backend-neutral contract: the
//! [`DocumentStore`] trait, the [`Transaction`] scope that guards multi-step
//! writes, query and pagination types, and the [`StoreError`] taxonomy.
//!
//! Two backends implement it:
//!
//! - [`memory::MemoryDocumentStore`] keeps documents in process and supports
//!   real staged transactions with optimistic conflict detection. It is used by
//!   tests and local tooling.
//! - [`mongodb::MongoDocumentStore`] maps every operation onto a MongoDB
//!   collection and every transaction onto a driver `ClientSession`.
//!
//! # Features
//!
//! - `config` - `core_config::FromEnv` support for [`mongodb::MongoConfig`]
//!
//! # Example
//!
//! ```ignore
//! use database::{DocumentStore, Pagination, by_id, mongodb};
//!
//! let config = mongodb::MongoConfig::from_env()?;
//! let client = mongodb::connect_from_config_with_retry(&config, None).await?;
//! let orders = mongodb::MongoDocumentStore::<Order>::new(&client, &config.database, "orders");
//!
//! let mut txn = orders.start_transaction().await?;
//! let order = orders.create(&new_order, Some(&mut txn)).await?;
//! txn.commit().await?;
//! txn.end().await;
//! ```

pub mod common;
pub mod document;
pub mod memory;
pub mod mongodb;

pub use common::{RetryConfig, retry, retry_if, retry_with_backoff};
pub use document::{
    DeleteResult, Document, DocumentId, DocumentStore, DocumentStream, Filter, ID_FIELD,
    Pagination, Session, Sort, SortDirection, StoreError, StoreResult, Transaction,
    TransactionState, Update, by_id,
};
