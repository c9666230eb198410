//! MongoDB wiring for the order service

use database::mongodb::{Client, MongoDocumentStore, connect_from_config_with_retry};
use tracing::info;

use crate::config::OrdersConfig;
use crate::error::{OrderError, OrderResult};
use crate::models::Order;

/// Order store over the configured MongoDB collection.
pub type MongoOrderStore = MongoDocumentStore<Order>;

/// Store for `config.collection` on an existing client.
pub fn order_store(client: &Client, config: &OrdersConfig) -> MongoOrderStore {
    MongoDocumentStore::new(client, &config.mongo.database, &config.collection)
}

/// Connect with the default retry policy and open the order collection.
///
/// The deployment must be a replica set; guarded mutations use multi-document
/// transactions.
pub async fn connect(config: &OrdersConfig) -> OrderResult<MongoOrderStore> {
    let client = connect_from_config_with_retry(&config.mongo, None)
        .await
        .map_err(|e| OrderError::Database(e.to_string()))?;

    let store = order_store(&client, config);
    info!(
        database = %config.mongo.database,
        collection = %store.collection_name(),
        "Order store ready"
    );
    Ok(store)
}
