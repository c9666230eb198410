//! MongoDB test infrastructure
//!
//! Provides a `TestMongo` helper running a single-node replica set, which
//! multi-document transactions require.

use mongodb::Client;
use mongodb::bson::doc;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

/// Test MongoDB wrapper that ensures proper cleanup
///
/// The container is stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestMongo;
///
/// # async fn example() {
/// let mongo = TestMongo::new().await;
/// let client = mongo.client();
/// let database = mongo.database_name("orders_test");
/// # }
/// ```
pub struct TestMongo {
    #[allow(dead_code)]
    container: ContainerAsync<Mongo>,
    client: Client,
    url: String,
}

impl TestMongo {
    /// Start a replica set member and wait until it accepts commands.
    pub async fn new() -> Self {
        let container = Mongo::repl_set()
            .start()
            .await
            .expect("Failed to start MongoDB container");

        let host_port = container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");

        let url = format!("mongodb://127.0.0.1:{}/?directConnection=true", host_port);
        let client = Client::with_uri_str(&url)
            .await
            .expect("Failed to connect to MongoDB");

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .expect("MongoDB did not answer ping");

        tracing::info!(port = host_port, "Test MongoDB replica set ready");

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

    /// A database name unique to this run, so tests sharing a container do
    /// not see each other's documents.
    pub fn database_name(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, uuid::Uuid::now_v7().simple())
    }
}

impl Drop for TestMongo {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test MongoDB container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_transactions_are_supported() {
        let mongo = TestMongo::new().await;
        let client = mongo.client();
        let collection = client
            .database(&mongo.database_name("tx"))
            .collection::<mongodb::bson::Document>("items");
        collection
            .insert_one(doc! { "seed": true })
            .await
            .expect("Failed to create collection");

        let mut session = client.start_session().await.unwrap();
        session.start_transaction().await.unwrap();
        collection
            .insert_one(doc! { "name": "inside" })
            .session(&mut session)
            .await
            .unwrap();
        session.abort_transaction().await.unwrap();

        let count = collection.count_documents(doc! {}).await.unwrap();
        assert_eq!(count, 1);
    }
}
