//! Order service settings.

use core_config::{ConfigError, FromEnv, env_or_default, env_parse};
use database::mongodb::MongoConfig;
use messaging::PublisherConfig;

use crate::coordinator::NotifyOrdering;

/// Everything needed to wire an order service against MongoDB and NATS.
#[derive(Debug, Clone)]
pub struct OrdersConfig {
    pub mongo: MongoConfig,
    pub publisher: PublisherConfig,
    pub collection: String,
    pub ordering: NotifyOrdering,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            mongo: MongoConfig::default(),
            publisher: PublisherConfig::default(),
            collection: "orders".to_string(),
            ordering: NotifyOrdering::default(),
        }
    }
}

/// Environment variables, in addition to those read by [`MongoConfig`] and
/// [`PublisherConfig`]:
/// - `ORDERS_COLLECTION` (default: `orders`)
/// - `ORDERS_NOTIFY_ORDERING`: `publish_then_commit` (default) or `commit_then_publish`
impl FromEnv for OrdersConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            mongo: MongoConfig::from_env()?,
            publisher: PublisherConfig::from_env()?,
            collection: env_or_default("ORDERS_COLLECTION", "orders"),
            ordering: env_parse("ORDERS_NOTIFY_ORDERING", NotifyOrdering::default())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONGO_VARS: [(&str, Option<&str>); 2] = [
        ("MONGODB_URI", Some("mongodb://localhost:27017/?replicaSet=rs0")),
        ("MONGODB_DATABASE", Some("shop")),
    ];

    #[test]
    fn test_defaults() {
        let vars = [
            MONGO_VARS[0],
            MONGO_VARS[1],
            ("ORDERS_COLLECTION", None),
            ("ORDERS_NOTIFY_ORDERING", None),
            ("NATS_URL", None),
        ];
        temp_env::with_vars(vars, || {
            let config = OrdersConfig::from_env().unwrap();
            assert_eq!(config.collection, "orders");
            assert_eq!(config.ordering, NotifyOrdering::PublishThenCommit);
            assert_eq!(config.mongo.database, "shop");
            assert_eq!(config.publisher.url, "nats://localhost:4222");
        });
    }

    #[test]
    fn test_ordering_override() {
        let vars = [
            MONGO_VARS[0],
            MONGO_VARS[1],
            ("ORDERS_COLLECTION", Some("orders_v2")),
            ("ORDERS_NOTIFY_ORDERING", Some("commit_then_publish")),
        ];
        temp_env::with_vars(vars, || {
            let config = OrdersConfig::from_env().unwrap();
            assert_eq!(config.collection, "orders_v2");
            assert_eq!(config.ordering, NotifyOrdering::CommitThenPublish);
        });
    }

    #[test]
    fn test_invalid_ordering_is_rejected() {
        let vars = [
            MONGO_VARS[0],
            MONGO_VARS[1],
            ("ORDERS_NOTIFY_ORDERING", Some("eventually")),
        ];
        temp_env::with_vars(vars, || {
            let err = OrdersConfig::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::ParseError { ref key, .. } if key == "ORDERS_NOTIFY_ORDERING"
            ));
        });
    }

    #[test]
    fn test_missing_mongo_uri_is_an_error() {
        let vars: [(&str, Option<&str>); 3] = [
            ("MONGODB_URI", None),
            ("MONGODB_URL", None),
            ("MONGO_URL", None),
        ];
        temp_env::with_vars(vars, || {
            assert!(matches!(
                OrdersConfig::from_env(),
                Err(ConfigError::MissingEnvVar(_))
            ));
        });
    }
}
