//! End-to-end tests against real MongoDB and NATS containers.
//!
//! Run with `cargo test -p domain_orders -- --ignored` (requires Docker).

use core_config::Environment;
use core_config::tracing::init_tracing;
use database::mongodb::{MongoConfig, MongoDocumentStore};
use database::{DocumentStore, Pagination, Sort, SortDirection, StoreError, by_id};
use domain_orders::mongodb::{MongoOrderStore, connect};
use domain_orders::{CreateOrder, Order, OrderError, OrderService, OrdersConfig, UpdateOrder};
use messaging::nats::NatsPublisher;
use messaging::{FailingPublisher, PublisherConfig};
use mongodb::bson::doc;
use serde_json::{Value, json};
use test_utils::assertions::{assert_some, assert_uuid_eq};
use test_utils::{TestDataBuilder, TestMongo, TestNats};

async fn order_store(mongo: &TestMongo, test_name: &str) -> MongoOrderStore {
    init_tracing(&Environment::from_env());

    let config = OrdersConfig {
        mongo: MongoConfig::new(mongo.url(), mongo.database_name(test_name)),
        ..OrdersConfig::default()
    };
    connect(&config).await.unwrap()
}

fn order_input(builder: &TestDataBuilder, suffix: &str) -> CreateOrder {
    CreateOrder {
        name: builder.name("order", suffix),
        price: builder.price(),
        phone_number: builder.phone_number(),
    }
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_create_and_update_reach_mongo_and_jetstream() {
    let mongo = TestMongo::new().await;
    let nats = TestNats::new().await;
    nats.create_stream("ORDERS", &["order_created", "order_updated"]).await;

    let config = PublisherConfig::new(nats.url()).with_stream("ORDERS");
    let publisher = NatsPublisher::connect(&config).await.unwrap();
    let store = order_store(&mongo, "orders_e2e").await;
    let service = OrderService::new(store, publisher);
    let builder =
        TestDataBuilder::from_test_name("test_create_and_update_reach_mongo_and_jetstream");

    let created = service
        .create_order(order_input(&builder, "main"))
        .await
        .unwrap();
    let updated = service
        .update_order(
            created.id,
            UpdateOrder {
                price: Some(12.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.price, 12.5);
    assert_eq!(service.get_order(created.id).await.unwrap(), updated);

    let messages = nats.read_stream("ORDERS", 10).await;
    let subjects: Vec<&str> = messages.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, vec!["order_created", "order_updated"]);

    let update_event = assert_some(messages.get(1), "order_updated message");
    let event: Value = serde_json::from_slice(&update_event.payload).unwrap();
    let entity_id = assert_some(event["entityId"].as_str(), "entityId");
    assert_uuid_eq(entity_id.parse().unwrap(), created.id, "announced order");
    assert_eq!(event["action"], "updated");
    assert_eq!(event["requestBody"]["price"], 12.5);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_failed_publish_aborts_mongo_transaction() {
    let mongo = TestMongo::new().await;
    let store = order_store(&mongo, "orders_abort").await;
    let service = OrderService::new(store, FailingPublisher::default());
    let builder = TestDataBuilder::from_test_name("test_failed_publish_aborts_mongo_transaction");

    let err = service
        .create_order(order_input(&builder, "lost"))
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::Publish(_)));
    assert!(service.get_orders().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_pagination_and_delete() {
    let mongo = TestMongo::new().await;
    let store: MongoDocumentStore<Order> = order_store(&mongo, "orders_pages").await;
    let service = OrderService::new(store, messaging::RecordingPublisher::new());
    let builder = TestDataBuilder::from_test_name("test_pagination_and_delete");

    for i in 1..=15 {
        service
            .create_order(CreateOrder {
                price: i as f64,
                ..order_input(&builder, &i.to_string())
            })
            .await
            .unwrap();
    }

    let page = service
        .list_orders(
            Pagination::new(2, 10)
                .unwrap()
                .with_sort(Sort::by("price", SortDirection::Descending)),
        )
        .await
        .unwrap();
    let prices: Vec<f64> = page.iter().map(|o| o.price).collect();
    assert_eq!(prices, vec![5.0, 4.0, 3.0, 2.0, 1.0]);

    let cheapest = page[4].id;
    service.delete_order(cheapest).await.unwrap();
    assert!(matches!(
        service.get_order(cheapest).await,
        Err(OrderError::NotFound(_))
    ));
    assert_eq!(service.get_orders().await.unwrap().len(), 14);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_rejected_writes_leave_collection_untouched() {
    let mongo = TestMongo::new().await;
    let store = order_store(&mongo, "orders_rejected").await;
    let service = OrderService::new(store.clone(), messaging::RecordingPublisher::new());
    let builder =
        TestDataBuilder::from_test_name("test_rejected_writes_leave_collection_untouched");

    let order = service
        .create_order(order_input(&builder, "kept"))
        .await
        .unwrap();

    let result = store
        .find_and_update(by_id(order.id), doc! { "$unset": { "name": "" } }, None)
        .await;
    assert!(matches!(result, Err(StoreError::Validation(_))));
    assert_eq!(service.get_order(order.id).await.unwrap(), order);

    let result = store
        .upsert(doc! { "name": order.name.clone() }, &json!({ "price": "free" }))
        .await;
    assert!(matches!(result, Err(StoreError::Validation(_))));
    assert_eq!(service.get_order(order.id).await.unwrap(), order);
    assert_eq!(service.get_orders().await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_upsert_with_id_operator_assigns_uuid() {
    let mongo = TestMongo::new().await;
    let store = order_store(&mongo, "orders_upsert").await;
    let builder = TestDataBuilder::from_test_name("test_upsert_with_id_operator_assigns_uuid");
    let now = chrono::Utc::now();

    let order = store
        .upsert(
            doc! { "_id": { "$in": ["missing-a", "missing-b"] } },
            &json!({
                "name": builder.name("order", "upserted"),
                "price": builder.price(),
                "phoneNumber": builder.phone_number(),
                "createdAt": now,
                "updatedAt": now,
            }),
        )
        .await
        .unwrap();

    assert_eq!(order.id.get_version_num(), 7);
    assert_eq!(store.find_one(by_id(order.id)).await.unwrap(), order);
}
