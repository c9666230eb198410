//! Business logic layer for Orders

use std::sync::Arc;

use chrono::Utc;
use database::{DocumentStore, Filter, Pagination, by_id};
use futures::TryStreamExt;
use messaging::EventPublisher;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::coordinator::{MutationCoordinator, MutationRequest, NotifyOrdering};
use crate::error::{OrderError, OrderResult};
use crate::models::{CreateOrder, ORDER_RESOURCE, Order, UpdateOrder};

/// Order service. Creates and updates are guarded and announce themselves on
/// `order_created` / `order_updated`; deletes are not.
pub struct OrderService<S, P: ?Sized> {
    store: Arc<S>,
    coordinator: MutationCoordinator<S, P>,
}

impl<S, P> OrderService<S, P>
where
    S: DocumentStore<Order>,
    P: EventPublisher + ?Sized,
{
    pub fn new(store: S, publisher: P) -> Self
    where
        P: Sized,
    {
        Self::from_shared(Arc::new(store), Arc::new(publisher))
    }

    /// Build from already shared handles, e.g. an `Arc<dyn EventPublisher>`.
    pub fn from_shared(store: Arc<S>, publisher: Arc<P>) -> Self {
        let coordinator = MutationCoordinator::new(Arc::clone(&store), publisher, ORDER_RESOURCE);
        Self { store, coordinator }
    }

    pub fn with_ordering(mut self, ordering: NotifyOrdering) -> Self {
        self.coordinator = self.coordinator.with_ordering(ordering);
        self
    }

    /// Validate, persist and announce a new order.
    #[instrument(skip(self, input), fields(order_name = %input.name))]
    pub async fn create_order(&self, input: CreateOrder) -> OrderResult<Order> {
        input.validate()?;

        let request_body =
            serde_json::to_value(&input).map_err(|e| OrderError::Validation(e.to_string()))?;
        let request = MutationRequest::create(&input.into_new_order(Utc::now()), request_body)?;

        let order: Order = self.coordinator.execute(request).await?;
        info!(order_id = %order.id, "Order created");
        Ok(order)
    }

    /// All orders, in storage order.
    #[instrument(skip(self))]
    pub async fn get_orders(&self) -> OrderResult<Vec<Order>> {
        let orders = self.store.find(Filter::new()).await?.try_collect().await?;
        Ok(orders)
    }

    /// One page of orders.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, pagination: Pagination) -> OrderResult<Vec<Order>> {
        let orders = self
            .store
            .find_with_pagination(Filter::new(), &pagination)
            .await?
            .try_collect()
            .await?;
        Ok(orders)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid) -> OrderResult<Order> {
        self.store
            .find_one(by_id(id))
            .await
            .map_err(|e| OrderError::for_order(id, e))
    }

    /// Apply the provided fields and announce the change.
    #[instrument(skip(self, input), fields(order_id = %id))]
    pub async fn update_order(&self, id: Uuid, input: UpdateOrder) -> OrderResult<Order> {
        input.validate()?;

        let request_body =
            serde_json::to_value(&input).map_err(|e| OrderError::Validation(e.to_string()))?;
        let patch = input
            .to_patch(Utc::now())
            .map_err(|e| OrderError::Validation(e.to_string()))?;
        let request = MutationRequest::update(by_id(id), patch, request_body);

        let order: Order = self
            .coordinator
            .execute(request)
            .await
            .map_err(|e| OrderError::for_order(id, e))?;
        info!("Order updated");
        Ok(order)
    }

    /// Remove an order. No transaction, no event.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, id: Uuid) -> OrderResult<()> {
        self.coordinator
            .delete::<Order>(by_id(id))
            .await
            .map_err(|e| OrderError::for_order(id, e))?;
        info!(order_id = %id, "Order deleted");
        Ok(())
    }
}

impl<S, P: ?Sized> Clone for OrderService<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            coordinator: self.coordinator.clone(),
        }
    }
}
