//! Guarded write-then-notify for state-changing operations.
//!
//! A create or update runs inside one store transaction and announces the
//! change on `{resource}_{action}`. With the default
//! [`NotifyOrdering::PublishThenCommit`] the write is committed only after the
//! broker acknowledged the event, so a failed publish leaves no trace in the
//! store. The transaction is ended exactly once on every path.

use std::sync::Arc;

use database::{
    DeleteResult, Document, DocumentStore, Filter, StoreError, StoreResult, Transaction, Update,
};
use messaging::{EventPublisher, EventPublisherExt, MutationAction, MutationEvent, PublishError};
use mongodb::bson::{self, Document as BsonDocument};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Order of the commit and the publish within a guarded mutation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotifyOrdering {
    /// Commit only once the event is acknowledged. A commit failure after an
    /// acknowledged publish leaves a delivered event for a change that never
    /// happened; it is logged at error level.
    #[default]
    PublishThenCommit,
    /// Commit first, then publish. A publish failure is logged and the
    /// committed result is still returned.
    CommitThenPublish,
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

enum MutationKind {
    Create { payload: BsonDocument },
    Update { filter: Filter, patch: Update },
}

/// A guarded mutation and the request body to echo in its event.
pub struct MutationRequest {
    kind: MutationKind,
    request_body: serde_json::Value,
}

impl MutationRequest {
    pub fn create<P>(payload: &P, request_body: serde_json::Value) -> StoreResult<Self>
    where
        P: Serialize + ?Sized,
    {
        Ok(Self {
            kind: MutationKind::Create {
                payload: bson::to_document(payload)?,
            },
            request_body,
        })
    }

    pub fn update(filter: Filter, patch: Update, request_body: serde_json::Value) -> Self {
        Self {
            kind: MutationKind::Update { filter, patch },
            request_body,
        }
    }

    pub fn action(&self) -> MutationAction {
        match self.kind {
            MutationKind::Create { .. } => MutationAction::Created,
            MutationKind::Update { .. } => MutationAction::Updated,
        }
    }
}

pub struct MutationCoordinator<S, P: ?Sized> {
    store: Arc<S>,
    publisher: Arc<P>,
    resource: &'static str,
    ordering: NotifyOrdering,
}

impl<S, P: ?Sized> Clone for MutationCoordinator<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            publisher: Arc::clone(&self.publisher),
            resource: self.resource,
            ordering: self.ordering,
        }
    }
}

impl<S, P> MutationCoordinator<S, P>
where
    P: EventPublisher + ?Sized,
{
    /// Coordinator announcing changes to `resource`, e.g. `order`.
    pub fn new(store: Arc<S>, publisher: Arc<P>, resource: &'static str) -> Self {
        Self {
            store,
            publisher,
            resource,
            ordering: NotifyOrdering::default(),
        }
    }

    pub fn with_ordering(mut self, ordering: NotifyOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn ordering(&self) -> NotifyOrdering {
        self.ordering
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// Run a guarded create or update and return the stored document.
    #[instrument(
        skip(self, request),
        fields(resource = self.resource, action = %request.action(), ordering = %self.ordering)
    )]
    pub async fn execute<T>(&self, request: MutationRequest) -> Result<T, MutationError>
    where
        T: Document,
        S: DocumentStore<T>,
    {
        let mut txn = self.store.start_transaction().await?;
        debug!(txn_id = %txn.id(), "Guarded mutation started");

        let result = self.write_then_notify::<T>(&mut txn, request).await;
        if result.is_err() && txn.is_active() {
            // abort never fails on an active transaction
            let _ = txn.abort().await;
        }
        txn.end().await;
        result
    }

    async fn write_then_notify<T>(
        &self,
        txn: &mut Transaction<<S as DocumentStore<T>>::Session>,
        request: MutationRequest,
    ) -> Result<T, MutationError>
    where
        T: Document,
        S: DocumentStore<T>,
    {
        let action = request.action();
        let MutationRequest { kind, request_body } = request;

        let document: T = match kind {
            MutationKind::Create { payload } => {
                self.store.create(&payload, Some(&mut *txn)).await?
            }
            MutationKind::Update { filter, patch } => {
                self.store
                    .find_and_update(filter, patch, Some(&mut *txn))
                    .await?
            }
        };

        let entity_id = document.id();
        let event = MutationEvent::new(entity_id, action, request_body);
        let topic = event.topic(self.resource);

        match self.ordering {
            NotifyOrdering::PublishThenCommit => {
                let ack = self
                    .publisher
                    .publish(&topic, &event)
                    .await
                    .inspect_err(|e| {
                        warn!(%topic, error = %e, "Event not acknowledged, discarding write")
                    })?;
                debug!(%topic, sequence = ?ack.sequence, "Event acknowledged");

                if let Err(e) = txn.commit().await {
                    error!(
                        %entity_id,
                        %topic,
                        error = %e,
                        "Commit failed after event was published, \
                         consumers saw a change that was not persisted"
                    );
                    return Err(e.into());
                }
            }
            NotifyOrdering::CommitThenPublish => {
                txn.commit().await?;

                match self.publisher.publish(&topic, &event).await {
                    Ok(ack) => debug!(%topic, sequence = ?ack.sequence, "Event acknowledged"),
                    Err(e) => error!(
                        %entity_id,
                        %topic,
                        error = %e,
                        "Event not published after commit, change persisted without notification"
                    ),
                }
            }
        }

        info!(%entity_id, %topic, "Mutation committed");
        Ok(document)
    }

    /// Remove the first document matching `filter`.
    ///
    /// Deletes run outside any transaction and publish nothing.
    #[instrument(skip(self), fields(resource = self.resource))]
    pub async fn delete<T>(&self, filter: Filter) -> Result<DeleteResult, MutationError>
    where
        T: Document,
        S: DocumentStore<T>,
    {
        let result = self.store.soft_delete(filter).await?;
        info!(deleted = result.deleted_count, "Delete completed without notification");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::by_id;
    use database::memory::MemoryDocumentStore;
    use messaging::{FailingPublisher, RecordingPublisher};
    use mongodb::bson::doc;
    use serde_json::json;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id")]
        id: Uuid,
        text: String,
    }

    impl Document for Note {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    #[derive(Serialize)]
    struct NewNote<'a> {
        text: &'a str,
    }

    fn coordinator<P: EventPublisher>(
        publisher: P,
    ) -> (
        MemoryDocumentStore<Note>,
        MutationCoordinator<MemoryDocumentStore<Note>, P>,
    ) {
        let store = MemoryDocumentStore::<Note>::new();
        let coordinator =
            MutationCoordinator::new(Arc::new(store.clone()), Arc::new(publisher), "note");
        (store, coordinator)
    }

    #[test]
    fn test_ordering_parses_from_snake_case() {
        assert_eq!(
            "commit_then_publish".parse::<NotifyOrdering>().unwrap(),
            NotifyOrdering::CommitThenPublish
        );
        assert_eq!(NotifyOrdering::default().to_string(), "publish_then_commit");
        assert!("sometimes".parse::<NotifyOrdering>().is_err());
    }

    #[tokio::test]
    async fn test_create_publishes_then_commits() {
        let publisher = RecordingPublisher::new();
        let (store, coordinator) = coordinator(publisher.clone());

        let request =
            MutationRequest::create(&NewNote { text: "hi" }, json!({ "text": "hi" })).unwrap();
        let note: Note = coordinator.execute(request).await.unwrap();

        assert_eq!(note.text, "hi");
        assert_eq!(store.find_one(by_id(note.id)).await.unwrap(), note);
        assert_eq!(publisher.topics(), vec!["note_created"]);
        assert_eq!(
            publisher.events()[0].payload,
            json!({ "entityId": note.id, "action": "created", "requestBody": { "text": "hi" } })
        );

        let stats = store.transaction_stats();
        assert_eq!((stats.begun, stats.committed, stats.ended), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_failed_publish_discards_write() {
        let (store, coordinator) = coordinator(FailingPublisher::default());

        let request = MutationRequest::create(&NewNote { text: "lost" }, json!({})).unwrap();
        let result = coordinator.execute::<Note>(request).await;

        assert!(matches!(result, Err(MutationError::Publish(_))));
        assert_eq!(store.count().await, 0);
        let stats = store.transaction_stats();
        assert_eq!((stats.committed, stats.aborted, stats.ended), (0, 1, 1));
    }

    #[tokio::test]
    async fn test_update_of_missing_document_publishes_nothing() {
        let publisher = RecordingPublisher::new();
        let (store, coordinator) = coordinator(publisher.clone());

        let request = MutationRequest::update(
            by_id(Uuid::now_v7()),
            doc! { "$set": { "text": "x" } },
            json!({ "text": "x" }),
        );
        let result = coordinator.execute::<Note>(request).await;

        assert!(matches!(result, Err(MutationError::Store(StoreError::NotFound))));
        assert!(publisher.is_empty());
        assert_eq!(store.transaction_stats().ended, 1);
    }

    #[tokio::test]
    async fn test_commit_then_publish_tolerates_publish_failure() {
        let publisher = FailingPublisher::default();
        let (store, coordinator) = coordinator(publisher.clone());
        let coordinator = coordinator.with_ordering(NotifyOrdering::CommitThenPublish);

        let request = MutationRequest::create(&NewNote { text: "kept" }, json!({})).unwrap();
        let note: Note = coordinator.execute(request).await.unwrap();

        assert_eq!(store.find_one(by_id(note.id)).await.unwrap().text, "kept");
        assert_eq!(publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_unguarded() {
        let publisher = RecordingPublisher::new();
        let (store, coordinator) = coordinator(publisher.clone());
        let note: Note = store.create(&NewNote { text: "bye" }, None).await.unwrap();

        let result = coordinator.delete::<Note>(by_id(note.id)).await.unwrap();

        assert_eq!(result.deleted_count, 1);
        assert!(publisher.is_empty());
        assert_eq!(store.transaction_stats().begun, 0);
    }
}
