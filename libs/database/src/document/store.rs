use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use super::{Filter, Pagination, Session, StoreResult, Transaction, Update};

/// Store-assigned identifier, stored under `_id` in its hyphenated form.
pub type DocumentId = Uuid;

/// A record persisted by a [`DocumentStore`].
///
/// Implementors serialize their identifier as `_id`:
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Clone)]
/// struct Order {
///     #[serde(rename = "_id")]
///     id: Uuid,
///     name: String,
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    fn id(&self) -> DocumentId;
}

/// Lazy sequence of documents. Every `find` call yields a fresh stream.
pub type DocumentStream<T> = BoxStream<'static, StoreResult<T>>;

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Generic CRUD over one collection of `T`, with optional transaction scoping
/// for the write paths used by guarded mutations.
///
/// Operations given a transaction that is no longer active fail with
/// [`super::StoreError::Transaction`].
#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    type Session: Session;

    /// Persist a new document built from `payload`. The store assigns a fresh
    /// identifier; any `_id` in the payload is ignored.
    async fn create<P>(
        &self,
        payload: &P,
        txn: Option<&mut Transaction<Self::Session>>,
    ) -> StoreResult<T>
    where
        P: Serialize + Sync + ?Sized;

    /// First document matching `filter`, or `NotFound`.
    async fn find_one(&self, filter: Filter) -> StoreResult<T>;

    /// Apply `patch` to the first match and return the post-update document.
    /// Zero matches is `NotFound`; nothing is created.
    async fn find_and_update(
        &self,
        filter: Filter,
        patch: Update,
        txn: Option<&mut Transaction<Self::Session>>,
    ) -> StoreResult<T>;

    /// Update the first match with `payload`, or insert it (seeded from the
    /// filter's equality conditions) when nothing matches.
    async fn upsert<P>(&self, filter: Filter, payload: &P) -> StoreResult<T>
    where
        P: Serialize + Sync + ?Sized;

    /// All documents matching `filter`. No match is an empty stream.
    async fn find(&self, filter: Filter) -> StoreResult<DocumentStream<T>>;

    /// One page of matches, ordered by `pagination.sort`.
    async fn find_with_pagination(
        &self,
        filter: Filter,
        pagination: &Pagination,
    ) -> StoreResult<DocumentStream<T>>;

    /// Remove the first match. Zero matches is `NotFound`.
    async fn soft_delete(&self, filter: Filter) -> StoreResult<DeleteResult>;

    /// Open a transaction scope in the `Active` state.
    async fn start_transaction(&self) -> StoreResult<Transaction<Self::Session>>;
}
