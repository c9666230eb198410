//! In-process [`DocumentStore`] backend.
//!
//! Documents live in a shared ordered map guarded by a `tokio` lock. Writes
//! made through a [`Transaction`] are staged in its [`MemorySession`] and only
//! reach the map on commit, so abort and drop discard them. Each document
//! carries a version; a transaction whose documents changed underneath it
//! fails to commit with a write conflict.

mod matcher;
mod session;

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use mongodb::bson::{self, Bson, Document as BsonDocument, doc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::document::{
    DeleteResult, Document, DocumentStore, DocumentStream, Filter, ID_FIELD, Pagination,
    StoreError, StoreResult, Transaction, Update, equality_fields, id_bson, normalize_update,
};

pub use matcher::{apply_update, compare_documents, matches};
pub use session::{MemorySession, TransactionStats};

use session::Counters;

pub(crate) type Version = u64;

struct Entry {
    version: Version,
    document: BsonDocument,
}

/// Committed state shared by a store and its sessions.
#[derive(Default)]
pub(crate) struct Collection {
    entries: BTreeMap<String, Entry>,
    clock: Version,
}

impl Collection {
    /// Version of `key`, `0` when absent.
    pub(crate) fn version_of(&self, key: &str) -> Version {
        self.entries.get(key).map_or(0, |entry| entry.version)
    }

    pub(crate) fn put(&mut self, key: String, document: BsonDocument) {
        self.clock += 1;
        self.entries.insert(
            key,
            Entry {
                version: self.clock,
                document,
            },
        );
    }

    pub(crate) fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Committed documents overlaid with the session's staged writes.
    fn visible(&self, session: Option<&MemorySession>) -> BTreeMap<String, BsonDocument> {
        let mut view: BTreeMap<String, BsonDocument> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.document.clone()))
            .collect();
        if let Some(session) = session {
            for (key, staged) in session.staged_writes() {
                match staged {
                    Some(document) => view.insert(key.clone(), document.clone()),
                    None => view.remove(key),
                };
            }
        }
        view
    }

    fn first_match(
        &self,
        filter: &Filter,
        session: Option<&MemorySession>,
    ) -> StoreResult<Option<(String, BsonDocument)>> {
        for (key, document) in self.visible(session) {
            if matches(&document, filter)? {
                return Ok(Some((key, document)));
            }
        }
        Ok(None)
    }

    fn all_matches(&self, filter: &Filter) -> StoreResult<Vec<BsonDocument>> {
        let mut found = Vec::new();
        for entry in self.entries.values() {
            if matches(&entry.document, filter)? {
                found.push(entry.document.clone());
            }
        }
        Ok(found)
    }
}

/// In-memory implementation of [`DocumentStore`].
pub struct MemoryDocumentStore<T> {
    collection: Arc<RwLock<Collection>>,
    counters: Arc<Counters>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for MemoryDocumentStore<T> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            counters: Arc::clone(&self.counters),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MemoryDocumentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryDocumentStore<T> {
    pub fn new() -> Self {
        Self {
            collection: Arc::new(RwLock::new(Collection::default())),
            counters: Arc::new(Counters::default()),
            _marker: PhantomData,
        }
    }

    /// Number of committed documents.
    pub async fn count(&self) -> usize {
        self.collection.read().await.entries.len()
    }

    pub fn transaction_stats(&self) -> TransactionStats {
        self.counters.snapshot()
    }

    fn session_for<'a>(
        &self,
        txn: Option<&'a mut Transaction<MemorySession>>,
    ) -> StoreResult<Option<&'a mut MemorySession>> {
        let Some(txn) = txn else {
            return Ok(None);
        };
        let session = txn.session_mut()?;
        if !session.is_for(&self.collection) {
            return Err(StoreError::transaction(
                "transaction was started by a different store",
            ));
        }
        Ok(Some(session))
    }
}

fn encode<P: Serialize + ?Sized>(payload: &P) -> StoreResult<BsonDocument> {
    Ok(bson::to_document(payload)?)
}

fn decode<T: Document>(document: BsonDocument) -> StoreResult<T> {
    Ok(bson::from_document(document)?)
}

/// New document with `_id` first, followed by the payload fields.
fn with_id(id: Bson, fields: BsonDocument) -> BsonDocument {
    let mut document = BsonDocument::new();
    document.insert(ID_FIELD, id);
    for (key, value) in fields {
        if key != ID_FIELD {
            document.insert(key, value);
        }
    }
    document
}

fn stream_of<T: Document>(documents: Vec<BsonDocument>) -> DocumentStream<T> {
    futures::stream::iter(documents.into_iter().map(decode::<T>)).boxed()
}

#[async_trait]
impl<T: Document> DocumentStore<T> for MemoryDocumentStore<T> {
    type Session = MemorySession;

    #[instrument(skip_all)]
    async fn create<P>(
        &self,
        payload: &P,
        txn: Option<&mut Transaction<MemorySession>>,
    ) -> StoreResult<T>
    where
        P: Serialize + Sync + ?Sized,
    {
        let id = Uuid::now_v7();
        let document = with_id(id_bson(id), encode(payload)?);
        let created = decode::<T>(document.clone())?;
        let key = id.to_string();

        match self.session_for(txn)? {
            Some(session) => {
                session.observe(&key, 0);
                session.stage(key, Some(document));
            }
            None => {
                let mut collection = self.collection.write().await;
                if collection.version_of(&key) != 0 {
                    return Err(StoreError::Database(format!("duplicate key {key}")));
                }
                collection.put(key, document);
            }
        }

        debug!(document_id = %id, "Document created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn find_one(&self, filter: Filter) -> StoreResult<T> {
        let collection = self.collection.read().await;
        match collection.first_match(&filter, None)? {
            Some((_, document)) => decode(document),
            None => {
                warn!(%filter, "Document not found");
                Err(StoreError::NotFound)
            }
        }
    }

    #[instrument(skip(self, patch, txn))]
    async fn find_and_update(
        &self,
        filter: Filter,
        patch: Update,
        txn: Option<&mut Transaction<MemorySession>>,
    ) -> StoreResult<T> {
        let update = normalize_update(patch)?;

        match self.session_for(txn)? {
            Some(session) => {
                let (key, version, mut document) = {
                    let collection = self.collection.read().await;
                    let Some((key, document)) = collection.first_match(&filter, Some(&*session))?
                    else {
                        warn!(%filter, "Document not found for update");
                        return Err(StoreError::NotFound);
                    };
                    let version = collection.version_of(&key);
                    (key, version, document)
                };
                apply_update(&mut document, &update)?;
                let updated = decode::<T>(document.clone())?;
                session.observe(&key, version);
                session.stage(key, Some(document));
                Ok(updated)
            }
            None => {
                let mut collection = self.collection.write().await;
                let Some((key, mut document)) = collection.first_match(&filter, None)? else {
                    warn!(%filter, "Document not found for update");
                    return Err(StoreError::NotFound);
                };
                apply_update(&mut document, &update)?;
                let updated = decode::<T>(document.clone())?;
                collection.put(key, document);
                Ok(updated)
            }
        }
    }

    #[instrument(skip_all, fields(filter = %filter))]
    async fn upsert<P>(&self, filter: Filter, payload: &P) -> StoreResult<T>
    where
        P: Serialize + Sync + ?Sized,
    {
        let mut fields = encode(payload)?;
        fields.remove(ID_FIELD);
        let update = doc! { "$set": fields };

        let mut collection = self.collection.write().await;
        let (key, document) = match collection.first_match(&filter, None)? {
            Some((key, mut document)) => {
                apply_update(&mut document, &update)?;
                (key, document)
            }
            None => {
                let mut seed = equality_fields(&filter);
                let id = match seed.remove(ID_FIELD) {
                    Some(id) => id,
                    None => id_bson(Uuid::now_v7()),
                };
                let mut document = with_id(id, BsonDocument::new());
                apply_update(&mut document, &doc! { "$set": seed })?;
                apply_update(&mut document, &update)?;
                let key = match document.get(ID_FIELD) {
                    Some(Bson::String(key)) => key.clone(),
                    Some(other) => other.to_string(),
                    None => return Err(StoreError::validation("upserted document has no _id")),
                };
                debug!(document_id = %key, "Upsert inserted a new document");
                (key, document)
            }
        };

        let value = decode::<T>(document.clone())?;
        collection.put(key, document);
        Ok(value)
    }

    #[instrument(skip(self))]
    async fn find(&self, filter: Filter) -> StoreResult<DocumentStream<T>> {
        let documents = self.collection.read().await.all_matches(&filter)?;
        Ok(stream_of(documents))
    }

    #[instrument(skip(self))]
    async fn find_with_pagination(
        &self,
        filter: Filter,
        pagination: &Pagination,
    ) -> StoreResult<DocumentStream<T>> {
        pagination.validate()?;

        let mut documents = self.collection.read().await.all_matches(&filter)?;
        if !pagination.sort.is_empty() {
            documents.sort_by(|a, b| compare_documents(a, b, &pagination.sort));
        }

        let page = documents
            .into_iter()
            .skip(pagination.skip() as usize)
            .take(pagination.limit as usize)
            .collect();
        Ok(stream_of(page))
    }

    #[instrument(skip(self))]
    async fn soft_delete(&self, filter: Filter) -> StoreResult<DeleteResult> {
        let mut collection = self.collection.write().await;
        let Some((key, _)) = collection.first_match(&filter, None)? else {
            warn!(%filter, "Document not found for delete");
            return Err(StoreError::NotFound);
        };
        collection.remove(&key);
        debug!(document_id = %key, "Document deleted");
        Ok(DeleteResult { deleted_count: 1 })
    }

    async fn start_transaction(&self) -> StoreResult<Transaction<MemorySession>> {
        Ok(Transaction::begin(MemorySession::new(
            Arc::clone(&self.collection),
            Arc::clone(&self.counters),
        )))
    }
}
