use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use mongodb::bson::Document as BsonDocument;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Collection, Version};
use crate::document::{Session, StoreError, StoreResult};

/// Counters describing transaction lifecycles on a [`super::MemoryDocumentStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub aborted: u64,
    pub ended: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    ended: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> TransactionStats {
        TransactionStats {
            begun: self.begun.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            aborted: self.aborted.load(Ordering::SeqCst),
            ended: self.ended.load(Ordering::SeqCst),
        }
    }
}

/// Staged writes of one in-memory transaction.
///
/// Reads record the version they observed; commit fails if any touched
/// document changed since.
pub struct MemorySession {
    collection: Arc<RwLock<Collection>>,
    counters: Arc<Counters>,
    /// `None` stages a deletion.
    writes: BTreeMap<String, Option<BsonDocument>>,
    observed: HashMap<String, Version>,
}

impl MemorySession {
    pub(crate) fn new(collection: Arc<RwLock<Collection>>, counters: Arc<Counters>) -> Self {
        counters.begun.fetch_add(1, Ordering::SeqCst);
        Self {
            collection,
            counters,
            writes: BTreeMap::new(),
            observed: HashMap::new(),
        }
    }

    /// Remember the version of `key` seen by this transaction, first read wins.
    pub(crate) fn observe(&mut self, key: &str, version: Version) {
        self.observed.entry(key.to_string()).or_insert(version);
    }

    pub(crate) fn stage(&mut self, key: String, document: Option<BsonDocument>) {
        self.writes.insert(key, document);
    }

    pub(crate) fn staged_writes(&self) -> impl Iterator<Item = (&String, &Option<BsonDocument>)> {
        self.writes.iter()
    }

    pub(crate) fn is_for(&self, collection: &Arc<RwLock<Collection>>) -> bool {
        Arc::ptr_eq(&self.collection, collection)
    }

    fn discard(&mut self) {
        self.writes.clear();
        self.observed.clear();
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn commit(&mut self) -> StoreResult<()> {
        let mut collection = self.collection.write().await;

        for (key, seen) in &self.observed {
            let current = collection.version_of(key);
            if current != *seen {
                return Err(StoreError::transaction(format!(
                    "write conflict on document {key}"
                )));
            }
        }

        let writes = std::mem::take(&mut self.writes);
        let count = writes.len();
        for (key, document) in writes {
            match document {
                Some(document) => collection.put(key, document),
                None => collection.remove(&key),
            }
        }
        self.observed.clear();

        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        debug!(writes = count, "In-memory transaction committed");
        Ok(())
    }

    async fn abort(&mut self) -> StoreResult<()> {
        self.discard();
        self.counters.aborted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn end(&mut self) {
        self.counters.ended.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&mut self, active: bool) {
        if active {
            self.discard();
            self.counters.aborted.fetch_add(1, Ordering::SeqCst);
        }
        self.counters.ended.fetch_add(1, Ordering::SeqCst);
    }
}
