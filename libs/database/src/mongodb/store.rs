use std::marker::PhantomData;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{self, Document as BsonDocument, doc};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::MongoSession;
use crate::document::{
    DeleteResult, Document, DocumentStore, DocumentStream, Filter, ID_FIELD, Pagination,
    StoreError, StoreResult, Transaction, Update, equality_fields, id_bson, normalize_update,
};

/// [`DocumentStore`] over one MongoDB collection.
///
/// Documents are written as plain BSON documents so identifiers keep their
/// string form regardless of how the driver would serialize `T`.
pub struct MongoDocumentStore<T> {
    client: Client,
    collection: Collection<BsonDocument>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for MongoDocumentStore<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            collection: self.collection.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> MongoDocumentStore<T> {
    pub fn new(client: &Client, database: &str, collection: &str) -> Self {
        Self {
            client: client.clone(),
            collection: client.database(database).collection(collection),
            _marker: PhantomData,
        }
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }
}

fn decode<T: Document>(document: BsonDocument) -> StoreResult<T> {
    Ok(bson::from_document(document)?)
}

fn payload_fields<P: Serialize + ?Sized>(payload: &P) -> StoreResult<BsonDocument> {
    let mut fields = bson::to_document(payload)?;
    fields.remove(ID_FIELD);
    Ok(fields)
}

/// Update document for `upsert`: `$set` the payload and, unless the filter
/// pins `_id` to a single value, assign a fresh identifier on insert.
fn upsert_update(filter: &Filter, fields: BsonDocument) -> BsonDocument {
    let mut update = doc! { "$set": fields };
    if !equality_fields(filter).contains_key(ID_FIELD) {
        let mut on_insert = BsonDocument::new();
        on_insert.insert(ID_FIELD, id_bson(Uuid::now_v7()));
        update.insert("$setOnInsert", on_insert);
    }
    update
}

impl<T: Document> MongoDocumentStore<T> {
    /// `find_one_and_update` in a short-lived transaction. The write is kept
    /// only when the resulting document decodes into `T`.
    async fn update_decoded(
        &self,
        filter: Filter,
        update: Update,
        upsert: bool,
    ) -> StoreResult<Option<T>> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        session
            .start_transaction()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let written = self
            .collection
            .find_one_and_update(filter, update)
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .session(&mut session)
            .await;
        let decoded = match written {
            Ok(Some(document)) => decode::<T>(document).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::from(e)),
        };

        match decoded {
            Ok(found) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| StoreError::Transaction(e.to_string()))?;
                Ok(found)
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(error = %abort, "Failed to abort rejected write");
                }
                Err(e)
            }
        }
    }
}

fn into_stream<T: Document>(cursor: mongodb::Cursor<BsonDocument>) -> DocumentStream<T> {
    cursor
        .map_err(StoreError::from)
        .and_then(|document| futures::future::ready(decode::<T>(document)))
        .boxed()
}

#[async_trait]
impl<T: Document> DocumentStore<T> for MongoDocumentStore<T> {
    type Session = MongoSession;

    #[instrument(skip_all, fields(collection = %self.collection.name()))]
    async fn create<P>(
        &self,
        payload: &P,
        txn: Option<&mut Transaction<MongoSession>>,
    ) -> StoreResult<T>
    where
        P: Serialize + Sync + ?Sized,
    {
        let id = Uuid::now_v7();
        let mut document = BsonDocument::new();
        document.insert(ID_FIELD, id_bson(id));
        for (key, value) in payload_fields(payload)? {
            document.insert(key, value);
        }
        let created = decode::<T>(document.clone())?;

        match txn {
            Some(txn) => {
                let session = txn.session_mut()?.client_session()?;
                self.collection.insert_one(&document).session(session).await?;
            }
            None => {
                self.collection.insert_one(&document).await?;
            }
        }

        debug!(document_id = %id, "Document created");
        Ok(created)
    }

    #[instrument(skip(self), fields(collection = %self.collection.name()))]
    async fn find_one(&self, filter: Filter) -> StoreResult<T> {
        match self.collection.find_one(filter.clone()).await? {
            Some(document) => decode(document),
            None => {
                warn!(%filter, "Document not found");
                Err(StoreError::NotFound)
            }
        }
    }

    #[instrument(skip(self, patch, txn), fields(collection = %self.collection.name()))]
    async fn find_and_update(
        &self,
        filter: Filter,
        patch: Update,
        txn: Option<&mut Transaction<MongoSession>>,
    ) -> StoreResult<T> {
        let update = normalize_update(patch)?;

        let updated = match txn {
            Some(txn) => {
                let session = txn.session_mut()?.client_session()?;
                self.collection
                    .find_one_and_update(filter.clone(), update)
                    .return_document(ReturnDocument::After)
                    .upsert(false)
                    .session(session)
                    .await?
                    .map(decode::<T>)
                    .transpose()?
            }
            None => self.update_decoded(filter.clone(), update, false).await?,
        };

        match updated {
            Some(document) => Ok(document),
            None => {
                warn!(%filter, "Document not found for update");
                Err(StoreError::NotFound)
            }
        }
    }

    #[instrument(skip_all, fields(collection = %self.collection.name(), filter = %filter))]
    async fn upsert<P>(&self, filter: Filter, payload: &P) -> StoreResult<T>
    where
        P: Serialize + Sync + ?Sized,
    {
        let update = upsert_update(&filter, payload_fields(payload)?);
        self.update_decoded(filter, update, true)
            .await?
            .ok_or_else(|| StoreError::Database("upsert returned no document".into()))
    }

    #[instrument(skip(self), fields(collection = %self.collection.name()))]
    async fn find(&self, filter: Filter) -> StoreResult<DocumentStream<T>> {
        let cursor = self.collection.find(filter).await?;
        Ok(into_stream(cursor))
    }

    #[instrument(skip(self), fields(collection = %self.collection.name()))]
    async fn find_with_pagination(
        &self,
        filter: Filter,
        pagination: &Pagination,
    ) -> StoreResult<DocumentStream<T>> {
        pagination.validate()?;
        let limit = i64::try_from(pagination.limit)
            .map_err(|_| StoreError::validation("limit is too large"))?;

        let cursor = self
            .collection
            .find(filter)
            .sort(pagination.sort.to_document())
            .skip(pagination.skip())
            .limit(limit)
            .await?;
        Ok(into_stream(cursor))
    }

    #[instrument(skip(self), fields(collection = %self.collection.name()))]
    async fn soft_delete(&self, filter: Filter) -> StoreResult<DeleteResult> {
        let result = self.collection.delete_one(filter.clone()).await?;
        if result.deleted_count == 0 {
            warn!(%filter, "Document not found for delete");
            return Err(StoreError::NotFound);
        }
        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn start_transaction(&self) -> StoreResult<Transaction<MongoSession>> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        session
            .start_transaction()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(Transaction::begin(MongoSession::new(session)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        #[serde(rename = "_id")]
        id: &'static str,
        name: &'static str,
    }

    #[test]
    fn test_payload_fields_drop_id() {
        let fields = payload_fields(&Payload { id: "forged", name: "Desk" }).unwrap();
        assert_eq!(fields, doc! { "name": "Desk" });
    }

    #[test]
    fn test_upsert_update_assigns_id_on_insert() {
        let update = upsert_update(&doc! { "name": "Desk" }, doc! { "price": 10.0 });
        assert_eq!(update.get_document("$set").unwrap(), &doc! { "price": 10.0 });
        let on_insert = update.get_document("$setOnInsert").unwrap();
        let id = on_insert.get_str(ID_FIELD).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_upsert_update_keeps_filter_id() {
        let filter = crate::document::by_id(Uuid::now_v7());
        let update = upsert_update(&filter, doc! { "price": 10.0 });
        assert!(!update.contains_key("$setOnInsert"));
    }

    #[test]
    fn test_upsert_update_assigns_id_when_filter_id_is_not_equality() {
        let filter = doc! { "_id": { "$in": ["a", "b"] } };
        let update = upsert_update(&filter, doc! { "price": 10.0 });
        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert!(Uuid::parse_str(on_insert.get_str(ID_FIELD).unwrap()).is_ok());

        let filter = doc! { "_id": { "$eq": "a" } };
        let update = upsert_update(&filter, doc! { "price": 10.0 });
        assert!(!update.contains_key("$setOnInsert"));
    }

    #[test]
    fn test_payload_must_be_a_document() {
        let result = payload_fields(&42);
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }
}
