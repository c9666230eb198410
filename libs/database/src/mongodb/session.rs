use async_trait::async_trait;
use mongodb::ClientSession;

use crate::document::{Session, StoreError, StoreResult};

/// Driver session carrying one MongoDB transaction.
///
/// The driver aborts an in-progress transaction when its session is dropped,
/// so releasing only has to drop the session.
pub struct MongoSession {
    inner: Option<ClientSession>,
}

impl MongoSession {
    pub(crate) fn new(session: ClientSession) -> Self {
        Self {
            inner: Some(session),
        }
    }

    pub(crate) fn client_session(&mut self) -> StoreResult<&mut ClientSession> {
        self.inner
            .as_mut()
            .ok_or_else(|| StoreError::transaction("session already released"))
    }
}

#[async_trait]
impl Session for MongoSession {
    async fn commit(&mut self) -> StoreResult<()> {
        self.client_session()?
            .commit_transaction()
            .await
            .map_err(|e| match StoreError::from(e) {
                StoreError::Transaction(message) => StoreError::Transaction(message),
                other => StoreError::Transaction(other.to_string()),
            })
    }

    async fn abort(&mut self) -> StoreResult<()> {
        self.client_session()?
            .abort_transaction()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    async fn end(&mut self) {
        self.inner.take();
    }

    fn release(&mut self, _active: bool) {
        self.inner.take();
    }
}
