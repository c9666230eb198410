//! Transaction scope shared by all backends.
//!
//! A [`Transaction`] wraps a backend [`Session`] and enforces the lifecycle
//!
//! ```text
//! Active --commit--> Committed --end--> Ended
//! Active --abort---> Aborted   --end--> Ended
//! Active --end-----> (abort) --> Ended
//! ```
//!
//! `end` consumes the transaction, so nothing can be called on it afterwards.
//! A transaction dropped before `end` (a cancelled future, a panic) releases
//! its session synchronously and discards uncommitted writes.

use async_trait::async_trait;
use strum::Display;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{StoreError, StoreResult};

/// Backend half of a transaction.
#[async_trait]
pub trait Session: Send + 'static {
    async fn commit(&mut self) -> StoreResult<()>;

    async fn abort(&mut self) -> StoreResult<()>;

    /// Release backend resources after commit or abort.
    async fn end(&mut self);

    /// Release from `Drop`. `active` is set when the transaction never reached
    /// commit or abort and its writes must be discarded.
    fn release(&mut self, active: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
    Ended,
}

pub struct Transaction<S: Session> {
    id: Uuid,
    state: TransactionState,
    session: S,
}

impl<S: Session> std::fmt::Debug for Transaction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: Session> Transaction<S> {
    /// Wrap a session on which the backend has already started a transaction.
    pub fn begin(session: S) -> Self {
        let id = Uuid::now_v7();
        debug!(txn_id = %id, "Transaction started");
        Self {
            id,
            state: TransactionState::Active,
            session,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Backend session, available only while the transaction is active.
    pub fn session_mut(&mut self) -> StoreResult<&mut S> {
        self.ensure_active("use")?;
        Ok(&mut self.session)
    }

    /// Make all writes visible. On failure the transaction is left aborted.
    pub async fn commit(&mut self) -> StoreResult<()> {
        self.ensure_active("commit")?;
        match self.session.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(txn_id = %self.id, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                warn!(txn_id = %self.id, error = %e, "Commit failed, discarding transaction");
                if let Err(abort_err) = self.session.abort().await {
                    debug!(txn_id = %self.id, error = %abort_err, "Abort after failed commit");
                }
                self.state = TransactionState::Aborted;
                Err(match e {
                    StoreError::Transaction(_) => e,
                    other => StoreError::Transaction(other.to_string()),
                })
            }
        }
    }

    /// Discard all writes. A backend failure is logged and swallowed; the
    /// transaction still counts as aborted.
    pub async fn abort(&mut self) -> StoreResult<()> {
        self.ensure_active("abort")?;
        if let Err(e) = self.session.abort().await {
            warn!(txn_id = %self.id, error = %e, "Abort failed on backend");
        }
        self.state = TransactionState::Aborted;
        debug!(txn_id = %self.id, "Transaction aborted");
        Ok(())
    }

    /// Release the transaction, aborting first if it is still active.
    pub async fn end(mut self) {
        if self.is_active() {
            warn!(txn_id = %self.id, "Transaction ended while active, aborting");
            let _ = self.abort().await;
        }
        self.session.end().await;
        self.state = TransactionState::Ended;
        debug!(txn_id = %self.id, "Transaction ended");
    }

    fn ensure_active(&self, action: &str) -> StoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StoreError::transaction(format!(
                "cannot {action} transaction {} in state {}",
                self.id, self.state
            )))
        }
    }
}

impl<S: Session> Drop for Transaction<S> {
    fn drop(&mut self) {
        if self.state == TransactionState::Ended {
            return;
        }
        let active = self.is_active();
        if active {
            warn!(txn_id = %self.id, "Transaction dropped while active, discarding writes");
        }
        self.session.release(active);
        self.state = TransactionState::Ended;
    }
}
