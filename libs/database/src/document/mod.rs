//! Backend-neutral document store contract.

mod error;
mod query;
mod store;
pub mod transaction;

pub use error::{StoreError, StoreResult};
pub use query::{
    Filter, ID_FIELD, Pagination, Sort, SortDirection, Update, by_id, normalize_update,
};
pub(crate) use query::{equality_fields, id_bson};
pub use store::{DeleteResult, Document, DocumentId, DocumentStore, DocumentStream};
pub use transaction::{Session, Transaction, TransactionState};
