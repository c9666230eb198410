use mongodb::error::{
    ErrorKind, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT, WriteFailure,
};
use thiserror::Error;

/// Server error code for a document rejected by collection validation rules.
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;

/// Failure of a document store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The payload, filter, patch or pagination is malformed, or the backend
    /// rejected the document. A client-input fault.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required document was absent.
    #[error("Document not found")]
    NotFound,

    /// Begin, commit or abort failed, or the transaction was not active.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Any other backend failure.
    #[error("Database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Transaction failures are the only ones worth re-running the whole
    /// operation for.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        if err.contains_label(TRANSIENT_TRANSACTION_ERROR)
            || err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
        {
            return Self::Transaction(err.to_string());
        }

        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write))
                if write.code == DOCUMENT_VALIDATION_FAILURE =>
            {
                Self::Validation(write.message.clone())
            }
            ErrorKind::Transaction { message, .. } => Self::Transaction(message.clone()),
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        Self::Validation(format!("payload is not a valid document: {err}"))
    }
}

impl From<mongodb::bson::de::Error> for StoreError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        Self::Validation(format!("document does not match the expected shape: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transaction_errors_are_transient() {
        assert!(StoreError::transaction("write conflict").is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::validation("bad").is_transient());
        assert!(!StoreError::Database("down".into()).is_transient());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(StoreError::NotFound.to_string(), "Document not found");
        assert_eq!(
            StoreError::validation("price must be positive").to_string(),
            "Validation error: price must be positive"
        );
    }
}
