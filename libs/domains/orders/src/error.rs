use database::StoreError;
use http::StatusCode;
use messaging::PublishError;
use thiserror::Error;
use uuid::Uuid;

use crate::coordinator::MutationError;

/// Order domain errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Failed to publish order event: {0}")]
    Publish(#[from] PublishError),

    #[error("Database error: {0}")]
    Database(String),
}

pub type OrderResult<T> = Result<T, OrderError>;

impl OrderError {
    /// Map a store failure for the order identified by `id`.
    pub fn for_order(id: Uuid, err: impl Into<OrderError>) -> Self {
        match err.into() {
            OrderError::NotFound(_) => OrderError::NotFound(id.to_string()),
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::Publish(e) if e.category().is_retryable() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            OrderError::Transaction(_) | OrderError::Publish(_) | OrderError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether repeating the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderError::Transaction(_) => true,
            OrderError::Publish(e) => e.category().is_retryable(),
            _ => false,
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => OrderError::NotFound("no matching order".to_string()),
            StoreError::Validation(msg) => OrderError::Validation(msg),
            StoreError::Transaction(msg) => OrderError::Transaction(msg),
            StoreError::Database(msg) => OrderError::Database(msg),
        }
    }
}

impl From<MutationError> for OrderError {
    fn from(err: MutationError) -> Self {
        match err {
            MutationError::Store(e) => e.into(),
            MutationError::Publish(e) => OrderError::Publish(e),
        }
    }
}

impl From<validator::ValidationErrors> for OrderError {
    fn from(err: validator::ValidationErrors) -> Self {
        OrderError::Validation(err.to_string())
    }
}
