//! Domain error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by the marketplace services.
///
/// Every variant maps to a distinct response code at the HTTP boundary.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An order, product or user does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The principal's role or ownership does not allow the operation.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed dates, out-of-range field lengths or bad enum values.
    #[error("{0}")]
    InvalidArgument(String),

    /// Not enough inventory to satisfy the order.
    #[error("{0}")]
    Conflict(String),

    /// Persistence or transaction failure. The whole request may be retried.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub(crate) fn invalid(field: &str, message: impl std::fmt::Display) -> Self {
        DomainError::InvalidArgument(format!("Validation failed for {field}: {message}"))
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ProductNotFound(id) => {
                DomainError::NotFound(format!("Product not found: {id}"))
            }
            StoreError::OrderNotFound(id) => DomainError::NotFound(format!("Order not found: {id}")),
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => DomainError::Conflict(format!(
                "Not enough quantity available for product {product_id}: requested {requested}, available {available}"
            )),
            StoreError::Rejected(e) => *e,
            other => {
                tracing::error!(error = %other, "store operation failed");
                DomainError::Internal(other.to_string())
            }
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, DomainError>;
