use common::{OrderId, ProductId};
use thiserror::Error;

use crate::error::DomainError;

/// Errors that can occur when interacting with the marketplace store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A product referenced by an order does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Reserving would drive a product's available quantity below zero.
    /// Nothing was written.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The backing database failed or the transaction was aborted.
    #[error("Database error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored row could not be mapped back into the domain model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A status edit refused the locked order. Nothing was written.
    #[error("{0}")]
    Rejected(Box<DomainError>),

    /// The store refused the operation (used to simulate outages).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Wraps a backend error.
    pub fn backend(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(e))
    }

    /// Wraps the error a status edit returned.
    pub fn rejected(e: DomainError) -> Self {
        StoreError::Rejected(Box::new(e))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
