//! PostgreSQL implementation of the marketplace store.

pub mod error;
pub mod postgres;

pub use error::PostgresStoreError;
pub use postgres::PostgresMarketplaceStore;
