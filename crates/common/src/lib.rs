//! Shared types for the farm delivery marketplace.

pub mod types;

pub use types::{OrderId, ProductId, Role, UnknownRole, UserId};
