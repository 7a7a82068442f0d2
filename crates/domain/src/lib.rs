//! Domain layer for the farm delivery marketplace.
//!
//! This crate provides the order lifecycle core:
//! - Order aggregate with its order and delivery state machines
//! - Order creation with atomic inventory reservation
//! - Role-gated status transitions and the delivered coupling rule
//! - Dense per-day statistics over the order history
//! - The `MarketplaceStore` persistence port and an in-memory store

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod order;
pub mod stats;
pub mod store;

pub use auth::{Principal, User};
pub use catalog::Product;
pub use config::{ServiceConfig, StockPolicy};
pub use error::DomainError;
pub use order::{
    CartLine, DeliveryInfo, DeliveryStatus, Money, Order, OrderLine, OrderService, OrderStatus,
    PlaceOrder, StatusService, UpdateDeliveryStatus, UpdateOrderStatus,
};
pub use stats::{
    DailyDeliveries, DailyPayments, DashboardStats, DateRange, StatisticsService, TimeRange,
};
pub use store::{
    InMemoryMarketplaceStore, MarketplaceStore, OrderScope, Page, PageRequest, StatusEdit,
    StoreError, status_edit,
};
