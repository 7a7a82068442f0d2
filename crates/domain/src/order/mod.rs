//! Order aggregate, state machines and the services that drive them.

mod aggregate;
mod commands;
mod service;
mod state;
mod transitions;
mod value_objects;

pub use aggregate::{DeliveryInfo, Order, OrderParts};
pub use commands::{
    ADDRESS_MAX_CHARS, ADDRESS_MIN_CHARS, NOTES_MAX_CHARS, PlaceOrder, UpdateDeliveryStatus,
    UpdateOrderStatus,
};
pub use service::OrderService;
pub use state::{DeliveryStatus, OrderStatus, StatusLifecycle, UnknownStatus};
pub use transitions::StatusService;
pub use value_objects::{CartLine, Money, OrderLine};
