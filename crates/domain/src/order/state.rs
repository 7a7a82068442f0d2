//! Order and delivery state machines.
//!
//! Both machines share the same shape: a linear chain of stages ending in
//! `Delivered`, with `Cancelled` reachable from any non-terminal stage.
//!
//! ```text
//! Order:    Pending ─► Confirmed ─► Preparing ─► ReadyForDelivery ─► InDelivery     ─► Delivered
//! Delivery: Pending ─► Confirmed ─► Preparing ─► ReadyForDelivery ─► OutForDelivery ─► Delivered
//!              │           │            │               │                  │
//!              └───────────┴────────────┴───────────────┴──────────────────┴──► Cancelled
//! ```

use serde::{Deserialize, Serialize};

/// Shared edge rules for the two status machines.
pub trait StatusLifecycle: Copy + Eq {
    /// Position along the forward chain, or `None` for `Cancelled`.
    fn stage(self) -> Option<u8>;

    /// Returns true for `Delivered` and `Cancelled`.
    fn is_terminal(self) -> bool;

    /// Returns true if moving from `self` to `next` follows an edge of the diagram.
    ///
    /// Re-applying the current status is always permitted.
    fn permits(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.stage(), next.stage()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

/// Status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order received, waiting for confirmation.
    #[default]
    Pending,
    Confirmed,
    Preparing,
    ReadyForDelivery,
    InDelivery,
    /// Terminal.
    Delivered,
    /// Terminal.
    Cancelled,
}

impl OrderStatus {
    /// All statuses in diagram order.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::ReadyForDelivery,
        OrderStatus::InDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns the status name as stored and transmitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::ReadyForDelivery => "READY_FOR_DELIVERY",
            OrderStatus::InDelivery => "IN_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Returns a human readable description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order received, waiting for confirmation",
            OrderStatus::Confirmed => "Order confirmed by farmer",
            OrderStatus::Preparing => "Order is being prepared",
            OrderStatus::ReadyForDelivery => "Order is ready for delivery",
            OrderStatus::InDelivery => "Order is out for delivery",
            OrderStatus::Delivered => "Order has been delivered",
            OrderStatus::Cancelled => "Order has been cancelled",
        }
    }

    /// Returns true if a farmer may set this status on an order carrying their products.
    ///
    /// Resetting to `Pending` and cancelling stay with admins.
    pub fn is_fulfillment_step(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed
                | OrderStatus::Preparing
                | OrderStatus::ReadyForDelivery
                | OrderStatus::InDelivery
                | OrderStatus::Delivered
        )
    }
}

impl StatusLifecycle for OrderStatus {
    fn stage(self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Preparing => Some(2),
            OrderStatus::ReadyForDelivery => Some(3),
            OrderStatus::InDelivery => Some(4),
            OrderStatus::Delivered => Some(5),
            OrderStatus::Cancelled => None,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus {
                kind: "order",
                value: s.to_string(),
            })
    }
}

/// Status of the delivery record attached to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    ReadyForDelivery,
    OutForDelivery,
    /// Terminal. Setting it forces the owning order to `Delivered`.
    Delivered,
    /// Terminal.
    Cancelled,
}

impl DeliveryStatus {
    /// All statuses in diagram order.
    pub const ALL: [DeliveryStatus; 7] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Confirmed,
        DeliveryStatus::Preparing,
        DeliveryStatus::ReadyForDelivery,
        DeliveryStatus::OutForDelivery,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
    ];

    /// Returns the status name as stored and transmitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Confirmed => "CONFIRMED",
            DeliveryStatus::Preparing => "PREPARING",
            DeliveryStatus::ReadyForDelivery => "READY_FOR_DELIVERY",
            DeliveryStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }
}

impl StatusLifecycle for DeliveryStatus {
    fn stage(self) -> Option<u8> {
        match self {
            DeliveryStatus::Pending => Some(0),
            DeliveryStatus::Confirmed => Some(1),
            DeliveryStatus::Preparing => Some(2),
            DeliveryStatus::ReadyForDelivery => Some(3),
            DeliveryStatus::OutForDelivery => Some(4),
            DeliveryStatus::Delivered => Some(5),
            DeliveryStatus::Cancelled => None,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus {
                kind: "delivery",
                value: s.to_string(),
            })
    }
}
