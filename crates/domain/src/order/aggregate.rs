//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{DeliveryStatus, Money, OrderLine, OrderStatus};

/// Delivery record owned one-to-one by an [`Order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub address: String,
    pub estimated_delivery_at: DateTime<Utc>,
    /// Set once, when the delivery status becomes `Delivered`.
    pub actual_delivery_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub status: DeliveryStatus,
}

impl DeliveryInfo {
    /// Creates a pending delivery record.
    pub fn new(
        address: impl Into<String>,
        estimated_delivery_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Self {
        Self {
            address: address.into(),
            estimated_delivery_at,
            actual_delivery_at: None,
            notes,
            status: DeliveryStatus::Pending,
        }
    }
}

/// Every field of an order, used to rebuild one from storage.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub client_id: UserId,
    pub client_name: String,
    pub lines: Vec<OrderLine>,
    pub total_price: Money,
    pub status: OrderStatus,
    pub status_notes: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub placed_at: DateTime<Utc>,
    pub delivery: DeliveryInfo,
}

/// Order aggregate root.
///
/// The client, lines, total and placement time are fixed at creation. Only
/// the status fields and the delivery record change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    client_id: UserId,
    client_name: String,
    lines: Vec<OrderLine>,
    total_price: Money,
    status: OrderStatus,
    status_notes: Option<String>,
    status_updated_at: Option<DateTime<Utc>>,
    placed_at: DateTime<Utc>,
    delivery: DeliveryInfo,
}

impl Order {
    /// Creates a pending order, computing the total from the captured lines.
    pub fn place(
        id: OrderId,
        client_id: UserId,
        client_name: impl Into<String>,
        lines: Vec<OrderLine>,
        delivery: DeliveryInfo,
        placed_at: DateTime<Utc>,
    ) -> Self {
        let total_price = lines.iter().map(OrderLine::subtotal).sum();
        Self {
            id,
            client_id,
            client_name: client_name.into(),
            lines,
            total_price,
            status: OrderStatus::Pending,
            status_notes: None,
            status_updated_at: None,
            placed_at,
            delivery,
        }
    }

    /// Decomposes the order into its stored fields.
    pub fn into_parts(self) -> OrderParts {
        OrderParts {
            id: self.id,
            client_id: self.client_id,
            client_name: self.client_name,
            lines: self.lines,
            total_price: self.total_price,
            status: self.status,
            status_notes: self.status_notes,
            status_updated_at: self.status_updated_at,
            placed_at: self.placed_at,
            delivery: self.delivery,
        }
    }
}

impl From<OrderParts> for Order {
    fn from(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            client_id: parts.client_id,
            client_name: parts.client_name,
            lines: parts.lines,
            total_price: parts.total_price,
            status: parts.status,
            status_notes: parts.status_notes,
            status_updated_at: parts.status_updated_at,
            placed_at: parts.placed_at,
            delivery: parts.delivery,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn client_id(&self) -> UserId {
        self.client_id
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Returns the frozen order lines in cart order.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the total computed at placement.
    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_notes(&self) -> Option<&str> {
        self.status_notes.as_deref()
    }

    pub fn status_updated_at(&self) -> Option<DateTime<Utc>> {
        self.status_updated_at
    }

    pub fn placed_at(&self) -> DateTime<Utc> {
        self.placed_at
    }

    pub fn delivery(&self) -> &DeliveryInfo {
        &self.delivery
    }

    /// Returns true if at least one line belongs to the given farmer.
    pub fn has_line_owned_by(&self, farmer_id: UserId) -> bool {
        self.lines.iter().any(|line| line.farmer_id == farmer_id)
    }
}

// Mutations
impl Order {
    /// Sets the order status, replacing the status notes and stamping the change time.
    pub fn record_status(&mut self, status: OrderStatus, notes: Option<String>, at: DateTime<Utc>) {
        self.status = status;
        self.status_notes = notes;
        self.status_updated_at = Some(at);
    }

    /// Sets the delivery status; notes are only replaced when provided.
    ///
    /// `Delivered` stamps the actual delivery time and forces the order status
    /// to `Delivered` whatever it was before. No other delivery status touches
    /// the order status.
    pub fn record_delivery_status(
        &mut self,
        status: DeliveryStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.delivery.status = status;
        if notes.is_some() {
            self.delivery.notes = notes;
        }

        if status == DeliveryStatus::Delivered {
            self.delivery.actual_delivery_at = Some(at);
            self.status = OrderStatus::Delivered;
            self.status_updated_at = Some(at);
        }
    }
}
