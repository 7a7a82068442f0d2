//! Order commands and their field validation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};

use crate::error::DomainError;

use super::{CartLine, DeliveryStatus, OrderStatus};

/// Minimum delivery address length, in characters.
pub const ADDRESS_MIN_CHARS: usize = 10;
/// Maximum delivery address length, in characters.
pub const ADDRESS_MAX_CHARS: usize = 200;
/// Maximum length of delivery and status notes, in characters.
pub const NOTES_MAX_CHARS: usize = 1000;

/// Command to place a new order from a client's cart.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub cart: Vec<CartLine>,
    pub delivery_address: String,
    pub estimated_delivery_at: DateTime<Utc>,
    pub delivery_notes: Option<String>,
}

impl PlaceOrder {
    pub fn new(
        cart: Vec<CartLine>,
        delivery_address: impl Into<String>,
        estimated_delivery_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cart,
            delivery_address: delivery_address.into(),
            estimated_delivery_at,
            delivery_notes: None,
        }
    }

    /// Sets the delivery notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.delivery_notes = Some(notes.into());
        self
    }

    /// Checks every field without touching inventory.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.cart.is_empty() {
            return Err(DomainError::invalid("items", "order items cannot be empty"));
        }

        if let Some(line) = self.cart.iter().find(|line| line.quantity == 0) {
            return Err(DomainError::invalid(
                "quantity",
                format!("quantity for product {} must be at least 1", line.product_id),
            ));
        }

        let address = self.delivery_address.trim();
        let address_len = address.chars().count();
        if address.is_empty() {
            return Err(DomainError::invalid(
                "deliveryAddress",
                "delivery address is required",
            ));
        }
        if !(ADDRESS_MIN_CHARS..=ADDRESS_MAX_CHARS).contains(&address_len) {
            return Err(DomainError::invalid(
                "deliveryAddress",
                format!(
                    "delivery address must be between {ADDRESS_MIN_CHARS} and {ADDRESS_MAX_CHARS} characters"
                ),
            ));
        }

        if self.estimated_delivery_at <= now {
            return Err(DomainError::invalid(
                "estimatedDeliveryTime",
                "estimated delivery time must be in the future",
            ));
        }

        check_notes("deliveryNotes", self.delivery_notes.as_deref())
    }

    /// Returns the cart with repeated products merged, in first-seen order.
    pub fn merged_cart(&self) -> Vec<CartLine> {
        let mut merged: Vec<CartLine> = Vec::with_capacity(self.cart.len());
        let mut positions: HashMap<ProductId, usize> = HashMap::new();
        for line in &self.cart {
            match positions.get(&line.product_id).copied() {
                Some(index) => {
                    if let Some(existing) = merged.get_mut(index) {
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                    }
                }
                None => {
                    positions.insert(line.product_id, merged.len());
                    merged.push(*line);
                }
            }
        }
        merged
    }
}

/// Command to set an order's status.
#[derive(Debug, Clone)]
pub struct UpdateOrderStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub notes: Option<String>,
}

impl UpdateOrderStatus {
    pub fn new(order_id: OrderId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            notes: None,
        }
    }

    /// Sets the status notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        check_notes("statusNotes", self.notes.as_deref())
    }
}

/// Command to set an order's delivery status.
#[derive(Debug, Clone)]
pub struct UpdateDeliveryStatus {
    pub order_id: OrderId,
    pub status: DeliveryStatus,
    pub notes: Option<String>,
}

impl UpdateDeliveryStatus {
    pub fn new(order_id: OrderId, status: DeliveryStatus) -> Self {
        Self {
            order_id,
            status,
            notes: None,
        }
    }

    /// Sets the delivery notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        check_notes("deliveryNotes", self.notes.as_deref())
    }
}

fn check_notes(field: &str, notes: Option<&str>) -> Result<(), DomainError> {
    match notes {
        Some(notes) if notes.chars().count() > NOTES_MAX_CHARS => Err(DomainError::invalid(
            field,
            format!("notes cannot exceed {NOTES_MAX_CHARS} characters"),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn valid_command() -> PlaceOrder {
        PlaceOrder::new(
            vec![CartLine::new(ProductId::new(), 2)],
            "42 Meadow Road, Greenfield",
            Utc::now() + Duration::hours(6),
        )
    }

    fn assert_invalid(result: Result<(), DomainError>) {
        assert!(
            matches!(result, Err(DomainError::InvalidArgument(_))),
            "expected InvalidArgument, got {result:?}"
        );
    }

    #[test]
    fn test_valid_command_passes() {
        assert!(valid_command().validate(Utc::now()).is_ok());
    }

    #[test]
    fn test_empty_cart_rejected() {
        let mut cmd = valid_command();
        cmd.cart.clear();
        assert_invalid(cmd.validate(Utc::now()));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut cmd = valid_command();
        cmd.cart.push(CartLine::new(ProductId::new(), 0));
        assert_invalid(cmd.validate(Utc::now()));
    }

    #[test]
    fn test_address_length_bounds() {
        let mut cmd = valid_command();
        cmd.delivery_address = "too short".to_string();
        assert_invalid(cmd.validate(Utc::now()));

        cmd.delivery_address = "x".repeat(ADDRESS_MIN_CHARS);
        assert!(cmd.validate(Utc::now()).is_ok());

        cmd.delivery_address = "x".repeat(ADDRESS_MAX_CHARS);
        assert!(cmd.validate(Utc::now()).is_ok());

        cmd.delivery_address = "x".repeat(ADDRESS_MAX_CHARS + 1);
        assert_invalid(cmd.validate(Utc::now()));
    }

    #[test]
    fn test_estimated_time_must_be_strictly_future() {
        let now = Utc::now();
        let mut cmd = valid_command();
        cmd.estimated_delivery_at = now;
        assert_invalid(cmd.validate(now));

        cmd.estimated_delivery_at = now - Duration::minutes(1);
        assert_invalid(cmd.validate(now));
    }

    #[test]
    fn test_notes_limit() {
        let cmd = valid_command().with_notes("n".repeat(NOTES_MAX_CHARS));
        assert!(cmd.validate(Utc::now()).is_ok());

        let cmd = valid_command().with_notes("n".repeat(NOTES_MAX_CHARS + 1));
        assert_invalid(cmd.validate(Utc::now()));

        let update = UpdateOrderStatus::new(OrderId::new(), OrderStatus::Confirmed)
            .with_notes("n".repeat(NOTES_MAX_CHARS + 1));
        assert_invalid(update.validate());
    }

    #[test]
    fn test_merged_cart_sums_repeated_products() {
        let a = ProductId::new();
        let b = ProductId::new();
        let cmd = PlaceOrder::new(
            vec![CartLine::new(a, 1), CartLine::new(b, 4), CartLine::new(a, 2)],
            "42 Meadow Road, Greenfield",
            Utc::now() + Duration::hours(1),
        );

        assert_eq!(cmd.merged_cart(), vec![CartLine::new(a, 3), CartLine::new(b, 4)]);
    }
}
