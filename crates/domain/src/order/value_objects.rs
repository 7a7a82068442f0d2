//! Value objects for the order domain.

use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

/// A price or total in integer cents.
///
/// Serialized as the bare cent count.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Price of `quantity` units at this unit price, saturating at the `i64` bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money::from_cents(self.cents.saturating_mul(i64::from(quantity)))
    }

    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.cents.checked_mul(i64::from(quantity)).map(Money::from_cents)
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money::from_cents(self.cents.saturating_add(rhs.cents))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A requested (product, quantity) pair from a client's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A frozen line of a placed order.
///
/// Name, owner and unit price are captured when the order is placed, so later
/// catalog edits never change an existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product identifier.
    pub product_id: ProductId,

    /// Product name at order time.
    pub product_name: String,

    /// Farmer owning the product.
    pub farmer_id: UserId,

    /// Quantity ordered, at least 1.
    pub quantity: u32,

    /// Price per unit at order time.
    pub unit_price: Money,
}

impl OrderLine {
    /// Returns `unit_price * quantity`.
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_money_sum_and_multiply() {
        let total: Money = [Money::from_cents(250), Money::from_cents(100)]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 350);
        assert_eq!(Money::from_cents(199).multiply(3).cents(), 597);
        assert!(Money::zero().is_zero());
    }

    #[test]
    fn test_money_overflow_is_detected() {
        let huge = Money::from_cents(i64::MAX / 2);
        assert_eq!(huge.checked_mul(2), Some(Money::from_cents(i64::MAX / 2 * 2)));
        assert_eq!(huge.checked_mul(3), None);
        assert_eq!(huge.checked_add(huge).and_then(|m| m.checked_add(huge)), None);
        assert_eq!(huge.multiply(3).cents(), i64::MAX);
        assert_eq!((huge + huge + huge).cents(), i64::MAX);
    }

    #[test]
    fn test_money_serializes_as_cents() {
        assert_eq!(serde_json::to_string(&Money::from_cents(999)).unwrap(), "999");
    }

    #[test]
    fn test_line_subtotal() {
        let line = OrderLine {
            product_id: ProductId::new(),
            product_name: "Heirloom tomatoes".to_string(),
            farmer_id: UserId::new(),
            quantity: 3,
            unit_price: Money::from_cents(450),
        };
        assert_eq!(line.subtotal().cents(), 1350);
    }
}
