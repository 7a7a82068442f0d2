//! Catalog entries referenced by orders.
//!
//! Product CRUD lives outside this crate; orders only read prices and owners
//! and reserve stock through [`MarketplaceStore`](crate::store::MarketplaceStore).

use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::order::Money;

/// A product offered by a farmer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Money,
    /// Never negative; only order placement decrements it.
    pub available_quantity: u32,
    pub owner_id: UserId,
}

impl Product {
    pub fn new(
        name: impl Into<String>,
        unit_price: Money,
        available_quantity: u32,
        owner_id: UserId,
    ) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            unit_price,
            available_quantity,
            owner_id,
        }
    }

    /// Returns true if `quantity` units can be reserved right now.
    pub fn can_supply(&self, quantity: u32) -> bool {
        self.available_quantity >= quantity
    }
}
