//! Persistence port for orders, inventory and users.

mod error;
mod memory;
mod page;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, Role, UserId};

pub use error::{Result, StoreError};
pub use memory::InMemoryMarketplaceStore;
pub use page::{MAX_PAGE_SIZE, Page, PageRequest};

use crate::auth::User;
use crate::catalog::Product;
use crate::error::DomainError;
use crate::order::{Order, OrderLine, OrderStatus};

/// A status change applied to an order while the store holds its lock.
///
/// The edit sees the current stored order and mutates it in place. It returns
/// the lines whose stock goes back to the catalog, usually none. An `Err`
/// aborts the write and comes back as [`StoreError::Rejected`].
pub type StatusEdit<'a> =
    Box<dyn FnOnce(&mut Order) -> std::result::Result<Vec<OrderLine>, DomainError> + Send + 'a>;

/// Boxes a closure as a [`StatusEdit`].
pub fn status_edit<'a, F>(edit: F) -> StatusEdit<'a>
where
    F: FnOnce(&mut Order) -> std::result::Result<Vec<OrderLine>, DomainError> + Send + 'a,
{
    Box::new(edit)
}

/// Which orders a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// Every order.
    All,
    /// Orders placed by this client.
    Client(UserId),
    /// Orders with at least one line owned by this farmer.
    Farmer(UserId),
}

impl OrderScope {
    /// Returns true if the order falls inside the scope.
    pub fn contains(&self, order: &Order) -> bool {
        match self {
            OrderScope::All => true,
            OrderScope::Client(client_id) => order.client_id() == *client_id,
            OrderScope::Farmer(farmer_id) => order.has_line_owned_by(*farmer_id),
        }
    }
}

/// Core trait for marketplace persistence.
///
/// Each method is one transaction. All implementations must be thread-safe
/// (Send + Sync).
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    /// Inserts or replaces a catalog product.
    async fn put_product(&self, product: Product) -> Result<()>;

    /// Retrieves a product by id.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a user.
    async fn put_user(&self, user: User) -> Result<()>;

    /// Counts registered users with the given role.
    async fn count_users_by_role(&self, role: Role) -> Result<u64>;

    /// Reserves stock for every line and inserts the order with its delivery record.
    ///
    /// Products are locked in ascending id order. Each one is checked and
    /// decremented under its lock, so concurrent placements cannot oversell.
    /// Either every decrement and the order commit, or nothing does.
    async fn place_order(&self, order: &Order) -> Result<()>;

    /// Retrieves an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Locks the order, runs `edit` on it and writes the order status fields.
    ///
    /// The delivery record is left as stored. Lines returned by the edit are
    /// restocked in the same transaction; this is the only path that
    /// increases stock. Returns the order as written.
    async fn modify_order_status(
        &self,
        order_id: OrderId,
        edit: StatusEdit<'_>,
    ) -> Result<Order>;

    /// Locks the order, runs `edit` on it and writes the delivery record.
    ///
    /// The order status fields are written too, since delivering an order
    /// also completes it.
    async fn modify_delivery_status(
        &self,
        order_id: OrderId,
        edit: StatusEdit<'_>,
    ) -> Result<Order>;

    /// Deletes an order and its delivery record. Returns false if it did not exist.
    async fn delete_order(&self, order_id: OrderId) -> Result<bool>;

    /// Lists orders in scope, newest first.
    async fn list_orders(&self, scope: OrderScope, page: PageRequest) -> Result<Page<Order>>;

    /// Retrieves orders placed within `[from, to)`.
    async fn orders_placed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    /// Counts all orders.
    async fn count_orders(&self) -> Result<u64>;

    /// Counts orders currently in `status`.
    async fn count_orders_with_status(&self, status: OrderStatus) -> Result<u64>;
}

/// Sums the requested quantity per product, keyed in lock order.
///
/// Implementations reserve from this map so a product listed twice is
/// checked against its combined quantity.
pub fn reservation_plan(lines: &[OrderLine]) -> BTreeMap<ProductId, u32> {
    let mut plan = BTreeMap::new();
    for line in lines {
        let quantity = plan.entry(line.product_id).or_insert(0_u32);
        *quantity = quantity.saturating_add(line.quantity);
    }
    plan
}
