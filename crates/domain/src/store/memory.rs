use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, Role, UserId};
use tokio::sync::Mutex;

use super::{
    MarketplaceStore, OrderScope, Page, PageRequest, Result, StatusEdit, StoreError,
    reservation_plan,
};
use crate::auth::User;
use crate::catalog::Product;
use crate::order::{Order, OrderStatus};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    users: HashMap<UserId, User>,
    orders: HashMap<OrderId, Order>,
    unavailable: bool,
}

impl State {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory marketplace store for tests and local runs.
///
/// A single mutex guards all state, so every operation is atomic and
/// serialized with respect to the others.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketplaceStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryMarketplaceStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `Unavailable` until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Runs `edit` on a copy of the stored order and writes back `columns`.
    ///
    /// The lock is held from the read to the restock, so concurrent edits of
    /// one order apply one after the other, each to the other's result.
    async fn modify(
        &self,
        order_id: OrderId,
        edit: StatusEdit<'_>,
        columns: StatusColumns,
    ) -> Result<Order> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        let stored = state
            .orders
            .get(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let mut edited = stored.clone();
        let release = edit(&mut edited).map_err(StoreError::rejected)?;

        let written = match columns {
            StatusColumns::Order => {
                let mut parts = edited.into_parts();
                parts.delivery = stored.delivery().clone();
                Order::from(parts)
            }
            StatusColumns::OrderAndDelivery => edited,
        };
        state.orders.insert(order_id, written.clone());

        for (product_id, quantity) in reservation_plan(&release) {
            // Products removed from the catalog have nothing to restock
            if let Some(product) = state.products.get_mut(&product_id) {
                product.available_quantity = product.available_quantity.saturating_add(quantity);
            }
        }
        Ok(written)
    }
}

#[derive(Debug, Clone, Copy)]
enum StatusColumns {
    Order,
    OrderAndDelivery,
}

#[async_trait]
impl MarketplaceStore for InMemoryMarketplaceStore {
    async fn put_product(&self, product: Product) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.products.insert(product.id, product);
        Ok(())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.products.get(&product_id).cloned())
    }

    async fn put_user(&self, user: User) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.users.insert(user.id, user);
        Ok(())
    }

    async fn count_users_by_role(&self, role: Role) -> Result<u64> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.users.values().filter(|u| u.role == role).count() as u64)
    }

    async fn place_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        let plan = reservation_plan(order.lines());

        // Check everything first so a failure leaves no partial decrement
        for (&product_id, &requested) in &plan {
            let product = state
                .products
                .get(&product_id)
                .ok_or(StoreError::ProductNotFound(product_id))?;
            if !product.can_supply(requested) {
                return Err(StoreError::InsufficientStock {
                    product_id,
                    requested,
                    available: product.available_quantity,
                });
            }
        }

        for (product_id, requested) in plan {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.available_quantity -= requested;
            }
        }
        state.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn modify_order_status(
        &self,
        order_id: OrderId,
        edit: StatusEdit<'_>,
    ) -> Result<Order> {
        self.modify(order_id, edit, StatusColumns::Order).await
    }

    async fn modify_delivery_status(
        &self,
        order_id: OrderId,
        edit: StatusEdit<'_>,
    ) -> Result<Order> {
        self.modify(order_id, edit, StatusColumns::OrderAndDelivery)
            .await
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        Ok(state.orders.remove(&order_id).is_some())
    }

    async fn list_orders(&self, scope: OrderScope, page: PageRequest) -> Result<Page<Order>> {
        let state = self.state.lock().await;
        state.check_available()?;

        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| scope.contains(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.placed_at()
                .cmp(&a.placed_at())
                .then(a.id().cmp(&b.id()))
        });

        let total = orders.len() as u64;
        let items = orders
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.size as usize)
            .collect();

        Ok(Page::new(items, page, total))
    }

    async fn orders_placed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        state.check_available()?;

        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| order.placed_at() >= from && order.placed_at() < to)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.placed_at());
        Ok(orders)
    }

    async fn count_orders(&self) -> Result<u64> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.orders.len() as u64)
    }

    async fn count_orders_with_status(&self, status: OrderStatus) -> Result<u64> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .orders
            .values()
            .filter(|order| order.status() == status)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::error::DomainError;
    use crate::store::status_edit;
    use crate::order::{DeliveryInfo, DeliveryStatus, Money, OrderLine};

    fn order_for(product: &Product, client_id: UserId, quantity: u32) -> Order {
        let now = Utc::now();
        Order::place(
            OrderId::new(),
            client_id,
            "client",
            vec![OrderLine {
                product_id: product.id,
                product_name: product.name.clone(),
                farmer_id: product.owner_id,
                quantity,
                unit_price: product.unit_price,
            }],
            DeliveryInfo::new("7 Barn Street, Hilltown", now + Duration::days(1), None),
            now,
        )
    }

    async fn stocked_store(quantity: u32) -> (InMemoryMarketplaceStore, Product) {
        let store = InMemoryMarketplaceStore::new();
        let product = Product::new("Carrots", Money::from_cents(120), quantity, UserId::new());
        store.put_product(product.clone()).await.unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn test_place_order_decrements_stock() {
        let (store, product) = stocked_store(5).await;
        let order = order_for(&product, UserId::new(), 3);

        store.place_order(&order).await.unwrap();

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.available_quantity, 2);
        assert_eq!(store.get_order(order.id()).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_insufficient_stock_writes_nothing() {
        let (store, product) = stocked_store(2).await;
        let order = order_for(&product, UserId::new(), 3);

        let err = store.place_order(&order).await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(store.order_count().await, 0);
        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.available_quantity, 2);
    }

    #[tokio::test]
    async fn test_missing_product_rejected() {
        let store = InMemoryMarketplaceStore::new();
        let ghost = Product::new("Ghost", Money::from_cents(1), 10, UserId::new());
        let err = store
            .place_order(&order_for(&ghost, UserId::new(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound(id) if id == ghost.id));
    }

    #[tokio::test]
    async fn test_modify_status_restocks_released_lines() {
        let (store, product) = stocked_store(5).await;
        let order = order_for(&product, UserId::new(), 4);
        store.place_order(&order).await.unwrap();

        let confirmed = store
            .modify_order_status(
                order.id(),
                status_edit(|order: &mut Order| {
                    order.record_status(OrderStatus::Confirmed, None, Utc::now());
                    Ok(Vec::new())
                }),
            )
            .await
            .unwrap();
        assert_eq!(confirmed.status(), OrderStatus::Confirmed);
        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.available_quantity, 1);

        store
            .modify_order_status(
                order.id(),
                status_edit(|order: &mut Order| {
                    order.record_status(OrderStatus::Cancelled, None, Utc::now());
                    Ok(order.lines().to_vec())
                }),
            )
            .await
            .unwrap();

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.available_quantity, 5);
    }

    #[tokio::test]
    async fn test_rejected_edit_writes_nothing() {
        let (store, product) = stocked_store(5).await;
        let order = order_for(&product, UserId::new(), 2);
        store.place_order(&order).await.unwrap();

        let err = store
            .modify_order_status(
                order.id(),
                status_edit(|order: &mut Order| {
                    order.record_status(OrderStatus::Cancelled, None, Utc::now());
                    Err(DomainError::Forbidden("not yours".to_string()))
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected(ref e) if matches!(**e, DomainError::Forbidden(_))));
        let stored = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_order_status_write_keeps_stored_delivery() {
        let (store, product) = stocked_store(5).await;
        let order = order_for(&product, UserId::new(), 1);
        store.place_order(&order).await.unwrap();
        let stale = order.clone();

        store
            .modify_delivery_status(
                order.id(),
                status_edit(|order: &mut Order| {
                    order.record_delivery_status(DeliveryStatus::Delivered, None, Utc::now());
                    Ok(Vec::new())
                }),
            )
            .await
            .unwrap();

        // An edit that tries to write back a stale delivery record cannot
        let written = store
            .modify_order_status(
                order.id(),
                status_edit(move |order: &mut Order| {
                    *order = stale;
                    order.record_status(OrderStatus::Confirmed, None, Utc::now());
                    Ok(Vec::new())
                }),
            )
            .await
            .unwrap();

        assert_eq!(written.status(), OrderStatus::Confirmed);
        assert_eq!(written.delivery().status, DeliveryStatus::Delivered);
        assert!(written.delivery().actual_delivery_at.is_some());
    }

    #[tokio::test]
    async fn test_list_orders_by_scope_and_page() {
        let (store, product) = stocked_store(100).await;
        let client = UserId::new();
        for _ in 0..3 {
            store
                .place_order(&order_for(&product, client, 1))
                .await
                .unwrap();
        }
        store
            .place_order(&order_for(&product, UserId::new(), 1))
            .await
            .unwrap();

        let page = store
            .list_orders(OrderScope::Client(client), PageRequest::new(0, 2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_items, 3);
        assert_eq!(page.total_pages, 2);
        assert!(page.items[0].placed_at() >= page.items[1].placed_at());

        let farmer_page = store
            .list_orders(OrderScope::Farmer(product.owner_id), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(farmer_page.total_items, 4);

        let stranger = store
            .list_orders(OrderScope::Farmer(UserId::new()), PageRequest::default())
            .await
            .unwrap();
        assert!(stranger.items.is_empty());
    }

    #[tokio::test]
    async fn test_modify_status_of_deleted_order_fails() {
        let (store, product) = stocked_store(5).await;
        let order = order_for(&product, UserId::new(), 1);
        store.place_order(&order).await.unwrap();

        assert!(store.delete_order(order.id()).await.unwrap());
        assert!(!store.delete_order(order.id()).await.unwrap());

        let err = store
            .modify_order_status(order.id(), status_edit(|_: &mut Order| Ok(Vec::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let (store, product) = stocked_store(5).await;
        store.set_unavailable(true).await;

        let err = store.get_product(product.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_unavailable(false).await;
        assert!(store.get_product(product.id).await.unwrap().is_some());
    }
}
