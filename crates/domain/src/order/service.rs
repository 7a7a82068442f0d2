//! Order creation service and order queries.

use std::time::Instant;

use chrono::Utc;
use common::{OrderId, Role};

use crate::auth::Principal;
use crate::error::{DomainError, Result};
use crate::store::{MarketplaceStore, OrderScope, Page, PageRequest, StoreError};

use super::{DeliveryInfo, Money, Order, OrderLine, PlaceOrder};

/// Service for placing and reading orders.
///
/// Placing an order is the only operation in the system that decrements
/// product inventory.
pub struct OrderService<S: MarketplaceStore> {
    store: S,
}

impl<S: MarketplaceStore> OrderService<S> {
    /// Creates a new order service backed by the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates a cart, reserves its stock and persists the new order.
    ///
    /// Lines are checked in cart order and the first missing or short product
    /// aborts the whole order. The store repeats the stock check under row
    /// locks, so a concurrent order that got there first still yields
    /// `Conflict` and nothing is written.
    #[tracing::instrument(skip(self, cmd, principal), fields(user = %principal.username, lines = cmd.cart.len()))]
    pub async fn place_order(&self, cmd: PlaceOrder, principal: &Principal) -> Result<Order> {
        let started = Instant::now();
        principal.require(Role::Client, "create orders")?;

        let now = Utc::now();
        cmd.validate(now)?;

        let mut lines = Vec::with_capacity(cmd.cart.len());
        for requested in cmd.merged_cart() {
            let product = self
                .store
                .get_product(requested.product_id)
                .await?
                .ok_or_else(|| {
                    DomainError::NotFound(format!("Product not found: {}", requested.product_id))
                })?;

            if !product.can_supply(requested.quantity) {
                metrics::counter!("order_inventory_conflicts_total").increment(1);
                tracing::warn!(
                    product_id = %product.id,
                    requested = requested.quantity,
                    available = product.available_quantity,
                    "insufficient stock"
                );
                return Err(DomainError::Conflict(format!(
                    "Not enough quantity available for product: {}",
                    product.name
                )));
            }

            lines.push(OrderLine {
                product_id: product.id,
                product_name: product.name,
                farmer_id: product.owner_id,
                quantity: requested.quantity,
                unit_price: product.unit_price,
            });
        }

        let total = lines.iter().try_fold(Money::zero(), |total, line| {
            line.unit_price
                .checked_mul(line.quantity)
                .and_then(|subtotal| total.checked_add(subtotal))
        });
        if total.is_none() {
            return Err(DomainError::invalid("items", "order total is out of range"));
        }

        let delivery = DeliveryInfo::new(
            cmd.delivery_address.trim(),
            cmd.estimated_delivery_at,
            cmd.delivery_notes,
        );
        let order = Order::place(
            OrderId::new(),
            principal.user_id,
            principal.username.clone(),
            lines,
            delivery,
            now,
        );

        if let Err(e) = self.store.place_order(&order).await {
            if let StoreError::InsufficientStock { product_id, .. } = &e {
                metrics::counter!("order_inventory_conflicts_total").increment(1);
                tracing::warn!(%product_id, "stock taken by a concurrent order");
            }
            return Err(e.into());
        }

        metrics::counter!("orders_placed_total").increment(1);
        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id(), total = %order.total_price(), "order placed");

        Ok(order)
    }

    /// Lists the calling client's own orders, newest first.
    #[tracing::instrument(skip(self, principal), fields(user = %principal.username))]
    pub async fn client_orders(
        &self,
        principal: &Principal,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        principal.require(Role::Client, "view their orders")?;
        Ok(self
            .store
            .list_orders(OrderScope::Client(principal.user_id), page)
            .await?)
    }

    /// Lists orders containing the calling farmer's products, newest first.
    #[tracing::instrument(skip(self, principal), fields(user = %principal.username))]
    pub async fn farmer_orders(
        &self,
        principal: &Principal,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        principal.require(Role::Farmer, "view their orders")?;
        Ok(self
            .store
            .list_orders(OrderScope::Farmer(principal.user_id), page)
            .await?)
    }

    /// Lists every order, newest first.
    #[tracing::instrument(skip(self, principal), fields(user = %principal.username))]
    pub async fn all_orders(&self, principal: &Principal, page: PageRequest) -> Result<Page<Order>> {
        principal.require(Role::Admin, "view all orders")?;
        Ok(self.store.list_orders(OrderScope::All, page).await?)
    }

    /// Lists the most recently placed orders for the admin dashboard.
    #[tracing::instrument(skip(self, principal), fields(user = %principal.username))]
    pub async fn recent_orders(
        &self,
        principal: &Principal,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        principal.require(Role::Admin, "view recent orders")?;
        Ok(self.store.list_orders(OrderScope::All, page).await?)
    }

    /// Loads an order by id. Any authenticated role may read it.
    #[tracing::instrument(skip(self, _principal))]
    pub async fn get_order(&self, _principal: &Principal, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Order not found: {order_id}")))
    }

    /// Deletes an order with its delivery record. Stock is not returned.
    #[tracing::instrument(skip(self, principal), fields(user = %principal.username))]
    pub async fn delete_order(&self, principal: &Principal, order_id: OrderId) -> Result<()> {
        principal.require(Role::Admin, "delete orders")?;
        if !self.store.delete_order(order_id).await? {
            return Err(DomainError::NotFound(format!("Order not found: {order_id}")));
        }
        tracing::info!(%order_id, "order deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::{ProductId, UserId};

    use super::*;
    use crate::auth::User;
    use crate::catalog::Product;
    use crate::order::{CartLine, DeliveryStatus, OrderStatus};
    use crate::store::InMemoryMarketplaceStore;

    struct Fixture {
        service: OrderService<InMemoryMarketplaceStore>,
        client: Principal,
        farmer: Principal,
        admin: Principal,
    }

    async fn fixture() -> Fixture {
        Fixture {
            service: OrderService::new(InMemoryMarketplaceStore::new()),
            client: User::new("carol", Role::Client).principal(),
            farmer: User::new("frank", Role::Farmer).principal(),
            admin: User::new("ada", Role::Admin).principal(),
        }
    }

    async fn stock(fx: &Fixture, name: &str, cents: i64, quantity: u32) -> Product {
        let product = Product::new(name, Money::from_cents(cents), quantity, fx.farmer.user_id);
        fx.service.store().put_product(product.clone()).await.unwrap();
        product
    }

    fn cart(lines: Vec<CartLine>) -> PlaceOrder {
        PlaceOrder::new(
            lines,
            "3 Willow Court, Riverside",
            Utc::now() + Duration::days(1),
        )
    }

    #[tokio::test]
    async fn test_total_overflow_is_invalid() {
        let fx = fixture().await;
        let truffles = stock(&fx, "Truffles", i64::MAX / 2, 10).await;

        let err = fx
            .service
            .place_order(cart(vec![CartLine::new(truffles.id, 3)]), &fx.client)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::InvalidArgument(_)));
        let stored = fx.service.store().get_product(truffles.id).await.unwrap().unwrap();
        assert_eq!(stored.available_quantity, 10);
        assert_eq!(fx.service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_place_order() {
        let fx = fixture().await;
        let apples = stock(&fx, "Apples", 250, 10).await;
        let pears = stock(&fx, "Pears", 300, 4).await;

        let order = fx
            .service
            .place_order(
                cart(vec![CartLine::new(apples.id, 3), CartLine::new(pears.id, 2)])
                    .with_notes("leave at the gate"),
                &fx.client,
            )
            .await
            .unwrap();

        assert_eq!(order.total_price().cents(), 3 * 250 + 2 * 300);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.delivery().status, DeliveryStatus::Pending);
        assert_eq!(order.delivery().notes.as_deref(), Some("leave at the gate"));
        assert_eq!(order.client_id(), fx.client.user_id);
        assert_eq!(order.lines().len(), 2);

        let apples_left = fx.service.store().get_product(apples.id).await.unwrap().unwrap();
        assert_eq!(apples_left.available_quantity, 7);
    }

    #[tokio::test]
    async fn test_only_clients_place_orders() {
        let fx = fixture().await;
        let apples = stock(&fx, "Apples", 250, 10).await;

        for principal in [&fx.farmer, &fx.admin] {
            let err = fx
                .service
                .place_order(cart(vec![CartLine::new(apples.id, 1)]), principal)
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::Forbidden(_)));
        }
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let fx = fixture().await;
        let missing = ProductId::new();

        let err = fx
            .service
            .place_order(cart(vec![CartLine::new(missing, 1)]), &fx.client)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound(ref msg) if msg.contains(&missing.to_string())));
    }

    #[tokio::test]
    async fn test_first_short_line_aborts_whole_order() {
        let fx = fixture().await;
        let apples = stock(&fx, "Apples", 250, 10).await;
        let pears = stock(&fx, "Pears", 300, 1).await;

        let err = fx
            .service
            .place_order(
                cart(vec![CartLine::new(apples.id, 2), CartLine::new(pears.id, 5)]),
                &fx.client,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Conflict(ref msg) if msg.contains("Pears")));
        let apples_left = fx.service.store().get_product(apples.id).await.unwrap().unwrap();
        assert_eq!(apples_left.available_quantity, 10);
        assert_eq!(fx.service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_repeated_product_checked_against_combined_quantity() {
        let fx = fixture().await;
        let apples = stock(&fx, "Apples", 250, 4).await;

        let err = fx
            .service
            .place_order(
                cart(vec![CartLine::new(apples.id, 3), CartLine::new(apples.id, 3)]),
                &fx.client,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_fields_rejected_before_lookup() {
        let fx = fixture().await;
        let mut cmd = cart(vec![CartLine::new(ProductId::new(), 1)]);
        cmd.estimated_delivery_at = Utc::now() - Duration::hours(1);

        let err = fx.service.place_order(cmd, &fx.client).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let fx = fixture().await;
        let apples = stock(&fx, "Apples", 250, 4).await;
        fx.service.store().set_unavailable(true).await;

        let err = fx
            .service
            .place_order(cart(vec![CartLine::new(apples.id, 1)]), &fx.client)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Internal(_)));
    }

    #[tokio::test]
    async fn test_listing_permissions() {
        let fx = fixture().await;
        let apples = stock(&fx, "Apples", 250, 10).await;
        fx.service
            .place_order(cart(vec![CartLine::new(apples.id, 1)]), &fx.client)
            .await
            .unwrap();

        let mine = fx
            .service
            .client_orders(&fx.client, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(mine.total_items, 1);

        let farmer_view = fx
            .service
            .farmer_orders(&fx.farmer, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(farmer_view.total_items, 1);

        let all = fx
            .service
            .all_orders(&fx.admin, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.total_items, 1);

        assert!(matches!(
            fx.service.client_orders(&fx.farmer, PageRequest::default()).await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service.farmer_orders(&fx.client, PageRequest::default()).await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service.recent_orders(&fx.client, PageRequest::default()).await,
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_get_and_delete_order() {
        let fx = fixture().await;
        let apples = stock(&fx, "Apples", 250, 10).await;
        let order = fx
            .service
            .place_order(cart(vec![CartLine::new(apples.id, 2)]), &fx.client)
            .await
            .unwrap();

        let loaded = fx.service.get_order(&fx.farmer, order.id()).await.unwrap();
        assert_eq!(loaded, order);

        assert!(matches!(
            fx.service.delete_order(&fx.client, order.id()).await,
            Err(DomainError::Forbidden(_))
        ));
        fx.service.delete_order(&fx.admin, order.id()).await.unwrap();

        assert!(matches!(
            fx.service.get_order(&fx.admin, order.id()).await,
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.delete_order(&fx.admin, order.id()).await,
            Err(DomainError::NotFound(_))
        ));

        // Deleting does not restock
        let apples_left = fx.service.store().get_product(apples.id).await.unwrap().unwrap();
        assert_eq!(apples_left.available_quantity, 8);
    }

    #[tokio::test]
    async fn test_unknown_user_id_sees_empty_client_list() {
        let fx = fixture().await;
        let stranger = Principal::new(UserId::new(), "nobody", Role::Client);
        let page = fx
            .service
            .client_orders(&stranger, PageRequest::default())
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }
}
