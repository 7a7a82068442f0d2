//! Order placement, query and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::{
    CartLine, DeliveryStatus, MarketplaceStore, Order, OrderService, OrderStatus, Page,
    PageRequest, PlaceOrder, ServiceConfig, StatisticsService, StatusService,
    UpdateDeliveryStatus, UpdateOrderStatus,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: MarketplaceStore> {
    pub orders: OrderService<S>,
    pub statuses: StatusService<S>,
    pub stats: StatisticsService<S>,
}

impl<S: MarketplaceStore + Clone> AppState<S> {
    /// Wires every service to the same store.
    pub fn new(store: S, config: ServiceConfig) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            statuses: StatusService::with_config(store.clone(), config),
            stats: StatisticsService::new(store),
        }
    }
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub delivery_address: String,
    pub estimated_delivery_time: DateTime<Utc>,
    pub delivery_notes: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageParams {
    fn with_default_size(&self, size: u32) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(0), self.size.unwrap_or(size))
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub items: Vec<OrderItemResponse>,
    pub total_price_cents: i64,
    pub status: OrderStatus,
    pub status_description: &'static str,
    pub status_notes: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub order_date: DateTime<Utc>,
    pub delivery: DeliveryResponse,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub farmer_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

#[derive(Serialize)]
pub struct DeliveryResponse {
    pub address: String,
    pub estimated_delivery_time: DateTime<Utc>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub status: DeliveryStatus,
}

#[derive(Serialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let items = order
            .lines()
            .iter()
            .map(|line| OrderItemResponse {
                product_id: line.product_id.to_string(),
                product_name: line.product_name.clone(),
                farmer_id: line.farmer_id.to_string(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                subtotal_cents: line.subtotal().cents(),
            })
            .collect();

        let parts = order.into_parts();
        Self {
            id: parts.id.to_string(),
            client_id: parts.client_id.to_string(),
            client_name: parts.client_name,
            items,
            total_price_cents: parts.total_price.cents(),
            status: parts.status,
            status_description: parts.status.description(),
            status_notes: parts.status_notes,
            status_updated_at: parts.status_updated_at,
            order_date: parts.placed_at,
            delivery: DeliveryResponse {
                address: parts.delivery.address,
                estimated_delivery_time: parts.delivery.estimated_delivery_at,
                actual_delivery_time: parts.delivery.actual_delivery_at,
                notes: parts.delivery.notes,
                status: parts.delivery.status,
            },
        }
    }
}

impl From<Page<Order>> for PageResponse<OrderResponse> {
    fn from(page: Page<Order>) -> Self {
        Self {
            items: page.items.into_iter().map(OrderResponse::from).collect(),
            page: page.page,
            size: page.size,
            total_items: page.total_items,
            total_pages: page.total_pages,
        }
    }
}

// -- Handlers --

/// POST /orders: place an order for the calling client.
#[tracing::instrument(skip(state, user, payload))]
pub async fn create<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(req) = payload?;
    let cart = req
        .items
        .iter()
        .map(|item| {
            let product_id = uuid::Uuid::parse_str(&item.product_id)
                .map_err(|e| ApiError::BadRequest(format!("Invalid product_id: {e}")))?;
            Ok(CartLine::new(ProductId::from_uuid(product_id), item.quantity))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let mut cmd = PlaceOrder::new(cart, req.delivery_address, req.estimated_delivery_time);
    if let Some(notes) = req.delivery_notes {
        cmd = cmd.with_notes(notes);
    }

    let order = state.orders.place_order(cmd, &user).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders: every order, newest first (admin).
#[tracing::instrument(skip(state, user, query))]
pub async fn list<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<PageResponse<OrderResponse>>, ApiError> {
    let Query(params) = query?;
    let page = state
        .orders
        .all_orders(&user, params.with_default_size(10))
        .await?;
    Ok(Json(page.into()))
}

/// GET /orders/client: the calling client's orders.
#[tracing::instrument(skip(state, user, query))]
pub async fn client_orders<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<PageResponse<OrderResponse>>, ApiError> {
    let Query(params) = query?;
    let page = state
        .orders
        .client_orders(&user, params.with_default_size(10))
        .await?;
    Ok(Json(page.into()))
}

/// GET /orders/farmer: orders containing the calling farmer's products.
#[tracing::instrument(skip(state, user, query))]
pub async fn farmer_orders<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<PageResponse<OrderResponse>>, ApiError> {
    let Query(params) = query?;
    let page = state
        .orders
        .farmer_orders(&user, params.with_default_size(10))
        .await?;
    Ok(Json(page.into()))
}

/// GET /orders/recent: latest orders for the dashboard (admin).
#[tracing::instrument(skip(state, user, query))]
pub async fn recent<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<PageResponse<OrderResponse>>, ApiError> {
    let Query(params) = query?;
    let page = state
        .orders
        .recent_orders(&user, params.with_default_size(5))
        .await?;
    Ok(Json(page.into()))
}

/// GET /orders/:id: load one order.
#[tracing::instrument(skip(state, user))]
pub async fn get<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.get_order(&user, order_id).await?;
    Ok(Json(order.into()))
}

/// PUT /orders/:id/status: set the order status.
#[tracing::instrument(skip(state, user, payload))]
pub async fn update_status<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(req) = payload?;
    let order_id = parse_order_id(&id)?;
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let mut cmd = UpdateOrderStatus::new(order_id, status);
    if let Some(notes) = req.notes {
        cmd = cmd.with_notes(notes);
    }

    let order = state.statuses.update_order_status(cmd, &user).await?;
    Ok(Json(order.into()))
}

/// PUT /orders/:id/delivery-status: set the delivery status (owning farmer).
#[tracing::instrument(skip(state, user, payload))]
pub async fn update_delivery_status<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(req) = payload?;
    let order_id = parse_order_id(&id)?;
    let status: DeliveryStatus = req
        .status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let mut cmd = UpdateDeliveryStatus::new(order_id, status);
    if let Some(notes) = req.notes {
        cmd = cmd.with_notes(notes);
    }

    let order = state.statuses.update_delivery_status(cmd, &user).await?;
    Ok(Json(order.into()))
}

/// DELETE /orders/:id: remove an order (admin).
#[tracing::instrument(skip(state, user))]
pub async fn delete<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_order_id(&id)?;
    state.orders.delete_order(&user, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
