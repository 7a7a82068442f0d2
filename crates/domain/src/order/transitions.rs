//! Status transition service.
//!
//! All writes to order status and delivery status go through here, including
//! the one cross-machine rule (delivery `Delivered` forces order `Delivered`),
//! which [`Order::record_delivery_status`] applies.

use chrono::Utc;
use common::{Role, UserId};

use crate::auth::Principal;
use crate::config::ServiceConfig;
use crate::error::{DomainError, Result};
use crate::store::{MarketplaceStore, status_edit};

use super::{Order, StatusLifecycle, UpdateDeliveryStatus, UpdateOrderStatus};

/// Service applying role-gated status changes to orders.
pub struct StatusService<S: MarketplaceStore> {
    store: S,
    config: ServiceConfig,
}

impl<S: MarketplaceStore> StatusService<S> {
    /// Creates a status service with default policies.
    pub fn new(store: S) -> Self {
        Self::with_config(store, ServiceConfig::default())
    }

    pub fn with_config(store: S, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sets the order status and status notes.
    ///
    /// Admins may set any status. A farmer owning at least one line may move
    /// the order along its fulfillment steps, but not reset or cancel it.
    /// The transition is decided against the order as locked by the store,
    /// so the restock on cancellation happens once however many cancels race.
    #[tracing::instrument(skip(self, cmd, principal), fields(order_id = %cmd.order_id, status = %cmd.status, user = %principal.username))]
    pub async fn update_order_status(
        &self,
        cmd: UpdateOrderStatus,
        principal: &Principal,
    ) -> Result<Order> {
        cmd.validate()?;
        match principal.role {
            Role::Admin => {}
            Role::Farmer if cmd.status.is_fulfillment_step() => {}
            Role::Farmer => {
                tracing::warn!("farmer attempted a non-fulfillment status");
                return Err(DomainError::Forbidden(format!(
                    "Farmers cannot set order status {}",
                    cmd.status
                )));
            }
            Role::Client => {
                tracing::warn!(role = %principal.role, "order status change refused");
                return Err(DomainError::Forbidden(
                    "Only admins and farmers can update order status".to_string(),
                ));
            }
        }

        let UpdateOrderStatus {
            order_id,
            status,
            notes,
        } = cmd;
        let config = self.config;
        let farmer = (principal.role == Role::Farmer).then_some(principal.user_id);

        let edit = status_edit(move |order: &mut Order| {
            if let Some(farmer_id) = farmer {
                require_line_owner(order, farmer_id)?;
            }
            let previous = order.status();
            if config.strict_transitions && !previous.permits(status) {
                return Err(DomainError::InvalidArgument(format!(
                    "Illegal order status transition from {previous} to {status}"
                )));
            }

            order.record_status(status, notes, Utc::now());
            let release = config.stock_policy.released_lines(previous, order).to_vec();
            tracing::info!(from = %previous, to = %status, restocked = !release.is_empty(), "order status updated");
            Ok(release)
        });
        let order = self.store.modify_order_status(order_id, edit).await?;

        metrics::counter!("order_status_updates_total", "status" => order.status().as_str())
            .increment(1);

        Ok(order)
    }

    /// Sets the delivery status and, when given, the delivery notes.
    ///
    /// Only a farmer owning at least one line may do this. Setting
    /// `Delivered` also stamps the delivery time and moves the order to
    /// `Delivered` in the same write.
    #[tracing::instrument(skip(self, cmd, principal), fields(order_id = %cmd.order_id, status = %cmd.status, user = %principal.username))]
    pub async fn update_delivery_status(
        &self,
        cmd: UpdateDeliveryStatus,
        principal: &Principal,
    ) -> Result<Order> {
        cmd.validate()?;
        principal.require(Role::Farmer, "update delivery status")?;

        let UpdateDeliveryStatus {
            order_id,
            status,
            notes,
        } = cmd;
        let strict = self.config.strict_transitions;
        let farmer_id = principal.user_id;

        let edit = status_edit(move |order: &mut Order| {
            require_line_owner(order, farmer_id)?;
            let previous = order.delivery().status;
            if strict && !previous.permits(status) {
                return Err(DomainError::InvalidArgument(format!(
                    "Illegal delivery status transition from {previous} to {status}"
                )));
            }

            order.record_delivery_status(status, notes, Utc::now());
            tracing::info!(from = %previous, to = %status, order_status = %order.status(), "delivery status updated");
            Ok(Vec::new())
        });
        let order = self.store.modify_delivery_status(order_id, edit).await?;

        metrics::counter!("delivery_status_updates_total", "status" => status.as_str())
            .increment(1);

        Ok(order)
    }
}

fn require_line_owner(order: &Order, farmer_id: UserId) -> Result<()> {
    if order.has_line_owned_by(farmer_id) {
        return Ok(());
    }
    tracing::warn!("farmer does not own any line of the order");
    Err(DomainError::Forbidden(
        "You can only update status for orders containing your products".to_string(),
    ))
}
