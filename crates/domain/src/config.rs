//! Service-level policy switches.

use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderLine, OrderStatus};

/// What happens to reserved stock when an order is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StockPolicy {
    /// Cancelled orders keep their stock decremented.
    #[default]
    KeepOnCancel,
    /// Cancelling an order returns its quantities to the catalog.
    RestockOnCancel,
}

impl StockPolicy {
    /// Returns the lines whose stock goes back to the catalog after a status change.
    ///
    /// Only the first move into `Cancelled` can release anything.
    pub fn released_lines<'a>(&self, previous: OrderStatus, order: &'a Order) -> &'a [OrderLine] {
        let newly_cancelled =
            previous != OrderStatus::Cancelled && order.status() == OrderStatus::Cancelled;
        match self {
            StockPolicy::RestockOnCancel if newly_cancelled => order.lines(),
            _ => &[],
        }
    }
}

/// Knobs shared by the order services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub stock_policy: StockPolicy,
    /// Reject status changes that skip or reverse an edge of the state diagram.
    pub strict_transitions: bool,
}

impl ServiceConfig {
    pub fn with_stock_policy(mut self, stock_policy: StockPolicy) -> Self {
        self.stock_policy = stock_policy;
        self
    }

    pub fn with_strict_transitions(mut self, strict: bool) -> Self {
        self.strict_transitions = strict;
        self
    }
}
