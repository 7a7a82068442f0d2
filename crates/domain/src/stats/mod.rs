//! Statistics engine.
//!
//! Aggregates order history into dense per-day series. Days are UTC calendar
//! days keyed on the order timestamp, and every day of the requested range
//! gets an entry even when nothing happened.

mod range;

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use common::Role;
use serde::{Deserialize, Serialize};

pub use range::{DateRange, MAX_RANGE_DAYS, Period, TimeRange};

use crate::auth::Principal;
use crate::error::Result;
use crate::order::{Money, Order, OrderStatus};
use crate::store::MarketplaceStore;

/// Delivered orders placed on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyDeliveries {
    pub date: NaiveDate,
    pub deliveries: u64,
}

/// Money from orders placed on one day.
///
/// `income` sums delivered orders and `outgoing` sums cancelled ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPayments {
    pub date: NaiveDate,
    pub income: Money,
    pub outgoing: Money,
}

/// Headline counters for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_orders: u64,
    pub total_successful_deliveries: u64,
    pub total_farmers: u64,
    pub total_clients: u64,
}

/// Folds orders into a zero-filled map with one slot per day of `range`.
fn daily<T, F>(range: &DateRange, orders: &[Order], zero: T, mut apply: F) -> BTreeMap<NaiveDate, T>
where
    T: Clone,
    F: FnMut(&mut T, &Order),
{
    let mut series: BTreeMap<_, _> = range.days().map(|day| (day, zero.clone())).collect();
    for order in orders {
        if let Some(slot) = series.get_mut(&order.placed_at().date_naive()) {
            apply(slot, order);
        }
    }
    series
}

/// Read-only reporting over the order history. Admin only.
pub struct StatisticsService<S: MarketplaceStore> {
    store: S,
}

impl<S: MarketplaceStore> StatisticsService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Counts delivered orders per day of `[start, end]`.
    #[tracing::instrument(skip(self, principal), fields(user = %principal.username))]
    pub async fn delivery_stats(
        &self,
        principal: &Principal,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyDeliveries>> {
        let (range, orders) = self.orders_in(principal, start, end).await?;

        let series = daily(&range, &orders, 0_u64, |count, order| {
            if order.status() == OrderStatus::Delivered {
                *count += 1;
            }
        });

        Ok(series
            .into_iter()
            .map(|(date, deliveries)| DailyDeliveries { date, deliveries })
            .collect())
    }

    /// Sums delivered and cancelled order totals per day of `[start, end]`.
    #[tracing::instrument(skip(self, principal), fields(user = %principal.username))]
    pub async fn payment_stats(
        &self,
        principal: &Principal,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyPayments>> {
        let (range, orders) = self.orders_in(principal, start, end).await?;

        let series = daily(
            &range,
            &orders,
            (Money::zero(), Money::zero()),
            |(income, outgoing), order| match order.status() {
                OrderStatus::Delivered => *income += order.total_price(),
                OrderStatus::Cancelled => *outgoing += order.total_price(),
                _ => {}
            },
        );

        Ok(series
            .into_iter()
            .map(|(date, (income, outgoing))| DailyPayments {
                date,
                income,
                outgoing,
            })
            .collect())
    }

    /// Returns the dashboard counters.
    #[tracing::instrument(skip(self, principal), fields(user = %principal.username))]
    pub async fn dashboard(&self, principal: &Principal) -> Result<DashboardStats> {
        principal.require(Role::Admin, "view statistics")?;

        Ok(DashboardStats {
            total_orders: self.store.count_orders().await?,
            total_successful_deliveries: self
                .store
                .count_orders_with_status(OrderStatus::Delivered)
                .await?,
            total_farmers: self.store.count_users_by_role(Role::Farmer).await?,
            total_clients: self.store.count_users_by_role(Role::Client).await?,
        })
    }

    async fn orders_in(
        &self,
        principal: &Principal,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(DateRange, Vec<Order>)> {
        principal.require(Role::Admin, "view statistics")?;
        let range = DateRange::new(start, end, Utc::now().date_naive())?;

        let (from, to) = range.bounds()?;
        let orders = self.store.orders_placed_between(from, to).await?;
        tracing::debug!(
            start = %range.start(),
            end = %range.end(),
            orders = orders.len(),
            "aggregating orders"
        );
        Ok((range, orders))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveTime};
    use common::{OrderId, UserId};

    use super::*;
    use crate::auth::User;
    use crate::catalog::Product;
    use crate::error::DomainError;
    use crate::order::{DeliveryInfo, OrderLine};
    use crate::store::InMemoryMarketplaceStore;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn noon(day: &str) -> DateTime<Utc> {
        date(day).and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()).and_utc()
    }

    struct Fixture {
        stats: StatisticsService<InMemoryMarketplaceStore>,
        admin: Principal,
        product: Product,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryMarketplaceStore::new();
        let product = Product::new("Milk", Money::from_cents(100), 1_000, UserId::new());
        store.put_product(product.clone()).await.unwrap();
        Fixture {
            stats: StatisticsService::new(store),
            admin: User::new("ada", Role::Admin).principal(),
            product,
        }
    }

    /// Stores an order placed at `placed_at` with the given total and status.
    async fn seed(fx: &Fixture, placed_at: DateTime<Utc>, cents: i64, status: OrderStatus) {
        let line = OrderLine {
            product_id: fx.product.id,
            product_name: fx.product.name.clone(),
            farmer_id: fx.product.owner_id,
            quantity: 1,
            unit_price: Money::from_cents(cents),
        };
        let mut order = Order::place(
            OrderId::new(),
            UserId::new(),
            "carol",
            vec![line],
            DeliveryInfo::new("5 Meadow Road, Elmstead", placed_at + Duration::days(1), None),
            placed_at,
        );
        if status != OrderStatus::Pending {
            order.record_status(status, None, placed_at);
        }
        fx.stats.store().place_order(&order).await.unwrap();
    }

    #[tokio::test]
    async fn test_payment_series_is_dense() {
        let fx = fixture().await;
        seed(&fx, noon("2024-01-02"), 10_000, OrderStatus::Delivered).await;
        seed(&fx, noon("2024-01-03"), 5_000, OrderStatus::Cancelled).await;
        seed(&fx, noon("2024-01-03"), 7_700, OrderStatus::Preparing).await;
        seed(&fx, noon("2024-01-04"), 9_900, OrderStatus::Delivered).await;

        let series = fx
            .stats
            .payment_stats(&fx.admin, Some(date("2024-01-01")), Some(date("2024-01-03")))
            .await
            .unwrap();

        let expected = vec![
            (date("2024-01-01"), 0, 0),
            (date("2024-01-02"), 10_000, 0),
            (date("2024-01-03"), 0, 5_000),
        ];
        let actual: Vec<_> = series
            .iter()
            .map(|d| (d.date, d.income.cents(), d.outgoing.cents()))
            .collect();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_delivery_counts_per_day() {
        let fx = fixture().await;
        seed(&fx, noon("2024-05-01"), 100, OrderStatus::Delivered).await;
        seed(&fx, noon("2024-05-01"), 100, OrderStatus::Delivered).await;
        seed(&fx, noon("2024-05-01"), 100, OrderStatus::InDelivery).await;
        // Last second of the range still counts
        let late = date("2024-05-02").and_hms_opt(23, 59, 59).unwrap().and_utc();
        seed(&fx, late, 100, OrderStatus::Delivered).await;

        let series = fx
            .stats
            .delivery_stats(&fx.admin, Some(date("2024-05-01")), Some(date("2024-05-02")))
            .await
            .unwrap();

        assert_eq!(
            series,
            vec![
                DailyDeliveries {
                    date: date("2024-05-01"),
                    deliveries: 2
                },
                DailyDeliveries {
                    date: date("2024-05-02"),
                    deliveries: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_day_yields_one_zero_entry() {
        let fx = fixture().await;
        let day = Some(date("2023-07-14"));

        let deliveries = fx.stats.delivery_stats(&fx.admin, day, day).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].deliveries, 0);

        let payments = fx.stats.payment_stats(&fx.admin, day, day).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert!(payments[0].income.is_zero() && payments[0].outgoing.is_zero());
    }

    #[tokio::test]
    async fn test_invalid_ranges_rejected() {
        let fx = fixture().await;
        let tomorrow = Utc::now().date_naive() + Duration::days(1);

        let cases = [
            (None, Some(date("2024-01-01"))),
            (Some(date("2024-01-05")), Some(date("2024-01-01"))),
            (Some(tomorrow), Some(tomorrow)),
        ];
        for (start, end) in cases {
            let err = fx
                .stats
                .delivery_stats(&fx.admin, start, end)
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_statistics_are_admin_only() {
        let fx = fixture().await;
        let farmer = User::new("frank", Role::Farmer).principal();
        let day = Some(date("2024-01-01"));

        let err = fx.stats.payment_stats(&farmer, day, day).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        let err = fx.stats.dashboard(&farmer).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let fx = fixture().await;
        let store = fx.stats.store();
        store.put_user(User::new("frank", Role::Farmer)).await.unwrap();
        store.put_user(User::new("carol", Role::Client)).await.unwrap();
        store.put_user(User::new("dave", Role::Client)).await.unwrap();
        seed(&fx, noon("2024-01-02"), 100, OrderStatus::Delivered).await;
        seed(&fx, noon("2024-01-02"), 100, OrderStatus::Cancelled).await;
        seed(&fx, noon("2024-01-02"), 100, OrderStatus::Pending).await;

        let stats = fx.stats.dashboard(&fx.admin).await.unwrap();

        assert_eq!(
            stats,
            DashboardStats {
                total_orders: 3,
                total_successful_deliveries: 1,
                total_farmers: 1,
                total_clients: 2,
            }
        );
    }
}
