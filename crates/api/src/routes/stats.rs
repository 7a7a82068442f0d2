//! Admin statistics endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use chrono::{NaiveDate, Utc};
use domain::{DailyDeliveries, DailyPayments, DashboardStats, MarketplaceStore, TimeRange};
use serde::{Deserialize, Serialize};

use super::orders::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// Range selection: either `timeRange=week:2` or explicit `start` and `end`.
#[derive(Debug, Deserialize)]
pub struct RangeParams {
    #[serde(rename = "timeRange")]
    pub time_range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RangeParams {
    /// Resolves the parameters into the bounds passed to the statistics service.
    ///
    /// Missing explicit bounds are passed through so the service rejects them.
    fn bounds(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), ApiError> {
        if let Some(time_range) = &self.time_range {
            let range = TimeRange::parse(time_range)?.resolve(Utc::now().date_naive())?;
            return Ok((Some(range.start()), Some(range.end())));
        }
        Ok((parse_date(self.start.as_deref())?, parse_date(self.end.as_deref())?))
    }
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    value
        .map(|v| {
            v.parse::<NaiveDate>()
                .map_err(|e| ApiError::BadRequest(format!("Invalid date {v}: {e}")))
        })
        .transpose()
}

#[derive(Serialize)]
pub struct DeliveryStatsResponse {
    pub date: NaiveDate,
    pub deliveries: u64,
}

#[derive(Serialize)]
pub struct PaymentStatsResponse {
    pub date: NaiveDate,
    pub income_cents: i64,
    pub outgoing_cents: i64,
}

impl From<DailyDeliveries> for DeliveryStatsResponse {
    fn from(day: DailyDeliveries) -> Self {
        Self {
            date: day.date,
            deliveries: day.deliveries,
        }
    }
}

impl From<DailyPayments> for PaymentStatsResponse {
    fn from(day: DailyPayments) -> Self {
        Self {
            date: day.date,
            income_cents: day.income.cents(),
            outgoing_cents: day.outgoing.cents(),
        }
    }
}

/// GET /orders/stats: dashboard counters.
#[tracing::instrument(skip(state, user))]
pub async fn dashboard<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.stats.dashboard(&user).await?))
}

/// GET /orders/delivery-stats: delivered orders per day.
#[tracing::instrument(skip(state, user))]
pub async fn deliveries<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    query: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<Vec<DeliveryStatsResponse>>, ApiError> {
    let Query(params) = query?;
    let (start, end) = params.bounds()?;
    let series = state.stats.delivery_stats(&user, start, end).await?;
    Ok(Json(series.into_iter().map(Into::into).collect()))
}

/// GET /orders/payment-stats: income and outgoing per day.
#[tracing::instrument(skip(state, user))]
pub async fn payments<S: MarketplaceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    query: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<Vec<PaymentStatsResponse>>, ApiError> {
    let Query(params) = query?;
    let (start, end) = params.bounds()?;
    let series = state.stats.payment_stats(&user, start, end).await?;
    Ok(Json(series.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(time_range: Option<&str>, start: Option<&str>, end: Option<&str>) -> RangeParams {
        RangeParams {
            time_range: time_range.map(str::to_string),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    #[test]
    fn test_explicit_dates() {
        let (start, end) = params(None, Some("2024-01-01"), Some("2024-01-03"))
            .bounds()
            .unwrap();
        assert_eq!(start, Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert_eq!(end, Some(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()));
    }

    #[test]
    fn test_missing_bound_is_passed_through() {
        let (start, end) = params(None, Some("2024-01-01"), None).bounds().unwrap();
        assert!(start.is_some());
        assert!(end.is_none());
    }

    #[test]
    fn test_time_range_ends_today() {
        let (start, end) = params(Some("day:3"), None, None).bounds().unwrap();
        let today = Utc::now().date_naive();
        assert_eq!(end, Some(today));
        assert_eq!(start, Some(today - chrono::Duration::days(3)));
    }

    #[test]
    fn test_bad_inputs() {
        assert!(params(Some("decade"), None, None).bounds().is_err());
        assert!(params(None, Some("01/02/2024"), Some("2024-01-03")).bounds().is_err());
    }
}
