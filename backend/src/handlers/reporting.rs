//! Dashboard and delivery schedule handlers

use axum::{
    extract::{Query, State},
    Json,
};
use shared::Page;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::reporting::{DeliverySchedule, ScheduleQuery, SummaryReport};
use crate::services::ReportingService;
use crate::AppState;

/// Stock, order and payment totals for the dashboard
pub async fn get_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<SummaryReport>> {
    user.require_any_page(&[Page::Dashboard, Page::Reports])?;

    let service = ReportingService::new(state.db.clone());
    Ok(Json(service.summary().await?))
}

/// Booked orders due in a date window
pub async fn get_delivery_schedule(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<Json<DeliverySchedule>> {
    user.require_any_page(&[Page::Deliveries, Page::Reports])?;

    let today = chrono::Utc::now().date_naive();
    let service = ReportingService::new(state.db.clone());
    Ok(Json(service.delivery_schedule(query, today).await?))
}
