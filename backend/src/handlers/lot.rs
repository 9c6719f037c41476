//! Sowing lot HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{LotWithAvailability, Page};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::lot::{
    AssignOrdersInput, CreateLotInput, LotFilter, RecordDamageInput, UpdateLotInput,
};
use crate::services::LotService;
use crate::AppState;

/// List lots with computed availability. Booking screens read this too.
pub async fn list_lots(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<LotFilter>,
) -> Result<Json<Vec<LotWithAvailability>>, AppError> {
    user.require_any_page(&[Page::Lots, Page::Orders])?;

    let service = LotService::new(state.db.clone());
    Ok(Json(service.list_with_availability(filter).await?))
}

pub async fn get_lot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(lot_id): Path<i32>,
) -> Result<Json<LotWithAvailability>, AppError> {
    user.require_any_page(&[Page::Lots, Page::Orders])?;

    let service = LotService::new(state.db.clone());
    Ok(Json(service.get(lot_id).await?))
}

/// New sowing entry
pub async fn create_lot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateLotInput>,
) -> Result<(StatusCode, Json<LotWithAvailability>), AppError> {
    user.require_page(Page::Lots)?;

    let service = LotService::new(state.db.clone());
    let lot = service.create(&user, input).await?;

    Ok((StatusCode::CREATED, Json(lot)))
}

pub async fn update_lot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(lot_id): Path<i32>,
    Json(input): Json<UpdateLotInput>,
) -> Result<Json<LotWithAvailability>, AppError> {
    user.require_page(Page::Lots)?;

    let service = LotService::new(state.db.clone());
    Ok(Json(service.update(&user, lot_id, input).await?))
}

pub async fn delete_lot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(lot_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    user.require_page(Page::Lots)?;

    let service = LotService::new(state.db.clone());
    service.delete(&user, lot_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_damage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(lot_id): Path<i32>,
    Json(input): Json<RecordDamageInput>,
) -> Result<Json<LotWithAvailability>, AppError> {
    user.require_page(Page::Lots)?;

    let service = LotService::new(state.db.clone());
    let lot = service
        .record_damage(&user, lot_id, input.additional_damaged)
        .await?;

    Ok(Json(lot))
}

/// Link orders booked without a lot
pub async fn assign_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(lot_id): Path<i32>,
    Json(input): Json<AssignOrdersInput>,
) -> Result<Json<LotWithAvailability>, AppError> {
    user.require_page(Page::Lots)?;

    let service = LotService::new(state.db.clone());
    let lot = service
        .assign_pending_orders(&user, lot_id, input.order_ids, state.config.booking.policy())
        .await?;

    Ok(Json(lot))
}
