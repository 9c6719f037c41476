//! Seed inward handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{InwardLotOption, Page, SeedInwardBatch};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::seed_inward::{BatchFilter, ReceiveBatchInput, UpdateBatchInput};
use crate::services::SeedInwardService;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotPickerQuery {
    pub category_id: i32,
    pub variety_id: i32,
}

pub async fn list_batches(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<BatchFilter>,
) -> Result<Json<Vec<SeedInwardBatch>>, AppError> {
    user.require_page(Page::SeedInward)?;

    let service = SeedInwardService::new(state.db.clone());
    Ok(Json(service.list(filter).await?))
}

pub async fn get_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<SeedInwardBatch>, AppError> {
    user.require_page(Page::SeedInward)?;

    let service = SeedInwardService::new(state.db.clone());
    Ok(Json(service.get(id).await?))
}

/// Lot-number picker for the sowing form
pub async fn list_available_batches(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<LotPickerQuery>,
) -> Result<Json<Vec<InwardLotOption>>, AppError> {
    user.require_any_page(&[Page::Lots, Page::SeedInward])?;

    let service = SeedInwardService::new(state.db.clone());
    let options = service
        .list_available_batches(query.category_id, query.variety_id)
        .await?;

    Ok(Json(options))
}

pub async fn receive_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<ReceiveBatchInput>,
) -> Result<(StatusCode, Json<SeedInwardBatch>), AppError> {
    user.require_page(Page::SeedInward)?;

    let service = SeedInwardService::new(state.db.clone());
    let batch = service.receive(&user, input).await?;

    Ok((StatusCode::CREATED, Json(batch)))
}

pub async fn update_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<UpdateBatchInput>,
) -> Result<Json<SeedInwardBatch>, AppError> {
    user.require_page(Page::SeedInward)?;

    let service = SeedInwardService::new(state.db.clone());
    Ok(Json(service.update(&user, id, input).await?))
}

pub async fn delete_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    user.require_page(Page::SeedInward)?;

    let service = SeedInwardService::new(state.db.clone());
    service.delete(&user, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
