//! Category and variety handlers
//!
//! Reads are open to every signed-in user since the lot and order forms
//! need the lists. Writes need the matching page.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{Category, Page, Variety};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::category::{CreateCategoryInput, UpdateCategoryInput};
use crate::services::variety::{CreateVarietyInput, UpdateVarietyInput};
use crate::services::{CategoryService, VarietyService};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    pub category_id: Option<i32>,
    pub active_only: Option<bool>,
}

pub async fn list_categories(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<Category>>, AppError> {
    let service = CategoryService::new(state.db.clone());
    let categories = service.list(query.active_only.unwrap_or(false)).await?;

    Ok(Json(categories))
}

pub async fn get_category(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<Category>, AppError> {
    let service = CategoryService::new(state.db.clone());
    Ok(Json(service.get(id).await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    user.require_page(Page::Categories)?;

    let service = CategoryService::new(state.db.clone());
    let category = service.create(&user, input).await?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, AppError> {
    user.require_page(Page::Categories)?;

    let service = CategoryService::new(state.db.clone());
    Ok(Json(service.update(&user, id, input).await?))
}

pub async fn delete_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    user.require_page(Page::Categories)?;

    let service = CategoryService::new(state.db.clone());
    service.delete(&user, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_varieties(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<Variety>>, AppError> {
    let service = VarietyService::new(state.db.clone());
    let varieties = service
        .list(query.category_id, query.active_only.unwrap_or(false))
        .await?;

    Ok(Json(varieties))
}

pub async fn get_variety(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<Variety>, AppError> {
    let service = VarietyService::new(state.db.clone());
    Ok(Json(service.get(id).await?))
}

pub async fn create_variety(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateVarietyInput>,
) -> Result<(StatusCode, Json<Variety>), AppError> {
    user.require_page(Page::Varieties)?;

    let service = VarietyService::new(state.db.clone());
    let variety = service.create(&user, input).await?;

    Ok((StatusCode::CREATED, Json(variety)))
}

pub async fn update_variety(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<UpdateVarietyInput>,
) -> Result<Json<Variety>, AppError> {
    user.require_page(Page::Varieties)?;

    let service = VarietyService::new(state.db.clone());
    Ok(Json(service.update(&user, id, input).await?))
}

pub async fn delete_variety(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    user.require_page(Page::Varieties)?;

    let service = VarietyService::new(state.db.clone());
    service.delete(&user, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
