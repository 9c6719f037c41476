//! User administration handlers
//!
//! Mounted behind the admin gate.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::User;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::user::{CreateUserInput, UpdateUserInput};
use crate::services::UserService;
use crate::AppState;

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    let user_service = UserService::new(state.db.clone());
    Ok(Json(user_service.list().await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> Result<Json<User>, AppError> {
    let user_service = UserService::new(state.db.clone());
    Ok(Json(user_service.get(user_id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user_service = UserService::new(state.db.clone());
    let user = user_service.create(&actor, input).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<i32>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<User>, AppError> {
    let user_service = UserService::new(state.db.clone());
    Ok(Json(user_service.update(&actor, user_id, input).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let user_service = UserService::new(state.db.clone());
    user_service.delete(&actor, user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
