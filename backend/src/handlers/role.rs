//! Role page permission handlers

use axum::{
    extract::{Path, State},
    Json,
};
use shared::UserRole;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::role::{RolePermissions, UpdateRolePermissionsInput};
use crate::services::RoleService;
use crate::AppState;

/// Pages granted to a role
pub async fn get_role_permissions(
    State(state): State<AppState>,
    Path(role): Path<UserRole>,
) -> Result<Json<RolePermissions>, AppError> {
    let role_service = RoleService::new(state.db.clone());
    let permissions = role_service.get_role_permissions(role).await?;

    Ok(Json(permissions))
}

/// Replace the pages granted to a role
pub async fn update_role_permissions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(role): Path<UserRole>,
    Json(input): Json<UpdateRolePermissionsInput>,
) -> Result<Json<RolePermissions>, AppError> {
    let role_service = RoleService::new(state.db.clone());
    let permissions = role_service.set_role_permissions(&user, role, input).await?;

    Ok(Json(permissions))
}

/// Pages the caller can open, read from the database rather than the token
pub async fn my_permissions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<RolePermissions>, AppError> {
    let role_service = RoleService::new(state.db.clone());
    let permissions = role_service.get_role_permissions(user.role).await?;

    Ok(Json(permissions))
}
