//! Audit log handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use shared::{PaginatedResponse, Pagination};

use crate::error::AppError;
use crate::services::audit::AuditLog;
use crate::services::AuditService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub entity: Option<String>,
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<PaginatedResponse<AuditLog>>, AppError> {
    let audit_service = AuditService::new(state.db.clone());
    let pagination = Pagination::from_query(query.page, query.limit);
    let logs = audit_service
        .list(pagination, query.entity.as_deref())
        .await?;

    Ok(Json(logs))
}
