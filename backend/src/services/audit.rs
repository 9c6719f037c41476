//! Audit log service
//!
//! Mutations record who did what to which row. Writes take any executor so
//! they can join the caller's transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{PaginatedResponse, Pagination};
use sqlx::{PgExecutor, PgPool};

use crate::error::AppResult;
use crate::middleware::AuthUser;

/// Audit log service
#[derive(Clone)]
pub struct AuditService {
    db: PgPool,
}

/// Kinds of audited actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    RecordDamage,
    AssignOrders,
    Deliver,
    Cancel,
    UndoDelivery,
    UpdatePermissions,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::RecordDamage => "record_damage",
            AuditAction::AssignOrders => "assign_orders",
            AuditAction::Deliver => "deliver",
            AuditAction::Cancel => "cancel",
            AuditAction::UndoDelivery => "undo_delivery",
            AuditAction::UpdatePermissions => "update_permissions",
        }
    }
}

/// Audit log entry
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i32>,
    pub username: String,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<i32>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditService {
    /// Create a new AuditService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append an entry
    pub async fn record<'e, E>(
        executor: E,
        user: &AuthUser,
        action: AuditAction,
        entity: &str,
        entity_id: Option<i32>,
        details: serde_json::Value,
    ) -> AppResult<()>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, username, action, entity, entity_id, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.username)
        .bind(action.as_str())
        .bind(entity)
        .bind(entity_id)
        .bind(details)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Newest entries first, optionally for one entity type
    pub async fn list(
        &self,
        pagination: Pagination,
        entity: Option<&str>,
    ) -> AppResult<PaginatedResponse<AuditLog>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_logs WHERE ($1::TEXT IS NULL OR entity = $1)",
        )
        .bind(entity)
        .fetch_one(&self.db)
        .await?;

        let logs = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT id, user_id, username, action, entity, entity_id, details, created_at
            FROM audit_logs
            WHERE ($1::TEXT IS NULL OR entity = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(entity)
        .bind(i64::from(pagination.limit))
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(logs, pagination, total.max(0) as u64))
    }
}
