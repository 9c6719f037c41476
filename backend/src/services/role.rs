//! Role page permission service

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{effective_pages, Page, UserRole};
use sqlx::{PgExecutor, PgPool};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{AuditAction, AuditService};

/// Role service for the page grants of each role
#[derive(Clone)]
pub struct RoleService {
    db: PgPool,
}

/// Pages granted to one role
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissions {
    pub role: UserRole,
    pub pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRolePermissionsInput {
    pub pages: Vec<Page>,
}

impl RoleService {
    /// Create a new RoleService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Effective pages for a role. Admin always gets every page.
    pub async fn pages_for<'e, E>(executor: E, role: UserRole) -> AppResult<Vec<Page>>
    where
        E: PgExecutor<'e>,
    {
        if role == UserRole::Admin {
            return Ok(Page::ALL.to_vec());
        }

        let keys: Vec<String> =
            sqlx::query_scalar("SELECT page FROM role_permissions WHERE role = $1")
                .bind(role)
                .fetch_all(executor)
                .await?;

        // Rows for pages this build does not know are skipped
        let granted: Vec<Page> = keys.iter().filter_map(|k| k.parse().ok()).collect();
        Ok(effective_pages(role, &granted))
    }

    pub async fn get_role_permissions(&self, role: UserRole) -> AppResult<RolePermissions> {
        let pages = Self::pages_for(&self.db, role).await?;
        Ok(RolePermissions { role, pages })
    }

    /// Replace a role's page grants
    pub async fn set_role_permissions(
        &self,
        user: &AuthUser,
        role: UserRole,
        input: UpdateRolePermissionsInput,
    ) -> AppResult<RolePermissions> {
        if role == UserRole::Admin {
            return Err(AppError::validation(
                "role",
                "Admin permissions are fixed and cannot be edited",
            ));
        }

        let mut pages = input.pages;
        pages.sort_by_key(|p| Page::ALL.iter().position(|q| q == p));
        pages.dedup();

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role = $1")
            .bind(role)
            .execute(&mut *tx)
            .await?;

        for page in &pages {
            sqlx::query("INSERT INTO role_permissions (role, page) VALUES ($1, $2)")
                .bind(role)
                .bind(page.as_str())
                .execute(&mut *tx)
                .await?;
        }

        let keys: Vec<&str> = pages.iter().map(|p| p.as_str()).collect();
        AuditService::record(
            &mut *tx,
            user,
            AuditAction::UpdatePermissions,
            "role",
            None,
            json!({ "role": role, "pages": keys }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(role = %role, pages = pages.len(), "Role permissions updated");
        Ok(RolePermissions { role, pages })
    }
}
