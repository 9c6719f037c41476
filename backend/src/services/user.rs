//! User administration service

use serde::Deserialize;
use serde_json::json;
use shared::{validate_password, validate_username, User, UserRole};
use sqlx::PgPool;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{AuditAction, AuditService};
use crate::services::auth::AuthService;

/// User service
#[derive(Clone)]
pub struct UserService {
    db: PgPool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    pub username: String,
    pub password: String,
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    pub role: UserRole,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    /// Resets the password when present
    pub password: Option<String>,
}

const USER_COLUMNS: &str = "id, username, name, role, is_active, last_login_at, created_at";

/// Changes an admin may not make to their own account
fn check_self_edit(actor: &AuthUser, target_id: i32, input: &UpdateUserInput) -> AppResult<()> {
    if actor.user_id != target_id {
        return Ok(());
    }
    if input.is_active == Some(false) {
        return Err(AppError::validation("isActive", "You cannot deactivate your own account"));
    }
    if input.role.is_some_and(|r| r != UserRole::Admin) {
        return Err(AppError::validation("role", "You cannot remove your own admin role"));
    }
    Ok(())
}

impl UserService {
    /// Create a new UserService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY username",
            USER_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    pub async fn get(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    pub async fn create(&self, actor: &AuthUser, input: CreateUserInput) -> AppResult<User> {
        input.validate()?;
        let username = input.username.trim().to_string();
        validate_username(&username).map_err(|m| AppError::validation("username", m))?;
        validate_password(&input.password).map_err(|m| AppError::validation("password", m))?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = LOWER($1))",
        )
        .bind(&username)
        .fetch_one(&self.db)
        .await?;
        if taken {
            return Err(AppError::DuplicateEntry("username".to_string()));
        }

        let password_hash = AuthService::hash_password(&input.password)?;
        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password_hash, name, role, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&username)
        .bind(&password_hash)
        .bind(input.name.trim())
        .bind(input.role)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            actor,
            AuditAction::Create,
            "user",
            Some(user.id),
            json!({ "username": user.username, "role": user.role }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = user.id, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn update(&self, actor: &AuthUser, id: i32, input: UpdateUserInput) -> AppResult<User> {
        input.validate()?;
        check_self_edit(actor, id, &input)?;
        let existing = self.get(id).await?;

        let password_hash = match &input.password {
            Some(password) => {
                validate_password(password).map_err(|m| AppError::validation("password", m))?;
                Some(AuthService::hash_password(password)?)
            }
            None => None,
        };

        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = $1, role = $2, is_active = $3,
                password_hash = COALESCE($4, password_hash)
            WHERE id = $5
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(input.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(input.role.unwrap_or(existing.role))
        .bind(input.is_active.unwrap_or(existing.is_active))
        .bind(&password_hash)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        // A deactivated user or a password reset ends existing sessions
        if !user.is_active || password_hash.is_some() {
            sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        AuditService::record(
            &mut *tx,
            actor,
            AuditAction::Update,
            "user",
            Some(id),
            json!({
                "role": { "from": existing.role, "to": user.role },
                "isActive": user.is_active,
                "passwordReset": password_hash.is_some(),
            }),
        )
        .await?;

        tx.commit().await?;

        Ok(user)
    }

    pub async fn delete(&self, actor: &AuthUser, id: i32) -> AppResult<()> {
        if actor.user_id == id {
            return Err(AppError::validation("id", "You cannot delete your own account"));
        }
        let user = self.get(id).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            actor,
            AuditAction::Delete,
            "user",
            Some(id),
            json!({ "username": user.username }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(id: i32) -> AuthUser {
        AuthUser {
            user_id: id,
            username: "admin".to_string(),
            role: UserRole::Admin,
            pages: shared::Page::ALL.to_vec(),
        }
    }

    fn patch(role: Option<UserRole>, is_active: Option<bool>) -> UpdateUserInput {
        UpdateUserInput {
            name: None,
            role,
            is_active,
            password: None,
        }
    }

    #[test]
    fn test_admin_cannot_deactivate_or_demote_self() {
        assert!(check_self_edit(&admin(1), 1, &patch(None, Some(false))).is_err());
        assert!(check_self_edit(&admin(1), 1, &patch(Some(UserRole::Staff), None)).is_err());
        assert!(check_self_edit(&admin(1), 1, &patch(Some(UserRole::Admin), Some(true))).is_ok());
    }

    #[test]
    fn test_admin_can_change_other_users() {
        assert!(check_self_edit(&admin(1), 2, &patch(Some(UserRole::Staff), Some(false))).is_ok());
    }
}
