//! Authentication service for login, token management, and the first admin account

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::{validate_password, validate_username, Page, User, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{AdminConfig, Config};
use crate::error::{AppError, AppResult};
use crate::middleware::Claims;
use crate::services::role::RoleService;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// A user together with the pages their role opens
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub pages: Vec<Page>,
}

/// Response after a successful login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub user: UserProfile,
}

/// User row including the password hash
#[derive(Debug, sqlx::FromRow)]
struct Credentials {
    #[sqlx(flatten)]
    user: User,
    password_hash: String,
}

const USER_COLUMNS: &str = "id, username, name, role, is_active, last_login_at, created_at";

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Authenticate with username and password
    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        let credentials = sqlx::query_as::<_, Credentials>(&format!(
            "SELECT {}, password_hash FROM users WHERE LOWER(username) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(username.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(password, &credentials.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            tracing::warn!(username = %credentials.user.username, "Login failed");
            return Err(AppError::InvalidCredentials);
        }

        if !credentials.user.is_active {
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }

        let user = credentials.user;
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let pages = RoleService::pages_for(&self.db, user.role).await?;
        let tokens = self.generate_tokens(&user, &pages)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        tracing::info!(user_id = user.id, role = %user.role, "User logged in");
        Ok(LoginResponse {
            tokens,
            user: UserProfile { user, pages },
        })
    }

    /// Exchange a refresh token for a new pair. The old token is revoked.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = Self::hash_token(refresh_token);

        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.name, u.role, u.is_active, u.last_login_at, u.created_at
            FROM refresh_tokens rt
            JOIN users u ON u.id = rt.user_id
            WHERE rt.token_hash = $1
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.is_active = TRUE
            FOR UPDATE OF rt
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired refresh token".to_string()))?;

        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let pages = RoleService::pages_for(&self.db, user.role).await?;
        let tokens = self.generate_tokens(&user, &pages)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        Ok(tokens)
    }

    /// Revoke every outstanding refresh token of a user
    pub async fn logout(&self, user_id: i32) -> AppResult<()> {
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?
        .rows_affected();

        tracing::info!(user_id, revoked, "User logged out");
        Ok(())
    }

    /// Current profile, read fresh so role or page changes show up immediately
    pub async fn current_user(&self, user_id: i32) -> AppResult<UserProfile> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let pages = RoleService::pages_for(&self.db, user.role).await?;
        Ok(UserProfile { user, pages })
    }

    /// Create the first admin when the users table is empty
    pub async fn bootstrap_admin(&self, admin: &AdminConfig) -> AppResult<()> {
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        if users > 0 {
            return Ok(());
        }

        let Some(password) = admin.password.as_deref() else {
            tracing::warn!(
                "No users exist and admin.password is not set; set NURSERY__ADMIN__PASSWORD to create the first admin"
            );
            return Ok(());
        };

        validate_username(&admin.username).map_err(|m| AppError::validation("admin.username", m))?;
        validate_password(password).map_err(|m| AppError::validation("admin.password", m))?;

        let password_hash = Self::hash_password(password)?;
        sqlx::query(
            "INSERT INTO users (username, password_hash, name, role) VALUES ($1, $2, $3, $4)",
        )
        .bind(&admin.username)
        .bind(&password_hash)
        .bind("Administrator")
        .bind(UserRole::Admin)
        .execute(&self.db)
        .await?;

        tracing::info!(username = %admin.username, "Initial admin account created");
        Ok(())
    }

    pub fn hash_password(password: &str) -> AppResult<String> {
        hash(password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user: &User, pages: &[Page]) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role.as_str().to_string(),
            pages: pages.iter().map(|p| p.as_str().to_string()).collect(),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(AuthTokens {
            access_token,
            refresh_token: Uuid::new_v4().to_string(),
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(&self, user_id: i32, token: &str) -> AppResult<()> {
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(Self::hash_token(token))
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// SHA-256 hex digest; only the digest is stored
    fn hash_token(token: &str) -> String {
        Sha256::digest(token.as_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hash_is_stable_hex() {
        let a = AuthService::hash_token("3f2b8c1e-0000-4000-8000-000000000000");
        let b = AuthService::hash_token("3f2b8c1e-0000-4000-8000-000000000000");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, AuthService::hash_token("another-token"));
    }

    #[test]
    fn test_password_hash_verifies() {
        let hashed = AuthService::hash_password("correct horse").unwrap();
        assert!(verify("correct horse", &hashed).unwrap());
        assert!(!verify("wrong horse", &hashed).unwrap());
    }
}
