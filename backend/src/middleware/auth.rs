//! Authentication middleware
//!
//! JWT authentication and role/page access control. The validated user is
//! attached to the request as an [`AuthUser`] extension and handed to
//! services explicitly.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use shared::{Page, UserRole};

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i32,
    pub username: String,
    pub role: UserRole,
    pub pages: Vec<Page>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Check if user may open a page
    pub fn can_access(&self, page: Page) -> bool {
        self.is_admin() || self.pages.contains(&page)
    }

    /// Page guard for use in handlers
    pub fn require_page(&self, page: Page) -> AppResult<()> {
        if self.can_access(page) {
            Ok(())
        } else {
            tracing::warn!(
                user = %self.username,
                page = page.as_str(),
                "Page access denied"
            );
            Err(AppError::InsufficientPermissions)
        }
    }

    /// Guard for endpoints shared by several screens
    pub fn require_any_page(&self, pages: &[Page]) -> AppResult<()> {
        if pages.iter().any(|p| self.can_access(*p)) {
            Ok(())
        } else {
            tracing::warn!(user = %self.username, ?pages, "Page access denied");
            Err(AppError::InsufficientPermissions)
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub username: String,
    pub role: String,
    pub pages: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    fn into_auth_user(self) -> AppResult<AuthUser> {
        let user_id = self.sub.parse::<i32>().map_err(|_| AppError::InvalidToken)?;
        let role = self.role.parse::<UserRole>().map_err(|_| AppError::InvalidToken)?;
        // Unknown page keys (e.g. from an older release) are ignored
        let pages = self
            .pages
            .iter()
            .filter_map(|p| p.parse::<Page>().ok())
            .collect();

        Ok(AuthUser {
            user_id,
            username: self.username,
            role,
            pages,
        })
    }
}

/// Decode and validate JWT token
pub fn decode_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::InvalidToken
    })
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return AppError::Unauthorized("Missing or invalid Authorization header".to_string())
            .into_response();
    };

    let auth_user = match decode_jwt(token, &state.config.jwt.secret).and_then(Claims::into_auth_user)
    {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// Admin-only gate; must run after [`auth_middleware`]
pub async fn admin_middleware(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => next.run(request).await,
        Some(user) => {
            tracing::warn!(user = %user.username, "Admin route denied");
            AppError::InsufficientPermissions.into_response()
        }
        None => AppError::Unauthorized("Authentication required".to_string()).into_response(),
    }
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(role: &str, pages: &[&str]) -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: "42".to_string(),
            username: "ravi".to_string(),
            role: role.to_string(),
            pages: pages.iter().map(|p| p.to_string()).collect(),
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn test_decode_round_trip() {
        let t = token(&claims("staff", &["orders", "lots"]), "secret");
        let user = decode_jwt(&t, "secret").and_then(Claims::into_auth_user).unwrap();
        assert_eq!(user.user_id, 42);
        assert_eq!(user.role, UserRole::Staff);
        assert!(user.can_access(Page::Orders));
        assert!(!user.can_access(Page::Users));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let t = token(&claims("staff", &[]), "secret");
        assert!(matches!(decode_jwt(&t, "other"), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut c = claims("staff", &[]);
        c.exp = chrono::Utc::now().timestamp() - 3600;
        let t = token(&c, "secret");
        assert!(decode_jwt(&t, "secret").is_err());
    }

    #[test]
    fn test_admin_can_access_everything() {
        let t = token(&claims("admin", &[]), "secret");
        let user = decode_jwt(&t, "secret").and_then(Claims::into_auth_user).unwrap();
        assert!(Page::ALL.iter().all(|p| user.can_access(*p)));
        assert!(user.require_page(Page::Users).is_ok());
    }

    #[test]
    fn test_require_any_page() {
        let t = token(&claims("staff", &["deliveries"]), "secret");
        let user = decode_jwt(&t, "secret").and_then(Claims::into_auth_user).unwrap();
        assert!(user.require_any_page(&[Page::Orders, Page::Deliveries]).is_ok());
        assert!(matches!(
            user.require_any_page(&[Page::Lots, Page::SeedInward]),
            Err(AppError::InsufficientPermissions)
        ));
    }

    #[test]
    fn test_unknown_pages_are_ignored() {
        let t = token(&claims("manager", &["orders", "weather"]), "secret");
        let user = decode_jwt(&t, "secret").and_then(Claims::into_auth_user).unwrap();
        assert_eq!(user.pages, vec![Page::Orders]);
    }
}
