//! User, role, and page permission models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A staff account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub username: String,
    pub name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Roles a user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    Staff,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Manager => "manager",
            UserRole::Staff => "staff",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "manager" => Ok(UserRole::Manager),
            "staff" => Ok(UserRole::Staff),
            other => Err(DomainError::invalid("role", format!("unknown role '{}'", other))),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screens of the application a role can be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Dashboard,
    Categories,
    Varieties,
    SeedInward,
    Lots,
    Orders,
    Deliveries,
    Reports,
    Users,
}

impl Page {
    pub const ALL: [Page; 9] = [
        Page::Dashboard,
        Page::Categories,
        Page::Varieties,
        Page::SeedInward,
        Page::Lots,
        Page::Orders,
        Page::Deliveries,
        Page::Reports,
        Page::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Dashboard => "dashboard",
            Page::Categories => "categories",
            Page::Varieties => "varieties",
            Page::SeedInward => "seed_inward",
            Page::Lots => "lots",
            Page::Orders => "orders",
            Page::Deliveries => "deliveries",
            Page::Reports => "reports",
            Page::Users => "users",
        }
    }
}

impl std::str::FromStr for Page {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Page::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DomainError::invalid("page", format!("unknown page '{}'", s)))
    }
}

/// Pages a role can open. Admins always see everything.
pub fn effective_pages(role: UserRole, granted: &[Page]) -> Vec<Page> {
    match role {
        UserRole::Admin => Page::ALL.to_vec(),
        _ => Page::ALL
            .into_iter()
            .filter(|p| granted.contains(p))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_sees_every_page() {
        assert_eq!(effective_pages(UserRole::Admin, &[]), Page::ALL.to_vec());
    }

    #[test]
    fn test_other_roles_see_granted_pages_in_menu_order() {
        let pages = effective_pages(UserRole::Staff, &[Page::Orders, Page::Dashboard]);
        assert_eq!(pages, vec![Page::Dashboard, Page::Orders]);
    }

    #[test]
    fn test_page_keys_parse() {
        for page in Page::ALL {
            assert_eq!(page.as_str().parse::<Page>(), Ok(page));
        }
        assert!("settings".parse::<Page>().is_err());
    }
}
