//! Business logic services for the Nursery Management Platform

pub mod audit;
pub mod auth;
pub mod category;
pub mod lot;
pub mod order;
pub mod reporting;
pub mod role;
pub mod seed_inward;
pub mod user;
pub mod variety;

pub use audit::AuditService;
pub use auth::AuthService;
pub use category::CategoryService;
pub use lot::LotService;
pub use order::OrderService;
pub use reporting::ReportingService;
pub use role::RoleService;
pub use seed_inward::SeedInwardService;
pub use user::UserService;
pub use variety::VarietyService;

use serde::{Deserialize, Deserializer};

/// Tells an explicit `null` (`Some(None)`) from a missing field (`None`) in
/// update payloads. Pair with `#[serde(default)]`.
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
