//! HTTP request handlers

pub mod audit;
pub mod auth;
pub mod catalog;
pub mod health;
pub mod lot;
pub mod order;
pub mod reporting;
pub mod role;
pub mod seed_inward;
pub mod user;

pub use audit::*;
pub use auth::*;
pub use catalog::*;
pub use health::*;
pub use lot::*;
pub use order::*;
pub use reporting::*;
pub use role::*;
pub use seed_inward::*;
pub use user::*;
