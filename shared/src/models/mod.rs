//! Domain models for the Nursery Management Platform

mod catalog;
mod lot;
mod order;
mod seed_inward;
mod user;

pub use catalog::*;
pub use lot::*;
pub use order::*;
pub use seed_inward::*;
pub use user::*;
