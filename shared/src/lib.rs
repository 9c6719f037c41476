//! Shared types and domain rules for the Nursery Management Platform
//!
//! This crate contains the entity models and the pure stock/order ledger
//! rules shared between the backend, the browser (via WASM), and tests.

pub mod availability;
pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use availability::*;
pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
