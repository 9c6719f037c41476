//! Domain rule violations raised by the shared ledger logic

use thiserror::Error;

use crate::models::{OrderAction, OrderStatus};

/// A broken domain rule. The backend maps each variant onto an HTTP error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("only {available} available, {requested} requested")]
    CapacityExceeded { requested: i32, available: i64 },

    #[error("cannot {action} an order that is {from}")]
    InvalidTransition { from: OrderStatus, action: OrderAction },

    #[error("insufficient seed stock: {available} available, {requested} requested")]
    InsufficientStock { requested: i32, available: i32 },

    #[error("{resource} is still used by {count} {dependent}")]
    InUse {
        resource: &'static str,
        dependent: &'static str,
        count: i64,
    },
}

impl DomainError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Invalid {
            field,
            message: message.into(),
        }
    }
}
