//! Seed inward ledger models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A received shipment of raw seed stock
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct SeedInwardBatch {
    pub id: i32,
    /// Unique within category + variety
    pub lot_number: String,
    pub category_id: i32,
    pub variety_id: i32,
    pub expiry_date: Option<NaiveDate>,
    pub packets: i32,
    pub total_quantity: i32,
    pub available_quantity: i32,
    pub package_type: Option<String>,
    pub supplier_name: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl SeedInwardBatch {
    /// Quantity already drawn into sowing lots
    pub fn consumed(&self) -> i32 {
        self.total_quantity - self.available_quantity
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < today)
    }
}

/// Entry for the lot-number picker on the sowing form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct InwardLotOption {
    pub id: i32,
    pub lot_number: String,
    pub packets: i32,
    pub available_quantity: i32,
    pub expiry_date: Option<NaiveDate>,
}

/// Available quantity after drawing `qty` from a batch
pub fn consume_inward(available: i32, qty: i32) -> Result<i32, DomainError> {
    if qty < 0 {
        return Err(DomainError::invalid("quantity", "cannot consume a negative quantity"));
    }
    if qty > available {
        return Err(DomainError::InsufficientStock {
            requested: qty,
            available,
        });
    }
    Ok(available - qty)
}

/// Available quantity after the batch's total is edited from `old_total` to `new_total`.
///
/// Whatever has already been consumed stays consumed, so the available
/// quantity moves by the same delta as the total.
pub fn rebase_inward_total(
    available: i32,
    old_total: i32,
    new_total: i32,
) -> Result<i32, DomainError> {
    if new_total <= 0 {
        return Err(DomainError::invalid("totalQuantity", "must be greater than zero"));
    }
    let rebased = available + (new_total - old_total);
    if rebased < 0 {
        return Err(DomainError::InsufficientStock {
            requested: old_total - available,
            available: new_total,
        });
    }
    Ok(rebased)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_within_stock() {
        assert_eq!(consume_inward(100, 40), Ok(60));
        assert_eq!(consume_inward(100, 100), Ok(0));
    }

    #[test]
    fn test_consume_beyond_stock_fails() {
        assert_eq!(
            consume_inward(30, 31),
            Err(DomainError::InsufficientStock {
                requested: 31,
                available: 30
            })
        );
    }

    #[test]
    fn test_rebase_total_keeps_consumption() {
        // 100 received, 40 consumed; correcting the receipt to 120 leaves 80
        assert_eq!(rebase_inward_total(60, 100, 120), Ok(80));
        assert_eq!(rebase_inward_total(60, 100, 40), Ok(0));
        assert!(rebase_inward_total(60, 100, 39).is_err());
    }
}
