//! Sowing lot models and damage arithmetic

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A batch of seeds sown under a category/variety
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct SowingLot {
    pub id: i32,
    /// Unique across the system; doubles as the seed inward cross-reference
    pub lot_number: String,
    pub category_id: i32,
    pub variety_id: i32,
    pub seed_inward_id: Option<i32>,
    pub sowing_date: NaiveDate,
    pub seeds_sown: i32,
    pub packets_sown: i32,
    pub damaged: i32,
    pub expected_ready_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SowingLot {
    pub fn damage_percentage(&self) -> Decimal {
        damage_percentage(self.seeds_sown, self.damaged)
    }
}

/// A lot joined with its names and the read-time availability figures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotWithAvailability {
    #[serde(flatten)]
    pub lot: SowingLot,
    pub category_name: String,
    pub variety_name: String,
    pub damage_percentage: Decimal,
    /// Sum of non-cancelled booked quantity on this lot
    pub booked_qty: i64,
    /// May be negative when the lot is over-booked
    pub available: i64,
}

impl LotWithAvailability {
    pub fn new(lot: SowingLot, category_name: String, variety_name: String, booked_qty: i64) -> Self {
        let available = crate::availability::available_from_totals(lot.seeds_sown, lot.damaged, booked_qty);
        Self {
            damage_percentage: lot.damage_percentage(),
            lot,
            category_name,
            variety_name,
            booked_qty,
            available,
        }
    }
}

/// Damaged quantity implied by a percentage entered on the sowing form.
///
/// Rounds down: `floor(seeds_sown * pct / 100)`.
pub fn damage_from_percentage(seeds_sown: i32, percentage: Decimal) -> Result<i32, DomainError> {
    if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        return Err(DomainError::invalid(
            "damagePercentage",
            "must be between 0 and 100",
        ));
    }
    let damaged = (Decimal::from(seeds_sown) * percentage / Decimal::ONE_HUNDRED).floor();
    damaged
        .to_i32()
        .ok_or_else(|| DomainError::invalid("damagePercentage", "out of range"))
}

/// Damage as a percentage of seeds sown, rounded to 2 places
pub fn damage_percentage(seeds_sown: i32, damaged: i32) -> Decimal {
    if seeds_sown <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(damaged) * Decimal::ONE_HUNDRED / Decimal::from(seeds_sown)).round_dp(2)
}

/// Damage total after recording `additional` more damaged seeds.
///
/// Additive and monotonic: recording the same delta twice counts it twice.
pub fn apply_additional_damage(
    seeds_sown: i32,
    current_damaged: i32,
    additional: i32,
) -> Result<i32, DomainError> {
    if additional <= 0 {
        return Err(DomainError::invalid("damaged", "additional damage must be at least 1"));
    }
    let total = i64::from(current_damaged) + i64::from(additional);
    if total > i64::from(seeds_sown) {
        return Err(DomainError::invalid(
            "damaged",
            format!(
                "total damage {} would exceed seeds sown {}",
                total, seeds_sown
            ),
        ));
    }
    // Bounded by seeds_sown above
    i32::try_from(total).map_err(|_| DomainError::invalid("damaged", "out of range"))
}

/// Quantity rules every stored lot satisfies
pub fn validate_lot_quantities(
    seeds_sown: i32,
    packets_sown: i32,
    damaged: i32,
) -> Result<(), DomainError> {
    if seeds_sown < 1 {
        return Err(DomainError::invalid("seedsSown", "must be at least 1"));
    }
    if packets_sown < 0 {
        return Err(DomainError::invalid("packetsSown", "cannot be negative"));
    }
    if damaged < 0 {
        return Err(DomainError::invalid("damaged", "cannot be negative"));
    }
    if damaged > seeds_sown {
        return Err(DomainError::invalid("damaged", "cannot exceed seeds sown"));
    }
    Ok(())
}
