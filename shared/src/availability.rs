//! Lot availability aggregation and booking capacity policy
//!
//! `available = seeds_sown - damaged - Σ booked_qty` over the lot's orders
//! that are not cancelled. The figure is recomputed on every read and never
//! stored.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::models::{OrderStatus, SowingLot};

/// The part of an order the aggregator looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotBooking {
    pub lot_id: Option<i32>,
    pub booked_qty: i32,
    pub status: OrderStatus,
}

/// Quantity held against `lot_id` by non-cancelled orders
pub fn booked_quantity(lot_id: i32, bookings: &[LotBooking]) -> i64 {
    bookings
        .iter()
        .filter(|b| b.lot_id == Some(lot_id) && b.status.holds_stock())
        .map(|b| i64::from(b.booked_qty))
        .sum()
}

pub fn available_from_totals(seeds_sown: i32, damaged: i32, booked: i64) -> i64 {
    i64::from(seeds_sown) - i64::from(damaged) - booked
}

/// Not-yet-booked quantity of `lot`; negative when over-booked
pub fn compute_available(lot: &SowingLot, bookings: &[LotBooking]) -> i64 {
    available_from_totals(lot.seeds_sown, lot.damaged, booked_quantity(lot.id, bookings))
}

/// Whether an edit turning `before` into `after` must be checked against the
/// lot's availability again.
///
/// Only stock-holding orders on a lot are checked, and only when the edit can
/// take more stock: a move to another lot, a larger quantity, or an order that
/// held nothing before. The caller measures availability without the order's
/// own booking.
pub fn needs_capacity_check(before: &LotBooking, after: &LotBooking) -> bool {
    if after.lot_id.is_none() || !after.status.holds_stock() {
        return false;
    }
    after.lot_id != before.lot_id
        || after.booked_qty > before.booked_qty
        || !before.status.holds_stock()
}

/// Whether a booking may take a lot below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingPolicy {
    /// Reject bookings that do not fit in the lot's availability
    #[default]
    Guarded,
    /// Accept every booking; availability may go negative
    Permissive,
}

impl BookingPolicy {
    pub fn from_allow_overbooking(allow: bool) -> Self {
        if allow {
            BookingPolicy::Permissive
        } else {
            BookingPolicy::Guarded
        }
    }

    /// Check that `requested` more units can be booked when `available` remain
    pub fn check(&self, available: i64, requested: i32) -> Result<(), DomainError> {
        match self {
            BookingPolicy::Permissive => Ok(()),
            BookingPolicy::Guarded if i64::from(requested) <= available => Ok(()),
            BookingPolicy::Guarded => Err(DomainError::CapacityExceeded {
                requested,
                available,
            }),
        }
    }
}
