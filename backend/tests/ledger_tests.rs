//! Stock ledger property-based and scenario tests
//!
//! Covers:
//! - Lot availability aggregation
//! - Booking capacity under the guarded and permissive policies
//! - When an order edit re-checks lot capacity
//! - Damage recording bounds
//! - Delete guards on referenced records
//! - Seed inward consumption and total edits

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    apply_additional_damage, booked_quantity, compute_available, consume_inward,
    ensure_unreferenced, needs_capacity_check, rebase_inward_total, BookingPolicy, DomainError,
    LotBooking, LotWithAvailability, OrderAction, OrderStatus, SowingLot,
};

fn lot(id: i32, seeds_sown: i32, damaged: i32) -> SowingLot {
    let now = Utc::now();
    SowingLot {
        id,
        lot_number: format!("L-{:03}", id),
        category_id: 1,
        variety_id: 1,
        seed_inward_id: None,
        sowing_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        seeds_sown,
        packets_sown: 0,
        damaged,
        expected_ready_date: None,
        remarks: None,
        created_at: now,
        updated_at: now,
    }
}

fn booked(lot_id: i32, qty: i32) -> LotBooking {
    LotBooking {
        lot_id: Some(lot_id),
        booked_qty: qty,
        status: OrderStatus::Booked,
    }
}

/// Books `qty` against the lot when the policy allows it
fn book(
    policy: BookingPolicy,
    lot: &SowingLot,
    bookings: &mut Vec<LotBooking>,
    qty: i32,
) -> Result<usize, DomainError> {
    policy.check(compute_available(lot, bookings), qty)?;
    bookings.push(booked(lot.id, qty));
    Ok(bookings.len() - 1)
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Booked),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Cancelled),
    ]
}

/// Orders spread over lots 1..=3 plus some waiting for a lot
fn bookings_strategy() -> impl Strategy<Value = Vec<LotBooking>> {
    prop::collection::vec(
        (prop::option::weighted(0.8, 1..=3i32), 1..=500i32, status_strategy()),
        0..40,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(lot_id, booked_qty, status)| LotBooking {
                lot_id,
                booked_qty,
                status,
            })
            .collect()
    })
}

/// One order, possibly without a lot
fn single_booking_strategy() -> impl Strategy<Value = LotBooking> {
    (prop::option::weighted(0.8, 1..=3i32), 1..=500i32, status_strategy()).prop_map(
        |(lot_id, booked_qty, status)| LotBooking {
            lot_id,
            booked_qty,
            status,
        },
    )
}

const DEPENDENT_LABELS: [&str; 3] = ["varieties", "sowing lots", "orders"];

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Availability does not depend on the order rows are read in
    #[test]
    fn test_availability_ignores_row_order(
        bookings in bookings_strategy(),
        seeds_sown in 1..=20_000i32,
        damage_pct in 0..=100i32,
    ) {
        let damaged = seeds_sown * damage_pct / 100;
        let lot = lot(1, seeds_sown, damaged);

        let forward = compute_available(&lot, &bookings);
        let mut reversed = bookings.clone();
        reversed.reverse();
        let mut sorted = bookings.clone();
        sorted.sort_by_key(|b| (b.booked_qty, b.lot_id));

        prop_assert_eq!(forward, compute_available(&lot, &reversed));
        prop_assert_eq!(forward, compute_available(&lot, &sorted));
    }

    /// available = seeds_sown - damaged - non-cancelled bookings on this lot
    #[test]
    fn test_availability_formula(
        bookings in bookings_strategy(),
        seeds_sown in 1..=20_000i32,
    ) {
        let lot = lot(2, seeds_sown, 0);
        let held: i64 = bookings
            .iter()
            .filter(|b| b.lot_id == Some(2) && b.status != OrderStatus::Cancelled)
            .map(|b| i64::from(b.booked_qty))
            .sum();

        prop_assert_eq!(compute_available(&lot, &bookings), i64::from(seeds_sown) - held);
    }

    /// Cancelling a booked order frees exactly its quantity
    #[test]
    fn test_cancel_frees_quantity(
        mut bookings in bookings_strategy(),
        qty in 1..=500i32,
    ) {
        let lot = lot(1, 10_000, 0);
        bookings.push(booked(1, qty));
        let before = compute_available(&lot, &bookings);

        let last = bookings.len() - 1;
        bookings[last].status = bookings[last].status.apply(OrderAction::Cancel).unwrap();

        prop_assert_eq!(compute_available(&lot, &bookings), before + i64::from(qty));
    }

    /// The guarded policy never lets availability drop below zero
    #[test]
    fn test_guarded_never_oversells(
        seeds_sown in 1..=2_000i32,
        requests in prop::collection::vec(1..=400i32, 1..30),
    ) {
        let lot = lot(1, seeds_sown, 0);
        let mut bookings = Vec::new();
        for qty in requests {
            let _ = book(BookingPolicy::Guarded, &lot, &mut bookings, qty);
            prop_assert!(compute_available(&lot, &bookings) >= 0);
        }
    }

    /// The permissive policy accepts every request
    #[test]
    fn test_permissive_accepts_all(
        seeds_sown in 1..=2_000i32,
        requests in prop::collection::vec(1..=400i32, 1..30),
    ) {
        let lot = lot(1, seeds_sown, 0);
        let mut bookings = Vec::new();
        for qty in &requests {
            prop_assert!(book(BookingPolicy::Permissive, &lot, &mut bookings, *qty).is_ok());
        }
        let total: i64 = requests.iter().map(|q| i64::from(*q)).sum();
        prop_assert_eq!(booked_quantity(1, &bookings), total);
    }

    /// Damage is additive and never exceeds seeds sown
    #[test]
    fn test_damage_bounds(
        seeds_sown in 1..=10_000i32,
        deltas in prop::collection::vec(1..=3_000i32, 1..10),
    ) {
        let mut damaged = 0;
        for delta in deltas {
            match apply_additional_damage(seeds_sown, damaged, delta) {
                Ok(total) => {
                    prop_assert_eq!(total, damaged + delta);
                    damaged = total;
                }
                Err(_) => prop_assert!(damaged + delta > seeds_sown),
            }
            prop_assert!(damaged <= seeds_sown);
        }
    }

    /// An order edit is re-checked exactly when it takes more stock from some lot
    #[test]
    fn test_recheck_iff_edit_takes_more_stock(
        before in single_booking_strategy(),
        after in single_booking_strategy(),
    ) {
        let takes_more = (1..=3).any(|lot_id| {
            booked_quantity(lot_id, &[after]) > booked_quantity(lot_id, &[before])
        });
        prop_assert_eq!(needs_capacity_check(&before, &after), takes_more);
    }

    /// Skipping the re-check never drives a guarded lot below zero when the
    /// order's own booking is measured out of the lot
    #[test]
    fn test_unchecked_edit_keeps_guarded_lot_non_negative(
        seeds_sown in 1..=2_000i32,
        others in prop::collection::vec(1..=300i32, 0..8),
        before in single_booking_strategy(),
        after in single_booking_strategy(),
    ) {
        let lot = lot(1, seeds_sown, 0);
        let mut bookings = Vec::new();
        for qty in others {
            let _ = book(BookingPolicy::Guarded, &lot, &mut bookings, qty);
        }
        let mut before_rows = bookings.clone();
        before_rows.push(before);
        prop_assume!(compute_available(&lot, &before_rows) >= 0);

        let mut after_rows = bookings.clone();
        after_rows.push(after);
        if needs_capacity_check(&before, &after) {
            if after.lot_id == Some(lot.id) {
                let excluding_self = compute_available(&lot, &bookings);
                let allowed = BookingPolicy::Guarded.check(excluding_self, after.booked_qty).is_ok();
                prop_assert_eq!(allowed, compute_available(&lot, &after_rows) >= 0);
            }
        } else {
            prop_assert!(compute_available(&lot, &after_rows) >= 0);
        }
    }

    /// A delete goes through only when nothing references the record, and the
    /// refusal names the first dependent with rows
    #[test]
    fn test_delete_blocked_exactly_when_dependents_exist(
        counts in prop::collection::vec(0..=3i64, 0..=3),
    ) {
        let dependents: Vec<(&'static str, i64)> =
            DEPENDENT_LABELS.iter().copied().zip(counts.iter().copied()).collect();

        match ensure_unreferenced("category", &dependents) {
            Ok(()) => prop_assert!(dependents.iter().all(|(_, count)| *count == 0)),
            Err(DomainError::InUse { resource, dependent, count }) => {
                let first = dependents.iter().find(|(_, c)| *c > 0).copied();
                prop_assert_eq!(resource, "category");
                prop_assert_eq!(Some((dependent, count)), first);
            }
            Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
        }
    }

    /// Editing a batch total keeps the consumed amount fixed
    #[test]
    fn test_rebase_keeps_consumed(
        old_total in 1..=5_000i32,
        consumed_pct in 0..=100i32,
        new_total in 1..=5_000i32,
    ) {
        let consumed = old_total * consumed_pct / 100;
        let available = old_total - consumed;

        match rebase_inward_total(available, old_total, new_total) {
            Ok(rebased) => prop_assert_eq!(new_total - rebased, consumed),
            Err(_) => prop_assert!(new_total < consumed),
        }
    }

    #[test]
    fn test_consume_never_negative(available in 0..=5_000i32, qty in 0..=6_000i32) {
        match consume_inward(available, qty) {
            Ok(left) => prop_assert!(left >= 0 && left == available - qty),
            Err(_) => prop_assert!(qty > available),
        }
    }
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[cfg(test)]
mod booking_scenarios {
    use super::*;

    #[test]
    fn test_two_bookings_then_third_permissive() {
        let lot = lot(1, 500, 0);
        let mut bookings = Vec::new();
        let policy = BookingPolicy::Permissive;

        book(policy, &lot, &mut bookings, 200).unwrap();
        assert_eq!(compute_available(&lot, &bookings), 300);

        book(policy, &lot, &mut bookings, 250).unwrap();
        assert_eq!(compute_available(&lot, &bookings), 50);

        // Oversold, and the figure shows it
        book(policy, &lot, &mut bookings, 100).unwrap();
        assert_eq!(compute_available(&lot, &bookings), -50);
    }

    #[test]
    fn test_two_bookings_then_third_guarded() {
        let lot = lot(1, 500, 0);
        let mut bookings = Vec::new();
        let policy = BookingPolicy::Guarded;

        book(policy, &lot, &mut bookings, 200).unwrap();
        book(policy, &lot, &mut bookings, 250).unwrap();
        assert_eq!(compute_available(&lot, &bookings), 50);

        assert_eq!(
            book(policy, &lot, &mut bookings, 100),
            Err(DomainError::CapacityExceeded {
                requested: 100,
                available: 50,
            })
        );
        assert_eq!(bookings.len(), 2);
        assert_eq!(compute_available(&lot, &bookings), 50);

        // Exactly the remainder still fits
        book(policy, &lot, &mut bookings, 50).unwrap();
        assert_eq!(compute_available(&lot, &bookings), 0);
    }

    #[test]
    fn test_cancel_first_booking_restores_stock() {
        let lot = lot(1, 500, 0);
        let mut bookings = Vec::new();
        let order_a = book(BookingPolicy::Guarded, &lot, &mut bookings, 200).unwrap();
        book(BookingPolicy::Guarded, &lot, &mut bookings, 250).unwrap();

        bookings[order_a].status = bookings[order_a]
            .status
            .apply(OrderAction::Cancel)
            .unwrap();

        assert_eq!(bookings[order_a].status, OrderStatus::Cancelled);
        assert_eq!(compute_available(&lot, &bookings), 250);
    }

    #[test]
    fn test_delivered_orders_still_hold_stock() {
        let lot = lot(1, 500, 0);
        let mut bookings = vec![booked(1, 120)];
        bookings[0].status = bookings[0].status.apply(OrderAction::Deliver).unwrap();

        assert_eq!(compute_available(&lot, &bookings), 380);
    }

    #[test]
    fn test_orders_without_lot_do_not_count() {
        let lot = lot(1, 500, 0);
        let bookings = vec![
            booked(1, 100),
            LotBooking {
                lot_id: None,
                booked_qty: 300,
                status: OrderStatus::Booked,
            },
        ];

        assert_eq!(compute_available(&lot, &bookings), 400);
    }
}

#[cfg(test)]
mod damage_scenarios {
    use super::*;

    #[test]
    fn test_record_damage_then_overflow() {
        let damaged = apply_additional_damage(500, 0, 50).unwrap();
        assert_eq!(damaged, 50);

        assert!(matches!(
            apply_additional_damage(500, damaged, 500),
            Err(DomainError::Invalid { field: "damaged", .. })
        ));
    }

    #[test]
    fn test_same_delta_twice_counts_twice() {
        let once = apply_additional_damage(500, 0, 40).unwrap();
        let twice = apply_additional_damage(500, once, 40).unwrap();
        assert_eq!(twice, 80);
    }

    #[test]
    fn test_damage_reduces_availability() {
        let damaged = apply_additional_damage(500, 0, 50).unwrap();
        let lot = lot(1, 500, damaged);
        let view = LotWithAvailability::new(
            lot.clone(),
            "Tomato".to_string(),
            "Arka Rakshak".to_string(),
            booked_quantity(1, &[booked(1, 200)]),
        );

        assert_eq!(view.available, 250);
        assert_eq!(view.booked_qty, 200);
        assert_eq!(view.damage_percentage, Decimal::from(10));
    }
}
