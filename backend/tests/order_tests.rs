//! Order property-based and unit tests
//!
//! Covers:
//! - Payment derivations from the stored money fields
//! - Money bounds on untrusted input
//! - The order status lifecycle
//! - Customer and pagination input rules
//! - Role page grants

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    effective_pages, normalize_phone, validate_phone, DeliveryDetails, DomainError, OrderAction,
    OrderAmounts, OrderStatus, Page, Pagination, PaymentStatus, UserRole, MAX_AMOUNT,
    MAX_PAGE_SIZE,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Money with two decimal places, 0.00 to 500.00
fn money_strategy() -> impl Strategy<Value = Decimal> {
    (0..=50_000i64).prop_map(|paise| Decimal::new(paise, 2))
}

/// Any non-negative decimal, up to `Decimal::MAX`
fn any_decimal_strategy() -> impl Strategy<Value = Decimal> {
    (any::<u32>(), any::<u32>(), any::<u32>(), 0..=28u32)
        .prop_map(|(lo, mid, hi, scale)| Decimal::from_parts(lo, mid, hi, false, scale))
}

fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Booked),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Cancelled),
    ]
}

fn action_strategy() -> impl Strategy<Value = OrderAction> {
    prop_oneof![
        Just(OrderAction::Deliver),
        Just(OrderAction::Cancel),
        Just(OrderAction::UndoDelivery),
    ]
}

/// Order amounts that satisfy every write rule, built from whole paise
fn valid_amounts_strategy() -> impl Strategy<Value = OrderAmounts> {
    (1..=5_000i32, 0..=50_000i64).prop_flat_map(|(booked_qty, price_paise)| {
        let gross = i64::from(booked_qty) * price_paise;
        (0..=gross).prop_flat_map(move |discount| {
            (0..=gross - discount).prop_map(move |advance| OrderAmounts {
                booked_qty,
                unit_price: Decimal::new(price_paise, 2),
                discount: Decimal::new(discount, 2),
                advance_amount: Decimal::new(advance, 2),
            })
        })
    })
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Payment status is a pure function of advance and total
    #[test]
    fn test_payment_status_partition(advance in money_strategy(), total in money_strategy()) {
        let status = PaymentStatus::derive(advance, total);
        let expected = if advance == Decimal::ZERO {
            PaymentStatus::Pending
        } else if advance < total {
            PaymentStatus::PartiallyPaid
        } else {
            PaymentStatus::Paid
        };
        prop_assert_eq!(status, expected);
        prop_assert_eq!(PaymentStatus::derive(advance, total), status);
    }

    /// Valid amounts keep the balance non-negative and consistent
    #[test]
    fn test_valid_amounts_balance(amounts in valid_amounts_strategy()) {
        prop_assert!(amounts.validate().is_ok());
        prop_assert!(amounts.remaining_balance() >= Decimal::ZERO);
        prop_assert_eq!(
            amounts.remaining_balance() + amounts.advance_amount,
            amounts.total()
        );
    }

    /// Any advance above the total is rejected
    #[test]
    fn test_advance_above_total_rejected(
        amounts in valid_amounts_strategy(),
        extra in 1..=10_000i64,
    ) {
        let over = OrderAmounts {
            advance_amount: amounts.total() + Decimal::new(extra, 2),
            ..amounts
        };
        let rejected = matches!(
            over.validate(),
            Err(DomainError::Invalid { field: "advanceAmount", .. })
        );
        prop_assert!(rejected);
    }

    /// Validation never panics on oversized input, and accepted amounts can be
    /// totalled without overflow
    #[test]
    fn test_unbounded_amounts_validate_without_panic(
        booked_qty in 1..=i32::MAX,
        unit_price in any_decimal_strategy(),
        discount in any_decimal_strategy(),
        advance_amount in any_decimal_strategy(),
    ) {
        let amounts = OrderAmounts { booked_qty, unit_price, discount, advance_amount };
        match amounts.validate() {
            Ok(()) => {
                prop_assert!(unit_price <= MAX_AMOUNT);
                prop_assert_eq!(amounts.checked_total(), Some(amounts.total()));
            }
            Err(DomainError::Invalid { field, .. }) => {
                if unit_price > MAX_AMOUNT {
                    prop_assert_eq!(field, "unitPrice");
                }
            }
            Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
        }
    }

    /// Only the three documented transitions exist, and cancelled is terminal
    #[test]
    fn test_transition_table(from in status_strategy(), action in action_strategy()) {
        let result = from.apply(action);
        let expected = match (from, action) {
            (OrderStatus::Booked, OrderAction::Deliver) => Some(OrderStatus::Delivered),
            (OrderStatus::Delivered, OrderAction::Deliver) => Some(OrderStatus::Delivered),
            (OrderStatus::Booked, OrderAction::Cancel) => Some(OrderStatus::Cancelled),
            (OrderStatus::Delivered, OrderAction::UndoDelivery) => Some(OrderStatus::Booked),
            _ => None,
        };
        match expected {
            Some(to) => prop_assert_eq!(result, Ok(to)),
            None => prop_assert_eq!(result, Err(DomainError::InvalidTransition { from, action })),
        }
    }

    /// Pagination always lands inside the served bounds
    #[test]
    fn test_pagination_clamped(page in prop::option::of(0..=1_000u32), limit in prop::option::of(0..=1_000u32)) {
        let p = Pagination::from_query(page, limit);
        prop_assert!(p.page >= 1);
        prop_assert!(p.limit >= 1 && p.limit <= MAX_PAGE_SIZE);
        prop_assert!(p.offset() >= 0);
    }

    /// Formatting is ignored when matching phone numbers
    #[test]
    fn test_phone_normalization(digits in "[6-9][0-9]{9}") {
        let spaced = format!("{} {}", &digits[..5], &digits[5..]);
        let dashed = format!("{}-{}", &digits[..5], &digits[5..]);
        prop_assert!(validate_phone(&spaced).is_ok());
        prop_assert_eq!(normalize_phone(&spaced), digits.clone());
        prop_assert_eq!(normalize_phone(&dashed), digits);
    }
}

// ============================================================================
// Unit Tests: Order Lifecycle
// ============================================================================

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_deliver_then_undo_returns_to_booked() {
        let delivered = OrderStatus::Booked.apply(OrderAction::Deliver).unwrap();
        let undone = delivered.apply(OrderAction::UndoDelivery).unwrap();
        assert_eq!(undone, OrderStatus::Booked);
        assert!(undone.holds_stock());
    }

    #[test]
    fn test_cancelled_cannot_be_delivered() {
        let cancelled = OrderStatus::Booked.apply(OrderAction::Cancel).unwrap();
        assert!(!cancelled.holds_stock());
        assert!(cancelled.apply(OrderAction::Deliver).is_err());
        assert!(cancelled.apply(OrderAction::UndoDelivery).is_err());
        assert!(cancelled.apply(OrderAction::Cancel).is_err());
    }

    #[test]
    fn test_delivered_cannot_be_cancelled() {
        let err = OrderStatus::Delivered
            .apply(OrderAction::Cancel)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot cancel an order that is DELIVERED");
    }

    #[test]
    fn test_delivery_details_from_form() {
        let details: DeliveryDetails = serde_json::from_str(
            r#"{
                "actualDeliveryDate": "2024-07-15",
                "actualDeliveryTime": "09:30",
                "deliveredQty": 200,
                "vehicleNumber": "KA-01-AB-1234",
                "driverName": "Suresh",
                "driverPhone": null
            }"#,
        )
        .unwrap();

        assert_eq!(details.delivered_qty, 200);
        assert_eq!(details.actual_delivery_time.to_string(), "09:30:00");
        assert!(details.validate().is_ok());
    }

    #[test]
    fn test_zero_delivered_qty_rejected() {
        let details: DeliveryDetails = serde_json::from_str(
            r#"{
                "actualDeliveryDate": "2024-07-15",
                "actualDeliveryTime": "09:30:00",
                "deliveredQty": 0,
                "vehicleNumber": null,
                "driverName": null,
                "driverPhone": null
            }"#,
        )
        .unwrap();

        assert!(details.validate().is_err());
    }
}

// ============================================================================
// Unit Tests: Payment Derivations
// ============================================================================

#[cfg(test)]
mod payment_tests {
    use super::*;

    fn amounts(qty: i32, price: &str, discount: &str, advance: &str) -> OrderAmounts {
        OrderAmounts {
            booked_qty: qty,
            unit_price: price.parse().unwrap(),
            discount: discount.parse().unwrap(),
            advance_amount: advance.parse().unwrap(),
        }
    }

    #[test]
    fn test_totals() {
        let a = amounts(200, "2.50", "50", "100");
        assert_eq!(a.total(), Decimal::from(450));
        assert_eq!(a.remaining_balance(), Decimal::from(350));
        assert_eq!(a.payment_status(), PaymentStatus::PartiallyPaid);
    }

    #[test]
    fn test_fully_paid() {
        let a = amounts(100, "3", "0", "300");
        assert_eq!(a.payment_status(), PaymentStatus::Paid);
        assert_eq!(a.remaining_balance(), Decimal::ZERO);
    }

    #[test]
    fn test_quantity_edit_revalidates_advance() {
        // Advance was fine for 100 units, not after dropping to 50
        let before = amounts(100, "3", "0", "200");
        assert!(before.validate().is_ok());

        let after = OrderAmounts {
            booked_qty: 50,
            ..before
        };
        assert!(after.validate().is_err());
    }

    #[test]
    fn test_payment_status_labels() {
        assert_eq!(
            serde_json::to_value(PaymentStatus::PartiallyPaid).unwrap(),
            serde_json::json!("Partially Paid")
        );
        assert_eq!(PaymentStatus::Pending.to_string(), "Pending");
    }
}

// ============================================================================
// Unit Tests: Page Grants
// ============================================================================

#[cfg(test)]
mod page_tests {
    use super::*;

    #[test]
    fn test_admin_sees_every_page() {
        assert_eq!(effective_pages(UserRole::Admin, &[]), Page::ALL.to_vec());
    }

    #[test]
    fn test_staff_sees_only_granted_pages() {
        let pages = effective_pages(UserRole::Staff, &[Page::Orders, Page::Deliveries]);
        assert!(pages.contains(&Page::Orders));
        assert!(pages.contains(&Page::Deliveries));
        assert!(!pages.contains(&Page::Lots));
    }

    #[test]
    fn test_page_keys_round_trip_through_tokens() {
        for page in Page::ALL {
            assert_eq!(page.as_str().parse::<Page>().unwrap(), page);
        }
        assert!("cupping".parse::<Page>().is_err());
    }
}
