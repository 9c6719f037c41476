//! WebAssembly module for the Nursery Management Platform
//!
//! Provides client-side previews for the booking and sowing forms:
//! - Lot availability
//! - Order total, remaining balance and payment status
//! - Damage from a percentage
//! - Phone validation

use rust_decimal::Decimal;
use std::str::FromStr;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(debug_assertions)]
    web_sys::console::log_1(&"nursery wasm module loaded".into());
}

fn parse_amount(field: &str, value: &str) -> Result<Decimal, JsValue> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(value).map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", field, e)))
}

/// Available quantity of a lot from its totals
#[wasm_bindgen]
pub fn calculate_lot_available(seeds_sown: i32, damaged: i32, booked_qty: f64) -> f64 {
    shared::available_from_totals(seeds_sown, damaged, booked_qty as i64) as f64
}

/// Damaged quantity for a percentage typed into the sowing form
#[wasm_bindgen]
pub fn calculate_damage_from_percentage(seeds_sown: i32, percentage: &str) -> Result<i32, JsValue> {
    let pct = parse_amount("percentage", percentage)?;
    damage_from_percentage(seeds_sown, pct).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Order summary as JSON: `{ "total", "remainingBalance", "paymentStatus" }`.
///
/// Money is passed as strings to keep decimal precision across the JS boundary.
#[wasm_bindgen]
pub fn calculate_order_summary(
    booked_qty: i32,
    unit_price: &str,
    discount: &str,
    advance_amount: &str,
) -> Result<String, JsValue> {
    let amounts = OrderAmounts {
        booked_qty,
        unit_price: parse_amount("unit price", unit_price)?,
        discount: parse_amount("discount", discount)?,
        advance_amount: parse_amount("advance", advance_amount)?,
    };

    // Figures are null when the inputs are too large to multiply out
    let total = amounts.checked_total();
    let summary = serde_json::json!({
        "total": total.map(|t| t.to_string()),
        "remainingBalance": total
            .and_then(|t| t.checked_sub(amounts.advance_amount))
            .map(|b| b.to_string()),
        "paymentStatus": total.map(|t| PaymentStatus::derive(amounts.advance_amount, t).to_string()),
        "error": amounts.validate().err().map(|e| e.to_string()),
    });
    Ok(summary.to_string())
}

/// Payment status label for an advance against a total
#[wasm_bindgen]
pub fn derive_payment_status(advance_amount: &str, total_amount: &str) -> Result<String, JsValue> {
    let advance = parse_amount("advance", advance_amount)?;
    let total = parse_amount("total", total_amount)?;
    Ok(PaymentStatus::derive(advance, total).to_string())
}

/// Validate a customer phone number, returning the problem if any
#[wasm_bindgen]
pub fn check_phone(phone: &str) -> Option<String> {
    validate_phone(phone).err().map(str::to_string)
}
