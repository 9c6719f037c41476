//! Order models, payment derivations, and the order status lifecycle

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Order status lifecycle
///
/// ```text
/// BOOKED --deliver--> DELIVERED --undo delivery--> BOOKED
/// BOOKED --cancel--> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Booked,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Booked,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Booked => "BOOKED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether the order's booked quantity is held against its lot
    pub fn holds_stock(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled)
    }

    /// Status reached by applying `action`, or why it is not allowed
    pub fn apply(self, action: OrderAction) -> Result<OrderStatus, DomainError> {
        use OrderAction::*;
        use OrderStatus::*;

        match (self, action) {
            // Re-delivering overwrites the delivery details
            (Booked | Delivered, Deliver) => Ok(Delivered),
            (Booked, Cancel) => Ok(Cancelled),
            (Delivered, UndoDelivery) => Ok(Booked),
            (from, action) => Err(DomainError::InvalidTransition { from, action }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKED" => Ok(OrderStatus::Booked),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::invalid(
                "status",
                format!("unknown order status '{}'", other),
            )),
        }
    }
}

/// Transitions an order can go through after booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Deliver,
    Cancel,
    UndoDelivery,
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderAction::Deliver => write!(f, "deliver"),
            OrderAction::Cancel => write!(f, "cancel"),
            OrderAction::UndoDelivery => write!(f, "undo delivery of"),
        }
    }
}

/// How the advance was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR"))]
pub enum PaymentMode {
    Cash,
    PhonePe,
    #[serde(rename = "UPI")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "UPI"))]
    Upi,
    GPay,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::PhonePe => "PhonePe",
            PaymentMode::Upi => "UPI",
            PaymentMode::GPay => "GPay",
        }
    }
}

impl std::str::FromStr for PaymentMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cash" => Ok(PaymentMode::Cash),
            "PhonePe" => Ok(PaymentMode::PhonePe),
            "UPI" => Ok(PaymentMode::Upi),
            "GPay" => Ok(PaymentMode::GPay),
            other => Err(DomainError::invalid(
                "paymentMode",
                format!("unknown payment mode '{}'", other),
            )),
        }
    }
}

/// Payment completeness, derived from advance against total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    #[serde(rename = "Partially Paid")]
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    /// `0 → Pending`, `0 < advance < total → Partially Paid`, `advance ≥ total → Paid`
    pub fn derive(advance: Decimal, total: Decimal) -> Self {
        if advance <= Decimal::ZERO {
            PaymentStatus::Pending
        } else if advance < total {
            PaymentStatus::PartiallyPaid
        } else {
            PaymentStatus::Paid
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::PartiallyPaid => write!(f, "Partially Paid"),
            PaymentStatus::Paid => write!(f, "Paid"),
        }
    }
}

/// Largest value a `NUMERIC(12,2)` money column holds
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// The stored source fields every money figure on an order is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderAmounts {
    pub booked_qty: i32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub advance_amount: Decimal,
}

impl OrderAmounts {
    /// `booked_qty × unit_price − discount`. Call [`OrderAmounts::validate`] first
    /// on untrusted input; amounts beyond [`MAX_AMOUNT`] can overflow.
    pub fn total(&self) -> Decimal {
        Decimal::from(self.booked_qty) * self.unit_price - self.discount
    }

    /// [`OrderAmounts::total`] for unchecked input, `None` on overflow
    pub fn checked_total(&self) -> Option<Decimal> {
        Decimal::from(self.booked_qty)
            .checked_mul(self.unit_price)?
            .checked_sub(self.discount)
    }

    pub fn remaining_balance(&self) -> Decimal {
        self.total() - self.advance_amount
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::derive(self.advance_amount, self.total())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.booked_qty < 1 {
            return Err(DomainError::invalid("bookedQty", "must be at least 1"));
        }
        for (field, value) in [
            ("unitPrice", self.unit_price),
            ("discount", self.discount),
            ("advanceAmount", self.advance_amount),
        ] {
            if value > MAX_AMOUNT {
                return Err(DomainError::invalid(field, "out of range"));
            }
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::invalid("unitPrice", "cannot be negative"));
        }
        if self.discount < Decimal::ZERO {
            return Err(DomainError::invalid("discount", "cannot be negative"));
        }
        if self.discount > Decimal::from(self.booked_qty) * self.unit_price {
            return Err(DomainError::invalid(
                "discount",
                "cannot exceed quantity times unit price",
            ));
        }
        if self.advance_amount < Decimal::ZERO {
            return Err(DomainError::invalid("advanceAmount", "cannot be negative"));
        }
        if self.advance_amount > self.total() {
            return Err(DomainError::invalid(
                "advanceAmount",
                format!(
                    "advance {} cannot exceed total amount {}",
                    self.advance_amount,
                    self.total()
                ),
            ));
        }
        Ok(())
    }
}

/// A customer booking, optionally against a sowing lot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i32,
    /// `None` means the order is waiting for a lot to be assigned
    pub lot_id: Option<i32>,
    pub customer_name: String,
    pub phone: String,
    pub state: String,
    pub district: String,
    pub taluk: String,
    pub village: Option<String>,
    pub booked_qty: i32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub advance_amount: Decimal,
    pub payment_mode: Option<PaymentMode>,
    pub delivery_date: NaiveDate,
    pub actual_delivery_date: Option<NaiveDate>,
    pub actual_delivery_time: Option<NaiveTime>,
    pub delivered_qty: Option<i32>,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub status: OrderStatus,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn amounts(&self) -> OrderAmounts {
        OrderAmounts {
            booked_qty: self.booked_qty,
            unit_price: self.unit_price,
            discount: self.discount,
            advance_amount: self.advance_amount,
        }
    }

    pub fn booking(&self) -> crate::availability::LotBooking {
        crate::availability::LotBooking {
            lot_id: self.lot_id,
            booked_qty: self.booked_qty,
            status: self.status,
        }
    }

    /// Mark the order delivered with `details`. On an order that is already
    /// delivered the previous details are overwritten.
    pub fn record_delivery(&mut self, details: &DeliveryDetails) -> Result<(), DomainError> {
        details.validate()?;
        self.status = self.status.apply(OrderAction::Deliver)?;
        self.actual_delivery_date = Some(details.actual_delivery_date);
        self.actual_delivery_time = Some(details.actual_delivery_time);
        self.delivered_qty = Some(details.delivered_qty);
        self.vehicle_number = details.vehicle_number.clone();
        self.driver_name = details.driver_name.clone();
        self.driver_phone = details.driver_phone.clone();
        Ok(())
    }

    /// Back to BOOKED. The delivery fields stay as a record of the reverted hand-over.
    pub fn undo_delivery(&mut self) -> Result<(), DomainError> {
        self.status = self.status.apply(OrderAction::UndoDelivery)?;
        Ok(())
    }
}

/// An order as served by the API: joined lot names plus derived money fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub lot_number: Option<String>,
    pub category_name: Option<String>,
    pub variety_name: Option<String>,
    pub total_amount: Decimal,
    pub remaining_balance: Decimal,
    pub payment_status: PaymentStatus,
}

impl OrderView {
    pub fn new(
        order: Order,
        lot_number: Option<String>,
        category_name: Option<String>,
        variety_name: Option<String>,
    ) -> Self {
        let amounts = order.amounts();
        Self {
            total_amount: amounts.total(),
            remaining_balance: amounts.remaining_balance(),
            payment_status: amounts.payment_status(),
            order,
            lot_number,
            category_name,
            variety_name,
        }
    }
}

/// Details captured when an order is handed over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetails {
    pub actual_delivery_date: NaiveDate,
    #[serde(deserialize_with = "time_of_day")]
    pub actual_delivery_time: NaiveTime,
    pub delivered_qty: i32,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
}

impl DeliveryDetails {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.delivered_qty < 1 {
            return Err(DomainError::invalid("deliveredQty", "must be at least 1"));
        }
        Ok(())
    }
}

/// Accepts `HH:MM` as sent by time inputs as well as `HH:MM:SS`
fn time_of_day<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
        .map_err(serde::de::Error::custom)
}

/// Customer fields recalled from the most recent order for a phone number
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub customer_name: String,
    pub phone: String,
    pub state: String,
    pub district: String,
    pub taluk: String,
    pub village: Option<String>,
}
