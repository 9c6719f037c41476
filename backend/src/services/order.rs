//! Order booking and lifecycle service
//!
//! Money fields other than the stored sources (quantity, unit price,
//! discount, advance) are derived on every read through [`OrderView`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use shared::{
    needs_capacity_check, normalize_phone, validate_phone, validate_required, BookingPolicy,
    CustomerInfo, DateRange, DeliveryDetails, LotBooking, Order, OrderAction, OrderAmounts,
    OrderStatus, OrderView, PaginatedResponse, Pagination, PaymentMode, SortOrder,
};
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{AuditAction, AuditService};
use crate::services::lot::LotService;
use crate::services::present;

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
}

/// Input for booking an order
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    /// `None` books without a lot
    pub lot_id: Option<i32>,
    #[validate(length(max = 255, message = "Customer name is too long"))]
    pub customer_name: String,
    pub phone: String,
    #[validate(length(max = 100))]
    pub state: String,
    #[validate(length(max = 100))]
    pub district: String,
    #[validate(length(max = 100))]
    pub taluk: String,
    pub village: Option<String>,
    pub booked_qty: i32,
    /// Falls back to the lot category's price per unit
    pub unit_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub advance_amount: Option<Decimal>,
    pub payment_mode: Option<PaymentMode>,
    pub delivery_date: NaiveDate,
}

/// Partial update. An absent field keeps its value; `null` clears a nullable
/// field, so `lotId: null` unassigns the lot.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderInput {
    #[serde(default, deserialize_with = "present")]
    pub lot_id: Option<Option<i32>>,
    #[validate(length(max = 255, message = "Customer name is too long"))]
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub taluk: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub village: Option<Option<String>>,
    pub booked_qty: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub advance_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "present")]
    pub payment_mode: Option<Option<PaymentMode>>,
    pub delivery_date: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoDeliveryInput {
    pub reason: String,
}

/// Query string for the order list
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_field: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub status: Option<OrderStatus>,
    pub lot_id: Option<i32>,
    /// Only orders waiting for a lot
    pub pending: Option<bool>,
}

/// SQL column for a whitelisted sort field
pub fn sort_column(field: &str) -> Option<&'static str> {
    match field {
        "id" => Some("o.id"),
        "createdAt" => Some("o.created_at"),
        "deliveryDate" => Some("o.delivery_date"),
        "customerName" => Some("o.customer_name"),
        "bookedQty" => Some("o.booked_qty"),
        "status" => Some("o.status"),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    #[sqlx(flatten)]
    order: Order,
    lot_number: Option<String>,
    category_name: Option<String>,
    variety_name: Option<String>,
}

impl From<OrderRow> for OrderView {
    fn from(row: OrderRow) -> Self {
        OrderView::new(row.order, row.lot_number, row.category_name, row.variety_name)
    }
}

const ORDER_COLUMNS: &str = "id, lot_id, customer_name, phone, state, district, taluk, village, \
     booked_qty, unit_price, discount, advance_amount, payment_mode, delivery_date, \
     actual_delivery_date, actual_delivery_time, delivered_qty, vehicle_number, driver_name, \
     driver_phone, status, created_by, created_at, updated_at";

const SELECT_ORDER_VIEW: &str = r#"
    SELECT o.id, o.lot_id, o.customer_name, o.phone, o.state, o.district, o.taluk, o.village,
           o.booked_qty, o.unit_price, o.discount, o.advance_amount, o.payment_mode,
           o.delivery_date, o.actual_delivery_date, o.actual_delivery_time, o.delivered_qty,
           o.vehicle_number, o.driver_name, o.driver_phone, o.status, o.created_by,
           o.created_at, o.updated_at,
           l.lot_number, c.name AS category_name, v.name AS variety_name
    FROM orders o
    LEFT JOIN sowing_lots l ON l.id = o.lot_id
    LEFT JOIN categories c ON c.id = l.category_id
    LEFT JOIN varieties v ON v.id = l.variety_id
"#;

const LIST_FILTER: &str = r#"
    WHERE ($1::TEXT IS NULL OR o.status = $1)
      AND ($2::INT IS NULL OR o.lot_id = $2)
      AND ($3 = FALSE OR o.lot_id IS NULL)
"#;

fn required(field: &'static str, value: &str) -> AppResult<String> {
    let value = value.trim();
    validate_required(value).map_err(|m| AppError::validation(field, m))?;
    Ok(value.to_string())
}

fn checked_phone(field: &'static str, phone: &str) -> AppResult<String> {
    validate_phone(phone).map_err(|m| AppError::validation(field, m))?;
    Ok(normalize_phone(phone))
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Paginated, filtered, sorted order list
    pub async fn list(&self, query: OrderListQuery) -> AppResult<PaginatedResponse<OrderView>> {
        let pagination = Pagination::from_query(query.page, query.limit);
        let sort_field = query.sort_field.as_deref().unwrap_or("createdAt");
        let column = sort_column(sort_field).ok_or_else(|| {
            AppError::validation("sortField", format!("Cannot sort by '{}'", sort_field))
        })?;
        let direction = query.sort_order.unwrap_or_default().as_sql();
        let status = query.status.map(|s| s.as_str());
        let pending = query.pending.unwrap_or(false);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders o {}", LIST_FILTER))
            .bind(status)
            .bind(query.lot_id)
            .bind(pending)
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{} {} ORDER BY {} {}, o.id {} LIMIT $4 OFFSET $5",
            SELECT_ORDER_VIEW, LIST_FILTER, column, direction, direction
        ))
        .bind(status)
        .bind(query.lot_id)
        .bind(pending)
        .bind(i64::from(pagination.limit))
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows.into_iter().map(Into::into).collect();
        Ok(PaginatedResponse::new(data, pagination, total.max(0) as u64))
    }

    pub async fn get(&self, id: i32) -> AppResult<OrderView> {
        sqlx::query_as::<_, OrderRow>(&format!("{} WHERE o.id = $1", SELECT_ORDER_VIEW))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(Into::into)
            .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    /// Book an order. Against a lot, the lot row is locked and the booking
    /// policy decides whether the quantity fits.
    pub async fn create(
        &self,
        user: &AuthUser,
        input: CreateOrderInput,
        policy: BookingPolicy,
    ) -> AppResult<OrderView> {
        input.validate()?;

        let customer_name = required("customerName", &input.customer_name)?;
        let phone = checked_phone("phone", &input.phone)?;
        let state = required("state", &input.state)?;
        let district = required("district", &input.district)?;
        let taluk = required("taluk", &input.taluk)?;

        let mut tx = self.db.begin().await?;

        let unit_price = match (input.unit_price, input.lot_id) {
            (Some(price), _) => price,
            (None, Some(lot_id)) => Self::category_price(&mut tx, lot_id).await?,
            (None, None) => {
                return Err(AppError::validation(
                    "unitPrice",
                    "Unit price is required when booking without a lot",
                ))
            }
        };

        let amounts = OrderAmounts {
            booked_qty: input.booked_qty,
            unit_price,
            discount: input.discount.unwrap_or(Decimal::ZERO),
            advance_amount: input.advance_amount.unwrap_or(Decimal::ZERO),
        };
        amounts.validate()?;

        if let Some(lot_id) = input.lot_id {
            let locked = LotService::lock_capacity(&mut tx, lot_id, None).await?;
            locked.check(policy, amounts.booked_qty)?;
        }

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                lot_id, customer_name, phone, state, district, taluk, village,
                booked_qty, unit_price, discount, advance_amount, payment_mode,
                delivery_date, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'BOOKED', $14)
            RETURNING id
            "#,
        )
        .bind(input.lot_id)
        .bind(&customer_name)
        .bind(&phone)
        .bind(&state)
        .bind(&district)
        .bind(&taluk)
        .bind(&input.village)
        .bind(amounts.booked_qty)
        .bind(amounts.unit_price)
        .bind(amounts.discount)
        .bind(amounts.advance_amount)
        .bind(input.payment_mode)
        .bind(input.delivery_date)
        .bind(user.user_id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Create,
            "order",
            Some(id),
            json!({
                "lotId": input.lot_id,
                "customerName": customer_name,
                "bookedQty": amounts.booked_qty,
                "total": amounts.total(),
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = id,
            lot_id = ?input.lot_id,
            booked_qty = amounts.booked_qty,
            "Order booked"
        );
        self.get(id).await
    }

    /// Partial update. The merged record is re-validated, so a price or
    /// quantity edit can never leave the advance above the total.
    pub async fn update(
        &self,
        user: &AuthUser,
        id: i32,
        input: UpdateOrderInput,
        policy: BookingPolicy,
    ) -> AppResult<OrderView> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let existing = Self::fetch_for_update(&mut tx, id).await?;

        if existing.status == OrderStatus::Cancelled {
            return Err(AppError::InvalidStateTransition(format!(
                "Order {} is cancelled and can no longer be edited",
                id
            )));
        }

        let status = match input.status {
            None => existing.status,
            Some(status) if status == existing.status => existing.status,
            Some(OrderStatus::Cancelled) => existing.status.apply(OrderAction::Cancel)?,
            Some(status) => {
                return Err(AppError::InvalidStateTransition(format!(
                    "Order {} cannot move from {} to {} by editing; use the deliver or undo-delivery action",
                    id, existing.status, status
                )))
            }
        };

        let customer_name = match &input.customer_name {
            Some(name) => required("customerName", name)?,
            None => existing.customer_name.clone(),
        };
        let phone = match &input.phone {
            Some(phone) => checked_phone("phone", phone)?,
            None => existing.phone.clone(),
        };
        let state = match &input.state {
            Some(v) => required("state", v)?,
            None => existing.state.clone(),
        };
        let district = match &input.district {
            Some(v) => required("district", v)?,
            None => existing.district.clone(),
        };
        let taluk = match &input.taluk {
            Some(v) => required("taluk", v)?,
            None => existing.taluk.clone(),
        };

        let amounts = OrderAmounts {
            booked_qty: input.booked_qty.unwrap_or(existing.booked_qty),
            unit_price: input.unit_price.unwrap_or(existing.unit_price),
            discount: input.discount.unwrap_or(existing.discount),
            advance_amount: input.advance_amount.unwrap_or(existing.advance_amount),
        };
        amounts.validate()?;

        let lot_id = input.lot_id.unwrap_or(existing.lot_id);
        let after = LotBooking {
            lot_id,
            booked_qty: amounts.booked_qty,
            status,
        };
        if let Some(lot) = lot_id.filter(|_| needs_capacity_check(&existing.booking(), &after)) {
            let locked = LotService::lock_capacity(&mut tx, lot, Some(id)).await?;
            locked.check(policy, amounts.booked_qty)?;
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET lot_id = $1, customer_name = $2, phone = $3, state = $4, district = $5,
                taluk = $6, village = $7, booked_qty = $8, unit_price = $9, discount = $10,
                advance_amount = $11, payment_mode = $12, delivery_date = $13, status = $14
            WHERE id = $15
            "#,
        )
        .bind(lot_id)
        .bind(&customer_name)
        .bind(&phone)
        .bind(&state)
        .bind(&district)
        .bind(&taluk)
        .bind(input.village.unwrap_or(existing.village))
        .bind(amounts.booked_qty)
        .bind(amounts.unit_price)
        .bind(amounts.discount)
        .bind(amounts.advance_amount)
        .bind(input.payment_mode.unwrap_or(existing.payment_mode))
        .bind(input.delivery_date.unwrap_or(existing.delivery_date))
        .bind(status)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let action = if status != existing.status {
            AuditAction::Cancel
        } else {
            AuditAction::Update
        };
        AuditService::record(
            &mut *tx,
            user,
            action,
            "order",
            Some(id),
            json!({
                "lotId": { "from": existing.lot_id, "to": lot_id },
                "bookedQty": { "from": existing.booked_qty, "to": amounts.booked_qty },
                "status": { "from": existing.status, "to": status },
                "total": amounts.total(),
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(order_id = id, status = %status, "Order updated");
        self.get(id).await
    }

    /// Record the hand-over. Calling it again on a delivered order
    /// overwrites the delivery details.
    pub async fn deliver(
        &self,
        user: &AuthUser,
        id: i32,
        mut details: DeliveryDetails,
    ) -> AppResult<OrderView> {
        details.validate()?;
        details.driver_phone = match details.driver_phone.as_deref().map(str::trim) {
            Some(phone) if !phone.is_empty() => Some(checked_phone("driverPhone", phone)?),
            _ => None,
        };

        let mut tx = self.db.begin().await?;
        let mut order = Self::fetch_for_update(&mut tx, id).await?;
        let from = order.status;
        order.record_delivery(&details)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, actual_delivery_date = $2, actual_delivery_time = $3,
                delivered_qty = $4, vehicle_number = $5, driver_name = $6, driver_phone = $7
            WHERE id = $8
            "#,
        )
        .bind(order.status)
        .bind(order.actual_delivery_date)
        .bind(order.actual_delivery_time)
        .bind(order.delivered_qty)
        .bind(&order.vehicle_number)
        .bind(&order.driver_name)
        .bind(&order.driver_phone)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Deliver,
            "order",
            Some(id),
            json!({
                "from": from,
                "deliveredQty": details.delivered_qty,
                "actualDeliveryDate": details.actual_delivery_date,
            }),
        )
        .await?;

        tx.commit().await?;

        if from == OrderStatus::Delivered {
            tracing::info!(order_id = id, "Delivery details re-applied");
        } else {
            tracing::info!(order_id = id, delivered_qty = details.delivered_qty, "Order delivered");
        }
        self.get(id).await
    }

    /// BOOKED to CANCELLED; the quantity drops out of the lot's bookings
    pub async fn cancel(&self, user: &AuthUser, id: i32) -> AppResult<OrderView> {
        let mut tx = self.db.begin().await?;
        let order = Self::fetch_for_update(&mut tx, id).await?;
        let status = order.status.apply(OrderAction::Cancel)?;

        Self::set_status(&mut tx, id, status).await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Cancel,
            "order",
            Some(id),
            json!({ "lotId": order.lot_id, "bookedQty": order.booked_qty }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(order_id = id, lot_id = ?order.lot_id, "Order cancelled");
        self.get(id).await
    }

    /// DELIVERED back to BOOKED. Needs a reason; delivery fields are kept.
    pub async fn undo_delivery(&self, user: &AuthUser, id: i32, reason: &str) -> AppResult<OrderView> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::validation("reason", "A reason is required to undo a delivery"));
        }

        let mut tx = self.db.begin().await?;
        let mut order = Self::fetch_for_update(&mut tx, id).await?;
        order.undo_delivery()?;

        Self::set_status(&mut tx, id, order.status).await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::UndoDelivery,
            "order",
            Some(id),
            json!({
                "reason": reason,
                "actualDeliveryDate": order.actual_delivery_date,
                "deliveredQty": order.delivered_qty,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::warn!(order_id = id, user = %user.username, reason, "Delivery undone");
        self.get(id).await
    }

    /// Delete in any state
    pub async fn delete(&self, user: &AuthUser, id: i32) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let order = Self::fetch_for_update(&mut tx, id).await?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Delete,
            "order",
            Some(id),
            json!({
                "customerName": order.customer_name,
                "lotId": order.lot_id,
                "bookedQty": order.booked_qty,
                "status": order.status,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(order_id = id, "Order deleted");
        Ok(())
    }

    /// BOOKED orders whose requested delivery date falls in `range`, earliest first
    pub async fn due_for_delivery(&self, range: &DateRange) -> AppResult<Vec<OrderView>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"{}
            WHERE o.status = 'BOOKED' AND o.delivery_date BETWEEN $1 AND $2
            ORDER BY o.delivery_date, o.id
            "#,
            SELECT_ORDER_VIEW
        ))
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Customer fields from the most recent order placed with this phone
    pub async fn lookup_customer(&self, phone: &str) -> AppResult<CustomerInfo> {
        let phone = checked_phone("phone", phone)?;

        sqlx::query_as::<_, CustomerInfo>(
            r#"
            SELECT customer_name, phone, state, district, taluk, village
            FROM orders
            WHERE phone = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&phone)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer".to_string()))
    }

    async fn fetch_for_update(conn: &mut PgConnection, id: i32) -> AppResult<Order> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    async fn set_status(conn: &mut PgConnection, id: i32, status: OrderStatus) -> AppResult<()> {
        sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn category_price(conn: &mut PgConnection, lot_id: i32) -> AppResult<Decimal> {
        sqlx::query_scalar(
            r#"
            SELECT c.price_per_unit
            FROM sowing_lots l
            JOIN categories c ON c.id = l.category_id
            WHERE l.id = $1
            "#,
        )
        .bind(lot_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Lot".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_whitelist() {
        assert_eq!(sort_column("createdAt"), Some("o.created_at"));
        assert_eq!(sort_column("deliveryDate"), Some("o.delivery_date"));
        assert_eq!(sort_column("customerName"), Some("o.customer_name"));
        assert_eq!(sort_column("created_at; DROP TABLE orders"), None);
        assert_eq!(sort_column("unitPrice"), None);
    }

    #[test]
    fn test_update_distinguishes_null_lot_from_missing() {
        let unassign: UpdateOrderInput = serde_json::from_str(r#"{"lotId": null}"#).unwrap();
        assert_eq!(unassign.lot_id, Some(None));

        let untouched: UpdateOrderInput = serde_json::from_str(r#"{"bookedQty": 10}"#).unwrap();
        assert_eq!(untouched.lot_id, None);
        assert_eq!(untouched.booked_qty, Some(10));

        let moved: UpdateOrderInput = serde_json::from_str(r#"{"lotId": 4}"#).unwrap();
        assert_eq!(moved.lot_id, Some(Some(4)));
    }

    #[test]
    fn test_update_can_clear_village_and_payment_mode() {
        let cleared: UpdateOrderInput =
            serde_json::from_str(r#"{"village": null, "paymentMode": null}"#).unwrap();
        assert_eq!(cleared.village, Some(None));
        assert_eq!(cleared.payment_mode, Some(None));

        let set: UpdateOrderInput =
            serde_json::from_str(r#"{"village": "Koppa", "paymentMode": "Cash"}"#).unwrap();
        assert_eq!(set.village, Some(Some("Koppa".to_string())));
        assert_eq!(set.payment_mode, Some(Some(PaymentMode::Cash)));

        let untouched: UpdateOrderInput = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.village, None);
        assert_eq!(untouched.payment_mode, None);
        assert_eq!(
            untouched.village.unwrap_or(Some("Koppa".to_string())),
            Some("Koppa".to_string())
        );
    }

    #[test]
    fn test_cancel_through_status_field_parses() {
        let input: UpdateOrderInput = serde_json::from_str(r#"{"status": "CANCELLED"}"#).unwrap();
        assert_eq!(input.status, Some(OrderStatus::Cancelled));
    }

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required("state", "  Karnataka ").unwrap(), "Karnataka");
        assert!(matches!(
            required("state", "   "),
            Err(AppError::Validation { ref field, .. }) if field == "state"
        ));
    }
}
