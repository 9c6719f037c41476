//! Sowing lot service
//!
//! Availability is never stored. Every read sums the non-cancelled bookings
//! against the lot; every write that adds bookings locks the lot row first.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use shared::{
    apply_additional_damage, available_from_totals, damage_from_percentage, ensure_unreferenced,
    validate_lot_quantities, BookingPolicy, DomainError, LotWithAvailability, OrderStatus,
    SowingLot,
};
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{AuditAction, AuditService};
use crate::services::present;
use crate::services::seed_inward::SeedInwardService;

/// Sowing lot service
#[derive(Clone)]
pub struct LotService {
    db: PgPool,
}

/// Input for a new sowing entry
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLotInput {
    #[validate(length(min = 1, max = 64, message = "Lot number is required"))]
    pub lot_number: String,
    pub category_id: i32,
    pub variety_id: i32,
    pub seed_inward_id: Option<i32>,
    pub sowing_date: NaiveDate,
    #[validate(range(min = 1, message = "Seeds sown must be at least 1"))]
    pub seeds_sown: i32,
    pub packets_sown: Option<i32>,
    /// Takes precedence over `damage_percentage`
    pub damaged: Option<i32>,
    pub damage_percentage: Option<Decimal>,
    pub expected_ready_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

/// Field patch for a lot. `null` clears the expected ready date or remarks.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLotInput {
    #[validate(length(min = 1, max = 64, message = "Lot number is required"))]
    pub lot_number: Option<String>,
    pub sowing_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Seeds sown must be at least 1"))]
    pub seeds_sown: Option<i32>,
    pub packets_sown: Option<i32>,
    pub damaged: Option<i32>,
    #[serde(default, deserialize_with = "present")]
    pub expected_ready_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "present")]
    pub remarks: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDamageInput {
    pub additional_damaged: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignOrdersInput {
    pub order_ids: Vec<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotFilter {
    pub category_id: Option<i32>,
    pub variety_id: Option<i32>,
}

/// A lot row locked for the rest of a transaction, with its current availability
#[derive(Debug, Clone)]
pub struct LockedLot {
    pub id: i32,
    pub lot_number: String,
    pub available: i64,
}

impl LockedLot {
    /// Apply the booking policy, naming the lot in the error
    pub fn check(&self, policy: BookingPolicy, requested: i32) -> AppResult<()> {
        policy.check(self.available, requested).map_err(|err| match err {
            DomainError::CapacityExceeded {
                requested,
                available,
            } => {
                tracing::warn!(
                    lot_id = self.id,
                    requested,
                    available,
                    "Booking rejected: lot capacity exceeded"
                );
                AppError::CapacityExceeded {
                    lot: self.lot_number.clone(),
                    requested,
                    available,
                }
            }
            other => other.into(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct LotRow {
    #[sqlx(flatten)]
    lot: SowingLot,
    category_name: String,
    variety_name: String,
    booked_qty: i64,
}

impl From<LotRow> for LotWithAvailability {
    fn from(row: LotRow) -> Self {
        LotWithAvailability::new(row.lot, row.category_name, row.variety_name, row.booked_qty)
    }
}

const LOT_COLUMNS: &str = "id, lot_number, category_id, variety_id, seed_inward_id, sowing_date, \
     seeds_sown, packets_sown, damaged, expected_ready_date, remarks, created_at, updated_at";

const SELECT_LOT_WITH_AVAILABILITY: &str = r#"
    SELECT l.id, l.lot_number, l.category_id, l.variety_id, l.seed_inward_id, l.sowing_date,
           l.seeds_sown, l.packets_sown, l.damaged, l.expected_ready_date, l.remarks,
           l.created_at, l.updated_at,
           c.name AS category_name,
           v.name AS variety_name,
           COALESCE((
               SELECT SUM(o.booked_qty) FROM orders o
               WHERE o.lot_id = l.id AND o.status <> 'CANCELLED'
           ), 0)::BIGINT AS booked_qty
    FROM sowing_lots l
    JOIN categories c ON c.id = l.category_id
    JOIN varieties v ON v.id = l.variety_id
"#;

impl LotService {
    /// Create a new LotService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All lots with names and computed availability
    pub async fn list_with_availability(&self, filter: LotFilter) -> AppResult<Vec<LotWithAvailability>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            r#"{}
            WHERE ($1::INT IS NULL OR l.category_id = $1)
              AND ($2::INT IS NULL OR l.variety_id = $2)
            ORDER BY l.sowing_date DESC, l.id DESC
            "#,
            SELECT_LOT_WITH_AVAILABILITY
        ))
        .bind(filter.category_id)
        .bind(filter.variety_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get(&self, id: i32) -> AppResult<LotWithAvailability> {
        sqlx::query_as::<_, LotRow>(&format!("{} WHERE l.id = $1", SELECT_LOT_WITH_AVAILABILITY))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(Into::into)
            .ok_or_else(|| AppError::NotFound("Lot".to_string()))
    }

    /// New sowing entry. Draws `seeds_sown` from the matching seed inward
    /// batch in the same transaction.
    pub async fn create(&self, user: &AuthUser, input: CreateLotInput) -> AppResult<LotWithAvailability> {
        input.validate()?;

        let lot_number = input.lot_number.trim().to_string();
        let packets_sown = input.packets_sown.unwrap_or(0);
        let damaged = match (input.damaged, input.damage_percentage) {
            (Some(damaged), _) => damaged,
            (None, Some(pct)) => damage_from_percentage(input.seeds_sown, pct)?,
            (None, None) => 0,
        };
        validate_lot_quantities(input.seeds_sown, packets_sown, damaged)?;

        let mut tx = self.db.begin().await?;

        Self::ensure_variety_in_category(&mut tx, input.category_id, input.variety_id).await?;
        Self::ensure_lot_number_free(&mut tx, &lot_number, None).await?;

        let seed_inward_id = SeedInwardService::resolve_for_lot(
            &mut tx,
            input.seed_inward_id,
            &lot_number,
            input.category_id,
            input.variety_id,
        )
        .await?;

        if let Some(batch_id) = seed_inward_id {
            SeedInwardService::consume(&mut tx, batch_id, input.seeds_sown).await?;
        }

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO sowing_lots (
                lot_number, category_id, variety_id, seed_inward_id, sowing_date,
                seeds_sown, packets_sown, damaged, expected_ready_date, remarks, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&lot_number)
        .bind(input.category_id)
        .bind(input.variety_id)
        .bind(seed_inward_id)
        .bind(input.sowing_date)
        .bind(input.seeds_sown)
        .bind(packets_sown)
        .bind(damaged)
        .bind(input.expected_ready_date)
        .bind(&input.remarks)
        .bind(user.user_id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Create,
            "lot",
            Some(id),
            json!({
                "lotNumber": lot_number,
                "seedsSown": input.seeds_sown,
                "damaged": damaged,
                "seedInwardId": seed_inward_id,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            lot_id = id,
            lot_number = %lot_number,
            seeds_sown = input.seeds_sown,
            seed_inward_id = ?seed_inward_id,
            "Sowing lot created"
        );
        self.get(id).await
    }

    /// Field patch. A change to `seeds_sown` on a lot linked to a seed
    /// inward batch draws or returns the difference.
    pub async fn update(
        &self,
        user: &AuthUser,
        id: i32,
        input: UpdateLotInput,
    ) -> AppResult<LotWithAvailability> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let existing = Self::fetch_for_update(&mut tx, id).await?;

        let lot_number = match input.lot_number {
            Some(n) => n.trim().to_string(),
            None => existing.lot_number.clone(),
        };
        if lot_number != existing.lot_number {
            Self::ensure_lot_number_free(&mut tx, &lot_number, Some(id)).await?;
        }

        let seeds_sown = input.seeds_sown.unwrap_or(existing.seeds_sown);
        let packets_sown = input.packets_sown.unwrap_or(existing.packets_sown);
        let damaged = input.damaged.unwrap_or(existing.damaged);
        validate_lot_quantities(seeds_sown, packets_sown, damaged)?;

        if let Some(batch_id) = existing.seed_inward_id {
            let delta = seeds_sown - existing.seeds_sown;
            if delta > 0 {
                SeedInwardService::consume(&mut tx, batch_id, delta).await?;
            } else if delta < 0 {
                SeedInwardService::release(&mut tx, batch_id, -delta).await?;
            }
        }

        sqlx::query(
            r#"
            UPDATE sowing_lots
            SET lot_number = $1, sowing_date = $2, seeds_sown = $3, packets_sown = $4,
                damaged = $5, expected_ready_date = $6, remarks = $7
            WHERE id = $8
            "#,
        )
        .bind(&lot_number)
        .bind(input.sowing_date.unwrap_or(existing.sowing_date))
        .bind(seeds_sown)
        .bind(packets_sown)
        .bind(damaged)
        .bind(input.expected_ready_date.unwrap_or(existing.expected_ready_date))
        .bind(input.remarks.unwrap_or(existing.remarks))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Update,
            "lot",
            Some(id),
            json!({
                "lotNumber": lot_number,
                "seedsSown": { "from": existing.seeds_sown, "to": seeds_sown },
                "damaged": { "from": existing.damaged, "to": damaged },
            }),
        )
        .await?;

        tx.commit().await?;
        self.get(id).await
    }

    /// Add `additional` damaged seeds. Additive, so repeating a call counts twice.
    pub async fn record_damage(
        &self,
        user: &AuthUser,
        id: i32,
        additional: i32,
    ) -> AppResult<LotWithAvailability> {
        let mut tx = self.db.begin().await?;
        let lot = Self::fetch_for_update(&mut tx, id).await?;

        let damaged = apply_additional_damage(lot.seeds_sown, lot.damaged, additional)?;

        sqlx::query("UPDATE sowing_lots SET damaged = $1 WHERE id = $2")
            .bind(damaged)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::RecordDamage,
            "lot",
            Some(id),
            json!({ "additional": additional, "damaged": damaged }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(lot_id = id, additional, damaged, "Lot damage recorded");
        self.get(id).await
    }

    /// Delete a lot; blocked while any order references it. Seeds go back
    /// to the linked seed inward batch.
    pub async fn delete(&self, user: &AuthUser, id: i32) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let lot = Self::fetch_for_update(&mut tx, id).await?;

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE lot_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        if let Err(err) = ensure_unreferenced("lot", &[("orders", orders)]) {
            tracing::warn!(lot_id = id, lot_number = %lot.lot_number, orders, "Lot delete blocked");
            return Err(err.into());
        }

        if let Some(batch_id) = lot.seed_inward_id {
            SeedInwardService::release(&mut tx, batch_id, lot.seeds_sown).await?;
        }

        sqlx::query("DELETE FROM sowing_lots WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Delete,
            "lot",
            Some(id),
            json!({ "lotNumber": lot.lot_number, "releasedToInward": lot.seed_inward_id.map(|_| lot.seeds_sown) }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(lot_id = id, "Sowing lot deleted");
        Ok(())
    }

    /// Link orders that were booked without a lot. Only BOOKED orders with no
    /// lot qualify, and their combined quantity goes through the booking policy.
    pub async fn assign_pending_orders(
        &self,
        user: &AuthUser,
        lot_id: i32,
        order_ids: Vec<i32>,
        policy: BookingPolicy,
    ) -> AppResult<LotWithAvailability> {
        if order_ids.is_empty() {
            return Err(AppError::validation("orderIds", "Select at least one order"));
        }

        let mut tx = self.db.begin().await?;
        let locked = Self::lock_capacity(&mut tx, lot_id, None).await?;

        let orders: Vec<(i32, Option<i32>, OrderStatus, i32)> = sqlx::query_as(
            "SELECT id, lot_id, status, booked_qty FROM orders WHERE id = ANY($1) FOR UPDATE",
        )
        .bind(&order_ids)
        .fetch_all(&mut *tx)
        .await?;

        if let Some(missing) = order_ids
            .iter()
            .find(|id| !orders.iter().any(|(found, ..)| found == *id))
        {
            return Err(AppError::NotFound(format!("Order {}", missing)));
        }

        for (order_id, current_lot, status, _) in &orders {
            if *status != OrderStatus::Booked {
                return Err(AppError::validation(
                    "orderIds",
                    format!("Order {} is {} and cannot be assigned", order_id, status),
                ));
            }
            if current_lot.is_some() {
                return Err(AppError::validation(
                    "orderIds",
                    format!("Order {} is already assigned to a lot", order_id),
                ));
            }
        }

        let requested: i64 = orders.iter().map(|(.., qty)| i64::from(*qty)).sum();
        let requested = i32::try_from(requested)
            .map_err(|_| AppError::validation("orderIds", "Combined quantity is too large"))?;
        locked.check(policy, requested)?;

        sqlx::query("UPDATE orders SET lot_id = $1 WHERE id = ANY($2)")
            .bind(lot_id)
            .bind(&order_ids)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::AssignOrders,
            "lot",
            Some(lot_id),
            json!({ "orderIds": order_ids, "quantity": requested }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(lot_id, orders = order_ids.len(), requested, "Pending orders assigned");
        self.get(lot_id).await
    }

    /// Lock a lot row and compute its availability, leaving out `exclude_order`'s
    /// own booking so an order being edited is measured against the rest.
    pub async fn lock_capacity(
        conn: &mut PgConnection,
        lot_id: i32,
        exclude_order: Option<i32>,
    ) -> AppResult<LockedLot> {
        let (lot_number, seeds_sown, damaged): (String, i32, i32) = sqlx::query_as(
            "SELECT lot_number, seeds_sown, damaged FROM sowing_lots WHERE id = $1 FOR UPDATE",
        )
        .bind(lot_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Lot".to_string()))?;

        let booked: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(booked_qty), 0)::BIGINT FROM orders
            WHERE lot_id = $1 AND status <> 'CANCELLED'
              AND ($2::INT IS NULL OR id <> $2)
            "#,
        )
        .bind(lot_id)
        .bind(exclude_order)
        .fetch_one(&mut *conn)
        .await?;

        Ok(LockedLot {
            id: lot_id,
            lot_number,
            available: available_from_totals(seeds_sown, damaged, booked),
        })
    }

    async fn fetch_for_update(conn: &mut PgConnection, id: i32) -> AppResult<SowingLot> {
        sqlx::query_as::<_, SowingLot>(&format!(
            "SELECT {} FROM sowing_lots WHERE id = $1 FOR UPDATE",
            LOT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Lot".to_string()))
    }

    async fn ensure_variety_in_category(
        conn: &mut PgConnection,
        category_id: i32,
        variety_id: i32,
    ) -> AppResult<()> {
        let matches: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM varieties WHERE id = $1 AND category_id = $2)",
        )
        .bind(variety_id)
        .bind(category_id)
        .fetch_one(&mut *conn)
        .await?;

        if !matches {
            return Err(AppError::validation(
                "varietyId",
                "Variety does not belong to the selected category",
            ));
        }
        Ok(())
    }

    async fn ensure_lot_number_free(
        conn: &mut PgConnection,
        lot_number: &str,
        except_id: Option<i32>,
    ) -> AppResult<()> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sowing_lots WHERE lot_number = $1 AND ($2::INT IS NULL OR id <> $2))",
        )
        .bind(lot_number)
        .bind(except_id)
        .fetch_one(&mut *conn)
        .await?;

        if taken {
            return Err(AppError::DuplicateEntry("lotNumber".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked(available: i64) -> LockedLot {
        LockedLot {
            id: 7,
            lot_number: "TOM-0424".to_string(),
            available,
        }
    }

    #[test]
    fn test_guarded_check_names_the_lot() {
        let err = locked(50).check(BookingPolicy::Guarded, 100).unwrap_err();
        match err {
            AppError::CapacityExceeded {
                lot,
                requested,
                available,
            } => {
                assert_eq!(lot, "TOM-0424");
                assert_eq!(requested, 100);
                assert_eq!(available, 50);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_permissive_check_allows_overbooking() {
        assert!(locked(50).check(BookingPolicy::Permissive, 100).is_ok());
        assert!(locked(-20).check(BookingPolicy::Permissive, 1).is_ok());
    }

    #[test]
    fn test_exact_fit_is_accepted() {
        assert!(locked(50).check(BookingPolicy::Guarded, 50).is_ok());
    }

    #[test]
    fn test_patch_null_clears_ready_date_and_remarks() {
        let cleared: UpdateLotInput =
            serde_json::from_str(r#"{"expectedReadyDate": null, "remarks": null}"#).unwrap();
        assert_eq!(cleared.expected_ready_date, Some(None));
        assert_eq!(cleared.remarks, Some(None));

        let kept: UpdateLotInput = serde_json::from_str(r#"{"seedsSown": 600}"#).unwrap();
        assert_eq!(kept.expected_ready_date, None);
        assert_eq!(kept.remarks, None);
        assert_eq!(kept.seeds_sown, Some(600));

        let set: UpdateLotInput =
            serde_json::from_str(r#"{"expectedReadyDate": "2026-12-01"}"#).unwrap();
        assert_eq!(set.expected_ready_date, Some(NaiveDate::from_ymd_opt(2026, 12, 1)));
    }
}
