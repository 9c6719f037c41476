//! Seed inward ledger service
//!
//! Tracks received seed stock. `available_quantity` is drawn down when a
//! sowing lot is created against a batch and given back when that lot
//! shrinks or is deleted.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use shared::{ensure_unreferenced, rebase_inward_total, InwardLotOption, SeedInwardBatch};
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{AuditAction, AuditService};
use crate::services::present;

/// Seed inward service
#[derive(Clone)]
pub struct SeedInwardService {
    db: PgPool,
}

/// Input for receiving a batch
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveBatchInput {
    #[validate(length(min = 1, max = 64, message = "Lot number is required"))]
    pub lot_number: String,
    pub category_id: i32,
    pub variety_id: i32,
    pub expiry_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Packets must be greater than zero"))]
    pub packets: i32,
    #[validate(range(min = 1, message = "Total quantity must be greater than zero"))]
    pub total_quantity: i32,
    pub package_type: Option<String>,
    pub supplier_name: Option<String>,
}

/// Input for correcting a batch. `null` clears the expiry date, package type
/// or supplier.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatchInput {
    #[validate(length(min = 1, max = 64, message = "Lot number is required"))]
    pub lot_number: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub expiry_date: Option<Option<NaiveDate>>,
    #[validate(range(min = 1, message = "Packets must be greater than zero"))]
    pub packets: Option<i32>,
    #[validate(range(min = 1, message = "Total quantity must be greater than zero"))]
    pub total_quantity: Option<i32>,
    #[serde(default, deserialize_with = "present")]
    pub package_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub supplier_name: Option<Option<String>>,
}

/// Filters for listing batches
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFilter {
    pub category_id: Option<i32>,
    pub variety_id: Option<i32>,
}

const BATCH_COLUMNS: &str = "id, lot_number, category_id, variety_id, expiry_date, packets, \
     total_quantity, available_quantity, package_type, supplier_name, received_at";

impl SeedInwardService {
    /// Create a new SeedInwardService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, filter: BatchFilter) -> AppResult<Vec<SeedInwardBatch>> {
        let batches = sqlx::query_as::<_, SeedInwardBatch>(&format!(
            r#"
            SELECT {} FROM seed_inward
            WHERE ($1::INT IS NULL OR category_id = $1)
              AND ($2::INT IS NULL OR variety_id = $2)
            ORDER BY received_at DESC, id DESC
            "#,
            BATCH_COLUMNS
        ))
        .bind(filter.category_id)
        .bind(filter.variety_id)
        .fetch_all(&self.db)
        .await?;

        Ok(batches)
    }

    pub async fn get(&self, id: i32) -> AppResult<SeedInwardBatch> {
        sqlx::query_as::<_, SeedInwardBatch>(&format!(
            "SELECT {} FROM seed_inward WHERE id = $1",
            BATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Seed inward entry".to_string()))
    }

    /// Lot-number picker data for the sowing form
    pub async fn list_available_batches(
        &self,
        category_id: i32,
        variety_id: i32,
    ) -> AppResult<Vec<InwardLotOption>> {
        let options = sqlx::query_as::<_, InwardLotOption>(
            r#"
            SELECT id, lot_number, packets, available_quantity, expiry_date
            FROM seed_inward
            WHERE category_id = $1 AND variety_id = $2
            ORDER BY available_quantity > 0 DESC, received_at DESC
            "#,
        )
        .bind(category_id)
        .bind(variety_id)
        .fetch_all(&self.db)
        .await?;

        Ok(options)
    }

    /// Record a received batch; the whole quantity starts out available
    pub async fn receive(
        &self,
        user: &AuthUser,
        input: ReceiveBatchInput,
    ) -> AppResult<SeedInwardBatch> {
        input.validate()?;
        let lot_number = input.lot_number.trim().to_string();
        if lot_number.is_empty() {
            return Err(AppError::validation("lotNumber", "Lot number is required"));
        }

        let mut tx = self.db.begin().await?;

        let variety_matches: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM varieties WHERE id = $1 AND category_id = $2)",
        )
        .bind(input.variety_id)
        .bind(input.category_id)
        .fetch_one(&mut *tx)
        .await?;
        if !variety_matches {
            return Err(AppError::validation(
                "varietyId",
                "Variety does not belong to the selected category",
            ));
        }

        Self::ensure_lot_number_free(&mut tx, input.category_id, input.variety_id, &lot_number, None)
            .await?;

        let batch = sqlx::query_as::<_, SeedInwardBatch>(&format!(
            r#"
            INSERT INTO seed_inward (
                lot_number, category_id, variety_id, expiry_date, packets,
                total_quantity, available_quantity, package_type, supplier_name, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9)
            RETURNING {}
            "#,
            BATCH_COLUMNS
        ))
        .bind(&lot_number)
        .bind(input.category_id)
        .bind(input.variety_id)
        .bind(input.expiry_date)
        .bind(input.packets)
        .bind(input.total_quantity)
        .bind(&input.package_type)
        .bind(&input.supplier_name)
        .bind(user.user_id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Create,
            "seed_inward",
            Some(batch.id),
            json!({ "lotNumber": batch.lot_number, "totalQuantity": batch.total_quantity }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            batch_id = batch.id,
            lot_number = %batch.lot_number,
            quantity = batch.total_quantity,
            "Seed inward received"
        );
        Ok(batch)
    }

    /// Correct a batch. Editing the total shifts the available quantity by
    /// the same amount so consumption already recorded is preserved.
    pub async fn update(
        &self,
        user: &AuthUser,
        id: i32,
        input: UpdateBatchInput,
    ) -> AppResult<SeedInwardBatch> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let existing = Self::fetch_for_update(&mut tx, id).await?;

        let lot_number = match input.lot_number {
            Some(n) => n.trim().to_string(),
            None => existing.lot_number.clone(),
        };
        if lot_number != existing.lot_number {
            Self::ensure_lot_number_free(
                &mut tx,
                existing.category_id,
                existing.variety_id,
                &lot_number,
                Some(id),
            )
            .await?;
        }

        let total_quantity = input.total_quantity.unwrap_or(existing.total_quantity);
        let available_quantity = rebase_inward_total(
            existing.available_quantity,
            existing.total_quantity,
            total_quantity,
        )?;

        let batch = sqlx::query_as::<_, SeedInwardBatch>(&format!(
            r#"
            UPDATE seed_inward
            SET lot_number = $1, expiry_date = $2, packets = $3, total_quantity = $4,
                available_quantity = $5, package_type = $6, supplier_name = $7
            WHERE id = $8
            RETURNING {}
            "#,
            BATCH_COLUMNS
        ))
        .bind(&lot_number)
        .bind(input.expiry_date.unwrap_or(existing.expiry_date))
        .bind(input.packets.unwrap_or(existing.packets))
        .bind(total_quantity)
        .bind(available_quantity)
        .bind(input.package_type.unwrap_or(existing.package_type))
        .bind(input.supplier_name.unwrap_or(existing.supplier_name))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Update,
            "seed_inward",
            Some(id),
            json!({
                "lotNumber": batch.lot_number,
                "totalQuantity": { "from": existing.total_quantity, "to": batch.total_quantity },
            }),
        )
        .await?;

        tx.commit().await?;
        Ok(batch)
    }

    /// Delete a batch; blocked while any sowing lot references it
    pub async fn delete(&self, user: &AuthUser, id: i32) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let batch = Self::fetch_for_update(&mut tx, id).await?;

        let lots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sowing_lots WHERE seed_inward_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        if let Err(err) = ensure_unreferenced("seed_inward", &[("sowing lots", lots)]) {
            tracing::warn!(batch_id = id, lots, "Seed inward delete blocked");
            return Err(err.into());
        }

        sqlx::query("DELETE FROM seed_inward WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Delete,
            "seed_inward",
            Some(id),
            json!({ "lotNumber": batch.lot_number }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(batch_id = id, "Seed inward deleted");
        Ok(())
    }

    /// Draw `qty` from a batch. Fails instead of going below zero.
    pub async fn consume(conn: &mut PgConnection, batch_id: i32, qty: i32) -> AppResult<()> {
        if qty <= 0 {
            return Ok(());
        }

        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE seed_inward
            SET available_quantity = available_quantity - $1
            WHERE id = $2 AND available_quantity >= $1
            RETURNING available_quantity
            "#,
        )
        .bind(qty)
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?;

        match remaining {
            Some(remaining) => {
                tracing::debug!(batch_id, qty, remaining, "Seed inward consumed");
                Ok(())
            }
            None => {
                let available: Option<(String, i32)> = sqlx::query_as(
                    "SELECT lot_number, available_quantity FROM seed_inward WHERE id = $1",
                )
                .bind(batch_id)
                .fetch_optional(&mut *conn)
                .await?;

                match available {
                    Some((lot_number, available)) => {
                        tracing::warn!(batch_id, qty, available, "Seed inward short");
                        Err(AppError::InsufficientInventory(format!(
                            "Seed lot {} has {} seeds available; {} requested",
                            lot_number, available, qty
                        )))
                    }
                    None => Err(AppError::NotFound("Seed inward entry".to_string())),
                }
            }
        }
    }

    /// Give `qty` back to a batch, capped at its total quantity
    pub async fn release(conn: &mut PgConnection, batch_id: i32, qty: i32) -> AppResult<()> {
        if qty <= 0 {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE seed_inward
            SET available_quantity = LEAST(total_quantity, available_quantity + $1)
            WHERE id = $2
            "#,
        )
        .bind(qty)
        .bind(batch_id)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(batch_id, qty, "Seed inward released");
        Ok(())
    }

    /// Batch a new sowing lot should draw from: the explicit id, else the
    /// batch with the same lot number under the same category and variety
    pub async fn resolve_for_lot(
        conn: &mut PgConnection,
        explicit_id: Option<i32>,
        lot_number: &str,
        category_id: i32,
        variety_id: i32,
    ) -> AppResult<Option<i32>> {
        if let Some(id) = explicit_id {
            let matches: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM seed_inward WHERE id = $1 AND category_id = $2 AND variety_id = $3)",
            )
            .bind(id)
            .bind(category_id)
            .bind(variety_id)
            .fetch_one(&mut *conn)
            .await?;

            if !matches {
                return Err(AppError::validation(
                    "seedInwardId",
                    "Seed inward entry does not match the lot's category and variety",
                ));
            }
            return Ok(Some(id));
        }

        let id = sqlx::query_scalar(
            "SELECT id FROM seed_inward WHERE lot_number = $1 AND category_id = $2 AND variety_id = $3",
        )
        .bind(lot_number)
        .bind(category_id)
        .bind(variety_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(id)
    }

    async fn fetch_for_update(conn: &mut PgConnection, id: i32) -> AppResult<SeedInwardBatch> {
        sqlx::query_as::<_, SeedInwardBatch>(&format!(
            "SELECT {} FROM seed_inward WHERE id = $1 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Seed inward entry".to_string()))
    }

    async fn ensure_lot_number_free(
        conn: &mut PgConnection,
        category_id: i32,
        variety_id: i32,
        lot_number: &str,
        except_id: Option<i32>,
    ) -> AppResult<()> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM seed_inward
                WHERE category_id = $1 AND variety_id = $2 AND lot_number = $3
                  AND ($4::INT IS NULL OR id <> $4)
            )
            "#,
        )
        .bind(category_id)
        .bind(variety_id)
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

    #[test]
    fn test_batch_update_clears_optional_fields_with_null() {
        let input: UpdateBatchInput = serde_json::from_str(
            r#"{"expiryDate": null, "packageType": null, "supplierName": null}"#,
        )
        .unwrap();
        assert_eq!(input.expiry_date, Some(None));
        assert_eq!(input.package_type, Some(None));
        assert_eq!(input.supplier_name, Some(None));
    }

    #[test]
    fn test_batch_update_keeps_missing_fields() {
        let input: UpdateBatchInput =
            serde_json::from_str(r#"{"supplierName": "Namdhari Seeds"}"#).unwrap();
        assert_eq!(input.expiry_date, None);
        assert_eq!(input.package_type, None);
        assert_eq!(input.supplier_name, Some(Some("Namdhari Seeds".to_string())));
    }
}
