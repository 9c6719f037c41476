//! Variety management service

use serde::Deserialize;
use serde_json::json;
use shared::{ensure_unreferenced, Variety};
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{AuditAction, AuditService};

/// Variety service
#[derive(Clone)]
pub struct VarietyService {
    db: PgPool,
}

/// Input for creating a variety
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVarietyInput {
    pub category_id: i32,
    #[validate(length(min = 1, max = 100, message = "Variety name must be 1-100 characters"))]
    pub name: String,
    pub is_active: Option<bool>,
}

/// Input for updating a variety
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVarietyInput {
    pub category_id: Option<i32>,
    #[validate(length(min = 1, max = 100, message = "Variety name must be 1-100 characters"))]
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

const SELECT_VARIETY: &str = r#"
    SELECT v.id, v.category_id, c.name AS category_name, v.name, v.is_active,
           v.created_at, v.updated_at
    FROM varieties v
    JOIN categories c ON c.id = v.category_id
"#;

impl VarietyService {
    /// Create a new VarietyService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List varieties, optionally for one category
    pub async fn list(&self, category_id: Option<i32>, active_only: bool) -> AppResult<Vec<Variety>> {
        let varieties = sqlx::query_as::<_, Variety>(&format!(
            "{} WHERE ($1::INT IS NULL OR v.category_id = $1) AND ($2 = FALSE OR v.is_active) ORDER BY c.name, v.name",
            SELECT_VARIETY
        ))
        .bind(category_id)
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(varieties)
    }

    pub async fn get(&self, id: i32) -> AppResult<Variety> {
        sqlx::query_as::<_, Variety>(&format!("{} WHERE v.id = $1", SELECT_VARIETY))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Variety".to_string()))
    }

    pub async fn create(&self, user: &AuthUser, input: CreateVarietyInput) -> AppResult<Variety> {
        input.validate()?;
        let name = input.name.trim().to_string();

        let mut tx = self.db.begin().await?;
        Self::ensure_category_exists(&mut tx, input.category_id).await?;
        Self::ensure_name_free(&mut tx, input.category_id, &name, None).await?;

        let id: i32 = sqlx::query_scalar(
            "INSERT INTO varieties (category_id, name, is_active) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(input.category_id)
        .bind(&name)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Create,
            "variety",
            Some(id),
            json!({ "categoryId": input.category_id, "name": name }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(variety_id = id, category_id = input.category_id, "Variety created");
        self.get(id).await
    }

    pub async fn update(
        &self,
        user: &AuthUser,
        id: i32,
        input: UpdateVarietyInput,
    ) -> AppResult<Variety> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let existing = Self::fetch_for_update(&mut tx, id).await?;

        let category_id = input.category_id.unwrap_or(existing.category_id);
        if category_id != existing.category_id {
            Self::ensure_category_exists(&mut tx, category_id).await?;

            // Lots carry both ids, so moving the variety would orphan them
            let lots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sowing_lots WHERE variety_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            if lots > 0 {
                return Err(AppError::validation(
                    "categoryId",
                    "Cannot move a variety that already has sowing lots",
                ));
            }
        }

        let name = input
            .name
            .map(|n| n.trim().to_string())
            .unwrap_or(existing.name);
        Self::ensure_name_free(&mut tx, category_id, &name, Some(id)).await?;

        sqlx::query("UPDATE varieties SET category_id = $1, name = $2, is_active = $3 WHERE id = $4")
            .bind(category_id)
            .bind(&name)
            .bind(input.is_active.unwrap_or(existing.is_active))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Update,
            "variety",
            Some(id),
            json!({ "categoryId": category_id, "name": name }),
        )
        .await?;

        tx.commit().await?;

        self.get(id).await
    }

    /// Delete a variety; blocked while sowing lots or seed inward batches reference it
    pub async fn delete(&self, user: &AuthUser, id: i32) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let variety = Self::fetch_for_update(&mut tx, id).await?;

        let (lots, batches): (i64, i64) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM sowing_lots WHERE variety_id = $1),
                   (SELECT COUNT(*) FROM seed_inward WHERE variety_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let dependents = [("sowing lots", lots), ("seed inward entries", batches)];
        if let Err(err) = ensure_unreferenced("variety", &dependents) {
            tracing::warn!(variety_id = id, lots, batches, "Variety delete blocked");
            return Err(err.into());
        }

        sqlx::query("DELETE FROM varieties WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Delete,
            "variety",
            Some(id),
            json!({ "name": variety.name }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(variety_id = id, "Variety deleted");
        Ok(())
    }

    /// Locks the variety row only; the joined category stays unlocked
    async fn fetch_for_update(conn: &mut PgConnection, id: i32) -> AppResult<Variety> {
        sqlx::query_as::<_, Variety>(&format!("{} WHERE v.id = $1 FOR UPDATE OF v", SELECT_VARIETY))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Variety".to_string()))
    }

    /// Share-locks the category so it cannot be deleted before commit
    async fn ensure_category_exists(conn: &mut PgConnection, category_id: i32) -> AppResult<()> {
        let exists: Option<i32> =
            sqlx::query_scalar("SELECT id FROM categories WHERE id = $1 FOR KEY SHARE")
                .bind(category_id)
                .fetch_optional(&mut *conn)
                .await?;

        if exists.is_none() {
            return Err(AppError::NotFound("Category".to_string()));
        }
        Ok(())
    }

    async fn ensure_name_free(
        conn: &mut PgConnection,
        category_id: i32,
        name: &str,
        except_id: Option<i32>,
    ) -> AppResult<()> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM varieties
                WHERE category_id = $1 AND LOWER(name) = LOWER($2) AND ($3::INT IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(category_id)
        .bind(name)
        .bind(except_id)
        .fetch_one(&mut *conn)
        .await?;

        if taken {
            return Err(AppError::DuplicateEntry("name".to_string()));
        }
        Ok(())
    }
}
