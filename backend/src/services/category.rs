//! Category management service

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use shared::{ensure_unreferenced, validate_price, Category};
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::audit::{AuditAction, AuditService};
use crate::services::present;

/// Category service for plant category reference data
#[derive(Clone)]
pub struct CategoryService {
    db: PgPool,
}

/// Input for creating a category
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 100, message = "Category name must be 1-100 characters"))]
    pub name: String,
    pub image: Option<String>,
    pub price_per_unit: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Input for updating a category. `image: null` removes the image.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryInput {
    #[validate(length(min = 1, max = 100, message = "Category name must be 1-100 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub image: Option<Option<String>>,
    pub price_per_unit: Option<Decimal>,
    pub is_active: Option<bool>,
}

const CATEGORY_COLUMNS: &str =
    "id, name, image, price_per_unit, is_active, created_at, updated_at";

impl CategoryService {
    /// Create a new CategoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List categories, optionally only active ones
    pub async fn list(&self, active_only: bool) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "SELECT {} FROM categories WHERE ($1 = FALSE OR is_active) ORDER BY name",
            CATEGORY_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(categories)
    }

    pub async fn get(&self, id: i32) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(&format!(
            "SELECT {} FROM categories WHERE id = $1",
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))
    }

    pub async fn create(&self, user: &AuthUser, input: CreateCategoryInput) -> AppResult<Category> {
        input.validate()?;
        let price = input.price_per_unit.unwrap_or(Decimal::ZERO);
        validate_price(price).map_err(|m| AppError::validation("pricePerUnit", m))?;

        let name = input.name.trim().to_string();

        let mut tx = self.db.begin().await?;
        Self::ensure_name_free(&mut tx, &name, None).await?;

        let category = sqlx::query_as::<_, Category>(&format!(
            r#"
            INSERT INTO categories (name, image, price_per_unit, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(&name)
        .bind(&input.image)
        .bind(price)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Create,
            "category",
            Some(category.id),
            json!({ "name": category.name }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(category_id = category.id, "Category created");
        Ok(category)
    }

    pub async fn update(
        &self,
        user: &AuthUser,
        id: i32,
        input: UpdateCategoryInput,
    ) -> AppResult<Category> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let existing = Self::fetch_for_update(&mut tx, id).await?;

        let name = input
            .name
            .map(|n| n.trim().to_string())
            .unwrap_or(existing.name);
        Self::ensure_name_free(&mut tx, &name, Some(id)).await?;

        let price = input.price_per_unit.unwrap_or(existing.price_per_unit);
        validate_price(price).map_err(|m| AppError::validation("pricePerUnit", m))?;

        let category = sqlx::query_as::<_, Category>(&format!(
            r#"
            UPDATE categories
            SET name = $1, image = $2, price_per_unit = $3, is_active = $4
            WHERE id = $5
            RETURNING {}
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(&name)
        .bind(input.image.unwrap_or(existing.image))
        .bind(price)
        .bind(input.is_active.unwrap_or(existing.is_active))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Update,
            "category",
            Some(id),
            json!({ "name": category.name, "isActive": category.is_active }),
        )
        .await?;

        tx.commit().await?;

        Ok(category)
    }

    /// Delete a category; blocked while varieties reference it
    pub async fn delete(&self, user: &AuthUser, id: i32) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        // The row lock also holds off new varieties referencing the category
        let category = Self::fetch_for_update(&mut tx, id).await?;

        let varieties: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM varieties WHERE category_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        if let Err(err) = ensure_unreferenced("category", &[("varieties", varieties)]) {
            tracing::warn!(category_id = id, varieties, "Category delete blocked");
            return Err(err.into());
        }

        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            user,
            AuditAction::Delete,
            "category",
            Some(id),
            json!({ "name": category.name }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(category_id = id, "Category deleted");
        Ok(())
    }

    async fn fetch_for_update(conn: &mut PgConnection, id: i32) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(&format!(
            "SELECT {} FROM categories WHERE id = $1 FOR UPDATE",
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))
    }

    async fn ensure_name_free(
        conn: &mut PgConnection,
        name: &str,
        except_id: Option<i32>,
    ) -> AppResult<()> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE LOWER(name) = LOWER($1) AND ($2::INT IS NULL OR id <> $2))",
        )
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_image_null_clears_missing_keeps() {
        let cleared: UpdateCategoryInput = serde_json::from_str(r#"{"image": null}"#).unwrap();
        assert_eq!(cleared.image, Some(None));

        let kept: UpdateCategoryInput = serde_json::from_str(r#"{"name": "Chilli"}"#).unwrap();
        assert_eq!(kept.image, None);

        let replaced: UpdateCategoryInput =
            serde_json::from_str(r#"{"image": "/img/chilli.png"}"#).unwrap();
        assert_eq!(replaced.image, Some(Some("/img/chilli.png".to_string())));
    }
}
