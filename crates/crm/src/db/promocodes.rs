//! Promocode repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use merch_crm_core::{DiscountType, PromocodeId, UserId};

use super::{RepositoryError, audit};
use crate::models::{BulkPromocodes, PromoConstraints, Promocode, PromocodeInput, PromocodeListRow};

const SELECT_PROMOCODE: &str = r"
    SELECT p.id, p.name, p.code, p.discount_type, p.value, p.min_order_amount,
           p.max_discount_amount, p.start_date, p.expires_at, p.usage_limit, p.usage_count,
           p.is_active, p.admin_comment, p.constraints, p.created_at
    FROM crm.promocodes p
";

const CODE_TAKEN: &str = "A promocode with this code already exists";

/// Database row; `constraints` is JSONB.
#[derive(Debug, sqlx::FromRow)]
struct PromocodeRow {
    id: PromocodeId,
    name: Option<String>,
    code: String,
    discount_type: DiscountType,
    value: Decimal,
    min_order_amount: Decimal,
    max_discount_amount: Decimal,
    start_date: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
    usage_count: i32,
    is_active: bool,
    admin_comment: Option<String>,
    constraints: Json<PromoConstraints>,
    created_at: DateTime<Utc>,
}

impl From<PromocodeRow> for Promocode {
    fn from(row: PromocodeRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            code: row.code,
            discount_type: row.discount_type,
            value: row.value,
            min_order_amount: row.min_order_amount,
            max_discount_amount: row.max_discount_amount,
            start_date: row.start_date,
            expires_at: row.expires_at,
            usage_limit: row.usage_limit,
            usage_count: row.usage_count,
            is_active: row.is_active,
            admin_comment: row.admin_comment,
            constraints: row.constraints.0,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ListRow {
    #[sqlx(flatten)]
    promocode: PromocodeRow,
    total_saved: Decimal,
}

/// Repository for promocode database operations.
pub struct PromocodeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PromocodeRepository<'a> {
    /// Create a new promocode repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every promocode, newest first, with the discount it has granted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<PromocodeListRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, ListRow>(
            r"
            SELECT p.id, p.name, p.code, p.discount_type, p.value, p.min_order_amount,
                   p.max_discount_amount, p.start_date, p.expires_at, p.usage_limit,
                   p.usage_count, p.is_active, p.admin_comment, p.constraints, p.created_at,
                   COALESCE((SELECT SUM(o.discount_amount) FROM crm.orders o
                              WHERE o.promocode_id = p.id), 0) AS total_saved
            FROM crm.promocodes p
            ORDER BY p.created_at DESC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PromocodeListRow {
                promocode: r.promocode.into(),
                total_saved: r.total_saved,
            })
            .collect())
    }

    /// Get a promocode by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: PromocodeId) -> Result<Option<Promocode>, RepositoryError> {
        let row = sqlx::query_as::<_, PromocodeRow>(&format!("{SELECT_PROMOCODE} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Look up a code case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Promocode>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find_by_code(&mut conn, code, false).await
    }

    /// Create a promocode.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        input: &PromocodeInput,
        actor: UserId,
    ) -> Result<PromocodeId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, PromocodeId>(
            r"
            INSERT INTO crm.promocodes (
                name, code, discount_type, value, min_order_amount, max_discount_amount,
                start_date, expires_at, usage_limit, is_active, admin_comment, constraints
            )
            VALUES ($1, UPPER($2), $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(&input.code)
        .bind(input.discount_type)
        .bind(input.value)
        .bind(input.min_order_amount)
        .bind(input.max_discount_amount)
        .bind(input.start_date)
        .bind(input.expires_at)
        .bind(input.usage_limit)
        .bind(input.is_active)
        .bind(&input.admin_comment)
        .bind(Json(&input.constraints))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_constraint(e, "promocodes_code_key", CODE_TAKEN))?;

        audit::record(
            &mut tx,
            Some(actor),
            "Promocode created",
            "promocode",
            Some(id.as_uuid()),
            json!({ "code": input.code.to_uppercase(), "type": input.discount_type }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Update a promocode.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the promocode doesn't exist.
    /// Returns `RepositoryError::Conflict` if the code is taken.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: PromocodeId,
        input: &PromocodeInput,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE crm.promocodes
            SET name = $2, code = UPPER($3), discount_type = $4, value = $5,
                min_order_amount = $6, max_discount_amount = $7, start_date = $8,
                expires_at = $9, usage_limit = $10, is_active = $11, admin_comment = $12,
                constraints = $13
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.code)
        .bind(input.discount_type)
        .bind(input.value)
        .bind(input.min_order_amount)
        .bind(input.max_discount_amount)
        .bind(input.start_date)
        .bind(input.expires_at)
        .bind(input.usage_limit)
        .bind(input.is_active)
        .bind(&input.admin_comment)
        .bind(Json(&input.constraints))
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_constraint(e, "promocodes_code_key", CODE_TAKEN))?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Promocode updated",
            "promocode",
            Some(id.as_uuid()),
            json!({ "code": input.code.to_uppercase() }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Activate or deactivate a promocode.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the promocode doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_active(
        &self,
        id: PromocodeId,
        active: bool,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let code = sqlx::query_scalar::<_, String>(
            "UPDATE crm.promocodes SET is_active = $2 WHERE id = $1 RETURNING code",
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        audit::record(
            &mut tx,
            Some(actor),
            if active {
                "Promocode activated"
            } else {
                "Promocode deactivated"
            },
            "promocode",
            Some(id.as_uuid()),
            json!({ "code": code }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a promocode. Orders keep their discount but lose the link.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the promocode doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: PromocodeId, actor: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let code = sqlx::query_scalar::<_, String>(
            "DELETE FROM crm.promocodes WHERE id = $1 RETURNING code",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        audit::record(
            &mut tx,
            Some(actor),
            "Promocode deleted",
            "promocode",
            Some(id.as_uuid()),
            json!({ "code": code }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Insert a generated batch in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if any code collides.
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn insert_batch(
        &self,
        codes: &[String],
        template: &BulkPromocodes,
        actor: UserId,
    ) -> Result<u64, RepositoryError> {
        let label = format!("Bulk generation: {}", template.prefix);
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO crm.promocodes (
                name, code, discount_type, value, min_order_amount, max_discount_amount,
                expires_at, usage_limit, admin_comment
            )
            SELECT $1, code, $3, $4, $5, $6, $7, $8, $1
            FROM UNNEST($2::text[]) AS code
            ",
        )
        .bind(&label)
        .bind(codes)
        .bind(template.discount_type)
        .bind(template.value)
        .bind(template.min_order_amount)
        .bind(template.max_discount_amount)
        .bind(template.expires_at)
        .bind(template.usage_limit.unwrap_or(1))
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_constraint(e, "promocodes_code_key", CODE_TAKEN))?
        .rows_affected();

        audit::record(
            &mut tx,
            Some(actor),
            "Promocodes generated",
            "promocode",
            None,
            json!({ "prefix": template.prefix, "count": inserted }),
        )
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }
}

/// Look up a code case-insensitively, optionally locking the row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn find_by_code(
    conn: &mut PgConnection,
    code: &str,
    for_update: bool,
) -> Result<Option<Promocode>, RepositoryError> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, PromocodeRow>(&format!(
        "{SELECT_PROMOCODE} WHERE p.code = UPPER($1) {lock}"
    ))
    .bind(code.trim())
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Into::into))
}

/// Count one use of a promocode.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn increment_usage(
    conn: &mut PgConnection,
    id: PromocodeId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE crm.promocodes SET usage_count = usage_count + 1 WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}
