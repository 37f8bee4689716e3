//! Inventory category repository.

use serde_json::json;
use sqlx::PgPool;

use merch_crm_core::{CategoryId, UserId};

use super::{RepositoryError, audit};
use crate::models::inventory::{category_path, creates_category_cycle};
use crate::models::{Category, CategoryInput};

const SELECT_CATEGORY: &str = r"
    SELECT c.id, c.name, c.description, c.icon, c.color, c.prefix, c.parent_id, c.sort_order,
           c.is_active, c.is_system, c.default_unit,
           (SELECT COUNT(*) FROM crm.inventory_items i
             WHERE i.category_id = c.id AND NOT i.is_archived) AS item_count,
           (SELECT COALESCE(SUM(i.quantity), 0)::bigint FROM crm.inventory_items i
             WHERE i.category_id = c.id AND NOT i.is_archived) AS total_quantity
    FROM crm.inventory_categories c
";

const NAME_TAKEN: &str = "A category with this name already exists";

/// Repository for inventory categories.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    /// Create a new category repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All categories by sort order, then name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "{SELECT_CATEGORY} ORDER BY c.sort_order, c.name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(categories)
    }

    /// `(id, parent, name)` for every category.
    async fn tree(&self) -> Result<Vec<(CategoryId, Option<CategoryId>, String)>, RepositoryError> {
        let tree = sqlx::query_as::<_, (CategoryId, Option<CategoryId>, String)>(
            "SELECT id, parent_id, name FROM crm.inventory_categories",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(tree)
    }

    /// The "Root / Child / Leaf" path of a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn path(&self, id: CategoryId) -> Result<String, RepositoryError> {
        let tree = self.tree().await?;
        if !tree.iter().any(|(c, _, _)| *c == id) {
            return Err(RepositoryError::NotFound);
        }
        Ok(category_path(id, &tree))
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        input: &CategoryInput,
        actor: UserId,
    ) -> Result<CategoryId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, CategoryId>(
            r"
            INSERT INTO crm.inventory_categories
                (name, description, icon, color, prefix, parent_id, default_unit, is_active,
                 sort_order)
            VALUES ($1, $2, $3, $4, UPPER($5), $6, $7, $8,
                    (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM crm.inventory_categories))
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.icon)
        .bind(&input.color)
        .bind(&input.prefix)
        .bind(input.parent_id)
        .bind(input.default_unit)
        .bind(input.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_constraint(e, "inventory_categories_name_key", NAME_TAKEN))?;

        audit::record(
            &mut tx,
            Some(actor),
            "Category created",
            "inventory_category",
            Some(id.as_uuid()),
            json!({ "name": input.name }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Update a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category doesn't exist.
    /// Returns `RepositoryError::Conflict` on a duplicate name or when the
    /// parent is the category itself or one of its descendants.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: CategoryId,
        input: &CategoryInput,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        if let Some(parent) = input.parent_id {
            let tree = self.tree().await?;
            if creates_category_cycle(id, parent, &tree) {
                return Err(RepositoryError::Conflict(
                    "A category cannot be nested inside itself".to_owned(),
                ));
            }
        }

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE crm.inventory_categories
            SET name = $2, description = $3, icon = $4, color = $5, prefix = UPPER($6),
                parent_id = $7, default_unit = $8, is_active = $9
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.icon)
        .bind(&input.color)
        .bind(&input.prefix)
        .bind(input.parent_id)
        .bind(input.default_unit)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_constraint(e, "inventory_categories_name_key", NAME_TAKEN))?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Category updated",
            "inventory_category",
            Some(id.as_uuid()),
            json!({ "name": input.name, "parent_id": input.parent_id }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a category with no items and no children.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category doesn't exist.
    /// Returns `RepositoryError::Conflict` if it still has items or children.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: CategoryId, actor: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (name, items, children) = sqlx::query_as::<_, (String, i64, i64)>(
            r"
            SELECT c.name,
                   (SELECT COUNT(*) FROM crm.inventory_items WHERE category_id = c.id),
                   (SELECT COUNT(*) FROM crm.inventory_categories WHERE parent_id = c.id)
            FROM crm.inventory_categories c
            WHERE c.id = $1
            FOR UPDATE
            ",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if items > 0 {
            return Err(RepositoryError::Conflict(format!(
                "Category still has {items} item(s)"
            )));
        }
        if children > 0 {
            return Err(RepositoryError::Conflict(format!(
                "Category still has {children} subcategory(ies)"
            )));
        }

        sqlx::query("DELETE FROM crm.inventory_categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Category deleted",
            "inventory_category",
            Some(id.as_uuid()),
            json!({ "name": name }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Store a new sort order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn reorder(
        &self,
        order: &[(CategoryId, i32)],
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (id, sort_order) in order {
            sqlx::query("UPDATE crm.inventory_categories SET sort_order = $2 WHERE id = $1")
                .bind(id)
                .bind(sort_order)
                .execute(&mut *tx)
                .await?;
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Categories reordered",
            "inventory_category",
            None,
            json!({ "count": order.len() }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
