//! Client repository.
//!
//! Mutations take the acting user and write their audit entry in the same
//! transaction.

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

use merch_crm_core::{ClientId, MIN_PHONE_DIGITS, UserId};

use super::{PAGE_SIZE, RepositoryError, audit, inventory, like_pattern, orders, page_window};
use crate::models::{
    Client, ClientDuplicate, ClientField, ClientFilter, ClientInput, ClientListRow, ClientOption,
    ClientSort, ClientStats, ClientTotals,
};

/// Most possible duplicates shown while creating a client.
pub const MAX_DUPLICATES: i64 = 5;

const MANAGER_NOT_FOUND: &str = "Manager not found";

const SELECT_CLIENT: &str = r"
    SELECT c.id, c.client_type, c.last_name, c.first_name, c.patronymic, c.name,
           c.company, c.phone, c.telegram, c.instagram, c.email, c.city, c.address,
           c.comments, c.social_link, c.acquisition_source, c.manager_id,
           m.name AS manager_name, c.is_archived, c.created_at, c.updated_at
    FROM crm.clients c
    LEFT JOIN crm.users m ON m.id = c.manager_id
";

const LIST_WHERE: &str = r"
    WHERE c.is_archived = $1
      AND ($2::text IS NULL OR c.name ILIKE $2 OR c.company ILIKE $2 OR c.phone ILIKE $2
           OR c.email ILIKE $2 OR c.city ILIKE $2 OR c.telegram ILIKE $2)
      AND ($3::crm.client_type IS NULL OR c.client_type = $3)
      AND ($4::uuid IS NULL OR c.manager_id = $4)
      AND ($5::text IS NULL OR c.city ILIKE $5)
";

const fn sort_clause(sort: ClientSort) -> &'static str {
    match sort {
        ClientSort::Name => "c.last_name ASC, c.first_name ASC",
        ClientSort::CreatedAt => "c.created_at DESC",
        ClientSort::TotalSpent => "total_spent DESC, c.last_name ASC",
    }
}

/// Repository for client database operations.
pub struct ClientRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ClientRepository<'a> {
    /// Create a new client repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// One page of clients with order aggregates, plus the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &ClientFilter,
    ) -> Result<(Vec<ClientListRow>, i64), RepositoryError> {
        let pattern = like_pattern(filter.search.as_deref());
        let city = filter
            .city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let (limit, offset) = page_window(filter.page, PAGE_SIZE);

        let rows = sqlx::query_as::<_, ClientListRow>(&format!(
            r"
            SELECT c.id, c.client_type, c.name, c.company, c.phone, c.email, c.city,
                   m.name AS manager_name, c.is_archived,
                   COALESCE(o.order_count, 0) AS order_count,
                   COALESCE(o.total_spent, 0) AS total_spent,
                   o.last_order_at, c.created_at
            FROM crm.clients c
            LEFT JOIN crm.users m ON m.id = c.manager_id
            LEFT JOIN LATERAL (
                SELECT COUNT(*) AS order_count, SUM(total_amount) AS total_spent,
                       MAX(created_at) AS last_order_at
                FROM crm.orders WHERE client_id = c.id
            ) o ON TRUE
            {LIST_WHERE}
            ORDER BY {}
            LIMIT $6 OFFSET $7
            ",
            sort_clause(filter.sort)
        ))
        .bind(filter.archived)
        .bind(&pattern)
        .bind(filter.client_type)
        .bind(filter.manager_id)
        .bind(city)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM crm.clients c {LIST_WHERE}"
        ))
        .bind(filter.archived)
        .bind(&pattern)
        .bind(filter.client_type)
        .bind(filter.manager_id)
        .bind(city)
        .fetch_one(self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Distinct non-empty cities for the filter dropdown.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn cities(&self) -> Result<Vec<String>, RepositoryError> {
        let cities = sqlx::query_scalar::<_, String>(
            r"
            SELECT DISTINCT city FROM crm.clients
            WHERE city IS NOT NULL AND city <> ''
            ORDER BY city
            LIMIT 100
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(cities)
    }

    /// Active clients for the new-order picker, by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn options(&self) -> Result<Vec<ClientOption>, RepositoryError> {
        let clients = sqlx::query_as::<_, ClientOption>(
            "SELECT id, name, phone FROM crm.clients WHERE NOT is_archived ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(clients)
    }

    /// Active clients matching phone digits, email or full name.
    ///
    /// Each criterion only participates when it is specific enough; with none
    /// usable the result is empty without touching the database.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_duplicates(
        &self,
        phone: Option<&str>,
        email: Option<&str>,
        last_name: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<Vec<ClientDuplicate>, RepositoryError> {
        let digits = phone
            .map(merch_crm_core::phone_digits)
            .filter(|d| d.len() >= MIN_PHONE_DIGITS);
        let email = email.map(str::trim).filter(|e| e.len() > 3);
        let (last_name, first_name) = match (
            last_name.map(str::trim).filter(|n| n.chars().count() > 1),
            first_name.map(str::trim).filter(|n| n.chars().count() > 1),
        ) {
            (Some(l), Some(f)) => (Some(l), Some(f)),
            _ => (None, None),
        };

        if digits.is_none() && email.is_none() && last_name.is_none() {
            return Ok(Vec::new());
        }

        let duplicates = sqlx::query_as::<_, ClientDuplicate>(
            r"
            SELECT id, name, phone, email
            FROM crm.clients
            WHERE NOT is_archived
              AND (
                   ($1::text IS NOT NULL
                    AND regexp_replace(phone, '\D', '', 'g') LIKE '%' || $1 || '%')
                OR ($2::text IS NOT NULL AND LOWER(email) = LOWER($2))
                OR ($3::text IS NOT NULL
                    AND LOWER(last_name) = LOWER($3) AND LOWER(first_name) = LOWER($4))
              )
            ORDER BY created_at DESC
            LIMIT $5
            ",
        )
        .bind(&digits)
        .bind(email)
        .bind(last_name)
        .bind(first_name)
        .bind(MAX_DUPLICATES)
        .fetch_all(self.pool)
        .await?;

        Ok(duplicates)
    }

    /// Get a client by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        let client = sqlx::query_as::<_, Client>(&format!("{SELECT_CLIENT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(client)
    }

    /// Order count, spend, payments and balance for one client.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn totals(&self, id: ClientId) -> Result<ClientTotals, RepositoryError> {
        let (order_count, total_spent, total_paid) = sqlx::query_as::<_, (i64, Decimal, Decimal)>(
            r"
            SELECT
                (SELECT COUNT(*) FROM crm.orders WHERE client_id = $1),
                (SELECT COALESCE(SUM(total_amount), 0) FROM crm.orders WHERE client_id = $1),
                (SELECT COALESCE(SUM(p.amount), 0)
                 FROM crm.payments p JOIN crm.orders o ON o.id = p.order_id
                 WHERE o.client_id = $1)
            ",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        Ok(ClientTotals {
            order_count,
            total_spent,
            total_paid,
            balance: total_paid - total_spent,
        })
    }

    /// Client base statistics.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self) -> Result<ClientStats, RepositoryError> {
        let (total_clients, new_this_month, total_orders, total_revenue) =
            sqlx::query_as::<_, (i64, i64, i64, Decimal)>(
                r"
                SELECT
                    (SELECT COUNT(*) FROM crm.clients WHERE NOT is_archived),
                    (SELECT COUNT(*) FROM crm.clients
                     WHERE created_at >= date_trunc('month', NOW())),
                    (SELECT COUNT(*) FROM crm.orders),
                    (SELECT COALESCE(SUM(total_amount), 0) FROM crm.orders)
                ",
            )
            .fetch_one(self.pool)
            .await?;

        let average = |total: Decimal, count: i64| {
            if count > 0 {
                (total / Decimal::from(count)).round()
            } else {
                Decimal::ZERO
            }
        };

        Ok(ClientStats {
            total_clients,
            new_this_month,
            total_orders,
            total_revenue,
            average_check: average(total_revenue, total_orders),
            average_revenue_per_client: average(total_revenue, total_clients),
        })
    }

    /// Insert a client.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InvalidReference` if the manager doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        input: &ClientInput,
        actor: UserId,
    ) -> Result<ClientId, RepositoryError> {
        let name = merch_crm_core::full_name(
            &input.last_name,
            &input.first_name,
            input.patronymic.as_deref(),
        );
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, ClientId>(
            r"
            INSERT INTO crm.clients (
                client_type, last_name, first_name, patronymic, name, company, phone,
                telegram, instagram, email, city, address, comments, social_link,
                acquisition_source, manager_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            ",
        )
        .bind(input.client_type)
        .bind(&input.last_name)
        .bind(&input.first_name)
        .bind(&input.patronymic)
        .bind(&name)
        .bind(&input.company)
        .bind(&input.phone)
        .bind(&input.telegram)
        .bind(&input.instagram)
        .bind(&input.email)
        .bind(&input.city)
        .bind(&input.address)
        .bind(&input.comments)
        .bind(&input.social_link)
        .bind(&input.acquisition_source)
        .bind(input.manager_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_foreign_key(e, MANAGER_NOT_FOUND))?;

        audit::record(
            &mut tx,
            Some(actor),
            "Client created",
            "client",
            Some(id.as_uuid()),
            json!({ "name": name }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Replace every editable field of a client.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client doesn't exist.
    /// Returns `RepositoryError::InvalidReference` if the manager doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: ClientId,
        input: &ClientInput,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let name = merch_crm_core::full_name(
            &input.last_name,
            &input.first_name,
            input.patronymic.as_deref(),
        );
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE crm.clients
            SET client_type = $2, last_name = $3, first_name = $4, patronymic = $5, name = $6,
                company = $7, phone = $8, telegram = $9, instagram = $10, email = $11,
                city = $12, address = $13, comments = $14, social_link = $15,
                acquisition_source = $16, manager_id = $17
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(input.client_type)
        .bind(&input.last_name)
        .bind(&input.first_name)
        .bind(&input.patronymic)
        .bind(&name)
        .bind(&input.company)
        .bind(&input.phone)
        .bind(&input.telegram)
        .bind(&input.instagram)
        .bind(&input.email)
        .bind(&input.city)
        .bind(&input.address)
        .bind(&input.comments)
        .bind(&input.social_link)
        .bind(&input.acquisition_source)
        .bind(input.manager_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_foreign_key(e, MANAGER_NOT_FOUND))?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Client updated",
            "client",
            Some(id.as_uuid()),
            json!({ "name": name }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace the free-text comments.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_comments(
        &self,
        id: ClientId,
        comments: Option<&str>,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        self.update_field(id, ClientField::Comments, comments, actor)
            .await
    }

    /// Set one whitelisted field; `None` stores NULL.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client doesn't exist.
    /// Returns `RepositoryError::InvalidReference` if the manager doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails, including a
    /// value that does not cast to the column type.
    pub async fn update_field(
        &self,
        id: ClientId,
        field: ClientField,
        value: Option<&str>,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let cast = match field {
            ClientField::ManagerId => "::uuid",
            ClientField::ClientType => "::crm.client_type",
            _ => "",
        };
        let column = field.column();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(&format!(
            "UPDATE crm.clients SET {column} = $2{cast} WHERE id = $1"
        ))
        .bind(id)
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_foreign_key(e, MANAGER_NOT_FOUND))?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Client field updated",
            "client",
            Some(id.as_uuid()),
            json!({ "field": column, "value": value }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Archive or restore clients; one audit entry for the batch.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_archived(
        &self,
        ids: &[ClientId],
        archived: bool,
        actor: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE crm.clients SET is_archived = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(archived)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        audit::record(
            &mut tx,
            Some(actor),
            if archived { "Client archived" } else { "Client restored" },
            "client",
            single_id(ids),
            json!({ "ids": ids, "count": updated }),
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Reassign clients to a manager (or none).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InvalidReference` if the manager doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_manager(
        &self,
        ids: &[ClientId],
        manager_id: Option<UserId>,
        actor: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE crm.clients SET manager_id = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(manager_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::on_foreign_key(e, MANAGER_NOT_FOUND))?
            .rows_affected();

        audit::record(
            &mut tx,
            Some(actor),
            "Client manager changed",
            "client",
            single_id(ids),
            json!({ "ids": ids, "manager_id": manager_id, "count": updated }),
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Delete clients with their orders, releasing stock those orders hold.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, ids: &[ClientId], actor: UserId) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (item_id, quantity) in orders::reserved_lines_for_clients(&mut tx, ids).await? {
            inventory::release_reservation(&mut tx, item_id, quantity).await?;
        }

        sqlx::query("DELETE FROM crm.orders WHERE client_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM crm.clients WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        audit::record(
            &mut tx,
            Some(actor),
            "Client deleted",
            "client",
            single_id(ids),
            json!({ "ids": ids, "count": deleted }),
        )
        .await?;

        tx.commit().await?;
        Ok(deleted)
    }
}

/// The entity id for a batch audit entry: set only when the batch has one element.
fn single_id(ids: &[ClientId]) -> Option<uuid::Uuid> {
    match ids {
        [id] => Some(id.as_uuid()),
        _ => None,
    }
}
