//! Command palette search across clients, orders and items.

use serde::Serialize;
use sqlx::PgPool;

use merch_crm_core::{ClientId, InventoryItemId, OrderId, OrderStatus};

use super::{RepositoryError, like_pattern};

/// Results per entity type.
const HITS_PER_KIND: i64 = 5;

/// Shortest query that is searched.
pub const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientHit {
    pub id: ClientId,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderHit {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub client_name: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ItemHit {
    pub id: InventoryItemId,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
}

/// Grouped search results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub clients: Vec<ClientHit>,
    pub orders: Vec<OrderHit>,
    pub items: Vec<ItemHit>,
}

/// Search clients by name or phone, orders by number and items by name or SKU.
///
/// Queries shorter than [`MIN_QUERY_LEN`] characters return nothing.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn global_search(pool: &PgPool, query: &str) -> Result<SearchResults, RepositoryError> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return Ok(SearchResults::default());
    }
    let pattern = like_pattern(Some(query));

    let clients = sqlx::query_as::<_, ClientHit>(
        r"
        SELECT id, name, phone FROM crm.clients
        WHERE NOT is_archived AND (name ILIKE $1 OR phone ILIKE $1)
        ORDER BY name
        LIMIT $2
        ",
    )
    .bind(&pattern)
    .bind(HITS_PER_KIND)
    .fetch_all(pool)
    .await?;

    let orders = sqlx::query_as::<_, OrderHit>(
        r"
        SELECT o.id, o.order_number, o.status, c.name AS client_name
        FROM crm.orders o
        JOIN crm.clients c ON c.id = o.client_id
        WHERE o.order_number ILIKE $1
        ORDER BY o.created_at DESC
        LIMIT $2
        ",
    )
    .bind(&pattern)
    .bind(HITS_PER_KIND)
    .fetch_all(pool)
    .await?;

    let items = sqlx::query_as::<_, ItemHit>(
        r"
        SELECT id, name, sku, quantity FROM crm.inventory_items
        WHERE NOT is_archived AND (name ILIKE $1 OR sku ILIKE $1)
        ORDER BY name
        LIMIT $2
        ",
    )
    .bind(&pattern)
    .bind(HITS_PER_KIND)
    .fetch_all(pool)
    .await?;

    Ok(SearchResults {
        clients,
        orders,
        items,
    })
}
