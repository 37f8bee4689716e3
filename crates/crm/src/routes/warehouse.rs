//! Warehouse route handlers.
//!
//! Items with stock per location, manual adjustments and transfers, bulk
//! actions, categories, storage locations and the stock ledger.

use std::collections::HashMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::Redirect,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::instrument;
use uuid::Uuid;

use merch_crm_core::{
    CategoryId, InventoryItemId, InventoryItemType, MeasurementUnit, StorageLocationId,
    StorageLocationType, UserId,
};

use crate::db::{self, CategoryRepository, InventoryRepository, LocationRepository, UserRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{
    AdjustKind, Category, CategoryInput, InventoryItem, InventoryTransaction, ItemDetails,
    ItemFilter, ItemInput, LocationInput, StockAdjustment, StockTransfer, StorageLocation,
    UserOption, WarehouseStats,
};
use crate::routes::{
    Flash, Layout, checkbox, parse_enum, parse_id, parse_int, parse_optional_amount,
    redirect_with, require_admin, require_id, require_management, selected_ids, text, with_flash,
};
use crate::services::{InitialStock, StockService};
use crate::state::AppState;

/// Ledger entries on the history page.
const HISTORY_LIMIT: i64 = 200;

/// Build the warehouse router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/warehouse", get(index))
        .route("/warehouse/items", post(create_item))
        .route("/warehouse/items/bulk", post(bulk))
        .route("/warehouse/items/{id}", get(show_item))
        .route("/warehouse/items/{id}/edit", post(update_item))
        .route("/warehouse/items/{id}/adjust", post(adjust))
        .route("/warehouse/items/{id}/transfer", post(transfer))
        .route("/warehouse/auto-archive", post(auto_archive))
        .route("/warehouse/history", get(history))
        .route("/warehouse/categories", get(categories).post(create_category))
        .route("/warehouse/categories/reorder", post(reorder_categories))
        .route("/warehouse/categories/{id}/edit", post(update_category))
        .route("/warehouse/categories/{id}/delete", post(delete_category))
        .route("/warehouse/locations", get(locations).post(create_location))
        .route("/warehouse/locations/reorder", post(reorder_locations))
        .route("/warehouse/locations/{id}/edit", post(update_location))
        .route("/warehouse/locations/{id}/delete", post(delete_location))
}

// =============================================================================
// Items
// =============================================================================

/// Item list query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemListQuery {
    pub q: Option<String>,
    pub category_id: Option<String>,
    pub archived: Option<String>,
    pub low_stock: Option<String>,
    pub page: Option<String>,
}

impl ItemListQuery {
    fn to_filter(&self) -> ItemFilter {
        ItemFilter {
            search: text(self.q.as_ref()),
            category_id: self
                .category_id
                .as_deref()
                .and_then(|id| id.parse::<CategoryId>().ok()),
            archived: checkbox(self.archived.as_ref()),
            low_stock_only: checkbox(self.low_stock.as_ref()),
            page: self
                .page
                .as_deref()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1)
                .max(1),
        }
    }

    /// Link to another page with the same filters.
    #[must_use]
    pub fn page_link(&self, page: u32) -> String {
        let mut link = format!("/warehouse?page={page}");
        for (key, value) in [
            ("q", &self.q),
            ("category_id", &self.category_id),
            ("archived", &self.archived),
            ("low_stock", &self.low_stock),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                link.push_str(&format!("&{key}={}", urlencoding::encode(value)));
            }
        }
        link
    }

    /// Current search text, or "".
    #[must_use]
    pub fn search(&self) -> &str {
        self.q.as_deref().unwrap_or_default()
    }

    /// Current category filter, or "".
    #[must_use]
    pub fn category(&self) -> &str {
        self.category_id.as_deref().unwrap_or_default()
    }
}

/// Warehouse overview template.
#[derive(Template, WebTemplate)]
#[template(path = "warehouse/index.html")]
pub struct WarehouseIndexTemplate {
    pub layout: Layout,
    pub items: Vec<InventoryItem>,
    pub total: i64,
    pub page: u32,
    pub total_pages: i64,
    pub archived: bool,
    pub low_stock_only: bool,
    pub query: ItemListQuery,
    pub stats: WarehouseStats,
    pub categories: Vec<Category>,
    pub locations: Vec<StorageLocation>,
    pub item_types: &'static [InventoryItemType],
    pub units: &'static [MeasurementUnit],
}

/// Warehouse overview handler.
#[instrument(skip(user, state))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(query): Query<ItemListQuery>,
) -> Result<WarehouseIndexTemplate, AppError> {
    let filter = query.to_filter();
    let repo = InventoryRepository::new(state.pool());
    let (items, total) = repo.list(&filter).await?;

    Ok(WarehouseIndexTemplate {
        layout: Layout::new(&state, &user, "/warehouse", flash).await,
        items,
        total,
        page: filter.page,
        total_pages: db::total_pages(total, db::PAGE_SIZE),
        archived: filter.archived,
        low_stock_only: filter.low_stock_only,
        query,
        stats: repo.stats().await?,
        categories: CategoryRepository::new(state.pool()).list().await?,
        locations: LocationRepository::new(state.pool()).list().await?,
        item_types: InventoryItemType::ALL,
        units: MeasurementUnit::ALL,
    })
}

/// Item card template.
#[derive(Template, WebTemplate)]
#[template(path = "warehouse/item.html")]
pub struct ItemTemplate {
    pub layout: Layout,
    pub details: ItemDetails,
    pub category_path: String,
    pub attributes: String,
    pub categories: Vec<Category>,
    pub locations: Vec<StorageLocation>,
    pub item_types: &'static [InventoryItemType],
    pub units: &'static [MeasurementUnit],
}

/// Item card handler.
#[instrument(skip(user, state))]
pub async fn show_item(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<InventoryItemId>,
    Query(flash): Query<Flash>,
) -> Result<ItemTemplate, AppError> {
    let details = InventoryRepository::new(state.pool())
        .details(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;

    let categories = CategoryRepository::new(state.pool());
    let category_path = match details.item.category_id {
        Some(category) => categories.path(category).await?,
        None => String::new(),
    };

    Ok(ItemTemplate {
        layout: Layout::new(&state, &user, "/warehouse", flash).await,
        attributes: format_attributes(&details.item.attributes),
        details,
        category_path,
        categories: categories.list().await?,
        locations: LocationRepository::new(state.pool()).list().await?,
        item_types: InventoryItemType::ALL,
        units: MeasurementUnit::ALL,
    })
}

/// Item create and edit form.
#[derive(Debug, Deserialize)]
pub struct ItemForm {
    #[serde(default)]
    pub name: String,
    pub sku: Option<String>,
    pub category_id: Option<String>,
    pub item_type: String,
    pub unit: String,
    pub low_stock_threshold: Option<String>,
    pub critical_stock_threshold: Option<String>,
    pub description: Option<String>,
    pub cost_price: Option<String>,
    pub selling_price: Option<String>,
    /// One `key: value` pair per line.
    pub attributes: Option<String>,
    pub initial_quantity: Option<String>,
    pub initial_location_id: Option<String>,
}

impl ItemForm {
    /// Validate the form into repository input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for a blank name, unknown select
    /// values or malformed numbers.
    pub fn to_input(&self) -> Result<ItemInput, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Item name is required".to_string()));
        }

        Ok(ItemInput {
            name: name.to_owned(),
            sku: text(self.sku.as_ref()),
            category_id: parse_id("category", self.category_id.as_deref())?,
            item_type: parse_enum("item type", &self.item_type)?,
            unit: parse_enum("unit", &self.unit)?,
            low_stock_threshold: parse_int(
                "Low stock threshold",
                self.low_stock_threshold.as_deref(),
                10,
            )?,
            critical_stock_threshold: parse_int(
                "Critical stock threshold",
                self.critical_stock_threshold.as_deref(),
                0,
            )?,
            description: text(self.description.as_ref()),
            cost_price: parse_optional_amount("Cost price", self.cost_price.as_deref())?,
            selling_price: parse_optional_amount("Selling price", self.selling_price.as_deref())?,
            attributes: parse_attributes(self.attributes.as_deref().unwrap_or_default()),
        })
    }

    fn initial_stock(&self) -> Result<Option<InitialStock>, AppError> {
        let quantity = parse_int("Initial quantity", self.initial_quantity.as_deref(), 0)?;
        let location = parse_id::<StorageLocationId>(
            "location",
            self.initial_location_id.as_deref(),
        )?;
        Ok(location
            .filter(|_| quantity != 0)
            .map(|location_id| InitialStock {
                location_id,
                quantity,
            }))
    }
}

/// Parse `key: value` lines into a JSON object. Blank lines and lines
/// without a key are ignored.
fn parse_attributes(raw: &str) -> JsonValue {
    let mut map = Map::new();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':').or_else(|| line.split_once('=')) else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_owned(), JsonValue::String(value.trim().to_owned()));
    }
    JsonValue::Object(map)
}

/// Render an attributes object back into `key: value` lines.
fn format_attributes(attributes: &JsonValue) -> String {
    attributes
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| match v {
                    JsonValue::String(s) => format!("{k}: {s}"),
                    other => format!("{k}: {other}"),
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Create an item, with optional opening stock.
#[instrument(skip(user, state, form))]
pub async fn create_item(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<ItemForm>,
) -> Result<Redirect, AppError> {
    let created = async {
        let input = form.to_input()?;
        let initial = form.initial_stock()?;
        let id = StockService::new(state.pool())
            .create_item(&input, initial, user.id)
            .await?;
        Ok::<_, AppError>(id)
    }
    .await;

    match created {
        Ok(id) => Ok(Redirect::to(&with_flash(
            &format!("/warehouse/items/{id}"),
            "success",
            "Item created",
        ))),
        Err(e) => redirect_with("/warehouse", Err(e)),
    }
}

/// Update an item.
#[instrument(skip(user, state, form))]
pub async fn update_item(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<InventoryItemId>,
    Form(form): Form<ItemForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        let repo = InventoryRepository::new(state.pool());
        if repo
            .duplicate_exists(&input.name, input.sku.as_deref(), Some(id))
            .await?
        {
            return Err(AppError::Conflict(
                "Another item already uses this name or SKU".to_string(),
            ));
        }
        repo.update(id, &input, user.id).await?;
        Ok("Item updated".to_string())
    }
    .await;

    redirect_with(&format!("/warehouse/items/{id}"), outcome)
}

/// Stock adjustment form.
#[derive(Debug, Deserialize)]
pub struct AdjustForm {
    pub kind: String,
    pub amount: String,
    #[serde(default)]
    pub reason: String,
    pub location_id: Option<String>,
    pub cost_price: Option<String>,
}

/// Receive, issue or correct stock.
#[instrument(skip(user, state, form))]
pub async fn adjust(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<InventoryItemId>,
    Form(form): Form<AdjustForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let adjustment = StockAdjustment {
            item_id: id,
            amount: parse_int("Amount", Some(&form.amount), 0)?,
            kind: parse_enum::<AdjustKind>("adjustment type", &form.kind)?,
            reason: form.reason.trim().to_owned(),
            location_id: parse_id("location", form.location_id.as_deref())?,
            cost_price: parse_optional_amount("Cost price", form.cost_price.as_deref())?,
        };
        let quantity = StockService::new(state.pool())
            .adjust(&adjustment, user.id)
            .await?;
        Ok::<_, AppError>(format!("Stock updated, now {quantity}"))
    }
    .await;

    redirect_with(&format!("/warehouse/items/{id}"), outcome)
}

/// Transfer form.
#[derive(Debug, Deserialize)]
pub struct TransferForm {
    pub from_location_id: Option<String>,
    pub to_location_id: Option<String>,
    pub amount: String,
    #[serde(default)]
    pub reason: String,
}

/// Move stock between two locations.
#[instrument(skip(user, state, form))]
pub async fn transfer(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<InventoryItemId>,
    Form(form): Form<TransferForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let transfer = StockTransfer {
            item_id: id,
            from_location_id: require_id("Source location", form.from_location_id.as_deref())?,
            to_location_id: require_id("Destination location", form.to_location_id.as_deref())?,
            amount: parse_int("Amount", Some(&form.amount), 0)?,
            reason: form.reason.trim().to_owned(),
        };
        StockService::new(state.pool())
            .transfer(&transfer, user.id)
            .await?;
        Ok::<_, AppError>("Stock transferred".to_string())
    }
    .await;

    redirect_with(&format!("/warehouse/items/{id}"), outcome)
}

/// Apply a bulk action to the selected items.
///
/// Form fields: `action` (archive, restore, delete, move, category), the
/// selected ids, `reason`, `location_id` for move and `category_id` for category.
#[instrument(skip(user, state, form))]
pub async fn bulk(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let ids: Vec<InventoryItemId> = selected_ids(&form);
        if ids.is_empty() {
            return Err(AppError::BadRequest("No items selected".to_string()));
        }
        let get = |name: &str| form.get(name).map(String::as_str);
        let reason = get("reason").map(str::trim).unwrap_or_default();
        let repo = InventoryRepository::new(state.pool());

        let message = match get("action") {
            Some("archive") => {
                let reason = if reason.is_empty() { "Archived manually" } else { reason };
                let n = repo.archive(&ids, reason, Some(user.id)).await?;
                format!("Archived items: {n}")
            }
            Some("restore") => {
                let reason = if reason.is_empty() { "Restored manually" } else { reason };
                let n = repo.restore(&ids, reason, user.id).await?;
                format!("Restored items: {n}")
            }
            Some("delete") => {
                require_admin(&user)?;
                let n = repo.delete(&ids, user.id).await?;
                let skipped = (ids.len() as u64).saturating_sub(n);
                if skipped > 0 {
                    format!("Deleted items: {n}. {skipped} are used in orders and were kept")
                } else {
                    format!("Deleted items: {n}")
                }
            }
            Some("move") => {
                let to: StorageLocationId = require_id("Destination location", get("location_id"))?;
                let n = StockService::new(state.pool())
                    .bulk_move(&ids, to, reason, user.id)
                    .await?;
                format!("Moved items: {n}")
            }
            Some("category") => {
                let category = parse_id::<CategoryId>("category", get("category_id"))?;
                let n = repo.update_category(&ids, category, user.id).await?;
                format!("Category changed for items: {n}")
            }
            _ => return Err(AppError::BadRequest("Unknown bulk action".to_string())),
        };
        Ok(message)
    }
    .await;

    redirect_with("/warehouse", outcome)
}

/// Archive items that have been out of stock for months.
#[instrument(skip(_user, state))]
pub async fn auto_archive(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let outcome = StockService::new(state.pool())
        .auto_archive_stale()
        .await
        .map(|n| format!("Archived stale items: {n}"))
        .map_err(AppError::from);

    redirect_with("/warehouse", outcome)
}

/// Stock ledger template.
#[derive(Template, WebTemplate)]
#[template(path = "warehouse/history.html")]
pub struct HistoryTemplate {
    pub layout: Layout,
    pub history: Vec<InventoryTransaction>,
}

/// Stock ledger handler.
#[instrument(skip(user, state))]
pub async fn history(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<HistoryTemplate, AppError> {
    Ok(HistoryTemplate {
        history: InventoryRepository::new(state.pool())
            .history(None, HISTORY_LIMIT)
            .await?,
        layout: Layout::new(&state, &user, "/warehouse/history", flash).await,
    })
}

/// Read `order_<uuid>=N` fields into a sort order list.
fn parse_sort_order<T: From<Uuid>>(form: &HashMap<String, String>) -> Vec<(T, i32)> {
    let mut order: Vec<(Uuid, i32)> = form
        .iter()
        .filter_map(|(key, value)| {
            let id = Uuid::parse_str(key.strip_prefix("order_")?).ok()?;
            let position = value.trim().parse().ok()?;
            Some((id, position))
        })
        .collect();
    order.sort_by_key(|&(id, position)| (position, id));
    order.into_iter().map(|(id, p)| (T::from(id), p)).collect()
}

// =============================================================================
// Categories
// =============================================================================

/// Categories page template.
#[derive(Template, WebTemplate)]
#[template(path = "warehouse/categories.html")]
pub struct CategoriesTemplate {
    pub layout: Layout,
    pub categories: Vec<Category>,
    pub units: &'static [MeasurementUnit],
}

impl CategoriesTemplate {
    /// Name of a parent category, or "".
    #[must_use]
    pub fn parent_name(&self, parent: Option<&CategoryId>) -> &str {
        parent
            .and_then(|id| self.categories.iter().find(|c| c.id == *id))
            .map_or("", |c| c.name.as_str())
    }
}

/// Categories page handler.
#[instrument(skip(user, state))]
pub async fn categories(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<CategoriesTemplate, AppError> {
    Ok(CategoriesTemplate {
        categories: CategoryRepository::new(state.pool()).list().await?,
        layout: Layout::new(&state, &user, "/warehouse/categories", flash).await,
        units: MeasurementUnit::ALL,
    })
}

/// Category form.
#[derive(Debug, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub prefix: Option<String>,
    pub parent_id: Option<String>,
    pub default_unit: Option<String>,
    pub is_active: Option<String>,
}

impl CategoryForm {
    fn to_input(&self) -> Result<CategoryInput, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Category name is required".to_string()));
        }
        Ok(CategoryInput {
            name: name.to_owned(),
            description: text(self.description.as_ref()),
            icon: text(self.icon.as_ref()),
            color: text(self.color.as_ref()),
            prefix: text(self.prefix.as_ref()).map(|p| p.to_uppercase()),
            parent_id: parse_id("parent category", self.parent_id.as_deref())?,
            default_unit: self
                .default_unit
                .as_deref()
                .filter(|u| !u.is_empty())
                .map_or(Ok(MeasurementUnit::default()), |u| parse_enum("unit", u))?,
            is_active: self.is_active.is_none() || checkbox(self.is_active.as_ref()),
        })
    }
}

/// Create a category.
#[instrument(skip(user, state, form))]
pub async fn create_category(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<CategoryForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        CategoryRepository::new(state.pool())
            .create(&input, user.id)
            .await?;
        Ok::<_, AppError>(format!("Category {} created", input.name))
    }
    .await;

    redirect_with("/warehouse/categories", outcome)
}

/// Update a category.
#[instrument(skip(user, state, form))]
pub async fn update_category(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    Form(form): Form<CategoryForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        CategoryRepository::new(state.pool())
            .update(id, &input, user.id)
            .await?;
        Ok::<_, AppError>("Category updated".to_string())
    }
    .await;

    redirect_with("/warehouse/categories", outcome)
}

/// Delete an empty category. Admin or management only.
#[instrument(skip(user, state))]
pub async fn delete_category(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        require_management(&user)?;
        CategoryRepository::new(state.pool())
            .delete(id, user.id)
            .await?;
        Ok::<_, AppError>("Category deleted".to_string())
    }
    .await;

    redirect_with("/warehouse/categories", outcome)
}

/// Store a new category order from `order_<id>` fields.
#[instrument(skip(user, state, form))]
pub async fn reorder_categories(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let order = parse_sort_order::<CategoryId>(&form);
    let outcome = CategoryRepository::new(state.pool())
        .reorder(&order, user.id)
        .await
        .map(|()| "Order saved".to_string())
        .map_err(AppError::from);

    redirect_with("/warehouse/categories", outcome)
}

// =============================================================================
// Storage locations
// =============================================================================

/// Storage locations page template.
#[derive(Template, WebTemplate)]
#[template(path = "warehouse/locations.html")]
pub struct LocationsTemplate {
    pub layout: Layout,
    pub locations: Vec<StorageLocation>,
    pub users: Vec<UserOption>,
    pub kinds: &'static [StorageLocationType],
}

/// Storage locations page handler.
#[instrument(skip(user, state))]
pub async fn locations(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<LocationsTemplate, AppError> {
    Ok(LocationsTemplate {
        locations: LocationRepository::new(state.pool()).list().await?,
        users: UserRepository::new(state.pool()).options().await?,
        layout: Layout::new(&state, &user, "/warehouse/locations", flash).await,
        kinds: StorageLocationType::ALL,
    })
}

/// Storage location form.
#[derive(Debug, Deserialize)]
pub struct LocationForm {
    #[serde(default)]
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub responsible_user_id: Option<String>,
    pub kind: String,
    pub is_default: Option<String>,
    pub is_active: Option<String>,
}

impl LocationForm {
    fn to_input(&self) -> Result<LocationInput, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Location name is required".to_string()));
        }
        Ok(LocationInput {
            name: name.to_owned(),
            address: text(self.address.as_ref()),
            description: text(self.description.as_ref()),
            responsible_user_id: parse_id::<UserId>(
                "responsible user",
                self.responsible_user_id.as_deref(),
            )?,
            kind: parse_enum("location type", &self.kind)?,
            is_default: checkbox(self.is_default.as_ref()),
            is_active: self.is_active.is_none() || checkbox(self.is_active.as_ref()),
        })
    }
}

/// Create a storage location.
#[instrument(skip(user, state, form))]
pub async fn create_location(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<LocationForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        LocationRepository::new(state.pool())
            .create(&input, user.id)
            .await?;
        Ok::<_, AppError>(format!("Location {} created", input.name))
    }
    .await;

    redirect_with("/warehouse/locations", outcome)
}

/// Update a storage location.
#[instrument(skip(user, state, form))]
pub async fn update_location(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<StorageLocationId>,
    Form(form): Form<LocationForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        LocationRepository::new(state.pool())
            .update(id, &input, user.id)
            .await?;
        Ok::<_, AppError>("Location updated".to_string())
    }
    .await;

    redirect_with("/warehouse/locations", outcome)
}

/// Delete an empty, non-system location. Admin only.
#[instrument(skip(user, state))]
pub async fn delete_location(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<StorageLocationId>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        require_admin(&user)?;
        LocationRepository::new(state.pool())
            .delete(id, user.id)
            .await?;
        Ok::<_, AppError>("Location deleted".to_string())
    }
    .await;

    redirect_with("/warehouse/locations", outcome)
}

/// Store a new location order from `order_<id>` fields.
#[instrument(skip(user, state, form))]
pub async fn reorder_locations(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let order = parse_sort_order::<StorageLocationId>(&form);
    let outcome = LocationRepository::new(state.pool())
        .reorder(&order, user.id)
        .await
        .map(|()| "Order saved".to_string())
        .map_err(AppError::from);

    redirect_with("/warehouse/locations", outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use serde_json::json;

    fn item_form() -> ItemForm {
        ItemForm {
            name: " Basic tee ".to_string(),
            sku: Some(String::new()),
            category_id: None,
            item_type: "clothing".to_string(),
            unit: "pcs".to_string(),
            low_stock_threshold: Some(String::new()),
            critical_stock_threshold: Some("2".to_string()),
            description: None,
            cost_price: Some("250,5".to_string()),
            selling_price: None,
            attributes: Some("color: black\nsize=XL\n\n: orphan".to_string()),
            initial_quantity: Some("40".to_string()),
            initial_location_id: None,
        }
    }

    #[test]
    fn test_item_form_to_input() {
        let input = item_form().to_input().unwrap();
        assert_eq!(input.name, "Basic tee");
        assert_eq!(input.sku, None);
        assert_eq!(input.low_stock_threshold, 10);
        assert_eq!(input.critical_stock_threshold, 2);
        assert_eq!(input.cost_price, Some("250.5".parse().unwrap()));
        assert_eq!(input.attributes, json!({ "color": "black", "size": "XL" }));
    }

    #[test]
    fn test_initial_stock_needs_location() {
        let form = item_form();
        assert!(form.initial_stock().unwrap().is_none());

        let mut form = item_form();
        form.initial_location_id = Some(Uuid::new_v4().to_string());
        let stock = form.initial_stock().unwrap().unwrap();
        assert_eq!(stock.quantity, 40);
    }

    #[test]
    fn test_item_form_rejects_blank_name() {
        let mut form = item_form();
        form.name = "   ".to_string();
        assert_eq!(
            form.to_input().unwrap_err().user_message(),
            "Item name is required"
        );
    }

    #[test]
    fn test_format_attributes() {
        assert_eq!(
            format_attributes(&json!({ "color": "white", "weight": 180 })),
            "color: white\nweight: 180"
        );
        assert_eq!(format_attributes(&json!(null)), "");
    }

    #[test]
    fn test_parse_sort_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut form = HashMap::new();
        form.insert(format!("order_{a}"), "2".to_string());
        form.insert(format!("order_{b}"), "1".to_string());
        form.insert("order_bad".to_string(), "3".to_string());

        let order = parse_sort_order::<CategoryId>(&form);
        assert_eq!(order, vec![(CategoryId::new(b), 1), (CategoryId::new(a), 2)]);
    }

    #[test]
    fn test_category_form_uppercases_prefix() {
        let form = CategoryForm {
            name: "Hoodies".to_string(),
            description: None,
            icon: None,
            color: None,
            prefix: Some("hd".to_string()),
            parent_id: None,
            default_unit: None,
            is_active: None,
        };
        let input = form.to_input().unwrap();
        assert_eq!(input.prefix.as_deref(), Some("HD"));
        assert!(input.is_active);
        assert_eq!(input.default_unit, MeasurementUnit::Pcs);
    }
}
