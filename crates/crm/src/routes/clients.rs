//! Client base route handlers.
//!
//! List with search and filters, the client card, create/edit forms, inline
//! field edits, archive and bulk actions, and a JSON duplicate check used
//! while typing into the create form.

use std::collections::HashMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::{Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use merch_crm_core::{ClientId, ClientType, UserId};

use crate::db::{self, AuditRepository, ClientRepository, OrderRepository, UserRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{
    ClientDetails, ClientDuplicate, ClientField, ClientFilter, ClientInput, ClientListRow,
    ClientSort, ClientStats, UserOption,
};
use crate::routes::{
    ActionResult, Flash, Layout, checkbox, parse_enum, parse_id, redirect_with, require_admin,
    selected_ids, text, with_flash,
};
use crate::state::AppState;

/// Orders shown on the client card.
const CARD_ORDERS: i64 = 100;

/// Audit entries shown on the client card.
const CARD_ACTIVITY: i64 = 20;

/// Build the clients router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clients", get(index).post(create))
        .route("/clients/bulk", post(bulk))
        .route("/clients/{id}", get(show))
        .route("/clients/{id}/edit", post(update))
        .route("/clients/{id}/comments", post(update_comments))
        .route("/clients/{id}/field", post(update_field))
        .route("/clients/{id}/archive", post(archive))
        .route("/clients/{id}/delete", post(delete))
        .route("/api/clients/duplicates", get(duplicates))
}

// =============================================================================
// List
// =============================================================================

/// Client list query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientListQuery {
    pub q: Option<String>,
    pub client_type: Option<String>,
    pub manager_id: Option<String>,
    pub city: Option<String>,
    pub archived: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

impl ClientListQuery {
    fn to_filter(&self) -> ClientFilter {
        ClientFilter {
            search: text(self.q.as_ref()),
            client_type: self
                .client_type
                .as_deref()
                .and_then(|t| t.parse::<ClientType>().ok()),
            manager_id: self
                .manager_id
                .as_deref()
                .and_then(|id| id.parse::<UserId>().ok()),
            city: text(self.city.as_ref()),
            archived: checkbox(self.archived.as_ref()),
            sort: match self.sort.as_deref() {
                Some("created_at") => ClientSort::CreatedAt,
                Some("total_spent") => ClientSort::TotalSpent,
                _ => ClientSort::Name,
            },
            page: self
                .page
                .as_deref()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1)
                .max(1),
        }
    }

    /// Query string for a page link, keeping the current filters.
    #[must_use]
    pub fn page_link(&self, page: u32) -> String {
        let pairs = [
            ("q", self.q.as_deref()),
            ("client_type", self.client_type.as_deref()),
            ("manager_id", self.manager_id.as_deref()),
            ("city", self.city.as_deref()),
            ("archived", self.archived.as_deref()),
            ("sort", self.sort.as_deref()),
        ];
        let mut link = format!("/clients?page={page}");
        for (key, value) in pairs {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                link.push_str(&format!("&{key}={}", urlencoding::encode(value)));
            }
        }
        link
    }

    /// Current value of a filter, or "".
    #[must_use]
    pub fn value(&self, key: &str) -> &str {
        let value = match key {
            "q" => self.q.as_deref(),
            "client_type" => self.client_type.as_deref(),
            "manager_id" => self.manager_id.as_deref(),
            "city" => self.city.as_deref(),
            "sort" => self.sort.as_deref(),
            _ => None,
        };
        value.unwrap_or_default()
    }
}

/// Client list page template.
#[derive(Template, WebTemplate)]
#[template(path = "clients/index.html")]
pub struct ClientsIndexTemplate {
    pub layout: Layout,
    pub clients: Vec<ClientListRow>,
    pub total: i64,
    pub page: u32,
    pub total_pages: i64,
    pub query: ClientListQuery,
    pub archived: bool,
    pub stats: ClientStats,
    pub managers: Vec<UserOption>,
    pub cities: Vec<String>,
    pub client_types: &'static [ClientType],
}

/// Client list page handler.
#[instrument(skip(user, state))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(query): Query<ClientListQuery>,
) -> Result<ClientsIndexTemplate, AppError> {
    let filter = query.to_filter();
    let repo = ClientRepository::new(state.pool());

    let (mut clients, total) = repo.list(&filter).await?;
    if user.hides_client_contacts() {
        clients.iter_mut().for_each(ClientListRow::hide_contacts);
    }

    Ok(ClientsIndexTemplate {
        layout: Layout::new(&state, &user, "/clients", flash).await,
        clients,
        total,
        page: filter.page,
        total_pages: db::total_pages(total, db::PAGE_SIZE),
        archived: filter.archived,
        query,
        stats: repo.stats().await?,
        managers: UserRepository::new(state.pool()).options().await?,
        cities: repo.cities().await?,
        client_types: ClientType::ALL,
    })
}

// =============================================================================
// Card
// =============================================================================

/// Client card template.
#[derive(Template, WebTemplate)]
#[template(path = "clients/show.html")]
pub struct ClientShowTemplate {
    pub layout: Layout,
    pub details: ClientDetails,
    pub managers: Vec<UserOption>,
    pub client_types: &'static [ClientType],
}

/// Client card handler.
#[instrument(skip(user, state))]
pub async fn show(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
    Query(flash): Query<Flash>,
) -> Result<ClientShowTemplate, AppError> {
    let repo = ClientRepository::new(state.pool());
    let mut client = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Client not found".to_string()))?;

    let mut orders = OrderRepository::new(state.pool())
        .for_client(id, CARD_ORDERS)
        .await?;
    if user.hides_client_contacts() {
        client.hide_contacts();
        orders.iter_mut().for_each(|o| o.hide_contacts());
    }

    let details = ClientDetails {
        client,
        orders,
        totals: repo.totals(id).await?,
        activity: AuditRepository::new(state.pool())
            .for_entity("client", id.as_uuid(), CARD_ACTIVITY)
            .await?,
    };

    Ok(ClientShowTemplate {
        layout: Layout::new(&state, &user, "/clients", flash).await,
        details,
        managers: UserRepository::new(state.pool()).options().await?,
        client_types: ClientType::ALL,
    })
}

// =============================================================================
// Create / Update
// =============================================================================

/// Client create and edit form.
#[derive(Debug, Deserialize)]
pub struct ClientForm {
    pub client_type: String,
    pub last_name: String,
    pub first_name: String,
    pub patronymic: Option<String>,
    pub company: Option<String>,
    pub phone: String,
    pub telegram: Option<String>,
    pub instagram: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub comments: Option<String>,
    pub social_link: Option<String>,
    pub acquisition_source: Option<String>,
    pub manager_id: Option<String>,
    pub ignore_duplicates: Option<String>,
}

impl ClientForm {
    /// Validate the form into repository input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` when a required field is blank or a
    /// select holds an unknown value.
    pub fn to_input(&self) -> Result<ClientInput, AppError> {
        let required = |label: &str, value: &str| {
            let value = value.trim();
            if value.is_empty() {
                Err(AppError::BadRequest(format!("{label} is required")))
            } else {
                Ok(value.to_owned())
            }
        };

        Ok(ClientInput {
            client_type: parse_enum("client type", &self.client_type)?,
            last_name: required("Last name", &self.last_name)?,
            first_name: required("First name", &self.first_name)?,
            patronymic: text(self.patronymic.as_ref()),
            company: text(self.company.as_ref()),
            phone: required("Phone", &self.phone)?,
            telegram: text(self.telegram.as_ref()),
            instagram: text(self.instagram.as_ref()),
            email: text(self.email.as_ref()),
            city: text(self.city.as_ref()),
            address: text(self.address.as_ref()),
            comments: text(self.comments.as_ref()),
            social_link: text(self.social_link.as_ref()),
            acquisition_source: text(self.acquisition_source.as_ref()),
            manager_id: parse_id("manager", self.manager_id.as_deref())?,
        })
    }
}

/// Describe possible duplicates for a flash message.
fn duplicates_message(duplicates: &[ClientDuplicate]) -> String {
    let names: Vec<&str> = duplicates.iter().map(|d| d.name.as_str()).collect();
    format!(
        "Possible duplicates: {}. Tick \"Create anyway\" to add the client.",
        names.join(", ")
    )
}

/// Create a client, refusing likely duplicates unless told to ignore them.
#[instrument(skip(user, state, form))]
pub async fn create(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<ClientForm>,
) -> Result<Redirect, AppError> {
    let input = match form.to_input() {
        Ok(input) => input,
        Err(e) => return redirect_with("/clients", Err(e)),
    };
    let repo = ClientRepository::new(state.pool());

    if !checkbox(form.ignore_duplicates.as_ref()) {
        let duplicates = repo
            .find_duplicates(
                Some(&input.phone),
                input.email.as_deref(),
                Some(&input.last_name),
                Some(&input.first_name),
            )
            .await?;
        if !duplicates.is_empty() {
            return Ok(Redirect::to(&with_flash(
                "/clients",
                "error",
                &duplicates_message(&duplicates),
            )));
        }
    }

    let id = repo.create(&input, user.id).await?;
    Ok(Redirect::to(&with_flash(
        &format!("/clients/{id}"),
        "success",
        "Client added",
    )))
}

/// Update a client from the edit form.
#[instrument(skip(user, state, form))]
pub async fn update(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
    Form(form): Form<ClientForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        ClientRepository::new(state.pool())
            .update(id, &input, user.id)
            .await?;
        Ok::<_, AppError>("Client updated".to_string())
    }
    .await;

    redirect_with(&format!("/clients/{id}"), outcome)
}

/// Comments form.
#[derive(Debug, Deserialize)]
pub struct CommentsForm {
    pub comments: Option<String>,
}

/// Replace the client's comments.
#[instrument(skip(user, state, form))]
pub async fn update_comments(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
    Form(form): Form<CommentsForm>,
) -> Result<Redirect, AppError> {
    let comments = text(form.comments.as_ref());
    let outcome = ClientRepository::new(state.pool())
        .update_comments(id, comments.as_deref(), user.id)
        .await
        .map(|()| "Comments saved".to_string())
        .map_err(AppError::from);

    redirect_with(&format!("/clients/{id}"), outcome)
}

/// Inline single-field edit.
#[derive(Debug, Deserialize)]
pub struct FieldForm {
    pub field: String,
    pub value: Option<String>,
}

/// Check a value against the column type before it reaches SQL.
fn validate_field_value(field: ClientField, value: Option<&str>) -> Result<(), AppError> {
    match (field, value) {
        (ClientField::Phone, None) => Err(AppError::BadRequest("Phone is required".to_string())),
        (ClientField::ClientType, None) => {
            Err(AppError::BadRequest("Client type is required".to_string()))
        }
        (ClientField::ClientType, Some(v)) => parse_enum::<ClientType>("client type", v).map(drop),
        (ClientField::ManagerId, v) => parse_id::<UserId>("manager", v).map(drop),
        _ => Ok(()),
    }
}

/// Update one whitelisted client field; empty values store NULL.
#[instrument(skip(user, state, form))]
pub async fn update_field(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
    Form(form): Form<FieldForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let field: ClientField = form.field.parse().map_err(AppError::BadRequest)?;
        let value = text(form.value.as_ref());
        validate_field_value(field, value.as_deref())?;
        ClientRepository::new(state.pool())
            .update_field(id, field, value.as_deref(), user.id)
            .await?;
        Ok::<_, AppError>("Client updated".to_string())
    }
    .await;

    redirect_with(&format!("/clients/{id}"), outcome)
}

/// Archive toggle form.
#[derive(Debug, Deserialize)]
pub struct ArchiveForm {
    pub archived: Option<String>,
}

/// Archive or restore one client.
#[instrument(skip(user, state, form))]
pub async fn archive(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
    Form(form): Form<ArchiveForm>,
) -> Result<Redirect, AppError> {
    let archived = checkbox(form.archived.as_ref());
    ClientRepository::new(state.pool())
        .set_archived(&[id], archived, user.id)
        .await?;

    let message = if archived {
        "Client archived"
    } else {
        "Client restored"
    };
    Ok(Redirect::to(&with_flash(
        &format!("/clients/{id}"),
        "success",
        message,
    )))
}

/// Delete a client with their orders. Admin only.
#[instrument(skip(user, state))]
pub async fn delete(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
) -> Result<Redirect, AppError> {
    if let Err(e) = require_admin(&user) {
        return redirect_with(&format!("/clients/{id}"), Err(e));
    }

    ClientRepository::new(state.pool())
        .delete(&[id], user.id)
        .await?;
    Ok(Redirect::to(&with_flash(
        "/clients",
        "success",
        "Client deleted",
    )))
}

// =============================================================================
// Bulk actions
// =============================================================================

/// Apply a bulk action to the selected clients.
///
/// Form fields: `action` (delete, archive, unarchive, manager), the selected
/// ids, and `manager_id` for the manager action.
#[instrument(skip(user, state, form))]
pub async fn bulk(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let ids: Vec<ClientId> = selected_ids(&form);
        if ids.is_empty() {
            return Err(AppError::BadRequest("No clients selected".to_string()));
        }
        let repo = ClientRepository::new(state.pool());

        let message = match form.get("action").map(String::as_str) {
            Some("delete") => {
                require_admin(&user)?;
                let n = repo.delete(&ids, user.id).await?;
                format!("Deleted clients: {n}")
            }
            Some("archive") => {
                let n = repo.set_archived(&ids, true, user.id).await?;
                format!("Archived clients: {n}")
            }
            Some("unarchive") => {
                let n = repo.set_archived(&ids, false, user.id).await?;
                format!("Restored clients: {n}")
            }
            Some("manager") => {
                let manager_id = form.get("manager_id").map(String::as_str);
                let manager = parse_id::<UserId>("manager", manager_id)?;
                let n = repo.update_manager(&ids, manager, user.id).await?;
                format!("Manager changed for clients: {n}")
            }
            _ => return Err(AppError::BadRequest("Unknown bulk action".to_string())),
        };
        Ok::<_, AppError>(message)
    }
    .await;

    redirect_with("/clients", outcome)
}

// =============================================================================
// JSON
// =============================================================================

/// Duplicate check query parameters.
#[derive(Debug, Deserialize)]
pub struct DuplicatesQuery {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
}

/// Possible duplicates for the values typed so far.
///
/// GET /api/clients/duplicates
#[instrument(skip(user, state))]
pub async fn duplicates(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<DuplicatesQuery>,
) -> Response {
    let outcome = ClientRepository::new(state.pool())
        .find_duplicates(
            query.phone.as_deref(),
            query.email.as_deref(),
            query.last_name.as_deref(),
            query.first_name.as_deref(),
        )
        .await
        .map(|mut found| {
            if user.hides_client_contacts() {
                found.iter_mut().for_each(ClientDuplicate::hide_contacts);
            }
            found
        })
        .map_err(AppError::from);

    ActionResult::respond(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> ClientForm {
        ClientForm {
            client_type: "b2c".to_string(),
            last_name: " Petrova ".to_string(),
            first_name: "Anna".to_string(),
            patronymic: Some(String::new()),
            company: None,
            phone: "+7 912 000-11-22".to_string(),
            telegram: None,
            instagram: None,
            email: Some("anna@example.com".to_string()),
            city: Some("  ".to_string()),
            address: None,
            comments: None,
            social_link: None,
            acquisition_source: None,
            manager_id: Some(String::new()),
            ignore_duplicates: None,
        }
    }

    #[test]
    fn test_form_to_input_trims_and_nulls_blanks() {
        let input = form().to_input().unwrap();
        assert_eq!(input.last_name, "Petrova");
        assert_eq!(input.client_type, ClientType::B2c);
        assert_eq!(input.patronymic, None);
        assert_eq!(input.city, None);
        assert_eq!(input.manager_id, None);
    }

    #[test]
    fn test_form_requires_phone_and_names() {
        let mut f = form();
        f.phone = " ".to_string();
        assert_eq!(
            f.to_input().unwrap_err().user_message(),
            "Phone is required"
        );

        let mut f = form();
        f.first_name = String::new();
        assert!(f.to_input().is_err());

        let mut f = form();
        f.client_type = "vip".to_string();
        assert!(f.to_input().is_err());
    }

    #[test]
    fn test_validate_field_value() {
        assert!(validate_field_value(ClientField::City, None).is_ok());
        assert!(validate_field_value(ClientField::Phone, None).is_err());
        assert!(validate_field_value(ClientField::ClientType, Some("b2b")).is_ok());
        assert!(validate_field_value(ClientField::ClientType, Some("x")).is_err());
        assert!(validate_field_value(ClientField::ManagerId, Some("not-an-id")).is_err());
        assert!(validate_field_value(ClientField::ManagerId, None).is_ok());
    }

    #[test]
    fn test_page_link_keeps_filters() {
        let query = ClientListQuery {
            q: Some("ivan ov".to_string()),
            city: Some(String::new()),
            sort: Some("total_spent".to_string()),
            ..ClientListQuery::default()
        };
        assert_eq!(
            query.page_link(3),
            "/clients?page=3&q=ivan%20ov&sort=total_spent"
        );
        assert_eq!(query.to_filter().sort, ClientSort::TotalSpent);
        assert_eq!(query.to_filter().page, 1);
    }
}
