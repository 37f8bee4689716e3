//! Admin panel route handlers.
//!
//! Every handler here takes [`RequireAdmin`], so non-administrators get 403
//! before any work is done.

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
use serde_json::Value as JsonValue;
use tracing::{instrument, warn};

use merch_crm_core::{DepartmentId, Email, RoleId, UserId};

use crate::db::{
    self, AuditRepository, DepartmentRepository, RoleRepository, SecurityRepository,
    UserRepository, audit::AUDIT_PAGE_SIZE,
};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::{
    AuditFilter, AuditLogEntry, Branding, Department, DepartmentInput, Role, RoleInput,
    SecurityEvent, SystemError, SystemSetting, SystemStats, User, UserInput, UserOption,
};
use crate::routes::{Flash, Layout, checkbox, parse_id, parse_int, redirect_with, text};
use crate::services::{AuthService, StorageService, storage::StorageEntry};
use crate::state::AppState;

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(overview))
        .route("/admin/branding", get(branding).post(update_branding))
        .route("/admin/roles", get(roles).post(create_role))
        .route("/admin/roles/{id}/edit", post(update_role))
        .route("/admin/roles/{id}/permissions", post(update_permissions))
        .route("/admin/roles/{id}/delete", post(delete_role))
        .route("/admin/departments", get(departments).post(create_department))
        .route("/admin/departments/{id}/edit", post(update_department))
        .route("/admin/departments/{id}/delete", post(delete_department))
        .route("/admin/users", get(users).post(create_user))
        .route("/admin/users/{id}/edit", post(update_user))
        .route("/admin/users/{id}/delete", post(delete_user))
        .route("/admin/audit", get(audit))
        .route("/admin/audit/clear", post(clear_audit))
        .route("/admin/security", get(security))
        .route("/admin/security/clear-errors", post(clear_errors))
        .route("/admin/security/clear-failed-logins", post(clear_failed_logins))
        .route("/admin/system", get(system).post(update_setting))
        .route("/admin/system/maintenance", post(toggle_maintenance))
        .route("/admin/storage", get(storage))
        .route("/admin/storage/folder", post(create_folder))
        .route("/admin/storage/delete", post(delete_files))
        .route("/admin/storage/rename", post(rename_file))
}

// =============================================================================
// Overview
// =============================================================================

/// Admin overview template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/index.html")]
pub struct OverviewTemplate {
    pub layout: Layout,
    pub stats: SystemStats,
    pub maintenance: bool,
    pub failed_logins: i64,
}

/// Admin overview: counters, database and storage size.
#[instrument(skip(user, state))]
pub async fn overview(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<OverviewTemplate, AppError> {
    let mut stats = db::settings::system_counts(state.pool()).await?;
    match state.storage().stats().await {
        Ok(storage) => {
            stats.storage_size_bytes = storage.total_size;
            stats.storage_files = storage.files;
        }
        Err(e) => warn!(error = %e, "Failed to measure storage"),
    }

    Ok(OverviewTemplate {
        maintenance: state.settings().maintenance_mode().await,
        failed_logins: SecurityRepository::new(state.pool())
            .recent_failed_logins()
            .await?,
        layout: Layout::new(&state, &user, "/admin", flash).await,
        stats,
    })
}

// =============================================================================
// Branding
// =============================================================================

/// Branding page template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/branding.html")]
pub struct BrandingTemplate {
    pub layout: Layout,
    pub form: Branding,
    pub extra: String,
}

/// Branding editor.
#[instrument(skip(user, state))]
pub async fn branding(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<BrandingTemplate, AppError> {
    let layout = Layout::new(&state, &user, "/admin/branding", flash).await;
    let form = layout.branding.clone();
    let extra = if form.extra.is_empty() {
        String::new()
    } else {
        serde_json::to_string_pretty(&form.extra).unwrap_or_default()
    };

    Ok(BrandingTemplate {
        layout,
        form,
        extra,
    })
}

/// Branding form.
#[derive(Debug, Deserialize)]
pub struct BrandingForm {
    #[serde(default)]
    pub company_name: String,
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
    #[serde(default)]
    pub primary_color: String,
    #[serde(default)]
    pub background_color: String,
    #[serde(default)]
    pub currency_symbol: String,
    pub radius_outer: Option<String>,
    pub radius_inner: Option<String>,
    #[serde(default)]
    pub login_slogan: String,
    #[serde(default)]
    pub dashboard_welcome: String,
    #[serde(default)]
    pub email_footer: String,
    #[serde(default)]
    pub email_signature: String,
    #[serde(default)]
    pub date_format: String,
    #[serde(default)]
    pub timezone: String,
    /// Extra UI preferences as a JSON object.
    pub extra: Option<String>,
}

impl BrandingForm {
    /// Apply the form over the current branding. Blank optional text keeps
    /// the current value.
    fn apply(self, current: Branding) -> Result<Branding, AppError> {
        let keep = |value: String, current: String| {
            let value = value.trim();
            if value.is_empty() {
                current
            } else {
                value.to_owned()
            }
        };
        let extra = match self.extra.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => serde_json::Map::new(),
            Some(raw) => match serde_json::from_str::<JsonValue>(raw) {
                Ok(JsonValue::Object(map)) => map,
                _ => {
                    return Err(AppError::BadRequest(
                        "Extra settings must be a JSON object".to_string(),
                    ));
                }
            },
        };

        Ok(Branding {
            company_name: self.company_name.trim().to_owned(),
            logo_url: text(self.logo_url.as_ref()),
            favicon_url: text(self.favicon_url.as_ref()),
            primary_color: self.primary_color.trim().to_lowercase(),
            background_color: self.background_color.trim().to_lowercase(),
            currency_symbol: keep(self.currency_symbol, current.currency_symbol),
            radius_outer: parse_int(
                "Outer radius",
                self.radius_outer.as_deref(),
                current.radius_outer,
            )?,
            radius_inner: parse_int(
                "Inner radius",
                self.radius_inner.as_deref(),
                current.radius_inner,
            )?,
            login_slogan: keep(self.login_slogan, current.login_slogan),
            dashboard_welcome: keep(self.dashboard_welcome, current.dashboard_welcome),
            email_footer: keep(self.email_footer, current.email_footer),
            email_signature: keep(self.email_signature, current.email_signature),
            date_format: keep(self.date_format, current.date_format),
            timezone: keep(self.timezone, current.timezone),
            extra,
        })
    }
}

/// Save branding.
#[instrument(skip(user, state, form))]
pub async fn update_branding(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<BrandingForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let settings = state.settings();
        let branding = form.apply(settings.branding().await)?;
        settings.update_branding(&branding, user.id).await?;
        Ok::<_, AppError>("Branding saved".to_string())
    }
    .await;

    redirect_with("/admin/branding", outcome)
}

// =============================================================================
// Roles and departments
// =============================================================================

/// Roles page template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/roles.html")]
pub struct RolesTemplate {
    pub layout: Layout,
    pub roles: Vec<Role>,
    pub departments: Vec<Department>,
}

impl RolesTemplate {
    /// Pretty-printed permission map for the editor.
    #[must_use]
    pub fn permissions_json(&self, role: &Role) -> String {
        serde_json::to_string_pretty(&role.permissions).unwrap_or_default()
    }
}

/// Roles page.
#[instrument(skip(user, state))]
pub async fn roles(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<RolesTemplate, AppError> {
    Ok(RolesTemplate {
        roles: RoleRepository::new(state.pool()).list().await?,
        departments: DepartmentRepository::new(state.pool()).list().await?,
        layout: Layout::new(&state, &user, "/admin/roles", flash).await,
    })
}

/// Role form.
#[derive(Debug, Deserialize)]
pub struct RoleForm {
    #[serde(default)]
    pub name: String,
    pub department_id: Option<String>,
    pub color: Option<String>,
}

impl RoleForm {
    fn to_input(&self) -> Result<RoleInput, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Role name is required".to_string()));
        }
        Ok(RoleInput {
            name: name.to_owned(),
            department_id: parse_id("department", self.department_id.as_deref())?,
            color: text(self.color.as_ref()),
        })
    }
}

/// Create a role.
#[instrument(skip(user, state, form))]
pub async fn create_role(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<RoleForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        RoleRepository::new(state.pool())
            .create(&input, user.id)
            .await?;
        Ok::<_, AppError>(format!("Role {} created", input.name))
    }
    .await;

    redirect_with("/admin/roles", outcome)
}

/// Update a role.
#[instrument(skip(user, state, form))]
pub async fn update_role(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
    Form(form): Form<RoleForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        RoleRepository::new(state.pool())
            .update(id, &input, user.id)
            .await?;
        Ok::<_, AppError>("Role updated".to_string())
    }
    .await;

    redirect_with("/admin/roles", outcome)
}

/// Permission editor form: a JSON object.
#[derive(Debug, Deserialize)]
pub struct PermissionsForm {
    #[serde(default)]
    pub permissions: String,
}

fn parse_permissions(raw: &str) -> Result<JsonValue, AppError> {
    match serde_json::from_str::<JsonValue>(raw.trim()) {
        Ok(value @ JsonValue::Object(_)) => Ok(value),
        _ => Err(AppError::BadRequest(
            "Permissions must be a JSON object".to_string(),
        )),
    }
}

/// Replace a role's permission map.
#[instrument(skip(user, state, form))]
pub async fn update_permissions(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
    Form(form): Form<PermissionsForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let permissions = parse_permissions(&form.permissions)?;
        RoleRepository::new(state.pool())
            .update_permissions(id, &permissions, user.id)
            .await?;
        Ok::<_, AppError>("Permissions saved".to_string())
    }
    .await;

    redirect_with("/admin/roles", outcome)
}

/// Delete a non-system role.
#[instrument(skip(user, state))]
pub async fn delete_role(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> Result<Redirect, AppError> {
    let outcome = RoleRepository::new(state.pool())
        .delete(id, user.id)
        .await
        .map(|()| "Role deleted".to_string())
        .map_err(AppError::from);

    redirect_with("/admin/roles", outcome)
}

/// Departments page template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/departments.html")]
pub struct DepartmentsTemplate {
    pub layout: Layout,
    pub departments: Vec<Department>,
}

/// Departments page.
#[instrument(skip(user, state))]
pub async fn departments(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<DepartmentsTemplate, AppError> {
    Ok(DepartmentsTemplate {
        departments: DepartmentRepository::new(state.pool()).list().await?,
        layout: Layout::new(&state, &user, "/admin/departments", flash).await,
    })
}

/// Department form.
#[derive(Debug, Deserialize)]
pub struct DepartmentForm {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<String>,
}

/// Badge color for departments created without one.
const DEFAULT_DEPARTMENT_COLOR: &str = "#64748b";

impl DepartmentForm {
    fn to_input(&self) -> Result<DepartmentInput, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest(
                "Department name is required".to_string(),
            ));
        }
        let color = text(self.color.as_ref()).unwrap_or_else(|| DEFAULT_DEPARTMENT_COLOR.to_owned());
        if !crate::models::settings::is_hex_color(&color) {
            return Err(AppError::BadRequest("Color must look like #rrggbb".to_string()));
        }
        Ok(DepartmentInput {
            name: name.to_owned(),
            description: text(self.description.as_ref()),
            color,
            is_active: self.is_active.is_none() || checkbox(self.is_active.as_ref()),
        })
    }
}

/// Create a department.
#[instrument(skip(user, state, form))]
pub async fn create_department(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<DepartmentForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        DepartmentRepository::new(state.pool())
            .create(&input, user.id)
            .await?;
        Ok::<_, AppError>(format!("Department {} created", input.name))
    }
    .await;

    redirect_with("/admin/departments", outcome)
}

/// Update a department.
#[instrument(skip(user, state, form))]
pub async fn update_department(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DepartmentId>,
    Form(form): Form<DepartmentForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        DepartmentRepository::new(state.pool())
            .update(id, &input, user.id)
            .await?;
        Ok::<_, AppError>("Department updated".to_string())
    }
    .await;

    redirect_with("/admin/departments", outcome)
}

/// Delete a non-system department.
#[instrument(skip(user, state))]
pub async fn delete_department(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DepartmentId>,
) -> Result<Redirect, AppError> {
    let outcome = DepartmentRepository::new(state.pool())
        .delete(id, user.id)
        .await
        .map(|()| "Department deleted".to_string())
        .map_err(AppError::from);

    redirect_with("/admin/departments", outcome)
}

// =============================================================================
// Users
// =============================================================================

/// Staff page template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/users.html")]
pub struct UsersTemplate {
    pub layout: Layout,
    pub users: Vec<User>,
    pub roles: Vec<Role>,
    pub departments: Vec<Department>,
}

/// Staff page.
#[instrument(skip(user, state))]
pub async fn users(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<UsersTemplate, AppError> {
    Ok(UsersTemplate {
        users: UserRepository::new(state.pool()).list().await?,
        roles: RoleRepository::new(state.pool()).list().await?,
        departments: DepartmentRepository::new(state.pool()).list().await?,
        layout: Layout::new(&state, &user, "/admin/users", flash).await,
    })
}

/// Staff form. The password is required on create and optional on edit.
#[derive(Debug, Deserialize)]
pub struct UserForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role_id: Option<String>,
    pub department_id: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

impl UserForm {
    fn to_input(&self) -> Result<UserInput, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Name is required".to_string()));
        }
        let email = Email::parse(&self.email)
            .map_err(|e| AppError::BadRequest(format!("Invalid email: {e}")))?;
        Ok(UserInput {
            name: name.to_owned(),
            email,
            role_id: parse_id("role", self.role_id.as_deref())?,
            department_id: parse_id("department", self.department_id.as_deref())?,
            phone: text(self.phone.as_ref()),
        })
    }
}

/// Create a staff account.
#[instrument(skip(user, state, form))]
pub async fn create_user(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<UserForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        let password = form.password.as_deref().unwrap_or_default();
        AuthService::new(state.pool())
            .create_user(&input, password, Some(user.id))
            .await?;
        Ok::<_, AppError>(format!("User {} created", input.name))
    }
    .await;

    redirect_with("/admin/users", outcome)
}

/// Update a staff account; a non-empty password resets it.
#[instrument(skip(user, state, form))]
pub async fn update_user(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Form(form): Form<UserForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let input = form.to_input()?;
        AuthService::new(state.pool())
            .update_user(id, &input, form.password.as_deref(), user.id)
            .await?;
        Ok::<_, AppError>("User updated".to_string())
    }
    .await;

    redirect_with("/admin/users", outcome)
}

/// Delete a staff account. Nobody can delete themselves.
#[instrument(skip(user, state))]
pub async fn delete_user(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Redirect, AppError> {
    let outcome = AuthService::new(state.pool())
        .delete_user(id, user.id)
        .await
        .map(|()| "User deleted".to_string())
        .map_err(AppError::from);

    redirect_with("/admin/users", outcome)
}

// =============================================================================
// Audit and security
// =============================================================================

/// Audit log query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub q: Option<String>,
    pub entity_type: Option<String>,
    pub user_id: Option<String>,
    pub page: Option<String>,
}

impl AuditQuery {
    fn to_filter(&self) -> AuditFilter {
        AuditFilter {
            search: text(self.q.as_ref()),
            entity_type: text(self.entity_type.as_ref()),
            user_id: self
                .user_id
                .as_deref()
                .and_then(|id| id.parse::<UserId>().ok()),
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
        let mut link = format!("/admin/audit?page={page}");
        for (key, value) in [
            ("q", &self.q),
            ("entity_type", &self.entity_type),
            ("user_id", &self.user_id),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                link.push_str(&format!("&{key}={}", urlencoding::encode(value)));
            }
        }
        link
    }

    /// Current value of a filter, or "".
    #[must_use]
    pub fn value(&self, key: &str) -> &str {
        match key {
            "q" => self.q.as_deref(),
            "entity_type" => self.entity_type.as_deref(),
            "user_id" => self.user_id.as_deref(),
            _ => None,
        }
        .unwrap_or_default()
    }
}

/// Audit log template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/audit.html")]
pub struct AuditTemplate {
    pub layout: Layout,
    pub entries: Vec<AuditLogEntry>,
    pub total: i64,
    pub page: u32,
    pub total_pages: i64,
    pub query: AuditQuery,
    pub entity_types: Vec<String>,
    pub users: Vec<UserOption>,
}

/// Audit log.
#[instrument(skip(user, state))]
pub async fn audit(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(query): Query<AuditQuery>,
) -> Result<AuditTemplate, AppError> {
    let filter = query.to_filter();
    let repo = AuditRepository::new(state.pool());
    let (entries, total) = repo.list(&filter).await?;

    Ok(AuditTemplate {
        layout: Layout::new(&state, &user, "/admin/audit", flash).await,
        entries,
        total,
        page: filter.page,
        total_pages: db::total_pages(total, AUDIT_PAGE_SIZE),
        query,
        entity_types: repo.entity_types().await?,
        users: UserRepository::new(state.pool()).options().await?,
    })
}

/// Wipe the audit log, leaving one entry behind.
#[instrument(skip(user, state))]
pub async fn clear_audit(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let outcome = AuditRepository::new(state.pool())
        .clear(user.id)
        .await
        .map(|n| format!("Audit log cleared, {n} entries removed"))
        .map_err(AppError::from);

    redirect_with("/admin/audit", outcome)
}

/// Security page query: one page number per table.
#[derive(Debug, Default, Deserialize)]
pub struct SecurityQuery {
    pub events_page: Option<u32>,
    pub errors_page: Option<u32>,
}

/// Security page template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/security.html")]
pub struct SecurityTemplate {
    pub layout: Layout,
    pub events: Vec<SecurityEvent>,
    pub events_page: u32,
    pub events_pages: i64,
    pub errors: Vec<SystemError>,
    pub errors_page: u32,
    pub errors_pages: i64,
    pub failed_logins: i64,
}

/// Security events and system errors.
#[instrument(skip(user, state))]
pub async fn security(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(query): Query<SecurityQuery>,
) -> Result<SecurityTemplate, AppError> {
    let repo = SecurityRepository::new(state.pool());
    let events_page = query.events_page.unwrap_or(1).max(1);
    let errors_page = query.errors_page.unwrap_or(1).max(1);
    let (events, events_total) = repo.events(events_page).await?;
    let (errors, errors_total) = repo.errors(errors_page).await?;

    Ok(SecurityTemplate {
        layout: Layout::new(&state, &user, "/admin/security", flash).await,
        events,
        events_page,
        events_pages: db::total_pages(events_total, db::PAGE_SIZE),
        errors,
        errors_page,
        errors_pages: db::total_pages(errors_total, db::PAGE_SIZE),
        failed_logins: repo.recent_failed_logins().await?,
    })
}

/// Delete every recorded system error.
#[instrument(skip(user, state))]
pub async fn clear_errors(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let outcome = SecurityRepository::new(state.pool())
        .clear_errors(user.id)
        .await
        .map(|n| format!("System errors cleared: {n}"))
        .map_err(AppError::from);

    redirect_with("/admin/security", outcome)
}

/// Delete failed login events.
#[instrument(skip(user, state))]
pub async fn clear_failed_logins(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let outcome = SecurityRepository::new(state.pool())
        .clear_failed_logins(user.id)
        .await
        .map(|n| format!("Failed logins cleared: {n}"))
        .map_err(AppError::from);

    redirect_with("/admin/security", outcome)
}

// =============================================================================
// System settings
// =============================================================================

/// System settings template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/system.html")]
pub struct SystemTemplate {
    pub layout: Layout,
    pub settings: Vec<SystemSetting>,
    pub maintenance: bool,
}

/// Raw settings table and the maintenance switch.
#[instrument(skip(user, state))]
pub async fn system(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<SystemTemplate, AppError> {
    let settings = state.settings();
    Ok(SystemTemplate {
        settings: settings.list().await?,
        maintenance: settings.maintenance_mode().await,
        layout: Layout::new(&state, &user, "/admin/system", flash).await,
    })
}

/// Setting form. The value is stored as JSON when it parses, otherwise as a string.
#[derive(Debug, Deserialize)]
pub struct SettingForm {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

fn setting_value(raw: &str) -> JsonValue {
    let raw = raw.trim();
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_owned()))
}

/// Store one system setting.
#[instrument(skip(user, state, form), fields(key = %form.key))]
pub async fn update_setting(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<SettingForm>,
) -> Result<Redirect, AppError> {
    let outcome = state
        .settings()
        .update_setting(&form.key, &setting_value(&form.value), user.id)
        .await
        .map(|()| "Setting saved".to_string())
        .map_err(AppError::from);

    redirect_with("/admin/system", outcome)
}

/// Maintenance toggle form.
#[derive(Debug, Deserialize)]
pub struct MaintenanceForm {
    pub enabled: Option<String>,
}

/// Turn maintenance mode on or off.
#[instrument(skip(user, state, form))]
pub async fn toggle_maintenance(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<MaintenanceForm>,
) -> Result<Redirect, AppError> {
    let enabled = checkbox(form.enabled.as_ref());
    let outcome = state
        .settings()
        .toggle_maintenance(enabled, user.id)
        .await
        .map(|()| {
            if enabled {
                "Maintenance mode enabled"
            } else {
                "Maintenance mode disabled"
            }
            .to_string()
        })
        .map_err(AppError::from);

    redirect_with("/admin/system", outcome)
}

// =============================================================================
// Storage browser
// =============================================================================

/// Storage browser query.
#[derive(Debug, Default, Deserialize)]
pub struct StorageQuery {
    #[serde(default)]
    pub prefix: String,
}

/// One breadcrumb in the storage browser.
#[derive(Debug, Clone)]
pub struct Crumb {
    pub name: String,
    pub prefix: String,
}

/// Breadcrumbs for a folder prefix such as `orders/2026/`.
fn breadcrumbs(prefix: &str) -> Vec<Crumb> {
    let mut crumbs = Vec::new();
    let mut path = String::new();
    for part in prefix.split('/').filter(|p| !p.is_empty()) {
        path.push_str(part);
        path.push('/');
        crumbs.push(Crumb {
            name: part.to_owned(),
            prefix: path.clone(),
        });
    }
    crumbs
}

fn storage_path(prefix: &str) -> String {
    if prefix.is_empty() {
        "/admin/storage".to_string()
    } else {
        format!("/admin/storage?prefix={}", urlencoding::encode(prefix))
    }
}

/// Storage browser template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/storage.html")]
pub struct StorageTemplate {
    pub layout: Layout,
    pub prefix: String,
    pub crumbs: Vec<Crumb>,
    pub entries: Vec<StorageEntry>,
}

impl StorageTemplate {
    /// Browser link for a folder prefix.
    #[must_use]
    pub fn link(&self, prefix: &str) -> String {
        storage_path(prefix)
    }
}

/// List one folder of local storage.
#[instrument(skip(user, state))]
pub async fn storage(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(query): Query<StorageQuery>,
) -> Result<StorageTemplate, AppError> {
    let entries = state.storage().list(&query.prefix).await?;

    Ok(StorageTemplate {
        layout: Layout::new(&state, &user, "/admin/storage", flash).await,
        crumbs: breadcrumbs(&query.prefix),
        prefix: query.prefix,
        entries,
    })
}

/// New folder form.
#[derive(Debug, Deserialize)]
pub struct FolderForm {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub name: String,
}

/// Create a folder inside the current prefix.
#[instrument(skip(user, state, form))]
pub async fn create_folder(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<FolderForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let name = form.name.trim().trim_matches('/');
        if name.is_empty() {
            return Err(AppError::BadRequest("Folder name is required".to_string()));
        }
        let path = format!("{}{name}", form.prefix);
        StorageService::new(state.pool(), state.storage())
            .create_folder(&path, user.id)
            .await?;
        Ok(format!("Folder {name} created"))
    }
    .await;

    redirect_with(&storage_path(&form.prefix), outcome)
}

/// Delete the checked paths.
///
/// Form fields: `prefix` plus one `path_<n>` per checked entry.
#[instrument(skip(user, state, form))]
pub async fn delete_files(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let prefix = form.get("prefix").cloned().unwrap_or_default();
    let mut paths: Vec<String> = form
        .iter()
        .filter(|(key, value)| key.starts_with("path_") && !value.is_empty())
        .map(|(_, value)| value.clone())
        .collect();
    paths.sort();

    let outcome = async {
        if paths.is_empty() {
            return Err(AppError::BadRequest("Nothing selected".to_string()));
        }
        let failures = StorageService::new(state.pool(), state.storage())
            .delete_many(&paths, user.id)
            .await?;
        if failures.is_empty() {
            return Ok(format!("Deleted: {}", paths.len()));
        }
        let failed = failures
            .iter()
            .map(|f| format!("{} ({})", f.path, f.error))
            .collect::<Vec<_>>()
            .join(", ");
        Err(AppError::BadRequest(format!(
            "Deleted {} of {}. Failed: {failed}",
            paths.len() - failures.len(),
            paths.len()
        )))
    }
    .await;

    redirect_with(&storage_path(&prefix), outcome)
}

/// Rename form. `to` is a name within the same folder.
#[derive(Debug, Deserialize)]
pub struct RenameForm {
    #[serde(default)]
    pub prefix: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// Rename a file or folder.
#[instrument(skip(user, state, form))]
pub async fn rename_file(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Form(form): Form<RenameForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let to = form.to.trim().trim_matches('/');
        if to.is_empty() {
            return Err(AppError::BadRequest("New name is required".to_string()));
        }
        let target = format!("{}{to}", form.prefix);
        StorageService::new(state.pool(), state.storage())
            .rename(&form.from, &target, user.id)
            .await?;
        Ok(format!("Renamed to {to}"))
    }
    .await;

    redirect_with(&storage_path(&form.prefix), outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use serde_json::json;

    fn branding_form() -> BrandingForm {
        BrandingForm {
            company_name: " Print Lab ".to_string(),
            logo_url: Some(String::new()),
            favicon_url: None,
            primary_color: "#FF0066".to_string(),
            background_color: "#ffffff".to_string(),
            currency_symbol: String::new(),
            radius_outer: Some("30".to_string()),
            radius_inner: None,
            login_slogan: String::new(),
            dashboard_welcome: "Hi".to_string(),
            email_footer: String::new(),
            email_signature: String::new(),
            date_format: String::new(),
            timezone: String::new(),
            extra: Some(r#"{"sound": false}"#.to_string()),
        }
    }

    #[test]
    fn test_branding_form_applies_over_current() {
        let branding = branding_form().apply(Branding::default()).unwrap();
        assert_eq!(branding.company_name, "Print Lab");
        assert_eq!(branding.logo_url, None);
        assert_eq!(branding.primary_color, "#ff0066");
        assert_eq!(branding.currency_symbol, "₽");
        assert_eq!(branding.radius_outer, 30);
        assert_eq!(branding.radius_inner, 14);
        assert_eq!(branding.dashboard_welcome, "Hi");
        assert_eq!(branding.extra.get("sound"), Some(&json!(false)));
        assert!(branding.validate().is_ok());
    }

    #[test]
    fn test_branding_form_rejects_non_object_extra() {
        let mut form = branding_form();
        form.extra = Some("[1, 2]".to_string());
        assert!(form.apply(Branding::default()).is_err());
    }

    #[test]
    fn test_parse_permissions() {
        assert!(parse_permissions(r#"{"orders": {"view": true}}"#).is_ok());
        assert!(parse_permissions("true").is_err());
        assert!(parse_permissions("not json").is_err());
    }

    #[test]
    fn test_setting_value() {
        assert_eq!(setting_value(" 42 "), json!(42));
        assert_eq!(setting_value("true"), json!(true));
        assert_eq!(setting_value("hello"), json!("hello"));
    }

    #[test]
    fn test_breadcrumbs() {
        let crumbs = breadcrumbs("orders/2026/");
        assert_eq!(crumbs.len(), 2);
        assert_eq!(crumbs[0].prefix, "orders/");
        assert_eq!(crumbs[1].name, "2026");
        assert_eq!(crumbs[1].prefix, "orders/2026/");
        assert!(breadcrumbs("").is_empty());
    }

    #[test]
    fn test_storage_path() {
        assert_eq!(storage_path(""), "/admin/storage");
        assert_eq!(storage_path("a b/"), "/admin/storage?prefix=a%20b%2F");
    }

    #[test]
    fn test_user_form_validates_email() {
        let form = UserForm {
            name: "Sam".to_string(),
            email: "not-an-email".to_string(),
            role_id: None,
            department_id: None,
            phone: None,
            password: None,
        };
        assert!(matches!(form.to_input(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_department_form_default_color() {
        let form = DepartmentForm {
            name: "Print".to_string(),
            description: None,
            color: None,
            is_active: None,
        };
        let input = form.to_input().unwrap();
        assert_eq!(input.color, DEFAULT_DEPARTMENT_COLOR);
        assert!(input.is_active);
    }
}
