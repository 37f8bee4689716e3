//! Authentication route handlers.
//!
//! Email and password login, logout.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{instrument, warn};

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::Branding;
use crate::routes::{ClientInfo, with_flash};
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
struct LoginPageTemplate {
    branding: Branding,
    error: Option<String>,
    email: String,
}

/// Login query parameters.
#[derive(Debug, Deserialize)]
struct LoginQuery {
    error: Option<String>,
    email: Option<String>,
}

/// Login form.
#[derive(Debug, Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/logout", post(logout))
}

/// Render the login page; signed-in users go straight to the dashboard.
///
/// GET /auth/login
#[instrument(skip_all)]
async fn login_page(
    OptionalAuth(user): OptionalAuth,
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }

    LoginPageTemplate {
        branding: state.settings().branding().await,
        error: query.error,
        email: query.email.unwrap_or_default(),
    }
    .into_response()
}

/// Check credentials and start a session.
///
/// POST /auth/login
#[instrument(skip(state, session, headers, form), fields(email = %form.email))]
async fn login(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, AppError> {
    let client = ClientInfo::from_headers(&headers);
    let email = form.email.trim();

    let user = match AuthService::new(state.pool())
        .login(email, &form.password, client.meta())
        .await
    {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            let target = with_flash(
                &format!("/auth/login?email={}", urlencoding::encode(email)),
                "error",
                "Invalid email or password",
            );
            return Ok(Redirect::to(&target));
        }
        Err(e) => return Err(e.into()),
    };

    set_current_user(&session, &user)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store session: {e}")))?;
    set_sentry_user(user.id, Some(user.email.as_str()));

    Ok(Redirect::to("/"))
}

/// Logout and clear session.
///
/// POST /auth/logout
#[instrument(skip_all)]
async fn logout(
    OptionalAuth(user): OptionalAuth,
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Redirect {
    if let Some(user) = user {
        let client = ClientInfo::from_headers(&headers);
        if let Err(e) = AuthService::new(state.pool())
            .logout(user.id, client.meta())
            .await
        {
            warn!(error = %e, "Failed to record logout");
        }
    }

    if let Err(e) = clear_current_user(&session).await {
        warn!(error = %e, "Failed to clear session");
    }
    clear_sentry_user();

    Redirect::to("/auth/login")
}
