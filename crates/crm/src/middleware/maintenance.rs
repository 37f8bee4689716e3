//! Maintenance mode gate.
//!
//! While the `maintenance_mode` setting is on, every request from someone
//! other than an administrator gets 503. Sign-in, health checks and static
//! assets stay reachable so an admin can log in and switch it off.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::middleware::auth::current_user;
use crate::state::AppState;

/// Path prefixes served even in maintenance mode.
const ALWAYS_OPEN: &[&str] = &["/auth/", "/health", "/static/"];

/// Whether `path` bypasses maintenance mode.
#[must_use]
pub fn is_always_open(path: &str) -> bool {
    ALWAYS_OPEN.iter().any(|prefix| path.starts_with(prefix))
}

/// Answer 503 for non-admin users while maintenance mode is on.
pub async fn maintenance_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if is_always_open(request.uri().path()) || !state.settings().maintenance_mode().await {
        return next.run(request).await;
    }

    let is_admin = current_user(request.extensions())
        .await
        .is_some_and(|user| user.is_admin());
    if is_admin {
        return next.run(request).await;
    }

    (
        StatusCode::SERVICE_UNAVAILABLE,
        "The CRM is under maintenance. Please try again later.",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_open_paths() {
        assert!(is_always_open("/auth/login"));
        assert!(is_always_open("/health"));
        assert!(is_always_open("/health/ready"));
        assert!(is_always_open("/static/app.css"));
        assert!(!is_always_open("/"));
        assert!(!is_always_open("/orders"));
        assert!(!is_always_open("/api/search"));
    }
}
