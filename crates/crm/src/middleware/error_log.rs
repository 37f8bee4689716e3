//! Persist server errors to `crm.system_errors`.
//!
//! [`crate::error::AppError`] attaches a [`ServerErrorReport`] to every 5xx
//! response it produces. This middleware picks it up and stores it with the
//! request's method, path and user so admins can review it on the security
//! page.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use tracing::warn;

use merch_crm_core::ErrorSeverity;

use crate::db::SecurityRepository;
use crate::error::ServerErrorReport;
use crate::middleware::auth::current_user;
use crate::models::NewSystemError;
use crate::state::AppState;

/// Record server errors raised while handling the request.
pub async fn error_log_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_owned();
    let user_id = current_user(request.extensions()).await.map(|user| user.id);

    let response = next.run(request).await;

    if let Some(report) = response.extensions().get::<ServerErrorReport>() {
        let error = NewSystemError {
            user_id,
            message: report.message.clone(),
            path: Some(path),
            method: Some(method),
            severity: ErrorSeverity::Error,
            details: Some(json!({ "status": response.status().as_u16() })),
        };
        if let Err(e) = SecurityRepository::new(state.pool()).record_error(&error).await {
            warn!(error = %e, "Failed to persist system error");
        }
    }

    response
}
