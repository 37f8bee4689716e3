//! Unified error handling for the CRM.
//!
//! Service errors convert into [`AppError`]. Business-rule violations keep
//! their human message and answer 400/403/404/409; everything else is a
//! server error that is captured to Sentry, logged, and answered with a
//! generic message. Server errors also leave a [`ServerErrorReport`] in the
//! response extensions so [`crate::middleware::error_log`] can persist it to
//! `crm.system_errors`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use merch_crm_core::UserId;

use crate::db::RepositoryError;
use crate::db::settings::SettingsError;
use crate::services::{
    AuthError, NotificationError, OrderError, ProductionError, PromocodeError, SettingsServiceError,
    StockError, StorageError,
};

/// Application-level error type for the CRM.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with current state (duplicate, illegal transition).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Details of a server error, attached to the response for persistence.
#[derive(Debug, Clone)]
pub struct ServerErrorReport {
    pub message: String,
}

impl AppError {
    /// Whether this is a server-side failure rather than a rejected request.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal(_))
    }

    /// The message shown to the user.
    ///
    /// Server errors never expose their details.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::BadRequest(m)
            | Self::Conflict(m) => m.clone(),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "CRM request error"
            );
        }

        let mut response = (self.status(), self.user_message()).into_response();
        if self.is_server_error() {
            response.extensions_mut().insert(ServerErrorReport {
                message: self.to_string(),
            });
        }
        response
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound("Record not found".to_string()),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::InvalidReference(msg) => Self::BadRequest(msg),
            other => Self::Database(other),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(RepositoryError::Database(e))
    }
}

impl From<SettingsError> for AppError {
    fn from(e: SettingsError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<SettingsServiceError> for AppError {
    fn from(e: SettingsServiceError) -> Self {
        match e {
            SettingsServiceError::Invalid(msg) => Self::BadRequest(msg),
            SettingsServiceError::Settings(e) => e.into(),
            SettingsServiceError::Repository(e) => e.into(),
        }
    }
}

impl From<NotificationError> for AppError {
    fn from(e: NotificationError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound | OrderError::ClientNotFound => Self::NotFound(e.to_string()),
            OrderError::Invalid(_) | OrderError::InsufficientStock(_) | OrderError::UnknownField(_) => {
                Self::BadRequest(e.to_string())
            }
            OrderError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            OrderError::Forbidden => Self::Forbidden(e.to_string()),
            OrderError::Storage(e) => e.into(),
            OrderError::Repository(e) => e.into(),
        }
    }
}

impl From<StockError> for AppError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::ItemNotFound | StockError::LocationNotFound => Self::NotFound(e.to_string()),
            StockError::Invalid(_) | StockError::InsufficientStock => Self::BadRequest(e.to_string()),
            StockError::Conflict(msg) => Self::Conflict(msg),
            StockError::Repository(e) => e.into(),
        }
    }
}

impl From<ProductionError> for AppError {
    fn from(e: ProductionError) -> Self {
        match e {
            ProductionError::ItemNotFound => Self::NotFound(e.to_string()),
            ProductionError::NotLinked | ProductionError::InvalidQuantity => {
                Self::BadRequest(e.to_string())
            }
            ProductionError::Repository(e) => e.into(),
        }
    }
}

impl From<PromocodeError> for AppError {
    fn from(e: PromocodeError) -> Self {
        match e {
            PromocodeError::Invalid(msg) => Self::BadRequest(msg),
            PromocodeError::NotFound => Self::NotFound(e.to_string()),
            PromocodeError::Conflict(msg) => Self::Conflict(msg),
            PromocodeError::Repository(e) => e.into(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidPath(_) | StorageError::PathEscapesRoot => {
                Self::BadRequest(e.to_string())
            }
            StorageError::NotFound => Self::NotFound("File not found".to_string()),
            StorageError::AlreadyExists | StorageError::DirectoryNotEmpty => {
                Self::Conflict(e.to_string())
            }
            StorageError::Io(_) => Self::Internal(e.to_string()),
            StorageError::Repository(e) => e.into(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidEmail(_) | AuthError::WeakPassword(_) | AuthError::SelfDeletion => {
                Self::BadRequest(e.to_string())
            }
            AuthError::InvalidCredentials => Self::Unauthorized(e.to_string()),
            AuthError::UserNotFound => Self::NotFound(e.to_string()),
            AuthError::UserAlreadyExists => Self::Conflict(e.to_string()),
            AuthError::PasswordHash => Self::Internal(e.to_string()),
            AuthError::Repository(e) => e.into(),
        }
    }
}

// =============================================================================
// Sentry user context
// =============================================================================

/// Set the Sentry user context from a staff user ID.
pub fn set_sentry_user(user_id: UserId, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    use merch_crm_core::OrderStatus;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order-123".to_string());
        assert_eq!(err.to_string(), "Not found: order-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Conflict("test".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = AppError::Internal("connection refused on 10.0.0.3".to_string());
        assert_eq!(err.user_message(), "Internal server error");

        let response = err.into_response();
        let report = response.extensions().get::<ServerErrorReport>();
        assert!(report.is_some_and(|r| r.message.contains("connection refused")));
    }

    #[test]
    fn test_business_errors_keep_message() {
        let response = AppError::BadRequest("Phone is required".to_string()).into_response();
        assert!(response.extensions().get::<ServerErrorReport>().is_none());
    }

    #[test]
    fn test_order_error_mapping() {
        let err = AppError::from(OrderError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::New,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.user_message(), "cannot change status from shipped to new");

        let err = AppError::from(OrderError::InsufficientStock("T-shirt".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        assert_eq!(AppError::from(OrderError::Forbidden).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_storage_error_mapping() {
        assert_eq!(
            AppError::from(StorageError::PathEscapesRoot).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(StorageError::DirectoryNotEmpty).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::from(StorageError::NotFound).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_repository_error_mapping() {
        assert_eq!(
            AppError::from(RepositoryError::Conflict("email taken".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(RepositoryError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(RepositoryError::InvalidReference("Manager not found".to_string()))
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert!(AppError::from(RepositoryError::DataCorruption("bad".to_string())).is_server_error());
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(AuthError::UserAlreadyExists).status(),
            StatusCode::CONFLICT
        );
    }
}
