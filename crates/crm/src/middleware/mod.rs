//! HTTP middleware stack for the CRM.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (CSP, frame and referrer policies)
//! 5. Session layer (tower-sessions with `PostgreSQL` store)
//! 6. Error log (persist server errors to `crm.system_errors`)
//! 7. Maintenance mode (503 for non-admins while enabled)
//!
//! Authentication is enforced per handler by the extractors in [`auth`].

pub mod auth;
pub mod error_log;
pub mod maintenance;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    OptionalAuth, RequireAdmin, RequireAuth, clear_current_user, current_user, set_current_user,
};
pub use error_log::error_log_middleware;
pub use maintenance::maintenance_middleware;
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
