//! Integration tests for the merch CRM.
//!
//! # Running Tests
//!
//! ```bash
//! # Pure business-rule tests
//! cargo test -p merch-crm-integration-tests
//!
//! # Against a running server (needs a migrated database and a staff account)
//! CRM_BASE_URL=http://localhost:3000 \
//! CRM_TEST_EMAIL=admin@example.com CRM_TEST_PASSWORD='...' \
//!     cargo test -p merch-crm-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `order_lifecycle` - status transitions, stock effects, numbering
//! - `promocodes` - promocode evaluation against carts
//! - `finance` - P&L, payroll and fund split arithmetic
//! - `http_*` - HTTP round trips, ignored unless a server is running
//!
//! `http_stock` also reads quantities back from the server's database, so it
//! needs `CRM_DATABASE_URL` (or `DATABASE_URL`) as well.

use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

/// Base URL of the CRM server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("CRM_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// A cookie-keeping client that does not follow redirects, so tests can
/// assert on `Location` headers.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// Credentials of the staff account used by HTTP tests.
#[must_use]
pub fn credentials() -> Option<(String, SecretString)> {
    let email = std::env::var("CRM_TEST_EMAIL").ok()?;
    let password = std::env::var("CRM_TEST_PASSWORD").ok()?;
    Some((email, SecretString::from(password)))
}

/// Sign in and return a client holding the session cookie.
///
/// # Panics
///
/// Panics if credentials are missing or the login is refused.
pub async fn signed_in_client() -> Client {
    let (email, password) =
        credentials().expect("CRM_TEST_EMAIL and CRM_TEST_PASSWORD must be set");
    let client = client();
    let resp = client
        .post(format!("{}/auth/login", base_url()))
        .form(&[("email", email.as_str()), ("password", password.expose_secret())])
        .send()
        .await
        .expect("Failed to submit login form");

    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "login was not accepted");
    let location = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(
        !location.starts_with("/auth/login"),
        "login redirected back to the form: {location}"
    );
    client
}

/// The `Location` header of a redirect, or an empty string.
#[must_use]
pub fn location(resp: &Response) -> String {
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The id in a redirect such as `/orders/{id}?success=...`.
///
/// # Panics
///
/// Panics if `location` doesn't start with `prefix` followed by a UUID.
#[must_use]
pub fn id_from_location(location: &str, prefix: &str) -> Uuid {
    let rest = location
        .strip_prefix(prefix)
        .unwrap_or_else(|| panic!("expected a redirect to {prefix}..., got {location}"));
    let id = rest.split(['?', '/']).next().unwrap_or_default();
    Uuid::parse_str(id).unwrap_or_else(|_| panic!("no id in redirect: {location}"))
}

/// Pool on the database behind the server under test.
///
/// # Panics
///
/// Panics if no database URL is set or the connection fails.
pub async fn pool() -> PgPool {
    let url = std::env::var("CRM_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("CRM_DATABASE_URL or DATABASE_URL must be set");
    PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect to the CRM database")
}
