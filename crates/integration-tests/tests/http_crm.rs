//! HTTP round trips against a running CRM server.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (`crm-cli migrate`)
//! - The CRM server running (`cargo run -p merch-crm`)
//! - `CRM_TEST_EMAIL` and `CRM_TEST_PASSWORD` for an administrator
//!
//! Run with: `cargo test -p merch-crm-integration-tests -- --ignored`

use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use merch_crm_integration_tests::{base_url, client, location, signed_in_client};

// ============================================================================
// Health & Auth
// ============================================================================

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_health_endpoints() {
    let client = client();

    let resp = client
        .get(format!("{}/health", base_url()))
        .send()
        .await
        .expect("Failed to reach /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/health/ready", base_url()))
        .send()
        .await
        .expect("Failed to reach /health/ready");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_pages_redirect_anonymous_users_to_login() {
    let client = client();

    for path in ["/", "/clients", "/orders", "/warehouse", "/finance"] {
        let resp = client
            .get(format!("{}{path}", base_url()))
            .send()
            .await
            .expect("Failed to request page");
        assert!(resp.status().is_redirection(), "{path}: {}", resp.status());
        assert_eq!(location(&resp), "/auth/login", "{path}");
    }
}

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_api_rejects_anonymous_users() {
    let resp = client()
        .get(format!("{}/api/notifications/unread", base_url()))
        .send()
        .await
        .expect("Failed to request API");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_wrong_password_returns_to_form() {
    let resp = client()
        .post(format!("{}/auth/login", base_url()))
        .form(&[("email", "nobody@example.com"), ("password", "definitely wrong")])
        .send()
        .await
        .expect("Failed to submit login");

    assert!(resp.status().is_redirection());
    assert!(location(&resp).starts_with("/auth/login?"));
}

// ============================================================================
// Clients
// ============================================================================

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_client_create_and_duplicate_check() {
    let client = signed_in_client().await;
    let phone = format!("+7 999 {:07}", Uuid::new_v4().as_u128() % 10_000_000);

    let resp = client
        .post(format!("{}/clients", base_url()))
        .form(&[
            ("client_type", "b2c"),
            ("last_name", "Integration"),
            ("first_name", "Test"),
            ("phone", phone.as_str()),
            ("ignore_duplicates", "on"),
        ])
        .send()
        .await
        .expect("Failed to create client");
    assert!(resp.status().is_redirection());
    assert!(
        location(&resp).starts_with("/clients/"),
        "unexpected redirect: {}",
        location(&resp)
    );

    let resp = client
        .get(format!("{}/api/clients/duplicates", base_url()))
        .query(&[("phone", phone.as_str())])
        .send()
        .await
        .expect("Failed to check duplicates");
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.expect("Invalid JSON");
    assert_eq!(body["success"], json!(true));
    assert!(
        body["data"].as_array().is_some_and(|d| !d.is_empty()),
        "new client not reported as duplicate: {body}"
    );
}

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_unknown_manager_is_a_form_error() {
    let client = signed_in_client().await;
    let phone = format!("+7 997 {:07}", Uuid::new_v4().as_u128() % 10_000_000);

    let resp = client
        .post(format!("{}/clients", base_url()))
        .form(&[
            ("client_type", "b2c"),
            ("last_name", "Managed"),
            ("first_name", "Nobody"),
            ("phone", phone.as_str()),
            ("ignore_duplicates", "on"),
        ])
        .send()
        .await
        .expect("Failed to create client");
    let card = location(&resp);
    let card = card.split('?').next().unwrap_or_default().to_string();
    assert!(card.starts_with("/clients/"), "unexpected redirect: {card}");

    let missing = Uuid::new_v4().to_string();
    let resp = client
        .post(format!("{}{card}/field", base_url()))
        .form(&[("field", "manager_id"), ("value", missing.as_str())])
        .send()
        .await
        .expect("Failed to update field");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let to = location(&resp);
    assert!(to.starts_with(&format!("{card}?error=")), "{to}");
    assert!(to.contains("Manager%20not%20found"), "{to}");
}

// ============================================================================
// JSON APIs
// ============================================================================

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_unknown_promocode_is_rejected() {
    let client = signed_in_client().await;

    let resp = client
        .post(format!("{}/api/promocodes/validate", base_url()))
        .json(&json!({
            "code": format!("NOPE-{}", Uuid::new_v4().simple()),
            "total": "1000",
            "cartItems": []
        }))
        .send()
        .await
        .expect("Failed to validate promocode");
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.expect("Invalid JSON");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["isValid"], json!(false));
}

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_stats_endpoints() {
    let client = signed_in_client().await;

    for path in ["/api/orders/stats", "/api/production/stats", "/api/notifications/unread"] {
        let resp = client
            .get(format!("{}{path}", base_url()))
            .send()
            .await
            .expect("Failed to request stats");
        assert_eq!(resp.status(), StatusCode::OK, "{path}");

        let body: Value = resp.json().await.expect("Invalid JSON");
        assert_eq!(body["success"], json!(true), "{path}: {body}");
    }
}

#[tokio::test]
#[ignore = "Requires running CRM server"]
async fn test_global_search_requires_two_characters() {
    let client = signed_in_client().await;

    let resp = client
        .get(format!("{}/api/search", base_url()))
        .query(&[("q", "a")])
        .send()
        .await
        .expect("Failed to search");
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.expect("Invalid JSON");
    assert_eq!(body["data"]["clients"], json!([]));
    assert_eq!(body["data"]["orders"], json!([]));
}
