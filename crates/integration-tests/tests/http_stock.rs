//! Stock-moving HTTP flows checked against the database.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (`crm-cli migrate`)
//! - The CRM server running (`cargo run -p merch-crm`)
//! - `CRM_TEST_EMAIL` and `CRM_TEST_PASSWORD` for an administrator
//! - `CRM_DATABASE_URL` pointing at the server's database
//!
//! Run with: `cargo test -p merch-crm-integration-tests -- --ignored`

use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use merch_crm_integration_tests::{
    base_url, id_from_location, location, pool, signed_in_client,
};

// ============================================================================
// Fixtures
// ============================================================================

async fn post(client: &Client, path: &str, form: &[(&str, &str)]) -> String {
    let resp = client
        .post(format!("{}{path}", base_url()))
        .form(form)
        .send()
        .await
        .unwrap_or_else(|e| panic!("POST {path} failed: {e}"));
    assert!(resp.status().is_redirection(), "{path}: {}", resp.status());
    location(&resp)
}

async fn create_location(client: &Client, db: &PgPool) -> Uuid {
    let name = format!("Shelf {}", Uuid::new_v4().simple());
    let to = post(
        client,
        "/warehouse/locations",
        &[("name", name.as_str()), ("kind", "warehouse")],
    )
    .await;
    assert!(to.contains("success="), "location not created: {to}");

    sqlx::query_scalar("SELECT id FROM crm.storage_locations WHERE name = $1")
        .bind(&name)
        .fetch_one(db)
        .await
        .expect("created location not found")
}

async fn create_item(client: &Client, location_id: Uuid, quantity: i32) -> Uuid {
    let name = format!("Hoodie {}", Uuid::new_v4().simple());
    let quantity = quantity.to_string();
    let location_id = location_id.to_string();
    let to = post(
        client,
        "/warehouse/items",
        &[
            ("name", name.as_str()),
            ("item_type", "clothing"),
            ("unit", "pcs"),
            ("cost_price", "400"),
            ("initial_quantity", quantity.as_str()),
            ("initial_location_id", location_id.as_str()),
        ],
    )
    .await;
    id_from_location(&to, "/warehouse/items/")
}

async fn create_client(client: &Client) -> Uuid {
    let phone = format!("+7 998 {:07}", Uuid::new_v4().as_u128() % 10_000_000);
    let to = post(
        client,
        "/clients",
        &[
            ("client_type", "b2c"),
            ("last_name", "Stock"),
            ("first_name", "Check"),
            ("phone", phone.as_str()),
            ("ignore_duplicates", "on"),
        ],
    )
    .await;
    id_from_location(&to, "/clients/")
}

/// Submit the new-order form with one line linked to `item`.
async fn submit_order(client: &Client, client_id: Uuid, item: Uuid, quantity: i32) -> String {
    let client_id = client_id.to_string();
    let item = item.to_string();
    let quantity = quantity.to_string();
    post(
        client,
        "/orders",
        &[
            ("client_id", client_id.as_str()),
            ("category", "print"),
            ("item_description_0", "Hoodie with print"),
            ("item_quantity_0", quantity.as_str()),
            ("item_price_0", "1500"),
            ("item_inventory_0", item.as_str()),
        ],
    )
    .await
}

async fn set_status(client: &Client, order: Uuid, status: &str) -> String {
    post(client, &format!("/orders/{order}/status"), &[("status", status)]).await
}

async fn adjust(client: &Client, item: Uuid, shelf: Uuid, kind: &str, amount: &str) -> String {
    let shelf = shelf.to_string();
    post(
        client,
        &format!("/warehouse/items/{item}/adjust"),
        &[
            ("kind", kind),
            ("amount", amount),
            ("reason", "Stocktake"),
            ("location_id", shelf.as_str()),
        ],
    )
    .await
}

/// `(quantity, reserved_quantity)` of an item.
async fn stock(db: &PgPool, item: Uuid) -> (i32, i32) {
    sqlx::query_as("SELECT quantity, reserved_quantity FROM crm.inventory_items WHERE id = $1")
        .bind(item)
        .fetch_one(db)
        .await
        .expect("item not found")
}

async fn location_stock(db: &PgPool, item: Uuid, location_id: Uuid) -> i32 {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0)::int FROM crm.inventory_stocks
         WHERE item_id = $1 AND storage_location_id = $2",
    )
    .bind(item)
    .bind(location_id)
    .fetch_one(db)
    .await
    .expect("stock query failed")
}

async fn order_status(db: &PgPool, order: Uuid) -> String {
    sqlx::query_scalar("SELECT status::text FROM crm.orders WHERE id = $1")
        .bind(order)
        .fetch_one(db)
        .await
        .expect("order not found")
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
#[ignore = "Requires running CRM server and database"]
async fn test_order_beyond_stock_is_refused_whole() {
    let client = signed_in_client().await;
    let db = pool().await;
    let shelf = create_location(&client, &db).await;
    let item = create_item(&client, shelf, 5).await;
    let buyer = create_client(&client).await;

    let to = submit_order(&client, buyer, item, 6).await;
    assert!(to.starts_with("/orders/new?error="), "order was accepted: {to}");

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crm.orders WHERE client_id = $1")
        .bind(buyer)
        .fetch_one(&db)
        .await
        .expect("order count failed");
    assert_eq!(orders, 0);
    assert_eq!(stock(&db, item).await, (5, 0));
}

#[tokio::test]
#[ignore = "Requires running CRM server and database"]
async fn test_status_changes_move_reserved_and_shipped_stock() {
    let client = signed_in_client().await;
    let db = pool().await;
    let shelf = create_location(&client, &db).await;
    let item = create_item(&client, shelf, 10).await;
    let buyer = create_client(&client).await;

    let to = submit_order(&client, buyer, item, 4).await;
    let order = id_from_location(&to, "/orders/");
    assert_eq!(stock(&db, item).await, (10, 4));

    // Cancelling gives the reservation back, reopening takes it again.
    assert!(set_status(&client, order, "cancelled").await.contains("success="));
    assert_eq!(stock(&db, item).await, (10, 0));
    assert!(set_status(&client, order, "new").await.contains("success="));
    assert_eq!(stock(&db, item).await, (10, 4));

    assert!(set_status(&client, order, "production").await.contains("success="));
    assert!(set_status(&client, order, "done").await.contains("success="));
    assert_eq!(stock(&db, item).await, (6, 0));
    assert_eq!(location_stock(&db, item, shelf).await, 6);
    assert_eq!(order_status(&db, order).await, "done");

    // Shipping after done takes nothing a second time.
    assert!(set_status(&client, order, "shipped").await.contains("success="));
    assert_eq!(stock(&db, item).await, (6, 0));
}

#[tokio::test]
#[ignore = "Requires running CRM server and database"]
async fn test_reopening_fails_when_stock_is_gone() {
    let client = signed_in_client().await;
    let db = pool().await;
    let shelf = create_location(&client, &db).await;
    let item = create_item(&client, shelf, 5).await;
    let buyer = create_client(&client).await;

    let order = id_from_location(&submit_order(&client, buyer, item, 5).await, "/orders/");
    assert!(set_status(&client, order, "cancelled").await.contains("success="));

    let to = adjust(&client, item, shelf, "out", "3").await;
    assert!(to.contains("success="), "{to}");

    let to = set_status(&client, order, "new").await;
    assert!(to.contains("error="), "reopened without stock: {to}");
    assert_eq!(order_status(&db, order).await, "cancelled");
    assert_eq!(stock(&db, item).await, (2, 0));

    // Illegal moves are refused before anything changes.
    let to = set_status(&client, order, "shipped").await;
    assert!(to.contains("error="), "{to}");
    assert_eq!(order_status(&db, order).await, "cancelled");
}

// ============================================================================
// Production
// ============================================================================

#[tokio::test]
#[ignore = "Requires running CRM server and database"]
async fn test_defect_writes_off_linked_stock() {
    let client = signed_in_client().await;
    let db = pool().await;
    let shelf = create_location(&client, &db).await;
    let item = create_item(&client, shelf, 10).await;
    let buyer = create_client(&client).await;

    let order = id_from_location(&submit_order(&client, buyer, item, 2).await, "/orders/");
    let line: Uuid = sqlx::query_scalar("SELECT id FROM crm.order_items WHERE order_id = $1")
        .bind(order)
        .fetch_one(&db)
        .await
        .expect("order line not found");

    let path = format!("/production/items/{line}/defect");
    let to = post(&client, &path, &[("quantity", "3"), ("reason", "Misprint")]).await;
    assert!(to.starts_with("/production?success="), "{to}");
    assert!(to.contains("7%20left"), "{to}");
    assert_eq!(stock(&db, item).await, (7, 2));

    let ledger: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM crm.inventory_transactions
         WHERE item_id = $1 AND change_amount = -3 AND reason LIKE 'Defect%'",
    )
    .bind(item)
    .fetch_one(&db)
    .await
    .expect("ledger query failed");
    assert_eq!(ledger, 1);

    let to = post(&client, &path, &[("quantity", "0"), ("reason", "Nothing")]).await;
    assert!(to.starts_with("/production?error="), "{to}");
    assert_eq!(stock(&db, item).await, (7, 2));
}

// ============================================================================
// Warehouse
// ============================================================================

#[tokio::test]
#[ignore = "Requires running CRM server and database"]
async fn test_adjustments_keep_location_stock_non_negative() {
    let client = signed_in_client().await;
    let db = pool().await;
    let shelf = create_location(&client, &db).await;
    let item = create_item(&client, shelf, 10).await;
    let to = adjust(&client, item, shelf, "in", "5").await;
    assert!(to.contains("now%2015"), "{to}");
    assert_eq!(stock(&db, item).await, (15, 0));
    assert_eq!(location_stock(&db, item, shelf).await, 15);

    let to = adjust(&client, item, shelf, "out", "20").await;
    assert!(to.contains("error="), "location went negative: {to}");
    assert_eq!(stock(&db, item).await, (15, 0));
    assert_eq!(location_stock(&db, item, shelf).await, 15);

    let to = adjust(&client, item, shelf, "set", "3").await;
    assert!(to.contains("success="), "{to}");
    assert_eq!(stock(&db, item).await, (3, 0));
    assert_eq!(location_stock(&db, item, shelf).await, 3);

    let to = adjust(&client, item, shelf, "set", "-1").await;
    assert!(to.contains("error="), "{to}");
    assert_eq!(stock(&db, item).await, (3, 0));
}

#[tokio::test]
#[ignore = "Requires running CRM server and database"]
async fn test_transfer_needs_stock_at_source() {
    let client = signed_in_client().await;
    let db = pool().await;
    let from = create_location(&client, &db).await;
    let to_shelf = create_location(&client, &db).await;
    let item = create_item(&client, from, 4).await;

    let path = format!("/warehouse/items/{item}/transfer");
    let from_id = from.to_string();
    let to_id = to_shelf.to_string();

    let to = post(
        &client,
        &path,
        &[
            ("from_location_id", from_id.as_str()),
            ("to_location_id", to_id.as_str()),
            ("amount", "5"),
            ("reason", "Restock"),
        ],
    )
    .await;
    assert!(to.contains("error="), "transferred more than held: {to}");
    assert_eq!(location_stock(&db, item, from).await, 4);
    assert_eq!(location_stock(&db, item, to_shelf).await, 0);

    let to = post(
        &client,
        &path,
        &[
            ("from_location_id", from_id.as_str()),
            ("to_location_id", to_id.as_str()),
            ("amount", "3"),
            ("reason", "Restock"),
        ],
    )
    .await;
    assert!(to.contains("success="), "{to}");
    assert_eq!(location_stock(&db, item, from).await, 1);
    assert_eq!(location_stock(&db, item, to_shelf).await, 3);
    // Moving between shelves doesn't change the total.
    assert_eq!(stock(&db, item).await, (4, 0));
}
