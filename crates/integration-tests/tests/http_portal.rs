//! End-to-end tests over the full router.
//!
//! Each test builds a portal on the in-memory store and drives it with the
//! in-process client, which carries the session cookie like a browser.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use axum::http::{StatusCode, header};
use serde_json::{Value, json};
use uuid::Uuid;

use supply_desk_core::{Category, Email};
use supply_desk_integration_tests::{
    ADMIN_EMAIL, PASSWORD, TECNICO_EMAIL, TestClient, TestPortal, closed_clock, open_clock,
    product,
};
use supply_desk_portal::db::PortalStore;
use supply_desk_portal::services::NoticeLevel;

// =============================================================================
// Access Gate
// =============================================================================

#[tokio::test]
async fn test_anonymous_pages_redirect_and_api_is_unauthorized() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut client = portal.client();

    for path in ["/", "/history", "/admin/products", "/nowhere"] {
        let response = client.get(path).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{path}");
        assert_eq!(response.location(), Some("/login"), "{path}");
    }

    for path in ["/api/session", "/api/cart", "/api/admin/orders", "/api/nowhere"] {
        let response = client.get(path).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(response.location(), Some("/login"), "{path}");
    }

    let login = client.get("/login").await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["page"], "login");
}

#[tokio::test]
async fn test_tecnico_is_turned_away_from_admin_routes() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut client = portal.signed_in(TECNICO_EMAIL).await;

    let page = client.get("/admin/users").await;
    assert_eq!(page.status, StatusCode::SEE_OTHER);
    assert_eq!(page.location(), Some("/login"));

    let api = client.get("/api/admin/orders").await;
    assert_eq!(api.status, StatusCode::UNAUTHORIZED);

    // Ordering pages stay open to them.
    let order = client.get("/").await;
    assert_eq!(order.status, StatusCode::OK);
    assert_eq!(order.body["page"], "order");
    assert_eq!(order.body["menu"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_signed_in_login_page_goes_to_ordering() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut client = portal.signed_in(ADMIN_EMAIL).await;

    let response = client.get("/login").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/"));

    let unknown = client.get("/nowhere").await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut client = portal.client();

    let response = client.login(ADMIN_EMAIL, "not-the-password1").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(client.get("/api/session").await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_then_sign_in_as_tecnico() {
    const STRONG: &str = "Secret.pass1";
    let portal = TestPortal::new(open_clock());
    let mut client = portal.client();

    let weak = client
        .post(
            "/api/register",
            json!({
                "givenName": "Eva",
                "familyName": "Rios",
                "email": "eva@flota.com",
                "password": PASSWORD,
                "confirmPassword": PASSWORD,
            }),
        )
        .await;
    assert_eq!(weak.status, StatusCode::UNPROCESSABLE_ENTITY);

    let form = json!({
        "givenName": "Eva",
        "familyName": "Rios",
        "email": "eva@flota.com",
        "password": STRONG,
        "confirmPassword": STRONG,
    });
    let created = client.post("/api/register", form.clone()).await;
    assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
    assert_eq!(created.body["role"], "Tecnico");

    // Registration does not sign in.
    assert_eq!(client.get("/api/session").await.status, StatusCode::UNAUTHORIZED);

    let again = client.post("/api/register", form).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let login = client.login("eva@flota.com", STRONG).await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["givenName"], "Eva");

    let session = client.get("/api/session").await;
    assert_eq!(session.body["email"], "eva@flota.com");
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut client = portal.signed_in(TECNICO_EMAIL).await;
    assert!(client.has_cookie());
    assert_eq!(client.get("/api/session").await.status, StatusCode::OK);

    let response = client.post("/api/logout", json!({})).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    assert_eq!(client.get("/api/session").await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(client.get("/").await.status, StatusCode::SEE_OTHER);
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_catalog_shows_products_written_elsewhere() {
    let portal = TestPortal::with_users(open_clock()).await;
    portal.add_product("cable", Category::NonSerial, 10).await;
    let mut luis = portal.signed_in(TECNICO_EMAIL).await;
    assert_eq!(luis.get("/api/catalog").await.body.as_array().unwrap().len(), 1);

    // Another process (the seeding CLI, a second portal) writes the store.
    let clamp = portal
        .store
        .create_product(&product("clamp", Category::NonSerial, 4), 1)
        .await
        .unwrap();

    let catalog = luis.get("/api/catalog").await;
    let names: Vec<&str> = catalog
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["cable", "clamp"]);

    luis.put("/api/cart/vehicle", json!({ "vehicle": "VP" })).await;
    let staged = luis
        .put(
            &format!("/api/cart/items/{}/quantity", clamp.id),
            json!({ "quantity": 2 }),
        )
        .await;
    assert_eq!(staged.status, StatusCode::OK, "{:?}", staged.body);
    assert_eq!(staged.body["staged"][0]["quantity"], 2);
}

#[tokio::test]
async fn test_cart_to_history_round_trip() {
    let portal = TestPortal::with_users(open_clock()).await;
    let cable = portal.add_product("cable", Category::NonSerial, 10).await;
    let mut luis = portal.signed_in(TECNICO_EMAIL).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;

    let catalog = luis.get("/api/catalog").await;
    assert_eq!(catalog.body.as_array().unwrap().len(), 1);

    let cart = luis.put("/api/cart/vehicle", json!({ "vehicle": "VP" })).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["vehicle"], "VP");

    let staged = luis
        .put(
            &format!("/api/cart/items/{}/quantity", cable.id),
            json!({ "quantity": 3 }),
        )
        .await;
    assert_eq!(staged.body["staged"][0]["quantity"], 3);

    let added = luis
        .post(&format!("/api/cart/items/{}", cable.id), json!({}))
        .await;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.body["lines"][0]["name"], "cable");
    assert_eq!(added.body["staged"], json!([]));

    let order = luis.post("/api/cart/submit", json!({})).await;
    assert_eq!(order.status, StatusCode::OK, "{:?}", order.body);
    assert_eq!(order.body["requester"]["givenName"], "Luis");
    let order_id = order.body["id"].as_i64().unwrap();

    // The cart is empty afterwards but keeps the vehicle.
    let cart = luis.get("/api/cart").await;
    assert_eq!(cart.body["lines"], json!([]));
    assert_eq!(cart.body["vehicle"], "VP");

    let pending = ana.get("/api/admin/orders").await;
    assert_eq!(pending.body.as_array().unwrap().len(), 1);

    let completed = ana
        .post(&format!("/api/admin/orders/{order_id}/complete"), json!({}))
        .await;
    assert_eq!(completed.status, StatusCode::OK);
    assert_eq!(completed.body["order"]["id"].as_i64(), Some(order_id));

    assert_eq!(ana.get("/api/admin/orders").await.body, json!([]));

    let history = luis.get("/api/history").await;
    assert_eq!(history.body.as_array().unwrap().len(), 1);
    let grouped = ana.get("/api/history/grouped").await;
    assert_eq!(grouped.body["Luis Gomez"].as_array().unwrap().len(), 1);

    // Completing again finds nothing pending.
    let again = ana
        .post(&format!("/api/admin/orders/{order_id}/complete"), json!({}))
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_needs_vehicle_and_items() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut luis = portal.signed_in(TECNICO_EMAIL).await;

    let empty = luis.post("/api/cart/submit", json!({})).await;
    assert_eq!(empty.status, StatusCode::UNPROCESSABLE_ENTITY);

    let unknown = luis.put("/api/cart/vehicle", json!({ "vehicle": "ZZ" })).await;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);

    assert!(portal.store.list_pending_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_quantity_above_maximum_is_rejected() {
    let portal = TestPortal::with_users(open_clock()).await;
    let modem = portal.add_product("modem", Category::Serial, 2).await;
    let mut luis = portal.signed_in(TECNICO_EMAIL).await;

    let response = luis
        .put(
            &format!("/api/cart/items/{}/quantity", modem.id),
            json!({ "quantity": 3 }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(luis.get("/api/cart").await.body["staged"], json!([]));
}

#[tokio::test]
async fn test_cart_writes_refused_outside_business_hours() {
    let portal = TestPortal::with_users(closed_clock()).await;
    let cable = portal.add_product("cable", Category::NonSerial, 10).await;
    let mut luis = portal.signed_in(TECNICO_EMAIL).await;

    let status = luis.get("/api/ordering/status").await;
    assert_eq!(status.body["open"], false);

    let vehicle = luis.put("/api/cart/vehicle", json!({ "vehicle": "VP" })).await;
    assert_eq!(vehicle.status, StatusCode::FORBIDDEN);
    let quantity = luis
        .put(
            &format!("/api/cart/items/{}/quantity", cable.id),
            json!({ "quantity": 1 }),
        )
        .await;
    assert_eq!(quantity.status, StatusCode::FORBIDDEN);
    assert_eq!(
        luis.post("/api/cart/submit", json!({})).await.status,
        StatusCode::FORBIDDEN
    );

    // Reads still work.
    assert_eq!(luis.get("/api/cart").await.status, StatusCode::OK);
    assert_eq!(luis.get("/api/catalog").await.status, StatusCode::OK);
}

// =============================================================================
// Notices
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_staged_quantity_reminds_once() {
    let portal = TestPortal::with_users(open_clock()).await;
    let cable = portal.add_product("cable", Category::NonSerial, 10).await;
    let mut luis = portal.signed_in(TECNICO_EMAIL).await;
    let mut notices = portal
        .state
        .notices()
        .subscribe(&Email::parse(TECNICO_EMAIL).unwrap());

    luis.put(
        &format!("/api/cart/items/{}/quantity", cable.id),
        json!({ "quantity": 2 }),
    )
    .await;

    let reminder = notices.recv().await.unwrap();
    assert_eq!(reminder.level, NoticeLevel::Warning);
    assert!(reminder.message.contains("cable"));

    let nothing_else = tokio::time::timeout(Duration::from_secs(5), notices.recv()).await;
    assert!(nothing_else.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_adding_to_cart_cancels_reminder() {
    let portal = TestPortal::with_users(open_clock()).await;
    let cable = portal.add_product("cable", Category::NonSerial, 10).await;
    let mut luis = portal.signed_in(TECNICO_EMAIL).await;
    let mut notices = portal
        .state
        .notices()
        .subscribe(&Email::parse(TECNICO_EMAIL).unwrap());

    luis.put(
        &format!("/api/cart/items/{}/quantity", cable.id),
        json!({ "quantity": 2 }),
    )
    .await;
    luis.post(&format!("/api/cart/items/{}", cable.id), json!({}))
        .await;

    let added = notices.recv().await.unwrap();
    assert_eq!(added.level, NoticeLevel::Info);

    let reminder = tokio::time::timeout(Duration::from_secs(5), notices.recv()).await;
    assert!(reminder.is_err());
}

#[tokio::test]
async fn test_notice_and_feed_streams_are_event_streams() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;

    for path in [
        "/api/notices/stream",
        "/api/admin/orders/stream",
        "/api/history/stream",
    ] {
        let response = ana.get(path).await;
        assert_eq!(response.status, StatusCode::OK, "{path}");
        let content_type = response.headers[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"), "{path}");
    }
}

#[tokio::test]
async fn test_order_feed_opens_with_a_snapshot() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;

    let event = ana.first_event("/api/admin/orders/stream").await;
    assert!(event.contains("event: snapshot"), "{event}");
    assert!(event.contains("data: []"), "{event}");
}

// =============================================================================
// Confirmations
// =============================================================================

async fn request_delete(client: &mut TestClient, id: i64) -> Value {
    let response = client
        .post(
            "/api/confirmations",
            json!({ "target": { "kind": "product", "id": id } }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    response.body
}

#[tokio::test]
async fn test_confirmed_delete_runs_once() {
    let portal = TestPortal::with_users(open_clock()).await;
    let cable = portal.add_product("cable", Category::NonSerial, 10).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;
    let id = i64::from(cable.id.as_i32());

    let prompt = request_delete(&mut ana, id).await;
    assert!(prompt["prompt"].as_str().unwrap().contains("Delete product"));
    let token = prompt["token"].clone();

    let confirmed = ana
        .post("/api/confirmations/confirm", json!({ "token": token }))
        .await;
    assert_eq!(confirmed.status, StatusCode::NO_CONTENT);
    assert_eq!(ana.get("/api/admin/products").await.body["entries"], json!([]));

    let replay = ana
        .post("/api/confirmations/confirm", json!({ "token": token }))
        .await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mismatched_token_clears_the_pending_action() {
    let portal = TestPortal::with_users(open_clock()).await;
    let cable = portal.add_product("cable", Category::NonSerial, 10).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;
    let id = i64::from(cable.id.as_i32());

    let token = request_delete(&mut ana, id).await["token"].clone();
    let issued: Uuid = token.as_str().unwrap().parse().unwrap();
    let other = Uuid::new_v4();
    assert_ne!(issued, other);

    let wrong = ana
        .post("/api/confirmations/confirm", json!({ "token": other }))
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);

    // The real token no longer executes anything.
    let late = ana
        .post("/api/confirmations/confirm", json!({ "token": token }))
        .await;
    assert_eq!(late.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        ana.get("/api/admin/products").await.body["entries"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_cancelled_confirmation_does_nothing() {
    let portal = TestPortal::with_users(open_clock()).await;
    let cable = portal.add_product("cable", Category::NonSerial, 10).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;

    let token = request_delete(&mut ana, i64::from(cable.id.as_i32())).await["token"].clone();
    let cancelled = ana.post("/api/confirmations/cancel", json!({})).await;
    assert_eq!(cancelled.status, StatusCode::NO_CONTENT);

    let late = ana
        .post("/api/confirmations/confirm", json!({ "token": token }))
        .await;
    assert_eq!(late.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tecnico_cannot_request_destructive_actions() {
    let portal = TestPortal::with_users(open_clock()).await;
    let cable = portal.add_product("cable", Category::NonSerial, 10).await;
    let mut luis = portal.signed_in(TECNICO_EMAIL).await;

    let response = luis
        .post(
            "/api/confirmations",
            json!({ "target": { "kind": "product", "id": cable.id.as_i32() } }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Administration
// =============================================================================

#[tokio::test]
async fn test_admin_creates_and_reorders_products() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;

    for name in ["cable", "clamp", "tape"] {
        let created = ana
            .post(
                "/api/admin/products",
                json!({
                    "imageRef": format!("catalog/{name}.png"),
                    "name": name,
                    "minQty": 0,
                    "maxQty": 10,
                    "category": "non_serial",
                }),
            )
            .await;
        assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
    }

    let moved = ana
        .post(
            "/api/admin/products/reorder",
            json!({ "category": "non_serial", "from": 2, "to": 0 }),
        )
        .await;
    assert_eq!(moved.status, StatusCode::OK);
    assert_eq!(moved.body["outcome"]["status"], "confirmed");
    assert_eq!(moved.body["catalog"]["pendingConfirmation"], false);

    let names: Vec<&str> = moved.body["catalog"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["tape", "cable", "clamp"]);

    let out_of_range = ana
        .post(
            "/api/admin/products/reorder",
            json!({ "category": "non_serial", "from": 0, "to": 9 }),
        )
        .await;
    assert_eq!(out_of_range.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_adds_and_edits_users() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;

    let created = ana
        .post(
            "/api/admin/users",
            json!({
                "givenName": "Eva",
                "familyName": "Rios",
                "email": "eva@flota.com",
                "password": "simple",
                "confirmPassword": "simple",
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
    assert_eq!(created.body["role"], "Tecnico");
    let id = created.body["id"].as_i64().unwrap();

    let promoted = ana
        .put(
            &format!("/api/admin/users/{id}"),
            json!({ "familyName": "Rios Paz", "role": "Admin" }),
        )
        .await;
    assert_eq!(promoted.status, StatusCode::OK);
    assert_eq!(promoted.body["familyName"], "Rios Paz");
    assert_eq!(promoted.body["role"], "Admin");

    let renamed = ana
        .put(
            &format!("/api/admin/users/{id}"),
            json!({ "email": "other@flota.com" }),
        )
        .await;
    assert!(renamed.status.is_client_error());

    let users = ana.get("/api/admin/users").await;
    assert_eq!(users.body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_admin_cannot_delete_own_account() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;

    let users = ana.get("/api/admin/users").await;
    let own_id = users
        .body
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == ADMIN_EMAIL)
        .unwrap()["id"]
        .clone();

    let prompt = ana
        .post(
            "/api/confirmations",
            json!({ "target": { "kind": "user", "id": own_id } }),
        )
        .await;
    let confirmed = ana
        .post(
            "/api/confirmations/confirm",
            json!({ "token": prompt.body["token"] }),
        )
        .await;
    assert_eq!(confirmed.status, StatusCode::FORBIDDEN);
    assert_eq!(ana.get("/api/session").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_deleted_user_cannot_sign_in() {
    let portal = TestPortal::with_users(open_clock()).await;
    let mut ana = portal.signed_in(ADMIN_EMAIL).await;

    let users = ana.get("/api/admin/users").await;
    let luis_id = users
        .body
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == TECNICO_EMAIL)
        .unwrap()["id"]
        .clone();

    let prompt = ana
        .post(
            "/api/confirmations",
            json!({ "target": { "kind": "user", "id": luis_id } }),
        )
        .await;
    let confirmed = ana
        .post(
            "/api/confirmations/confirm",
            json!({ "token": prompt.body["token"] }),
        )
        .await;
    assert_eq!(confirmed.status, StatusCode::NO_CONTENT);

    let login = portal.client().login(TECNICO_EMAIL, PASSWORD).await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoints_are_public() {
    let portal = TestPortal::new(open_clock());
    let mut client = portal.client();

    assert_eq!(client.get("/health").await.status, StatusCode::OK);
    assert_eq!(client.get("/health/ready").await.status, StatusCode::OK);
}
