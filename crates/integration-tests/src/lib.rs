//! Integration tests for Supply Desk.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p supply-desk-integration-tests
//! ```
//!
//! Everything runs over the in-memory store and the full router, driven
//! in-process with `tower::ServiceExt::oneshot`; no database or listener is
//! needed.
//!
//! # Test Categories
//!
//! - `catalog_reorder` - Reorder properties and reconciliation
//! - `order_lifecycle` - Submission, completion, cancellation, history
//! - `http_portal` - Gate, sessions and the JSON API end to end

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

use supply_desk_core::{
    Availability, CatalogEntry, Category, NewCatalogEntry, Role, Session, UserAccount,
};
use supply_desk_portal::config::{OrderingConfig, PortalConfig};
use supply_desk_portal::db::{MemoryStore, SharedStore};
use supply_desk_portal::middleware::{SESSION_COOKIE_NAME, memory_session_layer};
use supply_desk_portal::services::{AccountForm, AuthService, Clock};
use supply_desk_portal::state::AppState;

/// Password of every account the harness creates.
pub const PASSWORD: &str = "secret-pass1";

/// Administrator created by [`TestPortal::with_users`].
pub const ADMIN_EMAIL: &str = "ana@flota.com";

/// Technician created by [`TestPortal::with_users`].
pub const TECNICO_EMAIL: &str = "luis@flota.com";

/// Wednesday 10:00 portal time (UTC-3): ordering is open.
#[must_use]
pub fn open_clock() -> Clock {
    Clock::Fixed(at("2024-06-05T13:00:00Z"))
}

/// Saturday 10:00 portal time: ordering is closed.
#[must_use]
pub fn closed_clock() -> Clock {
    Clock::Fixed(at("2024-06-08T13:00:00Z"))
}

#[must_use]
pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

/// Ordering settings with a short reminder so timer tests stay fast.
#[must_use]
pub fn ordering() -> OrderingConfig {
    OrderingConfig {
        cart_reminder: Duration::from_millis(50),
        ..OrderingConfig::default()
    }
}

/// A portal over a fresh in-memory store.
pub struct TestPortal {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    router: Router,
}

impl TestPortal {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        let config = PortalConfig::memory(ordering());
        let store = Arc::new(MemoryStore::new());
        let shared: SharedStore = store.clone();
        let state = AppState::new(config.clone(), shared, clock);
        let router = supply_desk_portal::app(state.clone(), memory_session_layer(&config));
        Self {
            store,
            state,
            router,
        }
    }

    /// A portal with one administrator and one technician.
    pub async fn with_users(clock: Clock) -> Self {
        let portal = Self::new(clock);
        portal.add_user(ADMIN_EMAIL, "Ana", "Paz", Role::Admin).await;
        portal
            .add_user(TECNICO_EMAIL, "Luis", "Gomez", Role::Tecnico)
            .await;
        portal
    }

    pub async fn add_user(
        &self,
        email: &str,
        given_name: &str,
        family_name: &str,
        role: Role,
    ) -> UserAccount {
        let form = AccountForm {
            given_name: given_name.into(),
            family_name: family_name.into(),
            email: email.into(),
            password: PASSWORD.into(),
            confirm_password: PASSWORD.into(),
        };
        AuthService::new(self.store.as_ref())
            .provision(&form, role)
            .await
            .unwrap()
    }

    pub async fn add_product(&self, name: &str, category: Category, max_qty: i32) -> CatalogEntry {
        self.state
            .catalog()
            .create(&product(name, category, max_qty))
            .await
            .unwrap()
    }

    /// A client with no session.
    #[must_use]
    pub fn client(&self) -> TestClient {
        TestClient {
            router: self.router.clone(),
            cookie: None,
        }
    }

    /// A client signed in as `email`.
    pub async fn signed_in(&self, email: &str) -> TestClient {
        let mut client = self.client();
        let response = client.login(email, PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {:?}", response.body);
        client
    }
}

#[must_use]
pub fn product(name: &str, category: Category, max_qty: i32) -> NewCatalogEntry {
    NewCatalogEntry {
        image_ref: format!("catalog/{name}.png"),
        name: name.into(),
        min_qty: 0,
        max_qty,
        category,
        availability: Availability::Available,
    }
}

/// The session a signed-in user gets.
#[must_use]
pub fn session(account: &UserAccount) -> Session {
    Session::from(account)
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// JSON body, a string for plain-text bodies, `Null` when empty.
    pub body: Value,
}

impl TestResponse {
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// In-process HTTP client that carries the session cookie between requests.
pub struct TestClient {
    router: Router,
    cookie: Option<String>,
}

impl TestClient {
    fn request(&self, method: Method, path: &str, body: Option<Value>) -> Request<Body> {
        let mut request = Request::builder().method(method).uri(path);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap()
    }

    pub async fn send(&mut self, method: Method, path: &str, body: Option<Value>) -> TestResponse {
        let request = self.request(method, path, body);
        let response = self.router.clone().oneshot(request).await.unwrap();
        self.remember_cookie(response.headers());

        let status = response.status();
        let headers = response.headers().clone();
        let is_stream = headers
            .get(header::CONTENT_TYPE)
            .is_some_and(|v| v.as_bytes().starts_with(b"text/event-stream"));
        let body = if is_stream {
            Value::Null
        } else {
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            }
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Open an event stream and return its first chunk as text.
    pub async fn first_event(&mut self, path: &str) -> String {
        let request = self.request(Method::GET, path, None);
        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&chunk).into_owned()
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&mut self, path: &str, body: Value) -> TestResponse {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put(&mut self, path: &str, body: Value) -> TestResponse {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&mut self, path: &str) -> TestResponse {
        self.send(Method::DELETE, path, None).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/api/login",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    #[must_use]
    pub const fn has_cookie(&self) -> bool {
        self.cookie.is_some()
    }

    fn remember_cookie(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let Some(pair) = value.split(';').next() else {
                continue;
            };
            let Some((name, cookie)) = pair.split_once('=') else {
                continue;
            };
            if name.trim() != SESSION_COOKIE_NAME {
                continue;
            }
            self.cookie = if cookie.is_empty() {
                None
            } else {
                Some(pair.trim().to_owned())
            };
        }
    }
}
