//! HTTP route handlers for the portal.
//!
//! # Route Structure
//!
//! ```text
//! # Pages (gated; the client renders them)
//! GET  /login                          - Login page (signed-in users go to /)
//! GET  /, /history                     - Ordering and history (any user)
//! GET  /admin/products|orders|users    - Administration (admins)
//!
//! # Auth
//! POST /api/login                      - Sign in
//! POST /api/register                   - Self-registration
//! POST /api/logout                     - Sign out
//! GET  /api/session, /api/menu         - Current session and its menu
//!
//! # Ordering (cart writes only during business hours)
//! GET  /api/ordering/status            - Business hours
//! GET  /api/vehicles, /api/catalog     - Fleet and orderable catalog
//! GET  /api/cart                       - Current cart
//! PUT  /api/cart/vehicle               - Select vehicle
//! PUT  /api/cart/items/{id}/quantity   - Stage a quantity
//! POST /api/cart/items/{id}            - Add staged quantity to cart
//! DELETE /api/cart/items/{id}          - Remove from cart
//! POST /api/cart/submit                - Submit the cart as an order
//!
//! # History
//! GET  /api/history[/grouped|/stream]  - Completed orders visible to the user
//!
//! # Administration
//! GET/POST /api/admin/products         - Catalog view / create
//! PUT  /api/admin/products/{id}        - Edit
//! POST /api/admin/products/reorder     - Drag reorder
//! POST /api/admin/products/reload      - Resync view from store
//! GET  /api/admin/orders[/stream]      - Pending orders
//! POST /api/admin/orders/{id}/complete - Complete an order
//! GET/POST /api/admin/users            - Users / add user
//! PUT  /api/admin/users/{id}           - Edit user
//!
//! # Confirmations (destructive actions)
//! POST /api/confirmations[/confirm|/cancel]
//!
//! # Notices
//! GET  /api/notices/stream             - Per-user notices (SSE)
//! ```

pub mod admin_orders;
pub mod admin_products;
pub mod admin_users;
pub mod auth;
pub mod confirmations;
pub mod history;
pub mod notices;
pub mod ordering;
pub mod pages;

use std::convert::Infallible;

use axum::{
    Router,
    extract::Request,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::db::{FeedState, Subscription};
use crate::error::AppError;
use crate::middleware::{GateRejection, OptionalUser};
use crate::state::AppState;

/// Build the portal router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(pages::router())
        .merge(auth::router())
        .merge(ordering::router())
        .merge(history::router())
        .merge(admin_products::router())
        .merge(admin_orders::router())
        .merge(admin_users::router())
        .merge(confirmations::router())
        .merge(notices::router())
        .fallback(fallback)
}

/// Unknown paths: not found for signed-in users, the login redirect for
/// everyone else.
async fn fallback(OptionalUser(session): OptionalUser, request: Request) -> Response {
    if session.is_some() {
        AppError::NotFound(request.uri().path().to_string()).into_response()
    } else if request.uri().path().starts_with("/api/") {
        GateRejection::Unauthorized.into_response()
    } else {
        GateRejection::RedirectToLogin.into_response()
    }
}

/// Stream a live query as SSE.
///
/// Each snapshot is a `snapshot` event with the JSON list; a failed fetch is
/// an `error` event with a displayable message. The stream owns the
/// subscription, so a disconnecting client stops the background query.
pub fn feed_sse<T>(
    subscription: Subscription<T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let events = subscription.into_stream().filter_map(|state| async move {
        match state {
            FeedState::Loading => None,
            FeedState::Ready(value) => {
                let json = serde_json::to_string(&value).unwrap_or_else(|_| "[]".to_string());
                Some(Ok(Event::default().event("snapshot").data(json)))
            }
            FeedState::Failed(message) => Some(Ok(Event::default().event("error").data(message))),
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
