//! Page routes.
//!
//! The browser client renders every view itself; these routes decide who may
//! open a page and hand it the session and navigation it renders with.

use axum::{
    Json, Router,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;

use supply_desk_core::Session;

use crate::middleware::{Gated, OptionalUser, RequireAdmin, RequireUser};
use crate::services::{MenuItem, menu_for};
use crate::state::AppState;

/// What a gated page is opened with.
#[derive(Debug, Serialize)]
pub struct PageContext {
    pub page: &'static str,
    pub session: Session,
    pub menu: &'static [MenuItem],
}

impl PageContext {
    fn new(page: &'static str, session: Session) -> Self {
        let menu = menu_for(session.role);
        Self {
            page,
            session,
            menu,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/", get(order_page))
        .route("/history", get(history_page))
        .route("/admin/products", get(products_page))
        .route("/admin/orders", get(orders_page))
        .route("/admin/users", get(users_page))
}

/// Login page. A signed-in user goes straight to ordering.
async fn login(OptionalUser(session): OptionalUser) -> Response {
    if session.is_some() {
        return Redirect::to("/").into_response();
    }
    Json(json!({ "page": "login", "action": "/api/login" })).into_response()
}

async fn order_page(Gated(session, _): RequireUser) -> Json<PageContext> {
    Json(PageContext::new("order", session))
}

async fn history_page(Gated(session, _): RequireUser) -> Json<PageContext> {
    Json(PageContext::new("history", session))
}

async fn products_page(Gated(session, _): RequireAdmin) -> Json<PageContext> {
    Json(PageContext::new("products", session))
}

async fn orders_page(Gated(session, _): RequireAdmin) -> Json<PageContext> {
    Json(PageContext::new("orders", session))
}

async fn users_page(Gated(session, _): RequireAdmin) -> Json<PageContext> {
    Json(PageContext::new("users", session))
}
