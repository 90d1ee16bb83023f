//! Technician ordering: vehicle, catalog, cart and submission.
//!
//! Reads are always allowed. Anything that changes the cart or places an
//! order is refused outside business hours.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use serde::Deserialize;
use tracing::instrument;

use supply_desk_core::{CatalogEntry, Order, ProductId, VehicleTag};

use crate::error::AppError;
use crate::middleware::{Gated, RequireUser};
use crate::services::{CartView, Notice, OrderError, OrderingStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SelectVehicleRequest {
    pub vehicle: VehicleTag,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i32,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ordering/status", get(status))
        .route("/api/vehicles", get(vehicles))
        .route("/api/catalog", get(catalog))
        .route("/api/cart", get(cart))
        .route("/api/cart/vehicle", put(select_vehicle))
        .route("/api/cart/items/{id}/quantity", put(set_quantity))
        .route("/api/cart/items/{id}", post(add_item).delete(remove_item))
        .route("/api/cart/submit", post(submit))
}

fn require_open(state: &AppState) -> Result<(), AppError> {
    if state.hours().is_open() {
        Ok(())
    } else {
        Err(AppError::OutsideBusinessHours)
    }
}

async fn status(State(state): State<AppState>, _user: RequireUser) -> Json<OrderingStatus> {
    Json(state.hours().status())
}

async fn vehicles(State(state): State<AppState>, _user: RequireUser) -> Json<Vec<VehicleTag>> {
    Json(state.orders().vehicles().to_vec())
}

/// Orderable entries, in display order.
async fn catalog(
    State(state): State<AppState>,
    _user: RequireUser,
) -> Result<Json<Vec<CatalogEntry>>, AppError> {
    Ok(Json(state.catalog().available().await?))
}

async fn cart(State(state): State<AppState>, Gated(session, _): RequireUser) -> Json<CartView> {
    let cart = state.carts().cart_for(&session.email).await;
    let view = cart.lock().await.view();
    Json(view)
}

#[instrument(skip(state, session), fields(email = %session.email))]
async fn select_vehicle(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
    Json(request): Json<SelectVehicleRequest>,
) -> Result<Json<CartView>, AppError> {
    require_open(&state)?;
    if !state.orders().vehicles().contains(&request.vehicle) {
        return Err(OrderError::UnknownVehicle(request.vehicle).into());
    }

    let cart = state.carts().cart_for(&session.email).await;
    let mut cart = cart.lock().await;
    cart.select_vehicle(request.vehicle);
    Ok(Json(cart.view()))
}

async fn set_quantity(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
    Path(id): Path<ProductId>,
    Json(request): Json<QuantityRequest>,
) -> Result<Json<CartView>, AppError> {
    require_open(&state)?;
    let entry = state.catalog().entry(id).await?;

    let cart = state.carts().cart_for(&session.email).await;
    let mut cart = cart.lock().await;
    cart.set_quantity(&entry, request.quantity)?;
    Ok(Json(cart.view()))
}

/// Commit the staged quantity. Nothing staged leaves the cart unchanged.
async fn add_item(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
    Path(id): Path<ProductId>,
) -> Result<Json<CartView>, AppError> {
    require_open(&state)?;
    let entry = state.catalog().entry(id).await?;

    let cart = state.carts().cart_for(&session.email).await;
    let mut cart = cart.lock().await;
    if cart.add_to_cart(&entry)? {
        state
            .notices()
            .send(&session.email, Notice::info(format!("{} added to the cart", entry.name)));
    }
    Ok(Json(cart.view()))
}

async fn remove_item(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
    Path(id): Path<ProductId>,
) -> Result<Json<CartView>, AppError> {
    require_open(&state)?;
    let cart = state.carts().cart_for(&session.email).await;
    let mut cart = cart.lock().await;
    let line = cart.remove_from_cart(id)?;
    state
        .notices()
        .send(&session.email, Notice::info(format!("{} removed from the cart", line.name)));
    Ok(Json(cart.view()))
}

/// Submit the cart as a pending order.
///
/// The cart is emptied only once the order is stored; a failed submission
/// keeps it for another try.
#[instrument(skip(state, session), fields(email = %session.email))]
async fn submit(
    State(state): State<AppState>,
    Gated(session, _): RequireUser,
) -> Result<Json<Order>, AppError> {
    require_open(&state)?;
    let cart = state.carts().cart_for(&session.email).await;
    let mut cart = cart.lock().await;

    let submitted = state
        .orders()
        .submit(&session, cart.vehicle(), cart.lines())
        .await;
    match submitted {
        Ok(order) => {
            cart.clear();
            state
                .notices()
                .send(&session.email, Notice::success("Order placed"));
            Ok(Json(order))
        }
        Err(e) => {
            let notice = match &e {
                OrderError::EmptyCart => Notice::warning("Add at least one item before ordering"),
                OrderError::MissingVehicle => Notice::warning("Select a vehicle before ordering"),
                _ => Notice::error("The order could not be placed"),
            };
            state.notices().send(&session.email, notice);
            Err(e.into())
        }
    }
}
