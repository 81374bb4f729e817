//! Cart route handlers.
//!
//! Every mutation responds with the full cart so the client can re-render
//! totals without a second request.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use verdant_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::services::cart::{CartService, CartView};
use crate::state::AppState;

/// Add-to-cart body.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

/// Quantity update body.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub quantity: i32,
}

fn service<'a>(state: &'a AppState, user: &'a CurrentUser) -> CartService<'a> {
    CartService::new(state.backend(), state.media(), user.id, &user.access_token)
}

/// GET /api/cart
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartView>> {
    Ok(Json(service(&state, &user).view().await?))
}

/// POST /api/cart
///
/// Adds to the existing line when the product is already in the cart.
///
/// # Errors
///
/// Returns 409 when the requested quantity exceeds stock.
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<AddRequest>,
) -> Result<Json<CartView>> {
    let cart = service(&state, &user)
        .add(req.product_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// PUT /api/cart/{product_id}
///
/// A quantity of zero removes the line.
///
/// # Errors
///
/// Returns 404 if the product is not in the cart, 409 when out of stock.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<CartView>> {
    let cart = service(&state, &user)
        .set_quantity(product_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// DELETE /api/cart/{product_id}
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartView>> {
    Ok(Json(service(&state, &user).remove(product_id).await?))
}

/// DELETE /api/cart
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<StatusCode> {
    service(&state, &user).clear().await?;
    Ok(StatusCode::NO_CONTENT)
}
