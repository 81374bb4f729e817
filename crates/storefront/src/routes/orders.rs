//! Customer order route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use verdant_core::OrderId;

use crate::backend::Order;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::services::orders::CustomerOrders;
use crate::state::AppState;

/// GET /api/orders
///
/// Newest first.
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    let orders = CustomerOrders::new(state.backend(), user.id, &user.access_token)
        .list()
        .await?;
    Ok(Json(orders))
}

/// GET /api/orders/{id}
///
/// # Errors
///
/// Returns 404 for unknown orders and orders of other users.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    let order = CustomerOrders::new(state.backend(), user.id, &user.access_token)
        .get(id)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/{id}/cancel
///
/// # Errors
///
/// Returns 409 once the order has shipped.
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    let order = CustomerOrders::new(state.backend(), user.id, &user.access_token)
        .cancel(id)
        .await?;
    Ok(Json(order))
}
