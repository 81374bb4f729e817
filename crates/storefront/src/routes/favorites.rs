//! Favorites route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use verdant_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::services::catalog::ProductCard;
use crate::services::favorites::FavoritesService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub is_favorite: bool,
}

/// GET /api/favorites
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<ProductCard>>> {
    let cards = FavoritesService::new(state.backend(), state.media(), user.id, &user.access_token)
        .list()
        .await?;
    Ok(Json(cards))
}

/// PUT /api/favorites/{product_id}
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product): Path<ProductId>,
) -> Result<StatusCode> {
    FavoritesService::new(state.backend(), state.media(), user.id, &user.access_token)
        .add(product)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/favorites/{product_id}
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product): Path<ProductId>,
) -> Result<StatusCode> {
    FavoritesService::new(state.backend(), state.media(), user.id, &user.access_token)
        .remove(product)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/favorites/{product_id}/toggle
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn toggle(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product): Path<ProductId>,
) -> Result<Json<ToggleResponse>> {
    let is_favorite =
        FavoritesService::new(state.backend(), state.media(), user.id, &user.access_token)
            .toggle(product)
            .await?;
    Ok(Json(ToggleResponse { is_favorite }))
}
