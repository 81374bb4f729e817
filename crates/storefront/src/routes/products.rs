//! Product catalog route handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use verdant_core::ProductId;

use crate::backend::{Bearer, ProductFilter};
use crate::error::Result;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::services::catalog::{CatalogService, ProductCard, ProductDetail, Viewer};
use crate::services::reviews::{RatingSummary, ReviewService, ReviewView, product_reviews};
use crate::state::AppState;

/// GET /api/products
///
/// # Errors
///
/// Returns 502 if the backend is unreachable and nothing is cached.
pub async fn index(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Arc<Vec<ProductCard>>>> {
    let cards = CatalogService::new(state.backend(), state.media(), state.products())
        .list(filter)
        .await?;
    Ok(Json(cards))
}

/// GET /api/products/{id}
///
/// # Errors
///
/// Returns 404 if the product does not exist or is not visible.
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductDetail>> {
    let viewer = user.as_ref().map_or(Viewer::Guest, |u| Viewer::User {
        id: u.id,
        access_token: &u.access_token,
    });
    let detail = CatalogService::new(state.backend(), state.media(), state.products())
        .detail(id, viewer)
        .await?;
    Ok(Json(detail))
}

// =============================================================================
// Reviews
// =============================================================================

/// Reviews with their summary.
#[derive(Debug, Serialize)]
pub struct ReviewsResponse {
    pub summary: RatingSummary,
    pub reviews: Vec<ReviewView>,
}

/// Review submission body.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: u8,
    pub comment: Option<String>,
}

/// GET /api/products/{id}/reviews
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn reviews(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ReviewsResponse>> {
    let (summary, reviews) = product_reviews(state.backend(), id, Bearer::Anon).await?;
    Ok(Json(ReviewsResponse { summary, reviews }))
}

/// PUT /api/products/{id}/reviews
///
/// One review per user and product; resubmitting replaces it.
///
/// # Errors
///
/// Returns 400 for a rating outside 1..=5 or an over-long comment.
pub async fn submit_review(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
    Json(req): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<ReviewView>)> {
    let review = ReviewService::new(state.backend(), user.id, &user.access_token)
        .submit(id, req.rating, req.comment.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(review)))
}

/// DELETE /api/products/{id}/reviews
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn delete_review(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    ReviewService::new(state.backend(), user.id, &user.access_token)
        .remove(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
