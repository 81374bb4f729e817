//! Company dashboard route handlers.
//!
//! All routes require a signed-in user whose profile is linked to a company.
//! Statistics come from the process-wide dashboard cache; product and order
//! writes drop the company's cache entry so the next read recomputes.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use verdant_core::{OrderId, OrderStatus, ProductId};

use crate::backend::{Company, Product, ProductPatch};
use crate::error::{AppError, Result};
use crate::middleware::RequireCompany;
use crate::services::dashboard::{BackendDashboardSource, DashboardStats};
use crate::services::orders::{CompanyOrderView, CompanyOrders};
use crate::services::products::{ProductInput, ProductManager};
use crate::state::AppState;

/// Multipart field carrying an uploaded image.
pub const IMAGE_FIELD: &str = "image";

/// An uploaded file, read fully into memory.
#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Read the image field out of a multipart body.
///
/// # Errors
///
/// Returns 400 for malformed bodies or a missing field.
pub async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("image").to_owned();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
            .to_vec();
        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(AppError::BadRequest(format!(
        "missing `{IMAGE_FIELD}` file field"
    )))
}

pub(crate) fn manager<'a>(state: &'a AppState, auth: &'a RequireCompany) -> ProductManager<'a> {
    ProductManager::new(
        state.backend(),
        state.media(),
        state.dashboard(),
        auth.company,
        &auth.user.access_token,
    )
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Recompute even if the cached snapshot is fresh.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: Arc<DashboardStats>,
    pub computed_at: DateTime<Utc>,
}

/// GET /api/dashboard/stats
///
/// # Errors
///
/// Returns 403 if the profile is no longer linked to the company, 502 if a
/// backend read fails.
pub async fn stats(
    State(state): State<AppState>,
    auth: RequireCompany,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>> {
    let source = BackendDashboardSource::new(state.backend(), auth.user.id, &auth.user.access_token);
    let cached = state
        .dashboard()
        .fetch(auth.company, &source, query.force)
        .await?;
    Ok(Json(StatsResponse {
        stats: cached.stats,
        computed_at: cached.computed_at,
    }))
}

/// GET /api/dashboard/company
///
/// # Errors
///
/// Returns 404 if the company row is not visible.
pub async fn company(State(state): State<AppState>, auth: RequireCompany) -> Result<Json<Company>> {
    Ok(Json(manager(&state, &auth).company().await?))
}

// =============================================================================
// Products
// =============================================================================

/// GET /api/dashboard/products
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn products(
    State(state): State<AppState>,
    auth: RequireCompany,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(manager(&state, &auth).list().await?))
}

/// POST /api/dashboard/products
///
/// # Errors
///
/// Returns 400 for invalid fields, 403 while the company awaits approval.
pub async fn create_product(
    State(state): State<AppState>,
    auth: RequireCompany,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = manager(&state, &auth).create(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PATCH /api/dashboard/products/{id}
///
/// # Errors
///
/// Returns 403 for another company's product.
pub async fn update_product(
    State(state): State<AppState>,
    auth: RequireCompany,
    Path(id): Path<ProductId>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>> {
    Ok(Json(manager(&state, &auth).update(id, patch).await?))
}

/// DELETE /api/dashboard/products/{id}
///
/// # Errors
///
/// Returns 403 for another company's product.
pub async fn delete_product(
    State(state): State<AppState>,
    auth: RequireCompany,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    manager(&state, &auth).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/dashboard/products/{id}/images
///
/// Multipart body with one `image` file field.
///
/// # Errors
///
/// Returns 400 for unsupported or oversized files.
pub async fn upload_image(
    State(state): State<AppState>,
    auth: RequireCompany,
    Path(id): Path<ProductId>,
    multipart: Multipart,
) -> Result<Json<Product>> {
    let upload = read_upload(multipart).await?;
    let product = manager(&state, &auth)
        .upload_image(
            id,
            &upload.file_name,
            &upload.content_type,
            upload.bytes,
            state.clock().now(),
        )
        .await?;
    Ok(Json(product))
}

#[derive(Debug, Deserialize)]
pub struct RemoveImageRequest {
    /// Stored path or public URL.
    pub image: String,
}

/// DELETE /api/dashboard/products/{id}/images
///
/// # Errors
///
/// Returns 404 if the product has no such image.
pub async fn remove_image(
    State(state): State<AppState>,
    auth: RequireCompany,
    Path(id): Path<ProductId>,
    Json(req): Json<RemoveImageRequest>,
) -> Result<Json<Product>> {
    Ok(Json(manager(&state, &auth).remove_image(id, &req.image).await?))
}

// =============================================================================
// Orders
// =============================================================================

/// GET /api/dashboard/orders
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn orders(
    State(state): State<AppState>,
    auth: RequireCompany,
) -> Result<Json<Vec<CompanyOrderView>>> {
    let orders = CompanyOrders::new(state.backend(), auth.company, &auth.user.access_token)
        .list()
        .await?;
    Ok(Json(orders))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// PUT /api/dashboard/orders/{id}/status
///
/// # Errors
///
/// Returns 409 for a move outside the order lifecycle.
pub async fn set_order_status(
    State(state): State<AppState>,
    auth: RequireCompany,
    Path(id): Path<OrderId>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<CompanyOrderView>> {
    let view = CompanyOrders::new(state.backend(), auth.company, &auth.user.access_token)
        .set_status(id, req.status)
        .await?;
    state.dashboard().invalidate(auth.company);
    Ok(Json(view))
}

/// POST /api/dashboard/orders/{id}/advance
///
/// # Errors
///
/// Returns 409 for orders already delivered or cancelled.
pub async fn advance_order(
    State(state): State<AppState>,
    auth: RequireCompany,
    Path(id): Path<OrderId>,
) -> Result<Json<CompanyOrderView>> {
    let view = CompanyOrders::new(state.backend(), auth.company, &auth.user.access_token)
        .advance(id)
        .await?;
    state.dashboard().invalidate(auth.company);
    Ok(Json(view))
}
