//! Add-product form route handlers.
//!
//! The draft lives in the session between steps. Each step handler loads it,
//! applies the step and writes it back; submitting creates the product and
//! drops the draft.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde::Deserialize;
use tower_sessions::Session;

use super::dashboard::{manager, read_upload};
use crate::backend::Product;
use crate::error::Result;
use crate::middleware::RequireCompany;
use crate::models::session_keys;
use crate::services::draft::{BasicsStep, InventoryStep, PricingStep, ProductDraft};
use crate::state::AppState;

async fn load(session: &Session) -> Result<ProductDraft> {
    Ok(session
        .get::<ProductDraft>(session_keys::PRODUCT_DRAFT)
        .await?
        .unwrap_or_default())
}

async fn store(session: &Session, draft: &ProductDraft) -> Result<()> {
    session.insert(session_keys::PRODUCT_DRAFT, draft).await?;
    Ok(())
}

/// GET /api/dashboard/draft
///
/// Starts a new draft when none is in progress.
///
/// # Errors
///
/// Returns 500 if the session store fails.
pub async fn show(session: Session, _auth: RequireCompany) -> Result<Json<ProductDraft>> {
    let draft = load(&session).await?;
    store(&session, &draft).await?;
    Ok(Json(draft))
}

/// PUT /api/dashboard/draft/basics
///
/// # Errors
///
/// Returns 400 if the step does not validate.
pub async fn save_basics(
    session: Session,
    _auth: RequireCompany,
    Json(step): Json<BasicsStep>,
) -> Result<Json<ProductDraft>> {
    let mut draft = load(&session).await?;
    draft.save_basics(step)?;
    store(&session, &draft).await?;
    Ok(Json(draft))
}

/// PUT /api/dashboard/draft/pricing
///
/// # Errors
///
/// Returns 400 if basics are not saved yet or the prices are invalid.
pub async fn save_pricing(
    session: Session,
    _auth: RequireCompany,
    Json(step): Json<PricingStep>,
) -> Result<Json<ProductDraft>> {
    let mut draft = load(&session).await?;
    draft.save_pricing(step)?;
    store(&session, &draft).await?;
    Ok(Json(draft))
}

/// PUT /api/dashboard/draft/inventory
///
/// # Errors
///
/// Returns 400 if pricing is not saved yet or a value is negative.
pub async fn save_inventory(
    session: Session,
    _auth: RequireCompany,
    Json(step): Json<InventoryStep>,
) -> Result<Json<ProductDraft>> {
    let mut draft = load(&session).await?;
    draft.save_inventory(step)?;
    store(&session, &draft).await?;
    Ok(Json(draft))
}

/// POST /api/dashboard/draft/images
///
/// # Errors
///
/// Returns 400 before the media step, for a full draft, or for an
/// unacceptable file.
pub async fn upload_image(
    State(state): State<AppState>,
    session: Session,
    auth: RequireCompany,
    multipart: Multipart,
) -> Result<Json<ProductDraft>> {
    let mut draft = load(&session).await?;
    let upload = read_upload(multipart).await?;
    let key = manager(&state, &auth)
        .upload_draft_image(
            &draft,
            &upload.file_name,
            &upload.content_type,
            upload.bytes,
            state.clock().now(),
        )
        .await?;
    draft.add_image(key)?;
    store(&session, &draft).await?;
    Ok(Json(draft))
}

#[derive(Debug, Deserialize)]
pub struct RemoveImageRequest {
    pub key: String,
}

/// DELETE /api/dashboard/draft/images
///
/// # Errors
///
/// Returns 500 if the session store fails.
pub async fn remove_image(
    State(state): State<AppState>,
    session: Session,
    auth: RequireCompany,
    Json(req): Json<RemoveImageRequest>,
) -> Result<Json<ProductDraft>> {
    let mut draft = load(&session).await?;
    if draft.remove_image(&req.key) {
        manager(&state, &auth).discard_draft_image(&req.key).await;
        store(&session, &draft).await?;
    }
    Ok(Json(draft))
}

/// POST /api/dashboard/draft/submit
///
/// # Errors
///
/// Returns 400 if a step is missing or no longer validates, 403 while the
/// company awaits approval.
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    auth: RequireCompany,
) -> Result<(StatusCode, Json<Product>)> {
    let draft = load(&session).await?;
    let product = manager(&state, &auth).submit_draft(draft).await?;
    session
        .remove::<ProductDraft>(session_keys::PRODUCT_DRAFT)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// DELETE /api/dashboard/draft
///
/// Abandons the draft and removes its uploaded images.
///
/// # Errors
///
/// Returns 500 if the session store fails.
pub async fn discard(
    State(state): State<AppState>,
    session: Session,
    auth: RequireCompany,
) -> Result<StatusCode> {
    if let Some(draft) = session
        .remove::<ProductDraft>(session_keys::PRODUCT_DRAFT)
        .await?
    {
        let manager = manager(&state, &auth);
        for key in &draft.images {
            manager.discard_draft_image(key).await;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
