//! Backend change notifications.
//!
//! The backend's database webhooks post row changes to `/hooks/changes`.
//! Clients poll `/api/changes` for revision counters and refetch whatever
//! moved since their last poll.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::Serialize;
use sha2::Sha256;

use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::services::invalidation::{ChangeEvent, InvalidationKey};
use crate::state::AppState;

/// Header carrying the shared webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

const SECRET_CONTEXT: &[u8] = b"verdant-change-webhook";

/// Compare secrets without leaking the position of the first mismatch.
fn secret_matches(expected: &str, provided: &str) -> bool {
    let Ok(mut reference) = Hmac::<Sha256>::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    reference.update(SECRET_CONTEXT);
    let reference = reference.finalize().into_bytes();

    let Ok(mut candidate) = Hmac::<Sha256>::new_from_slice(provided.as_bytes()) else {
        return false;
    };
    candidate.update(SECRET_CONTEXT);
    candidate.verify_slice(&reference).is_ok()
}

/// POST /hooks/changes
///
/// # Errors
///
/// Returns 401 without the shared secret.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<ChangeEvent>,
) -> Result<StatusCode> {
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secret_matches(state.config().webhook_secret.expose_secret(), provided) {
        tracing::warn!(table = %event.table, "Rejected change notification with bad secret");
        return Err(AppError::Unauthorized("invalid webhook secret".to_string()));
    }

    let queued = state.invalidations().push_event(&event);
    tracing::debug!(table = %event.table, kind = ?event.kind, queued, "Change notification received");
    Ok(StatusCode::ACCEPTED)
}

/// Revision counters visible to the caller.
#[derive(Debug, Serialize)]
pub struct RevisionsResponse {
    pub products: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<u64>,
}

/// GET /api/changes
pub async fn revisions(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> Json<RevisionsResponse> {
    let revisions = state.revisions();
    let user = user.as_ref();
    Json(RevisionsResponse {
        products: revisions.get(InvalidationKey::Products),
        cart: user.map(|u| revisions.get(InvalidationKey::Cart(u.id))),
        orders: user.map(|u| revisions.get(InvalidationKey::Orders(u.id))),
        company: user
            .and_then(|u| u.company_id)
            .map(|c| revisions.get(InvalidationKey::Company(c))),
    })
}
