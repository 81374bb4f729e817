//! Account route handlers.
//!
//! Profile details and the address book. These routes require
//! authentication.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tower_sessions::Session;
use verdant_core::{Address, AddressBook, AddressId};

use crate::backend::{Bearer, Profile, ProfileUpdate};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAuth, set_current_user};
use crate::services::addresses::AddressService;
use crate::state::AppState;

/// Longest accepted display name.
const MAX_NAME_CHARS: usize = 120;

/// Profile update body.
#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

/// GET /api/account
///
/// # Errors
///
/// Returns 404 if the profile row is missing.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Profile>> {
    let profile = state
        .backend()
        .get_profile(user.id, Bearer::User(&user.access_token))
        .await?
        .ok_or_else(|| AppError::NotFound("profile".to_string()))?;
    Ok(Json(profile))
}

/// PATCH /api/account
///
/// # Errors
///
/// Returns 400 for an over-long name.
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(mut user): RequireAuth,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<Profile>> {
    let full_name = req.full_name.map(|n| n.trim().to_owned());
    if full_name
        .as_deref()
        .is_some_and(|n| n.chars().count() > MAX_NAME_CHARS)
    {
        return Err(AppError::BadRequest(format!(
            "name must be at most {MAX_NAME_CHARS} characters"
        )));
    }

    let update = ProfileUpdate {
        full_name,
        phone: req.phone.map(|p| p.trim().to_owned()),
        addresses: None,
    };
    let profile = state
        .backend()
        .update_profile(user.id, &update, Bearer::User(&user.access_token))
        .await?;

    if profile.full_name != user.full_name {
        user.full_name.clone_from(&profile.full_name);
        set_current_user(&session, &user).await?;
    }
    Ok(Json(profile))
}

// =============================================================================
// Addresses
// =============================================================================

/// GET /api/account/addresses
///
/// # Errors
///
/// Returns 404 if the profile row is missing.
pub async fn addresses(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<AddressBook>> {
    let book = AddressService::new(state.backend(), user.id, &user.access_token)
        .list()
        .await?;
    Ok(Json(book))
}

/// POST /api/account/addresses
///
/// # Errors
///
/// Returns 400 if a required field is blank or the pincode is malformed.
pub async fn create_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(address): Json<Address>,
) -> Result<Json<AddressBook>> {
    let book = AddressService::new(state.backend(), user.id, &user.access_token)
        .add(address)
        .await?;
    Ok(Json(book))
}

/// PUT /api/account/addresses/{id}
///
/// # Errors
///
/// Returns 404 for an unknown address.
pub async fn update_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
    Json(mut address): Json<Address>,
) -> Result<Json<AddressBook>> {
    address.id = id;
    let book = AddressService::new(state.backend(), user.id, &user.access_token)
        .update(address)
        .await?;
    Ok(Json(book))
}

/// DELETE /api/account/addresses/{id}
///
/// # Errors
///
/// Returns 404 for an unknown address.
pub async fn delete_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<Json<AddressBook>> {
    let book = AddressService::new(state.backend(), user.id, &user.access_token)
        .remove(id)
        .await?;
    Ok(Json(book))
}

/// POST /api/account/addresses/{id}/default
///
/// # Errors
///
/// Returns 404 for an unknown address.
pub async fn set_default_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<Json<AddressBook>> {
    let book = AddressService::new(state.backend(), user.id, &user.access_token)
        .set_default(id)
        .await?;
    Ok(Json(book))
}
