//! Authentication extractors.
//!
//! The signed-in user lives in the session. Extraction refreshes the backend
//! access token when it is about to expire and writes the new tokens back, so
//! handlers always see a usable token.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use verdant_core::CompanyId;

use crate::models::{CurrentUser, session_keys};
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires a signed-in user linked to a company.
pub struct RequireCompany {
    pub user: CurrentUser,
    pub company: CompanyId,
}

/// Why an authenticated extractor refused the request.
#[derive(Debug)]
pub enum AuthRejection {
    /// No user in the session, or the session could not be refreshed.
    Unauthorized,
    /// Signed in, but not a company account.
    NotACompany,
    /// The session store failed.
    Session,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Sign in required"),
            Self::NotACompany => (StatusCode::FORBIDDEN, "Company account required"),
            Self::Session => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Load the session user, refreshing its access token if needed.
///
/// A refresh token the backend no longer accepts signs the user out.
async fn load_user(session: &Session, state: &AppState) -> Result<Option<CurrentUser>, AuthRejection> {
    let Some(user) = session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read session");
            AuthRejection::Session
        })?
    else {
        return Ok(None);
    };

    let now = state.now_unix();
    if !user.needs_refresh(now) {
        return Ok(Some(user));
    }

    match AuthService::new(state.backend()).refresh(&user, now).await {
        Ok(refreshed) => {
            set_current_user(session, &refreshed)
                .await
                .map_err(|_| AuthRejection::Session)?;
            Ok(Some(refreshed))
        }
        Err(AuthError::SessionExpired) => {
            tracing::info!(user_id = %user.id, "Refresh token rejected; signing out");
            clear_current_user(session)
                .await
                .map_err(|_| AuthRejection::Session)?;
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Token refresh failed");
            Err(AuthRejection::Unauthorized)
        }
    }
}

fn session_of(parts: &Parts) -> Result<&Session, AuthRejection> {
    parts
        .extensions
        .get::<Session>()
        .ok_or(AuthRejection::Session)
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = session_of(parts)?;
        load_user(session, state)
            .await?
            .map(Self)
            .ok_or(AuthRejection::Unauthorized)
    }
}

impl FromRequestParts<AppState> for RequireCompany {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        let company = user.company_id.ok_or(AuthRejection::NotACompany)?;
        Ok(Self { user, company })
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if the user is not
/// logged in or the session cannot be refreshed.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => load_user(session, state).await.ok().flatten(),
            None => None,
        };
        Ok(Self(user))
    }
}

/// Helper to set the current user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// Also drops any per-user form state held in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    session
        .remove::<serde_json::Value>(session_keys::PRODUCT_DRAFT)
        .await?;
    session
        .remove::<serde_json::Value>(session_keys::PENDING_CHECKOUT)
        .await?;
    Ok(())
}
