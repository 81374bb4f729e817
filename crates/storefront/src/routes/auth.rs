//! Authentication route handlers.
//!
//! Email/password registration and sign-in, Google sign-in via the backend's
//! OAuth redirect, sign-out, and the current-user lookup the client polls on
//! load.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use verdant_core::{CompanyId, Email, UserId};

use crate::backend::OAuthProvider;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, session_keys};
use crate::services::auth::{AuthError, AuthService, Registration};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub full_name: Option<String>,
}

/// The signed-in user as the client sees it. Tokens stay server-side.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: UserId,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub company_id: Option<CompanyId>,
}

impl From<&CurrentUser> for MeResponse {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.id,
            email: user.email.as_ref().map(ToString::to_string),
            full_name: user.full_name.clone(),
            company_id: user.company_id,
        }
    }
}

/// Registration result.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegisterResponse {
    SignedIn { user: MeResponse },
    ConfirmationRequired,
}

/// OAuth callback query.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

async fn sign_in(session: &Session, user: &CurrentUser) -> Result<()> {
    // New identity, new session id.
    session.cycle_id().await?;
    set_current_user(session, user).await?;
    set_sentry_user(&user.id, user.email.as_ref().map(Email::as_str));
    Ok(())
}

// =============================================================================
// Password Routes
// =============================================================================

/// POST /api/auth/register
///
/// # Errors
///
/// Returns 400 for mismatched or weak passwords, 409 for a taken email.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RegisterRequest>,
) -> Result<Response> {
    if req.password != req.password_confirm {
        return Err(AppError::BadRequest("Passwords do not match".to_string()));
    }

    let full_name = req.full_name.as_deref().filter(|n| !n.trim().is_empty());
    let outcome = AuthService::new(state.backend())
        .register(&req.email, &req.password, full_name, state.now_unix())
        .await?;

    match outcome {
        Registration::SignedIn(user) => {
            sign_in(&session, &user).await?;
            let body = RegisterResponse::SignedIn {
                user: MeResponse::from(&user),
            };
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
        Registration::ConfirmationRequired => {
            Ok((StatusCode::ACCEPTED, Json(RegisterResponse::ConfirmationRequired)).into_response())
        }
    }
}

/// POST /api/auth/login
///
/// # Errors
///
/// Returns 401 for wrong credentials.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<MeResponse>> {
    let user = AuthService::new(state.backend())
        .login(&req.email, &req.password, state.now_unix())
        .await
        .inspect_err(|e| tracing::info!(error = %e, "Login failed"))?;

    sign_in(&session, &user).await?;
    Ok(Json(MeResponse::from(&user)))
}

/// POST /api/auth/logout
///
/// # Errors
///
/// Returns 500 if the session cannot be cleared.
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<StatusCode> {
    if let Some(user) = user {
        AuthService::new(state.backend()).logout(&user).await;
    }
    clear_current_user(&session).await?;
    session.flush().await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
///
/// # Errors
///
/// Returns 401 when nobody is signed in.
pub async fn me(OptionalAuth(user): OptionalAuth) -> Result<Json<MeResponse>> {
    user.as_ref()
        .map(|u| Json(MeResponse::from(u)))
        .ok_or_else(|| AppError::Unauthorized("not signed in".to_string()))
}

// =============================================================================
// OAuth Routes
// =============================================================================

/// GET /auth/google
///
/// Redirects to the backend's Google sign-in, which comes back to
/// [`callback`].
///
/// # Errors
///
/// Returns 500 if the verifier cannot be stored.
pub async fn google(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let redirect_to = format!("{}/auth/callback", state.config().base_url);
    let (url, pkce) =
        AuthService::new(state.backend()).oauth_start(OAuthProvider::Google, &redirect_to);
    session
        .insert(session_keys::OAUTH_VERIFIER, &pkce.verifier)
        .await?;
    Ok(Redirect::to(&url))
}

/// GET /auth/callback
///
/// Completes an OAuth sign-in and sends the browser home, or back to the
/// login page with an error code.
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = &query.error {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "OAuth provider returned an error"
        );
        return Redirect::to("/login?error=oauth").into_response();
    }

    let verifier = session
        .remove::<String>(session_keys::OAUTH_VERIFIER)
        .await
        .ok()
        .flatten();
    let (Some(code), Some(verifier)) = (query.code.as_deref(), verifier) else {
        tracing::warn!("OAuth callback without code or verifier");
        return Redirect::to("/login?error=oauth_state").into_response();
    };

    let result = AuthService::new(state.backend())
        .oauth_complete(code, &verifier, state.now_unix())
        .await;

    match result {
        Ok(user) => match sign_in(&session, &user).await {
            Ok(()) => Redirect::to("/").into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to store session after OAuth");
                Redirect::to("/login?error=session").into_response()
            }
        },
        Err(AuthError::InvalidSessionState) => {
            Redirect::to("/login?error=oauth_state").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "OAuth sign-in failed");
            Redirect::to("/login?error=oauth").into_response()
        }
    }
}
