//! Authentication error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] verdant_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Email address not yet confirmed.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// Refresh token revoked or expired; the user must sign in again.
    #[error("session expired")]
    SessionExpired,

    /// Session state missing or invalid.
    #[error("invalid session state")]
    InvalidSessionState,

    /// Backend error.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
