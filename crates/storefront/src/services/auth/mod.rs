//! Authentication service.
//!
//! Password and Google sign-in against the backend's auth API. A successful
//! sign-in produces a [`CurrentUser`] for the session; access tokens are
//! refreshed from the stored refresh token when they near expiry.

mod error;

pub use error::AuthError;

use tracing::instrument;
use verdant_core::Email;

use crate::backend::{
    AuthSession, BackendClient, BackendError, Bearer, OAuthProvider, Pkce, SignUpOutcome,
};
use crate::models::CurrentUser;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Outcome of a registration.
#[derive(Debug)]
pub enum Registration {
    /// The account is active and signed in.
    SignedIn(CurrentUser),
    /// The user must follow the emailed confirmation link first.
    ConfirmationRequired,
}

/// Authentication service.
pub struct AuthService<'a> {
    backend: &'a BackendClient,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient) -> Self {
        Self { backend }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password, full_name))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
        now_unix: i64,
    ) -> Result<Registration, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        let metadata = full_name.map_or_else(
            || serde_json::json!({}),
            |name| serde_json::json!({ "full_name": name.trim() }),
        );

        let outcome = self
            .backend
            .sign_up(email.as_str(), password, metadata)
            .await
            .map_err(|e| match e {
                BackendError::Api { message, .. } if is_already_registered(&message) => {
                    AuthError::UserAlreadyExists
                }
                BackendError::Api { status: 422, message } => AuthError::WeakPassword(message),
                other => AuthError::Backend(other),
            })?;

        match outcome {
            SignUpOutcome::SignedIn(session) => {
                tracing::info!(user_id = %session.user.id, "Account registered");
                Ok(Registration::SignedIn(self.establish(session, now_unix).await?))
            }
            SignUpOutcome::ConfirmationSent(user) => {
                tracing::info!(user_id = %user.id, "Account registered, awaiting confirmation");
                Ok(Registration::ConfirmationRequired)
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email or password is wrong.
    /// Returns `AuthError::EmailNotConfirmed` if the account is not confirmed yet.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        now_unix: i64,
    ) -> Result<CurrentUser, AuthError> {
        let email = Email::parse(email)?;

        let session = self
            .backend
            .sign_in_with_password(email.as_str(), password)
            .await
            .map_err(|e| match e {
                BackendError::Api { message, .. }
                    if message.to_ascii_lowercase().contains("not confirmed") =>
                {
                    AuthError::EmailNotConfirmed
                }
                BackendError::Api { status: 400, .. } | BackendError::Unauthorized(_) => {
                    AuthError::InvalidCredentials
                }
                other => AuthError::Backend(other),
            })?;

        self.establish(session, now_unix).await
    }

    /// Exchange the stored refresh token for a fresh access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionExpired` if the refresh token is no longer valid.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn refresh(&self, user: &CurrentUser, now_unix: i64) -> Result<CurrentUser, AuthError> {
        let session = self
            .backend
            .refresh_session(&user.refresh_token)
            .await
            .map_err(|e| match e {
                BackendError::Unauthorized(_) | BackendError::Api { status: 400, .. } => {
                    AuthError::SessionExpired
                }
                other => AuthError::Backend(other),
            })?;

        let expires_at = session.expires_at_or(now_unix);
        tracing::debug!(expires_at, "Access token refreshed");
        Ok(CurrentUser {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at,
            ..user.clone()
        })
    }

    /// Revoke the backend session. Failures are logged; the caller clears
    /// its own session regardless.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn logout(&self, user: &CurrentUser) {
        if let Err(e) = self.backend.sign_out(&user.access_token).await {
            tracing::warn!(error = %e, "Failed to revoke backend session");
        }
    }

    // =========================================================================
    // OAuth
    // =========================================================================

    /// Begin an OAuth sign-in. The returned verifier must be kept in the
    /// session until the callback.
    #[must_use]
    pub fn oauth_start(&self, provider: OAuthProvider, redirect_to: &str) -> (String, Pkce) {
        let pkce = Pkce::generate();
        let url = self.backend.oauth_authorize_url(provider, redirect_to, &pkce);
        (url, pkce)
    }

    /// Finish an OAuth sign-in from the callback's `code`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSessionState` if the code was rejected.
    #[instrument(skip_all)]
    pub async fn oauth_complete(
        &self,
        code: &str,
        verifier: &str,
        now_unix: i64,
    ) -> Result<CurrentUser, AuthError> {
        let session = self
            .backend
            .exchange_code_for_session(code, verifier)
            .await
            .map_err(|e| match e {
                BackendError::Api { status: 400 | 404, .. } | BackendError::Unauthorized(_) => {
                    AuthError::InvalidSessionState
                }
                other => AuthError::Backend(other),
            })?;

        self.establish(session, now_unix).await
    }

    /// Build the session user, reading the profile for the company link.
    async fn establish(&self, session: AuthSession, now_unix: i64) -> Result<CurrentUser, AuthError> {
        let expires_at = session.expires_at_or(now_unix);
        let profile = self
            .backend
            .get_profile(session.user.id, Bearer::User(&session.access_token))
            .await?;

        if profile.is_none() {
            tracing::warn!(user_id = %session.user.id, "Signed in without a profile row");
        }

        let email = session
            .user
            .email
            .as_deref()
            .and_then(|e| Email::parse(e).ok());
        let full_name = profile
            .as_ref()
            .and_then(|p| p.full_name.clone())
            .or_else(|| session.user.full_name().map(str::to_owned));

        tracing::info!(user_id = %session.user.id, "User signed in");
        Ok(CurrentUser {
            id: session.user.id,
            email,
            full_name,
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at,
            company_id: profile.and_then(|p| p.company_id),
        })
    }
}

fn is_already_registered(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already registered") || message.contains("already exists")
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;
    use verdant_core::{CompanyId, UserId};

    use super::*;
    use crate::backend::tests::client_for;

    fn session_body(user: UserId) -> serde_json::Value {
        serde_json::json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3600,
            "user": {
                "id": user,
                "email": "asha@example.com",
                "user_metadata": { "full_name": "Asha Rao" }
            }
        })
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[tokio::test]
    async fn test_weak_password_is_rejected_before_backend_call() {
        let server = mockito::Server::new_async().await;
        let backend = client_for(&server);
        let result = AuthService::new(&backend)
            .register("asha@example.com", "abc", None, 0)
            .await;
        assert!(matches!(result, Err(AuthError::WeakPassword(_))));
    }

    #[tokio::test]
    async fn test_login_reads_company_from_profile() {
        let mut server = mockito::Server::new_async().await;
        let user = UserId::random();
        let company = CompanyId::random();
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .with_body(session_body(user).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer at-1")
            .with_body(
                serde_json::json!([{ "id": user, "full_name": "Asha R.", "company_id": company }])
                    .to_string(),
            )
            .create_async()
            .await;

        let backend = client_for(&server);
        let current = AuthService::new(&backend)
            .login("asha@example.com", "correct horse", 1_000)
            .await
            .unwrap();

        assert_eq!(current.id, user);
        assert_eq!(current.company_id, Some(company));
        assert_eq!(current.full_name.as_deref(), Some("Asha R."));
        assert_eq!(current.expires_at, 4_600);
    }

    #[tokio::test]
    async fn test_wrong_password_maps_to_invalid_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error_description":"Invalid login credentials"}"#)
            .create_async()
            .await;

        let backend = client_for(&server);
        let result = AuthService::new(&backend)
            .login("asha@example.com", "wrong password", 0)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/signup")
            .with_status(422)
            .with_body(r#"{"msg":"User already registered"}"#)
            .create_async()
            .await;

        let backend = client_for(&server);
        let result = AuthService::new(&backend)
            .register("asha@example.com", "long enough", Some("Asha"), 0)
            .await;
        assert!(matches!(result, Err(AuthError::UserAlreadyExists)));
    }

    #[tokio::test]
    async fn test_sign_up_awaiting_confirmation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/signup")
            .with_body(
                serde_json::json!({ "id": UserId::random(), "email": "asha@example.com" })
                    .to_string(),
            )
            .create_async()
            .await;

        let backend = client_for(&server);
        let result = AuthService::new(&backend)
            .register("asha@example.com", "long enough", None, 0)
            .await
            .unwrap();
        assert!(matches!(result, Registration::ConfirmationRequired));
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_expires_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(400)
            .with_body(r#"{"error_description":"Invalid Refresh Token"}"#)
            .create_async()
            .await;

        let backend = client_for(&server);
        let user = CurrentUser {
            id: UserId::random(),
            email: None,
            full_name: None,
            access_token: "old".to_owned(),
            refresh_token: "revoked".to_owned(),
            expires_at: 0,
            company_id: None,
        };
        let result = AuthService::new(&backend).refresh(&user, 10).await;
        assert!(matches!(result, Err(AuthError::SessionExpired)));
    }

    #[test]
    fn test_oauth_start_carries_challenge() {
        let server_url = "http://backend.test";
        let backend = BackendClient::new(&crate::config::BackendConfig {
            url: server_url.to_owned(),
            anon_key: secrecy::SecretString::from("anon-key"),
        });
        let (url, pkce) =
            AuthService::new(&backend).oauth_start(OAuthProvider::Google, "https://shop.test/cb");
        assert!(url.starts_with("http://backend.test/auth/v1/authorize?provider=google"));
        assert!(url.contains(&pkce.challenge));
        assert!(!url.contains(&pkce.verifier));
    }
}
