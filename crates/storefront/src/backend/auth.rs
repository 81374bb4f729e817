//! Authentication endpoints (`/auth/v1`).
//!
//! Password sign-in, sign-up, refresh and sign-out, plus the OAuth redirect
//! flow. OAuth uses PKCE: the verifier stays in our session, only its SHA-256
//! challenge travels through the browser.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;
use verdant_core::UserId;

use super::{BackendClient, BackendError, Bearer};

/// A signed-in session as issued by the auth service.
#[derive(Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Unix time the access token expires, when the server sends it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Expiry as Unix seconds, computed from `expires_in` when absent.
    #[must_use]
    pub fn expires_at_or(&self, now_unix: i64) -> i64 {
        self.expires_at.unwrap_or(now_unix + self.expires_in)
    }
}

/// The user an auth session belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// Display name from sign-up metadata or the OAuth provider.
    #[must_use]
    pub fn full_name(&self) -> Option<&str> {
        ["full_name", "name"]
            .iter()
            .find_map(|key| self.user_metadata.get(key).and_then(|v| v.as_str()))
    }
}

/// Result of a sign-up call.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpOutcome {
    /// Auto-confirmed: the user is signed in.
    SignedIn(AuthSession),
    /// A confirmation email was sent; no session yet.
    ConfirmationSent(AuthUser),
}

/// Supported OAuth identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }
}

/// PKCE verifier and its S256 challenge.
#[derive(Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    /// Generate a fresh 43-character verifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Derive the challenge for an existing verifier.
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

impl BackendClient {
    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `Api { status: 400, .. }` for wrong credentials.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, "/auth/v1/token", Bearer::Anon)
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }));
        self.send_json(request).await
    }

    /// Register a new account.
    ///
    /// `metadata` is stored on the auth user and copied into the profile row
    /// by the backend's sign-up trigger.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is taken or the password is rejected.
    #[instrument(skip(self, password, metadata))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, BackendError> {
        let request = self
            .request(Method::POST, "/auth/v1/signup", Bearer::Anon)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": metadata,
            }));
        self.send_json(request).await
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh token was revoked or already used.
    #[instrument(skip_all)]
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, "/auth/v1/token", Bearer::Anon)
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        self.send_json(request).await
    }

    /// The user behind an access token.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the token is invalid or expired.
    #[instrument(skip_all)]
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let request = self.request(Method::GET, "/auth/v1/user", Bearer::User(access_token));
        self.send_json(request).await
    }

    /// Revoke the session behind an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth service rejects the call.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let request = self.request(Method::POST, "/auth/v1/logout", Bearer::User(access_token));
        self.send_empty(request).await
    }

    /// URL to send the browser to for an OAuth sign-in.
    #[must_use]
    pub fn oauth_authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        pkce: &Pkce,
    ) -> String {
        format!(
            "{}/auth/v1/authorize?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=s256",
            self.base_url(),
            provider.as_str(),
            urlencoding::encode(redirect_to),
            pkce.challenge,
        )
    }

    /// Complete an OAuth sign-in.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is unknown, expired, or does not match the
    /// verifier.
    #[instrument(skip_all)]
    pub async fn exchange_code_for_session(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, "/auth/v1/token", Bearer::Anon)
            .query(&[("grant_type", "pkce")])
            .json(&serde_json::json!({
                "auth_code": auth_code,
                "code_verifier": code_verifier,
            }));
        self.send_json(request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::backend::tests::client_for;

    fn session_body(user: UserId) -> String {
        format!(
            r#"{{
                "access_token": "at",
                "token_type": "bearer",
                "expires_in": 3600,
                "expires_at": 1700003600,
                "refresh_token": "rt",
                "user": {{"id": "{user}", "email": "asha@example.in", "user_metadata": {{"full_name": "Asha"}}}}
            }}"#
        )
    }

    #[test]
    fn test_pkce_challenge_matches_rfc_example() {
        // RFC 7636 appendix B.
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_owned());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGkSuw5-cM");
    }

    #[test]
    fn test_pkce_generate_length() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 43);
        assert!(!format!("{pkce:?}").contains(&pkce.verifier));
    }

    #[tokio::test]
    async fn test_password_sign_in() {
        let user = UserId::random();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .match_body(Matcher::PartialJsonString(r#"{"email":"asha@example.in"}"#.into()))
            .with_status(200)
            .with_body(session_body(user))
            .create_async()
            .await;

        let session = client_for(&server)
            .sign_in_with_password("asha@example.in", "pw")
            .await
            .unwrap();

        assert_eq!(session.user.id, user);
        assert_eq!(session.user.full_name(), Some("Asha"));
        assert_eq!(session.expires_at_or(0), 1_700_003_600);
        assert!(!format!("{session:?}").contains("\"at\""));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation() {
        let user = UserId::random();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/signup")
            .with_status(200)
            .with_body(format!(r#"{{"id": "{user}", "email": "new@example.in"}}"#))
            .create_async()
            .await;

        let outcome = client_for(&server)
            .sign_up("new@example.in", "pw", serde_json::json!({}))
            .await
            .unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationSent(u) if u.id == user));
    }

    #[tokio::test]
    async fn test_get_user_with_expired_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .with_body(r#"{"code":401,"msg":"invalid JWT: token is expired"}"#)
            .create_async()
            .await;

        let err = client_for(&server).get_user("stale").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_authorize_url() {
        let client = crate::backend::BackendClient::new(&crate::config::BackendConfig {
            url: "https://proj.backend.test".to_owned(),
            anon_key: secrecy::SecretString::from("k"),
        });
        let pkce = Pkce::from_verifier("v".to_owned());
        let url = client.oauth_authorize_url(
            OAuthProvider::Google,
            "http://localhost:3000/auth/callback",
            &pkce,
        );
        assert!(url.starts_with("https://proj.backend.test/auth/v1/authorize?provider=google"));
        assert!(url.contains("redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback"));
        assert!(url.ends_with("code_challenge_method=s256"));
    }
}
