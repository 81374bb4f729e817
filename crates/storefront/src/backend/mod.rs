//! Backend-as-a-service client.
//!
//! # Architecture
//!
//! - Plain `reqwest` against the backend's REST (`/rest/v1`), auth
//!   (`/auth/v1`) and storage (`/storage/v1`) endpoints
//! - The backend is the source of truth - NO local persistence
//! - Every call carries the project `apikey` plus a bearer token: the signed-in
//!   user's access token when there is one, so row-level security applies to
//!   that user, or the anon key otherwise
//!
//! # APIs
//!
//! ## REST
//! - Table select / insert / upsert / update / delete ([`Query`] builds filters)
//! - Remote procedure calls (delivery eligibility)
//!
//! ## Auth
//! - Password sign-in and sign-up, refresh, sign-out
//! - OAuth redirect with PKCE and code exchange
//!
//! ## Storage
//! - Upload and remove objects; public URLs come from
//!   [`verdant_core::MediaResolver`]
//!
//! # Example
//!
//! ```rust,ignore
//! use verdant_storefront::backend::{BackendClient, Bearer};
//!
//! let client = BackendClient::new(&config.backend);
//! let products = client.list_products(&ProductFilter::default(), Bearer::Anon).await?;
//! ```

mod accounts;
mod auth;
mod catalog;
mod orders;
mod rest;
mod shopping;
mod storage;
pub mod types;

pub use accounts::ProfileUpdate;
pub use auth::{AuthSession, AuthUser, OAuthProvider, Pkce, SignUpOutcome};
pub use catalog::{ProductFilter, ProductSort};
pub use rest::Query;
pub use types::*;

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use thiserror::Error;
use verdant_core::MediaResolver;

use crate::config::BackendConfig;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The access token is missing, expired, or rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend (retry after N seconds).
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The backend rejected the request.
    #[error("Backend error ({status}): {message}")]
    Api {
        /// HTTP status returned.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },
}

impl BackendError {
    /// Whether the error means the session should be discarded.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Which token authorizes a request.
#[derive(Clone, Copy)]
pub enum Bearer<'a> {
    /// Anonymous access (public rows only).
    Anon,
    /// A signed-in user's access token.
    User(&'a str),
}

impl std::fmt::Debug for Bearer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anon => f.write_str("Anon"),
            Self::User(_) => f.write_str("User([REDACTED])"),
        }
    }
}

// =============================================================================
// BackendClient
// =============================================================================

/// Client for the backend-as-a-service.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl BackendClient {
    /// Create a new backend client.
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            inner: Arc::new(BackendClientInner {
                client: reqwest::Client::new(),
                base_url: config.url.trim_end_matches('/').to_string(),
                anon_key: config.anon_key.expose_secret().to_string(),
            }),
        }
    }

    /// Project base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Resolver for public URLs of objects in `bucket`.
    #[must_use]
    pub fn media_resolver(&self, bucket: &str, placeholder: &str) -> MediaResolver {
        MediaResolver::new(&self.inner.base_url, bucket, placeholder)
    }

    /// Build a request with the project key and bearer token attached.
    fn request(&self, method: Method, path: &str, bearer: Bearer<'_>) -> RequestBuilder {
        let token = match bearer {
            Bearer::Anon => self.inner.anon_key.as_str(),
            Bearer::User(token) => token,
        };
        self.inner
            .client
            .request(method, format!("{}{path}", self.inner.base_url))
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(token)
    }

    /// Send a request and decode a JSON body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        check_rate_limit(&response)?;
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Send a request whose response body is ignored.
    async fn send_empty(&self, request: RequestBuilder) -> Result<(), BackendError> {
        let response = request.send().await?;
        let status = response.status();
        check_rate_limit(&response)?;
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Err(error_from_response(status, &body))
    }

    /// Check that the backend answers with our key.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth health endpoint is unreachable or rejects
    /// the key.
    pub async fn health(&self) -> Result<(), BackendError> {
        let request = self.request(Method::GET, "/auth/v1/health", Bearer::Anon);
        self.send_empty(request).await
    }
}

fn check_rate_limit(response: &reqwest::Response) -> Result<(), BackendError> {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return Ok(());
    }
    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(1);
    Err(BackendError::RateLimited(retry_after))
}

/// Take the single row a write returned.
fn single<T>(rows: Vec<T>, what: &str) -> Result<T, BackendError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| BackendError::NotFound(what.to_owned()))
}

/// Map a non-success response to a [`BackendError`].
///
/// REST, auth and storage each use a different error body; the first of
/// `message`, `msg`, `error_description`, `error` that is present wins.
fn error_from_response(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(|m| m.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized(message),
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        _ => {
            if status.is_server_error() {
                tracing::error!(status = %status, message = %message, "Backend returned server error");
            } else {
                tracing::debug!(status = %status, message = %message, "Backend rejected request");
            }
            BackendError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use secrecy::SecretString;

    use super::*;

    pub(crate) fn client_for(server: &mockito::ServerGuard) -> BackendClient {
        BackendClient::new(&BackendConfig {
            url: server.url(),
            anon_key: SecretString::from("anon-key"),
        })
    }

    #[test]
    fn test_error_message_extraction() {
        let err = error_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"code":"23505","message":"duplicate key value"}"#,
        );
        assert_eq!(err.to_string(), "Backend error (400): duplicate key value");

        let err = error_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert!(matches!(err, BackendError::Api { message, .. } if message == "Invalid login credentials"));

        let err = error_from_response(StatusCode::UNAUTHORIZED, r#"{"msg":"JWT expired"}"#);
        assert!(err.is_unauthorized());

        let err = error_from_response(StatusCode::BAD_GATEWAY, "<html>upstream</html>");
        assert!(matches!(err, BackendError::Api { status: 502, message } if message == "<html>upstream</html>"));
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/health")
            .with_status(429)
            .with_header("Retry-After", "7")
            .create_async()
            .await;

        let err = client_for(&server).health().await.unwrap_err();
        assert!(matches!(err, BackendError::RateLimited(7)));
    }

    #[tokio::test]
    async fn test_requests_carry_apikey_and_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/health")
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client_for(&server).health().await.unwrap();
        mock.assert_async().await;
    }
}
