//! Integration tests for Verdant Organics.
//!
//! Tests drive the full storefront router in-process against a mocked
//! backend, so no network services are needed:
//!
//! ```bash
//! cargo test -p verdant-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `storefront_api` - HTTP routes, sessions, auth, change notifications
//! - `dashboard_cache` - Dashboard statistics caching against a fake source
//! - `order_lifecycle` - Order status rules over HTTP, media path regressions

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use chrono::{TimeZone, Utc};
use mockito::Matcher;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::json;
use tower::ServiceExt;
use verdant_core::{CompanyId, CurrencyCode, UserId};
use verdant_storefront::clock::ManualClock;
use verdant_storefront::config::{
    BackendConfig, CheckoutConfig, LogFormat, MediaConfig, PaymentConfig, StorefrontConfig,
};
use verdant_storefront::state::AppState;

/// Shared webhook secret used by [`test_config`].
pub const WEBHOOK_SECRET: &str = "integration-webhook-secret";

/// Configuration pointing at a mocked backend and gateway.
#[must_use]
pub fn test_config(backend_url: &str, gateway_url: &str) -> StorefrontConfig {
    StorefrontConfig {
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        backend: BackendConfig {
            url: backend_url.to_string(),
            anon_key: SecretString::from("anon-key"),
        },
        payment: PaymentConfig {
            api_url: gateway_url.to_string(),
            key_id: "rzp_test_key".to_string(),
            key_secret: SecretString::from("gateway-secret"),
        },
        media: MediaConfig {
            bucket: "product-images".to_string(),
            placeholder: "/static/placeholder.png".to_string(),
        },
        checkout: CheckoutConfig {
            free_shipping_threshold: Decimal::from(500),
            currency: CurrencyCode::INR,
        },
        dashboard_cache_ttl: Duration::from_secs(300),
        change_debounce: Duration::from_millis(20),
        webhook_secret: SecretString::from(WEBHOOK_SECRET),
        sentry_dsn: None,
        sentry_environment: None,
        log_format: LogFormat::Pretty,
    }
}

/// A storefront router wired to a mocked backend.
pub struct TestApp {
    pub backend: mockito::ServerGuard,
    pub clock: ManualClock,
    pub state: AppState,
    router: Router,
}

impl TestApp {
    /// Start a mocked backend and build the app against it.
    ///
    /// The clock starts at 2024-03-15 12:00 UTC.
    pub async fn new() -> Self {
        let backend = mockito::Server::new_async().await;
        let url = backend.url();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap());
        let state = AppState::new(test_config(&url, &url), Arc::new(clock.clone()));
        let router = verdant_storefront::app(state.clone());
        Self {
            backend,
            clock,
            state,
            router,
        }
    }

    /// Sign in through the API with a mocked backend and return the session
    /// cookie. The profile is linked to `company` when given.
    pub async fn sign_in(&mut self, user: UserId, company: Option<CompanyId>) -> String {
        self.backend
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .with_status(200)
            .with_body(token_body(user))
            .create_async()
            .await;
        self.backend
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!([{
                    "id": user,
                    "full_name": "Meera Iyer",
                    "company_id": company,
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let response = self
            .json(
                "POST",
                "/api/auth/login",
                Some(json!({"email": "meera@example.in", "password": "correct horse"})),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response).unwrap()
    }

    /// Send one request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a JSON request, optionally carrying a session cookie.
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }
}

/// Auth service token response for `user`, valid for an hour.
#[must_use]
pub fn token_body(user: UserId) -> String {
    json!({
        "access_token": "access-1",
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-1",
        "user": {"id": user, "email": "meera@example.in", "user_metadata": {}}
    })
    .to_string()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `name=value` part of the session cookie set by a response.
#[must_use]
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("verdant_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_owned)
}
