//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `VERDANT_BASE_URL` - Public URL of this service (OAuth redirects)
//! - `BACKEND_URL` - Backend project URL (e.g., `https://abcd.backend.example`)
//! - `BACKEND_ANON_KEY` - Backend anonymous (public) API key
//! - `PAYMENT_KEY_ID` - Payment gateway key ID (safe to hand to the widget)
//! - `PAYMENT_KEY_SECRET` - Payment gateway key secret (server-side only)
//! - `WEBHOOK_SECRET` - Shared secret the backend sends with change webhooks
//!
//! ## Optional
//! - `VERDANT_HOST` - Bind address (default: 127.0.0.1)
//! - `VERDANT_PORT` - Listen port (default: 3000)
//! - `MEDIA_BUCKET` - Object-storage bucket for product images (default: product-images)
//! - `MEDIA_PLACEHOLDER` - Image shown when a product has none (default: /static/placeholder.png)
//! - `DASHBOARD_CACHE_TTL_SECS` - Dashboard statistics freshness window (default: 300)
//! - `CHANGE_DEBOUNCE_MS` - Coalescing window for change notifications (default: 500)
//! - `FREE_SHIPPING_THRESHOLD` - Order subtotal above which shipping is free (default: 500)
//! - `CURRENCY` - Checkout currency (default: INR)
//! - `PAYMENT_API_URL` - Payment gateway API base (default: <https://api.razorpay.com/v1>)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `pretty` or `json` (default: pretty)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use verdant_core::CurrencyCode;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for this service
    pub base_url: String,
    /// Backend-as-a-service connection
    pub backend: BackendConfig,
    /// Payment gateway credentials
    pub payment: PaymentConfig,
    /// Product media settings
    pub media: MediaConfig,
    /// Checkout pricing rules
    pub checkout: CheckoutConfig,
    /// Dashboard statistics freshness window
    pub dashboard_cache_ttl: Duration,
    /// Coalescing window for backend change notifications
    pub change_debounce: Duration,
    /// Shared secret for the change webhook
    pub webhook_secret: SecretString,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Log line format
    pub log_format: LogFormat,
}

/// How log lines are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for local development.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Backend-as-a-service connection settings.
///
/// The anon key is public; row-level security gates access. It is still
/// kept out of logs.
#[derive(Clone)]
pub struct BackendConfig {
    /// Project URL, without trailing slash
    pub url: String,
    /// Anonymous API key
    pub anon_key: SecretString,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

/// Payment gateway settings.
#[derive(Clone)]
pub struct PaymentConfig {
    /// API base URL
    pub api_url: String,
    /// Public key ID handed to the checkout widget
    pub key_id: String,
    /// Key secret used for order creation and signature checks
    pub key_secret: SecretString,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("api_url", &self.api_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .finish()
    }
}

/// Product media settings.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Bucket holding product images
    pub bucket: String,
    /// URL returned for products without images
    pub placeholder: String,
}

/// Checkout pricing rules.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Subtotal at or above which shipping is waived
    pub free_shipping_threshold: Decimal,
    /// Currency charged at checkout
    pub currency: CurrencyCode,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env("VERDANT_HOST", "127.0.0.1")?;
        let port = parse_env("VERDANT_PORT", "3000")?;
        let base_url = parse_url("VERDANT_BASE_URL", &get_required_env("VERDANT_BASE_URL")?)?;

        let backend = BackendConfig {
            url: parse_url("BACKEND_URL", &get_required_env("BACKEND_URL")?)?,
            anon_key: SecretString::from(get_required_env("BACKEND_ANON_KEY")?),
        };

        let payment = PaymentConfig {
            api_url: parse_url(
                "PAYMENT_API_URL",
                &get_env_or_default("PAYMENT_API_URL", "https://api.razorpay.com/v1"),
            )?,
            key_id: get_required_env("PAYMENT_KEY_ID")?,
            key_secret: get_validated_secret("PAYMENT_KEY_SECRET")?,
        };

        let media = MediaConfig {
            bucket: get_env_or_default("MEDIA_BUCKET", "product-images"),
            placeholder: get_env_or_default(
                "MEDIA_PLACEHOLDER",
                verdant_core::media::DEFAULT_PLACEHOLDER,
            ),
        };

        let checkout = CheckoutConfig {
            free_shipping_threshold: parse_env("FREE_SHIPPING_THRESHOLD", "500")?,
            currency: parse_env("CURRENCY", "INR")?,
        };

        Ok(Self {
            host,
            port,
            base_url,
            backend,
            payment,
            media,
            checkout,
            dashboard_cache_ttl: Duration::from_secs(parse_env("DASHBOARD_CACHE_TTL_SECS", "300")?),
            change_debounce: Duration::from_millis(parse_env("CHANGE_DEBOUNCE_MS", "500")?),
            webhook_secret: get_validated_secret("WEBHOOK_SECRET")?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            log_format: parse_env("LOG_FORMAT", "pretty")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the service is served over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate an absolute HTTP(S) URL and strip any trailing slash.
fn parse_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    Ok(value.trim_end_matches('/').to_owned())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
