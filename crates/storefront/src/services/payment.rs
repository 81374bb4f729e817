//! Payment gateway client.
//!
//! The server creates a gateway order for the checkout amount; the browser
//! widget collects payment against it and hands back a signed outcome. The
//! signature is an HMAC-SHA256 of `"<order_id>|<payment_id>"` keyed with the
//! gateway secret, hex encoded.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::instrument;
use verdant_core::{CurrencyCode, to_minor_units};

use crate::config::PaymentConfig;

type HmacSha256 = Hmac<Sha256>;

/// Errors talking to the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Payment gateway error ({status}): {message}")]
    Gateway { status: u16, message: String },

    #[error("Amount {0} cannot be charged")]
    InvalidAmount(Decimal),
}

/// An order created at the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// What the checkout widget is opened with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Public key id.
    pub key: String,
    /// Minor units.
    pub amount: i64,
    pub currency: CurrencyCode,
    pub name: String,
    pub description: String,
    pub order_id: String,
    pub prefill: Prefill,
}

/// Customer details the widget pre-fills.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prefill {
    pub name: String,
    pub email: String,
    pub contact: String,
}

/// What the widget reports back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success {
        #[serde(alias = "razorpay_payment_id")]
        payment_id: String,
        #[serde(alias = "razorpay_order_id")]
        order_id: String,
        #[serde(alias = "razorpay_signature")]
        signature: String,
    },
    Failure {
        #[serde(default)]
        description: String,
    },
}

/// Gateway client.
#[derive(Clone)]
pub struct PaymentGateway {
    inner: Arc<PaymentGatewayInner>,
}

struct PaymentGatewayInner {
    client: reqwest::Client,
    api_url: String,
    key_id: String,
    key_secret: SecretString,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    #[serde(default)]
    description: String,
}

impl PaymentGateway {
    #[must_use]
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            inner: Arc::new(PaymentGatewayInner {
                client: reqwest::Client::new(),
                api_url: config.api_url.trim_end_matches('/').to_owned(),
                key_id: config.key_id.clone(),
                key_secret: config.key_secret.clone(),
            }),
        }
    }

    /// Public key id for the widget.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.inner.key_id
    }

    /// Create a gateway order for `amount`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for non-positive or oversized amounts, and a
    /// gateway error if the order is refused.
    #[instrument(skip(self), fields(amount = %amount, currency = currency.code()))]
    pub async fn create_order(
        &self,
        amount: Decimal,
        currency: CurrencyCode,
        receipt: &str,
    ) -> Result<GatewayOrder, PaymentError> {
        let minor = to_minor_units(amount)
            .filter(|m| *m > 0)
            .ok_or(PaymentError::InvalidAmount(amount))?;

        let body = serde_json::json!({
            "amount": minor,
            "currency": currency.code(),
            "receipt": receipt,
        });

        let response = self
            .inner
            .client
            .post(format!("{}/orders", self.inner.api_url))
            .basic_auth(&self.inner.key_id, Some(self.inner.key_secret.expose_secret()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            let message = serde_json::from_str::<GatewayErrorBody>(&text)
                .map(|b| b.error.description)
                .unwrap_or_else(|_| text.chars().take(200).collect());
            tracing::error!(status = %status, message = %message, "Payment gateway refused order");
            return Err(PaymentError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        let order: GatewayOrder = response.json().await?;
        tracing::info!(gateway_order_id = %order.id, "Created payment gateway order");
        Ok(order)
    }

    /// Check the widget's signature over an order and payment id.
    #[must_use]
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_signature(
            self.inner.key_secret.expose_secret(),
            order_id,
            payment_id,
            signature,
        )
    }
}

/// Constant-time check of a hex HMAC-SHA256 over `order_id|payment_id`.
#[must_use]
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Signature the gateway would produce, for tests and local simulators.
#[must_use]
pub fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
