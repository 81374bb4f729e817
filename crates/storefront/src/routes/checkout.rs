//! Checkout route handlers.
//!
//! Checkout runs in two requests. `begin` prices the cart, opens a gateway
//! order and keeps the priced snapshot in the session; the client then runs
//! the gateway's payment widget and posts its result to `complete`, which
//! verifies the payment against the snapshot and places the order.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use verdant_core::AddressId;

use crate::backend::{Bearer, Order};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, session_keys};
use crate::services::checkout::{CheckoutService, PendingCheckout, Quote};
use crate::services::payment::{PaymentOutcome, PaymentRequest};
use crate::state::AppState;

/// Begin-checkout body.
#[derive(Debug, Default, Deserialize)]
pub struct BeginRequest {
    /// Defaults to the profile's default address.
    #[serde(default)]
    pub address_id: Option<AddressId>,
}

/// What the client needs to open the payment widget.
#[derive(Debug, Serialize)]
pub struct BeginResponse {
    pub payment: PaymentRequest,
    pub quote: Quote,
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub pincode: String,
    pub is_eligible: bool,
}

fn service<'a>(state: &'a AppState, user: &'a CurrentUser) -> CheckoutService<'a> {
    CheckoutService::new(
        state.backend(),
        state.gateway(),
        &state.config().checkout,
        user.id,
        &user.access_token,
    )
}

/// GET /api/checkout/quote
///
/// # Errors
///
/// Returns 400 for an empty cart.
pub async fn quote(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Quote>> {
    Ok(Json(service(&state, &user).quote().await?))
}

/// POST /api/checkout
///
/// Replaces any checkout already pending in the session.
///
/// # Errors
///
/// Returns 400 for an empty cart or missing address, 409 when stock ran
/// out, 502 if the gateway order cannot be created.
pub async fn begin(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    body: Option<Json<BeginRequest>>,
) -> Result<Json<BeginResponse>> {
    let Json(req) = body.unwrap_or_default();
    let (payment, pending) = service(&state, &user).begin(req.address_id).await?;

    let quote = pending.quote;
    session
        .insert(session_keys::PENDING_CHECKOUT, &pending)
        .await?;
    add_breadcrumb(
        "checkout",
        "Payment started",
        Some(&[("gateway_order_id", pending.gateway_order_id.as_str())]),
    );

    Ok(Json(BeginResponse { payment, quote }))
}

/// POST /api/checkout/complete
///
/// The pending checkout is consumed whether or not the payment succeeded;
/// a retry starts over from `begin`.
///
/// # Errors
///
/// Returns 402 when the payment failed or could not be verified.
pub async fn complete(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Json(outcome): Json<PaymentOutcome>,
) -> Result<(StatusCode, Json<Order>)> {
    let pending = session
        .remove::<PendingCheckout>(session_keys::PENDING_CHECKOUT)
        .await?;
    let order = service(&state, &user).complete(pending, outcome).await?;
    add_breadcrumb("checkout", "Order placed", None);
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/delivery/{pincode}
///
/// # Errors
///
/// Returns 502 if the backend request fails.
pub async fn delivery(
    State(state): State<AppState>,
    Path(pincode): Path<String>,
) -> Result<Json<EligibilityResponse>> {
    let pincode = pincode.trim().to_owned();
    let is_eligible = state
        .backend()
        .check_delivery_eligibility(&pincode, Bearer::Anon)
        .await?;
    Ok(Json(EligibilityResponse {
        pincode,
        is_eligible,
    }))
}
