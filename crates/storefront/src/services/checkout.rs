//! Quotes, payment requests and order placement.
//!
//! Checkout is two requests. `begin` prices the cart, checks stock and
//! delivery, creates a gateway order and returns what the payment widget
//! needs, plus a [`PendingCheckout`] the caller keeps in the session.
//! `complete` takes the widget's outcome, verifies it against the pending
//! checkout and only then writes the order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use verdant_core::{Address, AddressBook, AddressId, OrderStatus, UserId};

use super::ServiceError;
use super::cart::check_stock;
use super::payment::{PaymentGateway, PaymentOutcome, PaymentRequest, Prefill};
use crate::backend::{BackendClient, Bearer, CartItem, NewOrder, Order, OrderItem};
use crate::config::CheckoutConfig;

/// Name shown in the payment widget.
const MERCHANT_NAME: &str = "Verdant Organics";

/// Priced cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub free_shipping: bool,
}

/// Price cart lines.
///
/// Shipping is the sum of each product's shipping charge, waived once the
/// subtotal reaches `free_shipping_threshold`. Tax is charged per line at the
/// product's rate.
///
/// # Errors
///
/// Returns `Validation` when a line's product is no longer available.
pub fn quote(items: &[CartItem], free_shipping_threshold: Decimal) -> Result<Quote, ServiceError> {
    let mut subtotal = Decimal::ZERO;
    let mut shipping = Decimal::ZERO;
    let mut tax = Decimal::ZERO;

    for item in items {
        let product = item
            .product
            .as_ref()
            .ok_or_else(|| ServiceError::validation("a product in your cart is no longer available"))?;
        let line_total = product.effective_price() * Decimal::from(item.quantity);
        subtotal += line_total;
        shipping += product.shipping_charge.unwrap_or(Decimal::ZERO);
        tax += product.tax_on(line_total);
    }

    let free_shipping = subtotal >= free_shipping_threshold;
    if free_shipping {
        shipping = Decimal::ZERO;
    }
    let tax = tax.round_dp(2);

    Ok(Quote {
        subtotal,
        shipping,
        tax,
        total: subtotal + shipping + tax,
        free_shipping,
    })
}

/// Pick the shipping address: the requested one, else the default.
///
/// # Errors
///
/// Returns `NotFound` for an unknown id, `Validation` when the book is empty
/// or the address is incomplete.
pub fn choose_address(book: &AddressBook, requested: Option<AddressId>) -> Result<Address, ServiceError> {
    let address = match requested {
        Some(id) => book.get(id).ok_or(ServiceError::NotFound("address"))?,
        None => book
            .default_address()
            .ok_or_else(|| ServiceError::validation("add a shipping address to continue"))?,
    };
    address.validate().map_err(ServiceError::Validation)?;
    Ok(address.clone())
}

/// Server-side state between `begin` and `complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCheckout {
    pub gateway_order_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub quote: Quote,
}

/// Checkout for one signed-in user.
pub struct CheckoutService<'a> {
    backend: &'a BackendClient,
    gateway: &'a PaymentGateway,
    config: &'a CheckoutConfig,
    user: UserId,
    access_token: &'a str,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        backend: &'a BackendClient,
        gateway: &'a PaymentGateway,
        config: &'a CheckoutConfig,
        user: UserId,
        access_token: &'a str,
    ) -> Self {
        Self {
            backend,
            gateway,
            config,
            user,
            access_token,
        }
    }

    const fn bearer(&self) -> Bearer<'a> {
        Bearer::User(self.access_token)
    }

    /// Price the current cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be read or priced.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn quote(&self) -> Result<Quote, ServiceError> {
        let items = self.backend.cart_items(self.user, self.bearer()).await?;
        quote(&items, self.config.free_shipping_threshold)
    }

    /// Validate the cart and open a gateway order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty cart, a missing address or an
    /// unserviceable pincode, `OutOfStock` for short lines, and gateway errors.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn begin(
        &self,
        address: Option<AddressId>,
    ) -> Result<(PaymentRequest, PendingCheckout), ServiceError> {
        let items = self.backend.cart_items(self.user, self.bearer()).await?;
        if items.is_empty() {
            return Err(ServiceError::validation("your cart is empty"));
        }

        let mut snapshot = Vec::with_capacity(items.len());
        for item in &items {
            let product = item
                .product
                .as_ref()
                .ok_or_else(|| ServiceError::validation("a product in your cart is no longer available"))?;
            check_stock(product, item.quantity)?;
            snapshot.push(OrderItem {
                product_id: product.id,
                company_id: product.company_id,
                name: product.name.clone(),
                unit_price: product.effective_price(),
                quantity: item.quantity,
                image: product.images.first().cloned(),
            });
        }

        let profile = self
            .backend
            .get_profile(self.user, self.bearer())
            .await?
            .ok_or(ServiceError::NotFound("profile"))?;
        let shipping_address = choose_address(&profile.addresses, address)?;

        let pincode = shipping_address.pincode.trim();
        if !self
            .backend
            .check_delivery_eligibility(pincode, self.bearer())
            .await?
        {
            return Err(ServiceError::validation(format!(
                "we do not deliver to pincode {pincode} yet"
            )));
        }

        let quote = quote(&items, self.config.free_shipping_threshold)?;
        let receipt = uuid::Uuid::new_v4().simple().to_string();
        let order = self
            .gateway
            .create_order(quote.total, self.config.currency, &receipt)
            .await?;

        let units: i32 = snapshot.iter().map(|i| i.quantity).sum();
        let request = PaymentRequest {
            key: self.gateway.key_id().to_owned(),
            amount: order.amount,
            currency: self.config.currency,
            name: MERCHANT_NAME.to_owned(),
            description: format!("{units} item(s)"),
            order_id: order.id.clone(),
            prefill: Prefill {
                name: profile
                    .full_name
                    .unwrap_or_else(|| shipping_address.full_name.clone()),
                email: profile.email.unwrap_or_default(),
                contact: profile
                    .phone
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| shipping_address.phone.clone()),
            },
        };

        tracing::info!(
            gateway_order_id = %order.id,
            total = %quote.total,
            "Checkout started"
        );

        Ok((
            request,
            PendingCheckout {
                gateway_order_id: order.id,
                items: snapshot,
                shipping_address,
                quote,
            },
        ))
    }

    /// Record a paid order and empty the cart.
    ///
    /// Nothing is written unless the outcome is a success whose signature
    /// verifies against the pending gateway order.
    ///
    /// # Errors
    ///
    /// Returns `PaymentFailed` for failed, mismatched or unverifiable
    /// payments and `Validation` when no checkout is pending.
    #[instrument(skip(self, pending, outcome), fields(user_id = %self.user))]
    pub async fn complete(
        &self,
        pending: Option<PendingCheckout>,
        outcome: PaymentOutcome,
    ) -> Result<Order, ServiceError> {
        let (payment_id, order_id, signature) = match outcome {
            PaymentOutcome::Failure { description } => {
                tracing::warn!(reason = %description, "Payment failed");
                let reason = if description.trim().is_empty() {
                    "payment was cancelled".to_owned()
                } else {
                    description
                };
                return Err(ServiceError::PaymentFailed(reason));
            }
            PaymentOutcome::Success {
                payment_id,
                order_id,
                signature,
            } => (payment_id, order_id, signature),
        };

        let pending =
            pending.ok_or_else(|| ServiceError::validation("no checkout is in progress"))?;
        if pending.gateway_order_id != order_id {
            tracing::warn!(expected = %pending.gateway_order_id, got = %order_id, "Payment for unexpected order");
            return Err(ServiceError::PaymentFailed(
                "payment does not match this checkout".to_owned(),
            ));
        }
        if !self.gateway.verify_signature(&order_id, &payment_id, &signature) {
            tracing::warn!(gateway_order_id = %order_id, "Payment signature mismatch");
            return Err(ServiceError::PaymentFailed(
                "payment could not be verified".to_owned(),
            ));
        }

        let new_order = NewOrder {
            user_id: self.user,
            items: pending.items,
            shipping_address: pending.shipping_address,
            subtotal: pending.quote.subtotal,
            shipping_charge: pending.quote.shipping,
            tax_amount: pending.quote.tax,
            total_amount: pending.quote.total,
            payment_id: Some(payment_id),
            gateway_order_id: Some(order_id),
            status: OrderStatus::Confirmed,
        };
        let order = self.backend.insert_order(&new_order, self.bearer()).await?;
        tracing::info!(order_id = %order.id, total = %order.total_amount, "Order placed");

        // The order is paid; a stale cart is recoverable.
        if let Err(e) = self.backend.clear_cart(self.user, self.bearer()).await {
            tracing::error!(error = %e, order_id = %order.id, "Failed to clear cart after order");
        }

        Ok(order)
    }
}
