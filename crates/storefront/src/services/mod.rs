//! Business logic services for the storefront.
//!
//! Services orchestrate backend calls on behalf of one caller. They borrow the
//! shared [`BackendClient`](crate::backend::BackendClient) and carry the
//! caller's access token so row-level security applies to every read and
//! write.
//!
//! # Services
//!
//! - `auth` - Sign-in, sign-up, token refresh, OAuth
//! - `catalog` - Product listing and detail for shoppers
//! - `cart` - Cart lines and totals
//! - `favorites` - Saved products
//! - `reviews` - Product reviews and rating summaries
//! - `addresses` - The profile's address book
//! - `checkout` - Quotes, payment requests, order placement
//! - `payment` - Payment gateway orders and signature checks
//! - `orders` - Customer and company order management
//! - `products` - Company product management
//! - `draft` - Multi-step add-product form state
//! - `dashboard` - Company sales statistics and their cache
//! - `invalidation` - Coalescing of backend change notifications

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod dashboard;
pub mod draft;
pub mod favorites;
pub mod invalidation;
pub mod orders;
pub mod payment;
pub mod products;
pub mod reviews;

use thiserror::Error;
use verdant_core::OrderStatus;

use crate::backend::BackendError;

/// Errors from business operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input failed a business rule.
    #[error("{0}")]
    Validation(String),

    /// The target row does not exist or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller's company has not been approved yet.
    #[error("company is awaiting approval")]
    NotApproved,

    /// The caller may not act on this resource.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// Order status change outside the lifecycle.
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Not enough stock to satisfy the request.
    #[error("only {available} of {product} in stock")]
    OutOfStock { product: String, available: i32 },

    /// Payment was declined, cancelled, or could not be verified.
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// Payment gateway call failed.
    #[error(transparent)]
    Gateway(#[from] payment::PaymentError),

    /// Backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ServiceError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
