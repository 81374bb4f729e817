//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! POST /api/auth/register          - Register with email and password
//! POST /api/auth/login             - Sign in
//! POST /api/auth/logout            - Sign out
//! GET  /api/auth/me                - Current user
//! GET  /auth/google                - Redirect to Google sign-in
//! GET  /auth/callback              - OAuth callback
//!
//! # Catalog
//! GET  /api/products               - Product listing (cached)
//! GET  /api/products/{id}          - Product detail
//! GET  /api/products/{id}/reviews  - Reviews and rating summary
//! PUT  /api/products/{id}/reviews  - Write or replace own review
//! DELETE /api/products/{id}/reviews
//! GET  /api/delivery/{pincode}     - Delivery eligibility
//!
//! # Shopper (requires auth)
//! GET|POST|DELETE /api/cart        - Cart, add line, clear
//! PUT|DELETE /api/cart/{product}   - Set quantity, remove line
//! GET  /api/favorites
//! PUT|DELETE /api/favorites/{product}
//! POST /api/favorites/{product}/toggle
//! GET  /api/checkout/quote
//! POST /api/checkout               - Open a gateway order
//! POST /api/checkout/complete      - Verify payment, place order
//! GET  /api/orders
//! GET  /api/orders/{id}
//! POST /api/orders/{id}/cancel
//! GET|PATCH /api/account           - Profile
//! GET|POST /api/account/addresses
//! PUT|DELETE /api/account/addresses/{id}
//! POST /api/account/addresses/{id}/default
//!
//! # Company dashboard (requires a company account)
//! GET  /api/dashboard/stats[?force=true]
//! GET  /api/dashboard/company
//! GET|POST /api/dashboard/products
//! PATCH|DELETE /api/dashboard/products/{id}
//! POST|DELETE /api/dashboard/products/{id}/images
//! GET  /api/dashboard/orders
//! PUT  /api/dashboard/orders/{id}/status
//! POST /api/dashboard/orders/{id}/advance
//! GET|DELETE /api/dashboard/draft
//! PUT  /api/dashboard/draft/{basics,pricing,inventory}
//! POST|DELETE /api/dashboard/draft/images
//! POST /api/dashboard/draft/submit
//!
//! # Change notifications
//! POST /hooks/changes              - Backend webhook (shared secret)
//! GET  /api/changes                - Revision counters
//! ```

pub mod account;
pub mod auth;
pub mod cart;
pub mod changes;
pub mod checkout;
pub mod dashboard;
pub mod draft;
pub mod favorites;
pub mod orders;
pub mod products;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
};

use crate::services::products::MAX_IMAGE_BYTES;
use crate::state::AppState;

/// Upload body limit: one image plus multipart framing.
const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 64 * 1024;

/// Create the auth API routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
        .route(
            "/{id}/reviews",
            get(products::reviews)
                .put(products::submit_review)
                .delete(products::delete_review),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add).delete(cart::clear))
        .route("/{product_id}", put(cart::update).delete(cart::remove))
}

/// Create the favorites routes router.
pub fn favorite_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(favorites::index))
        .route("/{product_id}", put(favorites::add).delete(favorites::remove))
        .route("/{product_id}/toggle", post(favorites::toggle))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(checkout::begin))
        .route("/quote", get(checkout::quote))
        .route("/complete", post(checkout::complete))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
        .route("/{id}/cancel", post(orders::cancel))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::show).patch(account::update))
        .route(
            "/addresses",
            get(account::addresses).post(account::create_address),
        )
        .route(
            "/addresses/{id}",
            put(account::update_address).delete(account::delete_address),
        )
        .route("/addresses/{id}/default", post(account::set_default_address))
}

/// Create the company dashboard routes router.
pub fn dashboard_routes() -> Router<AppState> {
    let uploads = Router::new()
        .route(
            "/products/{id}/images",
            post(dashboard::upload_image).delete(dashboard::remove_image),
        )
        .route(
            "/draft/images",
            post(draft::upload_image).delete(draft::remove_image),
        )
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT));

    Router::new()
        .route("/stats", get(dashboard::stats))
        .route("/company", get(dashboard::company))
        .route(
            "/products",
            get(dashboard::products).post(dashboard::create_product),
        )
        .route(
            "/products/{id}",
            patch(dashboard::update_product).delete(dashboard::delete_product),
        )
        .route("/orders", get(dashboard::orders))
        .route("/orders/{id}/status", put(dashboard::set_order_status))
        .route("/orders/{id}/advance", post(dashboard::advance_order))
        .route("/draft", get(draft::show).delete(draft::discard))
        .route("/draft/basics", put(draft::save_basics))
        .route("/draft/pricing", put(draft::save_pricing))
        .route("/draft/inventory", put(draft::save_inventory))
        .route("/draft/submit", post(draft::submit))
        .merge(uploads)
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
        .route("/delivery/{pincode}", get(checkout::delivery))
        .nest("/cart", cart_routes())
        .nest("/favorites", favorite_routes())
        .nest("/checkout", checkout_routes())
        .nest("/orders", order_routes())
        .nest("/account", account_routes())
        .nest("/dashboard", dashboard_routes())
        .route("/changes", get(changes::revisions));

    Router::new()
        .nest("/api", api)
        .route("/auth/google", get(auth::google))
        .route("/auth/callback", get(auth::callback))
        .route("/hooks/changes", post(changes::receive))
}
