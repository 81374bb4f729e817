//! Domain models for storefront.
//!
//! Row shapes live with the backend client; this module holds what the
//! storefront keeps in its own session.

pub mod session;

pub use session::{CurrentUser, keys as session_keys};
