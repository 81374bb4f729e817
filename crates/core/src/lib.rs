//! Verdant Core - Shared domain types.
//!
//! This crate provides the types and pure business rules used by every
//! Verdant Organics component:
//! - `storefront` - Customer shop and company dashboard service
//! - `integration-tests` - Cross-crate behavior tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no backend access. Rules that used to be repeated at every call
//! site (media URL resolution, address defaulting, stock classification,
//! discount math) live here once.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, prices, and status enums
//! - [`address`] - Shipping addresses and the default-address invariant
//! - [`media`] - Object-storage path to public URL resolution

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address;
pub mod media;
pub mod types;

pub use address::{Address, AddressBook};
pub use media::MediaResolver;
pub use types::*;
