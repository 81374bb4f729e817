//! Shipping addresses stored on the user profile.
//!
//! The profile row keeps its addresses as a JSON document. Older rows were
//! written with different field spellings (`address_line1`, `postal_code`,
//! `isDefault`, ...); the serde aliases below fold all of them into one shape
//! so callers never branch on schema version.
//!
//! [`AddressBook`] owns the "exactly one default" rule. It is only a
//! convention: two tabs editing the same profile can still race.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AddressId;

/// Namespace for ids derived from legacy addresses stored without one.
const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_9a4e_7d2b_4f0a_9e61_3b8d_2a47_c0f5);

/// A shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Nil until [`AddressBook::new`] assigns one to a legacy entry.
    #[serde(default = "missing_id")]
    pub id: AddressId,
    #[serde(default, alias = "fullName", alias = "name")]
    pub full_name: String,
    #[serde(default, alias = "phone_number", alias = "phoneNumber")]
    pub phone: String,
    #[serde(alias = "address_line1", alias = "addressLine1", alias = "street")]
    pub line1: String,
    #[serde(
        default,
        alias = "address_line2",
        alias = "addressLine2",
        skip_serializing_if = "Option::is_none"
    )]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
    pub city: String,
    #[serde(default, alias = "province")]
    pub state: String,
    #[serde(alias = "postal_code", alias = "postalCode", alias = "zip")]
    pub pincode: String,
    #[serde(default = "default_country")]
    pub country: String,
    /// Free-form label such as "Home" or "Office".
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, alias = "isDefault", alias = "default")]
    pub is_default: bool,
}

fn missing_id() -> AddressId {
    AddressId::new(Uuid::nil())
}

fn default_country() -> String {
    "India".to_owned()
}

impl Address {
    /// Single-line rendering used in order snapshots and emails.
    #[must_use]
    pub fn one_line(&self) -> String {
        let mut parts: Vec<&str> = vec![self.line1.as_str()];
        if let Some(line2) = self.line2.as_deref().filter(|s| !s.is_empty()) {
            parts.push(line2);
        }
        if let Some(landmark) = self.landmark.as_deref().filter(|s| !s.is_empty()) {
            parts.push(landmark);
        }
        parts.push(&self.city);
        if !self.state.is_empty() {
            parts.push(&self.state);
        }
        parts.push(&self.pincode);
        parts.join(", ")
    }

    /// Check the fields the courier needs.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first missing or malformed field.
    pub fn validate(&self) -> Result<(), String> {
        if self.full_name.trim().is_empty() {
            return Err("full name is required".to_owned());
        }
        if self.line1.trim().is_empty() {
            return Err("address line 1 is required".to_owned());
        }
        if self.city.trim().is_empty() {
            return Err("city is required".to_owned());
        }
        let pin = self.pincode.trim();
        if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err("pincode must be 6 digits".to_owned());
        }
        let digits = self.phone.chars().filter(char::is_ascii_digit).count();
        if !self.phone.is_empty() && !(10..=13).contains(&digits) {
            return Err("phone number must have 10 to 13 digits".to_owned());
        }
        Ok(())
    }
}

/// The list of addresses on a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Address>", into = "Vec<Address>")]
pub struct AddressBook(Vec<Address>);

impl From<Vec<Address>> for AddressBook {
    fn from(addresses: Vec<Address>) -> Self {
        Self::new(addresses)
    }
}

impl From<AddressBook> for Vec<Address> {
    fn from(book: AddressBook) -> Self {
        book.0
    }
}

impl AddressBook {
    /// Wrap a list read from the backend, repairing ids and the default flag.
    ///
    /// Entries stored without an id get one derived from their position and
    /// contents, so the same document always yields the same ids.
    #[must_use]
    pub fn new(addresses: Vec<Address>) -> Self {
        let mut book = Self(addresses);
        book.assign_missing_ids();
        book.normalize();
        book
    }

    /// Give nil ids a stable value. Writing the book back persists them.
    fn assign_missing_ids(&mut self) {
        for (index, address) in self.0.iter_mut().enumerate() {
            if address.id.as_uuid().is_nil() {
                let name = format!(
                    "{index}|{}|{}|{}|{}",
                    address.full_name, address.line1, address.city, address.pincode
                );
                address.id = AddressId::new(Uuid::new_v5(&LEGACY_ID_NAMESPACE, name.as_bytes()));
            }
        }
    }

    /// All addresses, in stored order.
    #[must_use]
    pub fn as_slice(&self) -> &[Address] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up an address by id.
    #[must_use]
    pub fn get(&self, id: AddressId) -> Option<&Address> {
        self.0.iter().find(|a| a.id == id)
    }

    /// The flagged default, falling back to the first address.
    #[must_use]
    pub fn default_address(&self) -> Option<&Address> {
        self.0.iter().find(|a| a.is_default).or_else(|| self.0.first())
    }

    /// Append an address and return its id.
    ///
    /// The first address always becomes the default; a new address flagged
    /// `is_default` takes the flag from the previous one.
    pub fn add(&mut self, mut address: Address) -> AddressId {
        if address.id.as_uuid().is_nil() || self.get(address.id).is_some() {
            address.id = AddressId::random();
        }
        let id = address.id;
        let make_default = address.is_default || self.0.is_empty();
        address.is_default = false;
        self.0.push(address);
        if make_default {
            self.set_default(id);
        }
        id
    }

    /// Replace the address with the same id. Returns `false` if none matched.
    ///
    /// The default flag on `address` is honored only when setting it; an
    /// update cannot leave the book without a default.
    pub fn update(&mut self, address: Address) -> bool {
        let id = address.id;
        let wants_default = address.is_default;
        let Some(slot) = self.0.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        let was_default = slot.is_default;
        *slot = address;
        slot.is_default = was_default;
        if wants_default {
            self.set_default(id);
        }
        true
    }

    /// Remove an address. Removing the default promotes the first remaining one.
    pub fn remove(&mut self, id: AddressId) -> Option<Address> {
        let index = self.0.iter().position(|a| a.id == id)?;
        let removed = self.0.remove(index);
        self.normalize();
        Some(removed)
    }

    /// Flag one address as the default. Returns `false` if the id is unknown.
    pub fn set_default(&mut self, id: AddressId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        for address in &mut self.0 {
            address.is_default = address.id == id;
        }
        true
    }

    /// Enforce at most one default, and exactly one when non-empty.
    fn normalize(&mut self) {
        let mut seen_default = false;
        for address in &mut self.0 {
            if address.is_default {
                if seen_default {
                    address.is_default = false;
                }
                seen_default = true;
            }
        }
        if !seen_default && let Some(first) = self.0.first_mut() {
            first.is_default = true;
        }
    }

    /// Consume the book, returning the stored list.
    #[must_use]
    pub fn into_inner(self) -> Vec<Address> {
        self.0
    }
}
