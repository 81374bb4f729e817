//! The profile's address book.
//!
//! Every operation reads the profile, edits the [`AddressBook`] in memory and
//! writes the whole document back. Concurrent edits from two sessions are
//! last-writer-wins.

use tracing::instrument;
use verdant_core::{Address, AddressBook, AddressId, UserId};

use super::ServiceError;
use crate::backend::{BackendClient, Bearer, ProfileUpdate};

/// Address book operations for one signed-in user.
pub struct AddressService<'a> {
    backend: &'a BackendClient,
    user: UserId,
    access_token: &'a str,
}

impl<'a> AddressService<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient, user: UserId, access_token: &'a str) -> Self {
        Self {
            backend,
            user,
            access_token,
        }
    }

    const fn bearer(&self) -> Bearer<'a> {
        Bearer::User(self.access_token)
    }

    /// The stored addresses.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile is missing.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn list(&self) -> Result<AddressBook, ServiceError> {
        let profile = self
            .backend
            .get_profile(self.user, self.bearer())
            .await?
            .ok_or(ServiceError::NotFound("profile"))?;
        Ok(profile.addresses)
    }

    async fn save(&self, book: AddressBook) -> Result<AddressBook, ServiceError> {
        let update = ProfileUpdate {
            addresses: Some(book),
            ..ProfileUpdate::default()
        };
        let profile = self
            .backend
            .update_profile(self.user, &update, self.bearer())
            .await?;
        Ok(profile.addresses)
    }

    /// Add an address.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the address is incomplete.
    #[instrument(skip(self, address), fields(user_id = %self.user))]
    pub async fn add(&self, address: Address) -> Result<AddressBook, ServiceError> {
        address.validate().map_err(ServiceError::Validation)?;
        let mut book = self.list().await?;
        let id = book.add(address);
        tracing::info!(address_id = %id, "Address added");
        self.save(book).await
    }

    /// Replace an address.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the address is incomplete, `NotFound` if the id
    /// is unknown.
    #[instrument(skip(self, address), fields(user_id = %self.user, address_id = %address.id))]
    pub async fn update(&self, address: Address) -> Result<AddressBook, ServiceError> {
        address.validate().map_err(ServiceError::Validation)?;
        let mut book = self.list().await?;
        if !book.update(address) {
            return Err(ServiceError::NotFound("address"));
        }
        self.save(book).await
    }

    /// Remove an address.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is unknown.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn remove(&self, id: AddressId) -> Result<AddressBook, ServiceError> {
        let mut book = self.list().await?;
        book.remove(id).ok_or(ServiceError::NotFound("address"))?;
        self.save(book).await
    }

    /// Make an address the default.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is unknown.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn set_default(&self, id: AddressId) -> Result<AddressBook, ServiceError> {
        let mut book = self.list().await?;
        if !book.set_default(id) {
            return Err(ServiceError::NotFound("address"));
        }
        self.save(book).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::backend::tests::client_for;

    fn address_json(id: AddressId, default: bool) -> serde_json::Value {
        json!({
            "id": id,
            "full_name": "Asha Rao",
            "address_line1": "12 MG Road",
            "city": "Bengaluru",
            "state": "Karnataka",
            "pincode": "560001",
            "isDefault": default,
        })
    }

    #[tokio::test]
    async fn test_remove_default_promotes_remaining() {
        let user = UserId::random();
        let (first, second) = (AddressId::random(), AddressId::random());
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_body(
                json!([{
                    "id": user,
                    "addresses": [address_json(first, true), address_json(second, false)],
                }])
                .to_string(),
            )
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "addresses": [{ "id": second, "is_default": true }]
            })))
            .with_body(
                json!([{ "id": user, "addresses": [address_json(second, true)] }]).to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let backend = client_for(&server);
        let book = AddressService::new(&backend, user, "token")
            .remove(first)
            .await
            .unwrap();

        assert_eq!(book.len(), 1);
        assert_eq!(book.default_address().unwrap().id, second);
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_address_is_not_found() {
        let user = UserId::random();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_body(json!([{ "id": user, "addresses": [] }]).to_string())
            .create_async()
            .await;

        let backend = client_for(&server);
        let err = AddressService::new(&backend, user, "token")
            .set_default(AddressId::random())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("address")));
    }
}
