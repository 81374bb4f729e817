//! User profiles.

use serde::Serialize;
use tracing::instrument;
use verdant_core::{AddressBook, UserId};

use super::rest::Query;
use super::types::Profile;
use super::{BackendClient, BackendError, Bearer, single};

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Replaces the whole address document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<AddressBook>,
}

impl BackendClient {
    /// Fetch a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(user_id = %user))]
    pub async fn get_profile(
        &self,
        user: UserId,
        bearer: Bearer<'_>,
    ) -> Result<Option<Profile>, BackendError> {
        let query = Query::table("profiles").select("*").eq("id", user);
        self.select_one(query, bearer).await
    }

    /// Update a profile.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile row does not exist or is not visible.
    #[instrument(skip(self, update, bearer), fields(user_id = %user))]
    pub async fn update_profile(
        &self,
        user: UserId,
        update: &ProfileUpdate,
        bearer: Bearer<'_>,
    ) -> Result<Profile, BackendError> {
        let rows = self
            .update(&Query::table("profiles").eq("id", user), update, bearer)
            .await?;
        single(rows, "profile")
    }
}
