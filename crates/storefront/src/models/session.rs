//! Session-related types.
//!
//! Types stored in the session for authentication and form state.

use serde::{Deserialize, Serialize};

use verdant_core::{CompanyId, Email, UserId};

/// Seconds before expiry at which an access token is refreshed.
pub const REFRESH_LEEWAY_SECS: i64 = 60;

/// Session-stored user identity and backend tokens.
///
/// The access token is forwarded on every backend call so row-level security
/// sees the signed-in user.
#[derive(Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Auth user ID (same as the profile ID).
    pub id: UserId,
    /// Email, absent for some OAuth identities.
    pub email: Option<Email>,
    pub full_name: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds at which `access_token` expires.
    pub expires_at: i64,
    /// Set for vendor accounts.
    pub company_id: Option<CompanyId>,
}

impl CurrentUser {
    /// Whether the access token should be refreshed before use.
    #[must_use]
    pub const fn needs_refresh(&self, now_unix: i64) -> bool {
        self.expires_at - REFRESH_LEEWAY_SECS <= now_unix
    }
}

impl std::fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("company_id", &self.company_id)
            .finish()
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the OAuth PKCE verifier between redirect and callback.
    pub const OAUTH_VERIFIER: &str = "oauth_verifier";

    /// Key for the add-product form in progress.
    pub const PRODUCT_DRAFT: &str = "product_draft";

    /// Key for the checkout awaiting payment.
    pub const PENDING_CHECKOUT: &str = "pending_checkout";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(expires_at: i64) -> CurrentUser {
        CurrentUser {
            id: UserId::random(),
            email: None,
            full_name: None,
            access_token: "secret-access".to_owned(),
            refresh_token: "secret-refresh".to_owned(),
            expires_at,
            company_id: None,
        }
    }

    #[test]
    fn test_needs_refresh_inside_leeway() {
        assert!(!user(1_000).needs_refresh(900));
        assert!(user(1_000).needs_refresh(940));
        assert!(user(1_000).needs_refresh(2_000));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!("{:?}", user(0));
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }
}
