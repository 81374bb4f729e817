//! Saved products.

use tracing::instrument;
use verdant_core::{MediaResolver, ProductId, UserId};

use super::ServiceError;
use super::catalog::ProductCard;
use crate::backend::{BackendClient, Bearer};

/// Favorites for one signed-in user.
pub struct FavoritesService<'a> {
    backend: &'a BackendClient,
    media: &'a MediaResolver,
    user: UserId,
    access_token: &'a str,
}

impl<'a> FavoritesService<'a> {
    #[must_use]
    pub const fn new(
        backend: &'a BackendClient,
        media: &'a MediaResolver,
        user: UserId,
        access_token: &'a str,
    ) -> Self {
        Self {
            backend,
            media,
            user,
            access_token,
        }
    }

    const fn bearer(&self) -> Bearer<'a> {
        Bearer::User(self.access_token)
    }

    /// Saved products, newest first. Products no longer visible are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn list(&self) -> Result<Vec<ProductCard>, ServiceError> {
        let favorites = self.backend.favorites(self.user, self.bearer()).await?;
        Ok(favorites
            .iter()
            .filter_map(|f| f.product.as_ref())
            .map(|p| ProductCard::from_product(p, self.media))
            .collect())
    }

    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn add(&self, product: ProductId) -> Result<(), ServiceError> {
        self.backend
            .add_favorite(self.user, product, self.bearer())
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn remove(&self, product: ProductId) -> Result<(), ServiceError> {
        self.backend
            .remove_favorite(self.user, product, self.bearer())
            .await?;
        Ok(())
    }

    /// Flip a product's favorite state. Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns an error if any backend call fails.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn toggle(&self, product: ProductId) -> Result<bool, ServiceError> {
        if self
            .backend
            .is_favorite(self.user, product, self.bearer())
            .await?
        {
            self.remove(product).await?;
            Ok(false)
        } else {
            self.add(product).await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::backend::tests::client_for;

    #[tokio::test]
    async fn test_toggle_removes_existing_favorite() {
        let mut server = mockito::Server::new_async().await;
        let product = ProductId::random();
        server
            .mock("GET", "/rest/v1/favorites")
            .match_query(Matcher::Any)
            .with_body(serde_json::json!([{ "product_id": product }]).to_string())
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/rest/v1/favorites")
            .match_query(Matcher::UrlEncoded(
                "product_id".into(),
                format!("eq.{product}"),
            ))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let backend = client_for(&server);
        let media = MediaResolver::new("https://b.test", "product-images", "/none.png");
        let now = FavoritesService::new(&backend, &media, UserId::random(), "token")
            .toggle(product)
            .await
            .unwrap();

        assert!(!now);
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_skips_rows_without_product() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/favorites")
            .match_query(Matcher::Any)
            .with_body(
                serde_json::json!([{
                    "user_id": UserId::random(),
                    "product_id": ProductId::random(),
                    "product": null
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let backend = client_for(&server);
        let media = MediaResolver::new("https://b.test", "product-images", "/none.png");
        let list = FavoritesService::new(&backend, &media, UserId::random(), "token")
            .list()
            .await
            .unwrap();
        assert!(list.is_empty());
    }
}
