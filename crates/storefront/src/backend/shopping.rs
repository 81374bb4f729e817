//! Cart rows, favorites and reviews.

use tracing::instrument;
use verdant_core::{CartItemId, ProductId, UserId};

use super::rest::Query;
use super::types::{CartItem, Favorite, NewCartItem, NewReview, Review};
use super::{BackendClient, BackendError, Bearer, single};

const CART_COLUMNS: &str = "*,product:products(*)";
const FAVORITE_COLUMNS: &str = "*,product:products(*)";
const REVIEW_COLUMNS: &str = "*,profile:profiles(full_name)";

// =============================================================================
// Cart
// =============================================================================

impl BackendClient {
    /// A user's cart, oldest line first, with products embedded.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(user_id = %user))]
    pub async fn cart_items(
        &self,
        user: UserId,
        bearer: Bearer<'_>,
    ) -> Result<Vec<CartItem>, BackendError> {
        let query = Query::table("cart_items")
            .select(CART_COLUMNS)
            .eq("user_id", user)
            .order("created_at", true);
        self.select(&query, bearer).await
    }

    /// The cart line for one product, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(user_id = %user, product_id = %product))]
    pub async fn cart_item(
        &self,
        user: UserId,
        product: ProductId,
        bearer: Bearer<'_>,
    ) -> Result<Option<CartItem>, BackendError> {
        let query = Query::table("cart_items")
            .select(CART_COLUMNS)
            .eq("user_id", user)
            .eq("product_id", product);
        self.select_one(query, bearer).await
    }

    /// Add a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the row.
    #[instrument(skip(self, item, bearer), fields(product_id = %item.product_id))]
    pub async fn insert_cart_item(
        &self,
        item: &NewCartItem,
        bearer: Bearer<'_>,
    ) -> Result<CartItem, BackendError> {
        let rows = self.insert("cart_items", item, bearer).await?;
        single(rows, "inserted cart item")
    }

    /// Set a cart line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line does not exist.
    #[instrument(skip(self, bearer), fields(cart_item_id = %id))]
    pub async fn set_cart_quantity(
        &self,
        id: CartItemId,
        quantity: i32,
        bearer: Bearer<'_>,
    ) -> Result<CartItem, BackendError> {
        let body = serde_json::json!({ "quantity": quantity });
        let rows = self
            .update(&Query::table("cart_items").eq("id", id), &body, bearer)
            .await?;
        single(rows, "cart item")
    }

    /// Remove one product from a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self, bearer), fields(user_id = %user, product_id = %product))]
    pub async fn delete_cart_item(
        &self,
        user: UserId,
        product: ProductId,
        bearer: Bearer<'_>,
    ) -> Result<(), BackendError> {
        let query = Query::table("cart_items")
            .eq("user_id", user)
            .eq("product_id", product);
        self.delete(&query, bearer).await
    }

    /// Empty a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self, bearer), fields(user_id = %user))]
    pub async fn clear_cart(&self, user: UserId, bearer: Bearer<'_>) -> Result<(), BackendError> {
        self.delete(&Query::table("cart_items").eq("user_id", user), bearer)
            .await
    }
}

// =============================================================================
// Favorites
// =============================================================================

impl BackendClient {
    /// A user's favorites, newest first, with products embedded.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(user_id = %user))]
    pub async fn favorites(
        &self,
        user: UserId,
        bearer: Bearer<'_>,
    ) -> Result<Vec<Favorite>, BackendError> {
        let query = Query::table("favorites")
            .select(FAVORITE_COLUMNS)
            .eq("user_id", user)
            .order("created_at", false);
        self.select(&query, bearer).await
    }

    /// Whether a product is in a user's favorites.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(user_id = %user, product_id = %product))]
    pub async fn is_favorite(
        &self,
        user: UserId,
        product: ProductId,
        bearer: Bearer<'_>,
    ) -> Result<bool, BackendError> {
        let query = Query::table("favorites")
            .select("product_id")
            .eq("user_id", user)
            .eq("product_id", product);
        let row: Option<serde_json::Value> = self.select_one(query, bearer).await?;
        Ok(row.is_some())
    }

    /// Add a favorite. Adding twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    #[instrument(skip(self, bearer), fields(user_id = %user, product_id = %product))]
    pub async fn add_favorite(
        &self,
        user: UserId,
        product: ProductId,
        bearer: Bearer<'_>,
    ) -> Result<(), BackendError> {
        let body = serde_json::json!({ "user_id": user, "product_id": product });
        let _: Vec<serde_json::Value> = self
            .upsert("favorites", &body, "user_id,product_id", bearer)
            .await?;
        Ok(())
    }

    /// Remove a favorite.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self, bearer), fields(user_id = %user, product_id = %product))]
    pub async fn remove_favorite(
        &self,
        user: UserId,
        product: ProductId,
        bearer: Bearer<'_>,
    ) -> Result<(), BackendError> {
        let query = Query::table("favorites")
            .eq("user_id", user)
            .eq("product_id", product);
        self.delete(&query, bearer).await
    }
}

// =============================================================================
// Reviews
// =============================================================================

impl BackendClient {
    /// A product's reviews, newest first, with reviewer names.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(product_id = %product))]
    pub async fn product_reviews(
        &self,
        product: ProductId,
        bearer: Bearer<'_>,
    ) -> Result<Vec<Review>, BackendError> {
        let query = Query::table("reviews")
            .select(REVIEW_COLUMNS)
            .eq("product_id", product)
            .order("created_at", false);
        self.select(&query, bearer).await
    }

    /// Create or replace the author's review of a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    #[instrument(skip(self, review, bearer), fields(product_id = %review.product_id))]
    pub async fn upsert_review(
        &self,
        review: &NewReview,
        bearer: Bearer<'_>,
    ) -> Result<Review, BackendError> {
        let rows = self
            .upsert("reviews", review, "user_id,product_id", bearer)
            .await?;
        single(rows, "review")
    }

    /// Delete the author's review of a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self, bearer), fields(user_id = %user, product_id = %product))]
    pub async fn delete_review(
        &self,
        user: UserId,
        product: ProductId,
        bearer: Bearer<'_>,
    ) -> Result<(), BackendError> {
        let query = Query::table("reviews")
            .eq("user_id", user)
            .eq("product_id", product);
        self.delete(&query, bearer).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::backend::tests::client_for;

    #[tokio::test]
    async fn test_cart_items_embed_products() {
        let user = UserId::random();
        let product = ProductId::random();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/cart_items")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), CART_COLUMNS.into()),
                Matcher::UrlEncoded("user_id".into(), format!("eq.{user}")),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"[{{
                    "id": "{id}",
                    "user_id": "{user}",
                    "product_id": "{product}",
                    "quantity": 2,
                    "price_at_add": "120.00",
                    "product": {{
                        "id": "{product}",
                        "company_id": "{company}",
                        "name": "Millet Flour",
                        "original_price": "120.00",
                        "stock_quantity": 40
                    }}
                }}]"#,
                id = CartItemId::random(),
                company = verdant_core::CompanyId::random(),
            ))
            .create_async()
            .await;

        let items = client_for(&server)
            .cart_items(user, Bearer::User("t"))
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product.as_ref().unwrap().name, "Millet Flour");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_is_favorite() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/favorites")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"product_id":"x"}]"#)
            .create_async()
            .await;

        let fav = client_for(&server)
            .is_favorite(UserId::random(), ProductId::random(), Bearer::User("t"))
            .await
            .unwrap();
        assert!(fav);
    }
}
