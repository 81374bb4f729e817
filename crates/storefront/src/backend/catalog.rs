//! Products and companies.

use serde::{Deserialize, Serialize};
use tracing::instrument;
use verdant_core::{CompanyId, ProductId};

use super::rest::Query;
use super::types::{Company, NewProduct, Product, ProductPatch};
use super::{BackendClient, BackendError, Bearer, single};

/// Product columns plus the owning company's name.
const PRODUCT_COLUMNS: &str = "*,company:companies(name)";

/// Default page size for product listings.
pub const DEFAULT_PAGE_SIZE: usize = 24;

/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: usize = 100;

/// Listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

/// Catalog listing parameters. Also the cache key for listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub sort: ProductSort,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            sort: ProductSort::default(),
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ProductFilter {
    /// Clamp paging and drop blank text filters so equal queries share a
    /// cache entry.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.per_page = self.per_page.clamp(1, MAX_PAGE_SIZE);
        self.category = self
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        self.search = self
            .search
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());
        self
    }

    fn to_query(&self) -> Query {
        let mut query = Query::table("products")
            .select(PRODUCT_COLUMNS)
            .eq("is_approved", true);

        if let Some(category) = &self.category {
            let json = serde_json::Value::from(vec![category.as_str()]).to_string();
            query = query.contains("categories", &json);
        }
        if let Some(search) = &self.search {
            query = query.ilike("name", search);
        }

        query = match self.sort {
            ProductSort::Newest => query.order("created_at", false),
            ProductSort::PriceAsc => query.order("original_price", true),
            ProductSort::PriceDesc => query.order("original_price", false),
        };

        query
            .limit(self.per_page)
            .offset((self.page - 1) * self.per_page)
    }
}

impl BackendClient {
    /// List approved products.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(page = filter.page))]
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        bearer: Bearer<'_>,
    ) -> Result<Vec<Product>, BackendError> {
        self.select(&filter.to_query(), bearer).await
    }

    /// Fetch one product with its company name.
    ///
    /// Unapproved products are only visible to their company (row-level
    /// security decides).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(product_id = %id))]
    pub async fn get_product(
        &self,
        id: ProductId,
        bearer: Bearer<'_>,
    ) -> Result<Option<Product>, BackendError> {
        let query = Query::table("products").select(PRODUCT_COLUMNS).eq("id", id);
        self.select_one(query, bearer).await
    }

    /// Fetch several products by id, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, ids, bearer), fields(count = ids.len()))]
    pub async fn products_by_ids(
        &self,
        ids: &[ProductId],
        bearer: Bearer<'_>,
    ) -> Result<Vec<Product>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table("products").select("*").in_list("id", ids);
        self.select(&query, bearer).await
    }

    /// Every product of a company, approved or not, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(company_id = %company))]
    pub async fn company_products(
        &self,
        company: CompanyId,
        bearer: Bearer<'_>,
    ) -> Result<Vec<Product>, BackendError> {
        let query = Query::table("products")
            .select("*")
            .eq("company_id", company)
            .order("created_at", false);
        self.select(&query, bearer).await
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the row.
    #[instrument(skip(self, product, bearer), fields(company_id = %product.company_id))]
    pub async fn insert_product(
        &self,
        product: &NewProduct,
        bearer: Bearer<'_>,
    ) -> Result<Product, BackendError> {
        let rows = self.insert("products", product, bearer).await?;
        single(rows, "inserted product")
    }

    /// Patch a product.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no visible row matched.
    #[instrument(skip(self, patch, bearer), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        bearer: Bearer<'_>,
    ) -> Result<Product, BackendError> {
        let rows = self
            .update(&Query::table("products").eq("id", id), patch, bearer)
            .await?;
        single(rows, "product")
    }

    /// Delete a product row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self, bearer), fields(product_id = %id))]
    pub async fn delete_product(&self, id: ProductId, bearer: Bearer<'_>) -> Result<(), BackendError> {
        self.delete(&Query::table("products").eq("id", id), bearer).await
    }

    /// Fetch a company.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(company_id = %id))]
    pub async fn get_company(
        &self,
        id: CompanyId,
        bearer: Bearer<'_>,
    ) -> Result<Option<Company>, BackendError> {
        let query = Query::table("companies").select("*").eq("id", id);
        self.select_one(query, bearer).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::backend::tests::client_for;

    #[test]
    fn test_filter_normalization() {
        let filter = ProductFilter {
            category: Some("  Honey ".to_owned()),
            search: Some("   ".to_owned()),
            sort: ProductSort::PriceAsc,
            page: 0,
            per_page: 1000,
        }
        .normalized();

        assert_eq!(filter.category.as_deref(), Some("honey"));
        assert!(filter.search.is_none());
        assert_eq!(filter.page, 1);
        assert_eq!(filter.per_page, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_filter_query() {
        let filter = ProductFilter {
            category: Some("spices".to_owned()),
            search: Some("turmeric".to_owned()),
            sort: ProductSort::PriceDesc,
            page: 3,
            per_page: 10,
        };
        let params = filter.to_query().params().to_vec();

        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("is_approved"), "eq.true");
        assert_eq!(get("categories"), r#"cs.["spices"]"#);
        assert_eq!(get("name"), "ilike.*turmeric*");
        assert_eq!(get("order"), "original_price.desc");
        assert_eq!(get("offset"), "20");
    }

    #[tokio::test]
    async fn test_get_product_missing_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/products")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let product = client_for(&server)
            .get_product(ProductId::random(), Bearer::Anon)
            .await
            .unwrap();
        assert!(product.is_none());
    }

    #[tokio::test]
    async fn test_products_by_ids_skips_empty_request() {
        // No mock registered: any request would fail.
        let server = mockito::Server::new_async().await;
        let products = client_for(&server)
            .products_by_ids(&[], Bearer::Anon)
            .await
            .unwrap();
        assert!(products.is_empty());
    }
}
