//! Product browsing for shoppers.
//!
//! Listings are cached per [`ProductFilter`] in `moka` (5-minute TTL). Any
//! product change notification clears the whole listing cache; product
//! detail is always read live so stock is current.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;
use verdant_core::{CompanyId, MediaResolver, ProductId, StockStatus, UserId};

use super::ServiceError;
use super::reviews::{RatingSummary, ReviewView, product_reviews};
use crate::backend::{BackendClient, Bearer, Dimensions, Nutrient, Product, ProductFilter};

/// Cached listing pages.
pub type ProductCache = Cache<ProductFilter, Arc<Vec<ProductCard>>>;

/// Build the listing cache.
#[must_use]
pub fn product_cache() -> ProductCache {
    Cache::builder()
        .max_capacity(1000)
        .time_to_live(Duration::from_secs(300)) // 5 minutes
        .build()
}

/// A product as shown in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductCard {
    pub id: ProductId,
    pub company_id: CompanyId,
    pub name: String,
    pub company_name: Option<String>,
    /// What the customer pays.
    pub price: Decimal,
    pub original_price: Decimal,
    pub discount_percentage: u32,
    pub stock_status: StockStatus,
    pub image_url: String,
    pub unit: Option<String>,
    pub categories: Vec<String>,
}

impl ProductCard {
    #[must_use]
    pub fn from_product(product: &Product, media: &MediaResolver) -> Self {
        let pricing = product.pricing();
        Self {
            id: product.id,
            company_id: product.company_id,
            name: product.name.clone(),
            company_name: product.company.as_ref().map(|c| c.name.clone()),
            price: pricing.effective_price(),
            original_price: pricing.original_price,
            discount_percentage: pricing.discount_percentage(),
            stock_status: product.stock_status(),
            image_url: media.primary(&product.images),
            unit: product.unit.clone(),
            categories: product.categories.clone(),
        }
    }
}

/// Everything the product page shows.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub card: ProductCard,
    pub description: String,
    pub images: Vec<String>,
    pub stock_quantity: i32,
    pub weight: Option<Decimal>,
    pub dimensions: Dimensions,
    pub nutrients: Vec<Nutrient>,
    pub tax_percentage: Option<Decimal>,
    pub shipping_charge: Option<Decimal>,
    pub hsn_code: Option<String>,
    pub rating: RatingSummary,
    pub reviews: Vec<ReviewView>,
    /// Only meaningful for signed-in viewers.
    pub is_favorite: bool,
}

/// Who is looking at the catalog.
#[derive(Debug, Clone, Copy)]
pub enum Viewer<'a> {
    Guest,
    User { id: UserId, access_token: &'a str },
}

impl<'a> Viewer<'a> {
    const fn bearer(self) -> Bearer<'a> {
        match self {
            Self::Guest => Bearer::Anon,
            Self::User { access_token, .. } => Bearer::User(access_token),
        }
    }
}

/// Catalog reads.
pub struct CatalogService<'a> {
    backend: &'a BackendClient,
    media: &'a MediaResolver,
    cache: &'a ProductCache,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient, media: &'a MediaResolver, cache: &'a ProductCache) -> Self {
        Self {
            backend,
            media,
            cache,
        }
    }

    /// One page of approved products.
    ///
    /// Listings are public, so they are read anonymously and shared between
    /// all viewers.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails on a cache miss.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: ProductFilter) -> Result<Arc<Vec<ProductCard>>, ServiceError> {
        let filter = filter.normalized();
        if let Some(cached) = self.cache.get(&filter).await {
            tracing::debug!("Product listing cache hit");
            return Ok(cached);
        }

        let products = self.backend.list_products(&filter, Bearer::Anon).await?;
        let cards: Arc<Vec<ProductCard>> = Arc::new(
            products
                .iter()
                .map(|p| ProductCard::from_product(p, self.media))
                .collect(),
        );
        self.cache.insert(filter, Arc::clone(&cards)).await;
        Ok(cards)
    }

    /// The product page.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist or is not approved.
    /// Companies see their own pending products through the dashboard.
    #[instrument(skip(self, viewer), fields(product_id = %id))]
    pub async fn detail(&self, id: ProductId, viewer: Viewer<'_>) -> Result<ProductDetail, ServiceError> {
        let bearer = viewer.bearer();
        let product = self
            .backend
            .get_product(id, bearer)
            .await?
            .filter(|product| product.is_approved)
            .ok_or(ServiceError::NotFound("product"))?;

        let (rating, reviews) = product_reviews(self.backend, id, bearer).await?;

        let is_favorite = match viewer {
            Viewer::Guest => false,
            Viewer::User { id: user, .. } => self.backend.is_favorite(user, id, bearer).await?,
        };

        Ok(ProductDetail {
            card: ProductCard::from_product(&product, self.media),
            images: self.media.resolve_all(&product.images),
            description: product.description,
            stock_quantity: product.stock_quantity.max(0),
            weight: product.weight,
            dimensions: product.dimensions,
            nutrients: product.nutrients,
            tax_percentage: product.tax_percentage,
            shipping_charge: product.shipping_charge,
            hsn_code: product.hsn_code,
            rating,
            reviews,
            is_favorite,
        })
    }
}
