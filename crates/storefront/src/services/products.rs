//! Company product management.
//!
//! Every operation runs as the signed-in company user. The company must be
//! approved before it can create products; edits are limited to its own
//! rows. New products always start unapproved.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use verdant_core::media::product_image_key;
use verdant_core::{CompanyId, MediaResolver, ProductId};

use super::ServiceError;
use super::dashboard::DashboardCache;
use super::draft::ProductDraft;
use crate::backend::{
    BackendClient, Bearer, Company, Dimensions, NewProduct, Nutrient, Product, ProductPatch,
};

/// Largest accepted image upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Image types the bucket accepts.
pub const IMAGE_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

const MAX_NAME_CHARS: usize = 200;

/// Fields a company fills in for a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub original_price: Decimal,
    pub discount_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub unit: Option<String>,
    pub weight: Option<Decimal>,
    #[serde(flatten)]
    pub dimensions: Dimensions,
    pub tax_percentage: Option<Decimal>,
    pub shipping_charge: Option<Decimal>,
    pub hsn_code: Option<String>,
    pub nutrients: Vec<Nutrient>,
    pub categories: Vec<String>,
}

impl ProductInput {
    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first bad field.
    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_name(&self.name)?;
        validate_pricing(self.original_price, self.discount_price)?;
        validate_stock(self.stock_quantity)?;
        validate_charges(self.tax_percentage, self.shipping_charge)?;
        validate_measures(self.weight, self.dimensions)?;
        Ok(())
    }

    fn into_new_product(self, company: CompanyId) -> NewProduct {
        NewProduct {
            company_id: company,
            name: self.name.trim().to_owned(),
            description: self.description.trim().to_owned(),
            original_price: self.original_price,
            discount_price: self.discount_price,
            stock_quantity: self.stock_quantity,
            unit: self.unit,
            weight: self.weight,
            dimensions: self.dimensions,
            tax_percentage: self.tax_percentage,
            shipping_charge: self.shipping_charge,
            hsn_code: self.hsn_code,
            nutrients: self.nutrients,
            categories: normalize_categories(self.categories),
            images: Vec::new(),
            is_approved: false,
        }
    }
}

// ===== Field rules =====

pub(crate) fn validate_name(name: &str) -> Result<(), ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::validation("name is required"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ServiceError::validation(format!(
            "name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_pricing(original: Decimal, discount: Option<Decimal>) -> Result<(), ServiceError> {
    if original <= Decimal::ZERO {
        return Err(ServiceError::validation("price must be greater than zero"));
    }
    if let Some(discount) = discount {
        if discount <= Decimal::ZERO {
            return Err(ServiceError::validation("discount price must be greater than zero"));
        }
        if discount > original {
            return Err(ServiceError::validation(
                "discount price cannot exceed the original price",
            ));
        }
    }
    Ok(())
}

pub(crate) fn validate_stock(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 0 {
        return Err(ServiceError::validation("stock cannot be negative"));
    }
    Ok(())
}

pub(crate) fn validate_charges(
    tax: Option<Decimal>,
    shipping: Option<Decimal>,
) -> Result<(), ServiceError> {
    if let Some(tax) = tax
        && !(Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(&tax)
    {
        return Err(ServiceError::validation("tax percentage must be between 0 and 100"));
    }
    if shipping.is_some_and(|s| s < Decimal::ZERO) {
        return Err(ServiceError::validation("shipping charge cannot be negative"));
    }
    Ok(())
}

pub(crate) fn validate_measures(weight: Option<Decimal>, dimensions: Dimensions) -> Result<(), ServiceError> {
    let negative = [weight, dimensions.length, dimensions.width, dimensions.height]
        .into_iter()
        .flatten()
        .any(|v| v < Decimal::ZERO);
    if negative {
        return Err(ServiceError::validation("weight and dimensions cannot be negative"));
    }
    Ok(())
}

/// Trim, drop blanks and duplicates, keep order.
fn normalize_categories(categories: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(categories.len());
    for category in categories {
        let category = category.trim();
        if !category.is_empty() && !out.iter().any(|c| c.eq_ignore_ascii_case(category)) {
            out.push(category.to_owned());
        }
    }
    out
}

/// Check an upload before it is sent to storage.
///
/// # Errors
///
/// Returns `Validation` for empty, oversized or non-image uploads.
pub fn validate_image(content_type: &str, size: usize) -> Result<(), ServiceError> {
    if size == 0 {
        return Err(ServiceError::validation("image is empty"));
    }
    if size > MAX_IMAGE_BYTES {
        return Err(ServiceError::validation("image must be 5 MB or smaller"));
    }
    if !IMAGE_CONTENT_TYPES.contains(&content_type) {
        return Err(ServiceError::validation("image must be JPEG, PNG, WebP or GIF"));
    }
    Ok(())
}

/// Product management for one company user.
pub struct ProductManager<'a> {
    backend: &'a BackendClient,
    media: &'a MediaResolver,
    dashboard: &'a DashboardCache,
    company: CompanyId,
    access_token: &'a str,
}

impl<'a> ProductManager<'a> {
    #[must_use]
    pub const fn new(
        backend: &'a BackendClient,
        media: &'a MediaResolver,
        dashboard: &'a DashboardCache,
        company: CompanyId,
        access_token: &'a str,
    ) -> Self {
        Self {
            backend,
            media,
            dashboard,
            company,
            access_token,
        }
    }

    const fn bearer(&self) -> Bearer<'a> {
        Bearer::User(self.access_token)
    }

    /// The company row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the company is not visible.
    pub async fn company(&self) -> Result<Company, ServiceError> {
        self.backend
            .get_company(self.company, self.bearer())
            .await?
            .ok_or(ServiceError::NotFound("company"))
    }

    async fn require_approved(&self) -> Result<Company, ServiceError> {
        let company = self.company().await?;
        if !company.is_approved {
            tracing::info!(company_id = %self.company, "Unapproved company tried to publish");
            return Err(ServiceError::NotApproved);
        }
        Ok(company)
    }

    async fn owned(&self, id: ProductId) -> Result<Product, ServiceError> {
        let product = self
            .backend
            .get_product(id, self.bearer())
            .await?
            .ok_or(ServiceError::NotFound("product"))?;
        if product.company_id != self.company {
            return Err(ServiceError::Forbidden("product belongs to another company"));
        }
        Ok(product)
    }

    /// The company's products, approved or not, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(company_id = %self.company))]
    pub async fn list(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(self
            .backend
            .company_products(self.company, self.bearer())
            .await?)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for bad input and `NotApproved` for companies
    /// awaiting approval.
    pub async fn create(&self, input: ProductInput) -> Result<Product, ServiceError> {
        self.create_with_images(input, Vec::new()).await
    }

    /// Create a product from a finished draft.
    ///
    /// # Errors
    ///
    /// As [`Self::create`], plus `Validation` for skipped draft steps.
    pub async fn submit_draft(&self, draft: ProductDraft) -> Result<Product, ServiceError> {
        let (input, images) = draft.finish()?;
        self.create_with_images(input, images).await
    }

    #[instrument(skip(self, input, images), fields(company_id = %self.company, images = images.len()))]
    async fn create_with_images(
        &self,
        input: ProductInput,
        images: Vec<String>,
    ) -> Result<Product, ServiceError> {
        input.validate()?;
        self.require_approved().await?;
        let mut new_product = input.into_new_product(self.company);
        new_product.images = images;
        let product = self
            .backend
            .insert_product(&new_product, self.bearer())
            .await?;
        self.dashboard.invalidate(self.company);
        tracing::info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the merged product breaks a field rule and
    /// `Forbidden` for other companies' products.
    #[instrument(skip(self, patch), fields(company_id = %self.company))]
    pub async fn update(&self, id: ProductId, mut patch: ProductPatch) -> Result<Product, ServiceError> {
        let current = self.owned(id).await?;

        if let Some(name) = &patch.name {
            validate_name(name)?;
            patch.name = Some(name.trim().to_owned());
        }
        let original = patch.original_price.unwrap_or(current.original_price);
        let discount = patch.discount_price.unwrap_or(current.discount_price);
        validate_pricing(original, discount)?;
        if let Some(stock) = patch.stock_quantity {
            validate_stock(stock)?;
        }
        validate_charges(patch.tax_percentage, patch.shipping_charge)?;
        let dimensions = Dimensions {
            length: patch.length,
            width: patch.width,
            height: patch.height,
        };
        validate_measures(patch.weight, dimensions)?;
        if let Some(categories) = patch.categories.take() {
            patch.categories = Some(normalize_categories(categories));
        }

        let product = self.backend.update_product(id, &patch, self.bearer()).await?;
        self.dashboard.invalidate(self.company);
        Ok(product)
    }

    /// Delete a product and, best effort, its images.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for other companies' products. Image cleanup
    /// failures are logged, not returned.
    #[instrument(skip(self), fields(company_id = %self.company))]
    pub async fn delete(&self, id: ProductId) -> Result<(), ServiceError> {
        let product = self.owned(id).await?;
        self.backend.delete_product(id, self.bearer()).await?;
        self.dashboard.invalidate(self.company);

        let keys: Vec<String> = product
            .images
            .iter()
            .filter_map(|path| self.media.object_key(path))
            .collect();
        if let Err(e) = self
            .backend
            .remove_objects(self.media.bucket(), &keys, self.bearer())
            .await
        {
            tracing::warn!(error = %e, product_id = %id, count = keys.len(), "Failed to remove product images");
        }
        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }

    /// Upload an image and append it to the product.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for unacceptable files and storage or backend
    /// errors.
    #[instrument(skip(self, bytes), fields(company_id = %self.company, size = bytes.len()))]
    pub async fn upload_image(
        &self,
        id: ProductId,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Product, ServiceError> {
        validate_image(content_type, bytes.len())?;
        let product = self.owned(id).await?;

        let key = product_image_key(self.company, id, uploaded_at.timestamp_millis(), file_name);
        let stored = self
            .backend
            .upload_object(self.media.bucket(), &key, bytes, content_type, self.bearer())
            .await?;

        let mut images = product.images;
        images.push(stored);
        let patch = ProductPatch {
            images: Some(images),
            ..ProductPatch::default()
        };
        Ok(self.backend.update_product(id, &patch, self.bearer()).await?)
    }

    /// Upload an image for a draft that has no product row yet.
    ///
    /// Returns the stored object key.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for unacceptable files or a full draft and
    /// `NotApproved` for companies awaiting approval.
    #[instrument(skip(self, draft, bytes), fields(company_id = %self.company, draft_id = %draft.id))]
    pub async fn upload_draft_image(
        &self,
        draft: &ProductDraft,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        uploaded_at: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        draft.check_can_add_image()?;
        validate_image(content_type, bytes.len())?;
        self.require_approved().await?;

        let key = product_image_key(self.company, draft.id, uploaded_at.timestamp_millis(), file_name);
        Ok(self
            .backend
            .upload_object(self.media.bucket(), &key, bytes, content_type, self.bearer())
            .await?)
    }

    /// Remove a draft image from storage. Failures are logged.
    pub async fn discard_draft_image(&self, key: &str) {
        if let Err(e) = self
            .backend
            .remove_objects(self.media.bucket(), &[key.to_owned()], self.bearer())
            .await
        {
            tracing::warn!(error = %e, "Failed to remove draft image");
        }
    }

    /// Detach an image and remove it from storage (best effort).
    ///
    /// `image` may be the stored path or its public URL.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product has no such image.
    #[instrument(skip(self), fields(company_id = %self.company))]
    pub async fn remove_image(&self, id: ProductId, image: &str) -> Result<Product, ServiceError> {
        let product = self.owned(id).await?;
        let target = self
            .media
            .object_key(image)
            .ok_or(ServiceError::NotFound("image"))?;

        let before = product.images.len();
        let images: Vec<String> = product
            .images
            .into_iter()
            .filter(|path| self.media.object_key(path).as_deref() != Some(target.as_str()))
            .collect();
        if images.len() == before {
            return Err(ServiceError::NotFound("image"));
        }

        let patch = ProductPatch {
            images: Some(images),
            ..ProductPatch::default()
        };
        let updated = self.backend.update_product(id, &patch, self.bearer()).await?;

        if let Err(e) = self
            .backend
            .remove_objects(self.media.bucket(), &[target], self.bearer())
            .await
        {
            tracing::warn!(error = %e, product_id = %id, "Failed to remove product image object");
        }
        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::backend::tests::client_for;
    use crate::clock::SystemClock;

    fn input() -> ProductInput {
        ProductInput {
            name: "  Wild Forest Honey ".to_owned(),
            original_price: Decimal::from(450),
            discount_price: Some(Decimal::from(399)),
            stock_quantity: 20,
            categories: vec!["Honey".to_owned(), " honey ".to_owned(), String::new(), "Raw".to_owned()],
            ..ProductInput::default()
        }
    }

    fn cache() -> DashboardCache {
        DashboardCache::new(Duration::from_secs(300), Arc::new(SystemClock))
    }

    #[test]
    fn test_input_validation() {
        assert!(input().validate().is_ok());

        let mut bad = input();
        bad.discount_price = Some(Decimal::from(500));
        assert!(matches!(bad.validate(), Err(ServiceError::Validation(m)) if m.contains("exceed")));

        let mut bad = input();
        bad.name = "   ".to_owned();
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.tax_percentage = Some(Decimal::from(101));
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.dimensions.height = Some(Decimal::from(-1));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_new_product_is_unapproved_with_clean_categories() {
        let company = CompanyId::random();
        let new = input().into_new_product(company);
        assert!(!new.is_approved);
        assert_eq!(new.name, "Wild Forest Honey");
        assert_eq!(new.categories, vec!["Honey".to_owned(), "Raw".to_owned()]);
        assert!(new.images.is_empty());
    }

    #[test]
    fn test_validate_image() {
        assert!(validate_image("image/png", 1024).is_ok());
        assert!(validate_image("application/pdf", 1024).is_err());
        assert!(validate_image("image/png", 0).is_err());
        assert!(validate_image("image/png", MAX_IMAGE_BYTES + 1).is_err());
    }

    #[tokio::test]
    async fn test_unapproved_company_cannot_create() {
        let company = CompanyId::random();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/companies")
            .match_query(Matcher::Any)
            .with_body(
                json!([{
                    "id": company,
                    "owner_id": verdant_core::UserId::random(),
                    "name": "Hill Farms",
                    "is_approved": false,
                }])
                .to_string(),
            )
            .create_async()
            .await;
        let insert = server
            .mock("POST", "/rest/v1/products")
            .expect(0)
            .create_async()
            .await;

        let backend = client_for(&server);
        let media = backend.media_resolver("product-images", "/none.png");
        let dashboard = cache();
        let err = ProductManager::new(&backend, &media, &dashboard, company, "t")
            .create(input())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotApproved));
        insert.assert_async().await;
    }

    #[tokio::test]
    async fn test_cannot_touch_other_companys_product() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/products")
            .match_query(Matcher::Any)
            .with_body(
                json!([{
                    "id": ProductId::random(),
                    "company_id": CompanyId::random(),
                    "name": "Ragi",
                    "original_price": "60",
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let backend = client_for(&server);
        let media = backend.media_resolver("product-images", "/none.png");
        let dashboard = cache();
        let err = ProductManager::new(&backend, &media, &dashboard, CompanyId::random(), "t")
            .delete(ProductId::random())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_upload_image_uses_company_scoped_key() {
        let (company, id) = (CompanyId::random(), ProductId::random());
        let product = json!({
            "id": id,
            "company_id": company,
            "name": "Ragi",
            "original_price": "60",
            "images": [],
        });
        let uploaded_at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        let key = format!("{company}/{id}/1700000000123_ragi_flour.png");

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/products")
            .match_query(Matcher::Any)
            .with_body(json!([product]).to_string())
            .create_async()
            .await;
        let upload = server
            .mock("POST", format!("/storage/v1/object/product-images/{key}").as_str())
            .match_header("x-upsert", "true")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/rest/v1/products")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({ "images": [key] })))
            .with_body(
                json!([{
                    "id": id,
                    "company_id": company,
                    "name": "Ragi",
                    "original_price": "60",
                    "images": [key],
                }])
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let backend = client_for(&server);
        let media = backend.media_resolver("product-images", "/none.png");
        let dashboard = cache();
        let updated = ProductManager::new(&backend, &media, &dashboard, company, "t")
            .upload_image(id, "ragi flour.png", "image/png", vec![1, 2, 3], uploaded_at)
            .await
            .unwrap();

        assert_eq!(updated.images, vec![key]);
        upload.assert_async().await;
        patch.assert_async().await;
    }

    fn owned_product(company: CompanyId, id: ProductId) -> serde_json::Value {
        json!({
            "id": id,
            "company_id": company,
            "name": "Kodo Millet",
            "original_price": "120",
            "length": "20",
            "width": "12",
            "height": "6",
        })
    }

    #[tokio::test]
    async fn test_update_rejects_negative_dimension() {
        let (company, id) = (CompanyId::random(), ProductId::random());
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/products")
            .match_query(Matcher::Any)
            .with_body(json!([owned_product(company, id)]).to_string())
            .create_async()
            .await;
        let patch_mock = server
            .mock("PATCH", "/rest/v1/products")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let backend = client_for(&server);
        let media = backend.media_resolver("product-images", "/none.png");
        let dashboard = cache();
        let patch: ProductPatch = serde_json::from_value(json!({"height": "-4"})).unwrap();
        let err = ProductManager::new(&backend, &media, &dashboard, company, "t")
            .update(id, patch)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(m) if m.contains("dimensions")));
        patch_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_sends_dimensions() {
        let (company, id) = (CompanyId::random(), ProductId::random());
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/products")
            .match_query(Matcher::Any)
            .with_body(json!([owned_product(company, id)]).to_string())
            .create_async()
            .await;
        let mut updated = owned_product(company, id);
        updated["width"] = json!("15");
        let patch_mock = server
            .mock("PATCH", "/rest/v1/products")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({"width": "15"})))
            .with_body(json!([updated]).to_string())
            .expect(1)
            .create_async()
            .await;

        let backend = client_for(&server);
        let media = backend.media_resolver("product-images", "/none.png");
        let dashboard = cache();
        let patch: ProductPatch = serde_json::from_value(json!({"width": "15"})).unwrap();
        let product = ProductManager::new(&backend, &media, &dashboard, company, "t")
            .update(id, patch)
            .await
            .unwrap();

        assert_eq!(product.dimensions.width, Some(Decimal::from(15)));
        assert_eq!(product.dimensions.length, Some(Decimal::from(20)));
        patch_mock.assert_async().await;
    }
}
