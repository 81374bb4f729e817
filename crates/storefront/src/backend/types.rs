//! Row shapes for backend tables.
//!
//! The backend owns these tables; the structs here only describe what is read
//! and written. Column names are the wire names.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use verdant_core::{
    AddressBook, CartItemId, CompanyId, OrderId, OrderStatus, Pricing, ProductId, ReviewId,
    StockStatus, UserId,
};

// =============================================================================
// Profiles & Companies
// =============================================================================

/// A user profile row (`profiles`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// JSON document column.
    #[serde(default)]
    pub addresses: AddressBook,
    /// Set for vendor accounts.
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A vendor company row (`companies`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub owner_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub gst_number: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    /// Gates product publishing.
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Company name embedded in a product select.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRef {
    pub name: String,
}

// =============================================================================
// Products
// =============================================================================

/// One line of a product's nutrition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nutrient {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Package dimensions in centimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default)]
    pub length: Option<Decimal>,
    #[serde(default)]
    pub width: Option<Decimal>,
    #[serde(default)]
    pub height: Option<Decimal>,
}

/// A product row (`products`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub company_id: CompanyId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub original_price: Decimal,
    #[serde(default)]
    pub discount_price: Option<Decimal>,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default)]
    pub unit: Option<String>,
    /// Weight in grams.
    #[serde(default)]
    pub weight: Option<Decimal>,
    #[serde(flatten)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub tax_percentage: Option<Decimal>,
    #[serde(default)]
    pub shipping_charge: Option<Decimal>,
    #[serde(default)]
    pub hsn_code: Option<String>,
    #[serde(default)]
    pub nutrients: Vec<Nutrient>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Object-storage paths, first is the primary image.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Present when selected with `company:companies(name)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyRef>,
}

impl Product {
    #[must_use]
    pub const fn pricing(&self) -> Pricing {
        Pricing::new(self.original_price, self.discount_price)
    }

    /// Price a customer pays per unit.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.pricing().effective_price()
    }

    #[must_use]
    pub const fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.stock_quantity)
    }

    /// Tax on `amount` at this product's rate.
    #[must_use]
    pub fn tax_on(&self, amount: Decimal) -> Decimal {
        self.tax_percentage
            .map_or(Decimal::ZERO, |pct| amount * pct / Decimal::ONE_HUNDRED)
    }
}

/// Insert payload for `products`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub company_id: CompanyId,
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
    pub images: Vec<String>,
    /// Always `false` on insert; approval is an administrative action.
    pub is_approved: bool,
}

/// Partial update for `products`. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    /// `Some(None)` (JSON `null`) clears the discount.
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub discount_price: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_charge: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hsn_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrients: Option<Vec<Nutrient>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

// =============================================================================
// Cart, Favorites, Reviews
// =============================================================================

/// A cart row (`cart_items`) with its product embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Effective unit price when the item was added.
    pub price_at_add: Decimal,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub product: Option<Product>,
}

/// Insert payload for `cart_items`.
#[derive(Debug, Clone, Serialize)]
pub struct NewCartItem {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub price_at_add: Decimal,
}

/// A favorites row (`favorites`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: UserId,
    pub product_id: ProductId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub product: Option<Product>,
}

/// A review row (`reviews`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Present when selected with `profile:profiles(full_name)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ReviewerRef>,
}

/// Reviewer name embedded in a review select.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerRef {
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Upsert payload for `reviews`.
#[derive(Debug, Clone, Serialize)]
pub struct NewReview {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub rating: u8,
    pub comment: Option<String>,
}

// =============================================================================
// Orders
// =============================================================================

/// One purchased line, frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// An order row (`orders`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub shipping_address: verdant_core::Address,
    pub subtotal: Decimal,
    pub shipping_charge: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub gateway_order_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether any line belongs to `company`.
    #[must_use]
    pub fn touches_company(&self, company: CompanyId) -> bool {
        self.items.iter().any(|item| item.company_id == company)
    }

    /// Lines belonging to `company`.
    pub fn items_for(&self, company: CompanyId) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(move |item| item.company_id == company)
    }

    /// Distinct companies with lines in this order.
    #[must_use]
    pub fn company_ids(&self) -> Vec<CompanyId> {
        let mut ids: Vec<CompanyId> = self.items.iter().map(|item| item.company_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Insert payload for `orders`.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub shipping_address: verdant_core::Address,
    pub subtotal: Decimal,
    pub shipping_charge: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub status: OrderStatus,
}

/// Tell an explicit `null` apart from an absent field.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_null_discount_clears() {
        let clear: ProductPatch = serde_json::from_str(r#"{"discount_price": null}"#).unwrap();
        assert_eq!(clear.discount_price, Some(None));
        let untouched: ProductPatch = serde_json::from_str(r#"{"name": "Ragi"}"#).unwrap();
        assert_eq!(untouched.discount_price, None);
    }

    #[test]
    fn test_product_row_decodes_with_sparse_columns() {
        let json = r#"{
            "id": "6a1f1b1e-0000-4000-8000-000000000001",
            "company_id": "6a1f1b1e-0000-4000-8000-0000000000c1",
            "name": "Forest Honey",
            "original_price": "450.00",
            "discount_price": "399.00",
            "stock_quantity": 4,
            "length": "10",
            "categories": ["honey"],
            "images": ["c1/p1/1_honey.jpg"],
            "company": {"name": "Hill Bees"}
        }"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.stock_status(), StockStatus::LowStock);
        assert_eq!(product.effective_price(), "399.00".parse::<Decimal>().unwrap());
        assert_eq!(product.dimensions.length, Some(Decimal::from(10)));
        assert_eq!(product.company.unwrap().name, "Hill Bees");
        assert!(!product.is_approved);
    }

    #[test]
    fn test_product_patch_skips_untouched_fields() {
        let patch = ProductPatch {
            stock_quantity: Some(12),
            discount_price: Some(None),
            ..ProductPatch::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"stock_quantity": 12, "discount_price": null}));
    }

    #[test]
    fn test_order_company_helpers() {
        let a = CompanyId::random();
        let b = CompanyId::random();
        let item = |company, price: i64, qty| OrderItem {
            product_id: ProductId::random(),
            company_id: company,
            name: "x".to_owned(),
            unit_price: Decimal::from(price),
            quantity: qty,
            image: None,
        };
        let order = Order {
            id: OrderId::random(),
            user_id: UserId::random(),
            items: vec![item(a, 200, 1), item(b, 90, 1), item(a, 150, 2)],
            shipping_address: serde_json::from_str(
                r#"{"line1":"1 Main","city":"Pune","pincode":"411001"}"#,
            )
            .unwrap(),
            subtotal: Decimal::from(590),
            shipping_charge: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: Decimal::from(590),
            payment_id: None,
            gateway_order_id: None,
            status: OrderStatus::Confirmed,
            created_at: Utc::now(),
            updated_at: None,
        };
        assert!(order.touches_company(a));
        assert!(!order.touches_company(CompanyId::random()));
        let total: Decimal = order.items_for(a).map(OrderItem::line_total).sum();
        assert_eq!(total, Decimal::from(500));
        assert_eq!(order.company_ids().len(), 2);
    }
}
