//! Cart lines and totals.
//!
//! Totals are always computed from the product's current effective price.
//! `price_at_add` is kept so the cart can flag lines whose price moved since
//! they were added.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;
use verdant_core::{MediaResolver, ProductId, StockStatus, UserId};

use super::ServiceError;
use crate::backend::{BackendClient, Bearer, CartItem, NewCartItem, Product};

/// One cart line with its product.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub image_url: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub original_price: Decimal,
    pub price_at_add: Decimal,
    pub line_total: Decimal,
    pub stock_status: StockStatus,
    /// Whether the product still has enough stock for this line.
    pub available: bool,
}

impl CartLine {
    fn new(item: &CartItem, product: &Product, media: &MediaResolver) -> Self {
        let unit_price = product.effective_price();
        Self {
            product_id: item.product_id,
            name: product.name.clone(),
            image_url: media.primary(&product.images),
            quantity: item.quantity,
            unit_price,
            original_price: product.original_price,
            price_at_add: item.price_at_add,
            line_total: unit_price * Decimal::from(item.quantity),
            stock_status: product.stock_status(),
            available: item.quantity <= product.stock_quantity,
        }
    }

    /// Whether the price changed since the line was added.
    #[must_use]
    pub fn price_changed(&self) -> bool {
        self.price_at_add != self.unit_price
    }
}

/// Cart totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    /// Sum of quantities.
    pub item_count: i64,
    pub subtotal: Decimal,
    /// Discount against original prices.
    pub savings: Decimal,
}

impl CartSummary {
    #[must_use]
    pub fn from_lines(lines: &[CartLine]) -> Self {
        lines.iter().fold(Self::default(), |mut acc, line| {
            let qty = Decimal::from(line.quantity);
            acc.item_count += i64::from(line.quantity);
            acc.subtotal += line.line_total;
            acc.savings += (line.original_price - line.unit_price).max(Decimal::ZERO) * qty;
            acc
        })
    }
}

/// The cart as shown to the customer.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub summary: CartSummary,
}

impl CartView {
    #[must_use]
    pub fn from_items(items: &[CartItem], media: &MediaResolver) -> Self {
        let lines: Vec<CartLine> = items
            .iter()
            .filter_map(|item| match &item.product {
                Some(product) => Some(CartLine::new(item, product, media)),
                None => {
                    // Product deleted or hidden since the line was added.
                    tracing::warn!(product_id = %item.product_id, "Skipping cart line without product");
                    None
                }
            })
            .collect();
        let summary = CartSummary::from_lines(&lines);
        Self { lines, summary }
    }
}

/// Cart operations for one signed-in user.
pub struct CartService<'a> {
    backend: &'a BackendClient,
    media: &'a MediaResolver,
    user: UserId,
    access_token: &'a str,
}

impl<'a> CartService<'a> {
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

    /// A product shoppers may buy. Unapproved products are not found.
    async fn product(&self, id: ProductId) -> Result<Product, ServiceError> {
        self.backend
            .get_product(id, self.bearer())
            .await?
            .filter(|product| product.is_approved)
            .ok_or(ServiceError::NotFound("product"))
    }

    /// The current cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn view(&self) -> Result<CartView, ServiceError> {
        let items = self.backend.cart_items(self.user, self.bearer()).await?;
        Ok(CartView::from_items(&items, self.media))
    }

    /// Add `quantity` units of a product, incrementing an existing line.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for non-positive quantities, `NotFound` for unknown
    /// or unapproved products and `OutOfStock` when the line would exceed stock.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn add(&self, product_id: ProductId, quantity: i32) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::validation("quantity must be at least 1"));
        }
        let product = self.product(product_id).await?;
        let existing = self
            .backend
            .cart_item(self.user, product_id, self.bearer())
            .await?;

        let wanted = existing
            .as_ref()
            .map_or(0, |line| line.quantity)
            .saturating_add(quantity);
        check_stock(&product, wanted)?;

        match existing {
            Some(line) => {
                self.backend
                    .set_cart_quantity(line.id, wanted, self.bearer())
                    .await?;
            }
            None => {
                let item = NewCartItem {
                    user_id: self.user,
                    product_id,
                    quantity,
                    price_at_add: product.effective_price(),
                };
                self.backend.insert_cart_item(&item, self.bearer()).await?;
            }
        }
        tracing::info!(product_id = %product_id, quantity = wanted, "Cart line updated");
        self.view().await
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product is not in the cart and `OutOfStock`
    /// when the quantity exceeds stock.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn set_quantity(
        &self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::validation("quantity cannot be negative"));
        }
        if quantity == 0 {
            return self.remove(product_id).await;
        }

        let line = self
            .backend
            .cart_item(self.user, product_id, self.bearer())
            .await?
            .ok_or(ServiceError::NotFound("cart item"))?;
        let product = self.product(product_id).await?;
        check_stock(&product, quantity)?;

        self.backend
            .set_cart_quantity(line.id, quantity, self.bearer())
            .await?;
        self.view().await
    }

    /// Remove a product from the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn remove(&self, product_id: ProductId) -> Result<CartView, ServiceError> {
        self.backend
            .delete_cart_item(self.user, product_id, self.bearer())
            .await?;
        self.view().await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn clear(&self) -> Result<(), ServiceError> {
        self.backend.clear_cart(self.user, self.bearer()).await?;
        Ok(())
    }
}

/// Reject quantities above what is in stock.
///
/// # Errors
///
/// Returns `OutOfStock` naming the product and its available quantity.
pub fn check_stock(product: &Product, wanted: i32) -> Result<(), ServiceError> {
    if wanted > product.stock_quantity {
        return Err(ServiceError::OutOfStock {
            product: product.name.clone(),
            available: product.stock_quantity.max(0),
        });
    }
    Ok(())
}
