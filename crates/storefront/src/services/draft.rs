//! Multi-step add-product form state.
//!
//! A [`ProductDraft`] walks through basics, pricing, inventory and media. Each
//! step is validated when saved and a step can only be saved once the steps
//! before it are. The draft lives in the user's session; images uploaded
//! during the media step are stored under the draft's id until the product
//! is created.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ServiceError;
use super::products::{
    ProductInput, validate_charges, validate_measures, validate_name, validate_pricing,
    validate_stock,
};
use crate::backend::{Dimensions, Nutrient};

/// Most images a draft may carry.
pub const MAX_DRAFT_IMAGES: usize = 8;

/// Form steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DraftStep {
    #[default]
    Basics,
    Pricing,
    Inventory,
    Media,
}

impl DraftStep {
    const fn next(self) -> Self {
        match self {
            Self::Basics => Self::Pricing,
            Self::Pricing => Self::Inventory,
            Self::Inventory | Self::Media => Self::Media,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Basics => "basics",
            Self::Pricing => "pricing",
            Self::Inventory => "inventory",
            Self::Media => "media",
        }
    }
}

impl fmt::Display for DraftStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicsStep {
    pub name: String,
    pub description: String,
    pub categories: Vec<String>,
    pub nutrients: Vec<Nutrient>,
}

/// Step 2.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingStep {
    pub original_price: Decimal,
    #[serde(default)]
    pub discount_price: Option<Decimal>,
    #[serde(default)]
    pub tax_percentage: Option<Decimal>,
    #[serde(default)]
    pub shipping_charge: Option<Decimal>,
    #[serde(default)]
    pub hsn_code: Option<String>,
}

/// Step 3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStep {
    pub stock_quantity: i32,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub weight: Option<Decimal>,
    #[serde(flatten)]
    pub dimensions: Dimensions,
}

/// The add-product form in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    /// Storage namespace for images uploaded before the product exists.
    pub id: Uuid,
    /// Furthest step the user may edit.
    pub step: DraftStep,
    pub input: ProductInput,
    /// Object keys of uploaded images, primary first.
    pub images: Vec<String>,
}

impl Default for ProductDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductDraft {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            step: DraftStep::Basics,
            input: ProductInput::default(),
            images: Vec::new(),
        }
    }

    fn require_reached(&self, step: DraftStep) -> Result<(), ServiceError> {
        if step > self.step {
            return Err(ServiceError::validation(format!(
                "complete the {} step first",
                self.step
            )));
        }
        Ok(())
    }

    fn advance_past(&mut self, step: DraftStep) {
        if self.step == step {
            self.step = step.next();
        }
    }

    /// Save step 1.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a missing or over-long name.
    pub fn save_basics(&mut self, basics: BasicsStep) -> Result<(), ServiceError> {
        validate_name(&basics.name)?;
        self.input.name = basics.name;
        self.input.description = basics.description;
        self.input.categories = basics.categories;
        self.input.nutrients = basics.nutrients;
        self.advance_past(DraftStep::Basics);
        Ok(())
    }

    /// Save step 2.
    ///
    /// # Errors
    ///
    /// Returns `Validation` before basics are saved or for bad prices.
    pub fn save_pricing(&mut self, pricing: PricingStep) -> Result<(), ServiceError> {
        self.require_reached(DraftStep::Pricing)?;
        validate_pricing(pricing.original_price, pricing.discount_price)?;
        validate_charges(pricing.tax_percentage, pricing.shipping_charge)?;
        self.input.original_price = pricing.original_price;
        self.input.discount_price = pricing.discount_price;
        self.input.tax_percentage = pricing.tax_percentage;
        self.input.shipping_charge = pricing.shipping_charge;
        self.input.hsn_code = pricing.hsn_code;
        self.advance_past(DraftStep::Pricing);
        Ok(())
    }

    /// Save step 3.
    ///
    /// # Errors
    ///
    /// Returns `Validation` before pricing is saved or for negative values.
    pub fn save_inventory(&mut self, inventory: InventoryStep) -> Result<(), ServiceError> {
        self.require_reached(DraftStep::Inventory)?;
        validate_stock(inventory.stock_quantity)?;
        validate_measures(inventory.weight, inventory.dimensions)?;
        self.input.stock_quantity = inventory.stock_quantity;
        self.input.unit = inventory.unit;
        self.input.weight = inventory.weight;
        self.input.dimensions = inventory.dimensions;
        self.advance_past(DraftStep::Inventory);
        Ok(())
    }

    /// Check that another image may be attached.
    ///
    /// # Errors
    ///
    /// Returns `Validation` before the media step or when the draft is full.
    pub fn check_can_add_image(&self) -> Result<(), ServiceError> {
        self.require_reached(DraftStep::Media)?;
        if self.images.len() >= MAX_DRAFT_IMAGES {
            return Err(ServiceError::validation(format!(
                "a product can have at most {MAX_DRAFT_IMAGES} images"
            )));
        }
        Ok(())
    }

    /// Attach an uploaded image.
    ///
    /// # Errors
    ///
    /// As [`Self::check_can_add_image`].
    pub fn add_image(&mut self, key: String) -> Result<(), ServiceError> {
        self.check_can_add_image()?;
        self.images.push(key);
        Ok(())
    }

    /// Detach an image. Returns whether it was attached.
    pub fn remove_image(&mut self, key: &str) -> bool {
        let before = self.images.len();
        self.images.retain(|k| k != key);
        self.images.len() != before
    }

    /// Check every step and hand back the product fields and images.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if any step was skipped or no longer validates.
    pub fn finish(self) -> Result<(ProductInput, Vec<String>), ServiceError> {
        self.require_reached(DraftStep::Media)?;
        self.input.validate()?;
        if self.images.is_empty() {
            return Err(ServiceError::validation("add at least one image"));
        }
        Ok((self.input, self.images))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn basics() -> BasicsStep {
        BasicsStep {
            name: "Cold-pressed Coconut Oil".to_owned(),
            description: "Single-origin, unrefined.".to_owned(),
            categories: vec!["Oils".to_owned()],
            nutrients: Vec::new(),
        }
    }

    fn pricing() -> PricingStep {
        PricingStep {
            original_price: Decimal::from(320),
            discount_price: Some(Decimal::from(280)),
            ..PricingStep::default()
        }
    }

    fn inventory() -> InventoryStep {
        InventoryStep {
            stock_quantity: 40,
            unit: Some("500 ml".to_owned()),
            ..InventoryStep::default()
        }
    }

    #[test]
    fn test_steps_must_be_completed_in_order() {
        let mut draft = ProductDraft::new();
        assert!(matches!(draft.save_pricing(pricing()), Err(ServiceError::Validation(m)) if m.contains("basics")));
        assert!(draft.add_image("k".to_owned()).is_err());

        draft.save_basics(basics()).unwrap();
        assert_eq!(draft.step, DraftStep::Pricing);
        assert!(draft.save_inventory(inventory()).is_err());
        draft.save_pricing(pricing()).unwrap();
        draft.save_inventory(inventory()).unwrap();
        assert_eq!(draft.step, DraftStep::Media);
    }

    #[test]
    fn test_revisiting_earlier_step_keeps_progress() {
        let mut draft = ProductDraft::new();
        draft.save_basics(basics()).unwrap();
        draft.save_pricing(pricing()).unwrap();
        draft.save_basics(BasicsStep {
            name: "Virgin Coconut Oil".to_owned(),
            ..basics()
        })
        .unwrap();
        assert_eq!(draft.step, DraftStep::Inventory);
        assert_eq!(draft.input.name, "Virgin Coconut Oil");
    }

    #[test]
    fn test_invalid_step_is_not_saved() {
        let mut draft = ProductDraft::new();
        draft.save_basics(basics()).unwrap();
        let bad = PricingStep {
            discount_price: Some(Decimal::from(400)),
            ..pricing()
        };
        assert!(draft.save_pricing(bad).is_err());
        assert_eq!(draft.step, DraftStep::Pricing);
        assert_eq!(draft.input.original_price, Decimal::ZERO);
    }

    #[test]
    fn test_finish_requires_images() {
        let mut draft = ProductDraft::new();
        draft.save_basics(basics()).unwrap();
        draft.save_pricing(pricing()).unwrap();
        draft.save_inventory(inventory()).unwrap();
        assert!(draft.clone().finish().is_err());

        draft.add_image("c/d/1_a.png".to_owned()).unwrap();
        assert!(draft.remove_image("c/d/1_a.png"));
        assert!(!draft.remove_image("c/d/1_a.png"));
        draft.add_image("c/d/2_b.png".to_owned()).unwrap();

        let (input, images) = draft.finish().unwrap();
        assert_eq!(input.stock_quantity, 40);
        assert_eq!(images, vec!["c/d/2_b.png".to_owned()]);
    }

    #[test]
    fn test_image_limit() {
        let mut draft = ProductDraft {
            step: DraftStep::Media,
            ..ProductDraft::new()
        };
        for i in 0..MAX_DRAFT_IMAGES {
            draft.add_image(format!("k{i}")).unwrap();
        }
        assert!(draft.add_image("one-more".to_owned()).is_err());
    }

    #[test]
    fn test_draft_survives_session_serialization() {
        let mut draft = ProductDraft::new();
        draft.save_basics(basics()).unwrap();
        let json = serde_json::to_value(&draft).unwrap();
        let back: ProductDraft = serde_json::from_value(json).unwrap();
        assert_eq!(back, draft);
    }
}
