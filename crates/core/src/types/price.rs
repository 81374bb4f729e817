//! Price arithmetic using decimal amounts.
//!
//! Products carry an original price and an optional discounted price. All
//! money math (cart totals, tax, dashboard revenue) stays in [`Decimal`] and is
//! only converted to integer minor units at the payment-gateway boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Original and discounted price for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// List price.
    pub original_price: Decimal,
    /// Sale price, if the product is discounted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<Decimal>,
}

impl Pricing {
    /// Create a pricing pair.
    #[must_use]
    pub const fn new(original_price: Decimal, discount_price: Option<Decimal>) -> Self {
        Self {
            original_price,
            discount_price,
        }
    }

    /// The price a customer pays.
    ///
    /// A discount price only applies when it is positive and not above the
    /// original price.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        match self.discount_price {
            Some(dp) if dp > Decimal::ZERO && dp <= self.original_price => dp,
            _ => self.original_price,
        }
    }

    /// Whether a valid discount applies.
    #[must_use]
    pub fn is_discounted(&self) -> bool {
        self.effective_price() < self.original_price
    }

    /// Per-unit savings against the original price.
    #[must_use]
    pub fn savings(&self) -> Decimal {
        self.original_price - self.effective_price()
    }

    /// Whole-number discount percentage shown on product cards.
    #[must_use]
    pub fn discount_percentage(&self) -> u32 {
        discount_percentage(self.original_price, self.effective_price())
    }
}

/// `round((1 - discount / original) * 100)`, never negative.
///
/// Halves round away from zero. Returns 0 when `original` is not positive or
/// the discount price is above the original.
#[must_use]
pub fn discount_percentage(original: Decimal, discount: Decimal) -> u32 {
    if original <= Decimal::ZERO || discount >= original {
        return 0;
    }
    let pct = (Decimal::ONE - discount / original) * Decimal::ONE_HUNDRED;
    pct.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .max(Decimal::ZERO)
        .to_u32()
        .unwrap_or(0)
}

/// Convert an amount to integer minor units (paise, cents).
///
/// Returns `None` for amounts that do not fit in `i64`.
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// ISO 4217 currency codes accepted by the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    INR,
    USD,
    EUR,
    GBP,
}

impl CurrencyCode {
    /// The three-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::INR => "INR",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INR" => Ok(Self::INR),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_discount_percentage_formula() {
        assert_eq!(discount_percentage(dec("200"), dec("150")), 25);
        assert_eq!(discount_percentage(dec("300"), dec("199")), 34);
        assert_eq!(discount_percentage(dec("100"), dec("100")), 0);
    }

    #[test]
    fn test_discount_percentage_rounds_half_up() {
        // 1 - 87.5/100 = 12.5%
        assert_eq!(discount_percentage(dec("100"), dec("87.5")), 13);
    }

    #[test]
    fn test_discount_percentage_never_negative() {
        assert_eq!(discount_percentage(dec("100"), dec("120")), 0);
        assert_eq!(discount_percentage(dec("0"), dec("0")), 0);
    }

    #[test]
    fn test_effective_price_ignores_invalid_discount() {
        let above = Pricing::new(dec("100"), Some(dec("110")));
        assert_eq!(above.effective_price(), dec("100"));
        assert!(!above.is_discounted());

        let zero = Pricing::new(dec("100"), Some(dec("0")));
        assert_eq!(zero.effective_price(), dec("100"));

        let sale = Pricing::new(dec("100"), Some(dec("80")));
        assert_eq!(sale.effective_price(), dec("80"));
        assert_eq!(sale.savings(), dec("20"));
        assert_eq!(sale.discount_percentage(), 20);
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(dec("499.99")), Some(49_999));
        assert_eq!(to_minor_units(dec("0.005")), Some(1));
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("inr".parse::<CurrencyCode>(), Ok(CurrencyCode::INR));
        assert!("XYZ".parse::<CurrencyCode>().is_err());
    }
}
