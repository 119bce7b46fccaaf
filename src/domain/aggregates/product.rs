//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::value_objects::{display_stock, SizeCode};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub category: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub id: i64,
    pub product_id: i64,
    pub size: SizeCode,
    pub stock: i32,
    pub price_adjustment: Decimal,
    pub is_default: bool,
}

/// Row returned by the variation JSON endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VariationStock {
    pub id: i64,
    pub size: String,
    pub stock: i32,
}

/// Product with its variations, as listed on the inventory screen.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: Product,
    pub total_stock: i32,
    /// e.g. `"S: 4, M: 10, L: 0"`
    pub variations: String,
}

impl ProductListing {
    pub fn new(product: Product, mut variations: Vec<Variation>) -> Self {
        variations.sort_by(|a, b| a.size.cmp(&b.size));
        let total_stock = variations.iter().map(|v| display_stock(v.stock)).sum();
        Self { product, total_stock, variations: format_variations(&variations) }
    }
}

/// Renders variations as `"SIZE: stock"` pairs, clamping negative stock to zero.
pub fn format_variations(variations: &[Variation]) -> String {
    variations
        .iter()
        .map(|v| format!("{}: {}", v.size, display_stock(v.stock)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Products must carry exactly one default (`M`) variation.
pub fn check_default_variation(variations: &[Variation]) -> Result<(), ProductError> {
    match variations.iter().filter(|v| v.is_default).count() {
        1 => Ok(()),
        0 => Err(ProductError::MissingDefaultVariation),
        _ => Err(ProductError::MultipleDefaultVariations),
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ProductDraft {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub category: Option<String>,
    pub image: Option<String>,
    /// Stock for the default variation created with the product.
    #[serde(default)]
    pub initial_stock: i32,
}

impl ProductDraft {
    pub fn check(&self) -> Result<(), ProductError> {
        self.validate().map_err(|e| ProductError::Invalid(e.to_string()))?;
        if self.base_price.is_sign_negative() { return Err(ProductError::NegativePrice); }
        if self.initial_stock < 0 { return Err(ProductError::NegativeStock); }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct VariationDraft {
    #[validate(length(min = 1, max = 10))]
    pub size: String,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub price_adjustment: Decimal,
}

impl VariationDraft {
    pub fn size_code(&self) -> Result<SizeCode, ProductError> {
        self.validate().map_err(|e| ProductError::Invalid(e.to_string()))?;
        if self.stock < 0 { return Err(ProductError::NegativeStock); }
        SizeCode::new(self.size.clone()).map_err(|e| ProductError::Invalid(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub enum ProductError {
    Invalid(String),
    NegativePrice,
    NegativeStock,
    MissingDefaultVariation,
    MultipleDefaultVariations,
}
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "{msg}"),
            Self::NegativePrice => write!(f, "Price cannot be negative"),
            Self::NegativeStock => write!(f, "Stock cannot be negative"),
            Self::MissingDefaultVariation => write!(f, "Missing default variation"),
            Self::MultipleDefaultVariations => write!(f, "More than one default variation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn variation(id: i64, size: &str, stock: i32) -> Variation {
        Variation {
            id,
            product_id: 1,
            size: SizeCode::new(size).unwrap(),
            stock,
            price_adjustment: Decimal::ZERO,
            is_default: size == "M",
        }
    }

    #[test]
    fn test_listing_orders_sizes_and_clamps_stock() {
        let product = Product {
            id: 1,
            name: "Tee".into(),
            description: None,
            base_price: dec!(350),
            category: None,
            image: None,
            created_at: Utc::now(),
        };
        let variations = vec![variation(3, "L", -2), variation(1, "S", 4), variation(2, "M", 10)];
        let listing = ProductListing::new(product, variations);
        assert_eq!(listing.variations, "S: 4, M: 10, L: 0");
        assert_eq!(listing.total_stock, 14);
    }

    #[test]
    fn test_default_variation_check() {
        assert!(check_default_variation(&[variation(1, "S", 1), variation(2, "M", 1)]).is_ok());
        let missing = check_default_variation(&[variation(1, "S", 1)]);
        assert!(matches!(missing, Err(ProductError::MissingDefaultVariation)));
        let doubled = check_default_variation(&[variation(1, "M", 1), variation(2, "M", 3)]);
        assert!(matches!(doubled, Err(ProductError::MultipleDefaultVariations)));
    }

    #[test]
    fn test_draft_checks() {
        let draft = ProductDraft {
            name: "".into(),
            description: None,
            base_price: dec!(10),
            category: None,
            image: None,
            initial_stock: 0,
        };
        assert!(matches!(draft.check(), Err(ProductError::Invalid(_))));
        let draft = ProductDraft {
            name: "Hoodie".into(),
            description: None,
            base_price: dec!(-1),
            category: None,
            image: None,
            initial_stock: 0,
        };
        assert!(matches!(draft.check(), Err(ProductError::NegativePrice)));
    }
}
