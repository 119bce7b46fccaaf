//! Value Objects for the back-office

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Garment size code of a product variation (`S`, `M`, `XL`, ...)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SizeCode(String);

/// Sizes in the order the admin screens list them. Unknown codes sort after these.
const SIZE_ORDER: &[&str] = &["XS", "S", "M", "L", "XL", "XXL", "XXXL"];

impl SizeCode {
    pub const DEFAULT: &'static str = "M";

    pub fn new(value: impl Into<String>) -> Result<Self, SizeCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SizeCodeError::Empty); }
        if value.len() > 10 { return Err(SizeCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn is_default(&self) -> bool { self.0 == Self::DEFAULT }

    fn rank(&self) -> usize {
        SIZE_ORDER.iter().position(|s| *s == self.0).unwrap_or(SIZE_ORDER.len())
    }
}

impl Ord for SizeCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for SizeCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl fmt::Display for SizeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for SizeCode {
    type Error = SizeCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<SizeCode> for String {
    fn from(value: SizeCode) -> Self { value.0 }
}

#[derive(Debug, Clone)] pub enum SizeCodeError { Empty, TooLong }
impl std::error::Error for SizeCodeError {}
impl fmt::Display for SizeCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "size code empty"),
            Self::TooLong => write!(f, "size code too long"),
        }
    }
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub const DEFAULT_CURRENCY: &'static str = "PHP";

    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self { amount, currency: currency.to_string() }
    }
    pub fn php(amount: Decimal) -> Self { Self::new(amount, Self::DEFAULT_CURRENCY) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}

/// Signed stock adjustment applied as `stock = stock + delta`.
///
/// No floor is applied: a large negative delta can leave stock below zero,
/// which the inventory screens read as a backorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta(i32);

impl StockDelta {
    pub fn new(value: i32) -> Self { Self(value) }
    pub fn value(&self) -> i32 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

/// Stock as shown on admin screens: negative counts display as zero.
pub fn display_stock(stock: i32) -> i32 { stock.max(0) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_code() {
        let size = SizeCode::new(" xl ").unwrap();
        assert_eq!(size.as_str(), "XL");
    }

    #[test]
    fn test_size_ordering() {
        let mut sizes: Vec<SizeCode> =
            ["XL", "S", "FREE", "M", "XS"].iter().map(|s| SizeCode::new(*s).unwrap()).collect();
        sizes.sort();
        let names: Vec<&str> = sizes.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["XS", "S", "M", "XL", "FREE"]);
    }

    #[test]
    fn test_money_display_pads_cents() {
        assert_eq!(Money::php(Decimal::new(14995, 1)).to_string(), "PHP 1499.50");
        assert_eq!(Money::new(Decimal::ONE, "USD").to_string(), "USD 1.00");
    }

    #[test]
    fn test_stock_display_clamps_negative() {
        assert!(StockDelta::new(0).is_zero());
        assert_eq!(StockDelta::new(-8).value(), -8);
        assert_eq!(display_stock(-3), 0);
        assert_eq!(display_stock(7), 7);
    }
}
