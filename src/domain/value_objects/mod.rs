//! Value Objects for fulfillment

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object. Always trimmed and upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub const MAX_LEN: usize = 50;

    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Sku::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU must not be empty")]
    Empty,
    #[error("SKU must be at most {} characters", Sku::MAX_LEN)]
    TooLong,
}

/// Warehouse code such as `LAG001` or the reserved `DEFAULT`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseCode(String);

impl WarehouseCode {
    pub const DEFAULT: &'static str = "DEFAULT";

    pub fn new(value: impl Into<String>) -> Self { Self(value.into().trim().to_uppercase()) }
    pub fn default_code() -> Self { Self(Self::DEFAULT.to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for WarehouseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Parcel dimensions. Missing dimensions default to a near-zero placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub const PLACEHOLDER: f64 = 0.01;

    pub fn new(length: f64, width: f64, height: f64) -> Result<Self, DimensionsError> {
        for (name, v) in [("length", length), ("width", width), ("height", height)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(DimensionsError::NonPositive(name));
            }
        }
        Ok(Self { length, width, height })
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self { length: Self::PLACEHOLDER, width: Self::PLACEHOLDER, height: Self::PLACEHOLDER }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DimensionsError {
    #[error("dimension {0} must be greater than 0")]
    NonPositive(&'static str),
}

/// Money in the single base unit the back-office stores. Conversion lives with reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn add(&self, other: Money) -> Money { Money(self.0 + other.0) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_sku() { let sku = Sku::new("  prod-001 ").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }
    #[test]
    fn test_sku_rejects_blank() { assert_eq!(Sku::new("   "), Err(SkuError::Empty)); }
    #[test]
    fn test_dimensions() {
        assert!(Dimensions::new(1.0, 2.0, 3.0).is_ok());
        assert_eq!(Dimensions::new(1.0, 0.0, 3.0), Err(DimensionsError::NonPositive("width")));
        assert_eq!(Dimensions::default().height, Dimensions::PLACEHOLDER);
    }
    #[test]
    fn test_money_add() {
        let a = Money::new(Decimal::new(100, 0));
        let b = Money::new(Decimal::new(50, 0));
        assert_eq!(a.add(b).amount(), Decimal::new(150, 0));
        assert_eq!(b.multiply(3).amount(), Decimal::new(150, 0));
    }
}
