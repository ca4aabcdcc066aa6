//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Dimensions, Sku};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: Sku,
    pub weight: f64,
    pub dimensions: Dimensions,
    pub business_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a new product's initial stock goes. `warehouse` is any reference the resolver accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPlacement {
    #[serde(default)]
    pub warehouse: Option<String>,
    pub allocated_quantity: i64,
    #[serde(default)]
    pub safety_stock: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub weight: f64,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub business_id: Option<Uuid>,
    #[serde(default)]
    pub stock: Vec<StockPlacement>,
}

impl NewProduct {
    /// Field-level problems, one message each. Empty means valid.
    pub fn problems(&self) -> Vec<String> {
        let mut out = vec![];
        if self.name.trim().is_empty() { out.push("name is required".to_string()); }
        if !self.weight.is_finite() || self.weight <= 0.0 { out.push("weight must be greater than 0".to_string()); }
        if let Some(d) = &self.dimensions {
            if let Err(e) = Dimensions::new(d.length, d.width, d.height) { out.push(e.to_string()); }
        }
        if let Some(sku) = &self.sku {
            if let Err(e) = Sku::new(sku.as_str()) { out.push(e.to_string()); }
        }
        for (i, p) in self.stock.iter().enumerate() {
            let input = super::AllocationInput::new(p.allocated_quantity, p.safety_stock);
            if let Err(e) = input.validate() { out.push(format!("stock[{i}]: {e}")); }
        }
        out
    }

    /// Explicit SKU, normalised, if one was supplied and is non-blank.
    pub fn explicit_sku(&self) -> Option<Sku> {
        self.sku.as_deref().filter(|s| !s.trim().is_empty()).and_then(|s| Sku::new(s).ok())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub weight: Option<f64>,
    pub dimensions: Option<Dimensions>,
}

impl Product {
    pub fn create(sku: Sku, new: &NewProduct, business_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: new.name.trim().to_string(),
            sku,
            weight: new.weight,
            dimensions: new.dimensions.unwrap_or_default(),
            business_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: &ProductPatch) -> Result<(), String> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() { return Err("name is required".into()); }
            self.name = name.trim().to_string();
        }
        if let Some(w) = patch.weight {
            if !w.is_finite() || w <= 0.0 { return Err("weight must be greater than 0".into()); }
            self.weight = w;
        }
        if let Some(d) = patch.dimensions {
            self.dimensions = Dimensions::new(d.length, d.width, d.height).map_err(|e| e.to_string())?;
        }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product(name: &str, weight: f64) -> NewProduct {
        NewProduct { name: name.into(), weight, ..Default::default() }
    }

    #[test]
    fn test_product_create() {
        let p = Product::create(Sku::new("test-001").unwrap(), &new_product(" Test Product ", 1.5), Uuid::new_v4());
        assert_eq!(p.name, "Test Product");
        assert_eq!(p.sku.as_str(), "TEST-001");
        assert_eq!(p.dimensions, Dimensions::default());
    }

    #[test]
    fn test_problems_collects_every_field() {
        let mut np = new_product("", 0.0);
        np.stock.push(StockPlacement { warehouse: None, allocated_quantity: 5, safety_stock: 9 });
        let problems = np.problems();
        assert_eq!(problems.len(), 3, "{problems:?}");
        assert!(problems[2].starts_with("stock[0]"));
    }

    #[test]
    fn test_patch_rejects_bad_weight() {
        let mut p = Product::create(Sku::new("A").unwrap(), &new_product("A", 1.0), Uuid::new_v4());
        assert!(p.apply(&ProductPatch { weight: Some(-1.0), ..Default::default() }).is_err());
        p.apply(&ProductPatch { name: Some("B".into()), ..Default::default() }).unwrap();
        assert_eq!(p.name, "B");
    }
}
