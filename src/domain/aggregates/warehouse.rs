//! Warehouse Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::WarehouseCode;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarehouseStatus { #[default] Active, Inactive, Maintenance }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarehouseKind { #[default] Storage, Fulfillment, Distribution, CrossDock }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: Uuid,
    pub name: String,
    pub code: WarehouseCode,
    pub region: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub capacity: i64,
    pub current_stock: i64,
    pub status: WarehouseStatus,
    pub kind: WarehouseKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWarehouse {
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub capacity: i64,
    #[serde(default)]
    pub kind: WarehouseKind,
}

impl Warehouse {
    pub const DEFAULT_NAME: &'static str = "Default";
    pub const DEFAULT_REGION: &'static str = "Central";

    pub fn create(code: WarehouseCode, new: &NewWarehouse) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: new.name.trim().to_string(),
            code,
            region: new.region.trim().to_string(),
            address: new.address.clone(),
            city: new.city.clone(),
            country: new.country.clone(),
            capacity: new.capacity,
            current_stock: 0,
            status: WarehouseStatus::Active,
            kind: new.kind,
            created_at: Utc::now(),
        }
    }

    /// The fallback warehouse provisioned on first unresolvable reference.
    pub fn default_warehouse() -> Self {
        let template = NewWarehouse {
            name: Self::DEFAULT_NAME.into(),
            region: Self::DEFAULT_REGION.into(),
            ..Default::default()
        };
        Self::create(WarehouseCode::default_code(), &template)
    }

    pub fn is_active(&self) -> bool { self.status == WarehouseStatus::Active }

    pub fn is_default(&self) -> bool { self.name.eq_ignore_ascii_case(Self::DEFAULT_NAME) }
}

text_enum!(WarehouseStatus { Active => "ACTIVE", Inactive => "INACTIVE", Maintenance => "MAINTENANCE" });
text_enum!(WarehouseKind { Storage => "STORAGE", Fulfillment => "FULFILLMENT", Distribution => "DISTRIBUTION", CrossDock => "CROSS_DOCK" });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_warehouse_template() {
        let w = Warehouse::default_warehouse();
        assert_eq!(w.code.as_str(), "DEFAULT");
        assert_eq!(w.region, "Central");
        assert_eq!(w.current_stock, 0);
        assert!(w.is_active() && w.is_default());
    }

    #[test]
    fn test_text_round_trip() {
        assert_eq!("CROSS_DOCK".parse::<WarehouseKind>().unwrap(), WarehouseKind::CrossDock);
        assert_eq!(WarehouseStatus::Maintenance.as_str(), "MAINTENANCE");
        assert!("closed".parse::<WarehouseStatus>().is_err());
    }
}
