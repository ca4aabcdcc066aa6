//! SKU and warehouse-code generation.
//!
//! SKUs look like `SKU-WE_01`: the first and last letters of the product name
//! followed by a two-digit counter. Warehouse codes look like `LAG001`: the
//! first three letters of the region and a three-digit counter. Both take the
//! lowest counter not already in use. Nothing is locked here; the store's
//! unique constraints catch concurrent winners and callers retry.

use std::collections::HashSet;

use crate::domain::value_objects::{Sku, WarehouseCode};
use crate::store::Store;
use crate::{FulfillmentError, Result};

pub const SKU_COUNTER_MAX: u32 = 99;
pub const WAREHOUSE_COUNTER_MAX: u32 = 999;

fn upper(c: char) -> String { c.to_uppercase().collect() }

/// `SKU-{first}{last}_` for a product name. Names without letters use `X`.
pub fn sku_prefix(name: &str) -> String {
    let mut letters = name.chars().filter(|c| c.is_alphabetic());
    let first = letters.next();
    let last = letters.last().or(first);
    let first = first.map(upper).unwrap_or_else(|| "X".into());
    let last = last.map(upper).unwrap_or_else(|| "X".into());
    format!("SKU-{first}{last}_")
}

/// Lowest free SKU for `name`, skipping anything in `taken`.
pub fn first_free_sku(name: &str, taken: &HashSet<String>) -> Result<Sku> {
    let prefix = sku_prefix(name);
    (1..=SKU_COUNTER_MAX)
        .map(|n| format!("{prefix}{n:02}"))
        .find(|candidate| !taken.contains(candidate))
        .map(Sku::new)
        .transpose()?
        .ok_or_else(|| FulfillmentError::Generation(format!("No free SKU left for prefix {prefix}")))
}

/// Looks up used SKUs for the name's prefix, adds `reserved`, and picks the lowest free one.
pub async fn next_sku(store: &dyn Store, name: &str, reserved: &HashSet<String>) -> Result<Sku> {
    let mut taken = store.skus_with_prefix(&sku_prefix(name)).await?;
    taken.extend(reserved.iter().cloned());
    first_free_sku(name, &taken)
}

/// First three letters of the region, upper-cased. Regions without letters use `WHS`.
pub fn region_prefix(region: &str) -> String {
    let prefix: String = region.chars().filter(|c| c.is_ascii_alphabetic()).take(3).collect::<String>().to_ascii_uppercase();
    if prefix.is_empty() { "WHS".to_string() } else { prefix }
}

pub fn first_free_code(region: &str, taken: &HashSet<String>) -> Result<WarehouseCode> {
    let prefix = region_prefix(region);
    (1..=WAREHOUSE_COUNTER_MAX)
        .map(|n| format!("{prefix}{n:03}"))
        .find(|candidate| !taken.contains(candidate))
        .map(WarehouseCode::new)
        .ok_or_else(|| FulfillmentError::Generation(format!("No free warehouse code left for region {region}")))
}

pub async fn next_warehouse_code(store: &dyn Store, region: &str) -> Result<WarehouseCode> {
    let taken = store.warehouse_codes_with_prefix(&region_prefix(region)).await?;
    first_free_code(region, &taken)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> { items.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn test_sku_from_name() {
        assert_eq!(first_free_sku("Wireless Mouse", &HashSet::new()).unwrap().as_str(), "SKU-WE_01");
        let taken = set(&["SKU-WE_01"]);
        assert_eq!(first_free_sku("Wireless Earbuds", &taken).unwrap().as_str(), "SKU-WS_01");
        assert_eq!(first_free_sku("Wireless Headphone", &taken).unwrap().as_str(), "SKU-WE_02");
    }

    #[test]
    fn test_sku_prefix_edge_cases() {
        assert_eq!(sku_prefix("a"), "SKU-AA_");
        assert_eq!(sku_prefix("Cable 2m!"), "SKU-CM_");
        assert_eq!(sku_prefix("1234"), "SKU-XX_");
    }

    #[test]
    fn test_sku_exhaustion() {
        let taken: HashSet<String> = (1..=99).map(|n| format!("SKU-WE_{n:02}")).collect();
        let err = first_free_sku("Wireless Mouse", &taken).unwrap_err();
        assert_eq!(err.kind(), "generation");
    }

    #[test]
    fn test_warehouse_code() {
        assert_eq!(first_free_code("Lagos", &HashSet::new()).unwrap().as_str(), "LAG001");
        assert_eq!(first_free_code("lagos", &set(&["LAG001", "LAG002"])).unwrap().as_str(), "LAG003");
        assert_eq!(first_free_code("NY", &HashSet::new()).unwrap().as_str(), "NY001");
        assert_eq!(first_free_code("", &HashSet::new()).unwrap().as_str(), "WHS001");
    }
}
