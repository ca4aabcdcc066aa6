//! Stock allocation: how much of a product sits in a warehouse and how much of it is held back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAllocation {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub allocated_quantity: i64,
    pub safety_stock: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockAllocation {
    /// Sellable units: allocated minus safety stock, floored at zero.
    pub fn available(&self) -> i64 { (self.allocated_quantity - self.safety_stock).max(0) }

    /// Low when what can be sold no longer exceeds the reserve.
    pub fn is_low_stock(&self) -> bool { self.available() <= self.safety_stock }
}

/// Unchecked quantities as they arrive from a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationInput {
    pub allocated_quantity: i64,
    #[serde(default)]
    pub safety_stock: i64,
}

/// Quantities that passed [`AllocationInput::validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckedQuantities {
    allocated_quantity: i64,
    safety_stock: i64,
}

impl AllocationInput {
    pub fn new(allocated_quantity: i64, safety_stock: i64) -> Self { Self { allocated_quantity, safety_stock } }

    /// The single gate for both creating and updating an allocation.
    pub fn validate(self) -> Result<CheckedQuantities, AllocationError> {
        if self.allocated_quantity < 0 { return Err(AllocationError::NegativeAllocated); }
        if self.safety_stock < 0 { return Err(AllocationError::NegativeSafetyStock); }
        if self.safety_stock > self.allocated_quantity { return Err(AllocationError::SafetyExceedsAllocated); }
        Ok(CheckedQuantities { allocated_quantity: self.allocated_quantity, safety_stock: self.safety_stock })
    }
}

impl CheckedQuantities {
    pub fn into_allocation(self, product_id: Uuid, warehouse_id: Uuid) -> StockAllocation {
        StockAllocation {
            product_id,
            warehouse_id,
            allocated_quantity: self.allocated_quantity,
            safety_stock: self.safety_stock,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Allocated quantity cannot be negative")]
    NegativeAllocated,
    #[error("Safety stock cannot be negative")]
    NegativeSafetyStock,
    #[error("Safety stock cannot exceed allocated quantity")]
    SafetyExceedsAllocated,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(allocated: i64, safety: i64) -> StockAllocation {
        StockAllocation {
            product_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            allocated_quantity: allocated,
            safety_stock: safety,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_available_never_negative() {
        for (a, s) in [(10, 3), (3, 10), (0, 0), (5, 5), (0, 7)] {
            let row = alloc(a, s);
            assert_eq!(row.available(), (a - s).max(0));
            assert!(row.available() >= 0);
        }
    }

    #[test]
    fn test_low_stock_threshold() {
        assert!(!alloc(10, 2).is_low_stock());
        assert!(alloc(10, 5).is_low_stock());
        assert!(alloc(4, 4).is_low_stock());
        assert!(!alloc(1, 0).is_low_stock());
    }

    #[test]
    fn test_validate() {
        assert_eq!(AllocationInput::new(10, 15).validate(), Err(AllocationError::SafetyExceedsAllocated));
        assert_eq!(AllocationInput::new(-1, 0).validate(), Err(AllocationError::NegativeAllocated));
        assert_eq!(AllocationInput::new(5, -1).validate(), Err(AllocationError::NegativeSafetyStock));
        let ok = AllocationInput::new(10, 10).validate().unwrap().into_allocation(Uuid::nil(), Uuid::nil());
        assert_eq!(ok.available(), 0);
    }
}
