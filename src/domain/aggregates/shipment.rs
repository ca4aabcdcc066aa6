//! Shipment Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::OrderStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub tracking_number: String,
    pub carrier: String,
    pub delivery_attempts: i32,
    pub last_status_update: DateTime<Utc>,
}

impl Shipment {
    pub fn open(order_id: Uuid, carrier: &str) -> Self {
        let id = Uuid::now_v7();
        let suffix = id.simple().to_string().to_uppercase();
        Self {
            id,
            order_id,
            tracking_number: format!("TRK-{}", &suffix[suffix.len() - 12..]),
            carrier: carrier.to_string(),
            delivery_attempts: 0,
            last_status_update: Utc::now(),
        }
    }

    /// Bookkeeping for an order entering `status`.
    pub fn track(&mut self, status: OrderStatus) {
        if status == OrderStatus::Delivering { self.delivery_attempts += 1; }
        self.last_status_update = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_attempts() {
        let mut s = Shipment::open(Uuid::new_v4(), "INTERNAL");
        assert!(s.tracking_number.starts_with("TRK-"));
        assert_eq!(s.tracking_number.len(), 16);
        s.track(OrderStatus::Delivering);
        s.track(OrderStatus::OnHold);
        s.track(OrderStatus::Delivering);
        assert_eq!(s.delivery_attempts, 2);
    }
}
