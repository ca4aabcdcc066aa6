//! Domain events
//!
//! Raised by aggregates and drained by the services, which turn them into
//! audit entries and user notifications.
use crate::domain::aggregates::OrderStatus;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Created { order_id: Uuid, merchant_id: Uuid, items: usize },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus, actor: Uuid },
    LogisticsAssigned { order_id: Uuid, logistics_id: Uuid, actor: Uuid },
    WarehouseAssigned { order_id: Uuid, previous: Option<Uuid>, warehouse_id: Uuid, actor: Uuid },
    DetailsUpdated { order_id: Uuid, fields: Vec<&'static str>, actor: Uuid },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::LogisticsAssigned { order_id, .. }
            | Self::WarehouseAssigned { order_id, .. }
            | Self::DetailsUpdated { order_id, .. } => *order_id,
        }
    }

    /// Audit action name.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created { .. } => "CREATE",
            Self::StatusChanged { .. } => "STATUS_CHANGE",
            Self::LogisticsAssigned { .. } => "ASSIGN_LOGISTICS",
            Self::WarehouseAssigned { .. } => "ASSIGN_WAREHOUSE",
            Self::DetailsUpdated { .. } => "UPDATE",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::Created { merchant_id, items, .. } => json!({ "merchantId": merchant_id, "itemCount": items }),
            Self::StatusChanged { from, to, actor, .. } => json!({ "oldStatus": from, "newStatus": to, "changedBy": actor }),
            Self::LogisticsAssigned { logistics_id, .. } => json!({ "assignedLogisticsId": logistics_id }),
            Self::WarehouseAssigned { previous, warehouse_id, .. } => json!({ "previousWarehouseId": previous, "fulfillmentWarehouseId": warehouse_id }),
            Self::DetailsUpdated { fields, .. } => json!({ "fields": fields }),
        }
    }
}
