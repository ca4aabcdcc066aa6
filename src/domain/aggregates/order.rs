//! Order Aggregate
//!
//! Owns the fulfillment lifecycle:
//!
//! ```text
//! NEW -> AWAITING_ALLOC -> DISPATCHED | ASSIGNED_TO_LOGISTICS -> PICKED_UP -> DELIVERING -> DELIVERED
//! ```
//!
//! with `RETURNED`, `CANCELED` and `ON_HOLD` reachable from any non-terminal state.
//! A held order remembers where it was held from and resumes only there.
//! Which role may move an order along an edge is part of the edge itself, see
//! [`OrderStatus::mover`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::access::{Identity, Role};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    New,
    AwaitingAlloc,
    Dispatched,
    AssignedToLogistics,
    PickedUp,
    Delivering,
    Delivered,
    Returned,
    Canceled,
    OnHold,
}

text_enum!(OrderStatus {
    New => "NEW",
    AwaitingAlloc => "AWAITING_ALLOC",
    Dispatched => "DISPATCHED",
    AssignedToLogistics => "ASSIGNED_TO_LOGISTICS",
    PickedUp => "PICKED_UP",
    Delivering => "DELIVERING",
    Delivered => "DELIVERED",
    Returned => "RETURNED",
    Canceled => "CANCELED",
    OnHold => "ON_HOLD",
});

/// Who may move an order along a given edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mover {
    AdminOnly,
    /// The assigned logistics user, or an admin.
    AssigneeOrAdmin,
}

impl OrderStatus {
    /// Statuses in which an order still expects stock from its warehouse.
    pub const PENDING: [OrderStatus; 4] = [Self::New, Self::AwaitingAlloc, Self::Dispatched, Self::AssignedToLogistics];

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Returned | Self::Canceled) }

    pub fn is_pending(&self) -> bool { Self::PENDING.contains(self) }

    fn is_dispatch(&self) -> bool { matches!(self, Self::Dispatched | Self::AssignedToLogistics) }

    /// Transition table. `None` means the edge does not exist. Resuming from
    /// ON_HOLD depends on the order's history and is decided by [`Order::mover`].
    pub fn mover(self, to: OrderStatus) -> Option<Mover> {
        use OrderStatus::*;
        if self.is_terminal() || self == to { return None; }
        match (self, to) {
            (New, AwaitingAlloc) => Some(Mover::AdminOnly),
            (AwaitingAlloc, t) if t.is_dispatch() => Some(Mover::AdminOnly),
            (f, PickedUp) if f.is_dispatch() => Some(Mover::AssigneeOrAdmin),
            (PickedUp, Delivering) | (Delivering, Delivered) => Some(Mover::AssigneeOrAdmin),
            (_, Returned | Canceled) => Some(Mover::AssigneeOrAdmin),
            (_, OnHold) => Some(Mover::AdminOnly),
            _ => None,
        }
    }
}

/// Order fields subject to role whitelisting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderField {
    CustomerName,
    CustomerAddress,
    CustomerPhone,
    ExternalOrderId,
    Status,
    AssignedLogisticsId,
    FulfillmentWarehouseId,
    TotalAmount,
    OrderDate,
}

impl OrderField {
    pub const ALL: &'static [OrderField] = &[
        Self::CustomerName,
        Self::CustomerAddress,
        Self::CustomerPhone,
        Self::ExternalOrderId,
        Self::Status,
        Self::AssignedLogisticsId,
        Self::FulfillmentWarehouseId,
        Self::TotalAmount,
        Self::OrderDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerName => "customerName",
            Self::CustomerAddress => "customerAddress",
            Self::CustomerPhone => "customerPhone",
            Self::ExternalOrderId => "externalOrderId",
            Self::Status => "status",
            Self::AssignedLogisticsId => "assignedLogisticsId",
            Self::FulfillmentWarehouseId => "fulfillmentWarehouseId",
            Self::TotalAmount => "totalAmount",
            Self::OrderDate => "orderDate",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub external_order_id: Option<String>,
    pub status: OrderStatus,
    pub customer_name: String,
    pub customer_address: String,
    pub customer_phone: Option<String>,
    pub total_amount: Money,
    pub order_date: DateTime<Utc>,
    pub assigned_logistics_id: Option<Uuid>,
    pub fulfillment_warehouse_id: Option<Uuid>,
    pub merchant_id: Uuid,
    pub updated_at: DateTime<Utc>,
    /// Status the order was in when it was put ON_HOLD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held_from: Option<OrderStatus>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub unit_price: Option<Money>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Option<Money>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(default)]
    pub external_order_id: Option<String>,
    pub customer_name: String,
    pub customer_address: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub total_amount: Option<Money>,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merchant_id: Option<Uuid>,
    pub items: Vec<NewOrderItem>,
}

/// Largest quantity a single order line may carry.
pub const MAX_ITEM_QUANTITY: i64 = u32::MAX as i64;

impl NewOrder {
    /// Field-level problems, one message each. Empty means valid.
    pub fn problems(&self) -> Vec<String> {
        let mut out = vec![];
        if self.customer_name.trim().is_empty() { out.push("customerName is required".to_string()); }
        if self.customer_address.trim().is_empty() { out.push("customerAddress is required".to_string()); }
        if self.items.is_empty() { out.push("order must contain at least one item".to_string()); }
        if let Some(total) = self.total_amount {
            if total.is_negative() { out.push("totalAmount cannot be negative".to_string()); }
        }
        for (i, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 { out.push(format!("items[{i}]: quantity must be greater than 0")); }
            if item.quantity > MAX_ITEM_QUANTITY { out.push(format!("items[{i}]: quantity cannot exceed {MAX_ITEM_QUANTITY}")); }
            if let Some(price) = item.unit_price {
                if price.amount() <= rust_decimal::Decimal::ZERO { out.push(format!("items[{i}]: price must be greater than 0")); }
            }
        }
        out
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_order_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Partial update. `None` leaves a field alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub customer_phone: Option<String>,
    pub external_order_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub assigned_logistics_id: Option<Uuid>,
    pub fulfillment_warehouse_id: Option<Uuid>,
    pub total_amount: Option<Money>,
    pub order_date: Option<DateTime<Utc>>,
}

impl OrderPatch {
    pub fn touched_fields(&self) -> Vec<OrderField> {
        let mut out = vec![];
        if self.customer_name.is_some() { out.push(OrderField::CustomerName); }
        if self.customer_address.is_some() { out.push(OrderField::CustomerAddress); }
        if self.customer_phone.is_some() { out.push(OrderField::CustomerPhone); }
        if self.external_order_id.is_some() { out.push(OrderField::ExternalOrderId); }
        if self.status.is_some() { out.push(OrderField::Status); }
        if self.assigned_logistics_id.is_some() { out.push(OrderField::AssignedLogisticsId); }
        if self.fulfillment_warehouse_id.is_some() { out.push(OrderField::FulfillmentWarehouseId); }
        if self.total_amount.is_some() { out.push(OrderField::TotalAmount); }
        if self.order_date.is_some() { out.push(OrderField::OrderDate); }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl Order {
    pub fn create(new: &NewOrder, merchant_id: Uuid) -> (Self, Vec<OrderItem>) {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let items: Vec<OrderItem> = new.items.iter().map(|i| OrderItem {
            id: Uuid::now_v7(),
            order_id: id,
            product_id: i.product_id,
            quantity: i.quantity,
            unit_price: i.unit_price,
        }).collect();
        let total_amount = new.total_amount.unwrap_or_else(|| {
            items.iter().fold(Money::zero(), |acc, i| match (i.unit_price, u32::try_from(i.quantity)) {
                (Some(p), Ok(qty)) => acc.add(p.multiply(qty)),
                _ => acc,
            })
        });
        let mut order = Self {
            id,
            external_order_id: new.external_id().map(str::to_string),
            status: OrderStatus::New,
            customer_name: new.customer_name.trim().to_string(),
            customer_address: new.customer_address.trim().to_string(),
            customer_phone: new.customer_phone.clone(),
            total_amount,
            order_date: new.order_date.unwrap_or(now),
            assigned_logistics_id: None,
            fulfillment_warehouse_id: None,
            merchant_id,
            updated_at: now,
            held_from: None,
            events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: id, merchant_id, items: items.len() }));
        (order, items)
    }

    /// Moves the order along an edge of the transition table on behalf of `actor`.
    pub fn transition(&mut self, actor: &Identity, to: OrderStatus) -> Result<StatusChange, OrderError> {
        let resuming = self.status == OrderStatus::OnHold && self.held_from == Some(to);
        if to.is_dispatch() && !resuming { return Err(OrderError::RequiresAssignment); }
        self.check_edge(actor, to)?;
        Ok(self.set_status(actor.user_id, to))
    }

    /// Hands an order awaiting allocation to a logistics user. Admin only.
    pub fn assign_logistics(&mut self, actor: &Identity, logistics_id: Uuid, as_status: OrderStatus) -> Result<StatusChange, OrderError> {
        if !as_status.is_dispatch() { return Err(OrderError::Invalid(format!("{as_status} is not a dispatch status"))); }
        if self.status != OrderStatus::AwaitingAlloc { return Err(OrderError::NotAwaitingAllocation(self.status)); }
        self.check_edge(actor, as_status)?;
        self.assigned_logistics_id = Some(logistics_id);
        self.raise_event(DomainEvent::Order(OrderEvent::LogisticsAssigned { order_id: self.id, logistics_id, actor: actor.user_id }));
        Ok(self.set_status(actor.user_id, as_status))
    }

    /// Points the order at a warehouse; a NEW order becomes AWAITING_ALLOC.
    pub fn assign_warehouse(&mut self, actor: &Identity, warehouse_id: Uuid) -> Result<Option<StatusChange>, OrderError> {
        if self.status == OrderStatus::Delivered { return Err(OrderError::Finalized); }
        let previous = self.fulfillment_warehouse_id.replace(warehouse_id);
        self.raise_event(DomainEvent::Order(OrderEvent::WarehouseAssigned { order_id: self.id, previous, warehouse_id, actor: actor.user_id }));
        if self.status == OrderStatus::New {
            return Ok(Some(self.set_status(actor.user_id, OrderStatus::AwaitingAlloc)));
        }
        self.touch();
        Ok(None)
    }

    /// Applies the non-lifecycle fields of a patch. Lifecycle fields are ignored here.
    pub fn apply_details(&mut self, patch: &OrderPatch, actor: Uuid) -> Result<Vec<OrderField>, OrderError> {
        let mut changed = vec![];
        if let Some(v) = &patch.customer_name {
            if v.trim().is_empty() { return Err(OrderError::Invalid("customerName is required".into())); }
            self.customer_name = v.trim().to_string();
            changed.push(OrderField::CustomerName);
        }
        if let Some(v) = &patch.customer_address {
            if v.trim().is_empty() { return Err(OrderError::Invalid("customerAddress is required".into())); }
            self.customer_address = v.trim().to_string();
            changed.push(OrderField::CustomerAddress);
        }
        if let Some(v) = &patch.customer_phone {
            self.customer_phone = Some(v.clone()).filter(|p| !p.trim().is_empty());
            changed.push(OrderField::CustomerPhone);
        }
        if let Some(v) = &patch.external_order_id {
            self.external_order_id = Some(v.trim().to_string()).filter(|s| !s.is_empty());
            changed.push(OrderField::ExternalOrderId);
        }
        if let Some(v) = patch.total_amount {
            if v.is_negative() { return Err(OrderError::Invalid("totalAmount cannot be negative".into())); }
            self.total_amount = v;
            changed.push(OrderField::TotalAmount);
        }
        if let Some(v) = patch.order_date {
            self.order_date = v;
            changed.push(OrderField::OrderDate);
        }
        if !changed.is_empty() {
            self.raise_event(DomainEvent::Order(OrderEvent::DetailsUpdated {
                order_id: self.id,
                fields: changed.iter().map(|f| f.as_str()).collect(),
                actor,
            }));
            self.touch();
        }
        Ok(changed)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    /// The table edge from the current status, plus the resume edge back to `held_from`.
    pub fn mover(&self, to: OrderStatus) -> Option<Mover> {
        match self.held_from {
            Some(from) if self.status == OrderStatus::OnHold && from == to => Some(Mover::AdminOnly),
            _ => self.status.mover(to),
        }
    }

    fn check_edge(&self, actor: &Identity, to: OrderStatus) -> Result<(), OrderError> {
        let mover = self.mover(to).ok_or(OrderError::IllegalTransition { from: self.status, to })?;
        match (mover, actor.role) {
            (_, Role::Admin) => Ok(()),
            (Mover::AssigneeOrAdmin, Role::Logistics) if self.assigned_logistics_id == Some(actor.user_id) => Ok(()),
            (Mover::AssigneeOrAdmin, Role::Logistics) => Err(OrderError::NotPermitted("only the assigned logistics user may update this order".into())),
            _ => Err(OrderError::NotPermitted(format!("{} may not move an order from {} to {}", actor.role, self.status, to))),
        }
    }

    fn set_status(&mut self, actor: Uuid, to: OrderStatus) -> StatusChange {
        let change = StatusChange { from: self.status, to };
        self.held_from = (to == OrderStatus::OnHold).then_some(change.from);
        self.status = to;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from: change.from, to, actor }));
        change
    }

    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Cannot move order from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    #[error("Permission denied: {0}")]
    NotPermitted(String),
    #[error("Only orders in AWAITING_ALLOC can be assigned (order is {0})")]
    NotAwaitingAllocation(OrderStatus),
    #[error("Dispatch requires assigning a logistics user")]
    RequiresAssignment,
    #[error("Delivered orders cannot be changed")]
    Finalized,
    #[error("{0}")]
    Invalid(String),
}
