//! Order lifecycle: creation, field edits, logistics and warehouse
//! assignment, status transitions and deletion.
//!
//! The transition table itself lives on [`OrderStatus::mover`]; this module
//! loads and saves orders, checks the caller's capability and tenant, keeps
//! the shipment in step with the order, and turns the events an order raised
//! into audit entries and notifications once the change is stored.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::Fulfillment;
use crate::access::{authorize, check_order_fields, Grant, Identity, Operation, Role};
use crate::domain::aggregates::{
    NewOrder, Order, OrderItem, OrderPatch, OrderStatus, Shipment, StatusChange,
};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::notify::Notification;
use crate::store::constraint;
use crate::{FulfillmentError, Result};

const ENTITY: &str = "Order";

pub struct OrderLifecycle<'a> {
    ctx: &'a Fulfillment,
}

impl<'a> OrderLifecycle<'a> {
    pub(crate) fn new(ctx: &'a Fulfillment) -> Self { Self { ctx } }

    pub async fn get(&self, identity: &Identity, order_id: Uuid) -> Result<(Order, Vec<OrderItem>, Option<Shipment>)> {
        let grant = authorize(identity, Operation::ViewOrder)?;
        let order = self.load(&grant, order_id).await?;
        let items = self.ctx.store.order_items(order_id).await?;
        let shipment = self.ctx.store.get_shipment(order_id).await?;
        Ok((order, items, shipment))
    }

    pub async fn create_order(&self, identity: &Identity, new: NewOrder) -> Result<(Order, Vec<OrderItem>)> {
        let grant = authorize(identity, Operation::CreateOrder)?;
        let merchant_id = grant.target_business(new.merchant_id)?;
        self.place(identity, &new, merchant_id).await
    }

    /// Creates an order for `merchant_id` once the caller has been authorized for it.
    pub(crate) async fn place(&self, identity: &Identity, new: &NewOrder, merchant_id: Uuid) -> Result<(Order, Vec<OrderItem>)> {
        let (mut order, items) = self.insert(new, merchant_id).await?;
        self.publish(identity, &mut order).await;
        Ok((order, items))
    }

    /// Validates and stores a new order. Its events are left for the caller to publish or drop.
    pub(crate) async fn insert(&self, new: &NewOrder, merchant_id: Uuid) -> Result<(Order, Vec<OrderItem>)> {
        let mut problems = new.problems();
        problems.extend(self.item_problems(new, merchant_id).await?);
        if !problems.is_empty() {
            return Err(FulfillmentError::invalid_fields("Invalid order", problems));
        }
        if let Some(ext) = new.external_id() {
            if self.ctx.store.find_order_by_external_id(merchant_id, ext).await?.is_some() {
                return Err(external_id_taken(ext));
            }
        }

        let (order, items) = Order::create(new, merchant_id);
        match self.ctx.store.insert_order(&order, &items).await {
            Ok(()) => {}
            Err(e) if e.violates(constraint::ORDER_EXTERNAL_ID) => {
                return Err(external_id_taken(order.external_order_id.as_deref().unwrap_or_default()));
            }
            Err(e) => return Err(e.into()),
        }
        info!(order_id = %order.id, %merchant_id, items = items.len(), "Order created");
        Ok((order, items))
    }

    /// Problems with the products an order references: unknown, or owned by another business.
    pub(crate) async fn item_problems(&self, new: &NewOrder, merchant_id: Uuid) -> Result<Vec<String>> {
        let mut out = vec![];
        for (i, item) in new.items.iter().enumerate() {
            match self.ctx.store.get_product(item.product_id).await? {
                None => out.push(format!("items[{i}]: product {} not found", item.product_id)),
                Some(p) if p.business_id != merchant_id => {
                    out.push(format!("items[{i}]: product {} belongs to another business", p.sku))
                }
                Some(_) => {}
            }
        }
        Ok(out)
    }

    /// Applies a partial update. Field permissions are checked before the order is even loaded.
    pub async fn update_order(&self, identity: &Identity, order_id: Uuid, patch: OrderPatch) -> Result<Order> {
        let grant = authorize(identity, Operation::EditOrder)?;
        let touched = patch.touched_fields();
        if touched.is_empty() {
            return Err(FulfillmentError::validation("No fields to update"));
        }
        check_order_fields(identity.role, &touched)?;
        let mut order = self.load(&grant, order_id).await?;
        let mut shipment = None;

        if let Some(ext) = patch.external_order_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(other) = self.ctx.store.find_order_by_external_id(order.merchant_id, ext).await? {
                if other.id != order.id { return Err(external_id_taken(ext)); }
            }
        }
        order.apply_details(&patch, identity.user_id)?;

        if let Some(warehouse_id) = patch.fulfillment_warehouse_id {
            if order.fulfillment_warehouse_id != Some(warehouse_id) {
                let warehouse = self.ctx.store.get_warehouse(warehouse_id).await?
                    .ok_or_else(|| FulfillmentError::not_found("Warehouse", warehouse_id))?;
                if !warehouse.is_active() {
                    return Err(FulfillmentError::validation(format!("Warehouse {} is not active", warehouse.code)));
                }
                order.assign_warehouse(identity, warehouse_id)?;
            }
        }

        let mut status = patch.status;
        if let Some(logistics_id) = patch.assigned_logistics_id {
            if identity.role == Role::Logistics && logistics_id != identity.user_id {
                return Err(FulfillmentError::Permission("Logistics users may not assign orders to someone else".into()));
            }
            if order.assigned_logistics_id != Some(logistics_id) {
                // A dispatch status in the same patch names the step the assignment enters.
                let as_status = status.filter(|s| matches!(s, OrderStatus::Dispatched | OrderStatus::AssignedToLogistics));
                if as_status.is_some() { status = None; }
                self.assign(identity, &mut order, logistics_id, as_status).await?;
            }
        }

        if let Some(to) = status.filter(|to| *to != order.status) {
            shipment = self.advance(identity, &mut order, to).await?;
        }

        self.save(&order, shipment.as_ref()).await?;
        self.publish(identity, &mut order).await;
        Ok(order)
    }

    /// Hands an AWAITING_ALLOC order to a logistics user, entering DISPATCHED unless told otherwise.
    pub async fn assign_logistics(
        &self,
        identity: &Identity,
        order_id: Uuid,
        logistics_id: Uuid,
        as_status: Option<OrderStatus>,
    ) -> Result<Order> {
        let grant = authorize(identity, Operation::AssignLogistics)?;
        let mut order = self.load(&grant, order_id).await?;
        self.assign(identity, &mut order, logistics_id, as_status).await?;
        self.save(&order, None).await?;
        self.publish(identity, &mut order).await;
        Ok(order)
    }

    /// Moves an order along one edge of the transition table.
    pub async fn transition(&self, identity: &Identity, order_id: Uuid, to: OrderStatus) -> Result<Order> {
        let op = if to == OrderStatus::OnHold { Operation::HoldOrder } else { Operation::AdvanceDelivery };
        let grant = authorize(identity, op)?;
        let mut order = self.load(&grant, order_id).await?;
        grant.check_assignee(order.assigned_logistics_id)?;
        let shipment = self.advance(identity, &mut order, to).await?;
        self.save(&order, shipment.as_ref()).await?;
        self.publish(identity, &mut order).await;
        Ok(order)
    }

    /// Admin only; delivered orders are kept. Shipments and items go with the order.
    pub async fn delete_order(&self, identity: &Identity, order_id: Uuid) -> Result<()> {
        let grant = authorize(identity, Operation::DeleteOrder)?;
        let order = self.load(&grant, order_id).await?;
        if order.status == OrderStatus::Delivered {
            return Err(FulfillmentError::conflict("Delivered orders cannot be deleted"));
        }
        self.ctx.store.delete_order_cascade(order_id).await?;
        self.ctx.audit.record(
            ENTITY,
            order_id,
            "DELETE",
            json!({ "status": order.status, "externalOrderId": order.external_order_id, "merchantId": order.merchant_id }),
            identity.user_id,
        ).await;
        info!(%order_id, "Order deleted");
        Ok(())
    }

    async fn assign(&self, identity: &Identity, order: &mut Order, logistics_id: Uuid, as_status: Option<OrderStatus>) -> Result<StatusChange> {
        let user = self.ctx.store.get_user(logistics_id).await?
            .ok_or_else(|| FulfillmentError::not_found("User", logistics_id))?;
        if user.role != Role::Logistics {
            return Err(FulfillmentError::validation(format!("User {} is not a logistics user", user.name)));
        }
        Ok(order.assign_logistics(identity, logistics_id, as_status.unwrap_or(OrderStatus::Dispatched))?)
    }

    /// Applies the transition and returns the shipment row to store with it, if any.
    async fn advance(&self, identity: &Identity, order: &mut Order, to: OrderStatus) -> Result<Option<Shipment>> {
        let change = order.transition(identity, to)?;
        let mut shipment = self.ctx.store.get_shipment(order.id).await?;
        if shipment.is_none() && change.to == OrderStatus::PickedUp {
            shipment = Some(Shipment::open(order.id, &self.ctx.settings.shipment_carrier));
        }
        if let Some(s) = shipment.as_mut() {
            s.track(change.to);
        }
        Ok(shipment)
    }

    async fn load(&self, grant: &Grant<'_>, order_id: Uuid) -> Result<Order> {
        let order = self.ctx.store.get_order(order_id).await?
            .ok_or_else(|| FulfillmentError::not_found("Order", order_id))?;
        grant.check_tenant(order.merchant_id)?;
        Ok(order)
    }

    async fn save(&self, order: &Order, shipment: Option<&Shipment>) -> Result<()> {
        match self.ctx.store.save_order_progress(order, shipment).await {
            Err(e) if e.violates(constraint::ORDER_EXTERNAL_ID) => {
                Err(external_id_taken(order.external_order_id.as_deref().unwrap_or_default()))
            }
            other => Ok(other?),
        }
    }

    /// Drains the order's events into the audit log and the notifier.
    async fn publish(&self, identity: &Identity, order: &mut Order) {
        for event in order.take_events() {
            let DomainEvent::Order(event) = event;
            self.ctx.audit.record(ENTITY, event.order_id(), event.action(), event.details(), identity.user_id).await;
            if let Some(n) = notification_for(&event, order) {
                self.ctx.notify(n).await;
            }
        }
    }
}

fn external_id_taken(ext: &str) -> FulfillmentError {
    FulfillmentError::conflict(format!("An order with externalOrderId {ext} already exists"))
}

fn order_label(order: &Order) -> String {
    order.external_order_id.clone().unwrap_or_else(|| order.id.to_string())
}

/// Assignment notifies the new assignee; later status changes notify the
/// assignee when someone else made them.
fn notification_for(event: &OrderEvent, order: &Order) -> Option<Notification> {
    let link_url = Some(format!("/logistics/orders/{}", order.id));
    match event {
        OrderEvent::LogisticsAssigned { logistics_id, .. } => Some(Notification {
            user_id: *logistics_id,
            message: format!("Order {} has been assigned to you", order_label(order)),
            link_url,
            template_id: Some("order-assigned".into()),
            template_data: json!({ "orderId": order.id, "customerName": order.customer_name, "customerAddress": order.customer_address }),
        }),
        OrderEvent::StatusChanged { to, actor, .. }
            if !matches!(to, OrderStatus::Dispatched | OrderStatus::AssignedToLogistics) =>
        {
            let assignee = order.assigned_logistics_id.filter(|u| u != actor)?;
            Some(Notification {
                user_id: assignee,
                message: format!("Order {} is now {}", order_label(order), to),
                link_url,
                template_id: Some("order-status".into()),
                template_data: json!({ "orderId": order.id, "status": to }),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::UserAccount;
    use crate::domain::aggregates::{NewOrderItem, NewProduct, NewWarehouse, Warehouse, WarehouseStatus};
    use crate::domain::value_objects::{Sku, WarehouseCode};
    use crate::domain::aggregates::Product;
    use crate::notify::{Notifier, NotifyError};
    use crate::services::Settings;
    use crate::store::{InMemoryStore, Store};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, n: Notification) -> std::result::Result<(), NotifyError> {
            self.0.lock().unwrap().push(n);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn notify(&self, _: Notification) -> std::result::Result<(), NotifyError> {
            Err(NotifyError("broker down".into()))
        }
    }

    struct World {
        store: Arc<InMemoryStore>,
        ctx: Fulfillment,
        notes: Arc<Recorder>,
        admin: Identity,
        merchant: Identity,
        courier: Identity,
        product: Product,
        warehouse: Warehouse,
    }

    async fn logistics_user(store: &InMemoryStore, name: &str) -> Identity {
        let id = Uuid::new_v4();
        store.insert_user(UserAccount { id, name: name.into(), role: Role::Logistics, business_id: None }).await;
        Identity::new(id, Role::Logistics, None)
    }

    async fn world_with(notifier: Option<Arc<dyn Notifier>>) -> World {
        let store = Arc::new(InMemoryStore::new());
        let notes = Arc::new(Recorder::default());
        let notifier: Arc<dyn Notifier> = match notifier {
            Some(n) => n,
            None => notes.clone(),
        };
        let ctx = Fulfillment::new(
            store.clone(),
            notifier,
            Settings { bulk_batch_size: 25, shipment_carrier: "GIG".into() },
        );
        let business = Uuid::new_v4();
        let merchant = Identity::new(Uuid::new_v4(), Role::Merchant, Some(business));
        let courier = logistics_user(&store, "Tunde").await;
        let product = Product::create(Sku::new("SKU-WE_01").unwrap(), &NewProduct { name: "Wireless Mouse".into(), weight: 0.2, ..Default::default() }, business);
        store.insert_product(&product).await.unwrap();
        let warehouse = Warehouse::create(WarehouseCode::new("LAG001"), &NewWarehouse { name: "Lagos".into(), region: "Lagos".into(), ..Default::default() });
        store.insert_warehouse(&warehouse).await.unwrap();
        World { store, ctx, notes, admin: Identity::admin(Uuid::new_v4()), merchant, courier, product, warehouse }
    }

    async fn world() -> World { world_with(None).await }

    fn new_order(w: &World, ext: Option<&str>) -> NewOrder {
        NewOrder {
            external_order_id: ext.map(str::to_string),
            customer_name: "Ada Obi".into(),
            customer_address: "1 Marina, Lagos".into(),
            items: vec![NewOrderItem { product_id: w.product.id, quantity: 2, unit_price: None }],
            ..Default::default()
        }
    }

    /// Creates an order and walks it to AWAITING_ALLOC at the fixture warehouse.
    async fn awaiting(w: &World) -> Order {
        let (order, _) = w.ctx.orders().create_order(&w.merchant, new_order(w, None)).await.unwrap();
        let patch = OrderPatch { fulfillment_warehouse_id: Some(w.warehouse.id), ..Default::default() };
        w.ctx.orders().update_order(&w.admin, order.id, patch).await.unwrap()
    }

    #[tokio::test]
    async fn test_full_delivery_with_shipment() {
        let w = world().await;
        let orders = w.ctx.orders();
        let order = awaiting(&w).await;
        assert_eq!(order.status, OrderStatus::AwaitingAlloc);

        orders.assign_logistics(&w.admin, order.id, w.courier.user_id, None).await.unwrap();
        orders.transition(&w.courier, order.id, OrderStatus::PickedUp).await.unwrap();
        let shipment = w.store.get_shipment(order.id).await.unwrap().unwrap();
        assert_eq!(shipment.carrier, "GIG");
        assert_eq!(shipment.delivery_attempts, 0);

        orders.transition(&w.courier, order.id, OrderStatus::Delivering).await.unwrap();
        let done = orders.transition(&w.courier, order.id, OrderStatus::Delivered).await.unwrap();
        assert_eq!(done.status, OrderStatus::Delivered);
        assert_eq!(w.store.get_shipment(order.id).await.unwrap().unwrap().delivery_attempts, 1);

        let statuses: Vec<_> = w.store.audit_entries().await.into_iter()
            .filter(|e| e.action == "STATUS_CHANGE")
            .map(|e| e.details["newStatus"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(statuses, ["AWAITING_ALLOC", "DISPATCHED", "PICKED_UP", "DELIVERING", "DELIVERED"]);

        let err = orders.delete_order(&w.admin, order.id).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        let err = orders.transition(&w.admin, order.id, OrderStatus::Returned).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_other_courier_cannot_mark_delivered() {
        let w = world().await;
        let orders = w.ctx.orders();
        let order = awaiting(&w).await;
        orders.assign_logistics(&w.admin, order.id, w.courier.user_id, Some(OrderStatus::AssignedToLogistics)).await.unwrap();
        orders.transition(&w.courier, order.id, OrderStatus::PickedUp).await.unwrap();
        orders.transition(&w.courier, order.id, OrderStatus::Delivering).await.unwrap();

        let other = logistics_user(&w.store, "Bola").await;
        let err = orders.transition(&other, order.id, OrderStatus::Delivered).await.unwrap_err();
        assert_eq!(err.kind(), "permission");
        let stored = w.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivering);
    }

    #[tokio::test]
    async fn test_merchant_cannot_set_status() {
        let w = world().await;
        let (order, _) = w.ctx.orders().create_order(&w.merchant, new_order(&w, Some("EXT-1"))).await.unwrap();
        for status in [OrderStatus::Canceled, OrderStatus::AwaitingAlloc, OrderStatus::New] {
            let patch = OrderPatch { status: Some(status), ..Default::default() };
            let err = w.ctx.orders().update_order(&w.merchant, order.id, patch).await.unwrap_err();
            assert_eq!(err.kind(), "permission");
        }
        // Unknown order id: still a permission error, field checks come first.
        let patch = OrderPatch { status: Some(OrderStatus::Canceled), ..Default::default() };
        assert_eq!(w.ctx.orders().update_order(&w.merchant, Uuid::new_v4(), patch).await.unwrap_err().kind(), "permission");

        let patch = OrderPatch { customer_phone: Some("+2348000000000".into()), ..Default::default() };
        let updated = w.ctx.orders().update_order(&w.merchant, order.id, patch).await.unwrap();
        assert_eq!(updated.customer_phone.as_deref(), Some("+2348000000000"));
    }

    #[tokio::test]
    async fn test_external_id_is_unique_per_merchant() {
        let w = world().await;
        let orders = w.ctx.orders();
        orders.create_order(&w.merchant, new_order(&w, Some("EXT-9"))).await.unwrap();
        let err = orders.create_order(&w.merchant, new_order(&w, Some(" EXT-9 "))).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let (second, _) = orders.create_order(&w.merchant, new_order(&w, Some("EXT-10"))).await.unwrap();
        let patch = OrderPatch { external_order_id: Some("EXT-9".into()), ..Default::default() };
        assert_eq!(orders.update_order(&w.merchant, second.id, patch).await.unwrap_err().kind(), "conflict");
    }

    #[tokio::test]
    async fn test_order_items_must_belong_to_merchant() {
        let w = world().await;
        let other = Identity::new(Uuid::new_v4(), Role::Merchant, Some(Uuid::new_v4()));
        let err = w.ctx.orders().create_order(&other, new_order(&w, None)).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        let mut missing = new_order(&w, None);
        missing.items[0].product_id = Uuid::new_v4();
        let err = w.ctx.orders().create_order(&w.merchant, missing).await.unwrap_err();
        assert!(err.details().unwrap()[0].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_assignment_rules() {
        let w = world().await;
        let orders = w.ctx.orders();
        let (order, _) = orders.create_order(&w.merchant, new_order(&w, None)).await.unwrap();

        let err = orders.assign_logistics(&w.admin, order.id, w.courier.user_id, None).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let order = awaiting(&w).await;
        let err = orders.assign_logistics(&w.admin, order.id, w.merchant.user_id, None).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        let clerk = Uuid::new_v4();
        w.store.insert_user(UserAccount { id: clerk, name: "Clerk".into(), role: Role::MerchantStaff, business_id: None }).await;
        let err = orders.assign_logistics(&w.admin, order.id, clerk, None).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let patch = OrderPatch { assigned_logistics_id: Some(Uuid::new_v4()), ..Default::default() };
        let err = orders.update_order(&w.courier, order.id, patch).await.unwrap_err();
        assert_eq!(err.kind(), "permission");
        assert_eq!(orders.transition(&w.admin, order.id, OrderStatus::Dispatched).await.unwrap_err().kind(), "validation");

        let patch = OrderPatch { assigned_logistics_id: Some(w.courier.user_id), ..Default::default() };
        let assigned = orders.update_order(&w.admin, order.id, patch).await.unwrap();
        assert_eq!(assigned.status, OrderStatus::Dispatched);
        let note = w.notes.0.lock().unwrap().clone();
        assert_eq!(note.len(), 1);
        assert_eq!(note[0].user_id, w.courier.user_id);
    }

    #[tokio::test]
    async fn test_warehouse_must_be_active() {
        let w = world().await;
        let (order, _) = w.ctx.orders().create_order(&w.merchant, new_order(&w, None)).await.unwrap();
        let mut closed = Warehouse::create(WarehouseCode::new("ABU001"), &NewWarehouse { name: "Abuja".into(), region: "Abuja".into(), ..Default::default() });
        closed.status = WarehouseStatus::Inactive;
        w.store.insert_warehouse(&closed).await.unwrap();
        let patch = OrderPatch { fulfillment_warehouse_id: Some(closed.id), ..Default::default() };
        assert_eq!(w.ctx.orders().update_order(&w.courier, order.id, patch).await.unwrap_err().kind(), "validation");
        let patch = OrderPatch { fulfillment_warehouse_id: Some(Uuid::new_v4()), ..Default::default() };
        assert_eq!(w.ctx.orders().update_order(&w.courier, order.id, patch).await.unwrap_err().kind(), "not_found");
    }

    #[tokio::test]
    async fn test_hold_and_notification_failures() {
        let w = world_with(Some(Arc::new(Failing))).await;
        let orders = w.ctx.orders();
        let order = awaiting(&w).await;
        orders.assign_logistics(&w.admin, order.id, w.courier.user_id, None).await.unwrap();
        assert_eq!(orders.transition(&w.courier, order.id, OrderStatus::OnHold).await.unwrap_err().kind(), "permission");
        let held = orders.transition(&w.admin, order.id, OrderStatus::OnHold).await.unwrap();
        assert_eq!(held.status, OrderStatus::OnHold);
        let resumed = orders.transition(&w.admin, order.id, OrderStatus::Dispatched).await.unwrap();
        assert_eq!(resumed.status, OrderStatus::Dispatched);
    }

    #[tokio::test]
    async fn test_held_new_order_cannot_jump_to_delivery() {
        let w = world().await;
        let orders = w.ctx.orders();
        let (order, _) = orders.create_order(&w.merchant, new_order(&w, None)).await.unwrap();
        orders.transition(&w.admin, order.id, OrderStatus::OnHold).await.unwrap();
        let stored = w.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.held_from, Some(OrderStatus::New));

        let err = orders.transition(&w.admin, order.id, OrderStatus::Delivering).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        let resumed = orders.transition(&w.admin, order.id, OrderStatus::New).await.unwrap();
        assert_eq!((resumed.status, resumed.held_from), (OrderStatus::New, None));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let w = world().await;
        let orders = w.ctx.orders();
        let (order, _) = orders.create_order(&w.merchant, new_order(&w, None)).await.unwrap();
        assert_eq!(orders.delete_order(&w.merchant, order.id).await.unwrap_err().kind(), "permission");
        orders.delete_order(&w.admin, order.id).await.unwrap();
        assert_eq!(w.store.order_count().await, 0);
        assert!(w.store.order_items(order.id).await.unwrap().is_empty());
        assert!(w.store.audit_entries().await.iter().any(|e| e.action == "DELETE"));
    }
}
