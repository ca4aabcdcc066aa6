//! End-to-end walks through the library API against the in-memory store.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use opensase_fulfillment::access::UserAccount;
use opensase_fulfillment::domain::aggregates::{
    AllocationInput, NewOrder, NewOrderItem, NewProduct, NewWarehouse, OrderPatch, OrderStatus, StockPlacement,
};
use opensase_fulfillment::ingest::{ImportOptions, ImportSource};
use opensase_fulfillment::services::DeletePlan;
use opensase_fulfillment::store::{InMemoryStore, Store};
use opensase_fulfillment::{Fulfillment, Identity, Role};

struct Env {
    store: Arc<InMemoryStore>,
    ctx: Fulfillment,
    admin: Identity,
    merchant: Identity,
}

fn env() -> Env {
    let store = Arc::new(InMemoryStore::new());
    let ctx = Fulfillment::with_store(store.clone());
    Env {
        store,
        ctx,
        admin: Identity::admin(Uuid::new_v4()),
        merchant: Identity::new(Uuid::new_v4(), Role::Merchant, Some(Uuid::new_v4())),
    }
}

fn product(name: &str) -> NewProduct {
    NewProduct { name: name.into(), weight: 0.4, ..Default::default() }
}

fn order(ext: &str, product_id: Uuid, quantity: i64) -> NewOrder {
    NewOrder {
        external_order_id: Some(ext.into()),
        customer_name: "Ngozi".into(),
        customer_address: "12 Awolowo Road, Ikoyi".into(),
        items: vec![NewOrderItem { product_id, quantity, unit_price: None }],
        ..Default::default()
    }
}

async fn courier(store: &InMemoryStore, name: &str) -> Identity {
    let id = Uuid::new_v4();
    store.insert_user(UserAccount { id, name: name.into(), role: Role::Logistics, business_id: None }).await;
    Identity::new(id, Role::Logistics, None)
}

#[tokio::test]
async fn generated_skus_count_up_per_letter_pair() {
    let e = env();
    let mouse = e.ctx.catalog().create_product(&e.merchant, product("Wireless Mouse")).await.unwrap();
    assert_eq!(mouse.product.sku.as_str(), "SKU-WE_01");
    let headphone = e.ctx.catalog().create_product(&e.merchant, product("Wireless Headphone")).await.unwrap();
    assert_eq!(headphone.product.sku.as_str(), "SKU-WE_02");
}

#[tokio::test]
async fn safety_stock_above_allocation_is_rejected() {
    let e = env();
    let p = e.ctx.catalog().create_product(&e.merchant, product("Desk Lamp")).await.unwrap().product;
    let w = e.ctx.warehouses().resolve(&e.merchant, "DEFAULT_WAREHOUSE").await.unwrap();
    let err = e.ctx.stock().upsert_allocation(&e.merchant, p.id, w.id, AllocationInput::new(10, 15)).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert_eq!(err.to_string(), "Safety stock cannot exceed allocated quantity");
}

#[tokio::test]
async fn bulk_orders_isolate_the_bad_record() {
    let e = env();
    let p = e.ctx.catalog().create_product(&e.merchant, product("Kettle")).await.unwrap().product;
    let records = (1..=5).map(|i| order(&format!("ORD-{i}"), p.id, if i == 3 { 0 } else { 1 })).collect();
    let report = e.ctx.ingest()
        .import_orders(&e.merchant, ImportSource::Records { records }, ImportOptions::default(), None)
        .await
        .unwrap();
    assert_eq!((report.summary.created, report.summary.errors), (4, 1));
    assert_eq!(report.errors[0].record, 3);

    let business = e.merchant.business_id.unwrap();
    for i in [1, 2, 4, 5] {
        let stored = e.store.find_order_by_external_id(business, &format!("ORD-{i}")).await.unwrap();
        assert!(stored.is_some(), "ORD-{i} missing");
    }
    assert!(e.store.find_order_by_external_id(business, "ORD-3").await.unwrap().is_none());
}

#[tokio::test]
async fn only_the_assignee_delivers() {
    let e = env();
    let u1 = courier(&e.store, "Tunde").await;
    let u2 = courier(&e.store, "Kemi").await;
    let wh = e.ctx.catalog()
        .create_warehouse(&e.admin, NewWarehouse { name: "Ikeja".into(), region: "Lagos".into(), ..Default::default() })
        .await
        .unwrap();
    let p = e.ctx.catalog().create_product(&e.merchant, product("Blender")).await.unwrap().product;
    let (o, _) = e.ctx.orders().create_order(&e.merchant, order("ORD-77", p.id, 1)).await.unwrap();

    let patch = OrderPatch { fulfillment_warehouse_id: Some(wh.id), ..Default::default() };
    let o = e.ctx.orders().update_order(&e.admin, o.id, patch).await.unwrap();
    assert_eq!(o.status, OrderStatus::AwaitingAlloc);
    e.ctx.orders().assign_logistics(&e.admin, o.id, u1.user_id, None).await.unwrap();
    e.ctx.orders().transition(&u1, o.id, OrderStatus::PickedUp).await.unwrap();
    let o = e.ctx.orders().transition(&u1, o.id, OrderStatus::Delivering).await.unwrap();
    assert_eq!(o.status, OrderStatus::Delivering);

    let err = e.ctx.orders().transition(&u2, o.id, OrderStatus::Delivered).await.unwrap_err();
    assert_eq!(err.kind(), "permission");

    let o = e.ctx.orders().transition(&u1, o.id, OrderStatus::Delivered).await.unwrap();
    assert_eq!(o.status, OrderStatus::Delivered);
    let err = e.ctx.orders().transition(&e.admin, o.id, OrderStatus::Returned).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");
}

#[tokio::test]
async fn warehouse_with_stock_needs_a_plan() {
    let e = env();
    let wh = e.ctx.catalog()
        .create_warehouse(&e.admin, NewWarehouse { name: "Kano Central".into(), region: "Kano".into(), ..Default::default() })
        .await
        .unwrap();
    for name in ["Pen", "Pencil", "Eraser"] {
        let mut np = product(name);
        np.stock.push(StockPlacement { warehouse: Some(wh.id.to_string()), allocated_quantity: 8, safety_stock: 2 });
        e.ctx.catalog().create_product(&e.merchant, np).await.unwrap();
    }
    let err = e.ctx.catalog().delete_warehouse(&e.admin, wh.id, DeletePlan::default()).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert_eq!(err.details(), Some(json!({ "stockCount": 3 })));
}

#[tokio::test]
async fn default_warehouse_is_created_once() {
    let e = env();
    let first = e.ctx.warehouses().resolve(&e.merchant, "DEFAULT_WAREHOUSE").await.unwrap();
    assert_eq!(first.code.as_str(), "DEFAULT");
    let second = e.ctx.warehouses().resolve(&e.merchant, "DEFAULT_WAREHOUSE").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(e.store.warehouses().await.len(), 1);
}

#[tokio::test]
async fn merchants_never_set_status() {
    let e = env();
    let p = e.ctx.catalog().create_product(&e.merchant, product("Fan")).await.unwrap().product;
    let (o, _) = e.ctx.orders().create_order(&e.merchant, order("ORD-9", p.id, 1)).await.unwrap();
    let patch = OrderPatch { status: Some(OrderStatus::Canceled), ..Default::default() };
    let err = e.ctx.orders().update_order(&e.merchant, o.id, patch).await.unwrap_err();
    assert_eq!(err.kind(), "permission");
}

#[tokio::test]
async fn pending_orders_guard_stock_and_products() {
    let e = env();
    let mut np = product("Toaster");
    np.stock.push(StockPlacement { warehouse: None, allocated_quantity: 5, safety_stock: 0 });
    let created = e.ctx.catalog().create_product(&e.merchant, np).await.unwrap();
    let wh = created.stock[0].warehouse_id;
    let (o, _) = e.ctx.orders().create_order(&e.merchant, order("ORD-1", created.product.id, 2)).await.unwrap();
    let patch = OrderPatch { fulfillment_warehouse_id: Some(wh), ..Default::default() };
    e.ctx.orders().update_order(&e.admin, o.id, patch).await.unwrap();

    let err = e.ctx.stock().delete_allocation(&e.merchant, created.product.id, wh).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");
    let err = e.ctx.catalog().delete_product(&e.merchant, created.product.id).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");
}

#[tokio::test]
async fn held_order_resumes_only_where_it_left_off() {
    let e = env();
    let p = e.ctx.catalog().create_product(&e.merchant, product("Iron")).await.unwrap().product;
    let (o, _) = e.ctx.orders().create_order(&e.merchant, order("ORD-5", p.id, 1)).await.unwrap();
    e.ctx.orders().transition(&e.admin, o.id, OrderStatus::OnHold).await.unwrap();
    for skip in [OrderStatus::Delivering, OrderStatus::PickedUp, OrderStatus::Delivered] {
        let err = e.ctx.orders().transition(&e.admin, o.id, skip).await.unwrap_err();
        assert_eq!(err.kind(), "conflict", "{skip}");
    }
    let o = e.ctx.orders().transition(&e.admin, o.id, OrderStatus::New).await.unwrap();
    assert_eq!(o.status, OrderStatus::New);
}
