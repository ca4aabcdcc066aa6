//! In-process store. One lock around all state makes every method atomic.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{constraint, AllocationFilter, StockDisposal, Store, StoreError, StoreResult};
use crate::access::UserAccount;
use crate::audit::AuditEntry;
use crate::domain::aggregates::{Order, OrderItem, Product, Shipment, StockAllocation, Warehouse, WarehouseStatus};
use crate::domain::value_objects::Sku;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserAccount>,
    products: HashMap<Uuid, Product>,
    warehouses: HashMap<Uuid, Warehouse>,
    allocations: BTreeMap<(Uuid, Uuid), StockAllocation>,
    orders: HashMap<Uuid, Order>,
    items: Vec<OrderItem>,
    shipments: HashMap<Uuid, Shipment>,
    audit: Vec<AuditEntry>,
}

impl State {
    fn has_item(&self, order_id: Uuid, product_id: Uuid) -> bool {
        self.items.iter().any(|i| i.order_id == order_id && i.product_id == product_id)
    }

    fn sku_clash(&self, product: &Product) -> bool {
        self.products.values().any(|p| p.sku == product.sku && p.id != product.id)
    }

    fn check_allocations(&self, product_id: Uuid, rows: &[StockAllocation]) -> StoreResult<()> {
        if rows.iter().any(|r| r.product_id != product_id || !self.warehouses.contains_key(&r.warehouse_id)) {
            return Err(StoreError::NotFound);
        }
        let mut seen = HashSet::new();
        if !rows.iter().all(|r| seen.insert(r.warehouse_id)) {
            return Err(StoreError::UniqueViolation(constraint::STOCK_ALLOCATION.into()));
        }
        Ok(())
    }

    fn put_allocations(&mut self, product_id: Uuid, rows: &[StockAllocation]) {
        self.allocations.retain(|(p, _), _| *p != product_id);
        for row in rows {
            self.allocations.insert((row.product_id, row.warehouse_id), row.clone());
        }
    }

    fn open_orders_at(&self, warehouse_id: Uuid) -> i64 {
        self.orders.values()
            .filter(|o| o.fulfillment_warehouse_id == Some(warehouse_id) && !o.status.is_terminal())
            .count() as i64
    }

    fn external_id_taken(&self, order: &Order) -> bool {
        let Some(ext) = order.external_order_id.as_deref() else { return false };
        self.orders.values().any(|o| {
            o.id != order.id && o.merchant_id == order.merchant_id && o.external_order_id.as_deref() == Some(ext)
        })
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn insert_user(&self, user: UserAccount) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit.clone()
    }

    pub async fn product_count(&self) -> usize { self.state.lock().await.products.len() }

    pub async fn order_count(&self) -> usize { self.state.lock().await.orders.len() }

    pub async fn warehouses(&self) -> Vec<Warehouse> {
        self.state.lock().await.warehouses.values().cloned().collect()
    }
}

fn without_events(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.events.clear();
    copy
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn find_product_by_sku(&self, sku: &Sku) -> StoreResult<Option<Product>> {
        Ok(self.state.lock().await.products.values().find(|p| &p.sku == sku).cloned())
    }

    async fn skus_with_prefix(&self, prefix: &str) -> StoreResult<HashSet<String>> {
        let state = self.state.lock().await;
        Ok(state.products.values().map(|p| p.sku.as_str()).filter(|s| s.starts_with(prefix)).map(str::to_string).collect())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::UniqueViolation(constraint::PRODUCT_SKU.into()));
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        self.update_product_with_stock(product, None).await
    }

    async fn update_product_with_stock(&self, product: &Product, stock: Option<&[StockAllocation]>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product.id) { return Err(StoreError::NotFound); }
        if state.sku_clash(product) {
            return Err(StoreError::UniqueViolation(constraint::PRODUCT_SKU.into()));
        }
        if let Some(rows) = stock { state.check_allocations(product.id, rows)?; }
        state.products.insert(product.id, product.clone());
        if let Some(rows) = stock { state.put_allocations(product.id, rows); }
        Ok(())
    }

    async fn product_in_orders(&self, product_id: Uuid) -> StoreResult<bool> {
        Ok(self.state.lock().await.items.iter().any(|i| i.product_id == product_id))
    }

    async fn delete_product(&self, product_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.products.remove(&product_id).is_none() { return Err(StoreError::NotFound); }
        state.allocations.retain(|(p, _), _| *p != product_id);
        Ok(())
    }

    async fn get_warehouse(&self, id: Uuid) -> StoreResult<Option<Warehouse>> {
        Ok(self.state.lock().await.warehouses.get(&id).cloned())
    }

    async fn find_warehouse_by_code(&self, code: &str) -> StoreResult<Option<Warehouse>> {
        Ok(self.state.lock().await.warehouses.values().find(|w| w.code.as_str() == code).cloned())
    }

    async fn find_active_warehouse_by_name(&self, name: &str) -> StoreResult<Option<Warehouse>> {
        let state = self.state.lock().await;
        let mut hits: Vec<&Warehouse> = state.warehouses.values()
            .filter(|w| w.is_active() && w.name.eq_ignore_ascii_case(name.trim()))
            .collect();
        hits.sort_by_key(|w| w.created_at);
        Ok(hits.first().map(|w| (*w).clone()))
    }

    async fn warehouse_codes_with_prefix(&self, prefix: &str) -> StoreResult<HashSet<String>> {
        let state = self.state.lock().await;
        Ok(state.warehouses.values().map(|w| w.code.as_str()).filter(|c| c.starts_with(prefix)).map(str::to_string).collect())
    }

    async fn insert_warehouse(&self, warehouse: &Warehouse) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.warehouses.values().any(|w| w.code == warehouse.code) {
            return Err(StoreError::UniqueViolation(constraint::WAREHOUSE_CODE.into()));
        }
        state.warehouses.insert(warehouse.id, warehouse.clone());
        Ok(())
    }

    async fn set_warehouse_status(&self, warehouse_id: Uuid, status: WarehouseStatus) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let w = state.warehouses.get_mut(&warehouse_id).ok_or(StoreError::NotFound)?;
        w.status = status;
        Ok(())
    }

    async fn count_open_orders_for_warehouse(&self, warehouse_id: Uuid) -> StoreResult<i64> {
        Ok(self.state.lock().await.open_orders_at(warehouse_id))
    }

    async fn delete_warehouse(&self, warehouse_id: Uuid, stock: StockDisposal) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.warehouses.contains_key(&warehouse_id) { return Err(StoreError::NotFound); }
        let moving: Vec<StockAllocation> = state.allocations.values().filter(|a| a.warehouse_id == warehouse_id).cloned().collect();
        let open_orders = state.open_orders_at(warehouse_id);
        if open_orders > 0 || (stock == StockDisposal::Keep && !moving.is_empty()) {
            return Err(StoreError::WarehouseInUse { open_orders, allocations: moving.len() as i64 });
        }
        match stock {
            StockDisposal::MigrateTo(target) => {
                if !state.warehouses.contains_key(&target) { return Err(StoreError::NotFound); }
                for row in moving {
                    state.allocations.remove(&(row.product_id, warehouse_id));
                    let merged = state.allocations.entry((row.product_id, target)).or_insert_with(|| StockAllocation {
                        warehouse_id: target,
                        allocated_quantity: 0,
                        safety_stock: 0,
                        ..row.clone()
                    });
                    merged.allocated_quantity += row.allocated_quantity;
                    merged.safety_stock += row.safety_stock;
                    merged.updated_at = row.updated_at;
                }
            }
            StockDisposal::Purge => state.allocations.retain(|_, a| a.warehouse_id != warehouse_id),
            StockDisposal::Keep => {}
        }
        state.warehouses.remove(&warehouse_id);
        Ok(())
    }

    async fn get_allocation(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<Option<StockAllocation>> {
        Ok(self.state.lock().await.allocations.get(&(product_id, warehouse_id)).cloned())
    }

    async fn upsert_allocation(&self, allocation: &StockAllocation) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&allocation.product_id) || !state.warehouses.contains_key(&allocation.warehouse_id) {
            return Err(StoreError::NotFound);
        }
        state.allocations.insert((allocation.product_id, allocation.warehouse_id), allocation.clone());
        Ok(())
    }

    async fn delete_allocation(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<bool> {
        Ok(self.state.lock().await.allocations.remove(&(product_id, warehouse_id)).is_some())
    }

    async fn list_allocations(&self, filter: AllocationFilter) -> StoreResult<Vec<StockAllocation>> {
        let state = self.state.lock().await;
        Ok(state.allocations.values()
            .filter(|a| filter.product_id.map_or(true, |p| a.product_id == p))
            .filter(|a| filter.warehouse_id.map_or(true, |w| a.warehouse_id == w))
            .cloned()
            .collect())
    }

    async fn replace_allocations(&self, product_id: Uuid, rows: &[StockAllocation]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.check_allocations(product_id, rows)?;
        state.put_allocations(product_id, rows);
        Ok(())
    }

    async fn count_pending_orders_for_stock(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state.orders.values()
            .filter(|o| o.status.is_pending() && o.fulfillment_warehouse_id == Some(warehouse_id))
            .filter(|o| state.has_item(o.id, product_id))
            .count() as i64)
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn find_order_by_external_id(&self, merchant_id: Uuid, external_id: &str) -> StoreResult<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.values()
            .find(|o| o.merchant_id == merchant_id && o.external_order_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.external_id_taken(order) {
            return Err(StoreError::UniqueViolation(constraint::ORDER_EXTERNAL_ID.into()));
        }
        if items.iter().any(|i| !state.products.contains_key(&i.product_id)) {
            return Err(StoreError::NotFound);
        }
        state.orders.insert(order.id, without_events(order));
        state.items.extend_from_slice(items);
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> StoreResult<()> {
        self.save_order_progress(order, None).await
    }

    async fn save_order_progress(&self, order: &Order, shipment: Option<&Shipment>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.orders.contains_key(&order.id) { return Err(StoreError::NotFound); }
        if state.external_id_taken(order) {
            return Err(StoreError::UniqueViolation(constraint::ORDER_EXTERNAL_ID.into()));
        }
        state.orders.insert(order.id, without_events(order));
        if let Some(s) = shipment {
            state.shipments.insert(s.order_id, s.clone());
        }
        Ok(())
    }

    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        Ok(self.state.lock().await.items.iter().filter(|i| i.order_id == order_id).cloned().collect())
    }

    async fn get_shipment(&self, order_id: Uuid) -> StoreResult<Option<Shipment>> {
        Ok(self.state.lock().await.shipments.get(&order_id).cloned())
    }

    async fn delete_order_cascade(&self, order_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.orders.contains_key(&order_id) { return Err(StoreError::NotFound); }
        state.shipments.remove(&order_id);
        state.items.retain(|i| i.order_id != order_id);
        state.orders.remove(&order_id);
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.state.lock().await.audit.push(entry.clone());
        Ok(())
    }
}
