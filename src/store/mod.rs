//! Persistence seam.
//!
//! Every multi-step mutation the core needs is a single [`Store`] method so
//! that each adapter can run it atomically: [`postgres::PgStore`] inside one
//! transaction, [`memory::InMemoryStore`] under one lock. Adapters enforce the
//! unique constraints listed in [`constraint`] and report violations as
//! [`StoreError::UniqueViolation`], which callers treat as "someone else got
//! there first, re-fetch".

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::access::UserAccount;
use crate::audit::AuditEntry;
use crate::domain::aggregates::{Order, OrderItem, Product, Shipment, StockAllocation, Warehouse, WarehouseStatus};
use crate::domain::value_objects::Sku;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Unique constraint names shared by both adapters and the migrations.
pub mod constraint {
    pub const PRODUCT_SKU: &str = "products_sku_key";
    pub const WAREHOUSE_CODE: &str = "warehouses_code_key";
    pub const ORDER_EXTERNAL_ID: &str = "orders_merchant_external_key";
    pub const STOCK_ALLOCATION: &str = "stock_allocations_pkey";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("record not found")]
    NotFound,
    /// Open orders, or stock the caller asked to keep, still point at the warehouse.
    #[error("warehouse in use: {open_orders} open orders, {allocations} allocations")]
    WarehouseInUse { open_orders: i64, allocations: i64 },
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn violates(&self, name: &str) -> bool {
        matches!(self, Self::UniqueViolation(c) if c == name)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// What happens to a warehouse's allocations when it is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockDisposal {
    /// Refuses if any allocation remains.
    Keep,
    /// Merge every allocation into the same product's allocation at another warehouse.
    MigrateTo(Uuid),
    /// Drop them.
    Purge,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationFilter {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- users ---------------------------------------------------------------
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>>;

    // -- products ------------------------------------------------------------
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn find_product_by_sku(&self, sku: &Sku) -> StoreResult<Option<Product>>;
    /// Every stored SKU starting with `prefix`.
    async fn skus_with_prefix(&self, prefix: &str) -> StoreResult<HashSet<String>>;
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn update_product(&self, product: &Product) -> StoreResult<()>;
    /// Updates the product and, when `stock` is given, replaces its allocations, all or nothing.
    async fn update_product_with_stock(&self, product: &Product, stock: Option<&[StockAllocation]>) -> StoreResult<()>;
    async fn product_in_orders(&self, product_id: Uuid) -> StoreResult<bool>;
    /// Removes the product and its allocations.
    async fn delete_product(&self, product_id: Uuid) -> StoreResult<()>;

    // -- warehouses ----------------------------------------------------------
    async fn get_warehouse(&self, id: Uuid) -> StoreResult<Option<Warehouse>>;
    async fn find_warehouse_by_code(&self, code: &str) -> StoreResult<Option<Warehouse>>;
    /// Case-insensitive name match among ACTIVE warehouses.
    async fn find_active_warehouse_by_name(&self, name: &str) -> StoreResult<Option<Warehouse>>;
    async fn warehouse_codes_with_prefix(&self, prefix: &str) -> StoreResult<HashSet<String>>;
    async fn insert_warehouse(&self, warehouse: &Warehouse) -> StoreResult<()>;
    async fn set_warehouse_status(&self, warehouse_id: Uuid, status: WarehouseStatus) -> StoreResult<()>;
    /// Orders in a non-terminal status whose fulfillment warehouse is `warehouse_id`.
    async fn count_open_orders_for_warehouse(&self, warehouse_id: Uuid) -> StoreResult<i64>;
    /// Refuses with [`StoreError::WarehouseInUse`] while a non-terminal order names the
    /// warehouse, or when `stock` is `Keep` and allocations remain. The check and the
    /// delete happen atomically.
    async fn delete_warehouse(&self, warehouse_id: Uuid, stock: StockDisposal) -> StoreResult<()>;

    // -- stock allocations ---------------------------------------------------
    async fn get_allocation(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<Option<StockAllocation>>;
    async fn upsert_allocation(&self, allocation: &StockAllocation) -> StoreResult<()>;
    /// Returns whether a row was removed.
    async fn delete_allocation(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<bool>;
    async fn list_allocations(&self, filter: AllocationFilter) -> StoreResult<Vec<StockAllocation>>;
    /// Deletes every allocation of `product_id` and inserts `rows` in their place.
    async fn replace_allocations(&self, product_id: Uuid, rows: &[StockAllocation]) -> StoreResult<()>;
    /// Pending orders fulfilled from `warehouse_id` that contain `product_id`.
    async fn count_pending_orders_for_stock(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<i64>;

    // -- orders --------------------------------------------------------------
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn find_order_by_external_id(&self, merchant_id: Uuid, external_id: &str) -> StoreResult<Option<Order>>;
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> StoreResult<()>;
    async fn update_order(&self, order: &Order) -> StoreResult<()>;
    /// Saves the order together with its shipment, if any.
    async fn save_order_progress(&self, order: &Order, shipment: Option<&Shipment>) -> StoreResult<()>;
    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>>;
    async fn get_shipment(&self, order_id: Uuid) -> StoreResult<Option<Shipment>>;
    /// Removes shipments, then items, then the order.
    async fn delete_order_cascade(&self, order_id: Uuid) -> StoreResult<()>;

    // -- audit ---------------------------------------------------------------
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;
}
