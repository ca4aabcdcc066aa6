//! Postgres adapter over `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashSet;
use uuid::Uuid;

use super::{AllocationFilter, StockDisposal, Store, StoreError, StoreResult};
use crate::access::{Role, UserAccount};
use crate::audit::AuditEntry;
use crate::domain::aggregates::{
    Order, OrderItem, OrderStatus, Product, Shipment, StockAllocation, Warehouse, WarehouseKind, WarehouseStatus,
};
use crate::domain::value_objects::{Dimensions, Money, Sku, WarehouseCode};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.constraint().unwrap_or("unknown").to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreError::NotFound,
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

fn decode<T, E: std::fmt::Display>(r: Result<T, E>) -> StoreResult<T> {
    r.map_err(|e| StoreError::Backend(format!("corrupt row: {e}")))
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow { id: Uuid, name: String, role: String, business_id: Option<Uuid> }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, sku: String, weight: f64, length: f64, width: f64, height: f64,
    business_id: Uuid, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct WarehouseRow {
    id: Uuid, name: String, code: String, region: String, address: Option<String>, city: Option<String>,
    country: Option<String>, capacity: i64, current_stock: i64, status: String, kind: String, created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AllocationRow { product_id: Uuid, warehouse_id: Uuid, allocated_quantity: i64, safety_stock: i64, updated_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, external_order_id: Option<String>, status: String, customer_name: String, customer_address: String,
    customer_phone: Option<String>, total_amount: Decimal, order_date: DateTime<Utc>, assigned_logistics_id: Option<Uuid>,
    fulfillment_warehouse_id: Option<Uuid>, merchant_id: Uuid, updated_at: DateTime<Utc>, held_from: Option<String>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow { id: Uuid, order_id: Uuid, product_id: Uuid, quantity: i64, unit_price: Option<Decimal> }

#[derive(sqlx::FromRow)]
struct ShipmentRow { id: Uuid, order_id: Uuid, tracking_number: String, carrier: String, delivery_attempts: i32, last_status_update: DateTime<Utc> }

impl TryFrom<UserRow> for UserAccount {
    type Error = StoreError;
    fn try_from(r: UserRow) -> StoreResult<Self> {
        Ok(UserAccount { id: r.id, name: r.name, role: decode(r.role.parse::<Role>())?, business_id: r.business_id })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> StoreResult<Self> {
        Ok(Product {
            id: r.id,
            name: r.name,
            sku: decode(Sku::new(r.sku))?,
            weight: r.weight,
            dimensions: Dimensions { length: r.length, width: r.width, height: r.height },
            business_id: r.business_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

impl TryFrom<WarehouseRow> for Warehouse {
    type Error = StoreError;
    fn try_from(r: WarehouseRow) -> StoreResult<Self> {
        Ok(Warehouse {
            id: r.id, name: r.name, code: WarehouseCode::new(r.code), region: r.region, address: r.address,
            city: r.city, country: r.country, capacity: r.capacity, current_stock: r.current_stock,
            status: decode(r.status.parse::<WarehouseStatus>())?, kind: decode(r.kind.parse::<WarehouseKind>())?, created_at: r.created_at,
        })
    }
}

impl From<AllocationRow> for StockAllocation {
    fn from(r: AllocationRow) -> Self {
        StockAllocation { product_id: r.product_id, warehouse_id: r.warehouse_id, allocated_quantity: r.allocated_quantity, safety_stock: r.safety_stock, updated_at: r.updated_at }
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> StoreResult<Self> {
        Ok(Order {
            id: r.id, external_order_id: r.external_order_id, status: decode(r.status.parse::<OrderStatus>())?,
            customer_name: r.customer_name, customer_address: r.customer_address, customer_phone: r.customer_phone,
            total_amount: Money::new(r.total_amount), order_date: r.order_date, assigned_logistics_id: r.assigned_logistics_id,
            fulfillment_warehouse_id: r.fulfillment_warehouse_id, merchant_id: r.merchant_id, updated_at: r.updated_at,
            held_from: decode(r.held_from.map(|s| s.parse::<OrderStatus>()).transpose())?,
            events: vec![],
        })
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        OrderItem { id: r.id, order_id: r.order_id, product_id: r.product_id, quantity: r.quantity, unit_price: r.unit_price.map(Money::new) }
    }
}

impl From<ShipmentRow> for Shipment {
    fn from(r: ShipmentRow) -> Self {
        Shipment { id: r.id, order_id: r.order_id, tracking_number: r.tracking_number, carrier: r.carrier, delivery_attempts: r.delivery_attempts, last_status_update: r.last_status_update }
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

const PENDING_STATUSES: &str = "('NEW', 'AWAITING_ALLOC', 'DISPATCHED', 'ASSIGNED_TO_LOGISTICS')";
const TERMINAL_STATUSES: &str = "('DELIVERED', 'RETURNED', 'CANCELED')";

impl PgStore {
    pub fn new(db: PgPool) -> Self { Self { db } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let db = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self::new(db))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.db).await
    }

    async fn write_allocations(tx: &mut sqlx::PgConnection, product_id: Uuid, rows: &[StockAllocation]) -> StoreResult<()> {
        sqlx::query("DELETE FROM stock_allocations WHERE product_id = $1").bind(product_id).execute(&mut *tx).await?;
        for a in rows {
            sqlx::query("INSERT INTO stock_allocations (product_id, warehouse_id, allocated_quantity, safety_stock, updated_at) VALUES ($1, $2, $3, $4, $5)")
                .bind(a.product_id).bind(a.warehouse_id).bind(a.allocated_quantity).bind(a.safety_stock).bind(a.updated_at)
                .execute(&mut *tx).await?;
        }
        Ok(())
    }

    async fn write_order(tx: &mut sqlx::PgConnection, o: &Order, insert: bool) -> StoreResult<()> {
        let sql = if insert {
            "INSERT INTO orders (id, external_order_id, status, customer_name, customer_address, customer_phone, total_amount, order_date, assigned_logistics_id, fulfillment_warehouse_id, merchant_id, updated_at, held_from) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        } else {
            "UPDATE orders SET external_order_id = $2, status = $3, customer_name = $4, customer_address = $5, customer_phone = $6, total_amount = $7, order_date = $8, assigned_logistics_id = $9, fulfillment_warehouse_id = $10, merchant_id = $11, updated_at = $12, held_from = $13 WHERE id = $1"
        };
        let done = sqlx::query(sql)
            .bind(o.id).bind(&o.external_order_id).bind(o.status.as_str()).bind(&o.customer_name).bind(&o.customer_address)
            .bind(&o.customer_phone).bind(o.total_amount.amount()).bind(o.order_date).bind(o.assigned_logistics_id)
            .bind(o.fulfillment_warehouse_id).bind(o.merchant_id).bind(o.updated_at).bind(o.held_from.map(|s| s.as_str()))
            .execute(&mut *tx).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, name, role, business_id FROM users WHERE id = $1")
            .bind(id).fetch_optional(&self.db).await?;
        row.map(UserAccount::try_from).transpose()
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.db).await?;
        row.map(Product::try_from).transpose()
    }

    async fn find_product_by_sku(&self, sku: &Sku) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE sku = $1").bind(sku.as_str()).fetch_optional(&self.db).await?;
        row.map(Product::try_from).transpose()
    }

    async fn skus_with_prefix(&self, prefix: &str) -> StoreResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT sku FROM products WHERE starts_with(sku, $1)")
            .bind(prefix).fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn insert_product(&self, p: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO products (id, name, sku, weight, length, width, height, business_id, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(p.id).bind(&p.name).bind(p.sku.as_str()).bind(p.weight).bind(p.dimensions.length).bind(p.dimensions.width)
            .bind(p.dimensions.height).bind(p.business_id).bind(p.created_at).bind(p.updated_at)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> StoreResult<()> {
        let done = sqlx::query("UPDATE products SET name = $2, sku = $3, weight = $4, length = $5, width = $6, height = $7, updated_at = $8 WHERE id = $1")
            .bind(p.id).bind(&p.name).bind(p.sku.as_str()).bind(p.weight).bind(p.dimensions.length).bind(p.dimensions.width)
            .bind(p.dimensions.height).bind(p.updated_at)
            .execute(&self.db).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }

    async fn update_product_with_stock(&self, p: &Product, stock: Option<&[StockAllocation]>) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        let done = sqlx::query("UPDATE products SET name = $2, sku = $3, weight = $4, length = $5, width = $6, height = $7, updated_at = $8 WHERE id = $1")
            .bind(p.id).bind(&p.name).bind(p.sku.as_str()).bind(p.weight).bind(p.dimensions.length).bind(p.dimensions.width)
            .bind(p.dimensions.height).bind(p.updated_at)
            .execute(&mut *tx).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        if let Some(rows) = stock {
            Self::write_allocations(&mut *tx, p.id, rows).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn product_in_orders(&self, product_id: Uuid) -> StoreResult<bool> {
        let (found,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)")
            .bind(product_id).fetch_one(&self.db).await?;
        Ok(found)
    }

    async fn delete_product(&self, product_id: Uuid) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM stock_allocations WHERE product_id = $1").bind(product_id).execute(&mut *tx).await?;
        let done = sqlx::query("DELETE FROM products WHERE id = $1").bind(product_id).execute(&mut *tx).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        tx.commit().await?;
        Ok(())
    }

    async fn get_warehouse(&self, id: Uuid) -> StoreResult<Option<Warehouse>> {
        let row = sqlx::query_as::<_, WarehouseRow>("SELECT * FROM warehouses WHERE id = $1").bind(id).fetch_optional(&self.db).await?;
        row.map(Warehouse::try_from).transpose()
    }

    async fn find_warehouse_by_code(&self, code: &str) -> StoreResult<Option<Warehouse>> {
        let row = sqlx::query_as::<_, WarehouseRow>("SELECT * FROM warehouses WHERE code = $1").bind(code).fetch_optional(&self.db).await?;
        row.map(Warehouse::try_from).transpose()
    }

    async fn find_active_warehouse_by_name(&self, name: &str) -> StoreResult<Option<Warehouse>> {
        let row = sqlx::query_as::<_, WarehouseRow>(
            "SELECT * FROM warehouses WHERE lower(name) = lower($1) AND status = 'ACTIVE' ORDER BY created_at LIMIT 1",
        ).bind(name.trim()).fetch_optional(&self.db).await?;
        row.map(Warehouse::try_from).transpose()
    }

    async fn warehouse_codes_with_prefix(&self, prefix: &str) -> StoreResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT code FROM warehouses WHERE starts_with(code, $1)")
            .bind(prefix).fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    async fn insert_warehouse(&self, w: &Warehouse) -> StoreResult<()> {
        sqlx::query("INSERT INTO warehouses (id, name, code, region, address, city, country, capacity, current_stock, status, kind, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(w.id).bind(&w.name).bind(w.code.as_str()).bind(&w.region).bind(&w.address).bind(&w.city).bind(&w.country)
            .bind(w.capacity).bind(w.current_stock).bind(w.status.as_str()).bind(w.kind.as_str()).bind(w.created_at)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn set_warehouse_status(&self, warehouse_id: Uuid, status: WarehouseStatus) -> StoreResult<()> {
        let done = sqlx::query("UPDATE warehouses SET status = $2 WHERE id = $1")
            .bind(warehouse_id).bind(status.as_str()).execute(&self.db).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }

    async fn count_open_orders_for_warehouse(&self, warehouse_id: Uuid) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM orders WHERE fulfillment_warehouse_id = $1 AND status NOT IN {TERMINAL_STATUSES}");
        let (n,): (i64,) = sqlx::query_as(&sql).bind(warehouse_id).fetch_one(&self.db).await?;
        Ok(n)
    }

    async fn delete_warehouse(&self, warehouse_id: Uuid, stock: StockDisposal) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        // Row lock blocks concurrent inserts that reference the warehouse until we are done.
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM warehouses WHERE id = $1 FOR UPDATE")
            .bind(warehouse_id).fetch_optional(&mut *tx).await?;
        if locked.is_none() { return Err(StoreError::NotFound); }
        let usage = format!(
            "SELECT (SELECT COUNT(*) FROM orders WHERE fulfillment_warehouse_id = $1 AND status NOT IN {TERMINAL_STATUSES}), \
                    (SELECT COUNT(*) FROM stock_allocations WHERE warehouse_id = $1)"
        );
        let (open_orders, allocations): (i64, i64) = sqlx::query_as(&usage).bind(warehouse_id).fetch_one(&mut *tx).await?;
        if open_orders > 0 || (stock == StockDisposal::Keep && allocations > 0) {
            return Err(StoreError::WarehouseInUse { open_orders, allocations });
        }
        match stock {
            StockDisposal::Keep => {}
            StockDisposal::MigrateTo(target) => {
                sqlx::query(
                    "INSERT INTO stock_allocations (product_id, warehouse_id, allocated_quantity, safety_stock, updated_at) \
                     SELECT product_id, $2, allocated_quantity, safety_stock, NOW() FROM stock_allocations WHERE warehouse_id = $1 \
                     ON CONFLICT (product_id, warehouse_id) DO UPDATE SET \
                       allocated_quantity = stock_allocations.allocated_quantity + EXCLUDED.allocated_quantity, \
                       safety_stock = stock_allocations.safety_stock + EXCLUDED.safety_stock, updated_at = NOW()",
                ).bind(warehouse_id).bind(target).execute(&mut *tx).await?;
                sqlx::query("DELETE FROM stock_allocations WHERE warehouse_id = $1").bind(warehouse_id).execute(&mut *tx).await?;
            }
            StockDisposal::Purge => {
                sqlx::query("DELETE FROM stock_allocations WHERE warehouse_id = $1").bind(warehouse_id).execute(&mut *tx).await?;
            }
        }
        let done = sqlx::query("DELETE FROM warehouses WHERE id = $1").bind(warehouse_id).execute(&mut *tx).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        tx.commit().await?;
        Ok(())
    }

    async fn get_allocation(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<Option<StockAllocation>> {
        let row = sqlx::query_as::<_, AllocationRow>("SELECT * FROM stock_allocations WHERE product_id = $1 AND warehouse_id = $2")
            .bind(product_id).bind(warehouse_id).fetch_optional(&self.db).await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_allocation(&self, a: &StockAllocation) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO stock_allocations (product_id, warehouse_id, allocated_quantity, safety_stock, updated_at) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (product_id, warehouse_id) DO UPDATE SET allocated_quantity = EXCLUDED.allocated_quantity, safety_stock = EXCLUDED.safety_stock, updated_at = EXCLUDED.updated_at",
        ).bind(a.product_id).bind(a.warehouse_id).bind(a.allocated_quantity).bind(a.safety_stock).bind(a.updated_at)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn delete_allocation(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM stock_allocations WHERE product_id = $1 AND warehouse_id = $2")
            .bind(product_id).bind(warehouse_id).execute(&self.db).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list_allocations(&self, filter: AllocationFilter) -> StoreResult<Vec<StockAllocation>> {
        let rows = sqlx::query_as::<_, AllocationRow>(
            "SELECT * FROM stock_allocations WHERE ($1::uuid IS NULL OR product_id = $1) AND ($2::uuid IS NULL OR warehouse_id = $2) ORDER BY product_id, warehouse_id",
        ).bind(filter.product_id).bind(filter.warehouse_id).fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn replace_allocations(&self, product_id: Uuid, rows: &[StockAllocation]) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        Self::write_allocations(&mut *tx, product_id, rows).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn count_pending_orders_for_stock(&self, product_id: Uuid, warehouse_id: Uuid) -> StoreResult<i64> {
        let sql = format!(
            "SELECT COUNT(DISTINCT o.id) FROM orders o JOIN order_items i ON i.order_id = o.id \
             WHERE i.product_id = $1 AND o.fulfillment_warehouse_id = $2 AND o.status IN {PENDING_STATUSES}"
        );
        let (n,): (i64,) = sqlx::query_as(&sql).bind(product_id).bind(warehouse_id).fetch_one(&self.db).await?;
        Ok(n)
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.db).await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_order_by_external_id(&self, merchant_id: Uuid, external_id: &str) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE merchant_id = $1 AND external_order_id = $2")
            .bind(merchant_id).bind(external_id).fetch_optional(&self.db).await?;
        row.map(Order::try_from).transpose()
    }

    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        Self::write_order(&mut *tx, order, true).await?;
        for i in items {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, quantity, unit_price) VALUES ($1, $2, $3, $4, $5)")
                .bind(i.id).bind(i.order_id).bind(i.product_id).bind(i.quantity).bind(i.unit_price.map(|p| p.amount()))
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> StoreResult<()> {
        let mut conn = self.db.acquire().await?;
        Self::write_order(&mut *conn, order, false).await
    }

    async fn save_order_progress(&self, order: &Order, shipment: Option<&Shipment>) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        Self::write_order(&mut *tx, order, false).await?;
        if let Some(s) = shipment {
            sqlx::query(
                "INSERT INTO shipments (id, order_id, tracking_number, carrier, delivery_attempts, last_status_update) VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (order_id) DO UPDATE SET delivery_attempts = EXCLUDED.delivery_attempts, last_status_update = EXCLUDED.last_status_update",
            ).bind(s.id).bind(s.order_id).bind(&s.tracking_number).bind(&s.carrier).bind(s.delivery_attempts).bind(s.last_status_update)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(order_id).fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_shipment(&self, order_id: Uuid) -> StoreResult<Option<Shipment>> {
        let row = sqlx::query_as::<_, ShipmentRow>("SELECT * FROM shipments WHERE order_id = $1")
            .bind(order_id).fetch_optional(&self.db).await?;
        Ok(row.map(Into::into))
    }

    async fn delete_order_cascade(&self, order_id: Uuid) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM shipments WHERE order_id = $1").bind(order_id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM order_items WHERE order_id = $1").bind(order_id).execute(&mut *tx).await?;
        let done = sqlx::query("DELETE FROM orders WHERE id = $1").bind(order_id).execute(&mut *tx).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        tx.commit().await?;
        Ok(())
    }

    async fn append_audit(&self, e: &AuditEntry) -> StoreResult<()> {
        sqlx::query("INSERT INTO audit_logs (id, entity_type, entity_id, action, details, changed_by_id, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(e.id).bind(&e.entity_type).bind(&e.entity_id).bind(&e.action).bind(&e.details).bind(e.changed_by_id).bind(e.timestamp)
            .execute(&self.db).await?;
        Ok(())
    }
}
