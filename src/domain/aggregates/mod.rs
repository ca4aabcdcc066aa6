//! Aggregates module
pub mod product;
pub mod warehouse;
pub mod stock;
pub mod order;
pub mod shipment;

pub use product::{NewProduct, Product, ProductPatch, StockPlacement};
pub use warehouse::{NewWarehouse, Warehouse, WarehouseKind, WarehouseStatus};
pub use stock::{AllocationError, AllocationInput, StockAllocation};
pub use order::{NewOrder, NewOrderItem, Order, OrderError, OrderField, OrderItem, OrderPatch, OrderStatus, StatusChange};
pub use shipment::Shipment;
