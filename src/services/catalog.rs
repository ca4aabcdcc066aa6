//! Single-record product and warehouse lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::stock_ledger::{self, snapshot};
use super::Fulfillment;
use crate::access::{authorize, Grant, Identity, Operation};
use crate::codegen;
use crate::domain::aggregates::{
    AllocationInput, NewProduct, NewWarehouse, Product, ProductPatch, StockAllocation, StockPlacement, Warehouse,
};
use crate::store::{constraint, AllocationFilter, StockDisposal, StoreError};
use crate::{FulfillmentError, Result};

/// Attempts at inserting a freshly generated warehouse code before giving up.
const CODE_ATTEMPTS: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithStock {
    #[serde(flatten)]
    pub product: Product,
    pub stock: Vec<StockAllocation>,
}

/// What to do with a warehouse's stock when it is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePlan {
    /// Merge every allocation into this warehouse.
    #[serde(default)]
    pub migrate_to: Option<Uuid>,
    /// Drop the allocations.
    #[serde(default)]
    pub force: bool,
}

pub struct Catalog<'a> {
    ctx: &'a Fulfillment,
}

impl<'a> Catalog<'a> {
    pub(crate) fn new(ctx: &'a Fulfillment) -> Self { Self { ctx } }

    pub async fn create_product(&self, identity: &Identity, new: NewProduct) -> Result<ProductWithStock> {
        let grant = authorize(identity, Operation::CreateProduct)?;
        let business_id = grant.target_business(new.business_id)?;
        let problems = new.problems();
        if !problems.is_empty() {
            return Err(FulfillmentError::invalid_fields("Invalid product", problems));
        }
        self.check_sku_free(&new).await?;
        let rows = self.place_stock(identity, &new.stock).await?;
        let product = self.insert_product(&new, business_id, &mut HashSet::new()).await?;
        let stock = self.attach_stock(&product, rows).await?;

        self.ctx.audit.record(
            "Product",
            product.id,
            "CREATE",
            json!({ "sku": product.sku, "name": product.name, "businessId": business_id, "stock": stock }),
            identity.user_id,
        ).await;
        info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(ProductWithStock { product, stock })
    }

    /// Name, weight and dimensions only; the SKU never changes.
    pub async fn update_product(&self, identity: &Identity, product_id: Uuid, patch: ProductPatch) -> Result<Product> {
        let grant = authorize(identity, Operation::UpdateProduct)?;
        let mut product = self.owned_product(&grant, product_id).await?;
        let before = json!({ "name": product.name, "weight": product.weight, "dimensions": product.dimensions });
        product.apply(&patch).map_err(FulfillmentError::validation)?;
        self.ctx.store.update_product(&product).await?;
        self.ctx.audit.record(
            "Product",
            product.id,
            "UPDATE",
            json!({ "before": before, "after": { "name": product.name, "weight": product.weight, "dimensions": product.dimensions } }),
            identity.user_id,
        ).await;
        Ok(product)
    }

    /// Replaces every allocation of a product in one atomic step.
    pub async fn replace_stock(&self, identity: &Identity, product_id: Uuid, placements: &[StockPlacement]) -> Result<Vec<StockAllocation>> {
        let grant = authorize(identity, Operation::ManageStock)?;
        let product = self.owned_product(&grant, product_id).await?;
        let problems: Vec<String> = placements.iter().enumerate()
            .filter_map(|(i, p)| AllocationInput::new(p.allocated_quantity, p.safety_stock).validate().err().map(|e| format!("stock[{i}]: {e}")))
            .collect();
        if !problems.is_empty() {
            return Err(FulfillmentError::invalid_fields("Invalid stock placement", problems));
        }
        let previous = self.ctx.store.list_allocations(AllocationFilter { product_id: Some(product.id), warehouse_id: None }).await?;
        let rows = self.place_stock(identity, placements).await?;
        let rows: Vec<StockAllocation> = rows.into_iter().map(|(w, input)| to_row(product.id, w, input)).collect::<Result<_>>()?;
        self.ctx.store.replace_allocations(product.id, &rows).await?;

        let by_warehouse = |list: &[StockAllocation]| -> serde_json::Map<String, serde_json::Value> {
            list.iter().map(|a| (a.warehouse_id.to_string(), snapshot(Some(a)))).collect()
        };
        self.ctx.audit.record(
            stock_ledger::ENTITY,
            product.id,
            "REPLACE",
            json!({ "previous": by_warehouse(&previous), "new": by_warehouse(&rows) }),
            identity.user_id,
        ).await;
        Ok(rows)
    }

    /// Refused once any order references the product.
    pub async fn delete_product(&self, identity: &Identity, product_id: Uuid) -> Result<()> {
        let grant = authorize(identity, Operation::DeleteProduct)?;
        let product = self.owned_product(&grant, product_id).await?;
        if self.ctx.store.product_in_orders(product.id).await? {
            return Err(FulfillmentError::conflict(format!("Product {} is referenced by existing orders", product.sku)));
        }
        self.ctx.store.delete_product(product.id).await?;
        self.ctx.audit.record("Product", product.id, "DELETE", json!({ "sku": product.sku, "name": product.name }), identity.user_id).await;
        info!(product_id = %product.id, "Product deleted");
        Ok(())
    }

    pub async fn create_warehouse(&self, identity: &Identity, new: NewWarehouse) -> Result<Warehouse> {
        authorize(identity, Operation::ManageWarehouse)?;
        let mut problems = vec![];
        if new.name.trim().is_empty() { problems.push("name is required".to_string()); }
        if new.region.trim().is_empty() { problems.push("region is required".to_string()); }
        if new.capacity < 0 { problems.push("capacity cannot be negative".to_string()); }
        if !problems.is_empty() {
            return Err(FulfillmentError::invalid_fields("Invalid warehouse", problems));
        }

        for _ in 0..CODE_ATTEMPTS {
            let code = codegen::next_warehouse_code(self.ctx.store.as_ref(), &new.region).await?;
            let warehouse = Warehouse::create(code, &new);
            match self.ctx.store.insert_warehouse(&warehouse).await {
                Ok(()) => {
                    self.ctx.audit.record(
                        "Warehouse",
                        warehouse.id,
                        "CREATE",
                        json!({ "code": warehouse.code, "name": warehouse.name, "region": warehouse.region }),
                        identity.user_id,
                    ).await;
                    info!(warehouse_id = %warehouse.id, code = %warehouse.code, "Warehouse created");
                    return Ok(warehouse);
                }
                Err(e) if e.violates(constraint::WAREHOUSE_CODE) => {
                    warn!(code = %warehouse.code, "Warehouse code taken concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(FulfillmentError::Generation(format!("Could not allocate a warehouse code for region {}", new.region)))
    }

    /// Open orders always block. Remaining stock blocks unless the plan migrates or forces it away.
    /// The store repeats both checks atomically with the delete.
    pub async fn delete_warehouse(&self, identity: &Identity, warehouse_id: Uuid, plan: DeletePlan) -> Result<()> {
        authorize(identity, Operation::ManageWarehouse)?;
        let warehouse = self.ctx.store.get_warehouse(warehouse_id).await?
            .ok_or_else(|| FulfillmentError::not_found("Warehouse", warehouse_id))?;
        if plan.migrate_to == Some(warehouse_id) {
            return Err(FulfillmentError::validation("Cannot migrate stock into the warehouse being deleted"));
        }

        let open_orders = self.ctx.store.count_open_orders_for_warehouse(warehouse_id).await?;
        if open_orders > 0 {
            return Err(in_use(&warehouse, open_orders, 0));
        }

        let stock_count = self.ctx.store.list_allocations(AllocationFilter { product_id: None, warehouse_id: Some(warehouse_id) }).await?.len();
        let disposal = match (stock_count, plan.migrate_to, plan.force) {
            (0, _, _) => StockDisposal::Keep,
            (_, Some(target), _) => {
                match self.ctx.store.get_warehouse(target).await? {
                    Some(t) if t.is_active() => StockDisposal::MigrateTo(target),
                    Some(t) => return Err(FulfillmentError::validation(format!("Target warehouse {} is not active", t.code))),
                    None => return Err(FulfillmentError::not_found("Warehouse", target)),
                }
            }
            (_, None, true) => StockDisposal::Purge,
            (n, None, false) => return Err(in_use(&warehouse, 0, n as i64)),
        };
        match self.ctx.store.delete_warehouse(warehouse_id, disposal).await {
            Ok(()) => {}
            Err(StoreError::WarehouseInUse { open_orders, allocations }) => {
                warn!(%warehouse_id, open_orders, allocations, "Warehouse gained dependants while being deleted");
                return Err(in_use(&warehouse, open_orders, allocations));
            }
            Err(e) => return Err(e.into()),
        }

        self.ctx.audit.record(
            "Warehouse",
            warehouse_id,
            "DELETE",
            json!({
                "code": warehouse.code,
                "stockCount": stock_count,
                "migratedTo": plan.migrate_to.filter(|_| stock_count > 0),
                "purged": matches!(disposal, StockDisposal::Purge),
            }),
            identity.user_id,
        ).await;
        info!(%warehouse_id, stock_count, "Warehouse deleted");
        Ok(())
    }

    /// Rejects an explicit SKU that is already stored, before any warehouse gets resolved.
    pub(crate) async fn check_sku_free(&self, new: &NewProduct) -> Result<()> {
        match new.explicit_sku() {
            Some(sku) if self.ctx.store.find_product_by_sku(&sku).await?.is_some() => Err(sku_taken(&sku)),
            _ => Ok(()),
        }
    }

    /// Inserts a validated product under its explicit or a generated SKU.
    /// `reserved` holds SKUs already claimed by the caller that the store may not know yet.
    pub(crate) async fn insert_product(&self, new: &NewProduct, business_id: Uuid, reserved: &mut HashSet<String>) -> Result<Product> {
        if let Some(sku) = new.explicit_sku() {
            if self.ctx.store.find_product_by_sku(&sku).await?.is_some() || reserved.contains(sku.as_str()) {
                return Err(sku_taken(&sku));
            }
            let product = Product::create(sku, new, business_id);
            return match self.ctx.store.insert_product(&product).await {
                Ok(()) => { reserved.insert(product.sku.to_string()); Ok(product) }
                Err(e) if e.violates(constraint::PRODUCT_SKU) => Err(sku_taken(&product.sku)),
                Err(e) => Err(e.into()),
            };
        }

        for _ in 0..codegen::SKU_COUNTER_MAX {
            let sku = codegen::next_sku(self.ctx.store.as_ref(), &new.name, reserved).await?;
            let product = Product::create(sku, new, business_id);
            match self.ctx.store.insert_product(&product).await {
                Ok(()) => { reserved.insert(product.sku.to_string()); return Ok(product); }
                Err(e) if e.violates(constraint::PRODUCT_SKU) => {
                    warn!(sku = %product.sku, "Generated SKU taken concurrently, retrying");
                    reserved.insert(product.sku.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(FulfillmentError::Generation(format!("No free SKU left for {}", new.name.trim())))
    }

    /// Resolves each placement's warehouse. Two placements landing in the same warehouse are rejected.
    pub(crate) async fn place_stock(&self, identity: &Identity, placements: &[StockPlacement]) -> Result<Vec<(Uuid, AllocationInput)>> {
        let resolver = self.ctx.warehouses();
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(placements.len());
        for p in placements {
            let warehouse = resolver.resolve_optional(identity, p.warehouse.as_deref()).await?;
            if !seen.insert(warehouse.id) {
                return Err(FulfillmentError::validation(format!("Stock placed twice in warehouse {}", warehouse.code)));
            }
            out.push((warehouse.id, AllocationInput::new(p.allocated_quantity, p.safety_stock)));
        }
        Ok(out)
    }

    /// Writes the initial stock of a just-inserted product. On failure the product is removed again.
    pub(crate) async fn attach_stock(&self, product: &Product, rows: Vec<(Uuid, AllocationInput)>) -> Result<Vec<StockAllocation>> {
        if rows.is_empty() { return Ok(vec![]); }
        let rows: Vec<StockAllocation> = rows.into_iter().map(|(w, input)| to_row(product.id, w, input)).collect::<Result<_>>()?;
        if let Err(e) = self.ctx.store.replace_allocations(product.id, &rows).await {
            if let Err(undo) = self.ctx.store.delete_product(product.id).await {
                warn!(product_id = %product.id, error = %undo, "Failed to remove product after stock placement failed");
            }
            return Err(e.into());
        }
        Ok(rows)
    }

    async fn owned_product(&self, grant: &Grant<'_>, product_id: Uuid) -> Result<Product> {
        let product = self.ctx.store.get_product(product_id).await?
            .ok_or_else(|| FulfillmentError::not_found("Product", product_id))?;
        grant.check_tenant(product.business_id)?;
        Ok(product)
    }
}

fn to_row(product_id: Uuid, warehouse_id: Uuid, input: AllocationInput) -> Result<StockAllocation> {
    Ok(input.validate()?.into_allocation(product_id, warehouse_id))
}

/// Open orders take precedence over stock in the reported conflict.
fn in_use(warehouse: &Warehouse, open_orders: i64, allocations: i64) -> FulfillmentError {
    if open_orders > 0 {
        return FulfillmentError::Conflict {
            message: format!("Warehouse {} still fulfils {open_orders} open orders", warehouse.code),
            details: Some(json!({ "orderCount": open_orders })),
        };
    }
    FulfillmentError::Conflict {
        message: format!("Warehouse {} still holds {allocations} stock allocations", warehouse.code),
        details: Some(json!({ "stockCount": allocations })),
    }
}

fn sku_taken(sku: &impl std::fmt::Display) -> FulfillmentError {
    FulfillmentError::conflict(format!("SKU {sku} already exists"))
}
