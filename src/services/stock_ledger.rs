//! StockLedger: allocated quantity and safety stock per (product, warehouse).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::Fulfillment;
use crate::access::{authorize, Grant, Identity, Operation, Scope};
use crate::domain::aggregates::{AllocationInput, Product, StockAllocation};
use crate::store::AllocationFilter;
use crate::{FulfillmentError, Result};

pub(crate) const ENTITY: &str = "StockAllocation";

pub(crate) fn allocation_key(product_id: Uuid, warehouse_id: Uuid) -> String {
    format!("{product_id}:{warehouse_id}")
}

pub(crate) fn snapshot(row: Option<&StockAllocation>) -> Value {
    match row {
        Some(a) => json!({ "allocatedQuantity": a.allocated_quantity, "safetyStock": a.safety_stock }),
        None => Value::Null,
    }
}

/// One entry of a bulk stock update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationEntry {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub allocated_quantity: i64,
    #[serde(default)]
    pub safety_stock: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum EntryOutcome {
    Created { allocation: StockAllocation },
    Updated { allocation: StockAllocation },
    Failed { error: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStockReport {
    pub results: Vec<EntryOutcome>,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct StockLedger<'a> {
    ctx: &'a Fulfillment,
}

impl<'a> StockLedger<'a> {
    pub(crate) fn new(ctx: &'a Fulfillment) -> Self { Self { ctx } }

    pub fn get_available(allocation: &StockAllocation) -> i64 { allocation.available() }

    pub fn is_low_stock(allocation: &StockAllocation) -> bool { allocation.is_low_stock() }

    /// Creates the row or overwrites both quantities.
    pub async fn upsert_allocation(
        &self,
        identity: &Identity,
        product_id: Uuid,
        warehouse_id: Uuid,
        input: AllocationInput,
    ) -> Result<StockAllocation> {
        let grant = authorize(identity, Operation::ManageStock)?;
        self.apply(&grant, product_id, warehouse_id, input).await.map(|(row, _)| row)
    }

    /// Applies every entry independently. Only an authorization failure fails the whole call.
    pub async fn bulk_upsert(&self, identity: &Identity, entries: &[AllocationEntry]) -> Result<BulkStockReport> {
        let grant = authorize(identity, Operation::ManageStock)?;
        let mut report = BulkStockReport::default();
        for entry in entries {
            let input = AllocationInput::new(entry.allocated_quantity, entry.safety_stock);
            let outcome = match self.apply(&grant, entry.product_id, entry.warehouse_id, input).await {
                Ok((allocation, true)) => { report.created += 1; EntryOutcome::Created { allocation } }
                Ok((allocation, false)) => { report.updated += 1; EntryOutcome::Updated { allocation } }
                Err(e) => { report.failed += 1; EntryOutcome::Failed { error: e.to_string() } }
            };
            report.results.push(outcome);
        }
        info!(created = report.created, updated = report.updated, failed = report.failed, "Bulk stock update finished");
        Ok(report)
    }

    /// Refused while a pending order fulfilled from this warehouse contains the product.
    pub async fn delete_allocation(&self, identity: &Identity, product_id: Uuid, warehouse_id: Uuid) -> Result<()> {
        let grant = authorize(identity, Operation::ManageStock)?;
        self.owned_product(&grant, product_id).await?;
        let previous = self.ctx.store.get_allocation(product_id, warehouse_id).await?
            .ok_or_else(|| FulfillmentError::not_found("Stock allocation", allocation_key(product_id, warehouse_id)))?;
        let pending = self.ctx.store.count_pending_orders_for_stock(product_id, warehouse_id).await?;
        if pending > 0 {
            return Err(FulfillmentError::Conflict {
                message: format!("Stock is reserved by {pending} pending orders"),
                details: Some(json!({ "pendingOrders": pending })),
            });
        }
        self.ctx.store.delete_allocation(product_id, warehouse_id).await?;
        self.ctx.audit.record(
            ENTITY,
            allocation_key(product_id, warehouse_id),
            "DELETE",
            json!({ "previous": snapshot(Some(&previous)), "new": Value::Null }),
            identity.user_id,
        ).await;
        info!(%product_id, %warehouse_id, "Deleted stock allocation");
        Ok(())
    }

    /// Low-stock rows, optionally for one warehouse. Tenant-scoped callers only see their own products.
    pub async fn low_stock(&self, identity: &Identity, warehouse_id: Option<Uuid>) -> Result<Vec<StockAllocation>> {
        let grant = authorize(identity, Operation::ManageStock)?;
        let rows = self.ctx.store.list_allocations(AllocationFilter { product_id: None, warehouse_id }).await?;
        let mut out = Vec::new();
        for row in rows.into_iter().filter(StockAllocation::is_low_stock) {
            if grant.scope == Scope::OwnTenant {
                let owned = self.ctx.store.get_product(row.product_id).await?
                    .is_some_and(|p| grant.check_tenant(p.business_id).is_ok());
                if !owned { continue; }
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Returns the stored row and whether it was newly created.
    async fn apply(
        &self,
        grant: &Grant<'_>,
        product_id: Uuid,
        warehouse_id: Uuid,
        input: AllocationInput,
    ) -> Result<(StockAllocation, bool)> {
        let checked = input.validate()?;
        self.owned_product(grant, product_id).await?;
        if self.ctx.store.get_warehouse(warehouse_id).await?.is_none() {
            return Err(FulfillmentError::not_found("Warehouse", warehouse_id));
        }
        let previous = self.ctx.store.get_allocation(product_id, warehouse_id).await?;
        let row = checked.into_allocation(product_id, warehouse_id);
        self.ctx.store.upsert_allocation(&row).await?;

        let created = previous.is_none();
        self.ctx.audit.record(
            ENTITY,
            allocation_key(product_id, warehouse_id),
            if created { "CREATE" } else { "UPDATE" },
            json!({ "previous": snapshot(previous.as_ref()), "new": snapshot(Some(&row)) }),
            grant.identity.user_id,
        ).await;
        info!(%product_id, %warehouse_id, allocated = row.allocated_quantity, safety = row.safety_stock, "Stock allocation saved");
        Ok((row, created))
    }

    async fn owned_product(&self, grant: &Grant<'_>, product_id: Uuid) -> Result<Product> {
        let product = self.ctx.store.get_product(product_id).await?
            .ok_or_else(|| FulfillmentError::not_found("Product", product_id))?;
        grant.check_tenant(product.business_id)?;
        Ok(product)
    }
}
