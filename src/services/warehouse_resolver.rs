//! Turns a caller-supplied warehouse reference into a concrete warehouse.
//!
//! Resolution order: the `DEFAULT_WAREHOUSE` sentinel, an ACTIVE warehouse
//! by id, an ACTIVE warehouse by case-insensitive name, and finally the
//! default warehouse, which is created on first use.

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Fulfillment;
use crate::access::Identity;
use crate::domain::aggregates::{Warehouse, WarehouseStatus};
use crate::domain::value_objects::WarehouseCode;
use crate::store::constraint;
use crate::{FulfillmentError, Result};

pub const DEFAULT_SENTINEL: &str = "DEFAULT_WAREHOUSE";

pub struct WarehouseResolver<'a> {
    ctx: &'a Fulfillment,
}

impl<'a> WarehouseResolver<'a> {
    pub(crate) fn new(ctx: &'a Fulfillment) -> Self { Self { ctx } }

    /// Never fails for a bad reference; unresolvable references land in the default warehouse.
    pub async fn resolve(&self, actor: &Identity, reference: &str) -> Result<Warehouse> {
        let reference = reference.trim();
        if reference.is_empty() || reference.eq_ignore_ascii_case(DEFAULT_SENTINEL) {
            return self.default_warehouse(actor).await;
        }
        if let Ok(id) = Uuid::parse_str(reference) {
            match self.ctx.store.get_warehouse(id).await? {
                Some(w) if w.is_active() => return Ok(w),
                Some(w) => debug!(warehouse_id = %w.id, status = %w.status, "Warehouse is not active"),
                None => {}
            }
        }
        if let Some(w) = self.ctx.store.find_active_warehouse_by_name(reference).await? {
            return Ok(w);
        }
        debug!(reference, "Unresolved warehouse reference, using default warehouse");
        self.default_warehouse(actor).await
    }

    pub async fn resolve_optional(&self, actor: &Identity, reference: Option<&str>) -> Result<Warehouse> {
        self.resolve(actor, reference.unwrap_or(DEFAULT_SENTINEL)).await
    }

    /// Finds the active "Default" warehouse or provisions it. Concurrent callers
    /// race on the `DEFAULT` code; the loser re-reads the winner's row. A
    /// deactivated `DEFAULT` row is switched back on rather than returned as is.
    pub async fn default_warehouse(&self, actor: &Identity) -> Result<Warehouse> {
        let store = &self.ctx.store;
        if let Some(w) = store.find_active_warehouse_by_name(Warehouse::DEFAULT_NAME).await? {
            return Ok(w);
        }
        let warehouse = Warehouse::default_warehouse();
        match store.insert_warehouse(&warehouse).await {
            Ok(()) => {
                info!(warehouse_id = %warehouse.id, "Provisioned default warehouse");
                self.ctx.audit.record(
                    "Warehouse",
                    warehouse.id,
                    "CREATE",
                    json!({ "code": warehouse.code, "name": warehouse.name, "autoCreated": true }),
                    actor.user_id,
                ).await;
                Ok(warehouse)
            }
            Err(e) if e.violates(constraint::WAREHOUSE_CODE) => {
                let existing = store
                    .find_warehouse_by_code(WarehouseCode::DEFAULT)
                    .await?
                    .ok_or_else(|| FulfillmentError::conflict("Default warehouse disappeared while being provisioned"))?;
                if existing.is_active() { Ok(existing) } else { self.reactivate(actor, existing).await }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reactivate(&self, actor: &Identity, mut warehouse: Warehouse) -> Result<Warehouse> {
        let previous = warehouse.status;
        self.ctx.store.set_warehouse_status(warehouse.id, WarehouseStatus::Active).await?;
        warehouse.status = WarehouseStatus::Active;
        warn!(warehouse_id = %warehouse.id, %previous, "Reactivated default warehouse");
        self.ctx.audit.record(
            "Warehouse",
            warehouse.id,
            "UPDATE",
            json!({ "status": { "from": previous, "to": warehouse.status }, "reactivated": true }),
            actor.user_id,
        ).await;
        Ok(warehouse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{NewWarehouse, WarehouseStatus};
    use crate::store::{InMemoryStore, Store};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryStore>, Fulfillment, Identity) {
        let store = Arc::new(InMemoryStore::new());
        let ctx = Fulfillment::with_store(store.clone());
        (store, ctx, Identity::admin(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_default_is_idempotent() {
        let (store, ctx, admin) = setup();
        let first = ctx.warehouses().resolve(&admin, DEFAULT_SENTINEL).await.unwrap();
        let second = ctx.warehouses().resolve(&admin, "default_warehouse").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.code.as_str(), "DEFAULT");
        assert_eq!(store.warehouses().await.len(), 1);
        assert_eq!(store.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_by_id_and_name() {
        let (store, ctx, admin) = setup();
        let lagos = Warehouse::create(WarehouseCode::new("LAG001"), &NewWarehouse { name: "Lagos Hub".into(), region: "Lagos".into(), ..Default::default() });
        store.insert_warehouse(&lagos).await.unwrap();

        let by_id = ctx.warehouses().resolve(&admin, &lagos.id.to_string()).await.unwrap();
        assert_eq!(by_id.id, lagos.id);
        let by_name = ctx.warehouses().resolve(&admin, "lagos hub").await.unwrap();
        assert_eq!(by_name.id, lagos.id);
        let fallback = ctx.warehouses().resolve(&admin, "Atlantis").await.unwrap();
        assert!(fallback.is_default());
    }

    #[tokio::test]
    async fn test_inactive_warehouse_falls_back() {
        let (store, ctx, admin) = setup();
        let mut closed = Warehouse::create(WarehouseCode::new("ABU001"), &NewWarehouse { name: "Abuja".into(), region: "Abuja".into(), ..Default::default() });
        closed.status = WarehouseStatus::Maintenance;
        store.insert_warehouse(&closed).await.unwrap();
        let resolved = ctx.warehouses().resolve(&admin, &closed.id.to_string()).await.unwrap();
        assert_ne!(resolved.id, closed.id);
        assert!(resolved.is_default());
    }

    #[tokio::test]
    async fn test_deactivated_default_is_switched_back_on() {
        let (store, ctx, admin) = setup();
        let mut dormant = Warehouse::default_warehouse();
        dormant.status = WarehouseStatus::Inactive;
        store.insert_warehouse(&dormant).await.unwrap();

        let resolved = ctx.warehouses().resolve(&admin, DEFAULT_SENTINEL).await.unwrap();
        assert_eq!(resolved.id, dormant.id);
        assert!(resolved.is_active());
        assert!(store.get_warehouse(dormant.id).await.unwrap().unwrap().is_active());
        assert_eq!(store.warehouses().await.len(), 1);
        let audit = store.audit_entries().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "UPDATE");

        let fallback = ctx.warehouses().resolve(&admin, "Atlantis").await.unwrap();
        assert_eq!(fallback.id, dormant.id);
        assert_eq!(store.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lost_race_refetches_by_code() {
        let (store, ctx, admin) = setup();
        // Another writer created the DEFAULT row under a different name.
        let mut other = Warehouse::default_warehouse();
        other.name = "Main".into();
        store.insert_warehouse(&other).await.unwrap();
        let resolved = ctx.warehouses().default_warehouse(&admin).await.unwrap();
        assert_eq!(resolved.id, other.id);
    }
}
