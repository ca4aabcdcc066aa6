//! Application services.
//!
//! [`Fulfillment`] bundles the injected collaborators and hands out one view
//! per component. Views borrow the facade, so they are cheap to create per
//! request.

use std::sync::Arc;

use crate::audit::{AuditLog, AuditSink, StoreAuditSink};
use crate::config::Config;
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::store::Store;

pub mod catalog;
pub mod fulfillment;
pub mod stock_ledger;
pub mod warehouse_resolver;

pub use catalog::{Catalog, DeletePlan, ProductWithStock};
pub use fulfillment::OrderLifecycle;
pub use stock_ledger::{AllocationEntry, BulkStockReport, EntryOutcome, StockLedger};
pub use warehouse_resolver::WarehouseResolver;

/// Runtime knobs the services read from [`Config`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub bulk_batch_size: usize,
    pub shipment_carrier: String,
}

impl From<&Config> for Settings {
    fn from(cfg: &Config) -> Self {
        Self { bulk_batch_size: cfg.bulk_batch_size, shipment_carrier: cfg.shipment_carrier.clone() }
    }
}

#[derive(Clone)]
pub struct Fulfillment {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) audit: AuditLog,
    notifier: Arc<dyn Notifier>,
    pub(crate) settings: Settings,
}

impl Fulfillment {
    /// Audit entries go to the same store as the data.
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, settings: Settings) -> Self {
        let sink: Arc<dyn AuditSink> = Arc::new(StoreAuditSink(store.clone()));
        Self::with_audit_sink(store, sink, notifier, settings)
    }

    pub fn with_audit_sink(
        store: Arc<dyn Store>,
        sink: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        Self { store, audit: AuditLog::new(sink), notifier, settings }
    }

    /// Default settings and log-only notifications.
    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self::new(store, Arc::new(LogNotifier), Settings::from(&Config::default()))
    }

    pub fn store(&self) -> &Arc<dyn Store> { &self.store }

    pub fn stock(&self) -> StockLedger<'_> { StockLedger::new(self) }

    pub fn warehouses(&self) -> WarehouseResolver<'_> { WarehouseResolver::new(self) }

    pub fn catalog(&self) -> Catalog<'_> { Catalog::new(self) }

    pub fn orders(&self) -> OrderLifecycle<'_> { OrderLifecycle::new(self) }

    pub fn ingest(&self) -> crate::ingest::BulkIngestion<'_> { crate::ingest::BulkIngestion::new(self) }

    /// Best effort: a failed delivery is logged and dropped.
    pub(crate) async fn notify(&self, notification: Notification) {
        let user_id = notification.user_id;
        if let Err(e) = self.notifier.notify(notification).await {
            tracing::warn!(%user_id, error = %e, "Failed to deliver notification");
        }
    }
}
