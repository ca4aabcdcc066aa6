//! Audit trail
//!
//! Append-only `(entityType, entityId, action, details, changedById, timestamp)`
//! records. Every mutating core operation writes one. The core never updates
//! or deletes entries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::store::{Store, StoreError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub details: serde_json::Value,
    pub changed_by_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        entity_type: &str,
        entity_id: impl ToString,
        action: &str,
        details: serde_json::Value,
        changed_by_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            details,
            changed_by_id,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError>;
}

/// Writes audit entries into the same store as the data they describe.
pub struct StoreAuditSink(pub Arc<dyn Store>);

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.0.append_audit(&entry).await
    }
}

/// Handle the services hold. The primary mutation has already committed when
/// an entry is written, so a failed write is logged rather than returned.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self { Self { sink } }

    pub async fn record(
        &self,
        entity_type: &str,
        entity_id: impl ToString,
        action: &str,
        details: serde_json::Value,
        actor: Uuid,
    ) {
        let entry = AuditEntry::new(entity_type, entity_id, action, details, actor);
        if let Err(e) = self.sink.record(entry).await {
            tracing::error!(entity_type, action, error = %e, "Failed to write audit log entry");
        }
    }
}
