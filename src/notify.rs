//! User notifications. Delivery is best effort: a failure is logged by the
//! caller and never undoes the mutation that triggered it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: Uuid,
    pub message: String,
    pub link_url: Option<String>,
    pub template_id: Option<String>,
    pub template_data: serde_json::Value,
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Publishes each notification as JSON on `fulfillment.notifications.<user id>`.
pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    pub const SUBJECT_PREFIX: &'static str = "fulfillment.notifications";

    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, n: Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(&n).map_err(|e| NotifyError(e.to_string()))?;
        let subject = format!("{}.{}", Self::SUBJECT_PREFIX, n.user_id);
        self.client.publish(subject, payload.into()).await.map_err(|e| NotifyError(e.to_string()))
    }
}

/// Used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: Notification) -> Result<(), NotifyError> {
        tracing::info!(user_id = %n.user_id, message = %n.message, "notification");
        Ok(())
    }
}
