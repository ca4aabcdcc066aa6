//! OpenSASE Fulfillment
//!
//! Multi-tenant back-office core for merchants, warehouse staff and admins.
//!
//! ## Features
//! - Stock ledger per product and warehouse, with safety stock
//! - Warehouse resolution with a self-provisioning default warehouse
//! - Role-gated order fulfillment state machine
//! - Bulk ingestion of products and orders from JSON or delimited text
//! - SKU and warehouse-code generation
//!
//! Storage, audit and notification delivery are injected through the
//! [`store::Store`], [`audit::AuditSink`] and [`notify::Notifier`] traits.

use serde_json::Value;
use thiserror::Error;

pub mod access;
pub mod api;
pub mod audit;
pub mod codegen;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod notify;
pub mod services;
pub mod store;

pub use access::{Identity, Role};
pub use services::Fulfillment;

use domain::aggregates::{AllocationError, OrderError};
use domain::value_objects::SkuError;
use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("{message}")]
    Validation { message: String, details: Vec<String> },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Permission(String),

    #[error("{message}")]
    Conflict { message: String, details: Option<Value> },

    #[error("{0}")]
    Generation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl FulfillmentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), details: vec![] }
    }

    pub fn invalid_fields(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::Validation { message: message.into(), details }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into(), details: None }
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id} not found"))
    }

    /// Short machine-checkable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::Permission(_) => "permission",
            Self::Conflict { .. } => "conflict",
            Self::Generation(_) => "generation",
            Self::Storage(_) => "storage",
        }
    }

    /// Extra structured context for callers, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Validation { details, .. } if !details.is_empty() => Some(Value::from(details.clone())),
            Self::Conflict { details, .. } => details.clone(),
            _ => None,
        }
    }
}

impl From<AllocationError> for FulfillmentError {
    fn from(e: AllocationError) -> Self { Self::validation(e.to_string()) }
}

impl From<SkuError> for FulfillmentError {
    fn from(e: SkuError) -> Self { Self::validation(e.to_string()) }
}

impl From<OrderError> for FulfillmentError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotPermitted(msg) => Self::Permission(msg),
            OrderError::RequiresAssignment | OrderError::Invalid(_) => Self::validation(e.to_string()),
            OrderError::IllegalTransition { .. } | OrderError::NotAwaitingAllocation(_) | OrderError::Finalized => {
                Self::conflict(e.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, FulfillmentError>;
