//! Role-based access: who may do what, and to which tenant's data.
//!
//! Every core operation asks [`authorize`] once with the caller's
//! [`Identity`] and gets back a [`Grant`] whose scope it then checks
//! against the record being touched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::OrderField;
use crate::FulfillmentError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Merchant,
    MerchantStaff,
    Logistics,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Merchant => "MERCHANT",
            Self::MerchantStaff => "MERCHANT_STAFF",
            Self::Logistics => "LOGISTICS",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = FulfillmentError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "MERCHANT" => Ok(Self::Merchant),
            "MERCHANT_STAFF" => Ok(Self::MerchantStaff),
            "LOGISTICS" => Ok(Self::Logistics),
            other => Err(FulfillmentError::validation(format!("Unknown role: {other}"))),
        }
    }
}

/// Caller identity as supplied by the session provider. Never authenticated here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub business_id: Option<Uuid>,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role, business_id: Option<Uuid>) -> Self {
        Self { user_id, role, business_id }
    }
    pub fn admin(user_id: Uuid) -> Self { Self::new(user_id, Role::Admin, None) }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// A user as known to the identity provider, used to check assignment targets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub business_id: Option<Uuid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    ManageStock,
    ManageWarehouse,
    CreateOrder,
    EditOrder,
    AssignLogistics,
    AdvanceDelivery,
    HoldOrder,
    DeleteOrder,
    ViewOrder,
    BulkImport,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Any tenant's records.
    Any,
    /// Only records owned by the caller's business.
    OwnTenant,
    /// Only orders assigned to the caller.
    Assigned,
}

use Operation as Op;
use Role::*;
use Scope::*;

const CAPABILITIES: &[(Role, Operation, Scope)] = &[
    (Admin, Op::CreateProduct, Any),
    (Admin, Op::UpdateProduct, Any),
    (Admin, Op::DeleteProduct, Any),
    (Admin, Op::ManageStock, Any),
    (Admin, Op::ManageWarehouse, Any),
    (Admin, Op::CreateOrder, Any),
    (Admin, Op::EditOrder, Any),
    (Admin, Op::AssignLogistics, Any),
    (Admin, Op::AdvanceDelivery, Any),
    (Admin, Op::HoldOrder, Any),
    (Admin, Op::DeleteOrder, Any),
    (Admin, Op::ViewOrder, Any),
    (Admin, Op::BulkImport, Any),
    (Merchant, Op::CreateProduct, OwnTenant),
    (Merchant, Op::UpdateProduct, OwnTenant),
    (Merchant, Op::DeleteProduct, OwnTenant),
    (Merchant, Op::ManageStock, OwnTenant),
    (Merchant, Op::CreateOrder, OwnTenant),
    (Merchant, Op::EditOrder, OwnTenant),
    (Merchant, Op::ViewOrder, OwnTenant),
    (Merchant, Op::BulkImport, OwnTenant),
    (MerchantStaff, Op::CreateProduct, OwnTenant),
    (MerchantStaff, Op::UpdateProduct, OwnTenant),
    (MerchantStaff, Op::ManageStock, OwnTenant),
    (MerchantStaff, Op::CreateOrder, OwnTenant),
    (MerchantStaff, Op::EditOrder, OwnTenant),
    (MerchantStaff, Op::ViewOrder, OwnTenant),
    (MerchantStaff, Op::BulkImport, OwnTenant),
    (Logistics, Op::ManageStock, Any),
    (Logistics, Op::EditOrder, Any),
    (Logistics, Op::AdvanceDelivery, Assigned),
    (Logistics, Op::ViewOrder, Any),
];

pub fn capability(role: Role, op: Operation) -> Option<Scope> {
    CAPABILITIES.iter().find(|(r, o, _)| *r == role && *o == op).map(|(_, _, s)| *s)
}

/// Fields of an order each role may write.
pub fn editable_order_fields(role: Role) -> &'static [OrderField] {
    match role {
        Admin => OrderField::ALL,
        Merchant | MerchantStaff => &[
            OrderField::CustomerName,
            OrderField::CustomerAddress,
            OrderField::CustomerPhone,
            OrderField::ExternalOrderId,
        ],
        Logistics => &[
            OrderField::Status,
            OrderField::AssignedLogisticsId,
            OrderField::FulfillmentWarehouseId,
        ],
    }
}

/// Result of a successful capability lookup.
#[derive(Clone, Debug)]
pub struct Grant<'a> {
    pub identity: &'a Identity,
    pub scope: Scope,
    op: Operation,
}

pub fn authorize(identity: &Identity, op: Operation) -> Result<Grant<'_>, FulfillmentError> {
    match capability(identity.role, op) {
        Some(scope) => Ok(Grant { identity, scope, op }),
        None => Err(FulfillmentError::Permission(format!(
            "Role {} may not perform {:?}",
            identity.role, op
        ))),
    }
}

impl Grant<'_> {
    /// Checks that `business_id` falls inside the grant's tenant scope.
    pub fn check_tenant(&self, business_id: Uuid) -> Result<(), FulfillmentError> {
        match self.scope {
            Any | Assigned => Ok(()),
            OwnTenant if self.identity.business_id == Some(business_id) => Ok(()),
            OwnTenant => Err(FulfillmentError::Permission(format!(
                "{:?} is limited to your own business",
                self.op
            ))),
        }
    }

    /// Checks that the caller is the assigned logistics user when the scope demands it.
    pub fn check_assignee(&self, assignee: Option<Uuid>) -> Result<(), FulfillmentError> {
        match self.scope {
            Assigned if assignee != Some(self.identity.user_id) => Err(FulfillmentError::Permission(
                "Only the assigned logistics user may update this order".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Business the caller acts for: their own for tenant-scoped roles, otherwise `requested`.
    pub fn target_business(&self, requested: Option<Uuid>) -> Result<Uuid, FulfillmentError> {
        match (self.scope, self.identity.business_id, requested) {
            (OwnTenant, Some(own), Some(req)) if own != req => Err(FulfillmentError::Permission(
                "Merchants may only write into their own business".into(),
            )),
            (OwnTenant, Some(own), _) => Ok(own),
            (OwnTenant, None, _) => Err(FulfillmentError::Permission("Caller has no business".into())),
            (_, _, Some(req)) => Ok(req),
            (_, own, None) => own.ok_or_else(|| FulfillmentError::validation("businessId is required")),
        }
    }
}

/// Fails with a permission error naming the first field `role` may not write.
pub fn check_order_fields(role: Role, touched: &[OrderField]) -> Result<(), FulfillmentError> {
    let allowed = editable_order_fields(role);
    match touched.iter().find(|f| !allowed.contains(f)) {
        Some(field) => Err(FulfillmentError::Permission(format!(
            "Role {role} may not modify field {}",
            field.as_str()
        ))),
        None => Ok(()),
    }
}
