//! HTTP surface over [`Fulfillment`].
//!
//! Callers identify themselves with `X-User-Id`, `X-User-Role` and
//! `X-Business-Id` headers set by the session layer in front of this service.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use uuid::Uuid;
use validator::Validate;

use crate::access::{Identity, Role};
use crate::domain::aggregates::{
    AllocationInput, NewOrder, NewProduct, NewWarehouse, Order, OrderItem, OrderPatch, OrderStatus, ProductPatch,
    Shipment, StockPlacement,
};
use crate::ingest::{ImportOptions, ImportSource, TextFormat};
use crate::services::{AllocationEntry, DeletePlan, Fulfillment};
use crate::FulfillmentError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const BUSINESS_ID_HEADER: &str = "x-business-id";

pub fn router(state: Fulfillment) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "opensase-fulfillment"})) }))
        .route("/api/v1/products", post(create_product))
        .route("/api/v1/products/import", post(import_products))
        .route("/api/v1/products/:id", put(update_product).delete(delete_product))
        .route("/api/v1/products/:id/stock", put(replace_stock))
        .route("/api/v1/warehouses", post(create_warehouse))
        .route("/api/v1/warehouses/resolve", get(resolve_warehouse))
        .route("/api/v1/warehouses/:id", delete(delete_warehouse))
        .route("/api/v1/stock/bulk", post(bulk_stock))
        .route("/api/v1/stock/low", get(low_stock))
        .route("/api/v1/stock/:product_id/:warehouse_id", put(upsert_stock).delete(delete_stock))
        .route("/api/v1/orders", post(create_order))
        .route("/api/v1/orders/import", post(import_orders))
        .route("/api/v1/orders/:id", get(get_order).patch(update_order).delete(delete_order))
        .route("/api/v1/orders/:id/assign", post(assign_order))
        .route("/api/v1/orders/:id/status", post(transition_order))
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated(String),
    Service(FulfillmentError),
}

impl From<FulfillmentError> for ApiError {
    fn from(e: FulfillmentError) -> Self { Self::Service(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            Self::Unauthenticated(msg) => {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": msg, "kind": "unauthenticated"}))).into_response();
            }
            Self::Service(e) => e,
        };
        let status = match &e {
            FulfillmentError::Validation { .. } => StatusCode::BAD_REQUEST,
            FulfillmentError::Permission(_) => StatusCode::FORBIDDEN,
            FulfillmentError::NotFound(_) => StatusCode::NOT_FOUND,
            FulfillmentError::Conflict { .. } => StatusCode::CONFLICT,
            FulfillmentError::Generation(_) | FulfillmentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(kind = e.kind(), error = %e, "Request failed");
        }
        let mut body = json!({"error": e.to_string(), "kind": e.kind()});
        if let Some(details) = e.details() {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Runs `validator` rules on a request body and reports every failing field.
fn validated<T: Validate>(body: T) -> ApiResult<T> {
    body.validate().map_err(|errors| {
        let mut details: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| errs.iter().map(move |e| format!("{field}: {}", e.message.as_deref().unwrap_or(&*e.code))))
            .collect();
        details.sort();
        FulfillmentError::invalid_fields("Invalid request", details)
    })?;
    Ok(body)
}

// =============================================================================
// Identity
// =============================================================================

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("Missing X-User-Id header".into()))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| ApiError::Unauthenticated("X-User-Id is not a UUID".into()))?;
        let role: Role = header(parts, USER_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("Missing X-User-Role header".into()))?
            .parse()
            .map_err(|e: FulfillmentError| ApiError::Unauthenticated(e.to_string()))?;
        let business_id = match header(parts, BUSINESS_ID_HEADER) {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| ApiError::Unauthenticated("X-Business-Id is not a UUID".into()))?),
            None => None,
        };
        Ok(Identity::new(user_id, role, business_id))
    }
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StockRequest {
    #[validate(range(min = 0, message = "allocatedQuantity cannot be negative"))]
    pub allocated_quantity: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "safetyStock cannot be negative"))]
    pub safety_stock: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWarehouseRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "region is required"))]
    pub region: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "capacity cannot be negative"))]
    pub capacity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteWarehouseParams {
    pub migrate_to: Option<Uuid>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockParams {
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub logistics_id: Uuid,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// Either `records` or `text` (with optional `delimiter` and `hasHeader`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest<T> {
    pub records: Option<Vec<T>>,
    pub text: Option<String>,
    pub delimiter: Option<char>,
    pub has_header: Option<bool>,
    #[serde(default)]
    pub options: ImportOptions,
    pub business_id: Option<Uuid>,
}

impl<T> ImportRequest<T> {
    fn into_source(self) -> ApiResult<(ImportSource<T>, ImportOptions, Option<Uuid>)> {
        let source = match (self.records, self.text) {
            (Some(records), None) => ImportSource::Records { records },
            (None, Some(text)) => {
                let defaults = TextFormat::default();
                let format = TextFormat {
                    delimiter: self.delimiter.unwrap_or(defaults.delimiter),
                    has_header: self.has_header.unwrap_or(defaults.has_header),
                };
                ImportSource::Text { text, format }
            }
            _ => return Err(FulfillmentError::validation("Provide exactly one of records or text").into()),
        };
        Ok((source, self.options, self.business_id))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shipment: Option<Shipment>,
}

// =============================================================================
// Products & warehouses
// =============================================================================

async fn create_product(State(s): State<Fulfillment>, caller: Identity, Json(r): Json<NewProduct>) -> ApiResult<impl IntoResponse> {
    let created = s.catalog().create_product(&caller, r).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_product(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>, Json(r): Json<ProductPatch>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.catalog().update_product(&caller, id, r).await?))
}

async fn delete_product(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.catalog().delete_product(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_stock(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>, Json(r): Json<Vec<StockPlacement>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.catalog().replace_stock(&caller, id, &r).await?))
}

async fn import_products(State(s): State<Fulfillment>, caller: Identity, Json(r): Json<ImportRequest<NewProduct>>) -> ApiResult<impl IntoResponse> {
    let (source, options, business) = r.into_source()?;
    Ok(Json(s.ingest().import_products(&caller, source, options, business).await?))
}

async fn create_warehouse(State(s): State<Fulfillment>, caller: Identity, Json(r): Json<CreateWarehouseRequest>) -> ApiResult<impl IntoResponse> {
    let r = validated(r)?;
    let new = NewWarehouse { name: r.name, region: r.region, address: r.address, city: r.city, country: r.country, capacity: r.capacity, ..Default::default() };
    Ok((StatusCode::CREATED, Json(s.catalog().create_warehouse(&caller, new).await?)))
}

async fn delete_warehouse(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>, Query(p): Query<DeleteWarehouseParams>) -> ApiResult<StatusCode> {
    s.catalog().delete_warehouse(&caller, id, DeletePlan { migrate_to: p.migrate_to, force: p.force }).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resolve_warehouse(State(s): State<Fulfillment>, caller: Identity, Query(p): Query<ResolveParams>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.warehouses().resolve_optional(&caller, p.reference.as_deref()).await?))
}

// =============================================================================
// Stock
// =============================================================================

async fn upsert_stock(State(s): State<Fulfillment>, caller: Identity, Path((product_id, warehouse_id)): Path<(Uuid, Uuid)>, Json(r): Json<StockRequest>) -> ApiResult<impl IntoResponse> {
    let r = validated(r)?;
    let input = AllocationInput::new(r.allocated_quantity, r.safety_stock);
    Ok(Json(s.stock().upsert_allocation(&caller, product_id, warehouse_id, input).await?))
}

async fn delete_stock(State(s): State<Fulfillment>, caller: Identity, Path((product_id, warehouse_id)): Path<(Uuid, Uuid)>) -> ApiResult<StatusCode> {
    s.stock().delete_allocation(&caller, product_id, warehouse_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_stock(State(s): State<Fulfillment>, caller: Identity, Json(r): Json<Vec<AllocationEntry>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.stock().bulk_upsert(&caller, &r).await?))
}

async fn low_stock(State(s): State<Fulfillment>, caller: Identity, Query(p): Query<LowStockParams>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.stock().low_stock(&caller, p.warehouse_id).await?))
}

// =============================================================================
// Orders
// =============================================================================

async fn create_order(State(s): State<Fulfillment>, caller: Identity, Json(r): Json<NewOrder>) -> ApiResult<impl IntoResponse> {
    let (order, items) = s.orders().create_order(&caller, r).await?;
    Ok((StatusCode::CREATED, Json(OrderView { order, items, shipment: None })))
}

async fn get_order(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let (order, items, shipment) = s.orders().get(&caller, id).await?;
    Ok(Json(OrderView { order, items, shipment }))
}

async fn update_order(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>, Json(r): Json<OrderPatch>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.orders().update_order(&caller, id, r).await?))
}

async fn delete_order(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.orders().delete_order(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_order(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>, Json(r): Json<AssignRequest>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.orders().assign_logistics(&caller, id, r.logistics_id, r.status).await?))
}

async fn transition_order(State(s): State<Fulfillment>, caller: Identity, Path(id): Path<Uuid>, Json(r): Json<StatusRequest>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.orders().transition(&caller, id, r.status).await?))
}

async fn import_orders(State(s): State<Fulfillment>, caller: Identity, Json(r): Json<ImportRequest<NewOrder>>) -> ApiResult<impl IntoResponse> {
    let (source, options, merchant) = r.into_source()?;
    Ok(Json(s.ingest().import_orders(&caller, source, options, merchant).await?))
}
