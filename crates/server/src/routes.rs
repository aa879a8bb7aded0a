//! JSON API over the approval, intake and order cores.
//!
//! - `POST /api/v1/requests`                   submit a tire request
//! - `GET  /api/v1/requests/{id}`              request with ordered image paths
//! - `PUT  /api/v1/requests/{id}/status`       apply an approval-chain transition
//! - `POST /api/v1/requests/{id}/place-order`  notify the supplier and record the order
//! - `GET  /api/v1/users/{id}/requests`        a requester's history, newest first
//! - `GET  /api/v1/vehicles/{id}/requests/latest`  zero or one request, latest replacement
//! - `POST /api/v1/vehicles`                   register a vehicle
//! - `GET  /api/v1/vehicles/{id}`
//! - `GET|POST /api/v1/suppliers`
//! - `GET|PUT|DELETE /api/v1/suppliers/{id}`
//!
//! Error categories map onto HTTP status codes; a partial order placement is
//! answered with 500 and the reconciliation detail in the body.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use treadline_core::approvals::ApprovalService;
use treadline_core::domain::fleet::{UserId, Vehicle, VehicleId};
use treadline_core::domain::request::{RequestId, TireRequest};
use treadline_core::domain::supplier::{Supplier, SupplierId};
use treadline_core::errors::{Categorized, ErrorCategory, InterfaceError};
use treadline_core::intake::{NewTireRequest, RequestIntake, RequestWithImages};
use treadline_core::orders::{OrderOutcome, OrderWorkflow};
use treadline_core::registry::{SupplierForm, SupplierRegistry, VehicleForm, VehicleRegistry};

#[derive(Clone)]
pub struct ApiState {
    pub approvals: Arc<ApprovalService>,
    pub orders: Arc<OrderWorkflow>,
    pub intake: Arc<RequestIntake>,
    pub suppliers: Arc<SupplierRegistry>,
    pub vehicles: Arc<VehicleRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateBody {
    pub status: String,
    pub role: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaceOrderBody {
    pub supplier_id: Option<i64>,
    pub order_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmittedResponse {
    pub id: RequestId,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: SupplierId,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: &'static str,
    pub category: ErrorCategory,
    pub retry_safe: bool,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiError {
    fn from_error<E>(operation: &'static str, error: &E) -> Self
    where
        E: Categorized + std::fmt::Display,
    {
        let correlation_id = Uuid::new_v4().to_string();
        let category = error.category();
        let interface = InterfaceError::from_error(error, correlation_id.clone());

        warn!(
            event_name = "http.request_failed",
            correlation_id = %correlation_id,
            operation,
            error_class = category.as_str(),
            error = %error,
            "request failed"
        );

        Self {
            status: StatusCode::from_u16(category.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: ApiErrorBody {
                error: error.to_string(),
                message: interface.user_message(),
                category,
                retry_safe: category.retry_safe(),
                correlation_id,
            },
        }
    }

    fn not_found(id: RequestId) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ApiErrorBody {
                error: format!("request {id} not found"),
                message: "The requested record does not exist.",
                category: ErrorCategory::NotFound,
                retry_safe: false,
                correlation_id: Uuid::new_v4().to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/requests", post(submit_request))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/status", put(update_status))
        .route("/api/v1/requests/{id}/place-order", post(place_order))
        .route("/api/v1/users/{id}/requests", get(list_user_requests))
        .route("/api/v1/vehicles", post(register_vehicle))
        .route("/api/v1/vehicles/{id}", get(get_vehicle))
        .route("/api/v1/vehicles/{id}/requests/latest", get(latest_vehicle_request))
        .route("/api/v1/suppliers", get(list_suppliers).post(create_supplier))
        .route(
            "/api/v1/suppliers/{id}",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
        .with_state(state)
}

async fn submit_request(
    State(state): State<ApiState>,
    Json(body): Json<NewTireRequest>,
) -> Result<(StatusCode, Json<SubmittedResponse>), ApiError> {
    let id = state
        .intake
        .submit(body)
        .await
        .map_err(|error| ApiError::from_error("submit_request", &error))?;
    Ok((StatusCode::CREATED, Json(SubmittedResponse { id })))
}

async fn get_request(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> Result<Json<RequestWithImages>, ApiError> {
    let id = RequestId(id);
    state
        .intake
        .get_with_images(id)
        .await
        .map_err(|error| ApiError::from_error("get_request", &error))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(id))
}

async fn update_status(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
    Json(body): Json<StatusUpdateBody>,
) -> Result<Json<TireRequest>, ApiError> {
    state
        .approvals
        .apply_status_transition(RequestId(id), &body.status, &body.role, body.notes.as_deref())
        .await
        .map(Json)
        .map_err(|error| ApiError::from_error("update_status", &error))
}

async fn place_order(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
    body: Option<Json<PlaceOrderBody>>,
) -> Result<(StatusCode, Json<OrderOutcome>), ApiError> {
    let Json(body) = body.unwrap_or_default();
    let outcome = state
        .orders
        .place_order(RequestId(id), body.supplier_id.map(SupplierId), body.order_notes.as_deref())
        .await
        .map_err(|error| ApiError::from_error("place_order", &error))?;

    let status = if outcome.is_partial() { StatusCode::INTERNAL_SERVER_ERROR } else { StatusCode::OK };
    Ok((status, Json(outcome)))
}

async fn list_user_requests(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> Result<Json<Vec<TireRequest>>, ApiError> {
    state
        .intake
        .list_for_user(UserId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_error("list_user_requests", &error))
}

/// Answered as a list of at most one request so that "no history" is an
/// empty list rather than an error.
async fn latest_vehicle_request(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> Result<Json<Vec<TireRequest>>, ApiError> {
    state
        .intake
        .latest_for_vehicle(VehicleId(id))
        .await
        .map(|latest| Json(latest.into_iter().collect()))
        .map_err(|error| ApiError::from_error("latest_vehicle_request", &error))
}

async fn register_vehicle(
    State(state): State<ApiState>,
    Json(body): Json<VehicleForm>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    let vehicle = state
        .vehicles
        .register(body)
        .await
        .map_err(|error| ApiError::from_error("register_vehicle", &error))?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

async fn get_vehicle(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> Result<Json<Vehicle>, ApiError> {
    state
        .vehicles
        .get(VehicleId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_error("get_vehicle", &error))
}

async fn list_suppliers(State(state): State<ApiState>) -> Result<Json<Vec<Supplier>>, ApiError> {
    state
        .suppliers
        .list()
        .await
        .map(Json)
        .map_err(|error| ApiError::from_error("list_suppliers", &error))
}

async fn create_supplier(
    State(state): State<ApiState>,
    Json(body): Json<SupplierForm>,
) -> Result<(StatusCode, Json<Supplier>), ApiError> {
    let supplier = state
        .suppliers
        .create(body)
        .await
        .map_err(|error| ApiError::from_error("create_supplier", &error))?;
    Ok((StatusCode::CREATED, Json(supplier)))
}

async fn get_supplier(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> Result<Json<Supplier>, ApiError> {
    state
        .suppliers
        .get(SupplierId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_error("get_supplier", &error))
}

async fn update_supplier(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
    Json(body): Json<SupplierForm>,
) -> Result<Json<Supplier>, ApiError> {
    state
        .suppliers
        .update(SupplierId(id), body)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_error("update_supplier", &error))
}

async fn delete_supplier(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = SupplierId(id);
    state
        .suppliers
        .delete(id)
        .await
        .map_err(|error| ApiError::from_error("delete_supplier", &error))?;
    Ok(Json(DeletedResponse { id }))
}
