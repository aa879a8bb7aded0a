//! Order placement: notify the chosen supplier once and record that it
//! happened.
//!
//! The send is bracketed by two guarded writes on the request row. A
//! reservation (`pending -> dispatching`) makes exactly one caller the owner
//! of the send; the commit (`dispatching -> placed`) records success. A failed
//! send releases the reservation so the request stays retriable; when that
//! release cannot be written the failure is reported as
//! [`OrderError::ReservationStuck`] instead. A failed commit after a
//! successful send is reported as
//! [`OrderOutcome::PartialSuccess`] and the row keeps its reservation until an
//! operator reconciles it.

pub mod message;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::config::GatewayConfig;
use crate::domain::request::{OrderStatus, RequestId, RequestStatus, TireRequest};
use crate::domain::supplier::{EndpointKeyError, Supplier, SupplierId};
use crate::errors::{Categorized, ErrorCategory};
use crate::gateway::{GatewayError, GatewayReceipt, NotificationGateway, OrderMessage};
use crate::store::{OrderCommit, RequestStore, StoreError, SupplierDirectory, WriteOutcome};

pub use message::OrderMessageRenderer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderWorkflowConfig {
    pub gateway_base_url: String,
    pub gateway_timeout: Duration,
    pub sender_name: String,
}

impl OrderWorkflowConfig {
    pub fn from_gateway(gateway: &GatewayConfig) -> Self {
        Self {
            gateway_base_url: gateway.base_url.clone(),
            gateway_timeout: Duration::from_secs(gateway.timeout_secs),
            sender_name: gateway.sender_name.clone(),
        }
    }
}

impl Default for OrderWorkflowConfig {
    fn default() -> Self {
        Self::from_gateway(&GatewayConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    pub request_id: RequestId,
    pub supplier_id: SupplierId,
    pub placed_at: DateTime<Utc>,
    pub gateway_status: u16,
}

/// The supplier was notified but the placement could not be recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartialOrder {
    pub request_id: RequestId,
    pub supplier_id: SupplierId,
    pub dispatched_at: DateTime<Utc>,
    pub gateway_status: u16,
    pub gateway_response: String,
    pub failure: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrderOutcome {
    Placed(PlacedOrder),
    PartialSuccess(PartialOrder),
}

impl OrderOutcome {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Placed(order) => order.request_id,
            Self::PartialSuccess(order) => order.request_id,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialSuccess(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("a supplier must be chosen before placing an order")]
    MissingSupplier,
    #[error("request {0} not found")]
    RequestNotFound(RequestId),
    #[error("supplier {0} not found")]
    SupplierNotFound(SupplierId),
    #[error("request {request_id} is `{status}`; orders require status `complete`")]
    NotEligible { request_id: RequestId, status: RequestStatus },
    #[error("request {request_id} already has an order in status `{order_status}`")]
    AlreadyPlaced { request_id: RequestId, order_status: OrderStatus },
    #[error("supplier {supplier_id} cannot be notified: {source}")]
    SupplierMisconfigured {
        supplier_id: SupplierId,
        #[source]
        source: EndpointKeyError,
    },
    #[error("supplier notification for request {request_id} failed: {source}")]
    NotificationFailed {
        request_id: RequestId,
        #[source]
        source: GatewayError,
    },
    /// The send failed and the reservation could not be returned to
    /// `pending`; the row stays `dispatching` until reconciled.
    #[error(
        "supplier notification for request {request_id} failed and its reservation is stuck: {reason}"
    )]
    ReservationStuck {
        request_id: RequestId,
        supplier_id: SupplierId,
        #[source]
        source: GatewayError,
        reason: String,
    },
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
    #[error("order message could not be rendered: {0}")]
    Rendering(String),
}

impl Categorized for OrderError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingSupplier => ErrorCategory::InputValidation,
            Self::RequestNotFound(_) | Self::SupplierNotFound(_) => ErrorCategory::NotFound,
            Self::NotEligible { .. }
            | Self::AlreadyPlaced { .. }
            | Self::SupplierMisconfigured { .. } => ErrorCategory::BusinessRule,
            Self::NotificationFailed { .. } => ErrorCategory::ExternalDependency,
            Self::ReservationStuck { .. } => ErrorCategory::PartialFailure,
            Self::PersistenceFailure(_) => ErrorCategory::Persistence,
            Self::Rendering(_) => ErrorCategory::Internal,
        }
    }
}

impl From<tera::Error> for OrderError {
    fn from(error: tera::Error) -> Self {
        Self::Rendering(error.to_string())
    }
}

pub struct OrderWorkflow {
    requests: Arc<dyn RequestStore>,
    suppliers: Arc<dyn SupplierDirectory>,
    gateway: Arc<dyn NotificationGateway>,
    renderer: OrderMessageRenderer,
    config: OrderWorkflowConfig,
    audit: Arc<dyn AuditSink>,
}

struct Dispatch {
    request: TireRequest,
    supplier: Supplier,
    endpoint: String,
    message: OrderMessage,
    notes: Option<String>,
}

impl OrderWorkflow {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        suppliers: Arc<dyn SupplierDirectory>,
        gateway: Arc<dyn NotificationGateway>,
        config: OrderWorkflowConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, OrderError> {
        let renderer = OrderMessageRenderer::new(config.sender_name.clone())?;
        Ok(Self { requests, suppliers, gateway, renderer, config, audit })
    }

    pub async fn place_order(
        &self,
        request_id: RequestId,
        supplier_id: Option<SupplierId>,
        order_notes: Option<&str>,
    ) -> Result<OrderOutcome, OrderError> {
        let correlation_id = Uuid::new_v4().to_string();

        let dispatch = match self.prepare(request_id, supplier_id, order_notes).await {
            Ok(dispatch) => dispatch,
            Err(error) => {
                self.record_rejection(&correlation_id, request_id, supplier_id, &error);
                return Err(error);
            }
        };

        match self.requests.reserve_order(request_id).await {
            Ok(WriteOutcome::Applied) => {}
            Ok(WriteOutcome::Conflict) => {
                let error = self.explain_reservation_conflict(request_id).await;
                self.record_rejection(&correlation_id, request_id, supplier_id, &error);
                return Err(error);
            }
            Err(source) => {
                let error = OrderError::PersistenceFailure(source);
                self.record_rejection(&correlation_id, request_id, supplier_id, &error);
                return Err(error);
            }
        }

        info!(
            event_name = "order.dispatching",
            correlation_id = %correlation_id,
            request_id = request_id.0,
            supplier_id = dispatch.supplier.id.0,
            "sending supplier order notification"
        );

        let dispatched_at = Utc::now();
        let receipt = match self.send(&dispatch).await {
            Ok(receipt) => receipt,
            Err(source) => {
                return Err(self.release_after_failure(&correlation_id, &dispatch, source).await);
            }
        };

        let commit = OrderCommit {
            request_id,
            supplier_id: dispatch.supplier.id,
            notes: dispatch.notes.clone(),
            placed_at: Utc::now(),
        };

        match self.requests.commit_order(&commit).await {
            Ok(WriteOutcome::Applied) => {
                info!(
                    event_name = "order.placed",
                    correlation_id = %correlation_id,
                    request_id = request_id.0,
                    supplier_id = commit.supplier_id.0,
                    gateway_status = receipt.status,
                    "supplier order placed"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id),
                        correlation_id,
                        "order.placed",
                        AuditCategory::Order,
                        "system",
                        AuditOutcome::Success,
                    )
                    .with_metadata("supplier_id", commit.supplier_id.to_string())
                    .with_metadata("vehicle_number", dispatch.request.vehicle.vehicle_number),
                );
                Ok(OrderOutcome::Placed(PlacedOrder {
                    request_id,
                    supplier_id: commit.supplier_id,
                    placed_at: commit.placed_at,
                    gateway_status: receipt.status,
                }))
            }
            Ok(WriteOutcome::Conflict) => Ok(self.record_partial(
                &correlation_id,
                &commit,
                dispatched_at,
                receipt,
                "reservation was no longer held when committing".to_string(),
            )),
            Err(source) => Ok(self.record_partial(
                &correlation_id,
                &commit,
                dispatched_at,
                receipt,
                source.to_string(),
            )),
        }
    }

    /// Preconditions checked before anything is written or sent.
    async fn prepare(
        &self,
        request_id: RequestId,
        supplier_id: Option<SupplierId>,
        order_notes: Option<&str>,
    ) -> Result<Dispatch, OrderError> {
        let supplier_id = supplier_id.ok_or(OrderError::MissingSupplier)?;

        let request = self
            .requests
            .find_request(request_id)
            .await?
            .ok_or(OrderError::RequestNotFound(request_id))?;

        let supplier = self
            .suppliers
            .find_supplier(supplier_id)
            .await?
            .ok_or(OrderError::SupplierNotFound(supplier_id))?;

        check_eligibility(&request)?;

        let endpoint_key = supplier
            .endpoint_key()
            .map_err(|source| OrderError::SupplierMisconfigured { supplier_id, source })?;
        let endpoint = endpoint_key.endpoint_url(&self.config.gateway_base_url);

        let notes = order_notes.map(str::trim).filter(|text| !text.is_empty()).map(str::to_string);
        let message = self.renderer.render(&request, &supplier, notes.as_deref(), Utc::now())?;

        Ok(Dispatch { request, supplier, endpoint, message, notes })
    }

    async fn send(&self, dispatch: &Dispatch) -> Result<GatewayReceipt, GatewayError> {
        let timeout = self.config.gateway_timeout;
        match tokio::time::timeout(timeout, self.gateway.send(&dispatch.endpoint, &dispatch.message))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout)),
        }
    }

    async fn explain_reservation_conflict(&self, request_id: RequestId) -> OrderError {
        match self.requests.find_request(request_id).await {
            Ok(Some(request)) => match check_eligibility(&request) {
                Err(error) => error,
                // Eligible again by the time of the re-read: the reservation
                // was lost to a concurrent caller that has since released it.
                Ok(()) => OrderError::AlreadyPlaced {
                    request_id,
                    order_status: OrderStatus::Dispatching,
                },
            },
            Ok(None) => OrderError::RequestNotFound(request_id),
            Err(source) => OrderError::PersistenceFailure(source),
        }
    }

    async fn release_after_failure(
        &self,
        correlation_id: &str,
        dispatch: &Dispatch,
        source: GatewayError,
    ) -> OrderError {
        let request_id = dispatch.request.id;
        let supplier_id = dispatch.supplier.id;
        let stuck_reason = match self.requests.release_order(request_id).await {
            Ok(WriteOutcome::Applied) => None,
            Ok(WriteOutcome::Conflict) => {
                Some("reservation was no longer held when releasing".to_string())
            }
            Err(release_error) => Some(release_error.to_string()),
        };

        if let Some(reason) = stuck_reason {
            error!(
                event_name = "order.reservation_stuck",
                correlation_id = %correlation_id,
                request_id = request_id.0,
                supplier_id = supplier_id.0,
                reason = %reason,
                error = %source,
                "supplier notification failed and the reservation could not be released; reconcile manually"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(request_id),
                    correlation_id,
                    "order.reservation_stuck",
                    AuditCategory::Persistence,
                    "system",
                    AuditOutcome::Inconsistent,
                )
                .with_metadata("supplier_id", supplier_id.to_string())
                .with_metadata("reason", reason.clone())
                .with_metadata("error", source.to_string()),
            );
            return OrderError::ReservationStuck { request_id, supplier_id, source, reason };
        }

        warn!(
            event_name = "order.notification_failed",
            correlation_id = %correlation_id,
            request_id = request_id.0,
            supplier_id = supplier_id.0,
            error = %source,
            "supplier notification failed"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(request_id),
                correlation_id,
                "order.notification_failed",
                AuditCategory::Order,
                "system",
                AuditOutcome::Failed,
            )
            .with_metadata("supplier_id", supplier_id.to_string())
            .with_metadata("error", source.to_string()),
        );

        OrderError::NotificationFailed { request_id, source }
    }

    fn record_partial(
        &self,
        correlation_id: &str,
        commit: &OrderCommit,
        dispatched_at: DateTime<Utc>,
        receipt: GatewayReceipt,
        failure: String,
    ) -> OrderOutcome {
        error!(
            event_name = "order.partial_success",
            correlation_id = %correlation_id,
            request_id = commit.request_id.0,
            supplier_id = commit.supplier_id.0,
            dispatched_at = %dispatched_at.to_rfc3339(),
            gateway_status = receipt.status,
            gateway_response = %receipt.body,
            failure = %failure,
            "supplier was notified but the order could not be recorded; reconcile manually"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(commit.request_id),
                correlation_id,
                "order.partial_success",
                AuditCategory::Order,
                "system",
                AuditOutcome::Inconsistent,
            )
            .with_metadata("supplier_id", commit.supplier_id.to_string())
            .with_metadata("dispatched_at", dispatched_at.to_rfc3339())
            .with_metadata("gateway_status", receipt.status.to_string())
            .with_metadata("gateway_response", receipt.body.clone())
            .with_metadata("failure", failure.clone()),
        );

        OrderOutcome::PartialSuccess(PartialOrder {
            request_id: commit.request_id,
            supplier_id: commit.supplier_id,
            dispatched_at,
            gateway_status: receipt.status,
            gateway_response: receipt.body,
            failure,
        })
    }

    fn record_rejection(
        &self,
        correlation_id: &str,
        request_id: RequestId,
        supplier_id: Option<SupplierId>,
        error: &OrderError,
    ) {
        info!(
            event_name = "order.rejected",
            correlation_id = %correlation_id,
            request_id = request_id.0,
            error_class = error.category().as_str(),
            error = %error,
            "order placement refused before dispatch"
        );
        let mut event = AuditEvent::new(
            Some(request_id),
            correlation_id,
            "order.rejected",
            AuditCategory::Order,
            "system",
            AuditOutcome::Rejected,
        )
        .with_metadata("reason", error.to_string());
        if let Some(supplier_id) = supplier_id {
            event = event.with_metadata("supplier_id", supplier_id.to_string());
        }
        self.audit.emit(event);
    }
}

/// A request in `order placed`, or with any order status past `pending`,
/// reports [`OrderError::AlreadyPlaced`]; any other non-`complete` status is
/// not eligible.
fn check_eligibility(request: &TireRequest) -> Result<(), OrderError> {
    if request.order.status != OrderStatus::Pending {
        return Err(OrderError::AlreadyPlaced {
            request_id: request.id,
            order_status: request.order.status,
        });
    }
    match request.status {
        RequestStatus::Complete => Ok(()),
        RequestStatus::OrderPlaced => Err(OrderError::AlreadyPlaced {
            request_id: request.id,
            order_status: request.order.status,
        }),
        status => Err(OrderError::NotEligible { request_id: request.id, status }),
    }
}
