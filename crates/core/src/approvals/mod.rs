//! Approval chain for tire requests.
//!
//! [`machine`] holds the pure transition rules. [`ApprovalService`] loads the
//! request, plans the transition and writes it with a single conditional
//! update guarded on the status that was read.

pub mod machine;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::{RequestId, TireRequest};
use crate::errors::Categorized;
use crate::store::{RequestStore, WriteOutcome};

pub use machine::{
    parse_role, parse_target, plan_transition, route_note, Role, TransitionError, TransitionPlan,
};

pub struct ApprovalService {
    store: Arc<dyn RequestStore>,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn RequestStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn apply_status_transition(
        &self,
        request_id: RequestId,
        target_status: &str,
        role: &str,
        notes: Option<&str>,
    ) -> Result<TireRequest, TransitionError> {
        let correlation_id = Uuid::new_v4().to_string();
        let result = self.transition(request_id, target_status, role, notes).await;

        match &result {
            Ok(request) => {
                info!(
                    event_name = "approval.transition_applied",
                    correlation_id = %correlation_id,
                    request_id = request_id.0,
                    role = %role,
                    status = %request.status,
                    "status transition applied"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id),
                        correlation_id,
                        "approval.transition_applied",
                        AuditCategory::Approval,
                        role,
                        AuditOutcome::Success,
                    )
                    .with_metadata("to", request.status.as_str()),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "approval.transition_rejected",
                    correlation_id = %correlation_id,
                    request_id = request_id.0,
                    role = %role,
                    target_status = %target_status,
                    error_class = error.category().as_str(),
                    error = %error,
                    "status transition rejected"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id),
                        correlation_id,
                        "approval.transition_rejected",
                        AuditCategory::Approval,
                        role,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("target_status", target_status)
                    .with_metadata("reason", error.to_string()),
                );
            }
        }

        result
    }

    async fn transition(
        &self,
        request_id: RequestId,
        target_status: &str,
        role: &str,
        notes: Option<&str>,
    ) -> Result<TireRequest, TransitionError> {
        let target = parse_target(target_status)?;
        let role = parse_role(role)?;

        let mut request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or(TransitionError::NotFound(request_id))?;

        let plan = plan_transition(&request, target, role, notes)?;
        let updated_at = Utc::now();

        match self.store.apply_transition(&plan.to_write(updated_at)).await? {
            WriteOutcome::Applied => {
                plan.apply_to(&mut request, updated_at);
                Ok(request)
            }
            WriteOutcome::Conflict => Err(TransitionError::Conflict(request_id)),
        }
    }
}
