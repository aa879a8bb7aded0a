//! Storage contracts the approval and order cores depend on.
//!
//! Every mutating call is a single-row conditional update: it reports
//! [`WriteOutcome::Conflict`] instead of overwriting when the row no longer
//! matches the state the caller read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::fleet::{User, UserId, Vehicle, VehicleDraft, VehicleId};
use crate::domain::request::{NoteField, RequestId, RequestImage, RequestStatus, TireRequest};
use crate::domain::supplier::{Supplier, SupplierDraft, SupplierId};
use crate::errors::{Categorized, ErrorCategory};
use crate::intake::ValidatedSubmission;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
}

impl Categorized for StoreError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Persistence
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Exactly one row matched the guard and was updated.
    Applied,
    /// No row matched the guard; nothing was written.
    Conflict,
}

/// Status change produced by the approval state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionWrite {
    pub request_id: RequestId,
    pub expected_status: RequestStatus,
    pub status: RequestStatus,
    pub note: Option<(NoteField, String)>,
    pub updated_at: DateTime<Utc>,
}

/// Durable record of a successful supplier notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderCommit {
    pub request_id: RequestId,
    pub supplier_id: SupplierId,
    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_request(&self, id: RequestId) -> Result<Option<TireRequest>, StoreError>;

    async fn list_images(&self, id: RequestId) -> Result<Vec<RequestImage>, StoreError>;

    /// Newest submission first.
    async fn list_requests_by_user(&self, user_id: UserId) -> Result<Vec<TireRequest>, StoreError>;

    /// The request with the most recent last-replacement date.
    async fn latest_request_for_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<TireRequest>, StoreError>;

    async fn insert_request(
        &self,
        submission: &ValidatedSubmission,
        submitted_at: DateTime<Utc>,
    ) -> Result<RequestId, StoreError>;

    /// Guarded on `status = expected_status AND order_status = 'pending'`.
    async fn apply_transition(&self, write: &TransitionWrite) -> Result<WriteOutcome, StoreError>;

    /// `pending -> dispatching`, guarded on `status = 'complete'`.
    async fn reserve_order(&self, id: RequestId) -> Result<WriteOutcome, StoreError>;

    /// `dispatching -> placed`, also moving the request to `order placed`.
    async fn commit_order(&self, commit: &OrderCommit) -> Result<WriteOutcome, StoreError>;

    /// `dispatching -> pending` after a failed send.
    async fn release_order(&self, id: RequestId) -> Result<WriteOutcome, StoreError>;
}

#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    async fn find_supplier(&self, id: SupplierId) -> Result<Option<Supplier>, StoreError>;

    /// Ordered by name.
    async fn list_suppliers(&self) -> Result<Vec<Supplier>, StoreError>;

    async fn insert_supplier(&self, draft: &SupplierDraft) -> Result<SupplierId, StoreError>;

    /// Replaces every field. `Conflict` when the supplier does not exist.
    async fn update_supplier(
        &self,
        id: SupplierId,
        draft: &SupplierDraft,
    ) -> Result<WriteOutcome, StoreError>;

    /// Guarded on no recorded order naming the supplier. `Conflict` when the
    /// supplier does not exist or is still referenced.
    async fn delete_supplier(&self, id: SupplierId) -> Result<WriteOutcome, StoreError>;
}

#[async_trait]
pub trait FleetDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError>;

    /// `None` when the vehicle number is already registered.
    async fn insert_vehicle(
        &self,
        draft: &VehicleDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Option<VehicleId>, StoreError>;
}
