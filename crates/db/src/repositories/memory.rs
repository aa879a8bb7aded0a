use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use treadline_core::domain::fleet::{User, UserId, Vehicle, VehicleDraft, VehicleId};
use treadline_core::domain::request::{
    OrderRecord, OrderStatus, RequestId, RequestImage, RequestStatus, StageNotes, TireRequest,
};
use treadline_core::domain::supplier::{Supplier, SupplierDraft, SupplierId};
use treadline_core::intake::ValidatedSubmission;
use treadline_core::store::{
    FleetDirectory, OrderCommit, RequestStore, StoreError, SupplierDirectory, TransitionWrite,
    WriteOutcome,
};

#[derive(Default)]
struct RequestTable {
    next_id: i64,
    rows: HashMap<RequestId, TireRequest>,
    images: Vec<RequestImage>,
}

/// Process-local request store. Guards are evaluated under one write lock,
/// matching the single-row conditional updates of the SQL repository.
#[derive(Default)]
pub struct InMemoryRequestRepository {
    table: RwLock<RequestTable>,
}

impl InMemoryRequestRepository {
    pub async fn get(&self, id: RequestId) -> Option<TireRequest> {
        self.table.read().await.rows.get(&id).cloned()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestRepository {
    async fn find_request(&self, id: RequestId) -> Result<Option<TireRequest>, StoreError> {
        Ok(self.get(id).await)
    }

    async fn list_images(&self, id: RequestId) -> Result<Vec<RequestImage>, StoreError> {
        let table = self.table.read().await;
        let mut images: Vec<_> =
            table.images.iter().filter(|image| image.request_id == id).cloned().collect();
        images.sort_by_key(|image| image.image_index);
        Ok(images)
    }

    async fn list_requests_by_user(&self, user_id: UserId) -> Result<Vec<TireRequest>, StoreError> {
        let table = self.table.read().await;
        let mut requests: Vec<_> =
            table.rows.values().filter(|request| request.user_id == user_id).cloned().collect();
        requests.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.0.cmp(&a.id.0)));
        Ok(requests)
    }

    async fn latest_request_for_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<TireRequest>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|request| request.vehicle_id == vehicle_id)
            .max_by_key(|request| (request.odometer.last_replacement_date, request.id.0))
            .cloned())
    }

    async fn insert_request(
        &self,
        submission: &ValidatedSubmission,
        submitted_at: DateTime<Utc>,
    ) -> Result<RequestId, StoreError> {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let id = RequestId(table.next_id);

        table.rows.insert(
            id,
            TireRequest {
                id,
                user_id: submission.user_id,
                vehicle_id: submission.vehicle_id,
                requester: submission.requester.clone(),
                vehicle: submission.vehicle.clone(),
                tires: submission.tires.clone(),
                odometer: submission.odometer.clone(),
                request_reason: submission.request_reason.clone(),
                comments: submission.comments.clone(),
                status: RequestStatus::Pending,
                notes: StageNotes::default(),
                order: OrderRecord::default(),
                submitted_at,
                updated_at: submitted_at,
            },
        );
        table.images.extend(submission.images.iter().map(|image| RequestImage {
            request_id: id,
            image_path: image.image_path.clone(),
            image_index: image.image_index,
        }));

        Ok(id)
    }

    async fn apply_transition(&self, write: &TransitionWrite) -> Result<WriteOutcome, StoreError> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&write.request_id) {
            Some(row)
                if row.status == write.expected_status
                    && row.order.status == OrderStatus::Pending =>
            {
                row.status = write.status;
                if let Some((field, text)) = &write.note {
                    row.notes.set(*field, text.clone());
                }
                row.updated_at = write.updated_at;
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Conflict),
        }
    }

    async fn reserve_order(&self, id: RequestId) -> Result<WriteOutcome, StoreError> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(row)
                if row.status == RequestStatus::Complete
                    && row.order.status == OrderStatus::Pending =>
            {
                row.order.status = OrderStatus::Dispatching;
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Conflict),
        }
    }

    async fn commit_order(&self, commit: &OrderCommit) -> Result<WriteOutcome, StoreError> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&commit.request_id) {
            Some(row) if row.order.status == OrderStatus::Dispatching => {
                row.order = OrderRecord {
                    status: OrderStatus::Placed,
                    placed_at: Some(commit.placed_at),
                    supplier_id: Some(commit.supplier_id),
                    notes: commit.notes.clone(),
                };
                row.status = RequestStatus::OrderPlaced;
                row.updated_at = commit.placed_at;
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Conflict),
        }
    }

    async fn release_order(&self, id: RequestId) -> Result<WriteOutcome, StoreError> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(row) if row.order.status == OrderStatus::Dispatching => {
                row.order.status = OrderStatus::Pending;
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Conflict),
        }
    }
}

/// Suppliers keyed by id. Order references live in the request store, so
/// deletion here is unguarded.
#[derive(Default)]
pub struct InMemorySupplierRepository {
    suppliers: RwLock<HashMap<SupplierId, Supplier>>,
}

#[async_trait]
impl SupplierDirectory for InMemorySupplierRepository {
    async fn find_supplier(&self, id: SupplierId) -> Result<Option<Supplier>, StoreError> {
        Ok(self.suppliers.read().await.get(&id).cloned())
    }

    async fn list_suppliers(&self) -> Result<Vec<Supplier>, StoreError> {
        let mut suppliers: Vec<_> = self.suppliers.read().await.values().cloned().collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suppliers)
    }

    async fn insert_supplier(&self, draft: &SupplierDraft) -> Result<SupplierId, StoreError> {
        let mut suppliers = self.suppliers.write().await;
        let id = SupplierId(suppliers.keys().map(|id| id.0).max().unwrap_or(0) + 1);
        suppliers.insert(id, draft.clone().into_supplier(id));
        Ok(id)
    }

    async fn update_supplier(
        &self,
        id: SupplierId,
        draft: &SupplierDraft,
    ) -> Result<WriteOutcome, StoreError> {
        match self.suppliers.write().await.get_mut(&id) {
            Some(supplier) => {
                *supplier = draft.clone().into_supplier(id);
                Ok(WriteOutcome::Applied)
            }
            None => Ok(WriteOutcome::Conflict),
        }
    }

    async fn delete_supplier(&self, id: SupplierId) -> Result<WriteOutcome, StoreError> {
        match self.suppliers.write().await.remove(&id) {
            Some(_) => Ok(WriteOutcome::Applied),
            None => Ok(WriteOutcome::Conflict),
        }
    }
}

#[derive(Default)]
struct FleetTable {
    users: HashMap<UserId, User>,
    vehicles: HashMap<VehicleId, Vehicle>,
}

/// Process-local users and vehicles; vehicle numbers are unique.
#[derive(Default)]
pub struct InMemoryFleetRepository {
    table: RwLock<FleetTable>,
}

impl InMemoryFleetRepository {
    pub async fn put_user(&self, user: User) {
        self.table.write().await.users.insert(user.id, user);
    }
}

#[async_trait]
impl FleetDirectory for InMemoryFleetRepository {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.table.read().await.users.get(&id).cloned())
    }

    async fn find_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.table.read().await.vehicles.get(&id).cloned())
    }

    async fn insert_vehicle(
        &self,
        draft: &VehicleDraft,
        _created_at: DateTime<Utc>,
    ) -> Result<Option<VehicleId>, StoreError> {
        let mut table = self.table.write().await;
        if table.vehicles.values().any(|vehicle| vehicle.vehicle_number == draft.vehicle_number) {
            return Ok(None);
        }
        let id = VehicleId(table.vehicles.keys().map(|id| id.0).max().unwrap_or(0) + 1);
        table.vehicles.insert(
            id,
            Vehicle {
                id,
                vehicle_number: draft.vehicle_number.clone(),
                make: draft.make.clone(),
                model: draft.model.clone(),
                year: draft.year,
                tire_size: draft.tire_size.clone(),
                department: draft.department.clone(),
                registered_by: draft.registered_by,
            },
        );
        Ok(Some(id))
    }
}
