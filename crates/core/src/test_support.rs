use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tokio::sync::Mutex;

use crate::domain::fleet::{User, UserId, Vehicle, VehicleDraft, VehicleId};
use crate::domain::request::{
    OdometerReadings, OrderRecord, OrderStatus, RequestId, RequestImage, RequestStatus,
    RequesterContact, StageNotes, TireRequest, TireSpecification, VehicleSnapshot,
};
use crate::domain::supplier::{Supplier, SupplierDraft, SupplierId};
use crate::gateway::{GatewayError, GatewayReceipt, NotificationGateway, OrderMessage};
use crate::intake::ValidatedSubmission;
use crate::store::{
    FleetDirectory, OrderCommit, RequestStore, StoreError, SupplierDirectory, TransitionWrite,
    WriteOutcome,
};

pub(crate) fn sample_request(id: i64, status: RequestStatus) -> TireRequest {
    let submitted_at = Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0).single().expect("valid timestamp");
    TireRequest {
        id: RequestId(id),
        user_id: UserId(1),
        vehicle_id: VehicleId(3),
        requester: RequesterContact {
            name: "Nimal Perera".to_string(),
            email: "nimal@fleet.example".to_string(),
            phone: "+94 77 123 4567".to_string(),
            section: "Logistics".to_string(),
            cost_center: "CC-410".to_string(),
        },
        vehicle: VehicleSnapshot {
            vehicle_number: "WP-CAB-4821".to_string(),
            brand: "Toyota".to_string(),
            model: "Axio".to_string(),
            year: 2019,
        },
        tires: TireSpecification {
            tire_size: "195/65R15".to_string(),
            tire_size_required: "195/65R15".to_string(),
            quantity: 4,
            tubes_quantity: 0,
            existing_tire_make: "Bridgestone".to_string(),
            tire_wear_pattern: "Even".to_string(),
        },
        odometer: OdometerReadings {
            present_km: 84_200,
            previous_km: 41_950,
            last_replacement_date: NaiveDate::from_ymd_opt(2023, 8, 1).expect("valid date"),
        },
        request_reason: "Tread below legal limit".to_string(),
        comments: None,
        status,
        notes: StageNotes::default(),
        order: OrderRecord::default(),
        submitted_at,
        updated_at: submitted_at,
    }
}

pub(crate) fn sample_supplier(id: i64, endpoint_key: Option<&str>) -> Supplier {
    Supplier {
        id: SupplierId(id),
        name: "Ceylon Tyre House".to_string(),
        email: "orders@ceylontyre.example".to_string(),
        phone: Some("+94 11 234 5678".to_string()),
        endpoint_key: endpoint_key.map(str::to_string),
    }
}

/// Map-backed store with the same guarded-update semantics as the SQL
/// repository.
#[derive(Default)]
pub(crate) struct FakeRequestStore {
    rows: Mutex<HashMap<RequestId, TireRequest>>,
    /// Status forced onto the row right before the next transition write.
    pub(crate) interleaved_status: Mutex<Option<RequestStatus>>,
    pub(crate) fail_commit: AtomicBool,
    pub(crate) fail_reserve: AtomicBool,
    pub(crate) fail_release: AtomicBool,
}

impl FakeRequestStore {
    pub(crate) fn with(requests: impl IntoIterator<Item = TireRequest>) -> Self {
        Self {
            rows: Mutex::new(requests.into_iter().map(|request| (request.id, request)).collect()),
            ..Self::default()
        }
    }

    pub(crate) async fn get(&self, id: RequestId) -> Option<TireRequest> {
        self.rows.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl RequestStore for FakeRequestStore {
    async fn find_request(&self, id: RequestId) -> Result<Option<TireRequest>, StoreError> {
        Ok(self.get(id).await)
    }

    async fn list_images(&self, _id: RequestId) -> Result<Vec<RequestImage>, StoreError> {
        Ok(Vec::new())
    }

    async fn list_requests_by_user(&self, user_id: UserId) -> Result<Vec<TireRequest>, StoreError> {
        let rows = self.rows.lock().await;
        let mut requests: Vec<_> =
            rows.values().filter(|request| request.user_id == user_id).cloned().collect();
        requests.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.0.cmp(&a.id.0)));
        Ok(requests)
    }

    async fn latest_request_for_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<TireRequest>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|request| request.vehicle_id == vehicle_id)
            .max_by_key(|request| (request.odometer.last_replacement_date, request.id.0))
            .cloned())
    }

    async fn insert_request(
        &self,
        _submission: &ValidatedSubmission,
        _submitted_at: DateTime<Utc>,
    ) -> Result<RequestId, StoreError> {
        Err(StoreError::Backend("insert is not supported by the fake store".to_string()))
    }

    async fn apply_transition(&self, write: &TransitionWrite) -> Result<WriteOutcome, StoreError> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows.get_mut(&write.request_id) else {
            return Ok(WriteOutcome::Conflict);
        };
        if let Some(status) = self.interleaved_status.lock().await.take() {
            row.status = status;
        }
        if row.status != write.expected_status || row.order.status != OrderStatus::Pending {
            return Ok(WriteOutcome::Conflict);
        }
        row.status = write.status;
        if let Some((field, text)) = &write.note {
            row.notes.set(*field, text.clone());
        }
        row.updated_at = write.updated_at;
        Ok(WriteOutcome::Applied)
    }

    async fn reserve_order(&self, id: RequestId) -> Result<WriteOutcome, StoreError> {
        if self.fail_reserve.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("database is locked".to_string()));
        }
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&id) {
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
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk I/O error".to_string()));
        }
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&commit.request_id) {
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
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("database is locked".to_string()));
        }
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&id) {
            Some(row) if row.order.status == OrderStatus::Dispatching => {
                row.order.status = OrderStatus::Pending;
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Conflict),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeSupplierDirectory {
    suppliers: Mutex<HashMap<SupplierId, Supplier>>,
    /// Suppliers named by a recorded order.
    referenced: Mutex<HashSet<SupplierId>>,
}

impl FakeSupplierDirectory {
    pub(crate) fn with(suppliers: impl IntoIterator<Item = Supplier>) -> Self {
        Self {
            suppliers: Mutex::new(
                suppliers.into_iter().map(|supplier| (supplier.id, supplier)).collect(),
            ),
            ..Self::default()
        }
    }

    pub(crate) async fn mark_referenced(&self, id: SupplierId) {
        self.referenced.lock().await.insert(id);
    }
}

#[async_trait]
impl SupplierDirectory for FakeSupplierDirectory {
    async fn find_supplier(&self, id: SupplierId) -> Result<Option<Supplier>, StoreError> {
        Ok(self.suppliers.lock().await.get(&id).cloned())
    }

    async fn list_suppliers(&self) -> Result<Vec<Supplier>, StoreError> {
        let mut suppliers: Vec<_> = self.suppliers.lock().await.values().cloned().collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suppliers)
    }

    async fn insert_supplier(&self, draft: &SupplierDraft) -> Result<SupplierId, StoreError> {
        let mut suppliers = self.suppliers.lock().await;
        let id = SupplierId(suppliers.keys().map(|id| id.0).max().unwrap_or(0) + 1);
        suppliers.insert(id, draft.clone().into_supplier(id));
        Ok(id)
    }

    async fn update_supplier(
        &self,
        id: SupplierId,
        draft: &SupplierDraft,
    ) -> Result<WriteOutcome, StoreError> {
        let mut suppliers = self.suppliers.lock().await;
        match suppliers.get_mut(&id) {
            Some(supplier) => {
                *supplier = draft.clone().into_supplier(id);
                Ok(WriteOutcome::Applied)
            }
            None => Ok(WriteOutcome::Conflict),
        }
    }

    async fn delete_supplier(&self, id: SupplierId) -> Result<WriteOutcome, StoreError> {
        if self.referenced.lock().await.contains(&id) {
            return Ok(WriteOutcome::Conflict);
        }
        match self.suppliers.lock().await.remove(&id) {
            Some(_) => Ok(WriteOutcome::Applied),
            None => Ok(WriteOutcome::Conflict),
        }
    }
}

/// Users are fixed at construction; vehicles are unique by number.
#[derive(Default)]
pub(crate) struct FakeFleetDirectory {
    users: HashMap<UserId, User>,
    vehicles: Mutex<HashMap<VehicleId, Vehicle>>,
}

impl FakeFleetDirectory {
    pub(crate) fn with_user(id: UserId) -> Self {
        let user = User {
            id,
            azure_id: format!("azure-{id}"),
            email: "nimal@fleet.example".to_string(),
            name: Some("Nimal Perera".to_string()),
            role: "user".to_string(),
        };
        Self { users: HashMap::from([(id, user)]), ..Self::default() }
    }
}

#[async_trait]
impl FleetDirectory for FakeFleetDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).cloned())
    }

    async fn find_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.vehicles.lock().await.get(&id).cloned())
    }

    async fn insert_vehicle(
        &self,
        draft: &VehicleDraft,
        _created_at: DateTime<Utc>,
    ) -> Result<Option<VehicleId>, StoreError> {
        let mut vehicles = self.vehicles.lock().await;
        if vehicles.values().any(|vehicle| vehicle.vehicle_number == draft.vehicle_number) {
            return Ok(None);
        }
        let id = VehicleId(vehicles.keys().map(|id| id.0).max().unwrap_or(0) + 1);
        vehicles.insert(
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

/// Records every send; answers with `response` or sleeps past any timeout
/// when `hang` is set.
pub(crate) struct RecordingGateway {
    pub(crate) sent: Mutex<Vec<(String, OrderMessage)>>,
    response: Result<GatewayReceipt, GatewayError>,
    hang: bool,
}

impl RecordingGateway {
    pub(crate) fn accepting() -> Self {
        Self::answering(Ok(GatewayReceipt { status: 200, body: r#"{"ok":true}"#.to_string() }))
    }

    pub(crate) fn answering(response: Result<GatewayReceipt, GatewayError>) -> Self {
        Self { sent: Mutex::new(Vec::new()), response, hang: false }
    }

    pub(crate) fn hanging() -> Self {
        Self { hang: true, ..Self::accepting() }
    }

    pub(crate) async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send(
        &self,
        endpoint: &str,
        message: &OrderMessage,
    ) -> Result<GatewayReceipt, GatewayError> {
        self.sent.lock().await.push((endpoint.to_string(), message.clone()));
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.response.clone()
    }
}
