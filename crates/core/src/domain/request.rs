use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::fleet::{UserId, VehicleId};
use crate::domain::supplier::SupplierId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "supervisor approved")]
    SupervisorApproved,
    #[serde(rename = "technical-manager approved")]
    TechnicalManagerApproved,
    #[serde(rename = "engineer approved")]
    EngineerApproved,
    #[serde(rename = "customer-officer approved")]
    CustomerOfficerApproved,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "rejected")]
    Rejected,
    #[serde(rename = "order placed")]
    OrderPlaced,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 9] = [
        Self::Pending,
        Self::SupervisorApproved,
        Self::TechnicalManagerApproved,
        Self::EngineerApproved,
        Self::CustomerOfficerApproved,
        Self::Approved,
        Self::Complete,
        Self::Rejected,
        Self::OrderPlaced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SupervisorApproved => "supervisor approved",
            Self::TechnicalManagerApproved => "technical-manager approved",
            Self::EngineerApproved => "engineer approved",
            Self::CustomerOfficerApproved => "customer-officer approved",
            Self::Approved => "approved",
            Self::Complete => "complete",
            Self::Rejected => "rejected",
            Self::OrderPlaced => "order placed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == normalized)
    }

    /// Closed states: no transition is modeled out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::OrderPlaced)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fulfilment state of the supplier order. `Dispatching` marks a send that
/// has been reserved by one placement attempt and not yet committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Dispatching,
    Placed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatching => "dispatching",
            Self::Placed => "placed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "dispatching" => Some(Self::Dispatching),
            "placed" => Some(Self::Placed),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub section: String,
    pub cost_center: String,
}

/// Vehicle details as captured when the request was submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub vehicle_number: String,
    pub brand: String,
    pub model: String,
    pub year: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TireSpecification {
    pub tire_size: String,
    pub tire_size_required: String,
    pub quantity: u32,
    pub tubes_quantity: u32,
    pub existing_tire_make: String,
    pub tire_wear_pattern: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OdometerReadings {
    pub present_km: i64,
    pub previous_km: i64,
    pub last_replacement_date: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteField {
    Supervisor,
    TechnicalManager,
    Engineer,
}

impl NoteField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor_notes",
            Self::TechnicalManager => "technical_manager_note",
            Self::Engineer => "engineer_note",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNotes {
    pub supervisor: Option<String>,
    pub technical_manager: Option<String>,
    pub engineer: Option<String>,
}

impl StageNotes {
    pub fn get(&self, field: NoteField) -> Option<&str> {
        match field {
            NoteField::Supervisor => self.supervisor.as_deref(),
            NoteField::TechnicalManager => self.technical_manager.as_deref(),
            NoteField::Engineer => self.engineer.as_deref(),
        }
    }

    pub fn set(&mut self, field: NoteField, value: impl Into<String>) {
        let slot = match field {
            NoteField::Supervisor => &mut self.supervisor,
            NoteField::TechnicalManager => &mut self.technical_manager,
            NoteField::Engineer => &mut self.engineer,
        };
        *slot = Some(value.into());
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub status: OrderStatus,
    pub placed_at: Option<DateTime<Utc>>,
    pub supplier_id: Option<SupplierId>,
    pub notes: Option<String>,
}

impl Default for OrderRecord {
    fn default() -> Self {
        Self { status: OrderStatus::Pending, placed_at: None, supplier_id: None, notes: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TireRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub vehicle_id: VehicleId,
    pub requester: RequesterContact,
    pub vehicle: VehicleSnapshot,
    pub tires: TireSpecification,
    pub odometer: OdometerReadings,
    pub request_reason: String,
    pub comments: Option<String>,
    pub status: RequestStatus,
    pub notes: StageNotes,
    pub order: OrderRecord,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TireRequest {
    /// `order.status` is the single source of truth for whether the supplier
    /// has been notified.
    pub fn order_placed(&self) -> bool {
        self.order.status == OrderStatus::Placed
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestImage {
    pub request_id: RequestId,
    pub image_path: String,
    pub image_index: u32,
}
