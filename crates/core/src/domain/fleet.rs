use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub i64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fleet member who owns vehicles and submits requests. Provisioned by the
/// identity provider; the approval core only reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub azure_id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub vehicle_number: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub tire_size: Option<String>,
    pub department: Option<String>,
    pub registered_by: Option<UserId>,
}

/// Validated vehicle registration, before an id is assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VehicleDraft {
    pub vehicle_number: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub tire_size: Option<String>,
    pub department: Option<String>,
    pub registered_by: Option<UserId>,
}
