//! Request submission: required-field validation and creation in `pending`.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::fleet::{UserId, VehicleId};
use crate::domain::request::{
    OdometerReadings, RequestId, RequestImage, RequesterContact, TireRequest, TireSpecification,
    VehicleSnapshot,
};
use crate::errors::{Categorized, ErrorCategory};
use crate::store::{RequestStore, StoreError};

/// Submission payload as received from the request form. Every field is
/// optional on the wire so that absence can be reported by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTireRequest {
    pub user_id: Option<i64>,
    pub vehicle_id: Option<i64>,
    pub vehicle_number: Option<String>,
    pub quantity: Option<u32>,
    pub tubes_quantity: Option<u32>,
    pub tire_size: Option<String>,
    pub request_reason: Option<String>,
    pub requester_name: Option<String>,
    pub requester_email: Option<String>,
    pub requester_phone: Option<String>,
    pub year: Option<i32>,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub user_section: Option<String>,
    pub last_replacement_date: Option<NaiveDate>,
    pub existing_tire_make: Option<String>,
    pub tire_size_required: Option<String>,
    pub cost_center: Option<String>,
    pub present_km_reading: Option<i64>,
    pub previous_km_reading: Option<i64>,
    pub tire_wear_pattern: Option<String>,
    pub comments: Option<String>,
    pub images: Vec<String>,
}

/// Upload slots accepted per request.
pub const MAX_IMAGES: usize = 7;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub image_path: String,
    pub image_index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub user_id: UserId,
    pub vehicle_id: VehicleId,
    pub requester: RequesterContact,
    pub vehicle: VehicleSnapshot,
    pub tires: TireSpecification,
    pub odometer: OdometerReadings,
    pub request_reason: String,
    pub comments: Option<String>,
    pub images: Vec<ImageReference>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("{count} images supplied; at most {limit} are accepted")]
    TooManyImages { count: usize, limit: usize },
    #[error("request could not be stored: {0}")]
    Persistence(#[from] StoreError),
}

impl Categorized for SubmissionError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingField(_) | Self::TooManyImages { .. } => ErrorCategory::InputValidation,
            Self::Persistence(_) => ErrorCategory::Persistence,
        }
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, SubmissionError> {
    value.ok_or(SubmissionError::MissingField(field))
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, SubmissionError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(SubmissionError::MissingField(field)),
    }
}

impl NewTireRequest {
    /// Checks fields in form order and reports the first one missing.
    pub fn validate(self) -> Result<ValidatedSubmission, SubmissionError> {
        let user_id = required(self.user_id, "userId")?;
        let vehicle_id = required(self.vehicle_id, "vehicleId")?;
        let vehicle_number = required_text(self.vehicle_number, "vehicleNumber")?;
        let quantity = required(self.quantity, "quantity")?;
        let tubes_quantity = required(self.tubes_quantity, "tubesQuantity")?;
        let tire_size = required_text(self.tire_size, "tireSize")?;
        let request_reason = required_text(self.request_reason, "requestReason")?;
        let requester_name = required_text(self.requester_name, "requesterName")?;
        let requester_email = required_text(self.requester_email, "requesterEmail")?;
        let requester_phone = required_text(self.requester_phone, "requesterPhone")?;
        let year = required(self.year, "year")?;
        let vehicle_brand = required_text(self.vehicle_brand, "vehicleBrand")?;
        let vehicle_model = required_text(self.vehicle_model, "vehicleModel")?;
        let user_section = required_text(self.user_section, "userSection")?;
        let last_replacement_date =
            required(self.last_replacement_date, "lastReplacementDate")?;
        let existing_tire_make = required_text(self.existing_tire_make, "existingTireMake")?;
        let tire_size_required = required_text(self.tire_size_required, "tireSizeRequired")?;
        let cost_center = required_text(self.cost_center, "costCenter")?;
        let present_km = required(self.present_km_reading, "presentKmReading")?;
        let previous_km = required(self.previous_km_reading, "previousKmReading")?;
        let tire_wear_pattern = required_text(self.tire_wear_pattern, "tireWearPattern")?;

        let count = self.images.len();
        let too_many = SubmissionError::TooManyImages { count, limit: MAX_IMAGES };
        if count > MAX_IMAGES {
            return Err(too_many);
        }

        // Blank slots are skipped but keep their position in the upload order.
        let images = self
            .images
            .into_iter()
            .enumerate()
            .filter(|(_, path)| !path.trim().is_empty())
            .map(|(index, path)| {
                let image_index = u32::try_from(index).map_err(|_| too_many.clone())?;
                Ok(ImageReference { image_path: path.trim().to_string(), image_index })
            })
            .collect::<Result<Vec<_>, SubmissionError>>()?;

        Ok(ValidatedSubmission {
            user_id: UserId(user_id),
            vehicle_id: VehicleId(vehicle_id),
            requester: RequesterContact {
                name: requester_name,
                email: requester_email,
                phone: requester_phone,
                section: user_section,
                cost_center,
            },
            vehicle: VehicleSnapshot {
                vehicle_number,
                brand: vehicle_brand,
                model: vehicle_model,
                year,
            },
            tires: TireSpecification {
                tire_size,
                tire_size_required,
                quantity,
                tubes_quantity,
                existing_tire_make,
                tire_wear_pattern,
            },
            odometer: OdometerReadings { present_km, previous_km, last_replacement_date },
            request_reason,
            comments: self.comments.filter(|text| !text.trim().is_empty()),
            images,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestWithImages {
    #[serde(flatten)]
    pub request: TireRequest,
    pub images: Vec<String>,
}

pub struct RequestIntake {
    store: Arc<dyn RequestStore>,
    audit: Arc<dyn AuditSink>,
}

impl RequestIntake {
    pub fn new(store: Arc<dyn RequestStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn submit(&self, submission: NewTireRequest) -> Result<RequestId, SubmissionError> {
        let validated = submission.validate()?;
        let id = self.store.insert_request(&validated, Utc::now()).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(id),
                Uuid::new_v4().to_string(),
                "intake.request_submitted",
                AuditCategory::Intake,
                validated.requester.email.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("vehicle_number", validated.vehicle.vehicle_number.clone())
            .with_metadata("image_count", validated.images.len().to_string()),
        );

        Ok(id)
    }

    pub async fn get_with_images(
        &self,
        id: RequestId,
    ) -> Result<Option<RequestWithImages>, StoreError> {
        let Some(request) = self.store.find_request(id).await? else {
            return Ok(None);
        };
        let mut images: Vec<RequestImage> = self.store.list_images(id).await?;
        images.sort_by_key(|image| image.image_index);

        Ok(Some(RequestWithImages {
            request,
            images: images.into_iter().map(|image| image.image_path).collect(),
        }))
    }

    /// A requester's submissions, newest first.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<TireRequest>, StoreError> {
        self.store.list_requests_by_user(user_id).await
    }

    /// The request carrying the vehicle's most recent tire replacement.
    pub async fn latest_for_vehicle(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<Option<TireRequest>, StoreError> {
        self.store.latest_request_for_vehicle(vehicle_id).await
    }
}
