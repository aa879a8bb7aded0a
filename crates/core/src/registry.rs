//! Supplier and vehicle administration.
//!
//! Both registries validate an all-optional form the way intake does and
//! report the first missing field by its wire name.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::fleet::{UserId, Vehicle, VehicleDraft, VehicleId};
use crate::domain::supplier::{
    EndpointKey, EndpointKeyError, Supplier, SupplierDraft, SupplierId,
};
use crate::errors::{Categorized, ErrorCategory};
use crate::store::{FleetDirectory, StoreError, SupplierDirectory, WriteOutcome};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupplierForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(alias = "formsfree_key", alias = "formspreeKey")]
    pub endpoint_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleForm {
    pub vehicle_number: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub tire_size: Option<String>,
    pub department: Option<String>,
    pub registered_by: Option<i64>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid notification endpoint key: {0}")]
    InvalidEndpointKey(#[source] EndpointKeyError),
    #[error("supplier {0} not found")]
    SupplierNotFound(SupplierId),
    #[error("supplier {0} is named by a recorded order and cannot be deleted")]
    SupplierInUse(SupplierId),
    #[error("vehicle {0} not found")]
    VehicleNotFound(VehicleId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("a vehicle with number `{0}` already exists")]
    DuplicateVehicleNumber(String),
    #[error("registry write failed: {0}")]
    Persistence(#[from] StoreError),
}

impl Categorized for RegistryError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingField(_) | Self::InvalidEndpointKey(_) => ErrorCategory::InputValidation,
            Self::SupplierNotFound(_) | Self::VehicleNotFound(_) | Self::UserNotFound(_) => {
                ErrorCategory::NotFound
            }
            Self::SupplierInUse(_) | Self::DuplicateVehicleNumber(_) => ErrorCategory::BusinessRule,
            Self::Persistence(_) => ErrorCategory::Persistence,
        }
    }
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, RegistryError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(RegistryError::MissingField(field)),
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

impl SupplierForm {
    /// A blank endpoint key is stored as absent; a non-blank one must parse.
    pub fn validate(self) -> Result<SupplierDraft, RegistryError> {
        let name = required_text(self.name, "name")?;
        let email = required_text(self.email, "email")?;
        let endpoint_key = optional_text(self.endpoint_key);
        if let Some(raw) = endpoint_key.as_deref() {
            EndpointKey::parse(raw).map_err(RegistryError::InvalidEndpointKey)?;
        }

        Ok(SupplierDraft { name, email, phone: optional_text(self.phone), endpoint_key })
    }
}

impl VehicleForm {
    pub fn validate(self) -> Result<VehicleDraft, RegistryError> {
        let vehicle_number = required_text(self.vehicle_number, "vehicleNumber")?;
        let make = required_text(self.make, "make")?;
        let model = required_text(self.model, "model")?;
        let year = self.year.ok_or(RegistryError::MissingField("year"))?;

        Ok(VehicleDraft {
            vehicle_number,
            make,
            model,
            year,
            tire_size: optional_text(self.tire_size),
            department: optional_text(self.department),
            registered_by: self.registered_by.map(UserId),
        })
    }
}

pub struct SupplierRegistry {
    suppliers: Arc<dyn SupplierDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl SupplierRegistry {
    pub fn new(suppliers: Arc<dyn SupplierDirectory>, audit: Arc<dyn AuditSink>) -> Self {
        Self { suppliers, audit }
    }

    pub async fn list(&self) -> Result<Vec<Supplier>, RegistryError> {
        Ok(self.suppliers.list_suppliers().await?)
    }

    pub async fn get(&self, id: SupplierId) -> Result<Supplier, RegistryError> {
        self.suppliers.find_supplier(id).await?.ok_or(RegistryError::SupplierNotFound(id))
    }

    pub async fn create(&self, form: SupplierForm) -> Result<Supplier, RegistryError> {
        let draft = form.validate()?;
        let id = self.suppliers.insert_supplier(&draft).await?;
        self.record("registry.supplier_created", id, &draft);
        Ok(draft.into_supplier(id))
    }

    pub async fn update(
        &self,
        id: SupplierId,
        form: SupplierForm,
    ) -> Result<Supplier, RegistryError> {
        let draft = form.validate()?;
        match self.suppliers.update_supplier(id, &draft).await? {
            WriteOutcome::Applied => {
                self.record("registry.supplier_updated", id, &draft);
                Ok(draft.into_supplier(id))
            }
            WriteOutcome::Conflict => Err(RegistryError::SupplierNotFound(id)),
        }
    }

    pub async fn delete(&self, id: SupplierId) -> Result<(), RegistryError> {
        match self.suppliers.delete_supplier(id).await? {
            WriteOutcome::Applied => {
                let correlation_id = Uuid::new_v4().to_string();
                info!(
                    event_name = "registry.supplier_deleted",
                    correlation_id = %correlation_id,
                    supplier_id = id.0,
                    "supplier deleted"
                );
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        correlation_id,
                        "registry.supplier_deleted",
                        AuditCategory::Registry,
                        "system",
                        AuditOutcome::Success,
                    )
                    .with_metadata("supplier_id", id.to_string()),
                );
                Ok(())
            }
            WriteOutcome::Conflict => match self.suppliers.find_supplier(id).await? {
                Some(_) => Err(RegistryError::SupplierInUse(id)),
                None => Err(RegistryError::SupplierNotFound(id)),
            },
        }
    }

    fn record(&self, event_name: &'static str, id: SupplierId, draft: &SupplierDraft) {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name,
            correlation_id = %correlation_id,
            supplier_id = id.0,
            endpoint_key_configured = draft.endpoint_key.is_some(),
            "supplier saved"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                correlation_id,
                event_name,
                AuditCategory::Registry,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("supplier_id", id.to_string())
            .with_metadata("name", draft.name.clone()),
        );
    }
}

pub struct VehicleRegistry {
    fleet: Arc<dyn FleetDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl VehicleRegistry {
    pub fn new(fleet: Arc<dyn FleetDirectory>, audit: Arc<dyn AuditSink>) -> Self {
        Self { fleet, audit }
    }

    pub async fn get(&self, id: VehicleId) -> Result<Vehicle, RegistryError> {
        self.fleet.find_vehicle(id).await?.ok_or(RegistryError::VehicleNotFound(id))
    }

    /// Registers a vehicle under a number no other vehicle holds.
    pub async fn register(&self, form: VehicleForm) -> Result<Vehicle, RegistryError> {
        let draft = form.validate()?;
        if let Some(user_id) = draft.registered_by {
            if self.fleet.find_user(user_id).await?.is_none() {
                return Err(RegistryError::UserNotFound(user_id));
            }
        }

        let Some(id) = self.fleet.insert_vehicle(&draft, Utc::now()).await? else {
            return Err(RegistryError::DuplicateVehicleNumber(draft.vehicle_number));
        };

        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "registry.vehicle_registered",
            correlation_id = %correlation_id,
            vehicle_id = id.0,
            vehicle_number = %draft.vehicle_number,
            "vehicle registered"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                correlation_id,
                "registry.vehicle_registered",
                AuditCategory::Registry,
                draft.registered_by.map_or_else(|| "system".to_string(), |user| user.to_string()),
                AuditOutcome::Success,
            )
            .with_metadata("vehicle_id", id.to_string())
            .with_metadata("vehicle_number", draft.vehicle_number.clone()),
        );

        Ok(Vehicle {
            id,
            vehicle_number: draft.vehicle_number,
            make: draft.make,
            model: draft.model,
            year: draft.year,
            tire_size: draft.tire_size,
            department: draft.department,
            registered_by: draft.registered_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::audit::{AuditCategory, InMemoryAuditSink};
    use crate::domain::fleet::{UserId, VehicleId};
    use crate::domain::supplier::{EndpointKeyError, SupplierId};
    use crate::errors::{Categorized, ErrorCategory};
    use crate::test_support::{sample_supplier, FakeFleetDirectory, FakeSupplierDirectory};

    use super::{RegistryError, SupplierForm, SupplierRegistry, VehicleForm, VehicleRegistry};

    fn supplier_form() -> SupplierForm {
        SupplierForm {
            name: Some(" Galle Tyre Mart ".to_string()),
            email: Some("desk@galletyre.example".to_string()),
            phone: Some("   ".to_string()),
            endpoint_key: Some("https://formspree.io/f/mgalle01".to_string()),
        }
    }

    fn vehicle_form(number: &str) -> VehicleForm {
        VehicleForm {
            vehicle_number: Some(number.to_string()),
            make: Some("Toyota".to_string()),
            model: Some("HiAce".to_string()),
            year: Some(2021),
            tire_size: Some("195R15C".to_string()),
            department: None,
            registered_by: Some(1),
        }
    }

    #[test]
    fn supplier_form_trims_fields_and_checks_the_endpoint_key() {
        let draft = supplier_form().validate().expect("valid form");
        assert_eq!(draft.name, "Galle Tyre Mart");
        assert_eq!(draft.phone, None);
        assert_eq!(draft.endpoint_key.as_deref(), Some("https://formspree.io/f/mgalle01"));

        let blank_key = SupplierForm { endpoint_key: Some(" ".to_string()), ..supplier_form() };
        assert_eq!(blank_key.validate().expect("blank key").endpoint_key, None);

        let bad_key = SupplierForm { endpoint_key: Some("abc-123".to_string()), ..supplier_form() };
        let error = bad_key.validate().expect_err("malformed key");
        assert!(matches!(error, RegistryError::InvalidEndpointKey(EndpointKeyError::Malformed(_))));
        assert_eq!(error.category(), ErrorCategory::InputValidation);
    }

    #[test]
    fn supplier_form_accepts_the_legacy_key_field_name() {
        let form: SupplierForm = serde_json::from_str(
            r#"{"name": "Kandy Wheel Centre", "email": "sales@kandywheel.example", "formsfree_key": "xkandy"}"#,
        )
        .expect("decode form");
        assert_eq!(form.endpoint_key.as_deref(), Some("xkandy"));
    }

    #[tokio::test]
    async fn supplier_lifecycle_reports_missing_suppliers() {
        let audit = InMemoryAuditSink::default();
        let registry = SupplierRegistry::new(
            Arc::new(FakeSupplierDirectory::default()),
            Arc::new(audit.clone()),
        );

        let created = registry.create(supplier_form()).await.expect("create");
        let renamed = SupplierForm { name: Some("Galle Tyre Mart (Pvt)".to_string()), ..supplier_form() };
        let updated = registry.update(created.id, renamed).await.expect("update");
        assert_eq!(updated.name, "Galle Tyre Mart (Pvt)");
        assert_eq!(registry.get(created.id).await.expect("get").name, "Galle Tyre Mart (Pvt)");

        assert_eq!(
            registry.update(SupplierId(404), supplier_form()).await,
            Err(RegistryError::SupplierNotFound(SupplierId(404)))
        );

        registry.delete(created.id).await.expect("delete");
        assert_eq!(
            registry.delete(created.id).await,
            Err(RegistryError::SupplierNotFound(created.id))
        );
        assert!(registry.list().await.expect("list").is_empty());

        let events = audit.events_of_type("registry.supplier_created");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, AuditCategory::Registry);
        assert_eq!(audit.events_of_type("registry.supplier_deleted").len(), 1);
    }

    #[tokio::test]
    async fn supplier_named_by_an_order_cannot_be_deleted() {
        let directory = FakeSupplierDirectory::with([sample_supplier(7, Some("xseedkey"))]);
        directory.mark_referenced(SupplierId(7)).await;
        let registry =
            SupplierRegistry::new(Arc::new(directory), Arc::new(InMemoryAuditSink::default()));

        let error = registry.delete(SupplierId(7)).await.expect_err("in use");
        assert_eq!(error, RegistryError::SupplierInUse(SupplierId(7)));
        assert_eq!(error.category(), ErrorCategory::BusinessRule);
        assert!(registry.get(SupplierId(7)).await.is_ok());
    }

    #[test]
    fn vehicle_number_is_required_first() {
        let form = VehicleForm { vehicle_number: Some(" ".to_string()), make: None, ..vehicle_form("") };
        assert_eq!(form.validate(), Err(RegistryError::MissingField("vehicleNumber")));

        let form = VehicleForm { year: None, ..vehicle_form("WP-KA-1002") };
        assert_eq!(form.validate(), Err(RegistryError::MissingField("year")));
    }

    #[tokio::test]
    async fn duplicate_vehicle_number_is_a_business_rule_error() {
        let audit = InMemoryAuditSink::default();
        let registry =
            VehicleRegistry::new(Arc::new(FakeFleetDirectory::with_user(UserId(1))), Arc::new(audit.clone()));

        let vehicle = registry.register(vehicle_form(" WP-KA-1002 ")).await.expect("register");
        assert_eq!(vehicle.vehicle_number, "WP-KA-1002");
        assert_eq!(registry.get(vehicle.id).await.expect("get"), vehicle);

        let error = registry.register(vehicle_form("WP-KA-1002")).await.expect_err("duplicate");
        assert_eq!(error, RegistryError::DuplicateVehicleNumber("WP-KA-1002".to_string()));
        assert_eq!(error.category().http_status(), 400);
        assert_eq!(audit.events_of_type("registry.vehicle_registered").len(), 1);
    }

    #[tokio::test]
    async fn vehicle_registered_by_an_unknown_user_is_refused() {
        let registry = VehicleRegistry::new(
            Arc::new(FakeFleetDirectory::with_user(UserId(1))),
            Arc::new(InMemoryAuditSink::default()),
        );

        let form = VehicleForm { registered_by: Some(9), ..vehicle_form("WP-KA-1003") };
        assert_eq!(registry.register(form).await, Err(RegistryError::UserNotFound(UserId(9))));
        assert_eq!(
            registry.get(VehicleId(1)).await,
            Err(RegistryError::VehicleNotFound(VehicleId(1)))
        );
    }
}
