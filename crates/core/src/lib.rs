pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod intake;
pub mod orders;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use approvals::{ApprovalService, Role, TransitionError, TransitionPlan};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::fleet::{User, UserId, Vehicle, VehicleDraft, VehicleId};
pub use domain::request::{
    NoteField, OrderStatus, RequestId, RequestImage, RequestStatus, StageNotes, TireRequest,
};
pub use domain::supplier::{EndpointKey, EndpointKeyError, Supplier, SupplierDraft, SupplierId};
pub use errors::{Categorized, ErrorCategory, InterfaceError};
pub use gateway::{GatewayError, GatewayReceipt, NotificationGateway, OrderMessage};
pub use intake::{NewTireRequest, RequestIntake, RequestWithImages, SubmissionError};
pub use orders::{OrderError, OrderOutcome, OrderWorkflow, OrderWorkflowConfig};
pub use registry::{RegistryError, SupplierForm, SupplierRegistry, VehicleForm, VehicleRegistry};
pub use store::{FleetDirectory, RequestStore, StoreError, SupplierDirectory, WriteOutcome};
