use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::{NoteField, OrderStatus, RequestId, RequestStatus, TireRequest};
use crate::errors::{Categorized, ErrorCategory};
use crate::store::{StoreError, TransitionWrite};

/// Caller-asserted approval authority. The core trusts it; authentication
/// happens upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Supervisor,
    TechnicalManager,
    Engineer,
    CustomerOfficer,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::TechnicalManager => "technical-manager",
            Self::Engineer => "engineer",
            Self::CustomerOfficer => "customer-officer",
            Self::User => "user",
        }
    }

    /// `technical - manager` and `Technical-Manager` both resolve to
    /// [`Role::TechnicalManager`].
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        let normalized = lowered.split('-').map(str::trim).collect::<Vec<_>>().join("-");
        match normalized.as_str() {
            "supervisor" => Some(Self::Supervisor),
            "technical-manager" => Some(Self::TechnicalManager),
            "engineer" => Some(Self::Engineer),
            "customer-officer" => Some(Self::CustomerOfficer),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RoleMatch {
    Any,
    Only(Role),
}

impl RoleMatch {
    fn matches(&self, role: Role) -> bool {
        match self {
            Self::Any => true,
            Self::Only(expected) => *expected == role,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NoteRoute {
    target: RequestStatus,
    role: RoleMatch,
    field: NoteField,
}

/// Which stage note a transition writes. Approvals route by target status
/// alone; rejections route by the rejecting role.
const NOTE_ROUTES: &[NoteRoute] = &[
    NoteRoute {
        target: RequestStatus::SupervisorApproved,
        role: RoleMatch::Any,
        field: NoteField::Supervisor,
    },
    NoteRoute {
        target: RequestStatus::Rejected,
        role: RoleMatch::Only(Role::Supervisor),
        field: NoteField::Supervisor,
    },
    NoteRoute {
        target: RequestStatus::TechnicalManagerApproved,
        role: RoleMatch::Any,
        field: NoteField::TechnicalManager,
    },
    NoteRoute {
        target: RequestStatus::Rejected,
        role: RoleMatch::Only(Role::TechnicalManager),
        field: NoteField::TechnicalManager,
    },
    NoteRoute {
        target: RequestStatus::EngineerApproved,
        role: RoleMatch::Any,
        field: NoteField::Engineer,
    },
    NoteRoute { target: RequestStatus::Complete, role: RoleMatch::Any, field: NoteField::Engineer },
    NoteRoute {
        target: RequestStatus::Rejected,
        role: RoleMatch::Only(Role::Engineer),
        field: NoteField::Engineer,
    },
];

pub fn route_note(target: RequestStatus, role: Role) -> Option<NoteField> {
    NOTE_ROUTES
        .iter()
        .find(|route| route.target == target && route.role.matches(role))
        .map(|route| route.field)
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid status `{0}`")]
    InvalidStatus(String),
    #[error("invalid role `{0}`")]
    InvalidRole(String),
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("request {request_id} is in terminal status `{status}`")]
    TerminalState { request_id: RequestId, status: RequestStatus },
    #[error("status `{0}` is set by order placement only")]
    SystemOnlyStatus(RequestStatus),
    #[error("request {request_id} has an order in status `{order_status}`")]
    OrderInFlight { request_id: RequestId, order_status: OrderStatus },
    #[error("request {0} was modified concurrently")]
    Conflict(RequestId),
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
}

impl Categorized for TransitionError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidStatus(_) | Self::InvalidRole(_) => ErrorCategory::InputValidation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::TerminalState { .. }
            | Self::SystemOnlyStatus(_)
            | Self::OrderInFlight { .. } => ErrorCategory::BusinessRule,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::PersistenceFailure(_) => ErrorCategory::Persistence,
        }
    }
}

/// A validated transition, ready to be written in one conditional update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionPlan {
    pub request_id: RequestId,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub role: Role,
    pub note: Option<(NoteField, String)>,
}

impl TransitionPlan {
    pub fn to_write(&self, updated_at: DateTime<Utc>) -> TransitionWrite {
        TransitionWrite {
            request_id: self.request_id,
            expected_status: self.from,
            status: self.to,
            note: self.note.clone(),
            updated_at,
        }
    }

    pub fn apply_to(&self, request: &mut TireRequest, updated_at: DateTime<Utc>) {
        request.status = self.to;
        if let Some((field, text)) = &self.note {
            request.notes.set(*field, text.clone());
        }
        request.updated_at = updated_at;
    }
}

pub fn parse_target(raw: &str) -> Result<RequestStatus, TransitionError> {
    RequestStatus::parse(raw).ok_or_else(|| TransitionError::InvalidStatus(raw.to_string()))
}

pub fn parse_role(raw: &str) -> Result<Role, TransitionError> {
    Role::parse(raw).ok_or_else(|| TransitionError::InvalidRole(raw.to_string()))
}

/// Decides whether `request` may move to `target` and which note field the
/// caller's notes land in. Pure; performs no I/O.
pub fn plan_transition(
    request: &TireRequest,
    target: RequestStatus,
    role: Role,
    notes: Option<&str>,
) -> Result<TransitionPlan, TransitionError> {
    if target == RequestStatus::OrderPlaced {
        return Err(TransitionError::SystemOnlyStatus(target));
    }
    if request.status.is_terminal() {
        return Err(TransitionError::TerminalState {
            request_id: request.id,
            status: request.status,
        });
    }
    if request.order.status != OrderStatus::Pending {
        return Err(TransitionError::OrderInFlight {
            request_id: request.id,
            order_status: request.order.status,
        });
    }

    let note = route_note(target, role).and_then(|field| {
        notes
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| (field, text.to_string()))
    });

    Ok(TransitionPlan { request_id: request.id, from: request.status, to: target, role, note })
}
