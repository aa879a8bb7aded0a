use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-visible failure class. Determines the HTTP status of the thin
/// transport layer and whether the whole operation may be retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InputValidation,
    NotFound,
    BusinessRule,
    Conflict,
    ExternalDependency,
    PartialFailure,
    Persistence,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputValidation => "input_validation",
            Self::NotFound => "not_found",
            Self::BusinessRule => "business_rule",
            Self::Conflict => "conflict",
            Self::ExternalDependency => "external_dependency",
            Self::PartialFailure => "partial_failure",
            Self::Persistence => "persistence",
            Self::Internal => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InputValidation | Self::BusinessRule => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::ExternalDependency => 502,
            Self::PartialFailure | Self::Persistence | Self::Internal => 500,
        }
    }

    /// True when no external side effect can have been dispatched, so the
    /// caller may repeat the operation unchanged.
    pub fn retry_safe(&self) -> bool {
        matches!(self, Self::Conflict | Self::ExternalDependency | Self::Persistence)
    }
}

pub trait Categorized {
    fn category(&self) -> ErrorCategory;

    fn retry_safe(&self) -> bool {
        self.category().retry_safe()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("upstream failure: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn from_error<E>(error: &E, correlation_id: impl Into<String>) -> Self
    where
        E: Categorized + std::fmt::Display,
    {
        let message = error.to_string();
        let correlation_id = correlation_id.into();
        match error.category() {
            ErrorCategory::InputValidation | ErrorCategory::BusinessRule => {
                Self::BadRequest { message, correlation_id }
            }
            ErrorCategory::NotFound => Self::NotFound { message, correlation_id },
            ErrorCategory::Conflict => Self::Conflict { message, correlation_id },
            ErrorCategory::ExternalDependency => Self::BadGateway { message, correlation_id },
            ErrorCategory::PartialFailure
            | ErrorCategory::Persistence
            | ErrorCategory::Internal => Self::Internal { message, correlation_id },
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => "The record changed while processing. Reload and retry.",
            Self::BadGateway { .. } => {
                "The supplier notification service is unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}
