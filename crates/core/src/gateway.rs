use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rendered supplier notification, posted as form fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    pub reply_to: String,
    pub subject: String,
    pub body: String,
}

impl OrderMessage {
    pub fn form_fields(&self) -> [(&'static str, &str); 3] {
        [
            ("email", self.reply_to.as_str()),
            ("_subject", self.subject.as_str()),
            ("message", self.body.as_str()),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReceipt {
    pub status: u16,
    pub body: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("gateway transport failure: {0}")]
    Transport(String),
    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),
}

/// External delivery service. Implementations make at most one delivery
/// attempt per call and carry no idempotency key.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        message: &OrderMessage,
    ) -> Result<GatewayReceipt, GatewayError>;
}
