use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupplierId(pub i64);

impl fmt::Display for SupplierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Raw form-endpoint key as entered by an operator: either the bare token
    /// or a full form URL.
    pub endpoint_key: Option<String>,
}

impl Supplier {
    pub fn endpoint_key(&self) -> Result<EndpointKey, EndpointKeyError> {
        match self.endpoint_key.as_deref() {
            Some(raw) => EndpointKey::parse(raw),
            None => Err(EndpointKeyError::Missing),
        }
    }
}

/// Supplier fields as written by the administration surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupplierDraft {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub endpoint_key: Option<String>,
}

impl SupplierDraft {
    pub fn into_supplier(self, id: SupplierId) -> Supplier {
        Supplier {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            endpoint_key: self.endpoint_key,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointKeyError {
    #[error("supplier has no notification endpoint key configured")]
    Missing,
    #[error("notification endpoint key `{0}` is not a valid form token")]
    Malformed(String),
}

/// Canonical form token addressing one supplier's notification endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointKey(String);

impl EndpointKey {
    /// Accepts `abc123`, `https://host/f/abc123` and `https://host/f/abc123?x=y`.
    pub fn parse(raw: &str) -> Result<Self, EndpointKeyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EndpointKeyError::Missing);
        }

        let token = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let (_, tail) = trimmed
                .split_once("/f/")
                .ok_or_else(|| EndpointKeyError::Malformed(trimmed.to_string()))?;
            tail.split(|c: char| !c.is_ascii_alphanumeric()).next().unwrap_or_default()
        } else {
            trimmed
        };

        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EndpointKeyError::Malformed(trimmed.to_string()));
        }

        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn endpoint_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
