use thiserror::Error;

use treadline_core::store::StoreError;

pub mod fleet;
pub mod memory;
pub mod request;
pub mod supplier;

pub use fleet::SqlFleetRepository;
pub use memory::{
    InMemoryFleetRepository, InMemoryRequestRepository, InMemorySupplierRepository,
};
pub use request::SqlRequestRepository;
pub use supplier::SqlSupplierRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(source) => Self::Backend(source.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
