use crate::domain::StoreFailure;
use crate::postgres::IdentifierError;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreFailure),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("Invalid transport configuration: {0}")]
    InvalidTransportConfig(String),

    /// The broker connection failed after it was configured
    #[error("Transport error: {0}")]
    Transport(String),
}
