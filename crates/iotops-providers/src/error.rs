use iotops_core::{ServiceError, SnapshotError};
use thiserror::Error;

/// Errors surfaced by the providers to the command layer
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0}")]
    RequiredArgumentMissing(String),
    #[error("{0}")]
    InvalidArgumentValue(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ProviderError> = std::result::Result<T, E>;
