//! Error types shared by the collaborator traits and the snapshot format

use thiserror::Error;

use crate::hub::AuthenticationType;
use crate::snapshot::RecordKind;

/// Failure reported by (or while talking to) an Azure data-plane service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service returned {status}: {message}")]
    Response { status: u16, message: String },
    #[error("Value is not present in body: {0}")]
    MissingValue(String),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// HTTP status code, when the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Snapshot is empty: expected the configuration list on line 1")]
    MissingConfigurations,
    #[error("Unexpected record on line {line}: expected {expected}, found {found}")]
    UnexpectedRecord {
        line: usize,
        expected: RecordKind,
        found: String,
    },
    #[error("Snapshot ended inside device '{device_id}': expected {expected}")]
    Truncated {
        device_id: String,
        expected: RecordKind,
    },
    #[error("{entity} uses {auth_type} authentication but has no {field}")]
    MissingCredential {
        entity: String,
        auth_type: AuthenticationType,
        field: &'static str,
    },
}
