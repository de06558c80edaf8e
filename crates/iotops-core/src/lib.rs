//! iotops Core - Core types, DTDL dependency resolution, and hub snapshots
//!
//! This crate provides the foundational types for iotops:
//! - IoT Hub registry records (configurations, device and module identities, twins)
//! - The line-delimited hub snapshot format used by state export/import
//! - DTDL model dependency resolution and the deletion-order graph
//! - Collaborator traits implemented by the REST clients

pub mod api;
pub mod dtdl;
pub mod error;
pub mod graph;
pub mod hub;
pub mod session;
pub mod snapshot;

pub use api::{HubApi, ListModelsOptions, ModelApi, PatchOperation};
pub use dtdl::{model_dependencies, ModelData};
pub use error::{ServiceError, SnapshotError};
pub use graph::DependencyGraph;
pub use hub::{
    is_system_module, Authentication, AuthenticationType, Capabilities, Configuration,
    Credentials, DeviceCreate, DeviceIdentity, ModuleCreate, ModuleIdentity, RegistryEntry,
    SymmetricKey, Twin, X509Thumbprint, SYSTEM_MODULES,
};
pub use session::{HubSession, TwinsSession};
pub use snapshot::{
    DeviceEntry, HubSnapshot, ModuleEntry, RecordKind, SnapshotReader, SnapshotRecord,
    SnapshotWriter,
};
