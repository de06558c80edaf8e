//! Collaborator traits for the IoT Hub and Digital Twins data planes
//!
//! The providers only talk to the services through these traits; the REST
//! clients in `iotops-rest` implement them, and tests use in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dtdl::ModelData;
use crate::error::ServiceError;
use crate::hub::{
    Configuration, DeviceCreate, DeviceIdentity, ModuleCreate, ModuleIdentity, RegistryEntry,
    Twin,
};
use crate::session::{HubSession, TwinsSession};

/// IoT Hub registry, twin, and configuration operations
#[async_trait]
pub trait HubApi: Send + Sync {
    async fn list_configurations(&self, hub: &HubSession)
        -> Result<Vec<Configuration>, ServiceError>;

    async fn create_configuration(
        &self,
        hub: &HubSession,
        configuration: &Configuration,
    ) -> Result<(), ServiceError>;

    async fn delete_configuration(&self, hub: &HubSession, id: &str) -> Result<(), ServiceError>;

    /// All device identities, in listing order
    async fn list_devices(&self, hub: &HubSession) -> Result<Vec<DeviceIdentity>, ServiceError>;

    async fn show_device(
        &self,
        hub: &HubSession,
        device_id: &str,
    ) -> Result<RegistryEntry, ServiceError>;

    async fn create_device(&self, hub: &HubSession, device: &DeviceCreate)
        -> Result<(), ServiceError>;

    async fn delete_device(&self, hub: &HubSession, device_id: &str) -> Result<(), ServiceError>;

    async fn get_device_twin(&self, hub: &HubSession, device_id: &str)
        -> Result<Twin, ServiceError>;

    async fn replace_device_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        twin: &Twin,
    ) -> Result<(), ServiceError>;

    /// All modules of a device, system modules included
    async fn list_modules(
        &self,
        hub: &HubSession,
        device_id: &str,
    ) -> Result<Vec<ModuleIdentity>, ServiceError>;

    async fn show_module(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
    ) -> Result<RegistryEntry, ServiceError>;

    async fn create_module(&self, hub: &HubSession, module: &ModuleCreate)
        -> Result<(), ServiceError>;

    async fn get_module_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
    ) -> Result<Twin, ServiceError>;

    async fn replace_module_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
        twin: &Twin,
    ) -> Result<(), ServiceError>;
}

/// Options for listing Digital Twins models
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListModelsOptions {
    pub include_definition: bool,
    /// Restrict the listing to these models and their dependencies
    pub dependencies_for: Vec<String>,
    pub max_items_per_page: Option<u32>,
}

/// One JSON-patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: "replace".to_string(),
            path: path.into(),
            value,
        }
    }
}

/// Digital Twins model operations
#[async_trait]
pub trait ModelApi: Send + Sync {
    /// Upload a batch of model definitions, returning the service response
    async fn add_models(&self, dt: &TwinsSession, models: &[Value]) -> Result<Value, ServiceError>;

    async fn get_model(
        &self,
        dt: &TwinsSession,
        id: &str,
        include_definition: bool,
    ) -> Result<ModelData, ServiceError>;

    /// Every page of the listing, concatenated
    async fn list_models(
        &self,
        dt: &TwinsSession,
        options: &ListModelsOptions,
    ) -> Result<Vec<ModelData>, ServiceError>;

    async fn update_model(
        &self,
        dt: &TwinsSession,
        id: &str,
        patch: &[PatchOperation],
    ) -> Result<(), ServiceError>;

    async fn delete_model(&self, dt: &TwinsSession, id: &str) -> Result<(), ServiceError>;
}
