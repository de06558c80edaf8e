//! In-memory hub and Digital Twins fakes for provider tests

use async_trait::async_trait;
use iotops_core::{
    Authentication, AuthenticationType, Capabilities, Configuration, Credentials, DeviceCreate,
    DeviceIdentity, HubApi, HubSession, ListModelsOptions, ModelApi, ModelData, ModuleCreate,
    ModuleIdentity, PatchOperation, RegistryEntry, ServiceError, SymmetricKey, Twin,
    TwinsSession, X509Thumbprint,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

fn not_found(what: &str) -> ServiceError {
    ServiceError::Response {
        status: 404,
        message: format!("{} not found", what),
    }
}

/// A device identity shaped like a registry listing entry
pub fn sas_device(device_id: &str, edge: bool) -> DeviceIdentity {
    let mut extra = Map::new();
    extra.insert("etag".into(), json!("AAAAAAAAAAE="));
    extra.insert("connectionState".into(), json!("Disconnected"));
    DeviceIdentity {
        device_id: device_id.to_string(),
        authentication_type: AuthenticationType::Sas,
        capabilities: Capabilities {
            iot_edge: edge,
            extra: Map::new(),
        },
        status: Some("enabled".to_string()),
        status_reason: None,
        num_modules: None,
        symmetric_key: None,
        x509_thumbprint: Some(X509Thumbprint::default()),
        extra,
    }
}

/// A self-signed device whose listing carries its primary thumbprint
pub fn self_signed_device(device_id: &str, thumbprint: &str) -> DeviceIdentity {
    let mut device = sas_device(device_id, false);
    device.authentication_type = AuthenticationType::SelfSigned;
    device.x509_thumbprint = Some(thumbprint_of(thumbprint));
    device
}

/// A module identity shaped like a module listing entry
pub fn sas_module(device_id: &str, module_id: &str) -> ModuleIdentity {
    listed_module(
        device_id,
        module_id,
        json!({"type": "sas", "symmetricKey": keys_for(module_id)}),
    )
}

/// A self-signed module; the thumbprint is only reported by "show"
pub fn self_signed_module(device_id: &str, module_id: &str, thumbprint: &str) -> ModuleIdentity {
    listed_module(
        device_id,
        module_id,
        json!({"type": "selfSigned", "x509Thumbprint": thumbprint_of(thumbprint)}),
    )
}

fn listed_module(device_id: &str, module_id: &str, authentication: Value) -> ModuleIdentity {
    let mut extra = Map::new();
    extra.insert("generation_id".into(), json!("637000000000000000"));
    extra.insert("connection_state".into(), json!("Disconnected"));
    extra.insert("last_activity_time".into(), json!("0001-01-01T00:00:00Z"));
    extra.insert(
        "connection_state_updated_time".into(),
        json!("0001-01-01T00:00:00Z"),
    );
    extra.insert("authentication".into(), authentication);
    ModuleIdentity {
        module_id: module_id.to_string(),
        device_id: device_id.to_string(),
        authentication_type: None,
        symmetric_key: None,
        x509_thumbprint: None,
        extra,
    }
}

fn keys_for(id: &str) -> SymmetricKey {
    SymmetricKey {
        primary_key: Some(format!("{}-primary", id)),
        secondary_key: Some(format!("{}-secondary", id)),
    }
}

pub fn thumbprint_of(primary: &str) -> X509Thumbprint {
    X509Thumbprint {
        primary_thumbprint: Some(primary.to_string()),
        secondary_thumbprint: None,
    }
}

fn authentication_for(credentials: &Credentials) -> Value {
    match credentials {
        Credentials::SymmetricKey(key) => json!({"type": "sas", "symmetricKey": key}),
        Credentials::X509Thumbprint(thumbprint) => {
            json!({"type": "selfSigned", "x509Thumbprint": thumbprint})
        }
        Credentials::CertificateAuthority => json!({"type": "certificateAuthority"}),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCall {
    ListConfigurations,
    CreateConfiguration(String),
    DeleteConfiguration(String),
    ListDevices,
    ShowDevice(String),
    CreateDevice(String),
    DeleteDevice(String),
    GetDeviceTwin(String),
    ReplaceDeviceTwin(String),
    ListModules(String),
    ShowModule(String, String),
    CreateModule(String, String),
    GetModuleTwin(String, String),
    ReplaceModuleTwin(String, String),
}

impl HubCall {
    fn is_read(&self) -> bool {
        matches!(
            self,
            Self::ShowDevice(_)
                | Self::GetDeviceTwin(_)
                | Self::ListModules(_)
                | Self::ShowModule(..)
                | Self::GetModuleTwin(..)
        )
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::CreateConfiguration(_)
                | Self::DeleteConfiguration(_)
                | Self::CreateDevice(_)
                | Self::DeleteDevice(_)
                | Self::ReplaceDeviceTwin(_)
                | Self::CreateModule(..)
                | Self::ReplaceModuleTwin(..)
        )
    }
}

#[derive(Default)]
struct HubState {
    configurations: Vec<Configuration>,
    devices: Vec<(DeviceIdentity, Vec<ModuleIdentity>)>,
    created_devices: Vec<DeviceCreate>,
    created_modules: Vec<ModuleCreate>,
    device_twins: BTreeMap<String, Twin>,
    module_twins: BTreeMap<(String, String), Twin>,
    calls: Vec<(String, HubCall)>,
    failing_twins: BTreeSet<String>,
}

/// One in-memory registry shared by every session
#[derive(Default)]
pub struct FakeHub {
    state: Mutex<HubState>,
}

impl FakeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_configuration(&self, id: &str) {
        let configuration = serde_json::from_value(json!({
            "id": id,
            "content": {"deviceContent": {"properties.desired.x": 1}, "modulesContent": null},
            "targetCondition": "tags.env='prod'",
            "priority": 10,
            "labels": {"team": "ops"},
            "metrics": {"queries": {}, "results": {}},
            "etag": "MQ==",
        }))
        .unwrap();
        self.state.lock().unwrap().configurations.push(configuration);
    }

    pub fn add_device(&self, device: DeviceIdentity, modules: Vec<ModuleIdentity>) {
        self.state.lock().unwrap().devices.push((device, modules));
    }

    pub fn fail_twin_for(&self, device_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_twins
            .insert(device_id.to_string());
    }

    /// Mutating and listing calls, without per-entity reads
    pub fn calls(&self) -> Vec<HubCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(_, call)| call.clone())
            .filter(|call| !call.is_read())
            .collect()
    }

    /// Every call with the name of the hub session it was made on
    pub fn sessions(&self) -> Vec<(String, HubCall)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created_devices(&self) -> Vec<DeviceCreate> {
        self.state.lock().unwrap().created_devices.clone()
    }

    pub fn created_modules(&self) -> Vec<ModuleCreate> {
        self.state.lock().unwrap().created_modules.clone()
    }

    /// The twin last written with `replace_device_twin`
    pub fn device_twin(&self, device_id: &str) -> Option<Twin> {
        self.state
            .lock()
            .unwrap()
            .device_twins
            .get(device_id)
            .cloned()
    }

    pub fn module_twin(&self, device_id: &str, module_id: &str) -> Option<Twin> {
        self.state
            .lock()
            .unwrap()
            .module_twins
            .get(&(device_id.to_string(), module_id.to_string()))
            .cloned()
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .devices
            .iter()
            .map(|(device, _)| device.device_id.clone())
            .collect()
    }

    fn record(&self, hub: &HubSession, call: HubCall) {
        self.state
            .lock()
            .unwrap()
            .calls
            .push((hub.name.clone(), call));
    }

    fn device(&self, device_id: &str) -> Result<(DeviceIdentity, Vec<ModuleIdentity>), ServiceError> {
        self.state
            .lock()
            .unwrap()
            .devices
            .iter()
            .find(|(device, _)| device.device_id == device_id)
            .cloned()
            .ok_or_else(|| not_found(device_id))
    }

    fn module(&self, device_id: &str, module_id: &str) -> Result<ModuleIdentity, ServiceError> {
        self.device(device_id)?
            .1
            .into_iter()
            .find(|module| module.module_id == module_id)
            .ok_or_else(|| not_found(module_id))
    }

    /// The `authentication` block a module was listed with
    fn module_authentication(
        &self,
        device_id: &str,
        module_id: &str,
    ) -> Result<Authentication, ServiceError> {
        let module = self.module(device_id, module_id)?;
        let block = module.extra.get("authentication").cloned().unwrap_or_default();
        Ok(serde_json::from_value(block).unwrap_or_default())
    }
}

#[async_trait]
impl HubApi for FakeHub {
    async fn list_configurations(
        &self,
        hub: &HubSession,
    ) -> Result<Vec<Configuration>, ServiceError> {
        self.record(hub, HubCall::ListConfigurations);
        Ok(self.state.lock().unwrap().configurations.clone())
    }

    async fn create_configuration(
        &self,
        hub: &HubSession,
        configuration: &Configuration,
    ) -> Result<(), ServiceError> {
        self.record(hub, HubCall::CreateConfiguration(configuration.id.clone()));
        let mut state = self.state.lock().unwrap();
        state.configurations.retain(|c| c.id != configuration.id);
        state.configurations.push(configuration.clone());
        Ok(())
    }

    async fn delete_configuration(&self, hub: &HubSession, id: &str) -> Result<(), ServiceError> {
        self.record(hub, HubCall::DeleteConfiguration(id.to_string()));
        self.state
            .lock()
            .unwrap()
            .configurations
            .retain(|c| c.id != id);
        Ok(())
    }

    async fn list_devices(&self, hub: &HubSession) -> Result<Vec<DeviceIdentity>, ServiceError> {
        self.record(hub, HubCall::ListDevices);
        Ok(self
            .state
            .lock()
            .unwrap()
            .devices
            .iter()
            .map(|(device, _)| device.clone())
            .collect())
    }

    async fn show_device(
        &self,
        hub: &HubSession,
        device_id: &str,
    ) -> Result<RegistryEntry, ServiceError> {
        self.record(hub, HubCall::ShowDevice(device_id.to_string()));
        let (device, _) = self.device(device_id)?;
        Ok(RegistryEntry {
            authentication: Authentication {
                auth_type: Some(device.authentication_type),
                symmetric_key: Some(keys_for(device_id)),
                x509_thumbprint: Some(X509Thumbprint::default()),
            },
            extra: Map::new(),
        })
    }

    async fn create_device(
        &self,
        hub: &HubSession,
        device: &DeviceCreate,
    ) -> Result<(), ServiceError> {
        self.record(hub, HubCall::CreateDevice(device.device_id.clone()));
        let mut identity = sas_device(&device.device_id, device.edge_enabled);
        identity.authentication_type = device.credentials.auth_type();

        let mut state = self.state.lock().unwrap();
        state.created_devices.push(device.clone());
        if !state
            .devices
            .iter()
            .any(|(existing, _)| existing.device_id == device.device_id)
        {
            state.devices.push((identity, Vec::new()));
        }
        Ok(())
    }

    async fn delete_device(&self, hub: &HubSession, device_id: &str) -> Result<(), ServiceError> {
        self.record(hub, HubCall::DeleteDevice(device_id.to_string()));
        self.state
            .lock()
            .unwrap()
            .devices
            .retain(|(device, _)| device.device_id != device_id);
        Ok(())
    }

    async fn get_device_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
    ) -> Result<Twin, ServiceError> {
        self.record(hub, HubCall::GetDeviceTwin(device_id.to_string()));
        if self.state.lock().unwrap().failing_twins.contains(device_id) {
            return Err(ServiceError::Response {
                status: 500,
                message: "twin unavailable".to_string(),
            });
        }
        if let Some(twin) = self.state.lock().unwrap().device_twins.get(device_id) {
            return Ok(twin.clone());
        }
        let (device, _) = self.device(device_id)?;
        Ok(Twin(json!({
            "deviceId": device_id,
            "authenticationType": device.authentication_type,
            "tags": {"env": "prod"},
            "properties": {"desired": {"x": 1}, "reported": {}},
        })))
    }

    async fn replace_device_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        twin: &Twin,
    ) -> Result<(), ServiceError> {
        self.record(hub, HubCall::ReplaceDeviceTwin(device_id.to_string()));
        self.state
            .lock()
            .unwrap()
            .device_twins
            .insert(device_id.to_string(), twin.clone());
        Ok(())
    }

    async fn list_modules(
        &self,
        hub: &HubSession,
        device_id: &str,
    ) -> Result<Vec<ModuleIdentity>, ServiceError> {
        self.record(hub, HubCall::ListModules(device_id.to_string()));
        Ok(self.device(device_id)?.1)
    }

    async fn show_module(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
    ) -> Result<RegistryEntry, ServiceError> {
        self.record(
            hub,
            HubCall::ShowModule(device_id.to_string(), module_id.to_string()),
        );
        Ok(RegistryEntry {
            authentication: self.module_authentication(device_id, module_id)?,
            extra: Map::new(),
        })
    }

    async fn create_module(
        &self,
        hub: &HubSession,
        module: &ModuleCreate,
    ) -> Result<(), ServiceError> {
        self.record(
            hub,
            HubCall::CreateModule(module.device_id.clone(), module.module_id.clone()),
        );
        let mut created = sas_module(&module.device_id, &module.module_id);
        created
            .extra
            .insert("authentication".into(), authentication_for(&module.credentials));

        let mut state = self.state.lock().unwrap();
        state.created_modules.push(module.clone());
        let (_, modules) = state
            .devices
            .iter_mut()
            .find(|(device, _)| device.device_id == module.device_id)
            .ok_or_else(|| not_found(&module.device_id))?;
        if !modules.iter().any(|m| m.module_id == module.module_id) {
            modules.push(created);
        }
        Ok(())
    }

    async fn get_module_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
    ) -> Result<Twin, ServiceError> {
        self.record(
            hub,
            HubCall::GetModuleTwin(device_id.to_string(), module_id.to_string()),
        );
        let key = (device_id.to_string(), module_id.to_string());
        if let Some(twin) = self.state.lock().unwrap().module_twins.get(&key) {
            return Ok(twin.clone());
        }
        let auth_type = self
            .module_authentication(device_id, module_id)?
            .auth_type
            .unwrap_or(AuthenticationType::Sas);
        Ok(Twin(json!({
            "deviceId": device_id,
            "moduleId": module_id,
            "authenticationType": auth_type,
            "properties": {"desired": {}, "reported": {}},
        })))
    }

    async fn replace_module_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
        twin: &Twin,
    ) -> Result<(), ServiceError> {
        self.record(
            hub,
            HubCall::ReplaceModuleTwin(device_id.to_string(), module_id.to_string()),
        );
        self.state
            .lock()
            .unwrap()
            .module_twins
            .insert((device_id.to_string(), module_id.to_string()), twin.clone());
        Ok(())
    }
}

/// A model definition with the given `extends` and component schemas
pub fn model_definition(id: &str, extends: &[&str], components: &[&str]) -> Value {
    let contents: Vec<Value> = components
        .iter()
        .enumerate()
        .map(|(index, schema)| {
            json!({"@type": "Component", "name": format!("c{}", index), "schema": schema})
        })
        .collect();
    json!({
        "@id": id,
        "@type": "Interface",
        "@context": "dtmi:dtdl:context;2",
        "extends": extends,
        "contents": contents,
    })
}

fn model_data(definition: Value) -> ModelData {
    let id = definition
        .get("@id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    ModelData {
        id,
        display_name: None,
        description: None,
        decommissioned: false,
        upload_time: None,
        model: Some(definition),
        extra: Map::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCall {
    Add(usize),
    Get(String),
    List,
    Update(String),
    Delete(String),
}

#[derive(Default)]
struct ModelState {
    models: Vec<ModelData>,
    calls: Vec<ModelCall>,
    failing_deletes: BTreeSet<String>,
    forbidden: bool,
    last_list: Option<ListModelsOptions>,
}

#[derive(Default)]
pub struct FakeModels {
    state: Mutex<ModelState>,
}

impl FakeModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(definitions: Vec<Value>) -> Self {
        let fake = Self::new();
        fake.state.lock().unwrap().models = definitions.into_iter().map(model_data).collect();
        fake
    }

    pub fn forbid_writes(&self) {
        self.state.lock().unwrap().forbidden = true;
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(id.to_string());
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ModelCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .models
            .iter()
            .map(|model| model.id.clone())
            .collect()
    }

    pub fn last_list_options(&self) -> Option<ListModelsOptions> {
        self.state.lock().unwrap().last_list.clone()
    }
}

#[async_trait]
impl ModelApi for FakeModels {
    async fn add_models(&self, _dt: &TwinsSession, models: &[Value]) -> Result<Value, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ModelCall::Add(models.len()));
        if state.forbidden {
            return Err(ServiceError::Response {
                status: 403,
                message: "Forbidden".to_string(),
            });
        }

        let added: Vec<ModelData> = models.iter().cloned().map(model_data).collect();
        state.models.extend(added.iter().cloned());
        Ok(serde_json::to_value(added).unwrap())
    }

    async fn get_model(
        &self,
        _dt: &TwinsSession,
        id: &str,
        include_definition: bool,
    ) -> Result<ModelData, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ModelCall::Get(id.to_string()));
        let mut model = state
            .models
            .iter()
            .find(|model| model.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))?;
        if !include_definition {
            model.model = None;
        }
        Ok(model)
    }

    async fn list_models(
        &self,
        _dt: &TwinsSession,
        options: &ListModelsOptions,
    ) -> Result<Vec<ModelData>, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ModelCall::List);
        state.last_list = Some(options.clone());

        let mut wanted: BTreeSet<String> = options.dependencies_for.iter().cloned().collect();
        for model in &state.models {
            if options.dependencies_for.contains(&model.id) {
                wanted.extend(model.dependencies());
            }
        }

        Ok(state
            .models
            .iter()
            .filter(|model| options.dependencies_for.is_empty() || wanted.contains(&model.id))
            .cloned()
            .map(|mut model| {
                if !options.include_definition {
                    model.model = None;
                }
                model
            })
            .collect())
    }

    async fn update_model(
        &self,
        _dt: &TwinsSession,
        id: &str,
        patch: &[PatchOperation],
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ModelCall::Update(id.to_string()));
        let model = state
            .models
            .iter_mut()
            .find(|model| model.id == id)
            .ok_or_else(|| not_found(id))?;
        for operation in patch {
            if operation.op == "replace" && operation.path == "/decommissioned" {
                model.decommissioned = operation.value.as_bool().unwrap_or_default();
            }
        }
        Ok(())
    }

    async fn delete_model(&self, _dt: &TwinsSession, id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ModelCall::Delete(id.to_string()));
        if state.failing_deletes.contains(id) {
            return Err(ServiceError::Response {
                status: 409,
                message: format!("Model {} is referenced", id),
            });
        }
        let before = state.models.len();
        state.models.retain(|model| model.id != id);
        if state.models.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }
}
