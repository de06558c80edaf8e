//! IoT Hub registry, twin, and configuration REST calls

use async_trait::async_trait;
use iotops_core::{
    Configuration, Credentials, DeviceCreate, DeviceIdentity, HubApi, HubSession, ModuleCreate,
    ModuleIdentity, RegistryEntry, ServiceError, Twin,
};
use reqwest::header::IF_MATCH;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::client::RestClient;

/// IoT Hub data-plane API version
pub const HUB_API_VERSION: &str = "2021-04-12";

/// Host suffix for public-cloud hubs
pub const HUB_DNS_SUFFIX: &str = "azure-devices.net";

/// Largest configuration listing the service hands out in one call
const CONFIGURATION_LIST_TOP: u32 = 100;

const DEVICE_QUERY: &str = "select * from devices";
const QUERY_PAGE_SIZE: &str = "100";
const CONTINUATION_HEADER: &str = "x-ms-continuation";
const MAX_ITEM_COUNT_HEADER: &str = "x-ms-max-item-count";

impl RestClient {
    fn hub_request(
        &self,
        method: Method,
        hub: &HubSession,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, ServiceError> {
        self.request(
            method,
            &hub.host_name,
            segments,
            HUB_API_VERSION,
            hub.authorization(),
        )
    }
}

#[async_trait]
impl HubApi for RestClient {
    async fn list_configurations(
        &self,
        hub: &HubSession,
    ) -> Result<Vec<Configuration>, ServiceError> {
        let request = self
            .hub_request(Method::GET, hub, &["configurations"])?
            .query(&[("top", CONFIGURATION_LIST_TOP)]);
        self.send_json(request).await
    }

    async fn create_configuration(
        &self,
        hub: &HubSession,
        configuration: &Configuration,
    ) -> Result<(), ServiceError> {
        let request = self
            .hub_request(Method::PUT, hub, &["configurations", configuration.id.as_str()])?
            .json(&configuration_body(configuration));
        self.send_empty(request).await
    }

    async fn delete_configuration(&self, hub: &HubSession, id: &str) -> Result<(), ServiceError> {
        let request = self
            .hub_request(Method::DELETE, hub, &["configurations", id])?
            .header(IF_MATCH, "*");
        self.send_empty(request).await
    }

    async fn list_devices(&self, hub: &HubSession) -> Result<Vec<DeviceIdentity>, ServiceError> {
        let mut devices = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .hub_request(Method::POST, hub, &["devices", "query"])?
                .header(MAX_ITEM_COUNT_HEADER, QUERY_PAGE_SIZE)
                .json(&json!({ "query": DEVICE_QUERY }));
            if let Some(token) = &continuation {
                request = request.header(CONTINUATION_HEADER, token.as_str());
            }

            let response = self.send(request).await?;
            continuation = response
                .headers()
                .get(CONTINUATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let body = response
                .text()
                .await
                .map_err(|e| ServiceError::Transport(e.to_string()))?;
            let page: Vec<DeviceIdentity> =
                serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))?;

            debug!(hub = %hub.name, count = page.len(), "Fetched device page");
            devices.extend(page);

            if continuation.is_none() {
                return Ok(devices);
            }
        }
    }

    async fn show_device(
        &self,
        hub: &HubSession,
        device_id: &str,
    ) -> Result<RegistryEntry, ServiceError> {
        let request = self.hub_request(Method::GET, hub, &["devices", device_id])?;
        self.send_json(request).await
    }

    async fn create_device(
        &self,
        hub: &HubSession,
        device: &DeviceCreate,
    ) -> Result<(), ServiceError> {
        let request = self
            .hub_request(Method::PUT, hub, &["devices", device.device_id.as_str()])?
            .json(&device_body(device));
        self.send_empty(request).await
    }

    async fn delete_device(&self, hub: &HubSession, device_id: &str) -> Result<(), ServiceError> {
        let request = self
            .hub_request(Method::DELETE, hub, &["devices", device_id])?
            .header(IF_MATCH, "*");
        self.send_empty(request).await
    }

    async fn get_device_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
    ) -> Result<Twin, ServiceError> {
        let request = self.hub_request(Method::GET, hub, &["twins", device_id])?;
        self.send_json(request).await
    }

    async fn replace_device_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        twin: &Twin,
    ) -> Result<(), ServiceError> {
        let request = self
            .hub_request(Method::PUT, hub, &["twins", device_id])?
            .header(IF_MATCH, "*")
            .json(twin);
        self.send_empty(request).await
    }

    async fn list_modules(
        &self,
        hub: &HubSession,
        device_id: &str,
    ) -> Result<Vec<ModuleIdentity>, ServiceError> {
        let request = self.hub_request(Method::GET, hub, &["devices", device_id, "modules"])?;
        let modules: Vec<Value> = self.send_json(request).await?;
        modules.into_iter().map(module_from_service).collect()
    }

    async fn show_module(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
    ) -> Result<RegistryEntry, ServiceError> {
        let request =
            self.hub_request(Method::GET, hub, &["devices", device_id, "modules", module_id])?;
        self.send_json(request).await
    }

    async fn create_module(
        &self,
        hub: &HubSession,
        module: &ModuleCreate,
    ) -> Result<(), ServiceError> {
        let request = self
            .hub_request(
                Method::PUT,
                hub,
                &["devices", module.device_id.as_str(), "modules", module.module_id.as_str()],
            )?
            .json(&module_body(module));
        self.send_empty(request).await
    }

    async fn get_module_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
    ) -> Result<Twin, ServiceError> {
        let request =
            self.hub_request(Method::GET, hub, &["twins", device_id, "modules", module_id])?;
        self.send_json(request).await
    }

    async fn replace_module_twin(
        &self,
        hub: &HubSession,
        device_id: &str,
        module_id: &str,
        twin: &Twin,
    ) -> Result<(), ServiceError> {
        let request = self
            .hub_request(Method::PUT, hub, &["twins", device_id, "modules", module_id])?
            .header(IF_MATCH, "*")
            .json(twin);
        self.send_empty(request).await
    }
}

/// Body for creating a configuration from a listed one
///
/// Read-only fields (etag, timestamps, system metrics, metric results) are
/// left out; only the definition is replayed.
fn configuration_body(configuration: &Configuration) -> Value {
    let content: Map<String, Value> = configuration
        .content
        .as_object()
        .map(|content| {
            content
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    let queries = configuration
        .metrics
        .get("queries")
        .cloned()
        .unwrap_or_else(|| json!({}));

    let mut body = json!({
        "id": configuration.id,
        "content": content,
        "targetCondition": configuration.target_condition,
        "priority": configuration.priority,
        "metrics": { "queries": queries },
    });
    if !configuration.labels.is_null() {
        body["labels"] = configuration.labels.clone();
    }
    body
}

fn authentication_body(credentials: &Credentials) -> Value {
    match credentials {
        Credentials::SymmetricKey(key) => json!({ "type": "sas", "symmetricKey": key }),
        Credentials::X509Thumbprint(thumbprint) => {
            json!({ "type": "selfSigned", "x509Thumbprint": thumbprint })
        }
        Credentials::CertificateAuthority => json!({ "type": "certificateAuthority" }),
    }
}

fn device_body(device: &DeviceCreate) -> Value {
    let mut body = json!({
        "deviceId": device.device_id,
        "status": device.status.as_deref().unwrap_or("enabled"),
        "capabilities": { "iotEdge": device.edge_enabled },
        "authentication": authentication_body(&device.credentials),
    });
    if let Some(reason) = &device.status_reason {
        body["statusReason"] = json!(reason);
    }
    body
}

fn module_body(module: &ModuleCreate) -> Value {
    json!({
        "deviceId": module.device_id,
        "moduleId": module.module_id,
        "authentication": authentication_body(&module.credentials),
    })
}

/// Convert a module document from the service into the snake_case record form
fn module_from_service(module: Value) -> Result<ModuleIdentity, ServiceError> {
    let Value::Object(fields) = module else {
        return Err(ServiceError::Decode("module entry is not an object".to_string()));
    };

    let fields: Map<String, Value> = fields
        .into_iter()
        .map(|(key, value)| (to_snake_case(&key), value))
        .collect();
    serde_json::from_value(Value::Object(fields)).map_err(|e| ServiceError::Decode(e.to_string()))
}

fn to_snake_case(key: &str) -> String {
    let mut snake = String::with_capacity(key.len() + 4);
    for (i, ch) in key.char_indices() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.push(ch.to_ascii_lowercase());
        } else {
            snake.push(ch);
        }
    }
    snake
}
