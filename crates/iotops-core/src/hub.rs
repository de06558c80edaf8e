//! IoT Hub registry records as they appear in service responses and snapshots
//!
//! Every record keeps the fields it does not model in an `extra` map so that
//! a record read from the service (or from an older export) is written back
//! out without losing anything.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::SnapshotError;

/// Modules the IoT Edge runtime creates on every edge device
pub const SYSTEM_MODULES: [&str; 2] = ["$edgeAgent", "$edgeHub"];

/// Check whether a module id names an IoT Edge system module
pub fn is_system_module(module_id: &str) -> bool {
    SYSTEM_MODULES.contains(&module_id)
}

/// Authentication type of a device or module, as reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthenticationType {
    /// Symmetric key (`sas`)
    Sas,
    /// Self-signed X.509 thumbprint (`selfSigned`)
    SelfSigned,
    /// X.509 signed by a certificate authority (`certificateAuthority`)
    CertificateAuthority,
    /// No credentials (`none`), used by some edge modules
    None,
    /// Anything the registry reports that we do not know about
    Other(String),
}

impl AuthenticationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sas => "sas",
            Self::SelfSigned => "selfSigned",
            Self::CertificateAuthority => "certificateAuthority",
            Self::None => "none",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for AuthenticationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sas" => Self::Sas,
            "selfSigned" => Self::SelfSigned,
            "certificateAuthority" => Self::CertificateAuthority,
            "none" => Self::None,
            _ => Self::Other(value),
        }
    }
}

impl From<AuthenticationType> for String {
    fn from(value: AuthenticationType) -> Self {
        match value {
            AuthenticationType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary/secondary symmetric keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymmetricKey {
    pub primary_key: Option<String>,
    pub secondary_key: Option<String>,
}

/// Primary/secondary X.509 thumbprints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X509Thumbprint {
    pub primary_thumbprint: Option<String>,
    pub secondary_thumbprint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub iot_edge: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `authentication` block of a device or module "show" response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    #[serde(rename = "type", default)]
    pub auth_type: Option<AuthenticationType>,
    #[serde(default)]
    pub symmetric_key: Option<SymmetricKey>,
    #[serde(default)]
    pub x509_thumbprint: Option<X509Thumbprint>,
}

/// A single device or module as returned by the registry "show" call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub authentication: Authentication,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A hub configuration (automatic device management rule)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub target_condition: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub labels: Value,
    #[serde(default)]
    pub metrics: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A device identity record
///
/// Listing devices yields the device's twin-shaped summary; the export adds
/// `numModules` and, for `sas` devices, the `symmetricKey` taken from the
/// "show" call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: String,
    pub authentication_type: AuthenticationType,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_modules: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symmetric_key: Option<SymmetricKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x509_thumbprint: Option<X509Thumbprint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceIdentity {
    pub fn is_edge(&self) -> bool {
        self.capabilities.iot_edge
    }

    /// Drop credential fields that do not belong to the authentication type
    pub fn retain_matching_credentials(&mut self) {
        if self.authentication_type != AuthenticationType::Sas {
            self.symmetric_key = None;
        }
        if self.authentication_type != AuthenticationType::SelfSigned {
            self.x509_thumbprint = None;
        }
    }

    /// Build the create request for this identity
    ///
    /// Returns `Ok(None)` when the authentication type is not one the
    /// registry accepts on create.
    pub fn to_create(&self) -> Result<Option<DeviceCreate>, SnapshotError> {
        let credentials = select_credentials(
            || format!("Device '{}'", self.device_id),
            &self.authentication_type,
            self.symmetric_key.as_ref(),
            self.x509_thumbprint.as_ref(),
        )?;

        Ok(credentials.map(|credentials| DeviceCreate {
            device_id: self.device_id.clone(),
            edge_enabled: self.is_edge(),
            status: self.status.clone(),
            status_reason: self.status_reason.clone(),
            credentials,
        }))
    }
}

/// Volatile module fields that are meaningless on another hub
const VOLATILE_MODULE_FIELDS: [&str; 3] = [
    "connection_state_updated_time",
    "last_activity_time",
    "authentication",
];

/// A module identity record
///
/// Module records use snake_case keys on the wire (`module_id`,
/// `device_id`, `generation_id`, ...), except for the credential fields that
/// the export merges in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub module_id: String,
    pub device_id: String,
    #[serde(
        rename = "authenticationType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authentication_type: Option<AuthenticationType>,
    #[serde(rename = "symmetricKey", default, skip_serializing_if = "Option::is_none")]
    pub symmetric_key: Option<SymmetricKey>,
    #[serde(rename = "x509Thumbprint", default, skip_serializing_if = "Option::is_none")]
    pub x509_thumbprint: Option<X509Thumbprint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleIdentity {
    pub fn is_system(&self) -> bool {
        is_system_module(&self.module_id)
    }

    /// Remove connection/activity timestamps and the raw authentication block
    pub fn strip_volatile(&mut self) {
        for field in VOLATILE_MODULE_FIELDS {
            self.extra.remove(field);
        }
    }

    /// Build the create request for this module under `device_id`
    pub fn to_create(&self, device_id: &str) -> Result<Option<ModuleCreate>, SnapshotError> {
        let Some(auth_type) = &self.authentication_type else {
            return Ok(None);
        };

        let credentials = select_credentials(
            || format!("Module '{}' in device '{}'", self.module_id, device_id),
            auth_type,
            self.symmetric_key.as_ref(),
            self.x509_thumbprint.as_ref(),
        )?;

        Ok(credentials.map(|credentials| ModuleCreate {
            device_id: device_id.to_string(),
            module_id: self.module_id.clone(),
            credentials,
        }))
    }
}

/// A device or module twin, kept as the opaque document the service returned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Twin(pub Value);

impl Twin {
    pub fn authentication_type(&self) -> Option<AuthenticationType> {
        self.0
            .get("authenticationType")
            .and_then(Value::as_str)
            .map(|s| AuthenticationType::from(s.to_string()))
    }

    pub fn device_id(&self) -> Option<&str> {
        self.0.get("deviceId").and_then(Value::as_str)
    }

    pub fn module_id(&self) -> Option<&str> {
        self.0.get("moduleId").and_then(Value::as_str)
    }
}

/// Credentials supplied when creating a device or module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    SymmetricKey(SymmetricKey),
    X509Thumbprint(X509Thumbprint),
    CertificateAuthority,
}

impl Credentials {
    pub fn auth_type(&self) -> AuthenticationType {
        match self {
            Self::SymmetricKey(_) => AuthenticationType::Sas,
            Self::X509Thumbprint(_) => AuthenticationType::SelfSigned,
            Self::CertificateAuthority => AuthenticationType::CertificateAuthority,
        }
    }
}

fn select_credentials(
    entity: impl FnOnce() -> String,
    auth_type: &AuthenticationType,
    symmetric_key: Option<&SymmetricKey>,
    x509_thumbprint: Option<&X509Thumbprint>,
) -> Result<Option<Credentials>, SnapshotError> {
    let missing = |field| SnapshotError::MissingCredential {
        entity: entity(),
        auth_type: auth_type.clone(),
        field,
    };

    match auth_type {
        AuthenticationType::Sas => symmetric_key
            .cloned()
            .map(|key| Some(Credentials::SymmetricKey(key)))
            .ok_or_else(|| missing("symmetricKey")),
        AuthenticationType::SelfSigned => x509_thumbprint
            .cloned()
            .map(|thumbprint| Some(Credentials::X509Thumbprint(thumbprint)))
            .ok_or_else(|| missing("x509Thumbprint")),
        AuthenticationType::CertificateAuthority => Ok(Some(Credentials::CertificateAuthority)),
        AuthenticationType::None | AuthenticationType::Other(_) => Ok(None),
    }
}

/// Request to create a device identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreate {
    pub device_id: String,
    pub edge_enabled: bool,
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub credentials: Credentials,
}

/// Request to create a module identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCreate {
    pub device_id: String,
    pub module_id: String,
    pub credentials: Credentials,
}
