//! Configuration loading and session resolution

use anyhow::{bail, Result};
use iotops_core::{HubSession, TwinsSession};
use iotops_rest::DEFAULT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Environment fallback for the hub authorization header value
pub const HUB_AUTH_ENV: &str = "IOTOPS_HUB_AUTH";
/// Environment fallback for the Digital Twins authorization header value
pub const DT_AUTH_ENV: &str = "IOTOPS_DT_AUTH";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub hub: HubDefaults,
    /// Known hubs by name
    #[serde(default)]
    pub hubs: BTreeMap<String, HubConfig>,
    /// Known Digital Twins instances by name
    #[serde(default)]
    pub digital_twins: BTreeMap<String, TwinsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubDefaults {
    /// Suffix used to derive a hub host name from its name
    #[serde(default = "default_dns_suffix")]
    pub dns_suffix: String,
}

impl Default for HubDefaults {
    fn default() -> Self {
        Self {
            dns_suffix: default_dns_suffix(),
        }
    }
}

fn default_dns_suffix() -> String {
    iotops_rest::HUB_DNS_SUFFIX.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwinsConfig {
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub authorization: Option<String>,
}

impl Config {
    /// Build the session for hub `name`
    ///
    /// `login` beats the configured authorization, which beats
    /// `IOTOPS_HUB_AUTH`.
    pub fn hub_session(
        &self,
        name: &str,
        login: Option<String>,
        resource_group: Option<String>,
    ) -> Result<HubSession> {
        let configured = self.hubs.get(name).cloned().unwrap_or_default();
        let Some(authorization) = resolve_authorization(
            login,
            configured.authorization,
            std::env::var(HUB_AUTH_ENV).ok(),
        ) else {
            bail!(
                "No authorization for hub '{}': pass --login, set hubs.{}.authorization, or set {}",
                name,
                name,
                HUB_AUTH_ENV
            );
        };

        let host_name = configured
            .host_name
            .unwrap_or_else(|| format!("{}.{}", name, self.hub.dns_suffix));
        debug!(hub = %name, host = %host_name, "Resolved hub");

        Ok(HubSession::new(name, host_name, authorization)
            .with_resource_group(resource_group.or(configured.resource_group)))
    }

    /// Build the session for Digital Twins instance `name`
    ///
    /// Without a configured `host_name` the name itself must be a host.
    pub fn twins_session(&self, name: &str, login: Option<String>) -> Result<TwinsSession> {
        let configured = self.digital_twins.get(name).cloned().unwrap_or_default();
        let Some(authorization) = resolve_authorization(
            login,
            configured.authorization,
            std::env::var(DT_AUTH_ENV).ok(),
        ) else {
            bail!(
                "No authorization for Digital Twins instance '{}': pass --login, set digital_twins.{}.authorization, or set {}",
                name,
                name,
                DT_AUTH_ENV
            );
        };

        let host_name = match configured.host_name {
            Some(host_name) => host_name,
            None if name.contains('.') => name.to_string(),
            None => bail!(
                "No host_name configured for Digital Twins instance '{}'",
                name
            ),
        };
        debug!(dt = %name, host = %host_name, "Resolved Digital Twins instance");

        Ok(TwinsSession::new(name, host_name, authorization))
    }
}

fn resolve_authorization(
    login: Option<String>,
    configured: Option<String>,
    environment: Option<String>,
) -> Option<String> {
    let present = |value: &String| !value.trim().is_empty();
    login
        .filter(present)
        .or_else(|| configured.filter(present))
        .or_else(|| environment.filter(present))
}

/// Load configuration from file, or defaults when the file does not exist
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
