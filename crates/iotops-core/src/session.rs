//! Immutable connection contexts passed to every collaborator call

use std::fmt;

/// Everything needed to address one IoT Hub's data plane
#[derive(Clone, PartialEq, Eq)]
pub struct HubSession {
    /// Short hub name (used in log output)
    pub name: String,
    /// Fully qualified host, e.g. `myhub.azure-devices.net`
    pub host_name: String,
    /// Resource group the hub lives in, if known; not used to address the hub
    pub resource_group: Option<String>,
    authorization: String,
}

impl HubSession {
    pub fn new(
        name: impl Into<String>,
        host_name: impl Into<String>,
        authorization: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host_name: host_name.into(),
            resource_group: None,
            authorization: authorization.into(),
        }
    }

    pub fn with_resource_group(mut self, resource_group: Option<String>) -> Self {
        self.resource_group = resource_group;
        self
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> &str {
        &self.authorization
    }
}

impl fmt::Debug for HubSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubSession")
            .field("name", &self.name)
            .field("host_name", &self.host_name)
            .field("resource_group", &self.resource_group)
            .field("authorization", &"<redacted>")
            .finish()
    }
}

/// Connection context for an Azure Digital Twins instance
#[derive(Clone, PartialEq, Eq)]
pub struct TwinsSession {
    pub name: String,
    pub host_name: String,
    authorization: String,
}

impl TwinsSession {
    pub fn new(
        name: impl Into<String>,
        host_name: impl Into<String>,
        authorization: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host_name: host_name.into(),
            authorization: authorization.into(),
        }
    }

    pub fn authorization(&self) -> &str {
        &self.authorization
    }
}

impl fmt::Debug for TwinsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwinsSession")
            .field("name", &self.name)
            .field("host_name", &self.host_name)
            .field("authorization", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_authorization() {
        let session = HubSession::new("hub", "hub.azure-devices.net", "SharedAccessSignature sr=x");
        let printed = format!("{:?}", session);
        assert!(printed.contains("hub.azure-devices.net"));
        assert!(!printed.contains("SharedAccessSignature"));
        assert_eq!(session.authorization(), "SharedAccessSignature sr=x");
    }
}
