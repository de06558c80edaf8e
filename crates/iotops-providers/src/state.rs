//! Hub state export, import, and hub-to-hub migration
//!
//! A hub's state is its configurations plus every device identity, device
//! twin, and non-system module identity/twin. Export writes that state as a
//! line-delimited snapshot; import replays a snapshot onto a hub; migration
//! replays the live state of another hub without an intermediate file.

use iotops_core::{
    AuthenticationType, Configuration, DeviceEntry, DeviceIdentity, HubApi, HubSession,
    HubSnapshot, ModuleEntry, SnapshotWriter,
};
use std::io::{BufRead, Write};
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// What an import or migration did to the target hub
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub configurations: usize,
    pub devices: usize,
    pub modules: usize,
    /// Devices and modules not created because of their authentication type
    pub skipped: usize,
}

/// Export/import/migration against one target hub
pub struct StateProvider<'a, A: HubApi> {
    api: &'a A,
    hub: HubSession,
}

impl<'a, A: HubApi> StateProvider<'a, A> {
    pub fn new(api: &'a A, hub: HubSession) -> Self {
        Self { api, hub }
    }

    pub fn hub(&self) -> &HubSession {
        &self.hub
    }

    /// Write the hub's state to `writer`, one record per line
    ///
    /// Records are written as each device is collected. On failure the
    /// records written so far stay in the destination.
    pub async fn save_state<W: Write>(&self, writer: W) -> Result<W> {
        let configurations = self.api.list_configurations(&self.hub).await?;
        let mut snapshot = SnapshotWriter::new(writer);
        snapshot.write_configurations(&configurations)?;
        debug!(hub = %self.hub.name, count = configurations.len(), "Exported configurations");

        let devices = self.api.list_devices(&self.hub).await?;
        let total = devices.len();
        for (index, identity) in devices.into_iter().enumerate() {
            let device = self.collect_device(&self.hub, identity).await?;
            snapshot.write_device(&device)?;
            info!(
                hub = %self.hub.name,
                device = %device.device_id(),
                modules = device.modules.len(),
                position = index + 1,
                total,
                "Exported device"
            );
        }

        let records = snapshot.records_written();
        let writer = snapshot.into_inner()?;
        info!(hub = %self.hub.name, devices = total, records, "Saved hub state");
        Ok(writer)
    }

    /// Recreate the state described by a snapshot on this hub
    ///
    /// The whole snapshot is read and validated before anything on the hub
    /// is touched. With `overwrite`, existing configurations and devices are
    /// deleted first.
    pub async fn upload_state<R: BufRead>(
        &self,
        reader: R,
        overwrite: bool,
    ) -> Result<TransferSummary> {
        let snapshot = HubSnapshot::read_from(reader)?;
        debug!(
            configurations = snapshot.configurations.len(),
            devices = snapshot.devices.len(),
            "Read hub snapshot"
        );

        if overwrite {
            self.clear().await?;
        }

        let mut summary = TransferSummary::default();
        self.upload_configurations(&snapshot.configurations, &mut summary)
            .await?;

        let total = snapshot.devices.len();
        for (index, device) in snapshot.devices.iter().enumerate() {
            self.upload_device(device, &mut summary).await?;
            info!(
                hub = %self.hub.name,
                device = %device.device_id(),
                position = index + 1,
                total,
                "Uploaded device"
            );
        }

        info!(hub = %self.hub.name, ?summary, "Uploaded hub state");
        Ok(summary)
    }

    /// Copy configurations, devices, modules, and twins from `source`
    pub async fn migrate_devices(
        &self,
        source: &HubSession,
        overwrite: bool,
    ) -> Result<TransferSummary> {
        if overwrite {
            self.clear().await?;
        }

        let mut summary = TransferSummary::default();
        let configurations = self.api.list_configurations(source).await?;
        self.upload_configurations(&configurations, &mut summary)
            .await?;

        let devices = self.api.list_devices(source).await?;
        let total = devices.len();
        for (index, identity) in devices.into_iter().enumerate() {
            let device = self.collect_device(source, identity).await?;
            self.upload_device(&device, &mut summary).await?;
            info!(
                from = %source.name,
                to = %self.hub.name,
                device = %device.device_id(),
                position = index + 1,
                total,
                "Migrated device"
            );
        }

        info!(from = %source.name, to = %self.hub.name, ?summary, "Migrated hub state");
        Ok(summary)
    }

    pub async fn delete_all_configs(&self) -> Result<usize> {
        let configurations = self.api.list_configurations(&self.hub).await?;
        for configuration in &configurations {
            info!(hub = %self.hub.name, configuration = %configuration.id, "Deleting configuration");
            self.api
                .delete_configuration(&self.hub, &configuration.id)
                .await?;
        }
        Ok(configurations.len())
    }

    pub async fn delete_all_devices(&self) -> Result<usize> {
        let devices = self.api.list_devices(&self.hub).await?;
        for device in &devices {
            info!(hub = %self.hub.name, device = %device.device_id, "Deleting device");
            self.api.delete_device(&self.hub, &device.device_id).await?;
        }
        Ok(devices.len())
    }

    async fn clear(&self) -> Result<()> {
        warn!(
            hub = %self.hub.name,
            "Deleting all configurations and devices before upload"
        );
        let configurations = self.delete_all_configs().await?;
        let devices = self.delete_all_devices().await?;
        info!(hub = %self.hub.name, configurations, devices, "Cleared hub");
        Ok(())
    }

    /// Gather a device's identity, twin, and non-system modules from `source`
    ///
    /// Listings omit credentials, so keys and thumbprints are read from the
    /// per-entity "show" calls. A module's authentication type is only
    /// reported on its twin.
    async fn collect_device(
        &self,
        source: &HubSession,
        mut identity: DeviceIdentity,
    ) -> Result<DeviceEntry> {
        let device_id = identity.device_id.clone();
        let listed = self.api.list_modules(source, &device_id).await?;

        if identity.authentication_type == AuthenticationType::Sas {
            let shown = self.api.show_device(source, &device_id).await?;
            identity.symmetric_key = shown.authentication.symmetric_key;
        }
        identity.retain_matching_credentials();

        let twin = self.api.get_device_twin(source, &device_id).await?;

        let mut modules = Vec::new();
        for mut module in listed.into_iter().filter(|module| !module.is_system()) {
            module.strip_volatile();

            let module_twin = self
                .api
                .get_module_twin(source, &device_id, &module.module_id)
                .await?;
            module.authentication_type = module_twin.authentication_type();
            module.symmetric_key = None;
            module.x509_thumbprint = None;

            match module.authentication_type {
                Some(AuthenticationType::Sas) => {
                    let shown = self
                        .api
                        .show_module(source, &device_id, &module.module_id)
                        .await?;
                    module.symmetric_key = shown.authentication.symmetric_key;
                }
                Some(AuthenticationType::SelfSigned) => {
                    let shown = self
                        .api
                        .show_module(source, &device_id, &module.module_id)
                        .await?;
                    module.x509_thumbprint = shown.authentication.x509_thumbprint;
                }
                _ => {}
            }

            modules.push(ModuleEntry {
                identity: module,
                twin: module_twin,
            });
        }

        Ok(DeviceEntry::new(identity, twin, modules))
    }

    async fn upload_configurations(
        &self,
        configurations: &[Configuration],
        summary: &mut TransferSummary,
    ) -> Result<()> {
        for configuration in configurations {
            self.api
                .create_configuration(&self.hub, configuration)
                .await?;
            debug!(hub = %self.hub.name, configuration = %configuration.id, "Created configuration");
            summary.configurations += 1;
        }
        Ok(())
    }

    /// Create a device and its modules, then replace their twins
    ///
    /// Entities with an authentication type the registry cannot create are
    /// logged and skipped together with their twins. Modules of a skipped
    /// device are skipped as well.
    async fn upload_device(&self, device: &DeviceEntry, summary: &mut TransferSummary) -> Result<()> {
        let device_id = device.device_id();

        let Some(create) = device.identity.to_create()? else {
            error!(
                device = %device_id,
                auth_type = %device.identity.authentication_type,
                "Authorization type for device not recognized"
            );
            if !device.modules.is_empty() {
                warn!(device = %device_id, modules = device.modules.len(), "Skipping modules of uncreated device");
            }
            summary.skipped += 1 + device.modules.len();
            return Ok(());
        };

        self.api.create_device(&self.hub, &create).await?;
        self.api
            .replace_device_twin(&self.hub, device_id, &device.twin)
            .await?;
        summary.devices += 1;

        for module in &device.modules {
            let module_id = &module.identity.module_id;
            let Some(create) = module.identity.to_create(device_id)? else {
                error!(
                    device = %device_id,
                    module = %module_id,
                    auth_type = ?module.identity.authentication_type,
                    "Authorization type for module not recognized"
                );
                summary.skipped += 1;
                continue;
            };

            self.api.create_module(&self.hub, &create).await?;
            self.api
                .replace_module_twin(&self.hub, device_id, module_id, &module.twin)
                .await?;
            summary.modules += 1;
        }

        Ok(())
    }
}
