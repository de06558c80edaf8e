//! Line-delimited hub snapshot format
//!
//! A snapshot is one JSON value per line:
//!
//! ```text
//! [configuration, ...]            configuration list, always first
//! {device identity + numModules}  \
//! {device twin}                    | repeated per device
//! {module identity}  \             |
//! {module twin}      / numModules  /
//! ```
//!
//! The format carries no tags or version marker. The reader classifies each
//! line by its shape and checks it against the record the sequence expects,
//! so a reordered or truncated file fails with the offending line number
//! instead of being replayed out of step.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::{BufRead, Lines, Write};

use crate::error::SnapshotError;
use crate::hub::{Configuration, DeviceIdentity, ModuleIdentity, Twin};

/// The kinds of record a snapshot line can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Configurations,
    DeviceIdentity,
    DeviceTwin,
    ModuleIdentity,
    ModuleTwin,
}

impl RecordKind {
    /// Classify a decoded line by its shape
    ///
    /// Module identities carry the snake_case `module_id`, device identities
    /// carry `numModules`, module twins carry `moduleId`, and device twins
    /// carry only `deviceId`.
    pub fn classify(value: &Value) -> Option<Self> {
        match value {
            Value::Array(_) => Some(Self::Configurations),
            Value::Object(map) if map.contains_key("module_id") => Some(Self::ModuleIdentity),
            Value::Object(map) if map.contains_key("numModules") => Some(Self::DeviceIdentity),
            Value::Object(map) if map.contains_key("moduleId") => Some(Self::ModuleTwin),
            Value::Object(map) if map.contains_key("deviceId") => Some(Self::DeviceTwin),
            _ => None,
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match Self::classify(value) {
            Some(found) => found == self,
            // twins are opaque documents; any other object is taken as one
            None => matches!(self, Self::DeviceTwin | Self::ModuleTwin) && value.is_object(),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configurations => "configuration list",
            Self::DeviceIdentity => "device identity",
            Self::DeviceTwin => "device twin",
            Self::ModuleIdentity => "module identity",
            Self::ModuleTwin => "module twin",
        };
        f.write_str(name)
    }
}

/// A single snapshot line
///
/// Serializes without a tag, exactly as the record appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SnapshotRecord {
    Configurations(Vec<Configuration>),
    DeviceIdentity(DeviceIdentity),
    DeviceTwin(Twin),
    ModuleIdentity(ModuleIdentity),
    ModuleTwin(Twin),
}

impl SnapshotRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Configurations(_) => RecordKind::Configurations,
            Self::DeviceIdentity(_) => RecordKind::DeviceIdentity,
            Self::DeviceTwin(_) => RecordKind::DeviceTwin,
            Self::ModuleIdentity(_) => RecordKind::ModuleIdentity,
            Self::ModuleTwin(_) => RecordKind::ModuleTwin,
        }
    }

    /// Decode a line as the given kind
    pub fn decode(kind: RecordKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            RecordKind::Configurations => Self::Configurations(serde_json::from_value(value)?),
            RecordKind::DeviceIdentity => Self::DeviceIdentity(serde_json::from_value(value)?),
            RecordKind::DeviceTwin => Self::DeviceTwin(Twin(value)),
            RecordKind::ModuleIdentity => Self::ModuleIdentity(serde_json::from_value(value)?),
            RecordKind::ModuleTwin => Self::ModuleTwin(Twin(value)),
        })
    }
}

/// A module identity and its twin
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleEntry {
    pub identity: ModuleIdentity,
    pub twin: Twin,
}

/// A device identity, its twin, and its non-system modules
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEntry {
    pub identity: DeviceIdentity,
    pub twin: Twin,
    pub modules: Vec<ModuleEntry>,
}

impl DeviceEntry {
    /// Group a device with its modules, annotating `numModules`
    pub fn new(mut identity: DeviceIdentity, twin: Twin, modules: Vec<ModuleEntry>) -> Self {
        identity.num_modules = Some(modules.len());
        Self {
            identity,
            twin,
            modules,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.identity.device_id
    }

    /// The records this device occupies, in file order
    pub fn records(&self) -> Vec<SnapshotRecord> {
        let mut identity = self.identity.clone();
        identity.num_modules = Some(self.modules.len());

        let mut records = Vec::with_capacity(2 + 2 * self.modules.len());
        records.push(SnapshotRecord::DeviceIdentity(identity));
        records.push(SnapshotRecord::DeviceTwin(self.twin.clone()));
        for module in &self.modules {
            records.push(SnapshotRecord::ModuleIdentity(module.identity.clone()));
            records.push(SnapshotRecord::ModuleTwin(module.twin.clone()));
        }
        records
    }
}

/// A fully loaded snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HubSnapshot {
    pub configurations: Vec<Configuration>,
    pub devices: Vec<DeviceEntry>,
}

impl HubSnapshot {
    /// Read and validate a whole snapshot
    pub fn read_from<R: BufRead>(reader: R) -> Result<Self, SnapshotError> {
        let mut reader = SnapshotReader::new(reader);
        let configurations = reader.read_configurations()?;
        let devices = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            configurations,
            devices,
        })
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<W, SnapshotError> {
        let mut writer = SnapshotWriter::new(writer);
        writer.write_configurations(&self.configurations)?;
        for device in &self.devices {
            writer.write_device(device)?;
        }
        writer.into_inner()
    }
}

/// Incremental snapshot writer: each record is written as soon as it is given
pub struct SnapshotWriter<W: Write> {
    inner: W,
    records: usize,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    pub fn write_configurations(
        &mut self,
        configurations: &[Configuration],
    ) -> Result<(), SnapshotError> {
        self.write_line(&configurations)
    }

    pub fn write_device(&mut self, device: &DeviceEntry) -> Result<(), SnapshotError> {
        for record in device.records() {
            self.write_line(&record)?;
        }
        Ok(())
    }

    pub fn write_record(&mut self, record: &SnapshotRecord) -> Result<(), SnapshotError> {
        self.write_line(record)
    }

    /// Number of lines written so far
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W, SnapshotError> {
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_line<T: Serialize + ?Sized>(&mut self, record: &T) -> Result<(), SnapshotError> {
        serde_json::to_writer(&mut self.inner, record)?;
        self.inner.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }
}

/// Streaming snapshot reader
///
/// Call [`SnapshotReader::read_configurations`] first, then iterate to get
/// one [`DeviceEntry`] per device.
pub struct SnapshotReader<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: BufRead> SnapshotReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    /// Read the leading configuration list
    pub fn read_configurations(&mut self) -> Result<Vec<Configuration>, SnapshotError> {
        let (line, value) = self
            .next_record(RecordKind::Configurations)?
            .ok_or(SnapshotError::MissingConfigurations)?;
        decode(line, value)
    }

    /// Read the next device group, or `None` at end of input
    pub fn next_device(&mut self) -> Result<Option<DeviceEntry>, SnapshotError> {
        let Some((line, value)) = self.next_record(RecordKind::DeviceIdentity)? else {
            return Ok(None);
        };
        let identity: DeviceIdentity = decode(line, value)?;

        let (_, twin) = self.required(RecordKind::DeviceTwin, &identity.device_id)?;

        let count = identity.num_modules.unwrap_or(0);
        let mut modules = Vec::with_capacity(count);
        for _ in 0..count {
            let (line, value) = self.required(RecordKind::ModuleIdentity, &identity.device_id)?;
            let module: ModuleIdentity = decode(line, value)?;
            let (_, module_twin) = self.required(RecordKind::ModuleTwin, &identity.device_id)?;
            modules.push(ModuleEntry {
                identity: module,
                twin: Twin(module_twin),
            });
        }

        Ok(Some(DeviceEntry {
            identity,
            twin: Twin(twin),
            modules,
        }))
    }

    fn required(
        &mut self,
        expected: RecordKind,
        device_id: &str,
    ) -> Result<(usize, Value), SnapshotError> {
        self.next_record(expected)?
            .ok_or_else(|| SnapshotError::Truncated {
                device_id: device_id.to_string(),
                expected,
            })
    }

    /// Next non-blank line, checked against the expected kind
    fn next_record(
        &mut self,
        expected: RecordKind,
    ) -> Result<Option<(usize, Value)>, SnapshotError> {
        for text in self.lines.by_ref() {
            let text = text?;
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }

            let line = self.line;
            let value: Value = serde_json::from_str(&text)
                .map_err(|source| SnapshotError::Json { line, source })?;

            if !expected.accepts(&value) {
                return Err(SnapshotError::UnexpectedRecord {
                    line,
                    expected,
                    found: describe(&value),
                });
            }
            return Ok(Some((line, value)));
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for SnapshotReader<R> {
    type Item = Result<DeviceEntry, SnapshotError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_device().transpose()
    }
}

fn decode<T: serde::de::DeserializeOwned>(line: usize, value: Value) -> Result<T, SnapshotError> {
    serde_json::from_value(value).map_err(|source| SnapshotError::Json { line, source })
}

fn describe(value: &Value) -> String {
    match RecordKind::classify(value) {
        Some(kind) => kind.to_string(),
        None => match value {
            Value::Object(_) => "an unrecognized object".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(_) => "a boolean".to_string(),
            Value::Number(_) => "a number".to_string(),
            Value::String(_) => "a string".to_string(),
            Value::Array(_) => "an array".to_string(),
        },
    }
}
