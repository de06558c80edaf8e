//! Digital Twins model management

use iotops_core::{
    DependencyGraph, ListModelsOptions, ModelApi, ModelData, PatchOperation, TwinsSession,
};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ProviderError, Result};

const FORBIDDEN_MESSAGE: &str =
    "Current principal access is forbidden. Please validate rbac role assignments.";

/// Model file extensions picked up from a directory
const MODEL_EXTENSIONS: [&str; 2] = ["json", "dtdl"];

/// Outcome of [`ModelProvider::delete_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Model operations against one Digital Twins instance
pub struct ModelProvider<'a, A: ModelApi> {
    api: &'a A,
    dt: TwinsSession,
}

impl<'a, A: ModelApi> ModelProvider<'a, A> {
    pub fn new(api: &'a A, dt: TwinsSession) -> Self {
        Self { api, dt }
    }

    /// Upload models given inline/as a file (`models`) or found under a
    /// directory; `models` wins when both are given
    pub async fn add(&self, models: Option<&str>, from_directory: Option<&Path>) -> Result<Value> {
        let payload = match (models, from_directory) {
            (Some(models), _) => match process_json_arg(models, "models")? {
                Value::Array(items) => items,
                object @ Value::Object(_) => vec![object],
                other => {
                    return Err(ProviderError::InvalidArgumentValue(format!(
                        "--models must be a JSON object or array, got: {}",
                        other
                    )))
                }
            },
            (None, Some(directory)) => process_directory(directory)?,
            (None, None) => {
                return Err(ProviderError::RequiredArgumentMissing(
                    "Provide either --models or --from-directory.".to_string(),
                ))
            }
        };

        let payload_json = Value::Array(payload.clone());
        info!(dt = %self.dt.name, payload = %payload_json, "Models payload");

        self.api
            .add_models(&self.dt, &payload)
            .await
            .map_err(|e| match e.status() {
                Some(403) => ProviderError::Forbidden(FORBIDDEN_MESSAGE.to_string()),
                _ => ProviderError::Service(e),
            })
    }

    pub async fn get(&self, id: &str, definition: bool) -> Result<ModelData> {
        Ok(self.api.get_model(&self.dt, id, definition).await?)
    }

    pub async fn list(
        &self,
        definition: bool,
        dependencies_for: Vec<String>,
        top: Option<u32>,
    ) -> Result<Vec<ModelData>> {
        let options = ListModelsOptions {
            include_definition: definition,
            dependencies_for,
            max_items_per_page: top,
        };
        Ok(self.api.list_models(&self.dt, &options).await?)
    }

    /// Set the decommissioned flag, returning the updated model
    pub async fn update(&self, id: &str, decommission: bool) -> Result<ModelData> {
        let patch = [PatchOperation::replace(
            "/decommissioned",
            Value::Bool(decommission),
        )];
        self.api.update_model(&self.dt, id, &patch).await?;
        self.get(id, false).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        Ok(self.api.delete_model(&self.dt, id).await?)
    }

    /// Delete every model, dependents before the models they depend on
    ///
    /// A failed delete is logged and the remaining models are still
    /// attempted.
    pub async fn delete_all(&self) -> Result<DeleteSummary> {
        let models = self.list(true, Vec::new(), None).await?;
        let order = DependencyGraph::from_models(&models).into_deletion_order();
        debug!(dt = %self.dt.name, count = order.len(), "Resolved model deletion order");

        let mut summary = DeleteSummary::default();
        for id in order {
            info!(dt = %self.dt.name, model = %id, "Deleting model");
            match self.delete(&id).await {
                Ok(()) => summary.deleted.push(id),
                Err(e) => {
                    warn!(dt = %self.dt.name, model = %id, error = %e, "Could not delete model");
                    summary.failed.push(id);
                }
            }
        }

        Ok(summary)
    }
}

/// Parse an argument that is either a path to a JSON file or inline JSON
pub fn process_json_arg(content: &str, argument_name: &str) -> Result<Value> {
    let path = Path::new(content);
    let (text, source) = if path.is_file() {
        (std::fs::read_to_string(path)?, format!("file '{}'", path.display()))
    } else {
        (content.to_string(), "inline content".to_string())
    };

    serde_json::from_str(&text).map_err(|e| {
        ProviderError::InvalidArgumentValue(format!(
            "Failed to parse json for argument '{}' from {}: {}",
            argument_name, source, e
        ))
    })
}

/// Parse every `.json` / `.dtdl` file under `directory`, recursively
pub fn process_directory(directory: &Path) -> Result<Vec<Value>> {
    debug!(directory = %directory.display(), "Processing model directory");
    if !directory.is_dir() {
        return Err(ProviderError::InvalidArgumentValue(format!(
            "--from-directory '{}' is not a directory",
            directory.display()
        )));
    }

    let mut payload = Vec::new();
    for entry in WalkDir::new(directory).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let is_model = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MODEL_EXTENSIONS.contains(&ext));
        if !is_model {
            debug!(path = %path.display(), "Skipping file, model file must end with .json or .dtdl");
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        payload.push(process_json_arg(&path.to_string_lossy(), &name)?);
    }

    Ok(payload)
}
