//! Command tree and dispatch

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Subcommand};
use iotops_providers::{ModelProvider, StateProvider, TransferSummary};
use iotops_rest::RestClient;
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// IoT Hub operations
    Hub {
        #[command(subcommand)]
        command: HubCommand,
    },
    /// Azure Digital Twins operations
    Dt {
        #[command(subcommand)]
        command: DtCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum HubCommand {
    /// Export, import, or migrate hub state
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

/// Target hub selection
#[derive(Args, Debug, Clone)]
pub struct HubArgs {
    /// Hub name
    #[arg(short = 'n', long = "hub")]
    pub hub: String,

    /// Authorization header value (overrides configuration)
    #[arg(long)]
    pub login: Option<String>,

    /// Resource group (informational, not used to reach the service)
    #[arg(short = 'g', long)]
    pub resource_group: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Write configurations, devices, modules, and twins to a file
    Export {
        #[command(flatten)]
        hub: HubArgs,
        /// Destination file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Recreate hub state from an exported file
    Import {
        #[command(flatten)]
        hub: HubArgs,
        /// Exported state file
        #[arg(short, long)]
        file: PathBuf,
        /// Delete existing configurations and devices first
        #[arg(short, long)]
        replace: bool,
    },
    /// Copy state from another hub
    Migrate {
        #[command(flatten)]
        hub: HubArgs,
        /// Hub to copy from
        #[arg(long)]
        origin_hub: String,
        /// Resource group of the origin hub (informational)
        #[arg(long)]
        origin_resource_group: Option<String>,
        /// Authorization header value for the origin hub
        #[arg(long)]
        origin_login: Option<String>,
        /// Delete existing configurations and devices first
        #[arg(short, long)]
        replace: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DtCommand {
    /// Manage DTDL models
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },
}

/// Target Digital Twins instance selection
#[derive(Args, Debug, Clone)]
pub struct DtArgs {
    /// Instance name, or its host name
    #[arg(short = 'n', long = "dt-name")]
    pub name: String,

    /// Authorization header value (overrides configuration)
    #[arg(long)]
    pub login: Option<String>,

    /// Resource group (informational, not used to reach the service)
    #[arg(short = 'g', long)]
    pub resource_group: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    /// Upload models inline, from a file, or from a directory
    Add {
        #[command(flatten)]
        dt: DtArgs,
        /// Inline JSON or a path to a JSON file
        #[arg(long)]
        models: Option<String>,
        /// Directory searched recursively for .json/.dtdl files
        #[arg(long)]
        from_directory: Option<PathBuf>,
    },
    Show {
        #[command(flatten)]
        dt: DtArgs,
        #[arg(long)]
        dtmi: String,
        /// Include the model definition
        #[arg(long)]
        definition: bool,
    },
    List {
        #[command(flatten)]
        dt: DtArgs,
        /// Include model definitions
        #[arg(long)]
        definition: bool,
        /// Only these models and their dependencies
        #[arg(long, num_args = 1..)]
        dependencies_for: Vec<String>,
        /// Maximum items per page
        #[arg(long)]
        top: Option<u32>,
    },
    /// Set or clear the decommissioned flag
    Update {
        #[command(flatten)]
        dt: DtArgs,
        #[arg(long)]
        dtmi: String,
        #[arg(long, action = ArgAction::Set, required = true)]
        decommission: bool,
    },
    Delete {
        #[command(flatten)]
        dt: DtArgs,
        #[arg(long)]
        dtmi: String,
    },
    /// Delete every model, dependents first
    DeleteAll {
        #[command(flatten)]
        dt: DtArgs,
    },
}

pub async fn run(command: Command, config: &Config, client: &RestClient) -> Result<()> {
    match command {
        Command::Hub {
            command: HubCommand::State { command },
        } => run_state(command, config, client).await,
        Command::Dt {
            command: DtCommand::Model { command },
        } => run_model(command, config, client).await,
    }
}

async fn run_state(command: StateCommand, config: &Config, client: &RestClient) -> Result<()> {
    match command {
        StateCommand::Export { hub, file } => {
            let session = config.hub_session(&hub.hub, hub.login, hub.resource_group)?;
            let provider = StateProvider::new(client, session);
            let writer = File::create(&file)
                .with_context(|| format!("Failed to create {}", file.display()))?;
            provider.save_state(BufWriter::new(writer)).await?;
            info!(hub = %hub.hub, file = %file.display(), "Saved state");
        }
        StateCommand::Import { hub, file, replace } => {
            let session = config.hub_session(&hub.hub, hub.login, hub.resource_group)?;
            let provider = StateProvider::new(client, session);
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let summary = provider
                .upload_state(BufReader::new(reader), replace)
                .await?;
            print_json(&summary_json(&summary))?;
        }
        StateCommand::Migrate {
            hub,
            origin_hub,
            origin_resource_group,
            origin_login,
            replace,
        } => {
            let session = config.hub_session(&hub.hub, hub.login, hub.resource_group)?;
            let origin = config.hub_session(&origin_hub, origin_login, origin_resource_group)?;
            let provider = StateProvider::new(client, session);
            let summary = provider.migrate_devices(&origin, replace).await?;
            print_json(&summary_json(&summary))?;
        }
    }
    Ok(())
}

async fn run_model(command: ModelCommand, config: &Config, client: &RestClient) -> Result<()> {
    match command {
        ModelCommand::Add {
            dt,
            models,
            from_directory,
        } => {
            let added = model_provider(config, client, &dt)?
                .add(models.as_deref(), from_directory.as_deref())
                .await?;
            print_json(&added)?;
        }
        ModelCommand::Show {
            dt,
            dtmi,
            definition,
        } => {
            let model = model_provider(config, client, &dt)?.get(&dtmi, definition).await?;
            print_json(&model)?;
        }
        ModelCommand::List {
            dt,
            definition,
            dependencies_for,
            top,
        } => {
            let models = model_provider(config, client, &dt)?
                .list(definition, dependencies_for, top)
                .await?;
            print_json(&models)?;
        }
        ModelCommand::Update {
            dt,
            dtmi,
            decommission,
        } => {
            let model = model_provider(config, client, &dt)?.update(&dtmi, decommission).await?;
            print_json(&model)?;
        }
        ModelCommand::Delete { dt, dtmi } => {
            model_provider(config, client, &dt)?.delete(&dtmi).await?;
        }
        ModelCommand::DeleteAll { dt } => {
            let summary = model_provider(config, client, &dt)?.delete_all().await?;
            print_json(&json!({
                "deleted": summary.deleted,
                "failed": summary.failed,
            }))?;
        }
    }
    Ok(())
}

fn model_provider<'a>(
    config: &Config,
    client: &'a RestClient,
    dt: &DtArgs,
) -> Result<ModelProvider<'a, RestClient>> {
    if let Some(resource_group) = &dt.resource_group {
        debug!(dt = %dt.name, resource_group = %resource_group, "Resource group is not used for data-plane calls");
    }
    let session = config.twins_session(&dt.name, dt.login.clone())?;
    Ok(ModelProvider::new(client, session))
}

fn summary_json(summary: &TransferSummary) -> serde_json::Value {
    json!({
        "configurations": summary.configurations,
        "devices": summary.devices,
        "modules": summary.modules,
        "skipped": summary.skipped,
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
