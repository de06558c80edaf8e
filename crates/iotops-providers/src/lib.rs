//! iotops providers - the operations behind the `hub state` and `dt model`
//! commands
//!
//! Providers hold an immutable session and a collaborator implementing
//! [`iotops_core::HubApi`] or [`iotops_core::ModelApi`]; every service call
//! is awaited before the next one starts.

pub mod error;
pub mod model;
pub mod state;

#[cfg(test)]
mod testing;

pub use error::{ProviderError, Result};
pub use model::{process_directory, process_json_arg, DeleteSummary, ModelProvider};
pub use state::{StateProvider, TransferSummary};
