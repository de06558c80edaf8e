//! iotops REST - HTTP implementations of the iotops collaborator traits
//!
//! A single [`RestClient`] talks to both data planes:
//! - IoT Hub registry, twins, and configurations ([`iotops_core::HubApi`])
//! - Digital Twins models ([`iotops_core::ModelApi`])

pub mod client;
pub mod hub;
pub mod paging;
pub mod twins;

pub use client::{error_message, RestClient, DEFAULT_TIMEOUT_SECS};
pub use hub::{HUB_API_VERSION, HUB_DNS_SUFFIX};
pub use paging::{parse_page, Page};
pub use twins::TWINS_API_VERSION;
