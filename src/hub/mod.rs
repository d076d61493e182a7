// src/hub/mod.rs

pub mod client;
pub mod protocol;

pub use client::{spawn_hub_client, HubHandle, WEBUI_URL_ENV};
pub use protocol::{InboundMessage, OutboundMessage};
