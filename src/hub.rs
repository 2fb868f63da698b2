//! Boundary towards the remote-control hub.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::entity::{Attributes, MediaPlayerEntity};
use crate::error::Result;

/// Device state reported to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Connected => "CONNECTED",
            DeviceState::Connecting => "CONNECTING",
            DeviceState::Disconnected => "DISCONNECTED",
            DeviceState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[async_trait]
pub trait Hub: Send + Sync {
    async fn set_device_state(&self, state: DeviceState);

    async fn add_available_entity(&self, entity: &MediaPlayerEntity);

    async fn add_configured_entity(&self, entity: &MediaPlayerEntity);

    async fn update_attributes(&self, entity_id: &str, attributes: &Attributes) -> Result<()>;
}

/// Hub stand-in that writes every interaction to the log.
#[derive(Debug, Default)]
pub struct LoggingHub;

#[async_trait]
impl Hub for LoggingHub {
    async fn set_device_state(&self, state: DeviceState) {
        info!(%state, "hub: device state");
    }

    async fn add_available_entity(&self, entity: &MediaPlayerEntity) {
        info!(entity_id = %entity.id(), name = %entity.name(), "hub: entity available");
    }

    async fn add_configured_entity(&self, entity: &MediaPlayerEntity) {
        info!(entity_id = %entity.id(), "hub: entity configured");
    }

    async fn update_attributes(&self, entity_id: &str, attributes: &Attributes) -> Result<()> {
        let payload = serde_json::to_string(attributes)?;
        info!(entity_id, attributes = %payload, "hub: attributes updated");
        Ok(())
    }
}
