//! The single media-player entity the driver exposes.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::hub::Hub;
use crate::presence::{PowerState, PresenceSnapshot, OFFLINE_TITLE};

pub type Attributes = IndexMap<String, String>;

pub const ENTITY_ID_PREFIX: &str = "xbox-presence-";

pub mod attr {
    pub const STATE: &str = "state";
    pub const MEDIA_TITLE: &str = "media_title";
    pub const MEDIA_ARTIST: &str = "media_artist";
    pub const MEDIA_IMAGE_URL: &str = "media_image_url";
    pub const MEDIA_TYPE: &str = "media_type";
}

const MEDIA_ARTIST: &str = "Xbox Live";
const MEDIA_TYPE: &str = "GAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    Power,
    Play,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaPlayerEntity {
    id: String,
    name: String,
    features: Vec<Feature>,
    attributes: Attributes,
}

impl MediaPlayerEntity {
    pub fn new(liveid: &str, gamertag: &str) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(attr::STATE.into(), PowerState::Off.as_str().into());
        attributes.insert(attr::MEDIA_TITLE.into(), OFFLINE_TITLE.into());
        attributes.insert(attr::MEDIA_ARTIST.into(), MEDIA_ARTIST.into());
        attributes.insert(attr::MEDIA_IMAGE_URL.into(), String::new());
        attributes.insert(attr::MEDIA_TYPE.into(), MEDIA_TYPE.into());
        Self {
            id: entity_id(liveid),
            name: format!("Gamertag: {gamertag}"),
            features: vec![Feature::Power, Feature::Play],
            attributes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Last published attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Keys whose value differs from what was last published.
    pub fn diff(&self, snapshot: &PresenceSnapshot) -> Attributes {
        [
            (attr::STATE, snapshot.power_state.as_str()),
            (attr::MEDIA_TITLE, snapshot.title.as_str()),
            (attr::MEDIA_IMAGE_URL, snapshot.artwork_url.as_str()),
        ]
        .into_iter()
        .filter(|(key, value)| self.attributes.get(*key).map(String::as_str) != Some(*value))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
    }

    /// Push the changed keys to the hub and remember them.
    ///
    /// Returns the delta that was sent (empty when nothing changed).
    pub async fn publish(&mut self, snapshot: &PresenceSnapshot, hub: &dyn Hub) -> Result<Attributes> {
        let changes = self.diff(snapshot);
        if changes.is_empty() {
            debug!(entity_id = %self.id, "entity: no attribute changes");
            return Ok(changes);
        }
        hub.update_attributes(&self.id, &changes).await?;
        for (key, value) in &changes {
            self.attributes.insert(key.clone(), value.clone());
        }
        Ok(changes)
    }
}

pub fn entity_id(liveid: &str) -> String {
    format!("{ENTITY_ID_PREFIX}{liveid}")
}
