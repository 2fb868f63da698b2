//! Maps either upstream presence shape onto one `PresenceSnapshot`.
//!
//! Title metadata is best-effort: a failed lookup keeps the coarser state
//! computed before it.

use tracing::{debug, warn};

use super::{PresenceSnapshot, HOME_TITLE, ONLINE_TITLE};
use crate::error::Result;
use crate::xbox::api::ConsoleApi;
use crate::xbox::models::{PersonRecord, PresenceRecord, PresenceShape, RawPresence};

#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceNormalizer;

impl PresenceNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Fetch the raw payload for `shape`.
    pub async fn fetch(
        &self,
        api: &dyn ConsoleApi,
        shape: PresenceShape,
        own_id: &str,
    ) -> Result<RawPresence> {
        match shape {
            PresenceShape::FriendsBatch => {
                Ok(RawPresence::FriendsBatch(api.get_friends_batch(own_id).await?))
            }
            PresenceShape::Dedicated => Ok(RawPresence::Dedicated(api.get_presence(own_id).await?)),
        }
    }

    pub async fn normalize(
        &self,
        api: &dyn ConsoleApi,
        own_id: &str,
        raw: &RawPresence,
    ) -> PresenceSnapshot {
        match raw {
            RawPresence::FriendsBatch(people) => self.from_friends_batch(api, own_id, people).await,
            RawPresence::Dedicated(record) => self.from_dedicated(record),
        }
    }

    async fn from_friends_batch(
        &self,
        api: &dyn ConsoleApi,
        own_id: &str,
        people: &[PersonRecord],
    ) -> PresenceSnapshot {
        let Some(own) = people.iter().find(|p| p.xuid == own_id) else {
            warn!(
                own_id,
                batch_len = people.len(),
                "presence: own record missing from friends batch, reporting offline"
            );
            return PresenceSnapshot::offline();
        };

        let Some(state) = own
            .presence_state
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            debug!(own_id, "presence: own record has no presence state, reporting offline");
            return PresenceSnapshot::offline();
        };
        if state.eq_ignore_ascii_case("offline") {
            return PresenceSnapshot::offline();
        }

        let text = own
            .presence_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(ONLINE_TITLE);
        let tentative = PresenceSnapshot::online(text);

        let Some(title_id) = own
            .presence_details
            .iter()
            .find(|d| d.is_active_primary_game())
            .and_then(|d| d.title_id.as_deref())
        else {
            return tentative;
        };

        match api.get_title_info(title_id).await {
            Ok(title) => {
                debug!(title_id, name = %title.name, "presence: active game resolved");
                let image = title.best_image_url().unwrap_or_default().to_string();
                PresenceSnapshot::playing(title.name, image)
            }
            Err(e) => {
                warn!(title_id, error = %e, "presence: title lookup failed, keeping online state");
                tentative
            }
        }
    }

    fn from_dedicated(&self, record: &PresenceRecord) -> PresenceSnapshot {
        if !record.state.eq_ignore_ascii_case("online") {
            return PresenceSnapshot::offline();
        }
        match record.title_records.first() {
            None => PresenceSnapshot::online(HOME_TITLE),
            Some(title) => {
                PresenceSnapshot::playing(title.name.clone(), title.icon_url().unwrap_or_default())
            }
        }
    }
}
