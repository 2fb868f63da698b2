//! Upstream record types for the Xbox Live services the bridge talks to.
//!
//! Field names follow the wire format: people hub records are camelCase while
//! their presence details are PascalCase.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// OAuth2 token bundle as returned by `login.live.com` and persisted verbatim.
///
/// Unknown provider claims are kept in `extra` so a load/save cycle does not
/// drop anything the token endpoint returned.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Tokens {
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "Utc::now")]
    pub issued: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OAuth2Tokens {
    pub fn is_refreshable(&self) -> bool {
        !self.access_token.is_empty()
            && self
                .refresh_token
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }

    /// `None` when `issued + expires_in` is out of range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in).and_then(|d| self.issued.checked_add_signed(d))
    }

    /// Expired, expiring within the next minute, or carrying an unusable
    /// lifetime.
    pub fn is_expired(&self) -> bool {
        match self.expires_at() {
            Some(at) => at < Utc::now() + Duration::seconds(60),
            None => true,
        }
    }
}

// Tokens are secrets: never print them.
impl fmt::Debug for OAuth2Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Tokens")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("user_id", &self.user_id)
            .field("issued", &self.issued)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Tokens plus the console identifier they were issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub liveid: String,
    pub tokens: OAuth2Tokens,
}

impl TokenSet {
    /// Build a token set from persisted parts.
    ///
    /// Partial or corrupt input yields `None`: a token set is either fully
    /// present and refreshable or treated as absent.
    pub fn from_parts(liveid: Option<&str>, tokens: Option<&Value>) -> Option<Self> {
        let liveid = liveid.map(str::trim).filter(|s| !s.is_empty())?;
        let tokens = tokens.filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))?;
        let tokens: OAuth2Tokens = serde_json::from_value(tokens.clone()).ok()?;
        if !tokens.is_refreshable() {
            return None;
        }
        Some(Self {
            liveid: liveid.to_string(),
            tokens,
        })
    }

    pub fn tokens_json(&self) -> Value {
        serde_json::to_value(&self.tokens).unwrap_or(Value::Null)
    }
}

/// One entry of a people hub batch response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonRecord {
    pub xuid: String,
    pub gamertag: Option<String>,
    pub presence_state: Option<String>,
    pub presence_text: Option<String>,
    pub presence_details: Vec<PresenceDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PresenceDetail {
    pub is_broadcasting: bool,
    pub device: Option<String>,
    pub presence_text: Option<String>,
    pub state: Option<String>,
    pub title_id: Option<String>,
    pub title_type: Option<String>,
    pub is_primary: bool,
    pub is_game: bool,
    pub rich_presence_text: Option<String>,
}

impl PresenceDetail {
    /// Active, primary, game title with a known id.
    pub fn is_active_primary_game(&self) -> bool {
        self.state.as_deref() == Some("Active")
            && self.title_id.as_deref().is_some_and(|id| !id.is_empty())
            && self.is_game
            && self.is_primary
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeopleBatch {
    #[serde(default)]
    pub people: Vec<PersonRecord>,
}

/// Dedicated presence record, flattened to its title records.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceRecord {
    pub xuid: String,
    pub state: String,
    pub title_records: Vec<TitleRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TitleRecord {
    pub title_id: String,
    pub name: String,
    pub display_image: Option<String>,
    pub images: Vec<TitleImage>,
}

impl TitleRecord {
    /// First image whose type marker is `Icon`.
    pub fn icon_url(&self) -> Option<&str> {
        self.images
            .iter()
            .find(|img| img.image_type.eq_ignore_ascii_case("Icon"))
            .map(|img| img.url.as_str())
            .filter(|u| !u.is_empty())
    }

    /// Display image, else the first image of any type.
    pub fn best_image_url(&self) -> Option<&str> {
        self.display_image
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| {
                self.images
                    .iter()
                    .map(|img| img.url.as_str())
                    .find(|u| !u.is_empty())
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TitleImage {
    pub url: String,
    #[serde(rename = "type")]
    pub image_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileRecord {
    pub profile_users: Vec<ProfileUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUser {
    pub id: String,
    pub settings: Vec<ProfileSetting>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileSetting {
    pub id: String,
    pub value: String,
}

impl ProfileRecord {
    /// Gamertag of the first profile user, preferring the modern form.
    pub fn gamertag(&self) -> Option<String> {
        let user = self.profile_users.first()?;
        ["ModernGamertag", "Gamertag", "GameDisplayName"]
            .iter()
            .find_map(|key| {
                user.settings
                    .iter()
                    .find(|s| s.id == *key && !s.value.trim().is_empty())
                    .map(|s| s.value.clone())
            })
    }
}

/// Which upstream presence capability a session polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceShape {
    /// People hub batch decorated with presence details.
    FriendsBatch,
    /// Dedicated user presence endpoint with title records.
    Dedicated,
}

impl fmt::Display for PresenceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceShape::FriendsBatch => f.write_str("friends_batch"),
            PresenceShape::Dedicated => f.write_str("presence"),
        }
    }
}

/// Configured shape choice; `Auto` defers to the client capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapePreference {
    #[default]
    Auto,
    Fixed(PresenceShape),
}

impl ShapePreference {
    pub fn resolve(self, capability: PresenceShape) -> PresenceShape {
        match self {
            ShapePreference::Auto => capability,
            ShapePreference::Fixed(shape) => shape,
        }
    }
}

impl FromStr for ShapePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(ShapePreference::Auto),
            "friends_batch" | "friends" | "people" => {
                Ok(ShapePreference::Fixed(PresenceShape::FriendsBatch))
            }
            "presence" | "dedicated" => Ok(ShapePreference::Fixed(PresenceShape::Dedicated)),
            other => Err(format!("unknown presence shape '{other}'")),
        }
    }
}

/// A raw presence payload in whichever shape the session polls.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPresence {
    FriendsBatch(Vec<PersonRecord>),
    Dedicated(PresenceRecord),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_json() -> Value {
        json!({
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "Xboxlive.signin Xboxlive.offline_access",
            "access_token": "EwA-access",
            "refresh_token": "M.R3-refresh",
            "user_id": "abc123",
            "issued": "2025-06-01T12:00:00.000000+00:00"
        })
    }

    #[test]
    fn token_set_requires_liveid_and_refreshable_tokens() {
        let tokens = token_json();
        assert!(TokenSet::from_parts(Some("FD00112233"), Some(&tokens)).is_some());
        assert!(TokenSet::from_parts(None, Some(&tokens)).is_none());
        assert!(TokenSet::from_parts(Some("  "), Some(&tokens)).is_none());
        assert!(TokenSet::from_parts(Some("FD00112233"), None).is_none());
        assert!(TokenSet::from_parts(Some("FD00112233"), Some(&json!({}))).is_none());

        let mut no_refresh = token_json();
        no_refresh["refresh_token"] = Value::Null;
        assert!(TokenSet::from_parts(Some("FD00112233"), Some(&no_refresh)).is_none());

        let corrupt = json!({"access_token": 12});
        assert!(TokenSet::from_parts(Some("FD00112233"), Some(&corrupt)).is_none());
    }

    #[test]
    fn out_of_range_lifetime_counts_as_expired() {
        let mut raw = token_json();
        raw["expires_in"] = json!(10_000_000_000_000_i64);
        let set = TokenSet::from_parts(Some("FD00112233"), Some(&raw)).expect("token set");
        assert_eq!(set.tokens.expires_at(), None);
        assert!(set.tokens.is_expired());

        raw["expires_in"] = json!(i64::MIN);
        let set = TokenSet::from_parts(Some("FD00112233"), Some(&raw)).expect("token set");
        assert!(set.tokens.is_expired());

        let mut fresh = set.tokens.clone();
        fresh.expires_in = 3600;
        fresh.issued = Utc::now();
        assert!(!fresh.is_expired());
    }

    #[test]
    fn tokens_keep_unknown_claims() {
        let mut raw = token_json();
        raw["foci"] = json!("1");
        let set = TokenSet::from_parts(Some("FD00112233"), Some(&raw)).expect("token set");
        let back = set.tokens_json();
        assert_eq!(back["foci"], json!("1"));
        assert_eq!(back["refresh_token"], json!("M.R3-refresh"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let set = TokenSet::from_parts(Some("FD00112233"), Some(&token_json())).unwrap();
        let printed = format!("{:?}", set);
        assert!(!printed.contains("EwA-access"));
        assert!(!printed.contains("M.R3-refresh"));
    }

    #[test]
    fn people_batch_parses_mixed_case_fields() {
        let raw = json!({
            "people": [{
                "xuid": "2533274800000001",
                "presenceState": "Online",
                "presenceText": "Playing Halo",
                "presenceDetails": [{
                    "IsBroadcasting": false,
                    "Device": "Scarlett",
                    "State": "Active",
                    "TitleId": "2043073184",
                    "IsPrimary": true,
                    "IsGame": true
                }]
            }]
        });
        let batch: PeopleBatch = serde_json::from_value(raw).unwrap();
        let detail = &batch.people[0].presence_details[0];
        assert!(detail.is_active_primary_game());
        assert_eq!(batch.people[0].presence_state.as_deref(), Some("Online"));
    }

    #[test]
    fn profile_gamertag_prefers_modern_setting() {
        let raw = json!({
            "profileUsers": [{
                "id": "2533274800000001",
                "settings": [
                    {"id": "Gamertag", "value": "OldTag"},
                    {"id": "ModernGamertag", "value": "NewTag"}
                ]
            }]
        });
        let profile: ProfileRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(profile.gamertag().as_deref(), Some("NewTag"));
        assert_eq!(ProfileRecord::default().gamertag(), None);
    }

    #[test]
    fn shape_preference_parses_config_values() {
        assert_eq!("auto".parse::<ShapePreference>(), Ok(ShapePreference::Auto));
        assert_eq!(
            "Presence".parse::<ShapePreference>(),
            Ok(ShapePreference::Fixed(PresenceShape::Dedicated))
        );
        assert!("bogus".parse::<ShapePreference>().is_err());
        assert_eq!(
            ShapePreference::Auto.resolve(PresenceShape::Dedicated),
            PresenceShape::Dedicated
        );
    }
}
