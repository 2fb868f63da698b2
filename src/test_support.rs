//! Scriptable fakes for the console, connector, token store and hub seams.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::TokenStore;
use crate::entity::{Attributes, MediaPlayerEntity};
use crate::error::{Result, XboxError};
use crate::hub::{DeviceState, Hub};
use crate::presence::ArtworkSearch;
use crate::xbox::api::{ConsoleApi, ConsoleConnector, TransportSettings};
use crate::xbox::models::{
    OAuth2Tokens, PersonRecord, PresenceRecord, PresenceShape, ProfileRecord, ProfileSetting,
    ProfileUser, TitleRecord, TokenSet,
};

pub const OWN_XUID: &str = "2533274800000001";
pub const LIVEID: &str = "FD00112233";
pub const AUTH_URL: &str = "https://login.live.com/oauth20_authorize.srf?client_id=test";

pub fn oauth_tokens(refresh: &str) -> OAuth2Tokens {
    OAuth2Tokens {
        token_type: "bearer".into(),
        expires_in: 3600,
        scope: "Xboxlive.signin Xboxlive.offline_access".into(),
        access_token: format!("access-for-{refresh}"),
        refresh_token: Some(refresh.into()),
        user_id: "abc123".into(),
        issued: Utc::now(),
        extra: Map::new(),
    }
}

pub fn token_set() -> TokenSet {
    TokenSet {
        liveid: LIVEID.into(),
        tokens: oauth_tokens("refresh-0"),
    }
}

/// Upstream behaviour shared by every console a connector hands out.
#[derive(Debug)]
pub struct FakeState {
    pub own_id: String,
    pub gamertag: String,
    pub people: Option<Vec<PersonRecord>>,
    pub presence: Option<PresenceRecord>,
    pub titles: HashMap<String, TitleRecord>,
    pub fail_titles: bool,
    pub fail_profile: bool,
    pub fail_refresh: bool,
    pub fail_exchange: bool,
    /// Number of upcoming presence fetches (either shape) that fail.
    pub fail_presence_times: usize,
    pub presence_calls: usize,
    pub title_calls: usize,
    pub profile_calls: usize,
    pub refresh_calls: usize,
    pub exchanged_codes: Vec<String>,
}

impl FakeState {
    pub fn new(own_id: &str) -> Self {
        Self {
            own_id: own_id.to_string(),
            gamertag: "MasterChief117".into(),
            people: None,
            presence: None,
            titles: HashMap::new(),
            fail_titles: false,
            fail_profile: false,
            fail_refresh: false,
            fail_exchange: false,
            fail_presence_times: 0,
            presence_calls: 0,
            title_calls: 0,
            profile_calls: 0,
            refresh_calls: 0,
            exchanged_codes: Vec::new(),
        }
    }

    fn take_presence_failure(&mut self) -> Result<()> {
        self.presence_calls += 1;
        if self.fail_presence_times > 0 {
            self.fail_presence_times -= 1;
            return Err(XboxError::PresenceFetch("scripted failure".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ConnectionLog {
    events: Vec<String>,
    next_id: usize,
    open_now: usize,
    max_open: usize,
}

pub struct FakeConsole {
    id: usize,
    state: Arc<Mutex<FakeState>>,
    log: Option<Arc<Mutex<ConnectionLog>>>,
    authorized: AtomicBool,
    closed: AtomicBool,
}

impl FakeConsole {
    /// Standalone console, already authorized as `own_id`.
    pub fn new(own_id: &str) -> Self {
        Self {
            id: 0,
            state: Arc::new(Mutex::new(FakeState::new(own_id))),
            log: None,
            authorized: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    pub fn set_title(&self, title: TitleRecord) {
        let mut state = self.state.lock().unwrap();
        state.titles.insert(title.title_id.clone(), title);
    }

    pub fn fail_titles(&self, fail: bool) {
        self.state.lock().unwrap().fail_titles = fail;
    }

    pub fn title_calls(&self) -> usize {
        self.state.lock().unwrap().title_calls
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(XboxError::TransportClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl ConsoleApi for FakeConsole {
    fn authorization_url(&self) -> String {
        AUTH_URL.to_string()
    }

    fn preferred_shape(&self) -> PresenceShape {
        PresenceShape::FriendsBatch
    }

    fn user_id(&self) -> Option<String> {
        self.authorized
            .load(Ordering::SeqCst)
            .then(|| self.state.lock().unwrap().own_id.clone())
    }

    async fn exchange_auth_code(&self, code: &str) -> Result<OAuth2Tokens> {
        self.ensure_open()?;
        let mut state = self.state.lock().unwrap();
        state.exchanged_codes.push(code.to_string());
        if state.fail_exchange {
            return Err(XboxError::AuthExchange("invalid_grant".into()));
        }
        self.authorized.store(true, Ordering::SeqCst);
        Ok(oauth_tokens(&format!("refresh-from-{code}")))
    }

    async fn refresh_tokens(&self, _tokens: &TokenSet) -> Result<OAuth2Tokens> {
        self.ensure_open()?;
        let mut state = self.state.lock().unwrap();
        state.refresh_calls += 1;
        if state.fail_refresh {
            return Err(XboxError::Upstream {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        self.authorized.store(true, Ordering::SeqCst);
        Ok(oauth_tokens(&format!("refresh-{}", state.refresh_calls)))
    }

    async fn get_own_profile(&self, user_id: &str) -> Result<ProfileRecord> {
        self.ensure_open()?;
        let mut state = self.state.lock().unwrap();
        state.profile_calls += 1;
        if state.fail_profile {
            return Err(XboxError::ProfileLookup("scripted failure".into()));
        }
        Ok(ProfileRecord {
            profile_users: vec![ProfileUser {
                id: user_id.to_string(),
                settings: vec![ProfileSetting {
                    id: "ModernGamertag".into(),
                    value: state.gamertag.clone(),
                }],
            }],
        })
    }

    async fn get_friends_batch(&self, user_id: &str) -> Result<Vec<PersonRecord>> {
        self.ensure_open()?;
        let mut state = self.state.lock().unwrap();
        state.take_presence_failure()?;
        Ok(state.people.clone().unwrap_or_else(|| {
            vec![PersonRecord {
                xuid: user_id.to_string(),
                presence_state: Some("Online".into()),
                presence_text: Some("Home".into()),
                ..Default::default()
            }]
        }))
    }

    async fn get_presence(&self, user_id: &str) -> Result<PresenceRecord> {
        self.ensure_open()?;
        let mut state = self.state.lock().unwrap();
        state.take_presence_failure()?;
        Ok(state.presence.clone().unwrap_or_else(|| PresenceRecord {
            xuid: user_id.to_string(),
            state: "Online".into(),
            title_records: vec![],
        }))
    }

    async fn get_title_info(&self, title_id: &str) -> Result<TitleRecord> {
        self.ensure_open()?;
        let mut state = self.state.lock().unwrap();
        state.title_calls += 1;
        if state.fail_titles {
            return Err(XboxError::TitleLookup("scripted failure".into()));
        }
        state
            .titles
            .get(title_id)
            .cloned()
            .ok_or_else(|| XboxError::TitleLookup(format!("unknown title {title_id}")))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(log) = &self.log {
            let mut log = log.lock().unwrap();
            log.events.push(format!("close#{}", self.id));
            log.open_now -= 1;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hands out `FakeConsole`s and records their open/close order.
pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
    log: Arc<Mutex<ConnectionLog>>,
    fail_open: AtomicBool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::new(OWN_XUID))),
            log: Arc::new(Mutex::new(ConnectionLog::default())),
            fail_open: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &Arc<Mutex<FakeState>> {
        &self.state
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().events.clone()
    }

    pub fn opened(&self) -> usize {
        self.log.lock().unwrap().next_id
    }

    pub fn currently_open(&self) -> usize {
        self.log.lock().unwrap().open_now
    }

    pub fn max_concurrently_open(&self) -> usize {
        self.log.lock().unwrap().max_open
    }
}

impl ConsoleConnector for FakeConnector {
    fn open(&self, _settings: &TransportSettings) -> Result<Arc<dyn ConsoleApi>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(XboxError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "tls init failed",
            )));
        }
        let mut log = self.log.lock().unwrap();
        let id = log.next_id;
        log.next_id += 1;
        log.open_now += 1;
        log.max_open = log.max_open.max(log.open_now);
        log.events.push(format!("open#{id}"));
        Ok(Arc::new(FakeConsole {
            id,
            state: self.state.clone(),
            log: Some(self.log.clone()),
            authorized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<TokenSet>>,
    persisted: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryTokenStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(tokens: TokenSet) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
            ..Default::default()
        }
    }

    pub fn current(&self) -> Option<TokenSet> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn persist_count(&self) -> usize {
        self.persisted.load(Ordering::SeqCst)
    }

    pub fn fail_persist(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load_tokens(&self) -> Option<TokenSet> {
        self.current()
    }

    async fn persist_tokens(&self, tokens: &TokenSet) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(XboxError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            )));
        }
        *self.tokens.lock().unwrap() = Some(tokens.clone());
        self.persisted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hub that remembers everything it was told.
#[derive(Default)]
pub struct RecordingHub {
    states: Mutex<Vec<DeviceState>>,
    available: Mutex<Vec<String>>,
    configured: Mutex<Vec<String>>,
    updates: Mutex<Vec<(String, Attributes)>>,
    fail_updates: AtomicBool,
}

impl RecordingHub {
    pub fn last_state(&self) -> Option<DeviceState> {
        self.states.lock().unwrap().last().copied()
    }

    pub fn available(&self) -> Vec<String> {
        self.available.lock().unwrap().clone()
    }

    pub fn configured(&self) -> Vec<String> {
        self.configured.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, Attributes)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Hub for RecordingHub {
    async fn set_device_state(&self, state: DeviceState) {
        self.states.lock().unwrap().push(state);
    }

    async fn add_available_entity(&self, entity: &MediaPlayerEntity) {
        self.available.lock().unwrap().push(entity.id().to_string());
    }

    async fn add_configured_entity(&self, entity: &MediaPlayerEntity) {
        self.configured.lock().unwrap().push(entity.id().to_string());
    }

    async fn update_attributes(&self, entity_id: &str, attributes: &Attributes) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(XboxError::Upstream {
                status: 503,
                body: "hub unavailable".into(),
            });
        }
        self.updates
            .lock()
            .unwrap()
            .push((entity_id.to_string(), attributes.clone()));
        Ok(())
    }
}

/// Artwork search that always answers with the same URL.
pub struct StaticArtwork {
    url: String,
    calls: AtomicUsize,
}

impl StaticArtwork {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtworkSearch for StaticArtwork {
    async fn search(&self, _title: &str, _api_key: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.url.clone()))
    }
}
