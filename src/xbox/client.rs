use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::api::{ConsoleApi, ConsoleConnector, TransportSettings};
use super::auth::OAuthClient;
use super::headers::{build_xbox_live_headers, contract_versions, CorrelationVector, XblAuthorization};
use super::models::{
    OAuth2Tokens, PeopleBatch, PersonRecord, PresenceRecord, PresenceShape, ProfileRecord,
    TitleRecord, TokenSet,
};
use super::xbl_auth;
use crate::error::{Result, XboxError};

// NOTE:
// Every data call needs an XSTS token. `xbl_auth` rebuilds the traditional
// chain (Windows Live -> user token -> XSTS for http://xboxlive.com) on every
// code exchange and refresh; this client only keeps the resulting claims.

const PROFILE_SETTINGS: &str = "GameDisplayName,Gamertag,ModernGamertag";

/// Title shown while the console sits on the dashboard.
const DASHBOARD_TITLE: &str = "Home";

/// Opens `XboxLiveClient` transport sessions.
#[derive(Debug, Clone)]
pub struct XboxLiveConnector {
    oauth: OAuthClient,
    language: String,
}

impl XboxLiveConnector {
    pub fn new(oauth: OAuthClient, language: impl Into<String>) -> Self {
        Self {
            oauth,
            language: language.into(),
        }
    }

    /// Client registration and language from the environment
    /// (`XBOX_CLIENT_ID`, `XBOX_CLIENT_SECRET`, `XBOX_LANGUAGE`).
    pub fn from_env() -> Self {
        let language = crate::util::env::env_opt("XBOX_LANGUAGE")
            .unwrap_or_else(|| "en-US".to_string());
        Self::new(OAuthClient::from_env(), language)
    }
}

impl ConsoleConnector for XboxLiveConnector {
    fn open(&self, settings: &TransportSettings) -> Result<Arc<dyn ConsoleApi>> {
        let client = XboxLiveClient::new(self.oauth.clone(), settings, &self.language)?;
        Ok(Arc::new(client))
    }
}

/// Xbox Live REST client bound to one `reqwest` transport.
pub struct XboxLiveClient {
    http: RwLock<Option<Client>>,
    oauth: OAuthClient,
    language: String,
    auth: RwLock<Option<XblAuthorization>>,
    correlation_vector: Mutex<CorrelationVector>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserPresenceResponse {
    xuid: String,
    state: String,
    devices: Vec<PresenceDevice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PresenceDevice {
    #[serde(rename = "type")]
    device_type: String,
    titles: Vec<PresenceTitle>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PresenceTitle {
    id: String,
    name: String,
    placement: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TitleHubResponse {
    titles: Vec<TitleRecord>,
}

impl XboxLiveClient {
    pub fn new(oauth: OAuthClient, settings: &TransportSettings, language: &str) -> Result<Self> {
        // Strict TLS: rustls with the bundled webpki roots, https only.
        let http = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(true)
            .https_only(true)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .pool_idle_timeout(settings.pool_idle_timeout)
            .user_agent(settings.user_agent.as_str())
            .build()?;
        debug!(
            connect_timeout_ms = settings.connect_timeout.as_millis() as u64,
            request_timeout_ms = settings.request_timeout.as_millis() as u64,
            "xbox::client: transport opened"
        );
        Ok(Self {
            http: RwLock::new(Some(http)),
            oauth,
            language: language.to_string(),
            auth: RwLock::new(None),
            correlation_vector: Mutex::new(CorrelationVector::new()),
        })
    }

    fn http(&self) -> Result<Client> {
        let guard = self.http.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(XboxError::TransportClosed)
    }

    fn authorization(&self) -> Result<XblAuthorization> {
        let guard = self.auth.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or_else(|| {
            XboxError::MissingCredentials("client has not been authorized yet".to_string())
        })
    }

    fn next_cv(&self) -> String {
        let mut cv = self
            .correlation_vector
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        cv.next()
    }

    fn ensure_open(&self) -> Result<()> {
        self.http().map(|_| ())
    }

    fn store_authorization(&self, auth: XblAuthorization) {
        *self.auth.write().unwrap_or_else(|e| e.into_inner()) = Some(auth);
    }

    fn authorized(&self, req: RequestBuilder, contract_version: &str) -> Result<RequestBuilder> {
        let auth = self.authorization()?;
        let headers =
            build_xbox_live_headers(&auth, contract_version, &self.next_cv(), &self.language)?;
        Ok(req.headers(headers))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(XboxError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<T>().await?)
    }

    async fn fetch_title(&self, title_id: &str) -> Result<TitleRecord> {
        let xuid = self.authorization()?.xuid;
        let url = format!(
            "https://titlehub.xboxlive.com/users/xuid({})/titles/titleid({})/decoration/image,detail",
            xuid, title_id
        );
        let req = self.authorized(self.http()?.get(&url), contract_versions::TITLE_HUB)?;
        let resp: TitleHubResponse = self.send_json(req).await?;
        resp.titles
            .into_iter()
            .next()
            .ok_or_else(|| XboxError::TitleLookup(format!("title {} not found", title_id)))
    }
}

/// Active non-dashboard titles, foreground (`Full` placement) first.
fn flatten_presence_titles(devices: Vec<PresenceDevice>) -> Vec<TitleRecord> {
    let mut titles: Vec<(bool, TitleRecord)> = devices
        .into_iter()
        .flat_map(|device| device.titles)
        .filter(|t| t.state.as_deref().map_or(true, |s| s.eq_ignore_ascii_case("active")))
        .filter(|t| !t.name.is_empty() && t.name != DASHBOARD_TITLE)
        .map(|t| {
            let foreground = t
                .placement
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case("full"));
            (
                foreground,
                TitleRecord {
                    title_id: t.id,
                    name: t.name,
                    display_image: None,
                    images: Vec::new(),
                },
            )
        })
        .collect();
    // Stable sort keeps upstream order within each placement group.
    titles.sort_by_key(|(foreground, _)| !*foreground);
    titles.into_iter().map(|(_, t)| t).collect()
}

#[async_trait]
impl ConsoleApi for XboxLiveClient {
    fn authorization_url(&self) -> String {
        self.oauth.authorization_url()
    }

    fn preferred_shape(&self) -> PresenceShape {
        PresenceShape::FriendsBatch
    }

    fn user_id(&self) -> Option<String> {
        let guard = self.auth.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|a| a.xuid.clone())
    }

    async fn exchange_auth_code(&self, code: &str) -> Result<OAuth2Tokens> {
        self.ensure_open()?;
        info!("xbox::client: exchanging authorization code");
        let (tokens, auth) = xbl_auth::exchange_code(&self.oauth, code)
            .await
            .map_err(XboxError::into_auth)?;
        self.store_authorization(auth);
        Ok(tokens)
    }

    async fn refresh_tokens(&self, tokens: &TokenSet) -> Result<OAuth2Tokens> {
        self.ensure_open()?;
        let refresh_token = tokens
            .tokens
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| XboxError::MissingCredentials("no refresh token stored".to_string()))?;
        debug!("xbox::client: refreshing OAuth2 tokens");
        let (refreshed, auth) = xbl_auth::refresh(&self.oauth, refresh_token)
            .await
            .map_err(XboxError::into_auth)?;
        self.store_authorization(auth);
        Ok(refreshed)
    }

    async fn get_own_profile(&self, user_id: &str) -> Result<ProfileRecord> {
        let url = format!(
            "https://profile.xboxlive.com/users/xuid({})/profile/settings?settings={}",
            user_id, PROFILE_SETTINGS
        );
        let req = self.authorized(self.http()?.get(&url), contract_versions::PROFILE)?;
        self.send_json(req)
            .await
            .map_err(|e| XboxError::ProfileLookup(e.to_string()))
    }

    async fn get_friends_batch(&self, user_id: &str) -> Result<Vec<PersonRecord>> {
        let url = "https://peoplehub.xboxlive.com/users/me/people/batch/decoration/presencedetail";
        let req = self
            .authorized(self.http()?.post(url), contract_versions::PEOPLE_HUB)?
            .json(&json!({ "xuids": [user_id] }));
        let batch: PeopleBatch = self
            .send_json(req)
            .await
            .map_err(|e| XboxError::PresenceFetch(e.to_string()))?;
        Ok(batch.people)
    }

    async fn get_presence(&self, user_id: &str) -> Result<PresenceRecord> {
        let url = format!("https://userpresence.xboxlive.com/users/xuid({})?level=all", user_id);
        let req = self.authorized(self.http()?.get(&url), contract_versions::PRESENCE)?;
        let raw: UserPresenceResponse = self
            .send_json(req)
            .await
            .map_err(|e| XboxError::PresenceFetch(e.to_string()))?;
        debug!(
            state = %raw.state,
            devices = ?raw.devices.iter().map(|d| d.device_type.as_str()).collect::<Vec<_>>(),
            "xbox::client: presence fetched"
        );

        let mut title_records = flatten_presence_titles(raw.devices);
        // Icon decoration for the foreground title; presence itself has none.
        if let Some(first) = title_records.first_mut() {
            match self.fetch_title(&first.title_id).await {
                Ok(info) => {
                    first.display_image = info.display_image;
                    first.images = info.images;
                }
                Err(e) => {
                    warn!(title_id = %first.title_id, error = %e, "xbox::client: title decoration failed")
                }
            }
        }

        Ok(PresenceRecord {
            xuid: raw.xuid,
            state: raw.state,
            title_records,
        })
    }

    async fn get_title_info(&self, title_id: &str) -> Result<TitleRecord> {
        self.fetch_title(title_id).await.map_err(|e| match e {
            e @ XboxError::TitleLookup(_) => e,
            other => XboxError::TitleLookup(other.to_string()),
        })
    }

    async fn close(&self) {
        let was_open = self
            .http
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        self.auth.write().unwrap_or_else(|e| e.into_inner()).take();
        if was_open {
            debug!("xbox::client: transport closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.http.read().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}
