//! Capability surface of the console API.
//!
//! The session manager, setup flow and poll loop only ever see these traits;
//! `XboxLiveClient` is the production implementation and tests plug in fakes.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::models::{
    OAuth2Tokens, PersonRecord, PresenceRecord, PresenceShape, ProfileRecord, TitleRecord,
    TokenSet,
};
use crate::error::Result;

/// Bounds applied to every transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(30),
            user_agent: format!("uc-xbox-presence/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One open transport session plus the API client bound to it.
///
/// After `refresh_tokens` or `exchange_auth_code` succeeds, the data calls are
/// authorized with the resulting tokens.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    /// Authorization URL the user opens to sign in.
    fn authorization_url(&self) -> String;

    /// Shape this client can poll natively.
    fn preferred_shape(&self) -> PresenceShape;

    /// Id of the authenticated account (xuid); `None` before authorization.
    fn user_id(&self) -> Option<String>;

    async fn exchange_auth_code(&self, code: &str) -> Result<OAuth2Tokens>;

    async fn refresh_tokens(&self, tokens: &TokenSet) -> Result<OAuth2Tokens>;

    async fn get_own_profile(&self, user_id: &str) -> Result<ProfileRecord>;

    async fn get_friends_batch(&self, user_id: &str) -> Result<Vec<PersonRecord>>;

    async fn get_presence(&self, user_id: &str) -> Result<PresenceRecord>;

    async fn get_title_info(&self, title_id: &str) -> Result<TitleRecord>;

    /// Release the transport. Calls made afterwards fail with
    /// `XboxError::TransportClosed`.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens transport sessions.
pub trait ConsoleConnector: Send + Sync {
    fn open(&self, settings: &TransportSettings) -> Result<Arc<dyn ConsoleApi>>;
}
