//! Authenticated session lifecycle.
//!
//! At most one transport session is open at a time: establishing a new one
//! closes the previous transport before anything else is opened.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::TokenStore;
use crate::error::{Result, XboxError};
use crate::xbox::api::{ConsoleApi, ConsoleConnector, TransportSettings};
use crate::xbox::models::{PresenceShape, ShapePreference, TokenSet};

/// Display name used when the own profile cannot be resolved.
pub const DEFAULT_GAMERTAG: &str = "Xbox User";

/// One live transport plus everything derived from its authorization.
pub struct Session {
    api: Arc<dyn ConsoleApi>,
    user_id: String,
    gamertag: String,
    shape: PresenceShape,
}

impl Session {
    pub fn api(&self) -> &dyn ConsoleApi {
        self.api.as_ref()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn gamertag(&self) -> &str {
        &self.gamertag
    }

    pub fn shape(&self) -> PresenceShape {
        self.shape
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("gamertag", &self.gamertag)
            .field("shape", &self.shape)
            .finish()
    }
}

pub struct SessionManager {
    connector: Arc<dyn ConsoleConnector>,
    store: Arc<dyn TokenStore>,
    settings: TransportSettings,
    shape_preference: RwLock<ShapePreference>,
    current: RwLock<Option<Arc<Session>>>,
    gamertag: Mutex<Option<String>>,
    // Serializes establish/close so two callers never race on the transport.
    lifecycle: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn ConsoleConnector>,
        store: Arc<dyn TokenStore>,
        settings: TransportSettings,
    ) -> Self {
        Self {
            connector,
            store,
            settings,
            shape_preference: RwLock::new(ShapePreference::Auto),
            current: RwLock::new(None),
            gamertag: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub async fn set_shape_preference(&self, preference: ShapePreference) {
        *self.shape_preference.write().await = preference;
    }

    /// Live session, if any.
    pub async fn current(&self) -> Option<Arc<Session>> {
        self.current.read().await.clone()
    }

    /// Refresh the stored tokens and open a fresh session.
    pub async fn establish(&self) -> Result<Arc<Session>> {
        let _lifecycle = self.lifecycle.lock().await;

        let tokens = self.store.load_tokens().await.ok_or_else(|| {
            XboxError::MissingCredentials("no complete token set stored; run setup".to_string())
        })?;

        self.close_current().await;

        info!(
            liveid = %tokens.liveid,
            access_expired = tokens.tokens.is_expired(),
            "session: authenticating with stored tokens"
        );
        let api = self.connector.open(&self.settings)?;

        let refreshed = match api.refresh_tokens(&tokens).await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "session: token refresh failed");
                api.close().await;
                return Err(e.into_auth());
            }
        };

        // Refresh tokens rotate: persist before anything else can fail.
        let updated = TokenSet {
            liveid: tokens.liveid.clone(),
            tokens: refreshed,
        };
        if let Err(e) = self.store.persist_tokens(&updated).await {
            error!(error = %e, "session: failed to persist refreshed tokens");
        }

        let Some(user_id) = api.user_id() else {
            api.close().await;
            return Err(XboxError::AuthExchange(
                "authorization produced no user id".to_string(),
            ));
        };

        let gamertag = self.resolve_gamertag(api.as_ref(), &user_id).await;
        let shape = self
            .shape_preference
            .read()
            .await
            .resolve(api.preferred_shape());

        let session = Arc::new(Session {
            api,
            user_id,
            gamertag,
            shape,
        });
        *self.current.write().await = Some(session.clone());
        info!(
            user_id = %session.user_id,
            gamertag = %session.gamertag,
            shape = %session.shape,
            "session: authenticated with Xbox Live"
        );
        Ok(session)
    }

    /// Tear down the live session, closing its transport.
    pub async fn close(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.close_current().await;
    }

    async fn close_current(&self) {
        let previous = self.current.write().await.take();
        if let Some(previous) = previous {
            previous.api.close().await;
            info!(user_id = %previous.user_id, "session: previous transport closed");
        }
    }

    async fn resolve_gamertag(&self, api: &dyn ConsoleApi, user_id: &str) -> String {
        let mut cached = self.gamertag.lock().await;
        if let Some(tag) = cached.as_ref() {
            return tag.clone();
        }
        let tag = match api.get_own_profile(user_id).await {
            Ok(profile) => profile.gamertag().unwrap_or_else(|| {
                warn!(user_id, "session: profile has no gamertag, using default");
                DEFAULT_GAMERTAG.to_string()
            }),
            Err(e) => {
                warn!(user_id, error = %e, "session: profile lookup failed, using default");
                DEFAULT_GAMERTAG.to_string()
            }
        };
        info!(gamertag = %tag, "session: gamertag resolved");
        *cached = Some(tag.clone());
        tag
    }
}
