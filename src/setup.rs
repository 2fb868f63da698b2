//! Two-step sign-in wizard.
//!
//! Step one stores the console id and hands out the authorization URL; step
//! two takes the redirect URL the browser ended on, exchanges its code and
//! persists the resulting tokens. The transient auth transport opened in step
//! one is closed on every exit path.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{ConfigStore, TokenStore};
use crate::xbox::api::{ConsoleApi, ConsoleConnector, TransportSettings};
use crate::xbox::auth::parse_redirect_url;
use crate::xbox::models::TokenSet;

pub const FIELD_LIVEID: &str = "liveid";
pub const FIELD_GIANTBOMB_API_KEY: &str = "giantbomb_api_key";
pub const FIELD_AUTH_URL: &str = "auth_url";
pub const FIELD_REDIRECT_URL: &str = "redirect_url";

#[derive(Debug, Clone, PartialEq)]
pub enum SetupRequest {
    DriverSetup {
        reconfigure: bool,
        setup_data: HashMap<String, String>,
    },
    UserInput {
        input_values: HashMap<String, String>,
    },
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupErrorKind {
    InvalidInput,
    AuthenticationFailed,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupField {
    pub id: String,
    pub label: String,
    pub value: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SetupResponse {
    RequestUserInput {
        title: String,
        fields: Vec<SetupField>,
    },
    Complete,
    Error(SetupErrorKind),
    Aborted,
}

pub struct SetupFlow {
    connector: Arc<dyn ConsoleConnector>,
    config: Arc<ConfigStore>,
    settings: TransportSettings,
    transient: Mutex<Option<Arc<dyn ConsoleApi>>>,
    reconfiguring: AtomicBool,
}

impl SetupFlow {
    pub fn new(
        connector: Arc<dyn ConsoleConnector>,
        config: Arc<ConfigStore>,
        settings: TransportSettings,
    ) -> Self {
        Self {
            connector,
            config,
            settings,
            transient: Mutex::new(None),
            reconfiguring: AtomicBool::new(false),
        }
    }

    /// Whether the flow in progress (or just completed) replaces existing
    /// credentials.
    pub fn is_reconfigure(&self) -> bool {
        self.reconfiguring.load(Ordering::SeqCst)
    }

    pub async fn handle(&self, request: SetupRequest) -> SetupResponse {
        match request {
            SetupRequest::DriverSetup {
                reconfigure,
                setup_data,
            } => self.start(reconfigure, &setup_data).await,
            SetupRequest::UserInput { input_values } => self.finish(&input_values).await,
            SetupRequest::Abort => {
                self.close_transient().await;
                // Drop staged, unpersisted edits.
                self.config.load().await;
                info!("setup: aborted");
                SetupResponse::Aborted
            }
        }
    }

    /// Close the transient auth transport, if one is open.
    pub async fn close_transient(&self) {
        if let Some(api) = self.transient.lock().await.take() {
            api.close().await;
        }
    }

    async fn start(&self, reconfigure: bool, data: &HashMap<String, String>) -> SetupResponse {
        self.reconfiguring.store(reconfigure, Ordering::SeqCst);
        if !reconfigure && self.config.snapshot().await.has_credentials() {
            info!("setup: credentials already stored, nothing to do");
            return SetupResponse::Complete;
        }

        let Some(liveid) = field(data, FIELD_LIVEID) else {
            warn!("setup: console id is empty");
            return SetupResponse::Error(SetupErrorKind::InvalidInput);
        };
        let api_key = field(data, FIELD_GIANTBOMB_API_KEY);

        self.config
            .stage(|cfg| {
                cfg.liveid = Some(liveid.clone());
                cfg.giantbomb_api_key = api_key;
                if reconfigure {
                    cfg.clear_tokens();
                }
            })
            .await;

        // A restarted wizard must not leak the previous transport.
        self.close_transient().await;
        let api = match self.connector.open(&self.settings) {
            Ok(api) => api,
            Err(e) => {
                error!(error = %e, "setup: failed to open auth transport");
                return SetupResponse::Error(SetupErrorKind::Other);
            }
        };
        let auth_url = api.authorization_url();
        *self.transient.lock().await = Some(api);
        info!(%liveid, reconfigure, "setup: waiting for sign-in redirect");

        SetupResponse::RequestUserInput {
            title: "Sign in to Xbox Live".to_string(),
            fields: vec![
                SetupField {
                    id: FIELD_AUTH_URL.to_string(),
                    label: "Open this URL and sign in".to_string(),
                    value: auth_url,
                    read_only: true,
                },
                SetupField {
                    id: FIELD_REDIRECT_URL.to_string(),
                    label: "Paste the URL you were redirected to".to_string(),
                    value: String::new(),
                    read_only: false,
                },
            ],
        }
    }

    async fn finish(&self, input: &HashMap<String, String>) -> SetupResponse {
        let Some(api) = self.transient.lock().await.take() else {
            warn!("setup: user input without a pending sign-in");
            return SetupResponse::Error(SetupErrorKind::Other);
        };
        let outcome = self.exchange(api.as_ref(), input).await;
        api.close().await;
        outcome
    }

    async fn exchange(&self, api: &dyn ConsoleApi, input: &HashMap<String, String>) -> SetupResponse {
        let Some(redirect) = field(input, FIELD_REDIRECT_URL) else {
            warn!("setup: redirect URL is empty");
            return SetupResponse::Error(SetupErrorKind::InvalidInput);
        };
        let code = match parse_redirect_url(&redirect) {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "setup: cannot use redirect URL");
                return SetupResponse::Error(SetupErrorKind::AuthenticationFailed);
            }
        };
        let tokens = match api.exchange_auth_code(&code).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "setup: authorization code exchange failed");
                return SetupResponse::Error(SetupErrorKind::AuthenticationFailed);
            }
        };

        let Some(liveid) = self.config.snapshot().await.liveid else {
            error!("setup: console id vanished before token exchange finished");
            return SetupResponse::Error(SetupErrorKind::Other);
        };
        let set = TokenSet { liveid, tokens };
        if let Err(e) = self.config.persist_tokens(&set).await {
            error!(error = %e, "setup: failed to persist tokens");
            return SetupResponse::Error(SetupErrorKind::Other);
        }
        info!(liveid = %set.liveid, "setup: tokens stored");
        SetupResponse::Complete
    }
}

fn field(values: &HashMap<String, String>, key: &str) -> Option<String> {
    values
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
