//! Persisted driver configuration (`config.json`).
//!
//! The file keeps the console id, the OAuth2 token object (round-tripped
//! verbatim) and the optional GiantBomb key. A missing or malformed file is a
//! fresh start, never an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{Result, XboxError};
use crate::xbox::models::{ShapePreference, TokenSet};

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub liveid: Option<String>,
    #[serde(default)]
    pub tokens: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub giantbomb_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_shape: Option<String>,
}

impl DriverConfig {
    /// Complete token set, or `None` when anything is missing or corrupt.
    pub fn token_set(&self) -> Option<TokenSet> {
        TokenSet::from_parts(self.liveid.as_deref(), self.tokens.as_ref())
    }

    pub fn has_credentials(&self) -> bool {
        self.token_set().is_some()
    }

    /// GiantBomb key from the config, else `GIANTBOMB_API_KEY`.
    pub fn artwork_api_key(&self) -> Option<String> {
        self.giantbomb_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| crate::util::env::env_opt("GIANTBOMB_API_KEY"))
    }

    /// Presence shape choice from the config, else `XBOX_PRESENCE_SHAPE`.
    pub fn shape_preference(&self) -> ShapePreference {
        let raw = self
            .presence_shape
            .clone()
            .or_else(|| crate::util::env::env_opt("XBOX_PRESENCE_SHAPE"));
        match raw.as_deref().map(str::parse::<ShapePreference>) {
            None => ShapePreference::Auto,
            Some(Ok(pref)) => pref,
            Some(Err(e)) => {
                warn!(error = %e, "config: ignoring presence_shape, using auto");
                ShapePreference::Auto
            }
        }
    }

    /// Forget the stored tokens (explicit reconfiguration).
    pub fn clear_tokens(&mut self) {
        self.tokens = None;
    }
}

/// Where the session manager reads and persists the token set.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load_tokens(&self) -> Option<TokenSet>;

    async fn persist_tokens(&self, tokens: &TokenSet) -> Result<()>;
}

/// File-backed configuration with an in-memory copy.
pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<DriverConfig>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(DriverConfig::default()),
        }
    }

    /// Store backed by `<dir>/config.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load from disk, replacing the in-memory copy.
    ///
    /// Any failure leaves a fresh, empty configuration in place.
    pub async fn load(&self) -> DriverConfig {
        let loaded = match read_config(&self.path).await {
            Ok(Some(cfg)) => {
                info!(path = %self.path.display(), "config: loaded");
                cfg
            }
            Ok(None) => {
                info!(path = %self.path.display(), "config: no file, starting fresh");
                DriverConfig::default()
            }
            Err(XboxError::Json(e)) => {
                info!(path = %self.path.display(), error = %e, "config: file is invalid, starting fresh");
                DriverConfig::default()
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "config: failed to load, starting fresh");
                DriverConfig::default()
            }
        };
        *self.config.write().await = loaded.clone();
        loaded
    }

    pub async fn snapshot(&self) -> DriverConfig {
        self.config.read().await.clone()
    }

    /// Write the in-memory copy to disk (temp file + rename).
    pub async fn save(&self) -> Result<()> {
        let cfg = self.snapshot().await;
        write_config(&self.path, &cfg).await?;
        info!(path = %self.path.display(), "config: saved");
        Ok(())
    }

    /// Mutate the configuration and persist it.
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut DriverConfig),
    {
        {
            let mut cfg = self.config.write().await;
            f(&mut cfg);
        }
        self.save().await
    }

    /// Mutate the in-memory copy only; used for values that are persisted
    /// together with the tokens later in the setup flow.
    pub async fn stage<F>(&self, f: F)
    where
        F: FnOnce(&mut DriverConfig),
    {
        let mut cfg = self.config.write().await;
        f(&mut cfg);
    }
}

#[async_trait]
impl TokenStore for ConfigStore {
    async fn load_tokens(&self) -> Option<TokenSet> {
        self.config.read().await.token_set()
    }

    async fn persist_tokens(&self, tokens: &TokenSet) -> Result<()> {
        let json = tokens.tokens_json();
        let liveid = tokens.liveid.clone();
        self.update(move |cfg| {
            cfg.liveid = Some(liveid);
            cfg.tokens = Some(json);
        })
        .await
    }
}

async fn read_config(path: &Path) -> Result<Option<DriverConfig>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(XboxError::ConfigLoad(format!("{}: {}", path.display(), e))),
    }
}

async fn write_config(path: &Path, cfg: &DriverConfig) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let body = serde_json::to_string_pretty(cfg)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
