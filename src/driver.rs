//! Driver context: owns the config, session, entity and poll loop, and maps
//! hub events onto them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{ConfigStore, DriverConfig};
use crate::entity::MediaPlayerEntity;
use crate::error::{Result, XboxError};
use crate::hub::{DeviceState, Hub};
use crate::presence::{ArtworkResolver, ArtworkSearch, PollContext, PresenceNormalizer, PresencePoller};
use crate::session::SessionManager;
use crate::setup::{SetupFlow, SetupRequest, SetupResponse};
use crate::xbox::api::{ConsoleConnector, TransportSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    NotFound,
}

pub struct Driver {
    config: Arc<ConfigStore>,
    sessions: Arc<SessionManager>,
    setup: SetupFlow,
    hub: Arc<dyn Hub>,
    poller: PresencePoller,
    entity: Arc<Mutex<Option<MediaPlayerEntity>>>,
    artwork: Arc<ArtworkResolver>,
    poll_interval: Duration,
}

impl Driver {
    pub fn new(
        config: Arc<ConfigStore>,
        connector: Arc<dyn ConsoleConnector>,
        search: Arc<dyn ArtworkSearch>,
        hub: Arc<dyn Hub>,
        settings: TransportSettings,
        poll_interval: Duration,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            connector.clone(),
            config.clone(),
            settings.clone(),
        ));
        let setup = SetupFlow::new(connector, config.clone(), settings);
        Self {
            config,
            sessions,
            setup,
            hub,
            poller: PresencePoller::new(),
            entity: Arc::new(Mutex::new(None)),
            artwork: Arc::new(ArtworkResolver::new(search)),
            poll_interval,
        }
    }

    /// Reload `config.json` into memory.
    pub async fn load_config(&self) -> DriverConfig {
        self.config.load().await
    }

    /// Load the configuration and connect when credentials are complete.
    pub async fn start(&self) -> Result<()> {
        let cfg = self.load_config().await;
        if !cfg.has_credentials() {
            warn!(path = %self.config.path().display(), "driver: not configured, setup required");
            self.hub.set_device_state(DeviceState::Error).await;
            return Err(XboxError::MissingCredentials(
                "driver setup has not been completed".to_string(),
            ));
        }
        self.connect().await
    }

    /// Establish a session and expose the entity.
    pub async fn connect(&self) -> Result<()> {
        self.hub.set_device_state(DeviceState::Connecting).await;
        let cfg = self.config.snapshot().await;
        self.sessions
            .set_shape_preference(cfg.shape_preference())
            .await;

        let session = match self.sessions.establish().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, user_facing = e.is_user_facing(), "driver: connect failed");
                self.hub.set_device_state(DeviceState::Error).await;
                return Err(e);
            }
        };

        let liveid = cfg.liveid.unwrap_or_default();
        let mut entity = self.entity.lock().await;
        let wanted = crate::entity::entity_id(&liveid);
        if entity.as_ref().map(|e| e.id()) != Some(wanted.as_str()) {
            // The hub has not subscribed to the new id yet; polling resumes
            // on its next subscription.
            if let Some(old) = entity.as_ref() {
                if self.poller.is_running() {
                    info!(old = %old.id(), new = %wanted, "driver: entity replaced, polling paused");
                    self.poller.stop();
                }
            }
            let created = MediaPlayerEntity::new(&liveid, session.gamertag());
            info!(entity_id = %created.id(), name = %created.name(), "driver: entity created");
            self.hub.add_available_entity(&created).await;
            *entity = Some(created);
        }
        drop(entity);

        self.hub.set_device_state(DeviceState::Connected).await;
        Ok(())
    }

    pub async fn entity_id(&self) -> Option<String> {
        self.entity.lock().await.as_ref().map(|e| e.id().to_string())
    }

    /// Hub subscribed to entities; start polling if ours is among them.
    pub async fn subscribe_entities(&self, entity_ids: &[String]) -> bool {
        {
            let entity = self.entity.lock().await;
            let Some(entity) = entity.as_ref() else {
                warn!("driver: subscription before entity exists");
                return false;
            };
            if !entity_ids.iter().any(|id| id == entity.id()) {
                return false;
            }
            self.hub.add_configured_entity(entity).await;
        }
        if !self.poller.start(self.poll_context().await) {
            info!("driver: poller already running");
        }
        true
    }

    pub async fn handle_setup(&self, request: SetupRequest) -> SetupResponse {
        let response = self.setup.handle(request).await;
        if response != SetupResponse::Complete {
            return response;
        }

        if let Err(e) = self.connect().await {
            warn!(error = %e, "driver: setup finished but connecting failed");
            return response;
        }
        if self.setup.is_reconfigure() && self.poller.is_running() {
            self.poller.restart(self.poll_context().await);
        }
        response
    }

    /// The entity is presence-only; commands are acknowledged and ignored.
    pub async fn handle_command(&self, entity_id: &str, command: &str) -> CommandStatus {
        if self.entity_id().await.as_deref() != Some(entity_id) {
            warn!(entity_id, command, "driver: command for unknown entity");
            return CommandStatus::NotFound;
        }
        info!(entity_id, command, "driver: command ignored, entity is read-only");
        CommandStatus::Ok
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Stop polling and release every transport.
    pub async fn shutdown(&self) {
        self.poller.stop();
        self.setup.close_transient().await;
        self.sessions.close().await;
        self.hub.set_device_state(DeviceState::Disconnected).await;
        info!("driver: shut down");
    }

    async fn poll_context(&self) -> PollContext {
        PollContext {
            sessions: self.sessions.clone(),
            entity: self.entity.clone(),
            hub: self.hub.clone(),
            normalizer: PresenceNormalizer::new(),
            artwork: self.artwork.clone(),
            api_key: self.config.snapshot().await.artwork_api_key(),
            interval: self.poll_interval,
        }
    }
}
