//! Background presence poll loop.
//!
//! One cycle runs right away, then one per interval. A failed cycle is logged
//! and the loop waits for the next tick; nothing in here ends the task except
//! `stop`/`restart`.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ArtworkResolver, PresenceNormalizer, PresenceSnapshot};
use crate::entity::{Attributes, MediaPlayerEntity};
use crate::error::Result;
use crate::hub::Hub;
use crate::session::SessionManager;

/// Everything one poll cycle reads or writes.
#[derive(Clone)]
pub struct PollContext {
    pub sessions: Arc<SessionManager>,
    pub entity: Arc<AsyncMutex<Option<MediaPlayerEntity>>>,
    pub hub: Arc<dyn Hub>,
    pub normalizer: PresenceNormalizer,
    pub artwork: Arc<ArtworkResolver>,
    pub api_key: Option<String>,
    pub interval: Duration,
}

impl PollContext {
    /// Run a single cycle.
    ///
    /// `Ok(None)` means the cycle was skipped for lack of a session or entity;
    /// otherwise the published delta (possibly empty).
    pub async fn poll_once(&self) -> Result<Option<Attributes>> {
        let Some(session) = self.sessions.current().await else {
            warn!("poller: no live session, skipping cycle");
            return Ok(None);
        };
        if self.entity.lock().await.is_none() {
            warn!("poller: entity not created yet, skipping cycle");
            return Ok(None);
        }

        let raw = self
            .normalizer
            .fetch(session.api(), session.shape(), session.user_id())
            .await?;
        let mut snapshot = self
            .normalizer
            .normalize(session.api(), session.user_id(), &raw)
            .await;
        self.decorate(&mut snapshot).await;
        debug!(
            state = %snapshot.power_state,
            title = %snapshot.title,
            "poller: presence normalized"
        );

        let mut entity = self.entity.lock().await;
        let Some(entity) = entity.as_mut() else {
            return Ok(None);
        };
        let changes = entity.publish(&snapshot, self.hub.as_ref()).await?;
        if !changes.is_empty() {
            info!(
                entity_id = %entity.id(),
                changed = changes.len(),
                state = %snapshot.power_state,
                title = %snapshot.title,
                "poller: entity updated"
            );
        }
        Ok(Some(changes))
    }

    async fn decorate(&self, snapshot: &mut PresenceSnapshot) {
        if !snapshot.needs_artwork() {
            return;
        }
        let url = self
            .artwork
            .resolve(&snapshot.title, self.api_key.as_deref())
            .await;
        if !url.is_empty() {
            snapshot.artwork_url = url;
        }
    }
}

async fn run(ctx: PollContext) {
    info!(interval_secs = ctx.interval.as_secs(), "poller: started");
    let mut ticker = interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = ctx.poll_once().await {
            warn!(error = %e, "poller: cycle failed, retrying next tick");
        }
    }
}

/// Owns the single poll task.
#[derive(Default)]
pub struct PresencePoller {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PresencePoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the loop. Returns `false` and does nothing if one is running.
    pub fn start(&self, ctx: PollContext) -> bool {
        let Ok(mut task) = self.task.lock() else {
            return false;
        };
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("poller: already running");
            return false;
        }
        *task = Some(tokio::spawn(run(ctx)));
        true
    }

    /// Cancel any running loop and start a fresh one.
    pub fn restart(&self, ctx: PollContext) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(old) = task.take() {
                old.abort();
                info!("poller: restarting");
            }
            *task = Some(tokio::spawn(run(ctx)));
        }
    }

    pub fn stop(&self) {
        if let Some(old) = self.task.lock().ok().and_then(|mut t| t.take()) {
            old.abort();
            info!("poller: stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|t| t.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for PresencePoller {
    fn drop(&mut self) {
        self.stop();
    }
}
