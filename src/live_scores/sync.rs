//! Per-game live score synchronizer.
//!
//! ```text
//!  /ws/games/{id}/ ──push──▶ ScoreSync task (one per subscription)
//!                              │  decodes InboundMessage
//!                              │  merges into GameStore (all views at once)
//!                              ▼
//!                     on_score_update / on_status_update
//! ```
//!
//! Abnormal closures reconnect on the [`ReconnectPolicy`] schedule. When the
//! budget runs out the state becomes [`ConnectionState::Disconnected`] and stays
//! there until [`ScoreSync::reconnect`] is called.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use super::backoff::ReconnectPolicy;
use super::messages::{InboundMessage, ScoreUpdate, StatusUpdate};
use super::transport::{
    game_socket_url, Connection, Connector, Frame, ABNORMAL_CLOSURE, NORMAL_CLOSURE, NO_STATUS,
};
use crate::db::models::GameId;
use crate::store::GameStore;

pub type ScoreCallback = Arc<dyn Fn(&ScoreUpdate) -> anyhow::Result<()> + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(&StatusUpdate) -> anyhow::Result<()> + Send + Sync>;

/// Application hooks, invoked after the store has been updated.
#[derive(Clone, Default)]
pub struct SyncCallbacks {
    pub on_score_update: Option<ScoreCallback>,
    pub on_status_update: Option<StatusCallback>,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// `ws(s)://` (or `http(s)://`) base the per-game path is appended to
    pub base_url: Url,
    pub policy: ReconnectPolicy,
    pub ping_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No game selected.
    Idle,
    Connecting { game_id: GameId, attempt: u32 },
    Connected { game_id: GameId },
    Reconnecting { game_id: GameId, attempt: u32, delay_ms: u64 },
    /// Closed on purpose (locally or by a normal closure from the server).
    Closed { game_id: GameId },
    /// Reconnect budget exhausted.
    Disconnected { game_id: GameId, attempts: u32 },
}

struct SyncContext {
    connector: Arc<dyn Connector>,
    store: GameStore,
    callbacks: SyncCallbacks,
    settings: SyncSettings,
    state: watch::Sender<ConnectionState>,
}

struct ActiveSubscription {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Shutdown,
    Closed(u16),
}

/// Owns at most one live connection, scoped to the current game.
pub struct ScoreSync {
    ctx: Arc<SyncContext>,
    game_id: Option<GameId>,
    active: Option<ActiveSubscription>,
}

impl ScoreSync {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: GameStore,
        callbacks: SyncCallbacks,
        settings: SyncSettings,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        ScoreSync {
            ctx: Arc::new(SyncContext {
                connector,
                store,
                callbacks,
                settings,
                state,
            }),
            game_id: None,
            active: None,
        }
    }

    pub fn game_id(&self) -> Option<&GameId> {
        self.game_id.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state.subscribe()
    }

    /// Point the subscription at `game_id`. `None` disables it.
    ///
    /// Any previous connection is closed before the new one is opened.
    /// Selecting the game that is already selected changes nothing, even
    /// after its connection was closed or gave up; [`ScoreSync::reconnect`]
    /// is the only way back from those states.
    pub async fn set_game(&mut self, game_id: Option<GameId>) {
        if self.game_id == game_id {
            return;
        }
        self.disconnect().await;
        self.game_id = game_id;
        match self.game_id.clone() {
            Some(id) => self.start(id),
            None => {
                self.ctx.state.send_replace(ConnectionState::Idle);
            }
        }
    }

    /// Restart the subscription for the current game with a fresh attempt
    /// budget. Returns `false` when no game is selected.
    pub async fn reconnect(&mut self) -> bool {
        self.disconnect().await;
        match self.game_id.clone() {
            Some(id) => {
                self.start(id);
                true
            }
            None => false,
        }
    }

    /// Close with a normal-closure code and cancel any pending reconnect.
    /// Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        // The task may already have ended on its own; then nobody is listening.
        let _ = active.shutdown.send(());
        if let Err(e) = active.task.await {
            error!("[ScoreSync] Subscription task failed: {}", e);
        }
    }

    fn start(&mut self, game_id: GameId) {
        self.ctx.state.send_replace(ConnectionState::Connecting {
            game_id: game_id.clone(),
            attempt: 0,
        });
        let (shutdown, shutdown_rx) = oneshot::channel();
        let ctx = Arc::clone(&self.ctx);
        let task = tokio::spawn(async move {
            ctx.run(game_id, shutdown_rx).await;
        });
        self.active = Some(ActiveSubscription { shutdown, task });
    }
}

impl SyncContext {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Connection loop for one subscription. Dropping the shutdown sender ends
    /// it just like an explicit shutdown.
    async fn run(&self, game_id: GameId, mut shutdown: oneshot::Receiver<()>) {
        let tag = format!("[ScoreSync game={}]", game_id);
        let url = match game_socket_url(&self.settings.base_url, &game_id) {
            Ok(url) => url,
            Err(e) => {
                error!("{} Cannot build live transport URL: {:#}", tag, e);
                self.set_state(ConnectionState::Disconnected {
                    game_id,
                    attempts: 0,
                });
                return;
            }
        };

        let mut attempts = 0u32;
        loop {
            self.set_state(ConnectionState::Connecting {
                game_id: game_id.clone(),
                attempt: attempts,
            });
            info!("{} Connecting to {}", tag, url);

            let connected = tokio::select! {
                res = self.connector.connect(&url) => res,
                _ = &mut shutdown => {
                    self.set_state(ConnectionState::Closed { game_id });
                    return;
                }
            };

            let close_code = match connected {
                Ok(mut conn) => {
                    info!("{} Connected", tag);
                    attempts = 0;
                    self.set_state(ConnectionState::Connected {
                        game_id: game_id.clone(),
                    });
                    match self.pump(&tag, &game_id, conn.as_mut(), &mut shutdown).await {
                        SessionEnd::Shutdown => {
                            if let Err(e) = conn.close(NORMAL_CLOSURE).await {
                                debug!("{} Close handshake failed: {:#}", tag, e);
                            }
                            info!("{} Disconnected", tag);
                            self.set_state(ConnectionState::Closed { game_id });
                            return;
                        }
                        SessionEnd::Closed(code) => code,
                    }
                }
                Err(e) => {
                    error!("{} Connection failed: {:#}", tag, e);
                    ABNORMAL_CLOSURE
                }
            };

            if close_code == NORMAL_CLOSURE {
                info!("{} Server closed the connection normally", tag);
                self.set_state(ConnectionState::Closed { game_id });
                return;
            }

            let Some((attempt, delay)) = self.settings.policy.next_attempt(attempts) else {
                warn!(
                    "{} Giving up after {} reconnect attempts (last close code {})",
                    tag, attempts, close_code
                );
                self.set_state(ConnectionState::Disconnected { game_id, attempts });
                return;
            };
            attempts = attempt;
            warn!(
                "{} Closed with code {}; reconnect {}/{} in {:?}",
                tag, close_code, attempt, self.settings.policy.max_attempts, delay
            );
            self.set_state(ConnectionState::Reconnecting {
                game_id: game_id.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    self.set_state(ConnectionState::Closed { game_id });
                    return;
                }
            }
        }
    }

    /// Read frames until the connection ends or shutdown is requested.
    async fn pump(
        &self,
        tag: &str,
        game_id: &GameId,
        conn: &mut dyn Connection,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> SessionEnd {
        let period = self.settings.ping_interval;
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                frame = conn.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => self.handle_text(tag, game_id, &text).await,
                    Some(Ok(Frame::Close(code))) => {
                        return SessionEnd::Closed(code.unwrap_or(NO_STATUS));
                    }
                    Some(Err(e)) => {
                        error!("{} Transport error: {:#}", tag, e);
                        return SessionEnd::Closed(ABNORMAL_CLOSURE);
                    }
                    None => {
                        warn!("{} Stream ended without a close frame", tag);
                        return SessionEnd::Closed(ABNORMAL_CLOSURE);
                    }
                },
                _ = ping.tick() => {
                    if let Err(e) = conn.ping().await {
                        error!("{} Ping failed: {:#}", tag, e);
                        return SessionEnd::Closed(ABNORMAL_CLOSURE);
                    }
                }
                _ = &mut *shutdown => return SessionEnd::Shutdown,
            }
        }
    }

    async fn handle_text(&self, tag: &str, game_id: &GameId, text: &str) {
        let message = match InboundMessage::from_json_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("{} Dropping unparseable message: {}", tag, e);
                return;
            }
        };

        match message {
            InboundMessage::ScoreUpdate(ev) => {
                if ev.game_id != *game_id {
                    debug!("{} Ignoring score update for game {}", tag, ev.game_id);
                    return;
                }
                let merged = self.store.apply_score_update(&ev).await;
                if merged.is_none() {
                    debug!("{} Game not loaded yet; store unchanged", tag);
                }
                let payload = ScoreUpdate::from_event(&ev, merged.as_ref());
                info!(
                    "{} Score {}-{} ({}, period {:?})",
                    tag, payload.home_score, payload.away_score, payload.status, payload.current_period
                );
                if let Some(cb) = &self.callbacks.on_score_update {
                    if let Err(e) = cb(&payload) {
                        warn!("{} on_score_update failed: {:#}", tag, e);
                    }
                }
            }
            InboundMessage::StatusUpdate(ev) => {
                if ev.game_id != *game_id {
                    debug!("{} Ignoring status update for game {}", tag, ev.game_id);
                    return;
                }
                if self.store.apply_status_update(&ev).await.is_none() {
                    debug!("{} Game not loaded yet; store unchanged", tag);
                }
                let payload = StatusUpdate::from(&ev);
                info!("{} Status {} (period {:?})", tag, payload.status, payload.current_period);
                if let Some(cb) = &self.callbacks.on_status_update {
                    if let Err(e) = cb(&payload) {
                        warn!("{} on_status_update failed: {:#}", tag, e);
                    }
                }
            }
            InboundMessage::Unknown => debug!("{} Ignoring message of unknown type", tag),
        }
    }
}
