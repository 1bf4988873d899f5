//! Turns stat button presses into create-stat requests.
//!
//! Requests are fire-and-forget tasks. A positive point value bumps the
//! selected team's score in the store right away; if the request later fails
//! the bump stays (the next live score update from the server overwrites it)
//! and the failure is logged and kept as an operator notice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::debounce::{LeadingDebounce, PRESS_WINDOW};
use super::grid::StatButton;
use crate::backend::ApiError;
use crate::db::models::CreateStatRequest;
use crate::store::GameStore;

const MAX_NOTICES: usize = 20;

/// Where create-stat requests go.
#[async_trait]
pub trait StatSink: Send + Sync {
    async fn create_stat(&self, req: &CreateStatRequest) -> Result<(), ApiError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("no game selected")]
    NoGame,
    #[error("no player selected")]
    NoPlayer,
    #[error("select a team before recording points")]
    NoTeamSide,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PressOutcome {
    /// Swallowed by the debounce window.
    Debounced,
    Submitted {
        request: CreateStatRequest,
        /// (home, away) after the optimistic increment, if one was applied
        optimistic_score: Option<(u32, u32)>,
    },
}

/// Operator-facing message about a failed submission.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub stat_type: String,
    pub message: String,
}

pub struct StatRecorder {
    sink: Arc<dyn StatSink>,
    store: GameStore,
    debounce: Mutex<LeadingDebounce<String>>,
    in_flight: Mutex<JoinSet<()>>,
    notices: Arc<Mutex<VecDeque<Notice>>>,
}

impl StatRecorder {
    pub fn new(sink: Arc<dyn StatSink>, store: GameStore) -> Self {
        StatRecorder {
            sink,
            store,
            debounce: Mutex::new(LeadingDebounce::new(PRESS_WINDOW)),
            in_flight: Mutex::new(JoinSet::new()),
            notices: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub async fn press(
        &self,
        button: &StatButton,
        now: Instant,
    ) -> Result<PressOutcome, RecordError> {
        let session = self.store.session().await;
        let game_id = session.current_game.ok_or(RecordError::NoGame)?;
        let player_id = session.selected_player.ok_or(RecordError::NoPlayer)?;
        if button.point_value > 0 && session.selected_side.is_none() {
            return Err(RecordError::NoTeamSide);
        }

        if !self.debounce.lock().await.admit(button.id.clone(), now) {
            return Ok(PressOutcome::Debounced);
        }

        let request = CreateStatRequest {
            player_id,
            game_id: game_id.clone(),
            period: session.period.unwrap_or(1),
            stat_type: button.stat_type.clone(),
        };
        info!(
            "Recording {} for player {} (game {}, period {})",
            request.stat_type, request.player_id, request.game_id, request.period
        );
        self.submit(request.clone()).await;

        let mut optimistic_score = None;
        if let (true, Some(side)) = (button.point_value > 0, session.selected_side) {
            match self
                .store
                .apply_optimistic_points(&game_id, side, button.point_value)
                .await
            {
                Ok(game) => {
                    info!(
                        "+{} for {} ahead of confirmation ({}-{})",
                        button.point_value,
                        game.team(side).name,
                        game.home_team_score,
                        game.away_team_score
                    );
                    optimistic_score = Some((game.home_team_score, game.away_team_score));
                }
                Err(e) => warn!("Optimistic score update skipped: {}", e),
            }
        }

        Ok(PressOutcome::Submitted {
            request,
            optimistic_score,
        })
    }

    async fn submit(&self, request: CreateStatRequest) {
        let sink = Arc::clone(&self.sink);
        let notices = Arc::clone(&self.notices);
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            if let Err(e) = sink.create_stat(&request).await {
                error!(
                    "Failed to record {} for player {}: {}",
                    request.stat_type, request.player_id, e
                );
                let mut notices = notices.lock().await;
                if notices.len() == MAX_NOTICES {
                    notices.pop_front();
                }
                notices.push_back(Notice {
                    at: Utc::now(),
                    stat_type: request.stat_type,
                    message: e.user_message(),
                });
            }
        });
    }

    /// Wait for every in-flight request to finish.
    pub async fn flush(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(res) = in_flight.join_next().await {
            if let Err(e) = res {
                error!("Stat submission task failed: {}", e);
            }
        }
    }

    /// Abort whatever is still in flight.
    pub async fn shutdown(&self) {
        let mut in_flight = self.in_flight.lock().await;
        if !in_flight.is_empty() {
            warn!("Aborting {} in-flight stat submission(s)", in_flight.len());
        }
        in_flight.abort_all();
        while in_flight.join_next().await.is_some() {}
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.notices.lock().await.iter().cloned().collect()
    }
}
