//! Messages pushed by the per-game live endpoint (`/ws/games/{id}/`) and the
//! normalized payloads handed to application callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{Game, GameId, GameStatus, TeamRef};

/// A message received on the live transport, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "score_update")]
    ScoreUpdate(ScoreUpdateEvent),
    #[serde(rename = "game_status_update")]
    StatusUpdate(StatusUpdateEvent),
    /// Any message type this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreUpdateEvent {
    pub game_id: GameId,
    pub home_team_score: u32,
    pub away_team_score: u32,
    pub status: GameStatus,
    pub current_period: Option<u32>,
    pub scoring_type: Option<String>,
    pub home_team: Option<TeamRef>,
    pub away_team: Option<TeamRef>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusUpdateEvent {
    pub game_id: GameId,
    pub status: GameStatus,
    pub current_period: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Payload passed to `on_score_update` after the store has been updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreUpdate {
    pub game_id: GameId,
    pub home_score: u32,
    pub away_score: u32,
    pub home_team: Option<TeamRef>,
    pub away_team: Option<TeamRef>,
    pub status: GameStatus,
    pub current_period: Option<u32>,
    pub scoring_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScoreUpdate {
    /// Team refs come from the cached game when there is one, otherwise from
    /// whatever the event itself carried.
    pub fn from_event(ev: &ScoreUpdateEvent, cached: Option<&Game>) -> Self {
        ScoreUpdate {
            game_id: ev.game_id.clone(),
            home_score: ev.home_team_score,
            away_score: ev.away_team_score,
            home_team: cached
                .map(|g| g.home_team.clone())
                .or_else(|| ev.home_team.clone()),
            away_team: cached
                .map(|g| g.away_team.clone())
                .or_else(|| ev.away_team.clone()),
            status: ev.status,
            current_period: ev.current_period,
            scoring_type: ev.scoring_type.clone(),
            timestamp: ev.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Payload passed to `on_status_update` after the store has been updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub game_id: GameId,
    pub status: GameStatus,
    pub current_period: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&StatusUpdateEvent> for StatusUpdate {
    fn from(ev: &StatusUpdateEvent) -> Self {
        StatusUpdate {
            game_id: ev.game_id.clone(),
            status: ev.status,
            current_period: ev.current_period,
            started_at: ev.started_at,
            ended_at: ev.ended_at,
        }
    }
}
