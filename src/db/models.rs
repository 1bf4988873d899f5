use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a game on the platform.
///
/// The backend is inconsistent about whether ids travel as JSON numbers or
/// strings, so both decode to the same key: `7` and `"7"` address one game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        GameId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for GameId {
    fn from(id: u64) -> Self {
        GameId(id.to_string())
    }
}

impl From<&str> for GameId {
    fn from(id: &str) -> Self {
        GameId(id.to_string())
    }
}

impl<'de> Deserialize<'de> for GameId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => GameId::from(n),
            Raw::Text(s) => GameId(s),
        })
    }
}

pub type TeamId = u64;
pub type PlayerId = u64;
pub type SeasonId = u64;

/// A team as referenced from a game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: TeamId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Scheduled,
    Ongoing,
    Completed,
    Forfeited,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Ongoing => "ongoing",
            GameStatus::Completed => "completed",
            GameStatus::Forfeited => "forfeited",
        };
        f.write_str(s)
    }
}

/// A game as fetched from the backend and kept current by live updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    #[serde(default)]
    pub season_id: Option<SeasonId>,
    pub home_team: TeamRef,
    pub away_team: TeamRef,
    #[serde(default)]
    pub home_team_score: u32,
    #[serde(default)]
    pub away_team_score: u32,
    pub status: GameStatus,
    #[serde(default)]
    pub current_period: Option<u32>,
    /// e.g. "basket", "free_throw", "goal"; set by the last score update
    #[serde(default)]
    pub scoring_type: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Game {
    pub fn team(&self, side: TeamSide) -> &TeamRef {
        match side {
            TeamSide::Home => &self.home_team,
            TeamSide::Away => &self.away_team,
        }
    }
}

/// Body of a create-stat request sent when an operator presses a stat button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStatRequest {
    pub player_id: PlayerId,
    pub game_id: GameId,
    pub period: u32,
    pub stat_type: String,
}
