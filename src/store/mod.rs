//! Normalized, in-memory game store.
//!
//! Every game lives exactly once, keyed by id. The single-game view, the
//! season-scoped list, the generic list and the scoring session's "current
//! game" are projections over that one map, so a push update written once is
//! seen identically through all of them.

pub mod session;

pub use session::{ScoringSession, SessionPatch};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::db::models::{Game, GameId, SeasonId, TeamSide};
use crate::live_scores::messages::{ScoreUpdateEvent, StatusUpdateEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("game {0} is not loaded")]
    UnknownGame(GameId),
}

/// Shared handle to the store. Cloning is cheap.
#[derive(Clone, Default)]
pub struct GameStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    games: HashMap<GameId, Game>,
    /// season → ordered membership of the season list view
    season_lists: HashMap<SeasonId, Vec<GameId>>,
    /// ordered membership of the generic games list view
    game_list: Vec<GameId>,
    session: ScoringSession,
}

impl StoreInner {
    fn upsert(&mut self, game: Game) -> GameId {
        let id = game.id.clone();
        self.games.insert(id.clone(), game);
        id
    }

    fn project(&self, ids: &[GameId]) -> Vec<Game> {
        ids.iter().filter_map(|id| self.games.get(id)).cloned().collect()
    }
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding from the REST backend ────────────────────────────────────────

    /// Replace the generic list view with a freshly fetched page.
    pub async fn load_games(&self, games: Vec<Game>) {
        let mut inner = self.inner.write().await;
        let ids = games.into_iter().map(|g| inner.upsert(g)).collect();
        inner.game_list = ids;
        debug!("GameStore: generic list holds {} games", inner.game_list.len());
    }

    /// Replace one season's list view.
    pub async fn load_season_games(&self, season: SeasonId, games: Vec<Game>) {
        let mut inner = self.inner.write().await;
        let ids = games.into_iter().map(|g| inner.upsert(g)).collect();
        inner.season_lists.insert(season, ids);
    }

    /// Insert or refresh a single game without touching list membership.
    pub async fn upsert_game(&self, game: Game) {
        self.inner.write().await.upsert(game);
    }

    // ── Projections ──────────────────────────────────────────────────────────

    pub async fn game(&self, id: &GameId) -> Option<Game> {
        self.inner.read().await.games.get(id).cloned()
    }

    pub async fn games(&self) -> Vec<Game> {
        let inner = self.inner.read().await;
        inner.project(&inner.game_list)
    }

    pub async fn season_games(&self, season: SeasonId) -> Vec<Game> {
        let inner = self.inner.read().await;
        match inner.season_lists.get(&season) {
            Some(ids) => inner.project(ids),
            None => vec![],
        }
    }

    pub async fn current_game(&self) -> Option<Game> {
        let inner = self.inner.read().await;
        let id = inner.session.current_game.as_ref()?;
        inner.games.get(id).cloned()
    }

    pub async fn session(&self) -> ScoringSession {
        self.inner.read().await.session.clone()
    }

    pub async fn update_session(&self, patch: SessionPatch) -> ScoringSession {
        let mut inner = self.inner.write().await;
        inner.session.apply(patch);
        inner.session.clone()
    }

    /// Leave the current game; the player and side picks go with it.
    pub async fn clear_current_game(&self) -> ScoringSession {
        let mut inner = self.inner.write().await;
        inner.session = ScoringSession {
            period: inner.session.period,
            ..Default::default()
        };
        inner.session.clone()
    }

    // ── Live merges ──────────────────────────────────────────────────────────

    /// Merge a pushed score update into an already-fetched game.
    ///
    /// Returns the merged game, or `None` if the game was never loaded.
    pub async fn apply_score_update(&self, ev: &ScoreUpdateEvent) -> Option<Game> {
        let mut inner = self.inner.write().await;
        let game = inner.games.get_mut(&ev.game_id)?;
        game.home_team_score = ev.home_team_score;
        game.away_team_score = ev.away_team_score;
        game.status = ev.status;
        game.current_period = ev.current_period;
        if ev.scoring_type.is_some() {
            game.scoring_type = ev.scoring_type.clone();
        }
        game.updated_at = Some(ev.timestamp.unwrap_or_else(Utc::now));
        Some(game.clone())
    }

    /// Merge a pushed status change. Timestamps absent from the event are kept.
    pub async fn apply_status_update(&self, ev: &StatusUpdateEvent) -> Option<Game> {
        let mut inner = self.inner.write().await;
        let game = inner.games.get_mut(&ev.game_id)?;
        game.status = ev.status;
        game.current_period = ev.current_period;
        if ev.started_at.is_some() {
            game.started_at = ev.started_at;
        }
        if ev.ended_at.is_some() {
            game.ended_at = ev.ended_at;
        }
        Some(game.clone())
    }

    /// Bump a team's score ahead of server confirmation.
    pub async fn apply_optimistic_points(
        &self,
        id: &GameId,
        side: TeamSide,
        points: u32,
    ) -> Result<Game, StoreError> {
        let mut inner = self.inner.write().await;
        let game = inner
            .games
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownGame(id.clone()))?;
        match side {
            TeamSide::Home => game.home_team_score = game.home_team_score.saturating_add(points),
            TeamSide::Away => game.away_team_score = game.away_team_score.saturating_add(points),
        }
        Ok(game.clone())
    }
}
