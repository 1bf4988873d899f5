use serde::{Deserialize, Serialize};

use crate::db::models::{GameId, PlayerId, TeamSide};

/// Operator selections that scoring actions are recorded against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringSession {
    pub current_game: Option<GameId>,
    pub selected_player: Option<PlayerId>,
    pub selected_side: Option<TeamSide>,
    pub period: Option<u32>,
}

/// Partial update for [`ScoringSession`]; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    pub current_game: Option<GameId>,
    pub selected_player: Option<PlayerId>,
    pub selected_side: Option<TeamSide>,
    pub period: Option<u32>,
}

impl ScoringSession {
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(game) = patch.current_game {
            if self.current_game.as_ref() != Some(&game) {
                // A different game invalidates the player pick.
                self.selected_player = None;
                self.selected_side = None;
            }
            self.current_game = Some(game);
        }
        if let Some(player) = patch.selected_player {
            self.selected_player = Some(player);
        }
        if let Some(side) = patch.selected_side {
            self.selected_side = Some(side);
        }
        if let Some(period) = patch.period {
            self.period = Some(period);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_keeps_unset_fields() {
        let mut s = ScoringSession::default();
        s.apply(SessionPatch {
            current_game: Some(GameId::from(1)),
            selected_player: Some(23),
            selected_side: Some(TeamSide::Home),
            period: Some(2),
        });
        s.apply(SessionPatch {
            period: Some(3),
            ..Default::default()
        });
        assert_eq!(s.selected_player, Some(23));
        assert_eq!(s.period, Some(3));
    }

    #[test]
    fn test_switching_game_clears_player() {
        let mut s = ScoringSession::default();
        s.apply(SessionPatch {
            current_game: Some(GameId::from(1)),
            selected_player: Some(23),
            selected_side: Some(TeamSide::Away),
            ..Default::default()
        });
        s.apply(SessionPatch {
            current_game: Some(GameId::from(2)),
            ..Default::default()
        });
        assert_eq!(s.current_game, Some(GameId::from(2)));
        assert_eq!(s.selected_player, None);
        assert_eq!(s.selected_side, None);
    }
}
