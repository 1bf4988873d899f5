pub mod backoff;
pub mod messages;
pub mod sync;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use messages::{ScoreUpdate, StatusUpdate};
pub use sync::{ScoreSync, SyncCallbacks, SyncSettings};
pub use transport::TungsteniteConnector;

use std::sync::Arc;
use tracing::info;

/// Callbacks used by the console: log every change the feed delivers.
pub fn logging_callbacks() -> SyncCallbacks {
    SyncCallbacks {
        on_score_update: Some(Arc::new(|u: &ScoreUpdate| -> anyhow::Result<()> {
            let home = u.home_team.as_ref().map(|t| t.name.as_str()).unwrap_or("home");
            let away = u.away_team.as_ref().map(|t| t.name.as_str()).unwrap_or("away");
            info!(
                "Game {}: {} {} - {} {} ({})",
                u.game_id,
                home,
                u.home_score,
                u.away_score,
                away,
                u.scoring_type.as_deref().unwrap_or("score")
            );
            Ok(())
        })),
        on_status_update: Some(Arc::new(|u: &StatusUpdate| -> anyhow::Result<()> {
            info!("Game {} is now {} (period {:?})", u.game_id, u.status, u.current_period);
            Ok(())
        })),
    }
}
