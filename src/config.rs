use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use url::Url;

use crate::db::models::{GameId, SeasonId};
use crate::live_scores::{ReconnectPolicy, SyncSettings};
use crate::scoring::InputCapabilities;

/// Live scoring console for university athletics
#[derive(Parser, Debug, Clone)]
#[command(name = "varsity-scoreboard", version, about)]
pub struct Config {
    /// REST API base URL
    #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:8000")]
    pub api_base_url: String,

    /// Live transport base URL (defaults to the API base with a ws/wss scheme)
    #[arg(long, env = "LIVE_WS_URL")]
    pub live_ws_url: Option<String>,

    /// Session cookie sent with REST calls and the WebSocket handshake
    #[arg(long, env = "SESSION_COOKIE")]
    pub session_cookie: Option<String>,

    /// Game to open on startup
    #[arg(long, env = "GAME_ID")]
    pub game_id: Option<String>,

    /// Season whose games are preloaded
    #[arg(long, env = "SEASON_ID")]
    pub season_id: Option<SeasonId>,

    /// Dashboard listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "127.0.0.1:8080")]
    pub dashboard_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "scoreboard.db")]
    pub database_path: String,

    /// Name of the stat pad layout to load and save
    #[arg(long, env = "LAYOUT_NAME", default_value = "default")]
    pub layout_name: String,

    /// Keep-alive ping interval for the live connection, in seconds
    #[arg(long, env = "PING_INTERVAL_SECS", default_value = "25")]
    pub ping_interval_secs: u64,

    /// Treat the console as a touch-first device
    #[arg(long, env = "TOUCH_INPUT", default_value = "false")]
    pub touch_input: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.api_url()?;
        self.live_url()?;
        if self.ping_interval_secs == 0 {
            anyhow::bail!("ping_interval_secs must be at least 1");
        }
        if self.layout_name.trim().is_empty() {
            anyhow::bail!("layout_name must not be empty");
        }
        if matches!(&self.game_id, Some(id) if id.trim().is_empty()) {
            anyhow::bail!("GAME_ID must not be empty when set");
        }
        Ok(())
    }

    pub fn api_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid API_BASE_URL: {}", self.api_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API_BASE_URL must be http or https, got {}", url.scheme());
        }
        Ok(url)
    }

    /// Base URL for the per-game live socket.
    pub fn live_url(&self) -> anyhow::Result<Url> {
        let raw = self.live_ws_url.as_deref().unwrap_or(&self.api_base_url);
        let url = Url::parse(raw).with_context(|| format!("Invalid LIVE_WS_URL: {}", raw))?;
        if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
            anyhow::bail!("LIVE_WS_URL must be ws, wss, http or https, got {}", url.scheme());
        }
        Ok(url)
    }

    pub fn initial_game(&self) -> Option<GameId> {
        self.game_id.as_deref().map(|id| GameId::new(id.trim()))
    }

    pub fn sync_settings(&self) -> anyhow::Result<SyncSettings> {
        Ok(SyncSettings {
            base_url: self.live_url()?,
            policy: ReconnectPolicy::default(),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
        })
    }

    pub fn input_capabilities(&self) -> InputCapabilities {
        InputCapabilities {
            pointer_events: true,
            primary_touch: self.touch_input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["varsity-scoreboard"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = parse(&[]);
        config.validate().unwrap();
        assert_eq!(config.ping_interval_secs, 25);
        assert_eq!(config.live_url().unwrap().as_str(), "http://localhost:8000/");
        assert!(config.initial_game().is_none());
    }

    #[test]
    fn test_live_url_override_and_game() {
        let config = parse(&[
            "--api-base-url",
            "https://athletics.example.edu",
            "--live-ws-url",
            "wss://live.example.edu",
            "--game-id",
            "42",
            "--touch-input",
        ]);
        config.validate().unwrap();
        let settings = config.sync_settings().unwrap();
        assert_eq!(settings.base_url.scheme(), "wss");
        assert_eq!(settings.policy.max_attempts, 5);
        assert_eq!(config.initial_game(), Some(GameId::from(42)));
        assert!(config.input_capabilities().primary_touch);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(parse(&["--api-base-url", "ftp://files.example.edu"]).validate().is_err());
        assert!(parse(&["--live-ws-url", "not a url"]).validate().is_err());
        assert!(parse(&["--ping-interval-secs", "0"]).validate().is_err());
        assert!(parse(&["--layout-name", "  "]).validate().is_err());
    }
}
