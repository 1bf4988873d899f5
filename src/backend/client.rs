use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::db::models::{CreateStatRequest, Game, GameId, SeasonId};
use crate::scoring::StatSink;

const GENERIC_ERROR: &str = "Something went wrong. Please try again.";

/// Failure of a mutating request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Text suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::Transport(e) if e.is_timeout() => "The server took too long to respond.".into(),
            ApiError::Transport(_) => GENERIC_ERROR.into(),
        }
    }
}

/// Client for the athletics REST API.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
    stats_url: Url,
    session_cookie: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &Url, session_cookie: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let stats_url = base_url.join("api/stats/").context("Invalid API base URL")?;
        Ok(BackendClient {
            http,
            base_url,
            stats_url,
            session_cookie,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid API path {}", path))
    }

    fn with_session(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => req.header(COOKIE, cookie),
            None => req,
        }
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        debug!("GET {}", url);
        let resp = self
            .with_session(self.http.get(url.clone()))
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error {}: {}", status, extract_error_message(&body));
        }

        resp.json().await.context("Failed to parse API response")
    }

    pub async fn fetch_game(&self, id: &GameId) -> Result<Game> {
        let url = self.endpoint(&format!("api/games/{}/", id))?;
        let raw = self.get_json(url).await?;
        serde_json::from_value(raw).with_context(|| format!("Malformed game {}", id))
    }

    pub async fn fetch_games(&self) -> Result<Vec<Game>> {
        let url = self.endpoint("api/games/")?;
        let games = parse_games(&self.get_json(url).await?);
        info!("Loaded {} games", games.len());
        Ok(games)
    }

    pub async fn fetch_season_games(&self, season: SeasonId) -> Result<Vec<Game>> {
        let mut url = self.endpoint("api/games/")?;
        url.query_pairs_mut()
            .append_pair("season", &season.to_string());
        let games = parse_games(&self.get_json(url).await?);
        info!("Loaded {} games for season {}", games.len(), season);
        Ok(games)
    }

    pub async fn create_stat(&self, req: &CreateStatRequest) -> Result<(), ApiError> {
        let resp = self
            .with_session(self.http.post(self.stats_url.clone()))
            .json(req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status,
                message: extract_error_message(&body),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StatSink for BackendClient {
    async fn create_stat(&self, req: &CreateStatRequest) -> Result<(), ApiError> {
        BackendClient::create_stat(self, req).await
    }
}

// ── Parsing helpers ────────────────────────────────────────────────────────────

/// Accepts a plain array or a paginated `{ "results": [...] }` body.
fn parse_games(raw: &Value) -> Vec<Game> {
    let items = match raw.as_array() {
        Some(a) => a,
        None => match raw.get("results").and_then(|v| v.as_array()) {
            Some(a) => a,
            None => return vec![],
        },
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Game>(item.clone()) {
            Ok(game) => Some(game),
            Err(e) => {
                warn!("Skipping malformed game {}: {}", item["id"], e);
                None
            }
        })
        .collect()
}

/// Best-effort human message from an error body.
pub fn extract_error_message(body: &str) -> String {
    let Ok(raw) = serde_json::from_str::<Value>(body) else {
        return GENERIC_ERROR.to_string();
    };

    for key in ["detail", "message", "error", "non_field_errors"] {
        if let Some(msg) = raw.get(key).and_then(first_text) {
            return msg;
        }
    }

    // Field validation errors: { "player_id": ["This field is required."] }
    if let Some(fields) = raw.as_object() {
        for (field, value) in fields {
            if let Some(msg) = first_text(value) {
                return format!("{}: {}", field, msg);
            }
        }
    }

    GENERIC_ERROR.to_string()
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}
