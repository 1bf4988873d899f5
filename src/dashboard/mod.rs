use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::backend::BackendClient;
use crate::db::models::{Game, GameId, SeasonId};
use crate::db::Database;
use crate::live_scores::ScoreSync;
use crate::scoring::drag::DragUpdate;
use crate::scoring::{
    Cell, DropOutcome, GridError, GridGeometry, InputCapabilities, Point, PressOutcome,
    RecordError, StatPad, StatRecorder,
};
use crate::store::{GameStore, ScoringSession, SessionPatch};

#[derive(Clone)]
pub struct AppState {
    pub store: GameStore,
    pub sync: Arc<Mutex<ScoreSync>>,
    pub pad: Arc<Mutex<StatPad>>,
    pub recorder: Arc<StatRecorder>,
    pub backend: BackendClient,
    pub db: Database,
    /// Layout the pad is saved under after every successful move.
    pub layout_name: String,
}

impl AppState {
    /// Fetch a game the store has not seen yet. Failures are logged; the
    /// selection still goes through and live updates for it are ignored
    /// until it is loaded.
    async fn ensure_loaded(&self, id: &GameId) {
        if self.store.game(id).await.is_some() {
            return;
        }
        match self.backend.fetch_game(id).await {
            Ok(game) => self.store.upsert_game(game).await,
            Err(e) => warn!("Could not load game {}: {:#}", id, e),
        }
    }

    /// Save the pad after a move. A failed write is logged; the move stands
    /// in memory and is saved again with the next one.
    fn persist_layout(&self, pad: &StatPad) {
        if let Err(e) = self.db.save_layout(&self.layout_name, pad.grid()) {
            warn!("Failed to save stat pad layout '{}': {:#}", self.layout_name, e);
        }
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::NotFound(_) | DashboardError::Grid(GridError::UnknownButton(_)) => {
                StatusCode::NOT_FOUND
            }
            DashboardError::Grid(GridError::Occupied { .. }) => StatusCode::CONFLICT,
            DashboardError::Grid(_) | DashboardError::Record(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let payload = Json(ErrorBody {
            message: self.to_string(),
        });
        (status, payload).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, DashboardError>;

/// Build the Axum router for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/games", get(games_handler))
        .route("/api/games/:id", get(game_handler))
        .route("/api/seasons/:id/games", get(season_games_handler))
        .route("/api/current-game", get(current_game_handler))
        .route("/api/connection", get(connection_handler))
        .route("/api/connection/reconnect", post(reconnect_handler))
        .route("/api/session", get(session_handler).put(update_session_handler))
        .route("/api/session/game", delete(leave_game_handler))
        .route("/api/grid", get(grid_handler))
        .route("/api/grid/move", post(move_handler))
        .route("/api/grid/input", put(input_handler))
        .route("/api/grid/gesture", post(gesture_handler))
        .route("/api/grid/press/:button_id", post(press_handler))
        .route("/api/notices", get(notices_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn index_handler() -> impl IntoResponse {
    Html(SCOREBOARD_HTML)
}

// ── Games ──────────────────────────────────────────────────────────────────

/// GET /api/games
async fn games_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Game>> {
    Json(state.store.games().await)
}

/// GET /api/games/:id
async fn game_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Game> {
    let id = GameId::new(id);
    state
        .store
        .game(&id)
        .await
        .map(Json)
        .ok_or_else(|| DashboardError::NotFound(format!("game {}", id)))
}

/// GET /api/seasons/:id/games
async fn season_games_handler(
    State(state): State<Arc<AppState>>,
    Path(season): Path<SeasonId>,
) -> Json<Vec<Game>> {
    Json(state.store.season_games(season).await)
}

/// GET /api/current-game
async fn current_game_handler(State(state): State<Arc<AppState>>) -> Json<Option<Game>> {
    Json(state.store.current_game().await)
}

// ── Live connection ────────────────────────────────────────────────────────

async fn connection_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sync = state.sync.lock().await;
    Json(json!({ "game_id": sync.game_id(), "state": sync.state() }))
}

/// POST /api/connection/reconnect: fresh retry budget for the current game.
async fn reconnect_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut sync = state.sync.lock().await;
    let started = sync.reconnect().await;
    Json(json!({ "started": started, "state": sync.state() }))
}

// ── Scoring session ────────────────────────────────────────────────────────

async fn session_handler(State(state): State<Arc<AppState>>) -> Json<ScoringSession> {
    Json(state.store.session().await)
}

/// PUT /api/session
async fn update_session_handler(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SessionPatch>,
) -> Json<ScoringSession> {
    let selected = patch.current_game.clone();
    if let Some(id) = &selected {
        state.ensure_loaded(id).await;
    }
    let session = state.store.update_session(patch).await;
    if let Some(id) = selected {
        state.sync.lock().await.set_game(Some(id)).await;
    }
    Json(session)
}

/// DELETE /api/session/game
async fn leave_game_handler(State(state): State<Arc<AppState>>) -> Json<ScoringSession> {
    let session = state.store.clear_current_game().await;
    state.sync.lock().await.set_game(None).await;
    Json(session)
}

// ── Stat pad ───────────────────────────────────────────────────────────────

async fn grid_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pad = state.pad.lock().await;
    Json(json!({
        "rows": pad.grid().rows(),
        "input": pad.input_kind(),
        "preview": pad.layer().preview(),
    }))
}

#[derive(Deserialize)]
struct MoveRequest {
    button_id: String,
    to: Cell,
}

/// POST /api/grid/move: keyboard/programmatic move, same rules as a drop.
async fn move_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MoveRequest>,
) -> Result<impl IntoResponse, DashboardError> {
    let mut pad = state.pad.lock().await;
    let from = pad.move_button(&req.button_id, req.to)?;
    state.persist_layout(&pad);
    Ok(Json(json!({ "button_id": req.button_id, "from": from, "to": req.to })))
}

#[derive(Deserialize)]
struct InputRequest {
    capabilities: InputCapabilities,
    #[serde(default)]
    geometry: GridGeometry,
}

/// PUT /api/grid/input: the attached client reports its input hardware.
async fn input_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InputRequest>,
) -> impl IntoResponse {
    let mut pad = state.pad.lock().await;
    pad.set_capabilities(req.capabilities, req.geometry);
    info!("Stat pad input set to {:?}", pad.input_kind());
    Json(json!({ "input": pad.input_kind() }))
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum GesturePhase {
    Down,
    Move,
    Up,
}

#[derive(Deserialize)]
struct GestureRequest {
    phase: GesturePhase,
    x: f32,
    y: f32,
}

/// POST /api/grid/gesture: raw pointer/touch events from the client.
async fn gesture_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GestureRequest>,
) -> impl IntoResponse {
    let now = Instant::now();
    let at = Point::new(req.x, req.y);
    let mut pad = state.pad.lock().await;
    let body = match req.phase {
        GesturePhase::Down => json!({ "pressed": pad.pointer_down(at, now) }),
        GesturePhase::Move => {
            let phase = match pad.pointer_move(at, now) {
                DragUpdate::Pending => "pending",
                DragUpdate::Dragging(_) => "dragging",
                DragUpdate::Inactive => "inactive",
            };
            json!({ "drag": phase, "preview": pad.layer().preview() })
        }
        GesturePhase::Up => match pad.pointer_up(at, now) {
            DropOutcome::NoDrag => json!({ "outcome": "no_drag" }),
            DropOutcome::OutsideGrid => json!({ "outcome": "outside_grid" }),
            DropOutcome::Moved { button_id, from, to } => {
                state.persist_layout(&pad);
                json!({ "outcome": "moved", "button_id": button_id, "from": from, "to": to })
            }
            DropOutcome::Rejected(e) => {
                json!({ "outcome": "rejected", "reason": e.to_string() })
            }
        },
    };
    Json(body)
}

/// POST /api/grid/press/:button_id
async fn press_handler(
    State(state): State<Arc<AppState>>,
    Path(button_id): Path<String>,
) -> Result<impl IntoResponse, DashboardError> {
    let button = state
        .pad
        .lock()
        .await
        .grid()
        .button(&button_id)
        .cloned()
        .ok_or_else(|| GridError::UnknownButton(button_id.clone()))?;

    let body = match state.recorder.press(&button, Instant::now()).await? {
        PressOutcome::Debounced => json!({ "status": "debounced" }),
        PressOutcome::Submitted {
            request,
            optimistic_score,
        } => json!({
            "status": "submitted",
            "request": request,
            "score": optimistic_score.map(|(home, away)| json!({ "home": home, "away": away })),
        }),
    };
    Ok(Json(body))
}

/// GET /api/notices: recent failed submissions
async fn notices_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.recorder.notices().await)
}

/// Embedded single-file scoreboard (HTML + CSS + JS)
const SCOREBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Varsity Scoreboard</title>
<style>
  :root {
    --bg: #0f1117;
    --card: #1a1d27;
    --border: #2a2d3a;
    --accent: #6c63ff;
    --green: #00c896;
    --red: #ff4f6a;
    --text: #e0e0e0;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  .badge { padding: .2rem .6rem; border-radius: 4px; font-size: .75rem; font-weight: 700; text-transform: uppercase; background: var(--border); }
  .badge.connected { background: var(--green); color: #000; }
  .badge.reconnecting, .badge.connecting { background: #ff9800; color: #000; }
  .badge.disconnected { background: var(--red); color: #000; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; padding: 1.2rem; }
  .score { display: grid; grid-template-columns: 1fr auto 1fr; align-items: center; text-align: center; }
  .score .team { font-size: 1.1rem; color: var(--muted); }
  .score .pts { font-size: 3rem; font-weight: 700; }
  .meta { color: var(--muted); font-size: .85rem; text-align: center; margin-top: .5rem; }
  #pad { display: grid; grid-template-columns: repeat(4, 96px); grid-auto-rows: 96px; gap: 0; touch-action: pan-y; user-select: none; }
  .cell { border: 1px dashed var(--border); display: flex; align-items: center; justify-content: center; }
  .cell button { width: 88px; height: 88px; border-radius: 8px; border: none; background: var(--accent); color: #fff; font-weight: 600; cursor: pointer; }
  .cell button.points { background: var(--green); color: #000; }
  #notices li { color: var(--red); font-size: .85rem; list-style: none; padding: .2rem 0; }
  .refresh-btn { background: none; border: 1px solid var(--border); color: var(--muted); padding: .3rem .8rem; border-radius: 6px; cursor: pointer; font-size: .8rem; }
</style>
</head>
<body>
<header>
  <h1>Varsity Scoreboard</h1>
  <span class="badge" id="conn">idle</span>
  <button class="refresh-btn" onclick="reconnect()">Reconnect</button>
</header>
<main>
  <div class="panel">
    <div class="score">
      <div><div class="team" id="home-name">Home</div><div class="pts" id="home-score">0</div></div>
      <div>–</div>
      <div><div class="team" id="away-name">Away</div><div class="pts" id="away-score">0</div></div>
    </div>
    <div class="meta" id="meta">No game selected</div>
  </div>
  <div class="panel"><div id="pad"></div></div>
  <div class="panel"><ul id="notices"></ul></div>
</main>
<script>
const touch = window.matchMedia('(pointer: coarse)').matches;
fetch('/api/grid/input', {
  method: 'PUT',
  headers: {'Content-Type': 'application/json'},
  body: JSON.stringify({capabilities: {pointer_events: 'PointerEvent' in window, primary_touch: touch}})
});

async function loadGame() {
  const g = await (await fetch('/api/current-game')).json();
  if (!g) return;
  document.getElementById('home-name').textContent = g.home_team.name;
  document.getElementById('away-name').textContent = g.away_team.name;
  document.getElementById('home-score').textContent = g.home_team_score;
  document.getElementById('away-score').textContent = g.away_team_score;
  document.getElementById('meta').textContent = g.status + (g.current_period ? ' · period ' + g.current_period : '');
}

async function loadConnection() {
  const c = await (await fetch('/api/connection')).json();
  const el = document.getElementById('conn');
  el.textContent = c.state.state;
  el.className = 'badge ' + c.state.state;
}

async function loadPad() {
  const g = await (await fetch('/api/grid')).json();
  const pad = document.getElementById('pad');
  pad.innerHTML = '';
  g.rows.forEach(row => row.forEach(b => {
    const cell = document.createElement('div');
    cell.className = 'cell';
    if (b) {
      const btn = document.createElement('button');
      btn.textContent = b.label;
      if (b.point_value > 0) btn.classList.add('points');
      btn.onclick = () => press(b.id);
      cell.appendChild(btn);
    }
    pad.appendChild(cell);
  }));
}

async function press(id) {
  const r = await fetch('/api/grid/press/' + encodeURIComponent(id), {method: 'POST'});
  if (!r.ok) alert((await r.json()).message);
  loadGame();
}

function gesture(phase, e) {
  const rect = document.getElementById('pad').getBoundingClientRect();
  return fetch('/api/grid/gesture', {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body: JSON.stringify({phase, x: e.clientX - rect.left, y: e.clientY - rect.top})
  }).then(r => r.json());
}
const padEl = document.getElementById('pad');
padEl.addEventListener('pointerdown', e => gesture('down', e));
padEl.addEventListener('pointermove', e => { if (e.buttons) gesture('move', e); });
padEl.addEventListener('pointerup', async e => {
  const r = await gesture('up', e);
  if (r.outcome === 'moved') loadPad();
});

async function loadNotices() {
  const n = await (await fetch('/api/notices')).json();
  document.getElementById('notices').innerHTML =
    n.map(x => `<li>${new Date(x.at).toLocaleTimeString()} ${x.stat_type}: ${x.message}</li>`).join('');
}

async function reconnect() {
  await fetch('/api/connection/reconnect', {method: 'POST'});
  loadConnection();
}

loadPad();
function loadAll() { loadGame(); loadConnection(); loadNotices(); }
loadAll();
setInterval(loadAll, 1000);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ApiError;
    use crate::db::models::CreateStatRequest;
    use crate::live_scores::sync::ConnectionState;
    use crate::live_scores::transport::{Connection, Connector, Frame, NORMAL_CLOSURE};
    use crate::live_scores::{ReconnectPolicy, SyncCallbacks, SyncSettings};
    use crate::scoring::{StatGrid, StatSink};
    use crate::store::tests::make_game;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;

    /// Accepts every connection and never delivers a frame.
    struct QuietConnector;

    struct QuietConnection;

    #[async_trait]
    impl Connector for QuietConnector {
        async fn connect(&self, _url: &Url) -> Result<Box<dyn Connection>> {
            Ok(Box::new(QuietConnection))
        }
    }

    #[async_trait]
    impl Connection for QuietConnection {
        async fn recv(&mut self) -> Option<Result<Frame>> {
            std::future::pending().await
        }

        async fn ping(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self, _code: u16) -> Result<()> {
            Ok(())
        }
    }

    /// Counts connects; every connection is closed normally by the server.
    #[derive(Default)]
    struct ClosingConnector {
        connects: AtomicUsize,
    }

    struct ClosingConnection {
        closed: bool,
    }

    #[async_trait]
    impl Connector for ClosingConnector {
        async fn connect(&self, _url: &Url) -> Result<Box<dyn Connection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ClosingConnection { closed: false }))
        }
    }

    #[async_trait]
    impl Connection for ClosingConnection {
        async fn recv(&mut self) -> Option<Result<Frame>> {
            if !self.closed {
                self.closed = true;
                return Some(Ok(Frame::Close(Some(NORMAL_CLOSURE))));
            }
            std::future::pending().await
        }

        async fn ping(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self, _code: u16) -> Result<()> {
            Ok(())
        }
    }

    struct AcceptingSink;

    #[async_trait]
    impl StatSink for AcceptingSink {
        async fn create_stat(&self, _req: &CreateStatRequest) -> Result<(), ApiError> {
            Ok(())
        }
    }

    struct RejectingSink;

    #[async_trait]
    impl StatSink for RejectingSink {
        async fn create_stat(&self, _req: &CreateStatRequest) -> Result<(), ApiError> {
            Err(ApiError::Rejected {
                status: 400,
                message: "Player is not on either roster".into(),
            })
        }
    }

    async fn test_state() -> AppState {
        test_state_with(Arc::new(QuietConnector), Arc::new(AcceptingSink)).await
    }

    async fn test_state_with(connector: Arc<dyn Connector>, sink: Arc<dyn StatSink>) -> AppState {
        let store = GameStore::new();
        store.load_games(vec![make_game(7, Some(1))]).await;
        store.load_season_games(1, vec![make_game(7, Some(1))]).await;
        let settings = SyncSettings {
            base_url: Url::parse("ws://127.0.0.1:9").unwrap(),
            policy: ReconnectPolicy::default(),
            ping_interval: Duration::from_secs(25),
        };
        let sync = ScoreSync::new(
            connector,
            store.clone(),
            SyncCallbacks::default(),
            settings,
        );
        let desktop = InputCapabilities {
            pointer_events: true,
            primary_touch: false,
        };
        AppState {
            store: store.clone(),
            sync: Arc::new(Mutex::new(sync)),
            pad: Arc::new(Mutex::new(StatPad::new(
                StatGrid::default_basketball(),
                GridGeometry::default(),
                desktop,
            ))),
            recorder: Arc::new(StatRecorder::new(sink, store)),
            backend: BackendClient::new(&Url::parse("http://127.0.0.1:9").unwrap(), None)
                .unwrap(),
            db: Database::open_in_memory().unwrap(),
            layout_name: "default".into(),
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_game_views() {
        let app = router(test_state().await);

        let (status, body) = send(&app, "GET", "/api/games/7", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["home_team"]["name"], "Falcons");

        let (status, body) = send(&app, "GET", "/api/games/404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "game 404 not found");

        let (_, body) = send(&app, "GET", "/api/seasons/1/games", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = send(&app, "GET", "/api/current-game", None).await;
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_selecting_game_subscribes_and_press_scores() {
        let state = test_state().await;
        let app = router(state.clone());

        let (status, _) = send(&app, "POST", "/api/grid/press/2pt_made", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let patch = json!({"current_game": 7, "selected_player": 23, "selected_side": "home"});
        let (status, body) = send(&app, "PUT", "/api/session", Some(patch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_game"], "7");
        assert_eq!(state.sync.lock().await.game_id(), Some(&GameId::from(7)));

        let (status, body) = send(&app, "POST", "/api/grid/press/2pt_made", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "submitted");
        assert_eq!(body["request"]["period"], 1);
        assert_eq!(body["score"]["home"], 2);

        let (_, body) = send(&app, "POST", "/api/grid/press/2pt_made", None).await;
        assert_eq!(body["status"], "debounced");

        let (status, _) = send(&app, "POST", "/api/grid/press/dunk", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, "DELETE", "/api/session/game", None).await;
        assert!(body["current_game"].is_null());
        assert!(state.sync.lock().await.game_id().is_none());
        state.recorder.shutdown().await;
    }

    #[tokio::test]
    async fn test_move_conflict_and_persisted_drop() {
        let state = test_state().await;
        let app = router(state.clone());

        let occupied = json!({"button_id": "foul", "to": {"x": 0, "y": 0}});
        let (status, _) = send(&app, "POST", "/api/grid/move", Some(occupied)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(state.db.load_layout("default").unwrap().is_none());

        // Default geometry: 96px cells starting at the origin.
        send(&app, "POST", "/api/grid/gesture", Some(json!({"phase": "down", "x": 40.0, "y": 300.0}))).await;
        let (_, body) =
            send(&app, "POST", "/api/grid/gesture", Some(json!({"phase": "move", "x": 300.0, "y": 300.0}))).await;
        assert_eq!(body["drag"], "dragging");
        assert_eq!(body["preview"]["button_id"], "foul");
        let (_, body) =
            send(&app, "POST", "/api/grid/gesture", Some(json!({"phase": "up", "x": 330.0, "y": 330.0}))).await;
        assert_eq!(body["outcome"], "moved");

        let saved = state.db.load_layout("default").unwrap().unwrap();
        assert_eq!(saved.button("foul").unwrap().cell, Cell::new(3, 3));
    }

    async fn wait_for_state(state: &AppState, pred: impl FnMut(&ConnectionState) -> bool) {
        let mut rx = state.sync.lock().await.watch_state();
        rx.wait_for(pred).await.expect("state channel closed");
    }

    #[tokio::test]
    async fn test_session_edits_keep_closed_subscription_closed() {
        let connector = Arc::new(ClosingConnector::default());
        let state = test_state_with(connector.clone(), Arc::new(AcceptingSink)).await;
        let app = router(state.clone());

        send(&app, "PUT", "/api/session", Some(json!({"current_game": 7}))).await;
        wait_for_state(&state, |s| matches!(s, ConnectionState::Closed { .. })).await;
        assert_eq!(connect_count(&connector), 1);

        for patch in [
            json!({"selected_player": 23}),
            json!({"selected_side": "away", "period": 2}),
            json!({"current_game": 7}),
        ] {
            let (status, _) = send(&app, "PUT", "/api/session", Some(patch)).await;
            assert_eq!(status, StatusCode::OK);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connect_count(&connector), 1);
        let (_, body) = send(&app, "GET", "/api/connection", None).await;
        assert_eq!(body["state"]["state"], "closed");

        // Only an explicit reconnect opens it again.
        let (_, body) = send(&app, "POST", "/api/connection/reconnect", None).await;
        assert_eq!(body["started"], true);
        wait_for_state(&state, |s| matches!(s, ConnectionState::Closed { .. })).await;
        assert_eq!(connect_count(&connector), 2);
    }

    fn connect_count(connector: &ClosingConnector) -> usize {
        connector.connects.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_reconnect_route() {
        let state = test_state().await;
        let app = router(state.clone());

        let (status, body) = send(&app, "POST", "/api/connection/reconnect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["started"], false);
        assert_eq!(body["state"]["state"], "idle");

        send(&app, "PUT", "/api/session", Some(json!({"current_game": 7}))).await;
        wait_for_state(&state, |s| matches!(s, ConnectionState::Connected { .. })).await;

        let (status, body) = send(&app, "POST", "/api/connection/reconnect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["started"], true);
        assert_eq!(body["state"]["state"], "connecting");
        assert_eq!(body["state"]["game_id"], "7");
        assert_eq!(body["state"]["attempt"], 0);

        wait_for_state(&state, |s| matches!(s, ConnectionState::Connected { .. })).await;
        let (_, body) = send(&app, "GET", "/api/connection", None).await;
        assert_eq!(body["game_id"], "7");
        assert_eq!(body["state"]["state"], "connected");
        state.sync.lock().await.disconnect().await;
    }

    #[tokio::test]
    async fn test_rejected_press_shows_up_in_notices() {
        let state = test_state_with(Arc::new(QuietConnector), Arc::new(RejectingSink)).await;
        let app = router(state.clone());

        let (_, body) = send(&app, "GET", "/api/notices", None).await;
        assert_eq!(body, json!([]));

        let patch = json!({"current_game": 7, "selected_player": 23, "selected_side": "home"});
        send(&app, "PUT", "/api/session", Some(patch)).await;
        let (_, body) = send(&app, "POST", "/api/grid/press/3pt_made", None).await;
        assert_eq!(body["status"], "submitted");
        state.recorder.flush().await;

        let (status, body) = send(&app, "GET", "/api/notices", None).await;
        assert_eq!(status, StatusCode::OK);
        let notices = body.as_array().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0]["stat_type"], "three_point_made");
        assert_eq!(notices[0]["message"], "Player is not on either roster");
        assert!(notices[0]["at"].is_string());
        // The optimistic points stay until the feed says otherwise.
        let (_, body) = send(&app, "GET", "/api/current-game", None).await;
        assert_eq!(body["home_team_score"], 3);
        state.sync.lock().await.disconnect().await;
    }

    #[tokio::test]
    async fn test_move_stands_when_layout_save_fails() {
        let state = test_state().await;
        let app = router(state.clone());
        state.db.execute_batch("DROP TABLE stat_layouts").unwrap();

        let req = json!({"button_id": "foul", "to": {"x": 3, "y": 3}});
        let (status, body) = send(&app, "POST", "/api/grid/move", Some(req)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["to"], json!({"x": 3, "y": 3}));

        let (_, body) = send(&app, "GET", "/api/grid", None).await;
        assert_eq!(body["rows"][3][3]["id"], "foul");
        assert!(state.db.load_layout("default").is_err());
    }

    #[tokio::test]
    async fn test_touch_client_switches_input() {
        let app = router(test_state().await);
        let caps = json!({"capabilities": {"pointer_events": true, "primary_touch": true}});
        let (_, body) = send(&app, "PUT", "/api/grid/input", Some(caps)).await;
        assert_eq!(body["input"], "touch");

        let (_, body) = send(&app, "GET", "/api/grid", None).await;
        assert_eq!(body["input"], "touch");
        assert_eq!(body["rows"][0][0]["id"], "2pt_made");
        assert!(body["rows"][3][3].is_null());
    }
}
