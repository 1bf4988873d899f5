use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

mod backend;
mod config;
mod dashboard;
mod db;
mod live_scores;
mod scoring;
mod store;

use backend::BackendClient;
use config::Config;
use dashboard::AppState;
use db::Database;
use live_scores::{logging_callbacks, ScoreSync, TungsteniteConnector};
use scoring::{GridGeometry, StatGrid, StatPad, StatRecorder};
use store::{GameStore, SessionPatch};

/// How long in-flight stat submissions get to finish on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database and restore the operator's pad layout
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);
    let grid = match db.load_layout(&config.layout_name) {
        Ok(Some(grid)) => {
            info!("Restored stat pad layout '{}'", config.layout_name);
            grid
        }
        Ok(None) => StatGrid::default_basketball(),
        Err(e) => {
            warn!("Ignoring stored layout '{}': {:#}", config.layout_name, e);
            StatGrid::default_basketball()
        }
    };

    // Seed the store from the REST backend
    let backend = BackendClient::new(&config.api_url()?, config.session_cookie.clone())?;
    let store = GameStore::new();
    match backend.fetch_games().await {
        Ok(games) => store.load_games(games).await,
        Err(e) => warn!("Failed to load games: {:#}", e),
    }
    if let Some(season) = config.season_id {
        match backend.fetch_season_games(season).await {
            Ok(games) => store.load_season_games(season, games).await,
            Err(e) => warn!("Failed to load season {} games: {:#}", season, e),
        }
    }
    let initial_game = config.initial_game();
    if let Some(id) = &initial_game {
        if store.game(id).await.is_none() {
            match backend.fetch_game(id).await {
                Ok(game) => store.upsert_game(game).await,
                Err(e) => warn!("Failed to load game {}: {:#}", id, e),
            }
        }
        store
            .update_session(SessionPatch {
                current_game: Some(id.clone()),
                ..Default::default()
            })
            .await;
    }

    // Live score subscription for the current game
    let mut sync = ScoreSync::new(
        Arc::new(TungsteniteConnector::new(config.session_cookie.clone())),
        store.clone(),
        logging_callbacks(),
        config.sync_settings()?,
    );
    sync.set_game(initial_game).await;
    let mut states = sync.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            debug!("Live connection state: {:?}", state);
        }
    });
    let sync = Arc::new(Mutex::new(sync));

    let recorder = Arc::new(StatRecorder::new(Arc::new(backend.clone()), store.clone()));
    let pad = StatPad::new(grid, GridGeometry::default(), config.input_capabilities());

    // Start the dashboard HTTP server
    let state = AppState {
        store,
        sync: Arc::clone(&sync),
        pad: Arc::new(Mutex::new(pad)),
        recorder: Arc::clone(&recorder),
        backend,
        db,
        layout_name: config.layout_name.clone(),
    };
    let app = dashboard::router(state);
    let addr: SocketAddr = config
        .dashboard_addr
        .parse()
        .with_context(|| format!("Invalid DASHBOARD_ADDR: {}", config.dashboard_addr))?;
    info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run dashboard server until Ctrl-C
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await?;

    sync.lock().await.disconnect().await;
    if tokio::time::timeout(SHUTDOWN_GRACE, recorder.flush()).await.is_err() {
        warn!("Stat submissions still pending after {:?}", SHUTDOWN_GRACE);
    }
    recorder.shutdown().await;

    Ok(())
}
