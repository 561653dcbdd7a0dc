mod config;
mod error;
mod oauth;
mod routes;
mod session;
mod state;

use std::fs::File;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::Key;
use shuffle_controller::{Controller, SessionRegistry};
use shuffle_remote::SpotifyRemoteClient;
use shuffle_store::Store;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::oauth::PendingAuthorizations;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Tracing isn't initialized yet: configuration must be
            // readable before we know whether file logging is wanted.
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_file.as_deref());

    let store = match Store::open(&config.database_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open database: {e}");
            std::process::exit(1);
        }
    };

    let remote = Arc::new(SpotifyRemoteClient::new(
        config.spotify_client_id.clone(),
        store.clone(),
    ));
    let run_store = Arc::new(store.run_store());
    let registry = Arc::new(SessionRegistry::new());
    let controller = Arc::new(Controller::new(
        remote.clone(),
        run_store,
        registry,
        config.queue_buffer_size,
    ));

    let cookie_key = Key::derive_from(config.session_secret.as_bytes());
    let state = AppState {
        config: Arc::new(config),
        store: store.clone(),
        controller: controller.clone(),
        remote,
        cookie_key,
        pending_auth: Arc::new(PendingAuthorizations::default()),
    };

    let app = Router::new()
        .route("/login", get(oauth::login))
        .route("/callback", get(oauth::callback))
        .route("/playlists/{id}/controller/start", post(routes::start))
        .route("/playlists/{id}/controller/status", get(routes::status))
        .route("/playlists/{id}/controller/next", post(routes::next))
        .route("/playlists/{id}/controller/stop", post(routes::stop))
        .route("/playlists/{id}/controller/refresh", post(routes::refresh))
        .route("/devices", get(routes::list_devices))
        .route("/runs/{id}/export", get(routes::export_run))
        .route("/runs/import", post(routes::import_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let cancel_token = CancellationToken::new();
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("failed to set Ctrl+C handler: {e}");
    }

    let listener = match tokio::net::TcpListener::bind("0.0.0.0:8080").await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind listener: {e}");
            std::process::exit(1);
        }
    };
    info!("listening on {}", listener.local_addr().map_or_else(|_| "unknown".to_string(), |a| a.to_string()));

    let shutdown_signal = cancel_token.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal.cancelled().await;
        })
        .await;
    if let Err(e) = serve_result {
        error!("server error: {e}");
    }

    info!("shutting down sessions...");
    controller.shutdown().await;
    if let Err(e) = store.checkpoint().await {
        error!("failed to checkpoint database on shutdown: {e}");
    }
}

/// Initialize tracing with console output and optional file logging.
fn init_tracing(log_file: Option<&std::path::Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer();

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match File::create(path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer().with_writer(Arc::new(file)).with_ansi(false);
                tracing_subscriber::registry().with(env_filter).with(fmt_layer).with(file_layer).init();
                return;
            }
            Err(e) => {
                eprintln!("failed to create log file at {}: {e}", path.display());
            }
        }
    }

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
