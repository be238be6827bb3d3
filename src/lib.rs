pub mod config;
pub mod geo;
pub mod geocode;
pub mod models;
pub mod scheduler;
pub mod scraping;
pub mod server;
pub mod store;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

use config::Config;
use store::Store;

/// Shared state of the HTTP layer: configuration, the JSON store, and the
/// single in-flight scan guard.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub scan_in_progress: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Config, store: Store) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            scan_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let static_files =
        ServeDir::new("public").not_found_service(ServeFile::new("public/index.html"));

    Router::new()
        .route("/api/status", get(server::get_status))
        .route("/api/scan", post(server::post_scan))
        .route("/api/matches", get(server::get_matches))
        .fallback_service(static_files)
        .with_state(state)
}
