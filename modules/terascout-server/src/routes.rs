use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use terascout_common::EngineSettings;
use terascout_engine::{ChangeAnalyst, Mailer, PageFetcher};

use crate::registry::ScoutRegistry;
use crate::rest;

pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: EngineSettings,
    pub notify_from: String,
    pub fetcher: Arc<dyn PageFetcher>,
    pub analyst: Arc<dyn ChangeAnalyst>,
    pub mailer: Arc<dyn Mailer>,
    pub registry: ScoutRegistry,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/scouts", post(rest::scouts::create_scout))
        .route(
            "/api/scouts/{id}",
            get(rest::scouts::get_scout).delete(rest::scouts::delete_scout),
        )
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
