//! Interaction log: recording and resolving student interaction reports.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod auth;
pub mod codes;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod summary;
pub mod timestamp;

use config::ServerConfig;
use summary::SummaryClient;

/// Upload cap for CSV imports.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<ServerConfig>,
    pub summary: Option<SummaryClient>,
}

impl AppState {
    pub fn new(db: PgPool, config: ServerConfig) -> Self {
        let summary = SummaryClient::from_config(&config.summary);
        Self {
            db,
            config: Arc::new(config),
            summary,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::auth_routes())
        .merge(api::report_routes())
        .merge(api::student_routes())
        .merge(api::user_routes())
        .merge(api::catalog_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
