pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod workers;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::collaborators::seed::SeedData;
use crate::collaborators::Collaborators;
use crate::config::{Config, RouteConfig};
use crate::engine::PersonalizationEngine;
use crate::error::EngineError;
use crate::state::AppState;

/// HTTP application over an already built engine.
pub fn app(engine: Arc<PersonalizationEngine>, routes: &RouteConfig) -> axum::Router {
    routes::router(AppState::new(engine), routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// In-memory application over the built-in seed graph. Checkpoints stay in
/// memory whatever `config.engine.checkpoint_dir` says.
pub async fn create_app(mut config: Config) -> Result<axum::Router, EngineError> {
    config.engine.checkpoint_dir = None;
    let engine = PersonalizationEngine::new(config.engine, Collaborators::in_memory(SeedData::builtin()?)).await?;
    Ok(app(Arc::new(engine), &config.routes))
}
