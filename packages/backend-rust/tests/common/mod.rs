#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use pathway_backend_rust::collaborators::seed::SeedData;
use pathway_backend_rust::collaborators::Collaborators;
use pathway_backend_rust::config::{Config, RouteConfig};
use pathway_backend_rust::engine::{EngineConfig, PersonalizationEngine};

pub async fn create_test_app() -> Router {
    create_test_app_with(RouteConfig::default()).await
}

pub async fn create_test_app_with(routes: RouteConfig) -> Router {
    let config = Config {
        routes,
        engine: small_config(),
        ..Config::default()
    };
    pathway_backend_rust::create_app(config)
        .await
        .expect("test app should start")
}

/// Small models so tests stay fast.
pub fn small_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.tracer.num_concepts = 16;
    config.tracer.hidden_dim = 8;
    config.policy.knowledge_dim = 16;
    config.policy.hidden_dim = 8;
    config.policy.batch_size = 4;
    config.compute_workers = 2;
    config.checkpoint_dir = None;
    config
}

pub fn seed_collaborators() -> Collaborators {
    Collaborators::in_memory(SeedData::builtin().expect("builtin seed"))
}

pub async fn test_engine(config: EngineConfig, collaborators: Collaborators) -> Arc<PersonalizationEngine> {
    Arc::new(
        PersonalizationEngine::new(config, collaborators)
            .await
            .expect("engine should start"),
    )
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
