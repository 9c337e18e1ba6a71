mod activity;
mod assessments;
mod extract;
mod feedback;
mod health;
mod learning_paths;
mod mastery;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::config::RouteConfig;
use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState, config: &RouteConfig) -> Router {
    let mut api = Router::new()
        .merge(mastery::router())
        .merge(activity::router())
        .merge(learning_paths::router());
    if config.enable_assessments {
        api = api.merge(assessments::router());
    }
    if config.enable_feedback {
        api = api.merge(feedback::router());
    }

    let mut app = Router::new()
        .route("/", get(root))
        .nest("/api/v1", api)
        .nest("/health", health::router());
    let extra_health = config.healthcheck_endpoint.as_str();
    if extra_health != "/health" && extra_health != "/" {
        app = app.nest(extra_health, health::router());
    }

    app.fallback(fallback_handler).with_state(state)
}

async fn root() -> &'static str {
    "pathway personalization engine"
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}
