use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use pathway_algo::ActivityEvent;

use super::extract::ValidJson;
use crate::response::{ok, AppError, SuccessResponse};
use crate::services::ActivitySummary;
use crate::state::AppState;

const MAX_EVENTS_PER_REQUEST: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new().route("/students/:studentId/activity", post(record_activity))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRequest {
    events: Vec<ActivityEvent>,
}

async fn record_activity(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    ValidJson(payload): ValidJson<ActivityRequest>,
) -> Result<Json<SuccessResponse<ActivitySummary>>, AppError> {
    if payload.events.is_empty() {
        return Err(AppError::validation("events must not be empty"));
    }
    if payload.events.len() > MAX_EVENTS_PER_REQUEST {
        return Err(AppError::validation(format!(
            "at most {} events per request",
            MAX_EVENTS_PER_REQUEST
        )));
    }
    let summary = state.engine().record_activity(&student_id, payload.events).await?;
    Ok(ok(summary))
}
