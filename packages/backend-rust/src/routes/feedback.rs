use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use super::extract::ValidJson;
use crate::response::{ok, AppError, SuccessResponse};
use crate::services::{FeedbackOutcome, PolicyFeedback};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/students/:studentId/feedback", post(record_feedback))
}

async fn record_feedback(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    ValidJson(payload): ValidJson<PolicyFeedback>,
) -> Result<Json<SuccessResponse<FeedbackOutcome>>, AppError> {
    if payload.action_concept_id.trim().is_empty() {
        return Err(AppError::validation("actionConceptId must not be empty"));
    }
    let outcome = state.engine().record_feedback(&student_id, payload).await?;
    Ok(ok(outcome))
}
