use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use super::extract::ValidJson;
use crate::response::{ok, AppError, SuccessResponse};
use crate::services::AssessmentTurn;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/students/:studentId/assessments", post(start_assessment))
        .route("/assessments/:sessionId/answers", post(submit_answer))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartAssessmentRequest {
    goal_concept_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerRequest {
    item_id: String,
    answer: String,
}

async fn start_assessment(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    ValidJson(payload): ValidJson<StartAssessmentRequest>,
) -> Result<(StatusCode, Json<SuccessResponse<AssessmentTurn>>), AppError> {
    if payload.goal_concept_id.trim().is_empty() {
        return Err(AppError::validation("goalConceptId must not be empty"));
    }
    let turn = state
        .engine()
        .start_assessment(&student_id, &payload.goal_concept_id)
        .await?;
    Ok((StatusCode::CREATED, ok(turn)))
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    ValidJson(payload): ValidJson<AnswerRequest>,
) -> Result<Json<SuccessResponse<AssessmentTurn>>, AppError> {
    let turn = state
        .engine()
        .submit_assessment_answer(session_id, &payload.item_id, &payload.answer)
        .await?;
    Ok(ok(turn))
}
