use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use super::extract::ValidJson;
use crate::response::{ok, AppError, SuccessResponse};
use crate::services::{GeneratedPath, StepQuizOutcome};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/students/:studentId/learning-paths", post(generate_path))
        .route(
            "/students/:studentId/learning-paths/:pathId/steps/:stepNumber/quiz-result",
            post(submit_quiz_result),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratePathRequest {
    goal_concept_id: String,
    start_concept_id: Option<String>,
    #[serde(default)]
    single_concept_fallback: bool,
}

/// Either a ready score in 0..1 or raw counts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizResultRequest {
    concept_id: Option<String>,
    score: Option<f64>,
    correct: Option<usize>,
    total: Option<usize>,
}

async fn generate_path(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    ValidJson(payload): ValidJson<GeneratePathRequest>,
) -> Result<(StatusCode, Json<SuccessResponse<GeneratedPath>>), AppError> {
    if payload.goal_concept_id.trim().is_empty() {
        return Err(AppError::validation("goalConceptId must not be empty"));
    }
    let start = payload.start_concept_id.as_deref().filter(|id| !id.trim().is_empty());
    let path = state
        .engine()
        .generate_path(
            &student_id,
            start,
            &payload.goal_concept_id,
            payload.single_concept_fallback,
        )
        .await?;
    Ok((StatusCode::CREATED, ok(path)))
}

async fn submit_quiz_result(
    State(state): State<AppState>,
    Path((student_id, path_id, step_number)): Path<(String, String, u32)>,
    ValidJson(payload): ValidJson<QuizResultRequest>,
) -> Result<Json<SuccessResponse<StepQuizOutcome>>, AppError> {
    let engine = state.engine();
    let score = match (payload.score, payload.correct, payload.total) {
        (Some(score), _, _) => {
            if !(0.0..=1.0).contains(&score) {
                return Err(AppError::validation("score must be between 0 and 1"));
            }
            score
        }
        (None, Some(correct), Some(total)) => {
            if correct > total {
                return Err(AppError::validation("correct must not exceed total"));
            }
            engine.quiz_score(correct, total)
        }
        _ => return Err(AppError::validation("either score or correct and total are required")),
    };

    let outcome = engine
        .submit_step_quiz(
            &student_id,
            &path_id,
            step_number,
            payload.concept_id.as_deref(),
            score,
        )
        .await?;
    Ok(ok(outcome))
}
