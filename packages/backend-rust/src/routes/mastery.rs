use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::extract::ValidJson;
use crate::response::{ok, AppError, SuccessResponse};
use crate::services::MasteryPrediction;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/students/:studentId/mastery", get(get_mastery))
        .route("/students/:studentId/interactions", post(record_interaction))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasteryQuery {
    concept_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InteractionRequest {
    concept_id: String,
    correct: bool,
}

async fn get_mastery(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Query(query): Query<MasteryQuery>,
) -> Result<Json<SuccessResponse<MasteryPrediction>>, AppError> {
    let concept_id = query.concept_id.as_deref().filter(|id| !id.trim().is_empty());
    let prediction = state.engine().predict_mastery(&student_id, concept_id).await?;
    Ok(ok(prediction))
}

async fn record_interaction(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    ValidJson(payload): ValidJson<InteractionRequest>,
) -> Result<Json<SuccessResponse<MasteryPrediction>>, AppError> {
    if payload.concept_id.trim().is_empty() {
        return Err(AppError::validation("conceptId must not be empty"));
    }
    let prediction = state
        .engine()
        .record_interaction(&student_id, &payload.concept_id, payload.correct)
        .await?;
    Ok(ok(prediction))
}
