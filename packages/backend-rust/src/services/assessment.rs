use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use pathway_algo::{placement_mastery, AssessmentProgress, AssessmentSession, ItemResponse, MasteryMap, PathQuery};

use crate::collaborators::{call, AssessmentItem};
use crate::engine::{ComponentId, PersonalizationEngine, SessionEntry};
use crate::error::EngineError;
use crate::track_component;

/// Item as shown to the student; the answer key stays server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    pub concept_id: String,
    pub difficulty: f64,
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<AssessmentItem> for ItemView {
    fn from(item: AssessmentItem) -> Self {
        Self {
            id: item.id,
            concept_id: item.concept_id,
            difficulty: item.difficulty,
            prompt: item.prompt,
            options: item.options,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    pub theta: f64,
    pub final_mastery: f64,
    /// Final mastery as written for every concept of the goal path
    pub seeded_mastery: MasteryMap,
    /// Difficulty-weighted share of correct answers per answered concept
    pub placement: MasteryMap,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentTurn {
    pub session_id: Uuid,
    pub answered: usize,
    pub theta: f64,
    /// Outcome of the last answer; absent on the opening turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_item: Option<ItemView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AssessmentResult>,
}

impl PersonalizationEngine {
    /// Opens an adaptive placement test over the concepts on the way to `goal`.
    pub async fn start_assessment(&self, student_id: &str, goal: &str) -> Result<AssessmentTurn, EngineError> {
        let goal = self.require_concept(goal).await?;
        let start = self.resolve_start(None, &goal).await?;
        let graph = self.neighbourhood(&start, &goal).await?;
        let query = PathQuery::new(&goal.id).start(Some(&start.id)).with_fallback(true);
        let route = track_component!(
            self.metrics,
            ComponentId::Pathfinder,
            self.pathfinder.find_optimal_path(&graph, &query)
        )?;
        let concept_ids = route.concept_ids();

        let session = AssessmentSession::new();
        let target = session.next_target_difficulty(&self.estimator);
        let item = call(
            "item bank",
            self.timeout(),
            self.collaborators.items.next_item(&concept_ids, target, &[]),
        )
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("assessment items for '{}'", goal.id)))?;

        let session_id = Uuid::new_v4();
        let entry = SessionEntry {
            student_id: student_id.to_string(),
            concept_ids,
            session,
            current_item: item.id.clone(),
            touched_at: Instant::now(),
        };
        self.sessions.write().insert(session_id, entry);

        tracing::info!(
            student_id = %student_id,
            session_id = %session_id,
            goal = %goal.id,
            "assessment started"
        );

        Ok(AssessmentTurn {
            session_id,
            answered: 0,
            theta: 0.0,
            last_correct: None,
            next_item: Some(item.into()),
            result: None,
        })
    }

    /// Scores the answer to the pending item, re-estimates ability and either
    /// serves the next item or closes the session and seeds mastery.
    pub async fn submit_assessment_answer(
        &self,
        session_id: Uuid,
        item_id: &str,
        answer: &str,
    ) -> Result<AssessmentTurn, EngineError> {
        let original = self
            .sessions
            .write()
            .remove(&session_id)
            .ok_or_else(|| EngineError::NotFound(format!("assessment session '{}'", session_id)))?;

        let mut entry = original.clone();
        match self.advance_session(session_id, &mut entry, item_id, answer).await {
            Ok(turn) => {
                if turn.result.is_none() {
                    entry.touched_at = Instant::now();
                    self.sessions.write().insert(session_id, entry);
                }
                Ok(turn)
            }
            Err(err) => {
                self.sessions.write().insert(session_id, original);
                Err(err)
            }
        }
    }

    async fn advance_session(
        &self,
        session_id: Uuid,
        entry: &mut SessionEntry,
        item_id: &str,
        answer: &str,
    ) -> Result<AssessmentTurn, EngineError> {
        if item_id != entry.current_item {
            return Err(EngineError::ContractMismatch(format!(
                "answer for '{}' but the pending item is '{}'",
                item_id, entry.current_item
            )));
        }
        let item = call("item bank", self.timeout(), self.collaborators.items.get_item(item_id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("assessment item '{}'", item_id)))?;
        let correct = item.is_correct(answer);

        let response = ItemResponse {
            item_id: item.id.clone(),
            concept_id: item.concept_id.clone(),
            difficulty: item.difficulty,
            correct,
        };
        let rule = self.config.assessment.stop_rule;
        let mut progress = track_component!(
            self.metrics,
            ComponentId::AbilityEstimator,
            Ok::<_, EngineError>(entry.session.record(response, &self.estimator, &rule))
        )?;

        if let AssessmentProgress::Continue {
            next_target_difficulty, ..
        } = progress
        {
            let next = call(
                "item bank",
                self.timeout(),
                self.collaborators.items.next_item(
                    &entry.concept_ids,
                    next_target_difficulty,
                    &entry.session.answered_item_ids(),
                ),
            )
            .await?;
            match next {
                Some(next) => {
                    entry.current_item = next.id.clone();
                    return Ok(AssessmentTurn {
                        session_id,
                        answered: entry.session.history.len(),
                        theta: entry.session.theta,
                        last_correct: Some(correct),
                        next_item: Some(next.into()),
                        result: None,
                    });
                }
                None => {
                    tracing::debug!(session_id = %session_id, "item bank exhausted, closing assessment");
                    progress = entry.session.finish(&self.estimator);
                }
            }
        }

        let AssessmentProgress::Finished { theta, final_mastery } = progress else {
            return Err(EngineError::Internal("assessment neither continued nor finished".into()));
        };

        let seeded_mastery: MasteryMap = entry
            .concept_ids
            .iter()
            .map(|id| (id.clone(), final_mastery))
            .collect();
        call(
            "knowledge store",
            self.timeout(),
            self.collaborators
                .knowledge
                .upsert_mastery_batch(&entry.student_id, &seeded_mastery),
        )
        .await?;

        tracing::info!(
            student_id = %entry.student_id,
            session_id = %session_id,
            answered = entry.session.history.len(),
            theta,
            final_mastery,
            "assessment finished"
        );

        Ok(AssessmentTurn {
            session_id,
            answered: entry.session.history.len(),
            theta,
            last_correct: Some(correct),
            next_item: None,
            result: Some(AssessmentResult {
                theta,
                final_mastery,
                seeded_mastery,
                placement: placement_mastery(&entry.session.history),
            }),
        })
    }
}
