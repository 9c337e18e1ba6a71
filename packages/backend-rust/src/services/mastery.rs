use serde::Serialize;

use pathway_algo::{InteractionEvent, MasteryMap, ModelStatus};

use crate::collaborators::call;
use crate::engine::{ComponentId, PersonalizationEngine};
use crate::error::EngineError;
use crate::track_component;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryPrediction {
    pub student_id: String,
    pub mastery: MasteryMap,
    pub model_status: ModelStatus,
}

impl PersonalizationEngine {
    /// Tracer estimates from the recent history, overlaid with the stored map.
    /// Stored values (assessment seeds, recorded interactions) win for the
    /// ids they cover. `concept_id` narrows the result to one concept.
    pub async fn predict_mastery(
        &self,
        student_id: &str,
        concept_id: Option<&str>,
    ) -> Result<MasteryPrediction, EngineError> {
        if let Some(id) = concept_id {
            self.require_concept(id).await?;
        }

        let history = call(
            "history store",
            self.timeout(),
            self.collaborators.history.get_history(student_id),
        )
        .await?;
        let inferred = self.infer(history).await?;
        let stored = self.stored_mastery(student_id).await?;
        let mut mastery = inferred.merged(&stored);

        if let Some(id) = concept_id {
            let value = mastery.get(id);
            mastery = MasteryMap::new();
            mastery.insert(id, value);
        }

        Ok(MasteryPrediction {
            student_id: student_id.to_string(),
            mastery,
            model_status: self.tracer.status(),
        })
    }

    /// Appends one answer, re-runs the tracer over the recent window and
    /// upserts the fresh estimate of the answered concept only. Stored values
    /// of other concepts are left alone.
    pub async fn record_interaction(
        &self,
        student_id: &str,
        concept_id: &str,
        correct: bool,
    ) -> Result<MasteryPrediction, EngineError> {
        self.require_concept(concept_id).await?;

        let history_store = &self.collaborators.history;
        call(
            "history store",
            self.timeout(),
            history_store.append(student_id, InteractionEvent::new(concept_id, correct)),
        )
        .await?;
        let history = call("history store", self.timeout(), history_store.get_history(student_id)).await?;

        let fresh = self.infer(history).await?;
        let mut update = MasteryMap::new();
        if fresh.contains(concept_id) {
            update.insert(concept_id, fresh.get(concept_id));
            call(
                "knowledge store",
                self.timeout(),
                self.collaborators.knowledge.upsert_mastery_batch(student_id, &update),
            )
            .await?;
        } else {
            tracing::warn!(concept_id = %concept_id, "concept outside the tracer index, mastery not updated");
        }
        let mastery = fresh.merged(&self.stored_mastery(student_id).await?);

        tracing::debug!(
            student_id = %student_id,
            concept_id = %concept_id,
            correct,
            updated = update.len(),
            "interaction recorded"
        );

        Ok(MasteryPrediction {
            student_id: student_id.to_string(),
            mastery,
            model_status: self.tracer.status(),
        })
    }

    pub(crate) async fn infer(&self, history: Vec<InteractionEvent>) -> Result<MasteryMap, EngineError> {
        if history.is_empty() {
            return Ok(MasteryMap::new());
        }
        let tracer = std::sync::Arc::clone(&self.tracer);
        let index = std::sync::Arc::clone(&self.index);
        track_component!(
            self.metrics,
            ComponentId::KnowledgeTracer,
            self.pool
                .run(move || tracer.infer(&history, &index))
                .await
                .and_then(|result| result.map_err(EngineError::from))
        )
    }
}
