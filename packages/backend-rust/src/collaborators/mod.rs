//! Contracts for the external systems the engine reads from and writes to.
//!
//! Every call made by the engine goes through [`call`], which bounds it with the
//! configured upstream timeout and reports a hang as `UpstreamUnavailable`.

pub mod memory;
pub mod seed;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pathway_algo::{ActivityEvent, Concept, InteractionEvent, LearningStep, MasteryMap, StudentProfile};

use crate::error::EngineError;

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_concept(&self, id: &str) -> Result<Option<Concept>, EngineError>;

    /// Forward PREREQUISITE neighbours, resources attached.
    async fn get_children(&self, id: &str) -> Result<Vec<Concept>, EngineError>;

    /// Direct prerequisites of `id`.
    async fn get_prerequisites(&self, id: &str) -> Result<Vec<Concept>, EngineError>;

    async fn find_root_ancestor(&self, goal: &str) -> Result<Option<String>, EngineError>;

    async fn concept_ids(&self) -> Result<Vec<String>, EngineError>;
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Ids without a stored value come back as 0.0.
    async fn get_mastery_batch(&self, student_id: &str, concept_ids: &[String]) -> Result<MasteryMap, EngineError>;

    async fn get_all_mastery(&self, student_id: &str) -> Result<MasteryMap, EngineError>;

    /// Idempotent upsert keyed by (student, concept).
    async fn upsert_mastery_batch(&self, student_id: &str, mastery: &MasteryMap) -> Result<(), EngineError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get_history(&self, student_id: &str) -> Result<Vec<InteractionEvent>, EngineError>;

    async fn append(&self, student_id: &str, event: InteractionEvent) -> Result<(), EngineError>;
}

#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn get_profile(&self, student_id: &str) -> Result<StudentProfile, EngineError>;

    /// Raw activity the behavioral part of the profile is derived from.
    async fn get_activity(&self, student_id: &str) -> Result<Vec<ActivityEvent>, EngineError>;

    async fn append_activity(&self, student_id: &str, events: &[ActivityEvent]) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPath {
    pub id: String,
    pub student_id: String,
    pub goal_ids: Vec<String>,
    pub steps: Vec<LearningStep>,
    pub total_time: f64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PathStore: Send + Sync {
    async fn save_path(
        &self,
        student_id: &str,
        goal_ids: &[String],
        steps: &[LearningStep],
        total_time: f64,
    ) -> Result<String, EngineError>;

    async fn get_path(&self, path_id: &str) -> Result<Option<SavedPath>, EngineError>;

    /// Positional insert; existing steps numbered `>= at` shift up.
    async fn insert_steps(&self, path_id: &str, at: u32, steps: Vec<LearningStep>) -> Result<(), EngineError>;
}

/// One placement question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentItem {
    pub id: String,
    pub concept_id: String,
    pub difficulty: f64,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_option: String,
}

impl AssessmentItem {
    pub fn is_correct(&self, answer: &str) -> bool {
        self.correct_option.trim().eq_ignore_ascii_case(answer.trim())
    }
}

#[async_trait]
pub trait ItemBank: Send + Sync {
    /// Item for one of `concept_ids` closest to `target_difficulty`, skipping
    /// `exclude_ids`.
    async fn next_item(
        &self,
        concept_ids: &[String],
        target_difficulty: f64,
        exclude_ids: &[String],
    ) -> Result<Option<AssessmentItem>, EngineError>;

    async fn get_item(&self, id: &str) -> Result<Option<AssessmentItem>, EngineError>;
}

/// Handles to every collaborator
#[derive(Clone)]
pub struct Collaborators {
    pub graph: Arc<dyn GraphStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub history: Arc<dyn HistoryStore>,
    pub profiles: Arc<dyn ProfileProvider>,
    pub paths: Arc<dyn PathStore>,
    pub items: Arc<dyn ItemBank>,
}

impl Collaborators {
    /// In-process implementations over the given seed data.
    pub fn in_memory(seed: seed::SeedData) -> Self {
        let (graph, items) = seed.into_stores();
        Self {
            graph: Arc::new(graph),
            knowledge: Arc::new(memory::MemoryKnowledgeStore::default()),
            history: Arc::new(memory::MemoryHistoryStore::default()),
            profiles: Arc::new(memory::MemoryProfileProvider::default()),
            paths: Arc::new(memory::MemoryPathStore::default()),
            items: Arc::new(items),
        }
    }
}

/// Runs a collaborator call under `timeout`.
pub async fn call<T, F>(collaborator: &'static str, timeout: Duration, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(collaborator, timeout_ms = timeout.as_millis() as u64, "collaborator call timed out");
            Err(EngineError::upstream(
                collaborator,
                format!("timed out after {} ms", timeout.as_millis()),
            ))
        }
    }
}
