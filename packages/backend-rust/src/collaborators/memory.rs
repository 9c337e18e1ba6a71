//! In-process collaborator implementations, used by the default binary and the
//! test suite.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use pathway_algo::{
    insert_steps_at, ActivityEvent, Concept, ConceptEdge, ConceptGraph, GraphSnapshot, InteractionEvent, LearningStep, MasteryMap,
    StudentProfile,
};

use super::{AssessmentItem, GraphStore, HistoryStore, ItemBank, KnowledgeStore, PathStore, ProfileProvider, SavedPath};
use crate::error::EngineError;

/// Events kept per student; the tracer only ever reads the tail.
pub const MAX_STORED_EVENTS: usize = 1_000;

#[derive(Default)]
pub struct MemoryGraphStore {
    graph: RwLock<GraphSnapshot>,
}

impl MemoryGraphStore {
    pub fn new(graph: GraphSnapshot) -> Self {
        Self {
            graph: RwLock::new(graph),
        }
    }

    pub fn insert_concept(&self, concept: Concept) {
        self.graph.write().insert_concept(concept);
    }

    /// `false` when the edge would close a prerequisite cycle.
    pub fn insert_edge(&self, edge: ConceptEdge) -> bool {
        self.graph.write().insert_edge(edge)
    }

    pub fn len(&self) -> usize {
        self.graph.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.read().is_empty()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn get_concept(&self, id: &str) -> Result<Option<Concept>, EngineError> {
        Ok(self.graph.read().concept(id).cloned())
    }

    async fn get_children(&self, id: &str) -> Result<Vec<Concept>, EngineError> {
        Ok(self.graph.read().children(id).into_iter().cloned().collect())
    }

    async fn get_prerequisites(&self, id: &str) -> Result<Vec<Concept>, EngineError> {
        Ok(self.graph.read().prerequisites(id).into_iter().cloned().collect())
    }

    async fn find_root_ancestor(&self, goal: &str) -> Result<Option<String>, EngineError> {
        Ok(self.graph.read().root_ancestor(goal))
    }

    async fn concept_ids(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.graph.read().concept_ids())
    }
}

#[derive(Default)]
pub struct MemoryKnowledgeStore {
    mastery: RwLock<HashMap<String, MasteryMap>>,
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledgeStore {
    async fn get_mastery_batch(&self, student_id: &str, concept_ids: &[String]) -> Result<MasteryMap, EngineError> {
        let guard = self.mastery.read();
        let stored = guard.get(student_id);
        Ok(concept_ids
            .iter()
            .map(|id| (id.clone(), stored.map(|m| m.get(id)).unwrap_or(0.0)))
            .collect())
    }

    async fn get_all_mastery(&self, student_id: &str) -> Result<MasteryMap, EngineError> {
        Ok(self.mastery.read().get(student_id).cloned().unwrap_or_default())
    }

    async fn upsert_mastery_batch(&self, student_id: &str, mastery: &MasteryMap) -> Result<(), EngineError> {
        self.mastery
            .write()
            .entry(student_id.to_string())
            .or_default()
            .merge(mastery);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    events: RwLock<HashMap<String, Vec<InteractionEvent>>>,
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get_history(&self, student_id: &str) -> Result<Vec<InteractionEvent>, EngineError> {
        Ok(self.events.read().get(student_id).cloned().unwrap_or_default())
    }

    async fn append(&self, student_id: &str, event: InteractionEvent) -> Result<(), EngineError> {
        let mut guard = self.events.write();
        let events = guard.entry(student_id.to_string()).or_default();
        events.push(event);
        if events.len() > MAX_STORED_EVENTS {
            let excess = events.len() - MAX_STORED_EVENTS;
            events.drain(..excess);
        }
        Ok(())
    }
}

/// Unknown students get the default profile.
#[derive(Default)]
pub struct MemoryProfileProvider {
    profiles: RwLock<HashMap<String, StudentProfile>>,
    activity: RwLock<HashMap<String, Vec<ActivityEvent>>>,
}

impl MemoryProfileProvider {
    pub fn set_profile(&self, student_id: impl Into<String>, profile: StudentProfile) {
        self.profiles.write().insert(student_id.into(), profile);
    }
}

#[async_trait]
impl ProfileProvider for MemoryProfileProvider {
    async fn get_profile(&self, student_id: &str) -> Result<StudentProfile, EngineError> {
        Ok(self.profiles.read().get(student_id).copied().unwrap_or_default())
    }

    async fn get_activity(&self, student_id: &str) -> Result<Vec<ActivityEvent>, EngineError> {
        Ok(self.activity.read().get(student_id).cloned().unwrap_or_default())
    }

    async fn append_activity(&self, student_id: &str, events: &[ActivityEvent]) -> Result<(), EngineError> {
        let mut activity = self.activity.write();
        let stored = activity.entry(student_id.to_string()).or_default();
        stored.extend_from_slice(events);
        if stored.len() > MAX_STORED_EVENTS {
            let excess = stored.len() - MAX_STORED_EVENTS;
            stored.drain(..excess);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPathStore {
    paths: RwLock<HashMap<String, SavedPath>>,
}

#[async_trait]
impl PathStore for MemoryPathStore {
    async fn save_path(
        &self,
        student_id: &str,
        goal_ids: &[String],
        steps: &[LearningStep],
        total_time: f64,
    ) -> Result<String, EngineError> {
        let id = uuid::Uuid::new_v4().to_string();
        let path = SavedPath {
            id: id.clone(),
            student_id: student_id.to_string(),
            goal_ids: goal_ids.to_vec(),
            steps: steps.to_vec(),
            total_time,
            created_at: Utc::now(),
        };
        self.paths.write().insert(id.clone(), path);
        Ok(id)
    }

    async fn get_path(&self, path_id: &str) -> Result<Option<SavedPath>, EngineError> {
        Ok(self.paths.read().get(path_id).cloned())
    }

    async fn insert_steps(&self, path_id: &str, at: u32, steps: Vec<LearningStep>) -> Result<(), EngineError> {
        let mut guard = self.paths.write();
        let path = guard
            .get_mut(path_id)
            .ok_or_else(|| EngineError::NotFound(format!("learning path '{}'", path_id)))?;
        let added: f64 = steps.iter().map(|s| s.estimated_time).sum();
        insert_steps_at(&mut path.steps, at, steps)?;
        path.total_time += added;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryItemBank {
    items: RwLock<Vec<AssessmentItem>>,
}

impl MemoryItemBank {
    pub fn new(items: Vec<AssessmentItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn insert(&self, item: AssessmentItem) {
        self.items.write().push(item);
    }
}

#[async_trait]
impl ItemBank for MemoryItemBank {
    async fn next_item(
        &self,
        concept_ids: &[String],
        target_difficulty: f64,
        exclude_ids: &[String],
    ) -> Result<Option<AssessmentItem>, EngineError> {
        let guard = self.items.read();
        let best = guard
            .iter()
            .filter(|item| concept_ids.iter().any(|c| *c == item.concept_id))
            .filter(|item| !exclude_ids.iter().any(|e| *e == item.id))
            .min_by(|a, b| {
                let da = (a.difficulty - target_difficulty).abs();
                let db = (b.difficulty - target_difficulty).abs();
                da.total_cmp(&db).then_with(|| a.id.cmp(&b.id))
            });
        Ok(best.cloned())
    }

    async fn get_item(&self, id: &str) -> Result<Option<AssessmentItem>, EngineError> {
        Ok(self.items.read().iter().find(|item| item.id == id).cloned())
    }
}
