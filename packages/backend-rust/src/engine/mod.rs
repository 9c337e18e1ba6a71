//! Personalization Engine
//!
//! Long-lived service object built once at start-up and shared with request
//! handlers through `AppState`. It owns:
//! - the concept index, knowledge tracer and route policy
//! - the bounded compute pool that runs model work off the async workers
//! - live assessment sessions
//! - per-component call metrics
//!
//! The operations themselves live in `crate::services`.

pub mod checkpoint;
pub mod compute_pool;
pub mod config;
pub mod metrics;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use pathway_algo::{
    exploration_rng, AbilityEstimator, AssessmentSession, BehavioralProfile, Concept, ConceptEdge, ConceptGraph, ConceptIndex,
    DktCheckpoint, DqnAgent, EdgeKind, ExplorationRng, GraphPathfinder, GraphSnapshot, KnowledgeTracer, MasteryMap, ModelStatus,
    PathAssembler, PolicyCheckpoint, StateVector, StudentProfile,
};

use crate::collaborators::{call, Collaborators};
use crate::error::EngineError;

pub use checkpoint::CheckpointStore;
pub use compute_pool::ComputePool;
pub use config::{AssessmentConfig, EngineConfig};
pub use metrics::{ComponentId, ComponentRegistry, ComponentStatus};

#[derive(Clone)]
pub(crate) struct SessionEntry {
    pub student_id: String,
    pub concept_ids: Vec<String>,
    pub session: AssessmentSession,
    pub current_item: String,
    pub touched_at: Instant,
}

pub struct PersonalizationEngine {
    pub(crate) config: EngineConfig,
    pub(crate) collaborators: Collaborators,
    pub(crate) index: Arc<ConceptIndex>,
    pub(crate) tracer: Arc<KnowledgeTracer>,
    pub(crate) policy: Arc<RwLock<DqnAgent>>,
    pub(crate) rng: Arc<Mutex<ExplorationRng>>,
    pub(crate) pathfinder: GraphPathfinder,
    pub(crate) assembler: PathAssembler,
    pub(crate) estimator: AbilityEstimator,
    pub(crate) sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    pub(crate) metrics: ComponentRegistry,
    pub(crate) pool: ComputePool,
    checkpoints: Option<CheckpointStore>,
    policy_dirty: AtomicBool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub indexed_concepts: usize,
    pub index_capacity: usize,
    pub tracer_status: ModelStatus,
    pub policy_status: ModelStatus,
    pub policy_train_steps: u64,
    pub replay_size: usize,
    pub active_sessions: usize,
    pub compute_workers: usize,
    pub components: Vec<ComponentStatus>,
}

impl PersonalizationEngine {
    /// Builds the engine, restoring checkpoints from `config.checkpoint_dir`
    /// when present. Missing or incompatible checkpoints fall back to random
    /// weights.
    pub async fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self, EngineError> {
        let checkpoints = config.checkpoint_dir.clone().map(CheckpointStore::new);
        let timeout = config.upstream_timeout();

        let index = match &checkpoints {
            Some(store) => match store.load::<ConceptIndex>(checkpoint::CONCEPT_INDEX_FILE).await {
                Ok(Some(index)) if index.capacity() == config.tracer.num_concepts => Some(index),
                Ok(Some(index)) => {
                    tracing::warn!(
                        capacity = index.capacity(),
                        expected = config.tracer.num_concepts,
                        "stored concept index has the wrong capacity, rebuilding"
                    );
                    None
                }
                Ok(None) => None,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read concept index, rebuilding");
                    None
                }
            },
            None => None,
        };
        let index = match index {
            Some(index) => index,
            None => {
                let ids = call("graph store", timeout, collaborators.graph.concept_ids()).await?;
                let index = ConceptIndex::from_unsorted(ids, config.tracer.num_concepts)?;
                if let Some(store) = &checkpoints {
                    if let Err(err) = store.save(checkpoint::CONCEPT_INDEX_FILE, &index).await {
                        tracing::warn!(error = %err, "failed to persist concept index");
                    }
                }
                index
            }
        };

        let tracer = match &checkpoints {
            Some(store) => match store.load::<DktCheckpoint>(checkpoint::DKT_FILE).await {
                Ok(Some(ckpt)) => KnowledgeTracer::from_checkpoint(config.tracer.clone(), ckpt).unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "dkt checkpoint rejected, using random weights");
                    KnowledgeTracer::new(config.tracer.clone())
                }),
                Ok(None) => KnowledgeTracer::new(config.tracer.clone()),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read dkt checkpoint, using random weights");
                    KnowledgeTracer::new(config.tracer.clone())
                }
            },
            None => KnowledgeTracer::new(config.tracer.clone()),
        };

        if config.policy.knowledge_dim != index.capacity() {
            tracing::warn!(
                policy_slots = config.policy.knowledge_dim,
                index_capacity = index.capacity(),
                "policy action space differs from concept index, route choice will fall back to lowest cost"
            );
        }

        let engine = Self {
            pathfinder: GraphPathfinder::new(config.pathfinder.clone()),
            assembler: PathAssembler::new(config.assembler.clone()),
            estimator: AbilityEstimator::new(),
            policy: Arc::new(RwLock::new(DqnAgent::new(config.policy.clone()))),
            rng: Arc::new(Mutex::new(exploration_rng(config.exploration_seed))),
            pool: ComputePool::new(config.compute_workers),
            index: Arc::new(index),
            tracer: Arc::new(tracer),
            sessions: RwLock::new(HashMap::new()),
            metrics: ComponentRegistry::new(),
            policy_dirty: AtomicBool::new(false),
            checkpoints,
            collaborators,
            config,
        };
        engine.load_policy_checkpoint().await?;

        tracing::info!(
            concepts = engine.index.len(),
            tracer = engine.tracer.status().as_str(),
            policy = engine.policy.read().status().as_str(),
            workers = engine.pool.workers(),
            "personalization engine ready"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn concept_index(&self) -> &ConceptIndex {
        &self.index
    }

    pub fn metrics(&self) -> &ComponentRegistry {
        &self.metrics
    }

    pub fn status(&self) -> EngineStatus {
        let policy = self.policy.read();
        EngineStatus {
            indexed_concepts: self.index.len(),
            index_capacity: self.index.capacity(),
            tracer_status: self.tracer.status(),
            policy_status: policy.status(),
            policy_train_steps: policy.train_steps(),
            replay_size: policy.replay_len(),
            active_sessions: self.sessions.read().len(),
            compute_workers: self.pool.workers(),
            components: self.metrics.snapshot(),
        }
    }

    /// Replaces the policy with the stored checkpoint, if any. Holds the policy
    /// write lock for the swap only.
    pub async fn load_policy_checkpoint(&self) -> Result<bool, EngineError> {
        let Some(store) = &self.checkpoints else {
            return Ok(false);
        };
        let ckpt = match store.load::<PolicyCheckpoint>(checkpoint::POLICY_FILE).await {
            Ok(Some(ckpt)) => ckpt,
            Ok(None) => return Ok(false),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read policy checkpoint, keeping current weights");
                return Ok(false);
            }
        };
        match DqnAgent::from_checkpoint(self.config.policy.clone(), ckpt) {
            Ok(agent) => {
                *self.policy.write() = agent;
                self.policy_dirty.store(false, Ordering::Relaxed);
                tracing::info!("policy checkpoint loaded");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(error = %err, "policy checkpoint rejected, keeping current weights");
                Ok(false)
            }
        }
    }

    /// Writes the policy checkpoint when training changed it since the last
    /// flush. Returns whether a file was written.
    pub async fn flush_policy_checkpoint(&self) -> Result<bool, EngineError> {
        let Some(store) = &self.checkpoints else {
            return Ok(false);
        };
        if !self.policy_dirty.swap(false, Ordering::Relaxed) {
            return Ok(false);
        }
        let ckpt = self.policy.read().checkpoint();
        if let Err(err) = store.save(checkpoint::POLICY_FILE, &ckpt).await {
            self.policy_dirty.store(true, Ordering::Relaxed);
            return Err(err);
        }
        tracing::debug!(train_steps = ckpt.train_steps, "policy checkpoint flushed");
        Ok(true)
    }

    pub(crate) fn mark_policy_dirty(&self) {
        self.policy_dirty.store(true, Ordering::Relaxed);
    }

    /// Drops assessment sessions idle for longer than `ttl`.
    pub fn cleanup_sessions(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.touched_at.elapsed() <= ttl);
        before - sessions.len()
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.config.upstream_timeout()
    }

    pub(crate) async fn require_concept(&self, id: &str) -> Result<Concept, EngineError> {
        call("graph store", self.timeout(), self.collaborators.graph.get_concept(id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("concept '{}'", id)))
    }

    /// Profile, or the default profile when the provider is unavailable. When
    /// raw activity is on record the behavioral scalars are derived from it.
    pub(crate) async fn profile_or_default(&self, student_id: &str) -> StudentProfile {
        let profiles = &self.collaborators.profiles;
        let mut profile = match call("profile provider", self.timeout(), profiles.get_profile(student_id)).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!(student_id = %student_id, error = %err, "profile unavailable, using defaults");
                return StudentProfile::default();
            }
        };

        match call("profile provider", self.timeout(), profiles.get_activity(student_id)).await {
            Ok(events) if !events.is_empty() => {
                profile.behavioral = BehavioralProfile::from_activity(&events);
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(student_id = %student_id, error = %err, "activity unavailable, keeping stored behavior");
            }
        }
        profile
    }

    pub(crate) async fn stored_mastery(&self, student_id: &str) -> Result<MasteryMap, EngineError> {
        call(
            "knowledge store",
            self.timeout(),
            self.collaborators.knowledge.get_all_mastery(student_id),
        )
        .await
    }

    pub(crate) fn state_vector(&self, mastery: &MasteryMap, profile: &StudentProfile) -> Vec<f64> {
        StateVector::build(mastery, &self.index, profile).to_vec()
    }

    /// Start concept: the explicit one, else the goal's root ancestor, else the
    /// goal itself.
    pub(crate) async fn resolve_start(&self, start: Option<&str>, goal: &Concept) -> Result<Concept, EngineError> {
        match start {
            Some(id) => self.require_concept(id).await,
            None => {
                let root = call(
                    "graph store",
                    self.timeout(),
                    self.collaborators.graph.find_root_ancestor(&goal.id),
                )
                .await?;
                match root {
                    Some(id) if id != goal.id => self.require_concept(&id).await,
                    _ => Ok(goal.clone()),
                }
            }
        }
    }

    /// Forward neighbourhood of `start` within the hop bound, fetched from the
    /// graph store into a snapshot the pathfinder can search synchronously.
    pub(crate) async fn neighbourhood(&self, start: &Concept, goal: &Concept) -> Result<GraphSnapshot, EngineError> {
        let mut graph = GraphSnapshot::new();
        graph.insert_concept(start.clone());
        graph.insert_concept(goal.clone());

        let mut seen: HashSet<String> = HashSet::from([start.id.clone()]);
        let mut frontier = vec![start.id.clone()];
        for _ in 0..self.config.pathfinder.max_hops {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for id in frontier {
                let children = call("graph store", self.timeout(), self.collaborators.graph.get_children(&id)).await?;
                for child in children {
                    let child_id = child.id.clone();
                    if graph.concept(&child_id).is_none() {
                        graph.insert_concept(child);
                    }
                    graph.insert_edge(ConceptEdge::new(&id, &child_id, EdgeKind::Prerequisite));
                    if child_id != goal.id && seen.insert(child_id.clone()) {
                        next.push(child_id);
                    }
                }
            }
            frontier = next;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::seed::SeedData;

    fn test_config(dir: Option<&std::path::Path>) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.tracer.num_concepts = 16;
        config.tracer.hidden_dim = 8;
        config.policy.knowledge_dim = 16;
        config.policy.hidden_dim = 8;
        config.compute_workers = 2;
        config.checkpoint_dir = dir.map(|d| d.to_path_buf());
        config
    }

    #[tokio::test]
    async fn builds_index_from_graph_and_persists_it() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = Collaborators::in_memory(SeedData::builtin().unwrap());
        let engine = PersonalizationEngine::new(test_config(Some(dir.path())), collaborators)
            .await
            .unwrap();

        assert_eq!(engine.concept_index().len(), 10);
        assert!(dir.path().join(checkpoint::CONCEPT_INDEX_FILE).exists());
        assert_eq!(engine.status().tracer_status, ModelStatus::Untrained);
    }

    #[tokio::test]
    async fn flush_only_writes_when_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = Collaborators::in_memory(SeedData::builtin().unwrap());
        let engine = PersonalizationEngine::new(test_config(Some(dir.path())), collaborators)
            .await
            .unwrap();

        assert!(!engine.flush_policy_checkpoint().await.unwrap());
        engine.mark_policy_dirty();
        assert!(engine.flush_policy_checkpoint().await.unwrap());
        assert!(dir.path().join(checkpoint::POLICY_FILE).exists());
        assert!(!engine.flush_policy_checkpoint().await.unwrap());

        assert!(engine.load_policy_checkpoint().await.unwrap());
        assert_eq!(engine.status().policy_status, ModelStatus::Trained);
    }

    #[tokio::test]
    async fn neighbourhood_respects_hop_bound() {
        let collaborators = Collaborators::in_memory(SeedData::builtin().unwrap());
        let mut config = test_config(None);
        config.pathfinder.max_hops = 1;
        let engine = PersonalizationEngine::new(config, collaborators).await.unwrap();

        let start = engine.require_concept("python_basics").await.unwrap();
        let goal = engine.require_concept("oop").await.unwrap();
        let graph = engine.neighbourhood(&start, &goal).await.unwrap();
        assert!(graph.concept("variables").is_some());
        assert!(graph.concept("control_flow").is_none());
    }
}
