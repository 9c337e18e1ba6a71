//! # pathway-algo - adaptive learning path algorithms
//!
//! Pure Rust implementations of the models behind personalized learning paths:
//!
//! - **Graph Pathfinder** - cost-ranked prerequisite routes over a concept DAG
//! - **Knowledge Tracer (DKT)** - recurrent mastery estimation from interaction history
//! - **Ability Estimator (IRT)** - adaptive placement over a fixed θ grid
//! - **Policy Engine (DQN)** - route selection from a fused learner state
//! - **Path Assembler** - learning steps with remediation and quiz grading
//!
//! ## Design goals
//!
//! - **I/O free** - checkpoints are serde values; persistence belongs to the caller
//! - **Deterministic** - every stochastic routine takes a seeded generator
//! - **Tested** - each module carries unit tests next to the code
//!
//! ## Module layout
//!
//! - [`types`] - shared domain types and constants
//! - [`sanitize`] - numeric guards and weight diagnostics
//! - [`concept_index`] - stable concept id to tensor slot mapping
//! - [`profile`] - behavioral, cognitive and preference profiles
//! - [`pathfinder`] - graph search and candidate enumeration
//! - [`dkt`] - LSTM knowledge tracer
//! - [`irt`] - ability estimation and assessment sessions
//! - [`policy`] - DQN agent, replay buffer and reward shaping
//! - [`assembler`] - learning step generation and splicing
//! - [`simulation`] - stochastic learner for offline experiments
//!
//! ## Example
//!
//! ```rust
//! use pathway_algo::{GraphPathfinder, GraphSnapshot, Concept, ConceptEdge, EdgeKind, PathQuery};
//!
//! let graph = GraphSnapshot::from_parts(
//!     vec![Concept::new("a", 2.0, 30.0), Concept::new("b", 4.0, 30.0)],
//!     vec![ConceptEdge::new("a", "b", EdgeKind::Prerequisite)],
//! );
//! let pathfinder = GraphPathfinder::default();
//! let route = pathfinder
//!     .find_optimal_path(&graph, &PathQuery::new("b").start(Some("a")))
//!     .unwrap();
//! assert_eq!(route.concept_ids(), vec!["a", "b"]);
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod assembler;
pub mod concept_index;
pub mod dkt;
pub mod irt;
pub mod pathfinder;
pub mod policy;
pub mod profile;
pub mod sanitize;
pub mod simulation;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use types::*;

pub use assembler::{
    insert_steps_at, AssembledPath, AssemblerConfig, AssemblyError, PathAssembler, QuizGrade,
};
pub use concept_index::{ConceptIndex, ConceptIndexError};
pub use dkt::{DktCheckpoint, KnowledgeTracer, TracerConfig, TracerError};
pub use irt::{
    placement_mastery, AbilityEstimator, AssessmentProgress, AssessmentSession, ItemResponse,
    StopRule,
};
pub use pathfinder::{
    step_cost, ConceptGraph, GraphPathfinder, GraphSnapshot, PathQuery, PathfindError,
    PathfinderConfig,
};
pub use policy::{
    CandidateChoice, DqnAgent, PolicyCheckpoint, PolicyConfig, PolicyError, RewardComponents,
    RewardWeights, SelectionSource, StateVector, Transition,
};
pub use profile::{
    ActivityEvent, ActivityKind, BehavioralProfile, CognitiveProfile, LearningPreferences,
    StudentProfile,
};
pub use simulation::{EpisodeOutcome, LearnerArchetype, QuizAttempt, SimulatedLearner};

/// Generator used for exploration and replay sampling
pub type ExplorationRng = rand_chacha::ChaCha8Rng;

/// Seeded exploration generator
pub fn exploration_rng(seed: u64) -> ExplorationRng {
    use rand::SeedableRng;
    ExplorationRng::seed_from_u64(seed)
}
