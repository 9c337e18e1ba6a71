//! Policy Engine (DQN)
//!
//! Value-based policy mapping the fused state vector to one Q-value per concept
//! action.
//!
//! Core behavior:
//! - ε-greedy selection restricted to a valid action set (others masked to -inf)
//! - Candidate routes reduce to a one-step decision over their first
//!   distinguishing concept
//! - Experience replay (bounded FIFO) with uniform mini-batches
//! - TD target r + γ · max_a' Q_target(s', a') · (1 - done), MSE loss, Adam
//! - Separate target network synced every `target_sync_interval` train steps
//!
//! The agent itself is single-threaded; callers share it behind a read/write
//! lock so that only training and checkpoint loading mutate weights.

mod network;
mod replay;
mod reward;
mod state;

pub use network::{Adam, QNetwork};
pub use replay::{ReplayBuffer, Transition, DEFAULT_REPLAY_CAPACITY};
pub use reward::{
    compute_reward, RewardComponents, RewardWeights, DEFAULT_REWARD_ABILITY, DEFAULT_REWARD_DIFFICULTY,
};
pub use state::{state_dim, StateVector, PROFILE_SLOTS};

use ndarray::ArrayView1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::concept_index::ConceptIndex;
use crate::dkt::DEFAULT_NUM_CONCEPTS;
use crate::sanitize::diagnose_weights;
use crate::types::{ModelStatus, PathCandidate};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("contract mismatch: {0}")]
    ContractMismatch(String),

    #[error("no candidate routes to choose from")]
    NoCandidates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    /// Concept slots, equal to the action count
    pub knowledge_dim: usize,
    pub hidden_dim: usize,
    pub epsilon: f64,
    pub gamma: f64,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub replay_capacity: usize,
    /// Train steps between target-network syncs
    pub target_sync_interval: u64,
    pub seed: u64,
    pub reward_weights: RewardWeights,
    /// Use the current state as both s and s' when feedback carries no previous
    /// state vector
    pub approximate_missing_state: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            knowledge_dim: DEFAULT_NUM_CONCEPTS,
            hidden_dim: 256,
            epsilon: 0.1,
            gamma: 0.99,
            learning_rate: 1e-3,
            batch_size: 64,
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
            target_sync_interval: 100,
            seed: 42,
            reward_weights: RewardWeights::default(),
            approximate_missing_state: true,
        }
    }
}

impl PolicyConfig {
    pub fn input_dim(&self) -> usize {
        state_dim(self.knowledge_dim)
    }

    pub fn action_dim(&self) -> usize {
        self.knowledge_dim
    }
}

/// How a route was chosen among candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionSource {
    /// Only one candidate existed; the policy was not queried
    SingleCandidate,
    /// The policy picked the decision concept
    Policy,
    /// Lowest-cost candidate, used when nothing was selectable
    LowestCost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateChoice {
    /// Position in the candidate slice
    pub candidate: usize,
    /// Concept the decision was made over, if the policy was queried
    pub decision_concept: Option<String>,
    pub source: SelectionSource,
}

/// Persisted policy state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCheckpoint {
    pub input_dim: usize,
    pub action_dim: usize,
    pub hidden_dim: usize,
    pub train_steps: u64,
    pub online: QNetwork,
}

pub struct DqnAgent {
    config: PolicyConfig,
    online: QNetwork,
    target: QNetwork,
    optimizer: Adam,
    replay: ReplayBuffer,
    train_steps: u64,
    status: ModelStatus,
}

impl DqnAgent {
    /// Agent with seeded random weights; the target network starts as a copy.
    pub fn new(config: PolicyConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let online = QNetwork::random(config.input_dim(), config.hidden_dim, config.action_dim(), &mut rng);
        let target = online.clone();
        let optimizer = Adam::new(&online, config.learning_rate);
        let replay = ReplayBuffer::new(config.replay_capacity);
        Self {
            config,
            online,
            target,
            optimizer,
            replay,
            train_steps: 0,
            status: ModelStatus::Untrained,
        }
    }

    /// Restores online weights from a checkpoint and copies them into the
    /// target network. Optimizer moments and replay start fresh.
    pub fn from_checkpoint(config: PolicyConfig, checkpoint: PolicyCheckpoint) -> Result<Self, PolicyError> {
        let (input_dim, hidden_dim, action_dim) = (config.input_dim(), config.hidden_dim, config.action_dim());
        if checkpoint.input_dim != input_dim
            || checkpoint.action_dim != action_dim
            || checkpoint.hidden_dim != hidden_dim
            || !checkpoint.online.has_layout(input_dim, hidden_dim, action_dim)
        {
            return Err(PolicyError::ContractMismatch(format!(
                "checkpoint layout {}->{}->{} does not match configured {}->{}->{}",
                checkpoint.input_dim,
                checkpoint.hidden_dim,
                checkpoint.action_dim,
                input_dim,
                hidden_dim,
                action_dim
            )));
        }
        let diagnostics = diagnose_weights(checkpoint.online.tensors());
        if !diagnostics.is_healthy {
            return Err(PolicyError::ContractMismatch(diagnostics.message));
        }

        let mut agent = Self::new(config);
        agent.optimizer = Adam::new(&checkpoint.online, agent.config.learning_rate);
        agent.target = checkpoint.online.clone();
        agent.online = checkpoint.online;
        agent.train_steps = checkpoint.train_steps;
        agent.status = ModelStatus::Trained;
        Ok(agent)
    }

    pub fn checkpoint(&self) -> PolicyCheckpoint {
        PolicyCheckpoint {
            input_dim: self.config.input_dim(),
            action_dim: self.config.action_dim(),
            hidden_dim: self.config.hidden_dim,
            train_steps: self.train_steps,
            online: self.online.clone(),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Online-network Q-values for one state.
    pub fn q_values(&self, state: &[f64]) -> Result<Vec<f64>, PolicyError> {
        self.check_state(state, "state")?;
        Ok(self.online.forward(ArrayView1::from(state)).to_vec())
    }

    /// ε-greedy action among `valid_actions`. Out-of-range entries are ignored;
    /// an empty set means every action is valid.
    pub fn select_action<R: Rng + ?Sized>(
        &self,
        state: &[f64],
        valid_actions: &[usize],
        rng: &mut R,
    ) -> Result<usize, PolicyError> {
        self.check_state(state, "state")?;
        let action_dim = self.config.action_dim();
        let mut valid: Vec<usize> = valid_actions.iter().copied().filter(|&a| a < action_dim).collect();
        valid.sort_unstable();
        valid.dedup();
        if valid.is_empty() {
            valid = (0..action_dim).collect();
        }
        if valid.is_empty() {
            return Err(PolicyError::ContractMismatch("policy has no actions".into()));
        }

        if self.config.epsilon > 0.0 && rng.gen::<f64>() < self.config.epsilon {
            return Ok(valid[rng.gen_range(0..valid.len())]);
        }

        let q = self.online.forward(ArrayView1::from(state));
        let mut best = valid[0];
        for &a in &valid[1..] {
            if q[a] > q[best] {
                best = a;
            }
        }
        Ok(best)
    }

    /// Picks one of `candidates` by querying the policy over each candidate's
    /// decision concept: the first concept after the prefix all candidates share.
    /// Candidates whose decision concept is not indexed cannot be picked; when
    /// none can, the lowest-cost candidate is returned.
    pub fn select_candidate<R: Rng + ?Sized>(
        &self,
        state: &[f64],
        candidates: &[PathCandidate],
        index: &ConceptIndex,
        rng: &mut R,
    ) -> Result<CandidateChoice, PolicyError> {
        match candidates.len() {
            0 => return Err(PolicyError::NoCandidates),
            1 => {
                return Ok(CandidateChoice {
                    candidate: 0,
                    decision_concept: None,
                    source: SelectionSource::SingleCandidate,
                })
            }
            _ => {}
        }

        let decisions = decision_concepts(candidates);
        let actions: Vec<Option<usize>> = decisions
            .iter()
            .map(|decision| {
                decision
                    .and_then(|id| index.index_of(id))
                    .filter(|&a| a < self.config.action_dim())
            })
            .collect();
        let valid: Vec<usize> = actions.iter().flatten().copied().collect();
        if valid.is_empty() {
            return Ok(lowest_cost_choice(candidates));
        }

        let action = self.select_action(state, &valid, rng)?;
        let chosen = actions
            .iter()
            .position(|a| *a == Some(action))
            .ok_or_else(|| PolicyError::ContractMismatch(format!("action {} maps to no candidate", action)))?;
        Ok(CandidateChoice {
            candidate: chosen,
            decision_concept: decisions[chosen].map(str::to_string),
            source: SelectionSource::Policy,
        })
    }

    /// Appends a transition after validating its layout.
    pub fn store_transition(&mut self, transition: Transition) -> Result<(), PolicyError> {
        self.check_state(&transition.state, "state")?;
        self.check_state(&transition.next_state, "next state")?;
        if transition.action >= self.config.action_dim() {
            return Err(PolicyError::ContractMismatch(format!(
                "action {} outside action space of {}",
                transition.action,
                self.config.action_dim()
            )));
        }
        if !transition.reward.is_finite() {
            return Err(PolicyError::ContractMismatch("reward is not finite".into()));
        }
        self.replay.push(transition);
        Ok(())
    }

    /// One mini-batch update. Returns the batch loss, or `None` (a no-op) while
    /// the buffer holds fewer than `batch_size` transitions.
    pub fn train_step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<f64> {
        let batch = self.replay.sample(self.config.batch_size, rng)?;
        let scale = 1.0 / batch.len() as f64;
        let mut grads = QNetwork::zeros_like(&self.online);
        let mut loss = 0.0;

        for t in batch {
            let next_max = if t.done {
                0.0
            } else {
                self.target
                    .forward(ArrayView1::from(t.next_state.as_slice()))
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max)
            };
            let target = t.reward + self.config.gamma * next_max;
            let td = self.online.accumulate_gradients(
                ArrayView1::from(t.state.as_slice()),
                t.action,
                target,
                scale,
                &mut grads,
            );
            loss += td * td * scale;
        }

        self.optimizer.apply(&mut self.online, &grads);
        self.train_steps += 1;
        self.status = ModelStatus::Trained;
        if self.config.target_sync_interval > 0 && self.train_steps % self.config.target_sync_interval == 0 {
            self.sync_target();
        }
        Some(loss)
    }

    /// Copies online weights into the target network.
    pub fn sync_target(&mut self) {
        self.target = self.online.clone();
    }

    pub fn reward(&self, components: &RewardComponents) -> f64 {
        compute_reward(components, &self.config.reward_weights)
    }

    fn check_state(&self, state: &[f64], what: &str) -> Result<(), PolicyError> {
        if state.len() != self.config.input_dim() {
            return Err(PolicyError::ContractMismatch(format!(
                "{} has {} slots, policy expects {}",
                what,
                state.len(),
                self.config.input_dim()
            )));
        }
        Ok(())
    }
}

/// Per candidate, the first concept after the prefix shared by all candidates
/// (the last concept when a candidate is the prefix itself).
fn decision_concepts(candidates: &[PathCandidate]) -> Vec<Option<&str>> {
    let shortest = candidates.iter().map(|c| c.concepts.len()).min().unwrap_or(0);
    let mut prefix = 0;
    while prefix < shortest {
        let id = &candidates[0].concepts[prefix].id;
        if candidates.iter().all(|c| &c.concepts[prefix].id == id) {
            prefix += 1;
        } else {
            break;
        }
    }
    candidates
        .iter()
        .map(|c| {
            c.concepts
                .get(prefix)
                .or_else(|| c.concepts.last())
                .map(|concept| concept.id.as_str())
        })
        .collect()
}

/// Lowest-cost candidate; earlier candidates win ties.
pub fn lowest_cost_choice(candidates: &[PathCandidate]) -> CandidateChoice {
    let mut best = 0;
    for (i, c) in candidates.iter().enumerate().skip(1) {
        if c.cost < candidates[best].cost {
            best = i;
        }
    }
    CandidateChoice {
        candidate: best,
        decision_concept: None,
        source: SelectionSource::LowestCost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Concept;

    fn config() -> PolicyConfig {
        PolicyConfig {
            knowledge_dim: 6,
            hidden_dim: 16,
            batch_size: 4,
            replay_capacity: 32,
            target_sync_interval: 2,
            ..Default::default()
        }
    }

    fn state(seed: f64) -> Vec<f64> {
        (0..state_dim(6)).map(|i| ((i as f64 + seed) * 0.37).sin().abs()).collect()
    }

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    fn candidate(ids: &[&str], cost: f64) -> PathCandidate {
        PathCandidate::from_concepts(ids.iter().map(|id| Concept::new(*id, 3.0, 10.0)).collect(), cost)
    }

    fn index() -> ConceptIndex {
        ConceptIndex::new(["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect(), 6).unwrap()
    }

    #[test]
    fn greedy_selection_is_deterministic() {
        let mut cfg = config();
        cfg.epsilon = 0.0;
        let agent = DqnAgent::new(cfg);
        let s = state(1.0);
        let first = agent.select_action(&s, &[1, 3, 4], &mut rng(1)).unwrap();
        for seed in 0..20 {
            assert_eq!(agent.select_action(&s, &[1, 3, 4], &mut rng(seed)).unwrap(), first);
        }
    }

    #[test]
    fn selection_never_leaves_valid_set() {
        let mut cfg = config();
        cfg.epsilon = 0.5;
        let agent = DqnAgent::new(cfg);
        let mut r = rng(9);
        for i in 0..200 {
            let action = agent.select_action(&state(i as f64), &[2, 5], &mut r).unwrap();
            assert!(action == 2 || action == 5);
        }
    }

    #[test]
    fn greedy_picks_masked_argmax() {
        let mut cfg = config();
        cfg.epsilon = 0.0;
        let agent = DqnAgent::new(cfg);
        let s = state(2.0);
        let q = agent.q_values(&s).unwrap();
        let valid = [0usize, 2, 4];
        let expected = *valid
            .iter()
            .max_by(|a, b| q[**a].total_cmp(&q[**b]))
            .unwrap();
        assert_eq!(agent.select_action(&s, &valid, &mut rng(0)).unwrap(), expected);
    }

    #[test]
    fn empty_valid_set_considers_all_actions() {
        let agent = DqnAgent::new(config());
        let action = agent.select_action(&state(0.0), &[], &mut rng(0)).unwrap();
        assert!(action < 6);
    }

    #[test]
    fn wrong_state_length_is_contract_mismatch() {
        let agent = DqnAgent::new(config());
        let err = agent.select_action(&[0.0; 3], &[0], &mut rng(0)).unwrap_err();
        assert!(matches!(err, PolicyError::ContractMismatch(_)));
    }

    #[test]
    fn train_step_is_noop_until_batch_available() {
        let mut agent = DqnAgent::new(config());
        let before = agent.checkpoint().online;
        agent
            .store_transition(Transition {
                state: state(0.0),
                action: 1,
                reward: 1.0,
                next_state: state(1.0),
                done: false,
            })
            .unwrap();
        assert!(agent.train_step(&mut rng(0)).is_none());
        assert_eq!(agent.checkpoint().online, before);
        assert_eq!(agent.status(), ModelStatus::Untrained);
    }

    #[test]
    fn training_is_deterministic_with_fixed_seed() {
        let run = || {
            let mut agent = DqnAgent::new(config());
            for i in 0..8 {
                agent
                    .store_transition(Transition {
                        state: state(i as f64),
                        action: i % 6,
                        reward: if i % 2 == 0 { 1.0 } else { -0.5 },
                        next_state: state(i as f64 + 1.0),
                        done: i == 7,
                    })
                    .unwrap();
            }
            let mut r = rng(11);
            for _ in 0..3 {
                assert!(agent.train_step(&mut r).is_some());
            }
            agent.checkpoint().online
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
        assert_ne!(a, DqnAgent::new(config()).checkpoint().online);
    }

    #[test]
    fn target_network_syncs_on_interval() {
        let mut agent = DqnAgent::new(config());
        for i in 0..4 {
            agent
                .store_transition(Transition {
                    state: state(i as f64),
                    action: 0,
                    reward: 1.0,
                    next_state: state(i as f64),
                    done: true,
                })
                .unwrap();
        }
        let mut r = rng(5);
        agent.train_step(&mut r);
        assert_ne!(agent.target, agent.online);
        agent.train_step(&mut r);
        assert_eq!(agent.target, agent.online);
    }

    #[test]
    fn store_rejects_bad_transitions() {
        let mut agent = DqnAgent::new(config());
        let bad_action = Transition {
            state: state(0.0),
            action: 6,
            reward: 0.0,
            next_state: state(0.0),
            done: false,
        };
        assert!(agent.store_transition(bad_action).is_err());
        assert_eq!(agent.replay_len(), 0);
    }

    #[test]
    fn checkpoint_roundtrip_preserves_policy() {
        let mut cfg = config();
        cfg.epsilon = 0.0;
        let agent = DqnAgent::new(cfg.clone());
        let json = serde_json::to_string(&agent.checkpoint()).unwrap();
        let restored = DqnAgent::from_checkpoint(cfg, serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.status(), ModelStatus::Trained);
        assert_eq!(restored.checkpoint(), agent.checkpoint());
        let s = state(3.0);
        assert_eq!(agent.q_values(&s).unwrap(), restored.q_values(&s).unwrap());
    }

    #[test]
    fn checkpoint_layout_mismatch_is_rejected() {
        let agent = DqnAgent::new(config());
        let mut other = config();
        other.knowledge_dim = 7;
        assert!(DqnAgent::from_checkpoint(other, agent.checkpoint()).is_err());
    }

    #[test]
    fn single_candidate_skips_policy() {
        let agent = DqnAgent::new(config());
        let choice = agent
            .select_candidate(&state(0.0), &[candidate(&["a", "b"], 5.0)], &index(), &mut rng(0))
            .unwrap();
        assert_eq!(choice.source, SelectionSource::SingleCandidate);
        assert_eq!(choice.candidate, 0);
    }

    #[test]
    fn decision_is_made_after_shared_prefix() {
        let mut cfg = config();
        cfg.epsilon = 0.0;
        let agent = DqnAgent::new(cfg);
        let candidates = vec![candidate(&["a", "b", "e"], 5.0), candidate(&["a", "c", "e"], 7.0)];
        let choice = agent
            .select_candidate(&state(0.0), &candidates, &index(), &mut rng(0))
            .unwrap();
        assert_eq!(choice.source, SelectionSource::Policy);
        let picked = choice.decision_concept.clone().unwrap();
        assert!(picked == "b" || picked == "c");
        assert_eq!(candidates[choice.candidate].concepts[1].id, picked);
    }

    #[test]
    fn unindexed_decisions_fall_back_to_lowest_cost() {
        let agent = DqnAgent::new(config());
        let candidates = vec![candidate(&["a", "x", "e"], 9.0), candidate(&["a", "y", "e"], 4.0)];
        let choice = agent
            .select_candidate(&state(0.0), &candidates, &index(), &mut rng(0))
            .unwrap();
        assert_eq!(choice.source, SelectionSource::LowestCost);
        assert_eq!(choice.candidate, 1);
    }

    #[test]
    fn no_candidates_is_an_error() {
        let agent = DqnAgent::new(config());
        assert_eq!(
            agent.select_candidate(&state(0.0), &[], &index(), &mut rng(0)),
            Err(PolicyError::NoCandidates)
        );
    }
}
