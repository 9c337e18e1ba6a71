//! Knowledge Tracer (DKT)
//!
//! Deep Knowledge Tracing over a bounded interaction window.
//!
//! Encoding:
//! - token = concept_index + (num_concepts if correct else 0), so the vocabulary
//!   has 2 * num_concepts entries
//!
//! Network (single sequence, batch of one):
//! - embedding: token -> R^h
//! - single-layer LSTM, gate order (input, forget, cell, output)
//!   - i = σ(W_ii x + b_ii + W_hi h + b_hi)
//!   - f = σ(W_if x + b_if + W_hf h + b_hf)
//!   - g = tanh(W_ig x + b_ig + W_hg h + b_hg)
//!   - o = σ(W_io x + b_io + W_ho h + b_ho)
//!   - c' = f ⊙ c + i ⊙ g, h' = o ⊙ tanh(c')
//! - linear h -> R^n, then sigmoid
//!
//! Only the last timestep is read. The recurrence is causal: the state after
//! step t depends on tokens 0..=t only.

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::concept_index::ConceptIndex;
use crate::sanitize::{clamp_unit, diagnose_weights, sigmoid};
use crate::types::{InteractionEvent, MasteryMap, ModelStatus, DEFAULT_HISTORY_WINDOW};

/// Default number of concept slots (vocabulary is twice this)
pub const DEFAULT_NUM_CONCEPTS: usize = 123;

/// Default LSTM hidden size
pub const DEFAULT_HIDDEN_DIM: usize = 128;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TracerError {
    #[error("contract mismatch: {0}")]
    ContractMismatch(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TracerConfig {
    pub num_concepts: usize,
    pub hidden_dim: usize,
    pub history_window: usize,
    /// Seed for the initial random weights
    pub seed: u64,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            num_concepts: DEFAULT_NUM_CONCEPTS,
            hidden_dim: DEFAULT_HIDDEN_DIM,
            history_window: DEFAULT_HISTORY_WINDOW,
            seed: 42,
        }
    }
}

/// Serializable network parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DktWeights {
    /// (2n, h)
    pub embedding: Array2<f64>,
    /// (4h, h)
    pub weight_ih: Array2<f64>,
    /// (4h, h)
    pub weight_hh: Array2<f64>,
    /// (4h)
    pub bias_ih: Array1<f64>,
    /// (4h)
    pub bias_hh: Array1<f64>,
    /// (n, h)
    pub fc_weight: Array2<f64>,
    /// (n)
    pub fc_bias: Array1<f64>,
}

impl DktWeights {
    /// Uniform(-1/sqrt(h), 1/sqrt(h)) for recurrent and linear layers,
    /// Uniform(-1, 1) for the embedding table.
    pub fn random(num_concepts: usize, hidden_dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let k = 1.0 / (hidden_dim.max(1) as f64).sqrt();
        let mut uniform = |rows: usize, cols: usize, bound: f64| {
            Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-bound..bound))
        };

        let embedding = uniform(2 * num_concepts, hidden_dim, 1.0);
        let weight_ih = uniform(4 * hidden_dim, hidden_dim, k);
        let weight_hh = uniform(4 * hidden_dim, hidden_dim, k);
        let bias_ih = uniform(1, 4 * hidden_dim, k).row(0).to_owned();
        let bias_hh = uniform(1, 4 * hidden_dim, k).row(0).to_owned();
        let fc_weight = uniform(num_concepts, hidden_dim, k);
        let fc_bias = uniform(1, num_concepts, k).row(0).to_owned();

        Self {
            embedding,
            weight_ih,
            weight_hh,
            bias_ih,
            bias_hh,
            fc_weight,
            fc_bias,
        }
    }

    /// Validates every tensor shape against the configured layout.
    pub fn check_shapes(&self, num_concepts: usize, hidden_dim: usize) -> Result<(), TracerError> {
        let expected = [
            ("embedding", self.embedding.dim(), (2 * num_concepts, hidden_dim)),
            ("weightIh", self.weight_ih.dim(), (4 * hidden_dim, hidden_dim)),
            ("weightHh", self.weight_hh.dim(), (4 * hidden_dim, hidden_dim)),
            ("fcWeight", self.fc_weight.dim(), (num_concepts, hidden_dim)),
        ];
        for (name, got, want) in expected {
            if got != want {
                return Err(TracerError::ContractMismatch(format!(
                    "{} has shape {:?}, expected {:?}",
                    name, got, want
                )));
            }
        }
        let vectors = [
            ("biasIh", self.bias_ih.len(), 4 * hidden_dim),
            ("biasHh", self.bias_hh.len(), 4 * hidden_dim),
            ("fcBias", self.fc_bias.len(), num_concepts),
        ];
        for (name, got, want) in vectors {
            if got != want {
                return Err(TracerError::ContractMismatch(format!(
                    "{} has length {}, expected {}",
                    name, got, want
                )));
            }
        }
        Ok(())
    }

    fn tensors(&self) -> [&[f64]; 7] {
        [
            self.embedding.as_slice().unwrap_or(&[]),
            self.weight_ih.as_slice().unwrap_or(&[]),
            self.weight_hh.as_slice().unwrap_or(&[]),
            self.bias_ih.as_slice().unwrap_or(&[]),
            self.bias_hh.as_slice().unwrap_or(&[]),
            self.fc_weight.as_slice().unwrap_or(&[]),
            self.fc_bias.as_slice().unwrap_or(&[]),
        ]
    }
}

/// Persisted tracer state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DktCheckpoint {
    pub num_concepts: usize,
    pub hidden_dim: usize,
    pub weights: DktWeights,
}

pub struct KnowledgeTracer {
    config: TracerConfig,
    weights: DktWeights,
    status: ModelStatus,
}

impl KnowledgeTracer {
    /// Tracer with seeded random weights.
    pub fn new(config: TracerConfig) -> Self {
        let weights = DktWeights::random(config.num_concepts, config.hidden_dim, config.seed);
        Self {
            config,
            weights,
            status: ModelStatus::Untrained,
        }
    }

    /// Tracer restored from trained weights. Shapes must match the config.
    pub fn from_checkpoint(config: TracerConfig, checkpoint: DktCheckpoint) -> Result<Self, TracerError> {
        if checkpoint.num_concepts != config.num_concepts || checkpoint.hidden_dim != config.hidden_dim {
            return Err(TracerError::ContractMismatch(format!(
                "checkpoint layout {}x{} does not match configured {}x{}",
                checkpoint.num_concepts, checkpoint.hidden_dim, config.num_concepts, config.hidden_dim
            )));
        }
        checkpoint
            .weights
            .check_shapes(config.num_concepts, config.hidden_dim)?;
        let diagnostics = diagnose_weights(checkpoint.weights.tensors());
        if !diagnostics.is_healthy {
            return Err(TracerError::ContractMismatch(diagnostics.message));
        }
        Ok(Self {
            config,
            weights: checkpoint.weights,
            status: ModelStatus::Trained,
        })
    }

    pub fn checkpoint(&self) -> DktCheckpoint {
        DktCheckpoint {
            num_concepts: self.config.num_concepts,
            hidden_dim: self.config.hidden_dim,
            weights: self.weights.clone(),
        }
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Mastery for every concept of `index`, computed from the most recent
    /// `history_window` events. Events for concepts outside the index are
    /// dropped before windowing. An empty (or fully unknown) history yields an
    /// empty map.
    pub fn infer(&self, history: &[InteractionEvent], index: &ConceptIndex) -> Result<MasteryMap, TracerError> {
        if index.capacity() != self.config.num_concepts {
            return Err(TracerError::ContractMismatch(format!(
                "concept index capacity {} does not match tracer width {}",
                index.capacity(),
                self.config.num_concepts
            )));
        }

        let tokens: Vec<usize> = history
            .iter()
            .filter_map(|event| {
                index
                    .index_of(&event.concept_id)
                    .map(|idx| encode_token(idx, event.correct, self.config.num_concepts))
            })
            .collect();
        let window_start = tokens.len().saturating_sub(self.config.history_window);
        let probabilities = self.infer_tokens(&tokens[window_start..])?;
        if probabilities.is_empty() {
            return Ok(MasteryMap::new());
        }

        Ok(index
            .ids()
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), probabilities[i]))
            .collect())
    }

    /// Per-slot probabilities after the last token. Empty input gives an empty
    /// vector; a token outside [0, 2n) is a contract violation.
    pub fn infer_tokens(&self, tokens: &[usize]) -> Result<Vec<f64>, TracerError> {
        let vocab = 2 * self.config.num_concepts;
        if let Some(bad) = tokens.iter().find(|&&t| t >= vocab) {
            return Err(TracerError::ContractMismatch(format!(
                "token {} outside vocabulary of {}",
                bad, vocab
            )));
        }
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let hd = self.config.hidden_dim;
        let mut h = Array1::<f64>::zeros(hd);
        let mut c = Array1::<f64>::zeros(hd);

        for &token in tokens {
            let x = self.weights.embedding.row(token);
            let gates = self.weights.weight_ih.dot(&x)
                + &self.weights.bias_ih
                + self.weights.weight_hh.dot(&h)
                + &self.weights.bias_hh;
            let (next_h, next_c) = lstm_cell(gates.view(), &c, hd);
            h = next_h;
            c = next_c;
        }

        let logits = self.weights.fc_weight.dot(&h) + &self.weights.fc_bias;
        Ok(logits.iter().map(|&z| clamp_unit(sigmoid(z))).collect())
    }
}

pub fn encode_token(concept_index: usize, correct: bool, num_concepts: usize) -> usize {
    if correct {
        concept_index + num_concepts
    } else {
        concept_index
    }
}

fn lstm_cell(gates: ArrayView1<f64>, c: &Array1<f64>, hd: usize) -> (Array1<f64>, Array1<f64>) {
    let i = gates.slice(s![0..hd]).mapv(sigmoid);
    let f = gates.slice(s![hd..2 * hd]).mapv(sigmoid);
    let g = gates.slice(s![2 * hd..3 * hd]).mapv(f64::tanh);
    let o = gates.slice(s![3 * hd..4 * hd]).mapv(sigmoid);
    let next_c = &f * c + &i * &g;
    let next_h = &o * &next_c.mapv(f64::tanh);
    (next_h, next_c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> TracerConfig {
        TracerConfig {
            num_concepts: 6,
            hidden_dim: 8,
            history_window: 50,
            seed: 7,
        }
    }

    fn index() -> ConceptIndex {
        ConceptIndex::new((0..4).map(|i| format!("c{}", i)).collect(), 6).unwrap()
    }

    #[test]
    fn empty_history_yields_empty_map() {
        let tracer = KnowledgeTracer::new(small_config());
        let map = tracer.infer(&[], &index()).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn infer_covers_every_indexed_concept() {
        let tracer = KnowledgeTracer::new(small_config());
        let history = vec![InteractionEvent::new("c1", true), InteractionEvent::new("c2", false)];
        let map = tracer.infer(&history, &index()).unwrap();
        assert_eq!(map.len(), 4);
        for (_, p) in map.iter() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn untrained_weights_are_near_uniform() {
        let tracer = KnowledgeTracer::new(TracerConfig::default());
        let tokens: Vec<usize> = (0..30).map(|i| (i * 7) % 246).collect();
        let probs = tracer.infer_tokens(&tokens).unwrap();
        assert_eq!(probs.len(), DEFAULT_NUM_CONCEPTS);
        assert!(probs.iter().all(|p| *p > 0.3 && *p < 0.7));
        assert_eq!(tracer.status(), ModelStatus::Untrained);
    }

    #[test]
    fn only_last_window_influences_output() {
        let tracer = KnowledgeTracer::new(small_config());
        let tail: Vec<InteractionEvent> = (0..50)
            .map(|i| InteractionEvent::new(format!("c{}", i % 4), i % 3 == 0))
            .collect();

        let mut a = vec![InteractionEvent::new("c0", true); 10];
        a.extend(tail.clone());
        let mut b = vec![InteractionEvent::new("c3", false); 25];
        b.extend(tail);

        let idx = index();
        assert_eq!(tracer.infer(&a, &idx).unwrap(), tracer.infer(&b, &idx).unwrap());
    }

    #[test]
    fn output_is_causal() {
        let tracer = KnowledgeTracer::new(small_config());
        let prefix = tracer.infer_tokens(&[1, 7, 3]).unwrap();
        let again = tracer.infer_tokens(&[1, 7, 3]).unwrap();
        let longer = tracer.infer_tokens(&[1, 7, 3, 9]).unwrap();
        assert_eq!(prefix, again);
        assert_ne!(prefix, longer);
    }

    #[test]
    fn unknown_concepts_are_dropped() {
        let tracer = KnowledgeTracer::new(small_config());
        let idx = index();
        let with_noise = vec![
            InteractionEvent::new("ghost", true),
            InteractionEvent::new("c1", true),
        ];
        let clean = vec![InteractionEvent::new("c1", true)];
        assert_eq!(tracer.infer(&with_noise, &idx).unwrap(), tracer.infer(&clean, &idx).unwrap());
    }

    #[test]
    fn out_of_range_token_is_contract_mismatch() {
        let tracer = KnowledgeTracer::new(small_config());
        assert!(matches!(
            tracer.infer_tokens(&[12]),
            Err(TracerError::ContractMismatch(_))
        ));
    }

    #[test]
    fn index_capacity_must_match() {
        let tracer = KnowledgeTracer::new(small_config());
        let wide = ConceptIndex::new(vec!["c0".into()], 10).unwrap();
        assert!(tracer.infer(&[InteractionEvent::new("c0", true)], &wide).is_err());
    }

    #[test]
    fn token_encoding_offsets_correct_answers() {
        assert_eq!(encode_token(3, false, 10), 3);
        assert_eq!(encode_token(3, true, 10), 13);
    }

    #[test]
    fn checkpoint_roundtrip_is_idempotent() {
        let tracer = KnowledgeTracer::new(small_config());
        let json = serde_json::to_string(&tracer.checkpoint()).unwrap();
        let restored =
            KnowledgeTracer::from_checkpoint(small_config(), serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.status(), ModelStatus::Trained);
        assert_eq!(restored.checkpoint(), tracer.checkpoint());
        assert_eq!(
            tracer.infer_tokens(&[0, 8, 2]).unwrap(),
            restored.infer_tokens(&[0, 8, 2]).unwrap()
        );
    }

    #[test]
    fn checkpoint_with_wrong_layout_is_rejected() {
        let tracer = KnowledgeTracer::new(small_config());
        let mut config = small_config();
        config.hidden_dim = 16;
        assert!(KnowledgeTracer::from_checkpoint(config, tracer.checkpoint()).is_err());
    }
}
