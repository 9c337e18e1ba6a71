//! Ability Estimator (IRT)
//!
//! Two-parameter-logistic item response model with discrimination fixed at 1.0.
//!
//! Mathematical formulas:
//! - Item difficulty remap: b = (difficulty - 5.5) / 1.5  (1..10 -> -3..+3)
//! - Response probability: P(correct | θ, b) = 1 / (1 + e^-(θ - b))
//! - Ability: argmax of log-likelihood over θ ∈ [-3, 3], step 0.1 (61 points)
//! - Next target: clip(θ * 1.5 + 5.5, 1, 10)
//! - Mastery: sigmoid(θ)
//!
//! Grid search keeps the estimate stateless and reproducible; probabilities are
//! clipped to [1e-9, 1 - 1e-9] before taking logs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sanitize::{clip_probability, round2, sigmoid};
use crate::types::{MasteryMap, MAX_DIFFICULTY, MIN_DIFFICULTY};

/// Lower end of the ability grid
pub const THETA_MIN: f64 = -3.0;

/// Upper end of the ability grid
pub const THETA_MAX: f64 = 3.0;

/// Number of grid points between THETA_MIN and THETA_MAX inclusive
pub const THETA_GRID_POINTS: usize = 61;

/// Centre of the domain difficulty scale
const DIFFICULTY_CENTER: f64 = 5.5;

/// Domain difficulty units per standard unit
const DIFFICULTY_SCALE: f64 = 1.5;

/// Target difficulty of the first item of a session
pub const INITIAL_TARGET_DIFFICULTY: f64 = 5.0;

/// One answered assessment item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub item_id: String,
    pub concept_id: String,
    /// Domain scale, 1.0..10.0
    pub difficulty: f64,
    pub correct: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AbilityEstimator;

impl AbilityEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Maps domain difficulty (1..10) to the standard scale (-3..+3).
    pub fn normalize_difficulty(&self, difficulty: f64) -> f64 {
        (difficulty - DIFFICULTY_CENTER) / DIFFICULTY_SCALE
    }

    /// Maps a standard-scale value back to domain difficulty, clipped to 1..10.
    pub fn denormalize_difficulty(&self, theta: f64) -> f64 {
        (theta * DIFFICULTY_SCALE + DIFFICULTY_CENTER).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
    }

    pub fn probability(&self, theta: f64, difficulty: f64) -> f64 {
        sigmoid(theta - self.normalize_difficulty(difficulty))
    }

    pub fn log_likelihood(&self, theta: f64, history: &[ItemResponse]) -> f64 {
        history
            .iter()
            .map(|item| {
                let p = clip_probability(self.probability(theta, item.difficulty));
                if item.correct {
                    p.ln()
                } else {
                    (1.0 - p).ln()
                }
            })
            .sum()
    }

    /// Maximum-likelihood θ on the fixed grid. Empty history returns 0.0;
    /// the first maximum wins on ties.
    pub fn estimate_ability(&self, history: &[ItemResponse]) -> f64 {
        if history.is_empty() {
            return 0.0;
        }

        let mut best_theta = THETA_MIN;
        let mut best_ll = f64::NEG_INFINITY;
        for theta in theta_grid() {
            let ll = self.log_likelihood(theta, history);
            if ll > best_ll {
                best_ll = ll;
                best_theta = theta;
            }
        }
        best_theta
    }

    /// Item difficulty carrying the most information at θ.
    pub fn next_target_difficulty(&self, theta: f64) -> f64 {
        self.denormalize_difficulty(theta)
    }

    pub fn calculate_mastery(&self, theta: f64) -> f64 {
        sigmoid(theta)
    }
}

/// 61 points from -3.0 to 3.0. Computed from the index so values are exact
/// multiples of 0.1 rather than accumulated float sums.
pub fn theta_grid() -> impl Iterator<Item = f64> {
    let step = (THETA_MAX - THETA_MIN) / (THETA_GRID_POINTS - 1) as f64;
    (0..THETA_GRID_POINTS).map(move |i| {
        let raw = THETA_MIN + step * i as f64;
        (raw * 10.0).round() / 10.0
    })
}

/// When an adaptive session ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StopRule {
    /// Stop after a fixed number of items
    #[serde(rename_all = "camelCase")]
    FixedBudget { max_items: usize },
    /// Stop when successive θ estimates move less than `threshold` (after
    /// `min_items`), or at `max_items`
    #[serde(rename_all = "camelCase")]
    Convergence {
        threshold: f64,
        min_items: usize,
        max_items: usize,
    },
}

impl Default for StopRule {
    fn default() -> Self {
        Self::Convergence {
            threshold: 0.05,
            min_items: 5,
            max_items: 15,
        }
    }
}

impl StopRule {
    pub fn max_items(&self) -> usize {
        match *self {
            Self::FixedBudget { max_items } | Self::Convergence { max_items, .. } => max_items,
        }
    }

    pub fn should_stop(&self, session: &AssessmentSession) -> bool {
        let answered = session.history.len();
        if answered >= self.max_items() {
            return true;
        }
        match *self {
            Self::FixedBudget { .. } => false,
            Self::Convergence {
                threshold,
                min_items,
                ..
            } => {
                if answered < min_items.max(2) {
                    return false;
                }
                match session.theta_trace.as_slice() {
                    [.., previous, last] => (last - previous).abs() < threshold,
                    _ => false,
                }
            }
        }
    }
}

/// Outcome of recording one answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AssessmentProgress {
    #[serde(rename_all = "camelCase")]
    Continue { theta: f64, next_target_difficulty: f64 },
    #[serde(rename_all = "camelCase")]
    Finished { theta: f64, final_mastery: f64 },
}

/// State of one adaptive test. Lives only until a final mastery is derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSession {
    pub theta: f64,
    pub history: Vec<ItemResponse>,
    /// θ after each answer
    pub theta_trace: Vec<f64>,
    pub stopped: bool,
}

impl AssessmentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_target_difficulty(&self, estimator: &AbilityEstimator) -> f64 {
        if self.history.is_empty() {
            INITIAL_TARGET_DIFFICULTY
        } else {
            estimator.next_target_difficulty(self.theta)
        }
    }

    pub fn answered_item_ids(&self) -> Vec<String> {
        self.history.iter().map(|r| r.item_id.clone()).collect()
    }

    /// Adds an answer, re-estimates θ and applies the stop rule.
    pub fn record(
        &mut self,
        response: ItemResponse,
        estimator: &AbilityEstimator,
        rule: &StopRule,
    ) -> AssessmentProgress {
        self.history.push(response);
        self.theta = estimator.estimate_ability(&self.history);
        self.theta_trace.push(self.theta);

        if rule.should_stop(self) {
            self.finish(estimator)
        } else {
            AssessmentProgress::Continue {
                theta: self.theta,
                next_target_difficulty: estimator.next_target_difficulty(self.theta),
            }
        }
    }

    /// Ends the session, e.g. when the item bank is exhausted.
    pub fn finish(&mut self, estimator: &AbilityEstimator) -> AssessmentProgress {
        self.stopped = true;
        AssessmentProgress::Finished {
            theta: self.theta,
            final_mastery: estimator.calculate_mastery(self.theta),
        }
    }
}

/// Placement grading: per concept, difficulty-weighted share of correct answers,
/// rounded to two decimals. Concepts without answered items are omitted.
pub fn placement_mastery(answers: &[ItemResponse]) -> MasteryMap {
    let mut stats: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for answer in answers {
        let weight = answer.difficulty.max(0.0);
        let entry = stats.entry(answer.concept_id.as_str()).or_insert((0.0, 0.0));
        entry.1 += weight;
        if answer.correct {
            entry.0 += weight;
        }
    }

    stats
        .into_iter()
        .filter(|(_, (_, total))| *total > 0.0)
        .map(|(id, (earned, total))| (id.to_string(), round2(earned / total)))
        .collect()
}
