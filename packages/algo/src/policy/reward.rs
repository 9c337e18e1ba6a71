//! Reward shaping for delayed policy feedback.
//!
//! reward = w1 * mastery_delta - w2 * behavior_regression - w3 * max(0, difficulty - ability)^2

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewardWeights {
    pub mastery: f64,
    pub behavior: f64,
    pub load: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            mastery: 1.0,
            behavior: 0.5,
            load: 0.2,
        }
    }
}

/// Caller-supplied reward inputs. `difficulty` and `ability` share the 0..1
/// scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RewardComponents {
    pub mastery_delta: f64,
    /// Positive values mean the learner's behavior got worse
    pub behavior_delta: f64,
    pub difficulty: Option<f64>,
    pub ability: Option<f64>,
}

/// Difficulty assumed when neither the caller nor the graph provides one
pub const DEFAULT_REWARD_DIFFICULTY: f64 = 0.5;

/// Ability assumed when the learner has no stored mastery
pub const DEFAULT_REWARD_ABILITY: f64 = 0.5;

pub fn compute_reward(components: &RewardComponents, weights: &RewardWeights) -> f64 {
    let difficulty = components.difficulty.unwrap_or(DEFAULT_REWARD_DIFFICULTY);
    let ability = components.ability.unwrap_or(DEFAULT_REWARD_ABILITY);
    let load = (difficulty - ability).max(0.0);
    let reward = weights.mastery * components.mastery_delta - weights.behavior * components.behavior_delta
        - weights.load * load * load;
    if reward.is_finite() {
        reward
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let components = RewardComponents {
            mastery_delta: 0.2,
            behavior_delta: -0.1,
            difficulty: Some(0.9),
            ability: Some(0.4),
        };
        // 0.2 + 0.05 - 0.2 * 0.25
        let reward = compute_reward(&components, &RewardWeights::default());
        assert!((reward - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_no_load_penalty_below_ability() {
        let components = RewardComponents {
            mastery_delta: 0.1,
            behavior_delta: 0.0,
            difficulty: Some(0.3),
            ability: Some(0.6),
        };
        assert!((compute_reward(&components, &RewardWeights::default()) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_missing_inputs_use_defaults() {
        let reward = compute_reward(&RewardComponents::default(), &RewardWeights::default());
        assert_eq!(reward, 0.0);
    }
}
