use std::sync::Arc;

use serde::{Deserialize, Serialize};

use pathway_algo::{BehavioralProfile, PolicyError, RewardComponents, Transition};

use crate::engine::{ComponentId, PersonalizationEngine};
use crate::error::EngineError;
use crate::track_component;

/// Delayed outcome of having recommended `action_concept_id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFeedback {
    pub action_concept_id: String,
    pub mastery_delta: f64,
    /// Positive means behavior got worse; derived from `previous_behavior`
    /// when absent
    pub behavior_delta: Option<f64>,
    /// Behavioral snapshot at recommendation time
    pub previous_behavior: Option<BehavioralProfile>,
    /// 0..1; the concept's own difficulty when absent
    pub difficulty: Option<f64>,
    /// 0..1; mean stored mastery when absent
    pub ability: Option<f64>,
    /// State vector at recommendation time
    pub previous_state: Option<Vec<f64>>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub reward: f64,
    pub action: usize,
    pub replay_size: usize,
    /// Mean squared TD error of the training step, if one ran
    pub loss: Option<f64>,
    pub train_steps: u64,
}

impl PersonalizationEngine {
    /// Turns feedback into a shaped reward, stores the transition and runs
    /// one training step when the replay buffer is large enough.
    pub async fn record_feedback(&self, student_id: &str, feedback: PolicyFeedback) -> Result<FeedbackOutcome, EngineError> {
        let action = self.index.index_of(&feedback.action_concept_id).ok_or_else(|| {
            EngineError::NotFound(format!("concept '{}' in the action index", feedback.action_concept_id))
        })?;
        let concept = self.require_concept(&feedback.action_concept_id).await?;

        let profile = self.profile_or_default(student_id).await;
        let mastery = self.stored_mastery(student_id).await?;
        let current = self.state_vector(&mastery, &profile);

        let behavior_delta = match (feedback.behavior_delta, feedback.previous_behavior) {
            (Some(delta), _) => delta,
            (None, Some(before)) => profile.behavioral.regression_score() - before.regression_score(),
            (None, None) => 0.0,
        };
        let components = RewardComponents {
            mastery_delta: finite_or_zero(feedback.mastery_delta),
            behavior_delta: finite_or_zero(behavior_delta),
            difficulty: Some(
                feedback
                    .difficulty
                    .unwrap_or(concept.difficulty / 10.0)
                    .clamp(0.0, 1.0),
            ),
            ability: Some(
                feedback
                    .ability
                    .or_else(|| mastery.mean())
                    .unwrap_or(0.5)
                    .clamp(0.0, 1.0),
            ),
        };

        let state = match feedback.previous_state {
            Some(state) => state,
            None if self.config.policy.approximate_missing_state => current.clone(),
            None => {
                return Err(EngineError::ContractMismatch(
                    "feedback without the previous state vector".into(),
                ))
            }
        };

        let policy = Arc::clone(&self.policy);
        let rng = Arc::clone(&self.rng);
        let done = feedback.done;
        let outcome = track_component!(
            self.metrics,
            ComponentId::Policy,
            self.pool
                .run(move || -> Result<FeedbackOutcome, PolicyError> {
                    let mut agent = policy.write();
                    let reward = agent.reward(&components);
                    agent.store_transition(Transition {
                        state,
                        action,
                        reward,
                        next_state: current,
                        done,
                    })?;
                    let loss = agent.train_step(&mut *rng.lock());
                    Ok(FeedbackOutcome {
                        reward,
                        action,
                        replay_size: agent.replay_len(),
                        loss,
                        train_steps: agent.train_steps(),
                    })
                })
                .await
                .and_then(|result| result.map_err(EngineError::from))
        )?;
        self.mark_policy_dirty();

        tracing::debug!(
            student_id = %student_id,
            action = %feedback.action_concept_id,
            reward = outcome.reward,
            replay = outcome.replay_size,
            trained = outcome.loss.is_some(),
            "policy feedback recorded"
        );
        Ok(outcome)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
