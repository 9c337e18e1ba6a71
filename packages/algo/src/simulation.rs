//! Simulated Learner
//!
//! Stochastic learner used to exercise path assembly and policy training end to
//! end without real students.
//!
//! Model:
//! - Knowledge per concept in [0, 1], starting at the archetype's base level
//! - Learning gain shaped by the zone of proximal development:
//!   gap = difficulty / 10 - knowledge
//!   - gap > 0.4: too hard, gain = rate * 0.2
//!   - gap < -0.2: too easy, gain = rate * 0.5
//!   - otherwise: gain = rate * 1.5
//!   - remedial steps multiply the gain by 4
//!   - fatigue scales gain by (1 - min(0.95, fatigue))
//! - Quiz success probability: 1 / (1 + e^(-8 * (knowledge - difficulty / 10)))
//! - Dropout after `resilience` consecutive failed quizzes

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::{LearningStep, MasteryMap, StepStatus, MAX_DIFFICULTY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearnerArchetype {
    Strong,
    Average,
    Struggling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ArchetypeParams {
    learning_rate: f64,
    fatigue_accrual: f64,
    base_knowledge: f64,
    resilience: u32,
}

impl LearnerArchetype {
    fn params(self) -> ArchetypeParams {
        match self {
            Self::Strong => ArchetypeParams {
                learning_rate: 0.20,
                fatigue_accrual: 0.05,
                base_knowledge: 0.40,
                resilience: 15,
            },
            Self::Average => ArchetypeParams {
                learning_rate: 0.12,
                fatigue_accrual: 0.07,
                base_knowledge: 0.25,
                resilience: 8,
            },
            Self::Struggling => ArchetypeParams {
                learning_rate: 0.08,
                fatigue_accrual: 0.08,
                base_knowledge: 0.20,
                resilience: 12,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub score: f64,
    pub passed: bool,
}

/// Aggregate result of walking one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeOutcome {
    pub completed: bool,
    pub attempts: u32,
    pub failures: u32,
    pub average_score: f64,
    pub final_fatigue: f64,
}

pub struct SimulatedLearner {
    archetype: LearnerArchetype,
    params: ArchetypeParams,
    knowledge: HashMap<String, f64>,
    fatigue: f64,
    consecutive_failures: u32,
    dropped_out: bool,
    rng: ChaCha8Rng,
}

impl SimulatedLearner {
    pub fn new(archetype: LearnerArchetype, seed: u64) -> Self {
        Self {
            archetype,
            params: archetype.params(),
            knowledge: HashMap::new(),
            fatigue: 0.0,
            consecutive_failures: 0,
            dropped_out: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn archetype(&self) -> LearnerArchetype {
        self.archetype
    }

    pub fn knowledge(&self, concept_id: &str) -> f64 {
        self.knowledge
            .get(concept_id)
            .copied()
            .unwrap_or(self.params.base_knowledge)
    }

    pub fn mastery_map(&self) -> MasteryMap {
        self.knowledge.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn fatigue(&self) -> f64 {
        self.fatigue
    }

    pub fn dropped_out(&self) -> bool {
        self.dropped_out
    }

    /// Studies a concept and returns the knowledge gained.
    pub fn learn(&mut self, concept_id: &str, difficulty: f64, is_remedial: bool) -> f64 {
        if self.dropped_out {
            return 0.0;
        }
        let current = self.knowledge(concept_id);
        let gap = difficulty / MAX_DIFFICULTY - current;
        let rate = self.params.learning_rate;

        let mut gain = if gap > 0.4 {
            rate * 0.2
        } else if gap < -0.2 {
            rate * 0.5
        } else {
            rate * 1.5
        };
        if is_remedial {
            gain *= 4.0;
        }
        gain *= 1.0 - self.fatigue.min(0.95);

        self.knowledge
            .insert(concept_id.to_string(), (current + gain).min(1.0));
        self.fatigue = (self.fatigue + self.params.fatigue_accrual).min(1.0);
        gain
    }

    pub fn attempt_quiz(&mut self, concept_id: &str, difficulty: f64) -> QuizAttempt {
        if self.dropped_out {
            return QuizAttempt {
                score: 0.0,
                passed: false,
            };
        }
        let advantage = self.knowledge(concept_id) - difficulty / MAX_DIFFICULTY;
        let p_success = 1.0 / (1.0 + (-8.0 * advantage).exp());
        let passed = self.rng.gen::<f64>() < p_success;

        let score = if passed {
            self.consecutive_failures = 0;
            self.fatigue = (self.fatigue - 0.4).max(0.0);
            self.rng.gen_range(0.70..=1.0)
        } else {
            self.consecutive_failures += 1;
            self.fatigue = (self.fatigue + 0.05).min(1.0);
            self.rng.gen_range(0.30..0.69)
        };

        if self.consecutive_failures >= self.params.resilience {
            self.dropped_out = true;
        }
        QuizAttempt { score, passed }
    }

    /// Walks the pending steps of a plan in order, retrying a failed step up to
    /// `max_retries` extra times before giving up on the episode.
    pub fn run_steps(&mut self, steps: &[LearningStep], max_retries: u32) -> EpisodeOutcome {
        let mut attempts = 0u32;
        let mut failures = 0u32;
        let mut score_sum = 0.0;
        let mut completed = true;

        'steps: for step in steps.iter().filter(|s| s.status == StepStatus::Pending) {
            for _ in 0..=max_retries {
                if self.dropped_out {
                    completed = false;
                    break 'steps;
                }
                self.learn(&step.concept_id, step.difficulty, step.is_remedial);
                let quiz = self.attempt_quiz(&step.concept_id, step.difficulty);
                attempts += 1;
                score_sum += quiz.score;
                if quiz.passed {
                    continue 'steps;
                }
                failures += 1;
            }
            completed = false;
            break;
        }

        EpisodeOutcome {
            completed: completed && !self.dropped_out,
            attempts,
            failures,
            average_score: if attempts == 0 { 0.0 } else { score_sum / attempts as f64 },
            final_fatigue: self.fatigue,
        }
    }
}
