//! Path Assembler
//!
//! Linearizes a chosen route into concrete learning steps and adapts existing
//! plans after failed step quizzes.
//!
//! Rules per concept, in route order:
//! - mastery > 0.8: one `completed` step
//! - 0 < mastery < 0.6: a remedial step (difficulty x0.7, time x0.5) right
//!   before the standard step
//! - otherwise: one `pending` step
//!
//! Every emitted step's time is scaled by the learner's attention modifier,
//! every step gets its own sequential number starting at 1, and resources are
//! ranked against the learner's preferences.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::StudentProfile;
use crate::sanitize::round2;
use crate::types::{
    Concept, LearningStep, MasteryMap, PathCandidate, StepStatus, MASTERED_THRESHOLD, REMEDIAL_THRESHOLD,
};

/// Default quiz score needed to pass a step
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("cannot insert at step {at}: path has {len} steps")]
    InvalidPosition { at: u32, len: usize },

    #[error("step numbers are not unique")]
    DuplicateStepNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssemblerConfig {
    pub mastered_threshold: f64,
    pub remedial_threshold: f64,
    pub remedial_difficulty_factor: f64,
    pub remedial_time_factor: f64,
    pub quiz_pass_threshold: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            mastered_threshold: MASTERED_THRESHOLD,
            remedial_threshold: REMEDIAL_THRESHOLD,
            remedial_difficulty_factor: 0.7,
            remedial_time_factor: 0.5,
            quiz_pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

/// Output of `generate_steps`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledPath {
    pub steps: Vec<LearningStep>,
    /// Minutes over every step, completed ones included
    pub total_time: f64,
    /// Minutes over pending steps only
    pub remaining_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGrade {
    pub score: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PathAssembler {
    config: AssemblerConfig,
}

impl PathAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn generate_steps(
        &self,
        route: &PathCandidate,
        mastery: &MasteryMap,
        profile: &StudentProfile,
    ) -> AssembledPath {
        let time_modifier = profile.cognitive.attention_modifier();
        let mut steps = Vec::with_capacity(route.concepts.len() * 2);
        let mut next_number = 1u32;

        for concept in &route.concepts {
            let level = mastery.get(&concept.id);

            if level > self.config.mastered_threshold {
                let mut step = self.step(concept, next_number, profile, time_modifier);
                step.status = StepStatus::Completed;
                steps.push(step);
                next_number += 1;
                continue;
            }

            if level > 0.0 && level < self.config.remedial_threshold {
                steps.push(self.remedial_step(concept, next_number, profile, time_modifier));
                next_number += 1;
            }

            steps.push(self.step(concept, next_number, profile, time_modifier));
            next_number += 1;
        }

        let total_time = steps.iter().map(|s| s.estimated_time).sum();
        let remaining_time = steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| s.estimated_time)
            .sum();

        AssembledPath {
            steps,
            total_time,
            remaining_time,
        }
    }

    /// Review step for a prerequisite of a concept whose step quiz failed.
    /// Numbered `step_number`; splice it with [`insert_steps_at`].
    pub fn remediation_step(
        &self,
        prerequisite: &Concept,
        failed: &Concept,
        step_number: u32,
        profile: &StudentProfile,
    ) -> LearningStep {
        let mut step = self.step(
            prerequisite,
            step_number,
            profile,
            profile.cognitive.attention_modifier(),
        );
        step.is_remedial = true;
        step.description = Some(format!(
            "Quiz on '{}' was below the passing score. Review '{}' first.",
            failed.display_name(),
            prerequisite.display_name()
        ));
        step
    }

    /// score = correct / total rounded to two decimals; a quiz without
    /// questions scores 1.0.
    pub fn grade_step_quiz(&self, correct: usize, total: usize) -> QuizGrade {
        let score = if total == 0 {
            1.0
        } else {
            round2(correct.min(total) as f64 / total as f64)
        };
        self.grade_score(score)
    }

    pub fn grade_score(&self, score: f64) -> QuizGrade {
        let score = crate::sanitize::clamp_unit(score);
        QuizGrade {
            score,
            passed: score >= self.config.quiz_pass_threshold,
        }
    }

    fn step(&self, concept: &Concept, number: u32, profile: &StudentProfile, time_modifier: f64) -> LearningStep {
        LearningStep {
            step_number: number,
            concept_id: concept.id.clone(),
            resources: profile.preferences.rank_resources(&concept.resources),
            estimated_time: concept.duration_minutes.max(0.0) * time_modifier,
            difficulty: concept.difficulty,
            status: StepStatus::Pending,
            is_remedial: false,
            description: concept.description.clone(),
        }
    }

    fn remedial_step(
        &self,
        concept: &Concept,
        number: u32,
        profile: &StudentProfile,
        time_modifier: f64,
    ) -> LearningStep {
        let mut step = self.step(concept, number, profile, time_modifier);
        step.estimated_time *= self.config.remedial_time_factor;
        step.difficulty *= self.config.remedial_difficulty_factor;
        step.is_remedial = true;
        step.description = Some(format!(
            "Detected difficulty in '{}'. Let's review the basics.",
            concept.display_name()
        ));
        step
    }
}

/// Positional insert: `new_steps` take numbers `at..at + k`, existing steps
/// numbered `>= at` shift up by `k`. `at` may be one past the last step.
/// `steps` is left untouched on error.
pub fn insert_steps_at(
    steps: &mut Vec<LearningStep>,
    at: u32,
    mut new_steps: Vec<LearningStep>,
) -> Result<(), AssemblyError> {
    let mut numbers: Vec<u32> = steps.iter().map(|s| s.step_number).collect();
    numbers.sort_unstable();
    if numbers.windows(2).any(|w| w[0] == w[1]) {
        return Err(AssemblyError::DuplicateStepNumber);
    }
    let last = numbers.last().copied().unwrap_or(0);
    if at == 0 || at > last + 1 {
        return Err(AssemblyError::InvalidPosition { at, len: steps.len() });
    }
    if new_steps.is_empty() {
        return Ok(());
    }

    let shift = new_steps.len() as u32;
    for step in steps.iter_mut() {
        if step.step_number >= at {
            step.step_number += shift;
        }
    }
    for (offset, step) in new_steps.iter_mut().enumerate() {
        step.step_number = at + offset as u32;
    }

    steps.extend(new_steps);
    steps.sort_by_key(|s| s.step_number);
    Ok(())
}
