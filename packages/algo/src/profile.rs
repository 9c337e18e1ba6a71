//! Learner Profile
//!
//! Behavioral, cognitive and preference signals that feed the policy state vector
//! and the path assembler's time/resource adjustments. Every field has a documented
//! default so a missing upstream signal never changes the vector layout.

use serde::{Deserialize, Serialize};

use crate::sanitize::clamp_unit;
use crate::types::{Resource, ResourceKind};

/// Upper bound of the procrastination index (ln(1 + hours) of roughly a week)
pub const MAX_PROCRASTINATION: f64 = 5.0;

/// Video completions shorter than this count as gaming
pub const MIN_VIDEO_SECONDS: f64 = 30.0;

/// Quiz submissions shorter than this count as gaming
pub const MIN_QUIZ_SECONDS: f64 = 10.0;

/// Event count at which engagement saturates
pub const ENGAGEMENT_SATURATION: f64 = 50.0;

// ==================== Behavioral ====================

/// Five behavioral scalars, in state-vector order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BehavioralProfile {
    pub procrastination_index: f64,
    pub gaming_score: f64,
    pub engagement_score: f64,
    pub hint_rate: f64,
    pub error_rate: f64,
}

/// Kind of raw activity event used to derive the behavioral profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    PathGenerated,
    StepUnlocked,
    TaskAssigned,
    VideoPlay,
    VideoComplete,
    QuizAttempt,
    QuizSubmit,
    ExerciseStep,
    HintRequest,
    Other,
}

impl ActivityKind {
    fn is_assignment(self) -> bool {
        matches!(self, Self::PathGenerated | Self::StepUnlocked | Self::TaskAssigned)
    }

    fn is_start(self) -> bool {
        matches!(self, Self::VideoPlay | Self::QuizAttempt)
    }
}

/// Raw activity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Seconds actually spent on the activity
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub correct: Option<bool>,
}

impl BehavioralProfile {
    pub const LEN: usize = 5;

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            self.procrastination_index,
            self.gaming_score,
            self.engagement_score,
            self.hint_rate,
            self.error_rate,
        ]
    }

    /// Sum of the regression-prone signals; a rise between two snapshots is a
    /// behavioral regression.
    pub fn regression_score(&self) -> f64 {
        self.procrastination_index / MAX_PROCRASTINATION
            + self.gaming_score
            + self.hint_rate
            + self.error_rate
            - self.engagement_score
    }

    /// Derives the profile from raw activity events.
    pub fn from_activity(events: &[ActivityEvent]) -> Self {
        let mut sorted: Vec<&ActivityEvent> = events.iter().collect();
        sorted.sort_by_key(|e| e.timestamp_ms);

        Self {
            procrastination_index: procrastination_index(&sorted),
            gaming_score: gaming_score(events),
            engagement_score: (events.len() as f64 / ENGAGEMENT_SATURATION).min(1.0),
            hint_rate: hint_rate(events),
            error_rate: error_rate(events),
        }
        .clamped()
    }

    pub fn clamped(self) -> Self {
        let procrastination_index = if self.procrastination_index.is_finite() {
            self.procrastination_index.clamp(0.0, MAX_PROCRASTINATION)
        } else {
            0.0
        };
        Self {
            procrastination_index,
            gaming_score: clamp_unit(self.gaming_score),
            engagement_score: clamp_unit(self.engagement_score),
            hint_rate: clamp_unit(self.hint_rate),
            error_rate: clamp_unit(self.error_rate),
        }
    }
}

fn procrastination_index(sorted: &[&ActivityEvent]) -> f64 {
    let mut delays = Vec::new();
    let mut last_assignment: Option<i64> = None;

    for event in sorted {
        if event.kind.is_assignment() {
            last_assignment = Some(event.timestamp_ms);
        } else if event.kind.is_start() {
            if let Some(assigned) = last_assignment.take() {
                let hours = (event.timestamp_ms - assigned).max(0) as f64 / 3_600_000.0;
                delays.push((1.0 + hours).ln());
            }
        }
    }

    if delays.is_empty() {
        0.0
    } else {
        delays.iter().sum::<f64>() / delays.len() as f64
    }
}

fn gaming_score(events: &[ActivityEvent]) -> f64 {
    let mut total = 0usize;
    let mut gaming = 0usize;
    for event in events {
        let threshold = match event.kind {
            ActivityKind::VideoComplete => MIN_VIDEO_SECONDS,
            ActivityKind::QuizSubmit => MIN_QUIZ_SECONDS,
            _ => continue,
        };
        total += 1;
        if event.duration_seconds < threshold {
            gaming += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        gaming as f64 / total as f64
    }
}

fn hint_rate(events: &[ActivityEvent]) -> f64 {
    let attempts = events
        .iter()
        .filter(|e| matches!(e.kind, ActivityKind::QuizAttempt | ActivityKind::ExerciseStep))
        .count();
    let hints = events
        .iter()
        .filter(|e| e.kind == ActivityKind::HintRequest)
        .count();
    if attempts == 0 {
        0.0
    } else {
        (hints as f64 / attempts as f64).min(1.0)
    }
}

fn error_rate(events: &[ActivityEvent]) -> f64 {
    let submits: Vec<&ActivityEvent> = events
        .iter()
        .filter(|e| e.kind == ActivityKind::QuizSubmit)
        .collect();
    if submits.is_empty() {
        return 0.0;
    }
    let errors = submits.iter().filter(|e| e.correct != Some(true)).count();
    errors as f64 / submits.len() as f64
}

// ==================== Cognitive ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CognitiveProfile {
    pub memory: f64,
    pub attention: f64,
}

impl Default for CognitiveProfile {
    fn default() -> Self {
        Self {
            memory: 0.5,
            attention: 0.5,
        }
    }
}

impl CognitiveProfile {
    pub const LEN: usize = 2;

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [clamp_unit(self.memory), clamp_unit(self.attention)]
    }

    /// Duration multiplier: low attention stretches steps, high attention
    /// compresses them.
    pub fn attention_modifier(&self) -> f64 {
        if self.attention < 0.4 {
            1.2
        } else if self.attention > 0.8 {
            0.9
        } else {
            1.0
        }
    }
}

// ==================== Preferences ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningPreferences {
    pub visual: f64,
    pub auditory: f64,
    pub kinesthetic: f64,
    pub reading: f64,
}

impl Default for LearningPreferences {
    fn default() -> Self {
        Self {
            visual: 0.25,
            auditory: 0.25,
            kinesthetic: 0.25,
            reading: 0.25,
        }
    }
}

impl LearningPreferences {
    pub const LEN: usize = 4;

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            clamp_unit(self.visual),
            clamp_unit(self.auditory),
            clamp_unit(self.kinesthetic),
            clamp_unit(self.reading),
        ]
    }

    /// Preference weight for a resource kind.
    pub fn weight_for(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Video => self.visual,
            ResourceKind::Article | ResourceKind::Text => self.reading,
            ResourceKind::Audio => self.auditory,
            ResourceKind::Quiz | ResourceKind::Exercise => self.kinesthetic,
            ResourceKind::Other => 0.0,
        }
    }

    /// Resources sorted best-first by preference weight. The sort is stable, so
    /// equally weighted resources keep their graph-store order.
    pub fn rank_resources(&self, resources: &[Resource]) -> Vec<Resource> {
        let mut ranked = resources.to_vec();
        ranked.sort_by(|a, b| {
            self.weight_for(b.kind)
                .partial_cmp(&self.weight_for(a.kind))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}

// ==================== Aggregate ====================

/// Everything the profile provider knows about a learner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentProfile {
    pub behavioral: BehavioralProfile,
    pub cognitive: CognitiveProfile,
    pub preferences: LearningPreferences,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ActivityKind, minutes: i64, duration_seconds: f64) -> ActivityEvent {
        ActivityEvent {
            kind,
            timestamp_ms: minutes * 60_000,
            duration_seconds,
            correct: None,
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let profile = StudentProfile::default();
        assert_eq!(profile.behavioral.to_array(), [0.0; 5]);
        assert_eq!(profile.cognitive.to_array(), [0.5, 0.5]);
        assert_eq!(profile.preferences.to_array(), [0.25; 4]);
    }

    #[test]
    fn attention_modifier_thresholds() {
        let m = |attention| CognitiveProfile { memory: 0.5, attention }.attention_modifier();
        assert_eq!(m(0.3), 1.2);
        assert_eq!(m(0.4), 1.0);
        assert_eq!(m(0.8), 1.0);
        assert_eq!(m(0.95), 0.9);
    }

    #[test]
    fn procrastination_uses_first_start_after_assignment() {
        let events = vec![
            event(ActivityKind::PathGenerated, 0, 0.0),
            event(ActivityKind::VideoPlay, 60, 0.0),
            event(ActivityKind::VideoPlay, 600, 0.0),
        ];
        let profile = BehavioralProfile::from_activity(&events);
        assert!((profile.procrastination_index - 2f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn gaming_counts_short_completions() {
        let events = vec![
            event(ActivityKind::VideoComplete, 0, 12.0),
            event(ActivityKind::VideoComplete, 1, 300.0),
            event(ActivityKind::QuizSubmit, 2, 5.0),
            event(ActivityKind::QuizSubmit, 3, 60.0),
        ];
        let profile = BehavioralProfile::from_activity(&events);
        assert!((profile.gaming_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn hint_rate_is_capped() {
        let events = vec![
            event(ActivityKind::QuizAttempt, 0, 0.0),
            event(ActivityKind::HintRequest, 1, 0.0),
            event(ActivityKind::HintRequest, 2, 0.0),
        ];
        assert_eq!(BehavioralProfile::from_activity(&events).hint_rate, 1.0);
    }

    #[test]
    fn error_rate_treats_unknown_correctness_as_error() {
        let mut right = event(ActivityKind::QuizSubmit, 0, 30.0);
        right.correct = Some(true);
        let unknown = event(ActivityKind::QuizSubmit, 1, 30.0);
        let profile = BehavioralProfile::from_activity(&[right, unknown]);
        assert!((profile.error_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_activity_yields_zero_profile() {
        assert_eq!(BehavioralProfile::from_activity(&[]), BehavioralProfile::default());
    }

    #[test]
    fn rank_resources_prefers_matching_modality() {
        let prefs = LearningPreferences {
            visual: 0.1,
            auditory: 0.1,
            kinesthetic: 0.1,
            reading: 0.7,
        };
        let res = |id: &str, kind| Resource {
            id: id.into(),
            title: String::new(),
            kind,
            url: None,
        };
        let ranked = prefs.rank_resources(&[
            res("v", ResourceKind::Video),
            res("a", ResourceKind::Article),
            res("q", ResourceKind::Quiz),
        ]);
        assert_eq!(ranked[0].id, "a");
        assert_eq!(ranked[1].id, "v");
    }
}
