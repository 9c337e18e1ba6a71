//! Common Types and Constants
//!
//! Shared data structures used across all algorithm modules: the concept graph
//! records, mastery maps, interaction events, route candidates and learning steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sanitize::clamp_unit;

// ==================== Constants ====================

/// Lowest nominal concept difficulty
pub const MIN_DIFFICULTY: f64 = 1.0;

/// Highest nominal concept difficulty
pub const MAX_DIFFICULTY: f64 = 10.0;

/// Mastery above which a concept counts as mastered (review-only / completed)
pub const MASTERED_THRESHOLD: f64 = 0.8;

/// Mastery below which a previously attempted concept needs remediation
pub const REMEDIAL_THRESHOLD: f64 = 0.6;

/// Number of most recent interactions fed to the knowledge tracer
pub const DEFAULT_HISTORY_WINDOW: usize = 50;

/// Nominal duration (minutes) when the graph store omits one
pub const DEFAULT_DURATION_MINUTES: f64 = 30.0;

// ==================== Graph Types ====================

/// Kind of study resource attached to a concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Video,
    Article,
    Text,
    Audio,
    Quiz,
    Exercise,
    #[default]
    Other,
}

impl ResourceKind {
    /// Lenient parse: resource types in the graph store are free-form strings
    /// such as "Video Lecture" or "interactive quiz".
    pub fn parse(s: &str) -> Self {
        let lower = s.to_lowercase();
        if lower.contains("video") {
            Self::Video
        } else if lower.contains("article") {
            Self::Article
        } else if lower.contains("text") || lower.contains("reading") {
            Self::Text
        } else if lower.contains("audio") || lower.contains("podcast") {
            Self::Audio
        } else if lower.contains("quiz") {
            Self::Quiz
        } else if lower.contains("exercise") {
            Self::Exercise
        } else {
            Self::Other
        }
    }
}

/// Study resource attached to a concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_resource_kind")]
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn lenient_resource_kind<'de, D>(deserializer: D) -> Result<ResourceKind, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(ResourceKind::parse(&raw))
}

/// A node of the prerequisite graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nominal difficulty in [1.0, 10.0]
    pub difficulty: f64,
    /// Nominal duration in minutes
    pub duration_minutes: f64,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Concept {
    pub fn new(id: impl Into<String>, difficulty: f64, duration_minutes: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            difficulty: difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
            duration_minutes: duration_minutes.max(0.0),
            resources: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Relationship type between two concepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Directed: `from` must be learned before `to`
    Prerequisite,
    /// Undirected supplementary signal
    RelatedTo,
}

/// Weighted graph edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    #[serde(default = "default_edge_weight")]
    pub weight: f64,
}

fn default_edge_weight() -> f64 {
    1.0
}

impl ConceptEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            weight: default_edge_weight(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

// ==================== Knowledge Types ====================

/// Concept id -> mastery probability, every value kept in [0, 1]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasteryMap(BTreeMap<String, f64>);

impl MasteryMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Mastery of a concept; unknown concepts count as 0.0.
    pub fn get(&self, concept_id: &str) -> f64 {
        self.0.get(concept_id).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, concept_id: &str) -> bool {
        self.0.contains_key(concept_id)
    }

    /// Inserts a value clipped to [0, 1]; NaN is stored as 0.0.
    pub fn insert(&mut self, concept_id: impl Into<String>, mastery: f64) {
        self.0.insert(concept_id.into(), clamp_unit(mastery));
    }

    /// Overlays `fresh` on top of `self`: ids present in `fresh` win.
    pub fn merge(&mut self, fresh: &MasteryMap) {
        for (id, value) in fresh.iter() {
            self.0.insert(id.clone(), value);
        }
    }

    pub fn merged(mut self, fresh: &MasteryMap) -> Self {
        self.merge(fresh);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, f64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mean mastery over known concepts, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.0.is_empty() {
            return None;
        }
        Some(self.0.values().sum::<f64>() / self.0.len() as f64)
    }
}

impl FromIterator<(String, f64)> for MasteryMap {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        let mut map = MasteryMap::new();
        for (id, value) in iter {
            map.insert(id, value);
        }
        map
    }
}

/// One answered interaction, ordered by occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub concept_id: String,
    pub correct: bool,
}

impl InteractionEvent {
    pub fn new(concept_id: impl Into<String>, correct: bool) -> Self {
        Self {
            concept_id: concept_id.into(),
            correct,
        }
    }
}

/// Whether a learned model runs on trained or freshly initialized weights.
///
/// Untrained is a degraded but valid mode, reported next to results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    #[default]
    Untrained,
    Trained,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untrained => "untrained",
            Self::Trained => "trained",
        }
    }
}

// ==================== Path Types ====================

/// One candidate route from a start concept to a goal concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathCandidate {
    pub concepts: Vec<Concept>,
    /// Sum of nominal difficulties
    pub total_difficulty: f64,
    /// Sum of nominal durations (minutes)
    pub total_duration: f64,
    /// Accumulated effort cost used for ranking
    pub cost: f64,
}

impl PathCandidate {
    pub fn from_concepts(concepts: Vec<Concept>, cost: f64) -> Self {
        let total_difficulty = concepts.iter().map(|c| c.difficulty.max(0.0)).sum();
        let total_duration = concepts.iter().map(|c| c.duration_minutes.max(0.0)).sum();
        Self {
            concepts,
            total_difficulty,
            total_duration,
            cost: cost.max(0.0),
        }
    }

    pub fn concept_ids(&self) -> Vec<String> {
        self.concepts.iter().map(|c| c.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn first_concept(&self) -> Option<&Concept> {
        self.concepts.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Completed,
}

/// Concrete unit of a learner's plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStep {
    pub step_number: u32,
    pub concept_id: String,
    /// Ranked best-first against the learner's preferences
    pub resources: Vec<Resource>,
    /// Minutes
    pub estimated_time: f64,
    pub difficulty: f64,
    pub status: StepStatus,
    pub is_remedial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mastery_map_defaults_missing_to_zero() {
        let map = MasteryMap::new();
        assert_eq!(map.get("unknown"), 0.0);
    }

    #[test]
    fn mastery_map_clips_on_insert() {
        let mut map = MasteryMap::new();
        map.insert("a", 1.7);
        map.insert("b", -0.2);
        map.insert("c", f64::NAN);
        assert_eq!(map.get("a"), 1.0);
        assert_eq!(map.get("b"), 0.0);
        assert_eq!(map.get("c"), 0.0);
    }

    #[test]
    fn mastery_map_merge_prefers_fresh_values() {
        let mut history: MasteryMap =
            [("a".to_string(), 0.2), ("b".to_string(), 0.4)].into_iter().collect();
        let assessed: MasteryMap = [("b".to_string(), 0.9)].into_iter().collect();
        history.merge(&assessed);
        assert_eq!(history.get("a"), 0.2);
        assert_eq!(history.get("b"), 0.9);
    }

    #[test]
    fn resource_kind_parse_is_lenient() {
        assert_eq!(ResourceKind::parse("Video Lecture"), ResourceKind::Video);
        assert_eq!(ResourceKind::parse("interactive QUIZ"), ResourceKind::Quiz);
        assert_eq!(ResourceKind::parse("podcast"), ResourceKind::Audio);
        assert_eq!(ResourceKind::parse("slides"), ResourceKind::Other);

        let resource: Resource =
            serde_json::from_str(r#"{"id": "r1", "kind": "Video Lecture"}"#).unwrap();
        assert_eq!(resource.kind, ResourceKind::Video);
    }

    #[test]
    fn candidate_aggregates_are_non_negative() {
        let candidate = PathCandidate::from_concepts(
            vec![Concept::new("a", 2.0, 30.0), Concept::new("b", 4.0, 45.0)],
            -3.0,
        );
        assert_eq!(candidate.total_difficulty, 6.0);
        assert_eq!(candidate.total_duration, 75.0);
        assert_eq!(candidate.cost, 0.0);
    }
}
