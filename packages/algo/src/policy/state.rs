//! Fused policy input.
//!
//! Layout: [mastery (one slot per index position) | behavioral (5) | cognitive (2) | preferences (4)]

use serde::{Deserialize, Serialize};

use crate::concept_index::ConceptIndex;
use crate::profile::{BehavioralProfile, CognitiveProfile, LearningPreferences, StudentProfile};
use crate::sanitize::{clamp_unit, sanitize_feature_vector};
use crate::types::MasteryMap;

/// Slots following the mastery block
pub const PROFILE_SLOTS: usize = BehavioralProfile::LEN + CognitiveProfile::LEN + LearningPreferences::LEN;

/// Input width of a policy over `knowledge_dim` concept slots
pub const fn state_dim(knowledge_dim: usize) -> usize {
    knowledge_dim + PROFILE_SLOTS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateVector {
    mastery: Vec<f64>,
    behavioral: [f64; BehavioralProfile::LEN],
    cognitive: [f64; CognitiveProfile::LEN],
    preferences: [f64; LearningPreferences::LEN],
}

impl StateVector {
    /// Mastery is zero-filled for unknown concepts and for ids outside the index.
    pub fn build(mastery: &MasteryMap, index: &ConceptIndex, profile: &StudentProfile) -> Self {
        let mut slots = vec![0.0; index.capacity()];
        for (id, value) in mastery.iter() {
            if let Some(i) = index.index_of(id) {
                slots[i] = clamp_unit(value);
            }
        }
        Self {
            mastery: slots,
            behavioral: profile.behavioral.clamped().to_array(),
            cognitive: profile.cognitive.to_array(),
            preferences: profile.preferences.to_array(),
        }
    }

    pub fn len(&self) -> usize {
        state_dim(self.mastery.len())
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn knowledge_dim(&self) -> usize {
        self.mastery.len()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.mastery);
        out.extend_from_slice(&self.behavioral);
        out.extend_from_slice(&self.cognitive);
        out.extend_from_slice(&self.preferences);
        sanitize_feature_vector(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_fixed() {
        let index = ConceptIndex::new(vec!["a".into(), "b".into()], 4).unwrap();
        let mut mastery = MasteryMap::new();
        mastery.insert("b", 0.7);
        mastery.insert("unknown", 0.9);
        let state = StateVector::build(&mastery, &index, &StudentProfile::default());

        let v = state.to_vec();
        assert_eq!(v.len(), state_dim(4));
        assert_eq!(&v[..4], &[0.0, 0.7, 0.0, 0.0]);
        assert_eq!(&v[4..9], &[0.0; 5]);
        assert_eq!(&v[9..11], &[0.5, 0.5]);
        assert_eq!(&v[11..], &[0.25; 4]);
    }

    #[test]
    fn state_dim_adds_profile_slots() {
        assert_eq!(state_dim(123), 134);
    }
}
