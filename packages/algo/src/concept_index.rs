//! Concept Index
//!
//! Static bidirectional mapping between concept ids and the dense indices used by
//! the knowledge tracer's token encoding and the policy's action space. Built once
//! at load time; lookups in both directions are O(1).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConceptIndexError {
    #[error("concept index holds {len} concepts but capacity is {capacity}")]
    CapacityExceeded { len: usize, capacity: usize },

    #[error("duplicate concept id in index: {0}")]
    Duplicate(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ConceptIndexFile", into = "ConceptIndexFile")]
pub struct ConceptIndex {
    ids: Vec<String>,
    positions: HashMap<String, usize>,
    capacity: usize,
}

/// On-disk form: the ordered id list plus the configured capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConceptIndexFile {
    capacity: usize,
    concept_ids: Vec<String>,
}

impl From<ConceptIndexFile> for ConceptIndex {
    fn from(file: ConceptIndexFile) -> Self {
        let mut index = ConceptIndex::empty(file.capacity);
        for id in file.concept_ids {
            if !index.positions.contains_key(&id) {
                index.positions.insert(id.clone(), index.ids.len());
                index.ids.push(id);
            }
        }
        index
    }
}

impl From<ConceptIndex> for ConceptIndexFile {
    fn from(index: ConceptIndex) -> Self {
        Self {
            capacity: index.capacity,
            concept_ids: index.ids,
        }
    }
}

impl ConceptIndex {
    pub fn empty(capacity: usize) -> Self {
        Self {
            ids: Vec::new(),
            positions: HashMap::new(),
            capacity,
        }
    }

    /// Builds the index from ids in the given order. Fails on duplicates or
    /// when the id count exceeds `capacity`.
    pub fn new(ids: Vec<String>, capacity: usize) -> Result<Self, ConceptIndexError> {
        if ids.len() > capacity {
            return Err(ConceptIndexError::CapacityExceeded {
                len: ids.len(),
                capacity,
            });
        }
        let mut positions = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), i).is_some() {
                return Err(ConceptIndexError::Duplicate(id.clone()));
            }
        }
        Ok(Self {
            ids,
            positions,
            capacity,
        })
    }

    /// Builds the index from ids sorted lexicographically, deduplicated.
    pub fn from_unsorted(mut ids: Vec<String>, capacity: usize) -> Result<Self, ConceptIndexError> {
        ids.sort();
        ids.dedup();
        Self::new(ids, capacity)
    }

    pub fn index_of(&self, concept_id: &str) -> Option<usize> {
        self.positions.get(concept_id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    pub fn contains(&self, concept_id: &str) -> bool {
        self.positions.contains_key(concept_id)
    }

    /// Number of mapped concepts
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Fixed slot count of the model layouts built on this index
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}
