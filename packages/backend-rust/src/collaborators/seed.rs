use std::path::Path;

use serde::{Deserialize, Serialize};

use pathway_algo::{Concept, ConceptEdge, EdgeKind, GraphSnapshot, MAX_DIFFICULTY, MIN_DIFFICULTY};

use super::memory::{MemoryGraphStore, MemoryItemBank};
use super::AssessmentItem;
use crate::error::EngineError;

const BUILTIN_SEED: &str = include_str!("../../data/seed_graph.json");

/// Concepts, edges and placement items loaded into the in-memory stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedData {
    pub concepts: Vec<Concept>,
    pub edges: Vec<ConceptEdge>,
    pub items: Vec<AssessmentItem>,
}

impl SeedData {
    pub fn builtin() -> Result<Self, EngineError> {
        Self::from_json(BUILTIN_SEED)
    }

    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        serde_json::from_str(raw).map_err(|err| EngineError::ContractMismatch(format!("seed graph: {}", err)))
    }

    pub async fn from_file(path: &Path) -> Result<Self, EngineError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| EngineError::NotFound(format!("seed graph {}: {}", path.display(), err)))?;
        Self::from_json(&raw)
    }

    pub fn into_stores(self) -> (MemoryGraphStore, MemoryItemBank) {
        let mut graph = GraphSnapshot::new();
        for mut concept in self.concepts {
            concept.difficulty = concept.difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
            concept.duration_minutes = concept.duration_minutes.max(0.0);
            graph.insert_concept(concept);
        }

        let mut rejected = 0usize;
        let mut related = 0usize;
        for edge in self.edges {
            if edge.kind == EdgeKind::RelatedTo {
                related += 1;
                continue;
            }
            let (from, to) = (edge.from.clone(), edge.to.clone());
            if !graph.insert_edge(edge) {
                rejected += 1;
                tracing::warn!(from = %from, to = %to, "seed edge would close a prerequisite cycle, skipped");
            }
        }

        tracing::info!(
            concepts = graph.len(),
            rejected_edges = rejected,
            related_edges = related,
            items = self.items.len(),
            "seed graph loaded"
        );
        (MemoryGraphStore::new(graph), MemoryItemBank::new(self.items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{GraphStore, ItemBank};

    #[tokio::test]
    async fn builtin_seed_is_a_connected_dag() {
        let seed = SeedData::builtin().unwrap();
        assert!(!seed.concepts.is_empty());
        assert!(!seed.items.is_empty());

        let (graph, items) = seed.into_stores();
        let ids = graph.concept_ids().await.unwrap();
        assert!(ids.contains(&"python_basics".to_string()));
        assert_eq!(
            graph.find_root_ancestor("oop").await.unwrap().as_deref(),
            Some("python_basics")
        );
        assert!(items.get_item("q-basics-1").await.unwrap().is_some());
    }

    #[test]
    fn malformed_seed_is_rejected() {
        assert!(matches!(
            SeedData::from_json("{\"concepts\": 3}"),
            Err(EngineError::ContractMismatch(_))
        ));
    }
}
