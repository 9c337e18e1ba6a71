//! Prerequisite graph view used by the pathfinder.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{Concept, ConceptEdge, EdgeKind};

/// Read-only, synchronous view over a prerequisite graph.
///
/// `children` follows PREREQUISITE edges forward (prerequisite -> dependent).
pub trait ConceptGraph {
    fn concept(&self, id: &str) -> Option<&Concept>;

    fn children(&self, id: &str) -> Vec<&Concept>;

    /// Furthest ancestor of `goal` with no incoming PREREQUISITE edge.
    fn root_ancestor(&self, goal: &str) -> Option<String>;
}

/// Owned in-memory prerequisite graph.
///
/// Used both as the bounded neighbourhood fetched from a remote graph store for one
/// request and as the backing data of the in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    concepts: HashMap<String, Concept>,
    /// prerequisite -> dependents, sorted by id
    forward: HashMap<String, BTreeSet<String>>,
    /// dependent -> prerequisites, sorted by id
    reverse: HashMap<String, BTreeSet<String>>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(concepts: Vec<Concept>, edges: Vec<ConceptEdge>) -> Self {
        let mut graph = Self::new();
        for concept in concepts {
            graph.insert_concept(concept);
        }
        for edge in edges {
            graph.insert_edge(edge);
        }
        graph
    }

    pub fn insert_concept(&mut self, concept: Concept) {
        self.concepts.insert(concept.id.clone(), concept);
    }

    /// Adds a PREREQUISITE edge. Edges that would close a cycle are ignored so
    /// the graph stays a DAG; RELATED_TO edges carry no ordering and are not
    /// kept. Returns whether the edge was added.
    pub fn insert_edge(&mut self, edge: ConceptEdge) -> bool {
        match edge.kind {
            EdgeKind::Prerequisite => {
                if edge.from == edge.to || self.reaches(&edge.to, &edge.from) {
                    return false;
                }
                self.forward
                    .entry(edge.from.clone())
                    .or_default()
                    .insert(edge.to.clone());
                self.reverse.entry(edge.to).or_default().insert(edge.from);
                true
            }
            EdgeKind::RelatedTo => false,
        }
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn concept_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.concepts.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Direct prerequisites of a concept, sorted by id.
    pub fn prerequisites(&self, id: &str) -> Vec<&Concept> {
        self.reverse
            .get(id)
            .map(|ids| ids.iter().filter_map(|p| self.concepts.get(p)).collect())
            .unwrap_or_default()
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut queue = VecDeque::from([from.to_string()]);
        let mut seen = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(next) = self.forward.get(&current) {
                queue.extend(next.iter().cloned());
            }
        }
        false
    }
}

impl ConceptGraph for GraphSnapshot {
    fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.get(id)
    }

    fn children(&self, id: &str) -> Vec<&Concept> {
        self.forward
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.concepts.get(c)).collect())
            .unwrap_or_default()
    }

    fn root_ancestor(&self, goal: &str) -> Option<String> {
        if !self.concepts.contains_key(goal) {
            return None;
        }

        // Backward BFS; the root at the greatest hop distance wins, ties by id.
        let mut depth: HashMap<String, usize> = HashMap::from([(goal.to_string(), 0)]);
        let mut queue = VecDeque::from([goal.to_string()]);
        let mut best: Option<(usize, String)> = None;

        while let Some(current) = queue.pop_front() {
            let d = depth[&current];
            match self.reverse.get(&current).filter(|p| !p.is_empty()) {
                Some(parents) => {
                    for parent in parents {
                        if !depth.contains_key(parent) {
                            depth.insert(parent.clone(), d + 1);
                            queue.push_back(parent.clone());
                        }
                    }
                }
                None => {
                    let better = match &best {
                        None => true,
                        Some((bd, bid)) => d > *bd || (d == *bd && current < *bid),
                    };
                    if better {
                        best = Some((d, current.clone()));
                    }
                }
            }
        }

        best.map(|(_, id)| id)
    }
}
