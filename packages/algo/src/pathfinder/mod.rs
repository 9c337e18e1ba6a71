//! Graph Pathfinder
//!
//! Turns the prerequisite DAG into cost-ranked routes from a start concept to a
//! goal concept.
//!
//! Core idea:
//! - Best-first search with a zero heuristic (Dijkstra-shaped A*)
//! - Step cost blends nominal duration with a knowledge-gap penalty
//! - A bounded simple-path enumeration yields real alternatives for the policy
//!
//! Step cost:
//! - mastery > 0.8: cost = duration * 0.2 (review only)
//! - otherwise: gap = max(0, difficulty - (mastery * 5 + 1)),
//!   cost = duration * (1 + 1.5 * gap)
//!
//! A route's cost is the sum of step costs of every concept on it, the start
//! concept included.

mod graph;

pub use graph::{ConceptGraph, GraphSnapshot};

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::LearningPreferences;
use crate::types::{Concept, MasteryMap, PathCandidate, MASTERED_THRESHOLD};

/// Default hop bound for candidate enumeration
pub const DEFAULT_MAX_HOPS: usize = 15;

/// Default number of candidates returned to the policy
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Default cap on DFS node expansions during candidate enumeration
pub const DEFAULT_MAX_EXPANSIONS: usize = 20_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PathfindError {
    #[error("concept not found: {0}")]
    NotFound(String),

    #[error("no path from {start} to {goal}")]
    NoPathFound { start: String, goal: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathfinderConfig {
    pub max_hops: usize,
    pub max_candidates: usize,
    pub max_expansions: usize,
    /// Fraction of duration charged for already mastered concepts
    pub review_factor: f64,
    /// Multiplier applied per unit of difficulty gap
    pub gap_penalty: f64,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_expansions: DEFAULT_MAX_EXPANSIONS,
            review_factor: 0.2,
            gap_penalty: 1.5,
        }
    }
}

/// One route request
#[derive(Debug, Clone, Default)]
pub struct PathQuery<'a> {
    pub goal: &'a str,
    pub start: Option<&'a str>,
    pub mastery: Option<&'a MasteryMap>,
    /// When set, each concept's resources are ranked best-first
    pub preferences: Option<&'a LearningPreferences>,
    /// Return a goal-only route instead of `NoPathFound`
    pub single_concept_fallback: bool,
}

impl<'a> PathQuery<'a> {
    pub fn new(goal: &'a str) -> Self {
        Self {
            goal,
            ..Default::default()
        }
    }

    pub fn start(mut self, start: Option<&'a str>) -> Self {
        self.start = start;
        self
    }

    pub fn mastery(mut self, mastery: &'a MasteryMap) -> Self {
        self.mastery = Some(mastery);
        self
    }

    pub fn preferences(mut self, preferences: &'a LearningPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.single_concept_fallback = enabled;
        self
    }

    fn mastery_of(&self, id: &str) -> f64 {
        self.mastery.map(|m| m.get(id)).unwrap_or(0.0)
    }
}

/// Effort cost of studying one concept at the given mastery.
pub fn step_cost(concept: &Concept, mastery: f64, config: &PathfinderConfig) -> f64 {
    let duration = concept.duration_minutes.max(0.0);
    if mastery > MASTERED_THRESHOLD {
        return duration * config.review_factor;
    }
    let gap = (concept.difficulty - (mastery * 5.0 + 1.0)).max(0.0);
    duration * (1.0 + config.gap_penalty * gap)
}

#[derive(Debug, Clone, PartialEq)]
struct QueueEntry {
    cost: f64,
    id: String,
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    // Reversed so BinaryHeap pops the lowest cost, then the smallest id.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct GraphPathfinder {
    config: PathfinderConfig,
}

impl Default for GraphPathfinder {
    fn default() -> Self {
        Self::new(PathfinderConfig::default())
    }
}

impl GraphPathfinder {
    pub fn new(config: PathfinderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    /// Start concept for a query: explicit start, else the goal's root ancestor,
    /// else the goal itself.
    pub fn resolve_start<G: ConceptGraph + ?Sized>(&self, graph: &G, query: &PathQuery<'_>) -> String {
        match query.start {
            Some(start) => start.to_string(),
            None => graph
                .root_ancestor(query.goal)
                .unwrap_or_else(|| query.goal.to_string()),
        }
    }

    /// Lowest-cost route from start to goal.
    pub fn find_optimal_path<G: ConceptGraph + ?Sized>(
        &self,
        graph: &G,
        query: &PathQuery<'_>,
    ) -> Result<PathCandidate, PathfindError> {
        let (start, goal) = self.endpoints(graph, query)?;

        let mut best: HashMap<String, f64> = HashMap::new();
        let mut came_from: HashMap<String, String> = HashMap::new();
        let mut open = BinaryHeap::new();

        let start_cost = step_cost(start, query.mastery_of(&start.id), &self.config);
        best.insert(start.id.clone(), start_cost);
        open.push(QueueEntry {
            cost: start_cost,
            id: start.id.clone(),
        });

        while let Some(QueueEntry { cost, id }) = open.pop() {
            if id == goal.id {
                let route = reconstruct(&came_from, &id, graph)?;
                return Ok(self.candidate(route, cost, query));
            }
            if best.get(&id).is_some_and(|b| cost > *b) {
                continue;
            }

            for child in graph.children(&id) {
                let tentative = cost + step_cost(child, query.mastery_of(&child.id), &self.config);
                let improved = best
                    .get(&child.id)
                    .map_or(true, |current| tentative < *current);
                if improved {
                    best.insert(child.id.clone(), tentative);
                    came_from.insert(child.id.clone(), id.clone());
                    open.push(QueueEntry {
                        cost: tentative,
                        id: child.id.clone(),
                    });
                }
            }
        }

        self.unreachable(start, goal, query)
    }

    /// Up to `limit` distinct simple routes within the hop bound, ordered by
    /// length, then cost, then concept ids.
    pub fn find_candidates<G: ConceptGraph + ?Sized>(
        &self,
        graph: &G,
        query: &PathQuery<'_>,
        limit: usize,
    ) -> Result<Vec<PathCandidate>, PathfindError> {
        let (start, goal) = self.endpoints(graph, query)?;
        let limit = limit.max(1);

        let mut routes: Vec<Vec<&Concept>> = Vec::new();
        let mut stack = vec![start];
        let mut on_path: HashSet<&str> = HashSet::from([start.id.as_str()]);
        let mut expansions = 0usize;
        self.enumerate(
            graph,
            &goal.id,
            &mut stack,
            &mut on_path,
            &mut routes,
            &mut expansions,
        );

        if routes.is_empty() {
            return self.unreachable(start, goal, query).map(|c| vec![c]);
        }

        let mut costed: Vec<(Vec<Concept>, f64)> = routes
            .into_par_iter()
            .map(|route| {
                let cost = route
                    .iter()
                    .map(|c| step_cost(c, query.mastery_of(&c.id), &self.config))
                    .sum::<f64>();
                (route.into_iter().cloned().collect(), cost)
            })
            .collect();

        costed.sort_by(|(a, ca), (b, cb)| {
            a.len()
                .cmp(&b.len())
                .then_with(|| ca.total_cmp(cb))
                .then_with(|| {
                    a.iter()
                        .map(|c| c.id.as_str())
                        .cmp(b.iter().map(|c| c.id.as_str()))
                })
        });

        Ok(costed
            .into_iter()
            .take(limit)
            .map(|(route, cost)| self.candidate(route, cost, query))
            .collect())
    }

    fn enumerate<'g, G: ConceptGraph + ?Sized>(
        &self,
        graph: &'g G,
        goal: &str,
        stack: &mut Vec<&'g Concept>,
        on_path: &mut HashSet<&'g str>,
        routes: &mut Vec<Vec<&'g Concept>>,
        expansions: &mut usize,
    ) {
        let Some(current) = stack.last().copied() else {
            return;
        };
        if current.id == goal {
            routes.push(stack.clone());
            return;
        }
        // stack.len() - 1 edges walked so far
        if stack.len() > self.config.max_hops || *expansions >= self.config.max_expansions {
            return;
        }
        *expansions += 1;

        for child in graph.children(&current.id) {
            if on_path.contains(child.id.as_str()) {
                continue;
            }
            stack.push(child);
            on_path.insert(child.id.as_str());
            self.enumerate(graph, goal, stack, on_path, routes, expansions);
            on_path.remove(child.id.as_str());
            stack.pop();
        }
    }

    fn endpoints<'g, G: ConceptGraph + ?Sized>(
        &self,
        graph: &'g G,
        query: &PathQuery<'_>,
    ) -> Result<(&'g Concept, &'g Concept), PathfindError> {
        let goal = graph
            .concept(query.goal)
            .ok_or_else(|| PathfindError::NotFound(query.goal.to_string()))?;
        let start_id = self.resolve_start(graph, query);
        let start = graph
            .concept(&start_id)
            .ok_or(PathfindError::NotFound(start_id))?;
        Ok((start, goal))
    }

    fn unreachable(
        &self,
        start: &Concept,
        goal: &Concept,
        query: &PathQuery<'_>,
    ) -> Result<PathCandidate, PathfindError> {
        if query.single_concept_fallback {
            let cost = step_cost(goal, query.mastery_of(&goal.id), &self.config);
            return Ok(self.candidate(vec![goal.clone()], cost, query));
        }
        Err(PathfindError::NoPathFound {
            start: start.id.clone(),
            goal: goal.id.clone(),
        })
    }

    fn candidate(&self, mut route: Vec<Concept>, cost: f64, query: &PathQuery<'_>) -> PathCandidate {
        if let Some(prefs) = query.preferences {
            for concept in &mut route {
                concept.resources = prefs.rank_resources(&concept.resources);
            }
        }
        PathCandidate::from_concepts(route, cost)
    }
}

fn reconstruct<G: ConceptGraph + ?Sized>(
    came_from: &HashMap<String, String>,
    goal: &str,
    graph: &G,
) -> Result<Vec<Concept>, PathfindError> {
    let mut ids = vec![goal.to_string()];
    let mut current = goal;
    while let Some(parent) = came_from.get(current) {
        ids.push(parent.clone());
        current = parent;
    }
    ids.reverse();
    ids.into_iter()
        .map(|id| graph.concept(&id).cloned().ok_or(PathfindError::NotFound(id)))
        .collect()
}
