use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    Pathfinder,
    KnowledgeTracer,
    AbilityEstimator,
    Policy,
    PathAssembler,
}

impl ComponentId {
    pub fn all() -> &'static [ComponentId] {
        &[
            ComponentId::Pathfinder,
            ComponentId::KnowledgeTracer,
            ComponentId::AbilityEstimator,
            ComponentId::Policy,
            ComponentId::PathAssembler,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            ComponentId::Pathfinder => "pathfinder",
            ComponentId::KnowledgeTracer => "knowledge_tracer",
            ComponentId::AbilityEstimator => "ability_estimator",
            ComponentId::Policy => "policy",
            ComponentId::PathAssembler => "path_assembler",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComponentId::Pathfinder => "Graph Pathfinder",
            ComponentId::KnowledgeTracer => "Deep Knowledge Tracing",
            ComponentId::AbilityEstimator => "IRT Ability Estimator",
            ComponentId::Policy => "DQN Route Policy",
            ComponentId::PathAssembler => "Path Assembler",
        }
    }
}

#[derive(Debug, Default)]
pub struct ComponentMetrics {
    call_count: AtomicU64,
    total_latency_us: AtomicU64,
    error_count: AtomicU64,
    last_called_at: AtomicU64,
}

impl ComponentMetrics {
    pub fn record_call(&self, latency_us: u64) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.last_called_at.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let calls = self.call_count();
        if calls == 0 {
            return 0.0;
        }
        let total_us = self.total_latency_us.load(Ordering::Relaxed);
        let avg = (total_us as f64 / calls as f64) / 1000.0;
        (avg * 10000.0).round() / 10000.0
    }

    pub fn last_called_at(&self) -> Option<u64> {
        match self.last_called_at.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }
}

/// Per-component call counters, owned by the engine.
pub struct ComponentRegistry {
    metrics: HashMap<ComponentId, ComponentMetrics>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        let metrics = ComponentId::all()
            .iter()
            .map(|id| (*id, ComponentMetrics::default()))
            .collect();
        Self { metrics }
    }

    pub fn record(&self, id: ComponentId, latency_us: u64) {
        if let Some(m) = self.metrics.get(&id) {
            m.record_call(latency_us);
        }
    }

    pub fn record_error(&self, id: ComponentId) {
        if let Some(m) = self.metrics.get(&id) {
            m.record_error();
        }
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentMetrics> {
        self.metrics.get(&id)
    }

    pub fn snapshot(&self) -> Vec<ComponentStatus> {
        ComponentId::all()
            .iter()
            .filter_map(|id| {
                let m = self.metrics.get(id)?;
                Some(ComponentStatus {
                    id: id.id().to_string(),
                    name: id.name().to_string(),
                    call_count: m.call_count(),
                    avg_latency_ms: m.avg_latency_ms(),
                    error_count: m.error_count(),
                    last_called_at: m.last_called_at(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub id: String,
    pub name: String,
    pub call_count: u64,
    pub avg_latency_ms: f64,
    pub error_count: u64,
    pub last_called_at: Option<u64>,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Times `$body` and records it against `$id` in `$registry`. Errors are
/// counted when the body evaluates to `Err`.
#[macro_export]
macro_rules! track_component {
    ($registry:expr, $id:expr, $body:expr) => {{
        let start = std::time::Instant::now();
        let result = $body;
        let latency_us = start.elapsed().as_micros() as u64;
        $registry.record($id, latency_us);
        if result.is_err() {
            $registry.record_error($id);
        }
        result
    }};
}
