use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::lookup_parse;
use pathway_algo::{AssemblerConfig, PathfinderConfig, PolicyConfig, StopRule, TracerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentConfig {
    pub stop_rule: StopRule,
    /// Sessions untouched for longer than this are discarded
    pub session_ttl_secs: u64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            stop_rule: StopRule::default(),
            session_ttl_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub pathfinder: PathfinderConfig,
    pub tracer: TracerConfig,
    pub policy: PolicyConfig,
    pub assessment: AssessmentConfig,
    pub assembler: AssemblerConfig,
    /// Concurrent blocking inference/training tasks
    pub compute_workers: usize,
    pub upstream_timeout_ms: u64,
    /// Where `dkt.json`, `policy.json` and `concept_index.json` live. `None`
    /// keeps everything in memory.
    pub checkpoint_dir: Option<PathBuf>,
    pub seed_graph_path: Option<PathBuf>,
    /// Seed of the exploration generator shared by policy selection and replay
    /// sampling
    pub exploration_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pathfinder: PathfinderConfig::default(),
            tracer: TracerConfig::default(),
            policy: PolicyConfig::default(),
            assessment: AssessmentConfig::default(),
            assembler: AssemblerConfig::default(),
            compute_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            upstream_timeout_ms: 2_000,
            checkpoint_dir: Some(PathBuf::from("./checkpoints")),
            seed_graph_path: None,
            exploration_seed: 7,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `PATHWAY_*` variables read through `lookup`.
    /// Unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(n) = lookup_parse::<usize>(&lookup, "PATHWAY_NUM_CONCEPTS") {
            config.tracer.num_concepts = n;
            config.policy.knowledge_dim = n;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_DKT_HIDDEN_DIM") {
            config.tracer.hidden_dim = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_HISTORY_WINDOW") {
            config.tracer.history_window = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_POLICY_HIDDEN_DIM") {
            config.policy.hidden_dim = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_EPSILON") {
            config.policy.epsilon = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_GAMMA") {
            config.policy.gamma = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_LEARNING_RATE") {
            config.policy.learning_rate = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_BATCH_SIZE") {
            config.policy.batch_size = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_REPLAY_CAPACITY") {
            config.policy.replay_capacity = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_TARGET_SYNC_INTERVAL") {
            config.policy.target_sync_interval = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_APPROXIMATE_MISSING_STATE") {
            config.policy.approximate_missing_state = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_MAX_HOPS") {
            config.pathfinder.max_hops = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_MAX_CANDIDATES") {
            config.pathfinder.max_candidates = v;
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_MAX_ITEMS") {
            config.assessment.stop_rule = match config.assessment.stop_rule {
                StopRule::FixedBudget { .. } => StopRule::FixedBudget { max_items: v },
                StopRule::Convergence {
                    threshold,
                    min_items,
                    ..
                } => StopRule::Convergence {
                    threshold,
                    min_items,
                    max_items: v,
                },
            };
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_SESSION_TTL_SECS") {
            config.assessment.session_ttl_secs = v;
        }
        if let Some(v) = lookup_parse::<usize>(&lookup, "PATHWAY_COMPUTE_WORKERS") {
            config.compute_workers = v.max(1);
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_UPSTREAM_TIMEOUT_MS") {
            config.upstream_timeout_ms = v;
        }
        if let Some(dir) = lookup("PATHWAY_CHECKPOINT_DIR") {
            let dir = dir.trim();
            config.checkpoint_dir = match dir {
                "" | "none" | "off" => None,
                path => Some(PathBuf::from(path)),
            };
        }
        if let Some(path) = lookup("PATHWAY_SEED_GRAPH") {
            if !path.trim().is_empty() {
                config.seed_graph_path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Some(v) = lookup_parse(&lookup, "PATHWAY_EXPLORATION_SEED") {
            config.exploration_seed = v;
        }

        config
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.assessment.session_ttl_secs)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.tracer.history_window, 50);
        assert_eq!(config.policy.epsilon, 0.1);
        assert_eq!(config.policy.gamma, 0.99);
        assert_eq!(config.policy.batch_size, 64);
        assert_eq!(config.policy.replay_capacity, 10_000);
        assert_eq!(config.pathfinder.max_hops, 15);
        assert_eq!(config.assessment.stop_rule.max_items(), 15);
        assert_eq!(config.tracer.num_concepts, config.policy.knowledge_dim);
    }

    #[test]
    fn serializes_as_camel_case() {
        let json = serde_json::to_value(EngineConfig::default()).unwrap();
        assert!(json.get("upstreamTimeoutMs").is_some());
        assert!(json.get("computeWorkers").is_some());
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let vars = [
            ("PATHWAY_NUM_CONCEPTS", "12"),
            ("PATHWAY_EPSILON", "not-a-number"),
            ("PATHWAY_COMPUTE_WORKERS", "0"),
            ("PATHWAY_CHECKPOINT_DIR", "off"),
            ("PATHWAY_SEED_GRAPH", " graph.json "),
        ];
        let config = EngineConfig::from_lookup(|key| {
            vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
        });

        assert_eq!(config.tracer.num_concepts, 12);
        assert_eq!(config.policy.knowledge_dim, 12);
        assert_eq!(config.policy.epsilon, 0.1);
        assert_eq!(config.compute_workers, 1);
        assert!(config.checkpoint_dir.is_none());
        assert_eq!(config.seed_graph_path, Some(PathBuf::from("graph.json")));
    }
}
