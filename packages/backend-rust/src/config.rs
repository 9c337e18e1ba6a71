use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::EngineConfig;
use crate::logging::DEFAULT_FILTER;

/// Everything the service reads at start-up. Built once in `main` and handed
/// down; nothing below this reads the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub logging: LoggingConfig,
    pub routes: RouteConfig,
    pub workers: WorkerConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives
    pub filter: String,
    /// Daily rolling `pathway.log` in this directory when set
    pub file_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    pub enable_assessments: bool,
    pub enable_feedback: bool,
    /// Extra mount point for the health routes, always `/`-prefixed
    pub healthcheck_endpoint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Cron expression; `None` disables the flush worker
    pub checkpoint_flush: Option<String>,
    pub session_cleanup: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8000,
            logging: LoggingConfig::default(),
            routes: RouteConfig::default(),
            workers: WorkerConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            file_dir: None,
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            enable_assessments: true,
            enable_feedback: true,
            healthcheck_endpoint: "/health".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            checkpoint_flush: Some("0 * * * * *".to_string()),
            session_cleanup: Some("0 */10 * * * *".to_string()),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let file_logs = lookup_bool(&lookup, "ENABLE_FILE_LOGS").unwrap_or(false);
        let logging = LoggingConfig {
            filter: lookup("RUST_LOG")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.logging.filter),
            file_dir: file_logs.then(|| {
                lookup("LOG_DIR")
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./logs"))
            }),
        };

        let routes = RouteConfig {
            enable_assessments: lookup_bool(&lookup, "PATHWAY_ENABLE_ASSESSMENTS")
                .unwrap_or(defaults.routes.enable_assessments),
            enable_feedback: lookup_bool(&lookup, "PATHWAY_ENABLE_FEEDBACK")
                .unwrap_or(defaults.routes.enable_feedback),
            healthcheck_endpoint: normalize_healthcheck_endpoint(
                lookup("HEALTHCHECK_ENDPOINT").as_deref().unwrap_or("/health"),
            ),
        };

        let workers = WorkerConfig {
            checkpoint_flush: worker_schedule(
                &lookup,
                "ENABLE_CHECKPOINT_FLUSH_WORKER",
                "CHECKPOINT_FLUSH_SCHEDULE",
                defaults.workers.checkpoint_flush,
            ),
            session_cleanup: worker_schedule(
                &lookup,
                "ENABLE_SESSION_CLEANUP_WORKER",
                "SESSION_CLEANUP_SCHEDULE",
                defaults.workers.session_cleanup,
            ),
        };

        Self {
            host: lookup_parse(&lookup, "HOST").unwrap_or(defaults.host),
            port: lookup_parse(&lookup, "PORT").unwrap_or(defaults.port),
            logging,
            routes,
            workers,
            engine: EngineConfig::from_lookup(&lookup),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

pub(crate) fn lookup_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key)?.trim().parse().ok()
}

fn lookup_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let value = lookup(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn worker_schedule(
    lookup: &impl Fn(&str) -> Option<String>,
    enable_key: &str,
    schedule_key: &str,
    default: Option<String>,
) -> Option<String> {
    if lookup_bool(lookup, enable_key) == Some(false) {
        return None;
    }
    lookup(schedule_key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or(default)
}

fn normalize_healthcheck_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "/health".to_string();
    }

    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };

    if with_slash != "/" {
        with_slash.trim_end_matches('/').to_string()
    } else {
        "/".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        Config::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = from_pairs(&[]);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8000");
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.routes, RouteConfig::default());
        assert_eq!(config.workers, WorkerConfig::default());
        assert_eq!(config.engine.upstream_timeout_ms, 2_000);
    }

    #[test]
    fn bad_port_keeps_default() {
        let config = from_pairs(&[("PORT", "eighty"), ("HOST", "127.0.0.1")]);
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:8000");
    }

    #[test]
    fn file_logging_needs_explicit_opt_in() {
        let config = from_pairs(&[("LOG_DIR", "/var/log/pathway")]);
        assert!(config.logging.file_dir.is_none());

        let config = from_pairs(&[("ENABLE_FILE_LOGS", "yes"), ("LOG_DIR", "/var/log/pathway")]);
        assert_eq!(config.logging.file_dir, Some(PathBuf::from("/var/log/pathway")));

        let config = from_pairs(&[("ENABLE_FILE_LOGS", "1")]);
        assert_eq!(config.logging.file_dir, Some(PathBuf::from("./logs")));
    }

    #[test]
    fn blank_rust_log_falls_back_to_service_filter() {
        let config = from_pairs(&[("RUST_LOG", "  ")]);
        assert_eq!(config.logging.filter, DEFAULT_FILTER);

        let config = from_pairs(&[("RUST_LOG", "debug")]);
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn route_flags_accept_common_spellings() {
        let config = from_pairs(&[
            ("PATHWAY_ENABLE_ASSESSMENTS", "off"),
            ("PATHWAY_ENABLE_FEEDBACK", "maybe"),
            ("HEALTHCHECK_ENDPOINT", "status/"),
        ]);
        assert!(!config.routes.enable_assessments);
        assert!(config.routes.enable_feedback);
        assert_eq!(config.routes.healthcheck_endpoint, "/status");
    }

    #[test]
    fn workers_can_be_disabled_or_rescheduled() {
        let config = from_pairs(&[
            ("ENABLE_CHECKPOINT_FLUSH_WORKER", "false"),
            ("CHECKPOINT_FLUSH_SCHEDULE", "*/5 * * * * *"),
            ("SESSION_CLEANUP_SCHEDULE", "0 0 * * * *"),
        ]);
        assert_eq!(config.workers.checkpoint_flush, None);
        assert_eq!(config.workers.session_cleanup.as_deref(), Some("0 0 * * * *"));
    }

    #[test]
    fn engine_settings_come_from_the_same_source() {
        let config = from_pairs(&[("PATHWAY_UPSTREAM_TIMEOUT_MS", "250")]);
        assert_eq!(config.engine.upstream_timeout_ms, 250);
    }

    #[test]
    fn healthcheck_endpoint_is_normalized() {
        assert_eq!(normalize_healthcheck_endpoint(""), "/health");
        assert_eq!(normalize_healthcheck_endpoint("status/"), "/status");
        assert_eq!(normalize_healthcheck_endpoint("/"), "/");
    }
}
