use pathway_algo::{AssemblyError, ConceptIndexError, PathfindError, PolicyError, TracerError};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("no path from '{start}' to '{goal}'")]
    NoPathFound { start: String, goal: String },

    #[error("contract mismatch: {0}")]
    ContractMismatch(String),

    #[error("{collaborator} unavailable: {reason}")]
    UpstreamUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn upstream(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            collaborator,
            reason: reason.into(),
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

impl From<PathfindError> for EngineError {
    fn from(err: PathfindError) -> Self {
        match err {
            PathfindError::NotFound(id) => Self::NotFound(format!("concept '{}'", id)),
            PathfindError::NoPathFound { start, goal } => Self::NoPathFound { start, goal },
        }
    }
}

impl From<TracerError> for EngineError {
    fn from(err: TracerError) -> Self {
        Self::ContractMismatch(err.to_string())
    }
}

impl From<PolicyError> for EngineError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::ContractMismatch(ref msg) => Self::ContractMismatch(msg.clone()),
            PolicyError::NoCandidates => Self::Internal(err.to_string()),
        }
    }
}

impl From<AssemblyError> for EngineError {
    fn from(err: AssemblyError) -> Self {
        Self::ContractMismatch(err.to_string())
    }
}

impl From<ConceptIndexError> for EngineError {
    fn from(err: ConceptIndexError) -> Self {
        Self::ContractMismatch(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("compute task failed: {}", err))
    }
}
