//! JSON checkpoint files. Writes go to a temp file first and are renamed into
//! place, so a crash never leaves a half-written checkpoint behind.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::EngineError;

pub const DKT_FILE: &str = "dkt.json";
pub const POLICY_FILE: &str = "policy.json";
pub const CONCEPT_INDEX_FILE: &str = "concept_index.json";

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// `Ok(None)` when the file does not exist.
    pub async fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>, EngineError> {
        let path = self.path(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(EngineError::Internal(format!(
                    "read {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| EngineError::ContractMismatch(format!("parse {}: {}", path.display(), err)))
    }

    pub async fn save<T: Serialize>(&self, file: &str, value: &T) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|err| EngineError::Internal(format!("serialize {}: {}", file, err)))?;
        self.write_atomic(file, &bytes).await
    }

    async fn write_atomic(&self, file: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let io_err = |what: &str, err: std::io::Error| EngineError::Internal(format!("{} {}: {}", what, file, err));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err("create dir for", e))?;
        let target = self.path(file);
        let tmp = self.path(&format!("{}.tmp-{}", file, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_err("write", e))?;
        if let Err(err) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err("rename", err));
        }
        Ok(())
    }
}
