use std::sync::Arc;

use tracing::debug;

use crate::engine::PersonalizationEngine;

pub async fn flush_policy(engine: Arc<PersonalizationEngine>) -> Result<(), super::WorkerError> {
    if engine.flush_policy_checkpoint().await? {
        debug!("Policy checkpoint flushed by worker");
    }
    Ok(())
}
