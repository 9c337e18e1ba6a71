use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::engine::PersonalizationEngine;

pub async fn cleanup_stale_sessions(engine: Arc<PersonalizationEngine>) -> Result<(), super::WorkerError> {
    let start = Instant::now();
    let ttl = engine.config().session_ttl();
    let removed = engine.cleanup_sessions(ttl);

    if removed > 0 {
        info!(
            removed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Stale assessment sessions removed"
        );
    } else {
        debug!("No stale assessment sessions");
    }
    Ok(())
}
