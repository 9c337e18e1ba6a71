mod checkpoint_flush;
mod session_cleanup;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::engine::PersonalizationEngine;
use crate::error::EngineError;

pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    engine: Arc<PersonalizationEngine>,
    config: WorkerConfig,
    running: AtomicBool,
}

impl WorkerManager {
    pub async fn new(engine: Arc<PersonalizationEngine>, config: WorkerConfig) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await.map_err(WorkerError::Scheduler)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            engine,
            config,
            running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        let scheduler = self.scheduler.lock().await;

        if let Some(schedule) = &self.config.checkpoint_flush {
            let engine = Arc::clone(&self.engine);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
                let engine = Arc::clone(&engine);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = checkpoint_flush::flush_policy(engine) => {
                            if let Err(e) = result {
                                error!(error = %e, "Checkpoint flush worker error");
                            }
                        }
                    }
                })
            })
            .map_err(WorkerError::Scheduler)?;
            scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
            info!(schedule = %schedule, "Checkpoint flush worker scheduled");
        }

        if let Some(schedule) = &self.config.session_cleanup {
            let engine = Arc::clone(&self.engine);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
                let engine = Arc::clone(&engine);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = session_cleanup::cleanup_stale_sessions(engine) => {
                            if let Err(e) = result {
                                error!(error = %e, "Session cleanup worker error");
                            }
                        }
                    }
                })
            })
            .map_err(WorkerError::Scheduler)?;
            scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
            info!(schedule = %schedule, "Session cleanup worker scheduled");
        }

        scheduler.start().await.map_err(WorkerError::Scheduler)?;
        self.running.store(true, Ordering::Relaxed);
        info!("All workers started");

        Ok(())
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }

        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::seed::SeedData;
    use crate::collaborators::Collaborators;
    use crate::engine::EngineConfig;

    #[tokio::test]
    async fn workers_start_and_stop() {
        let mut config = EngineConfig::default();
        config.checkpoint_dir = None;
        config.compute_workers = 1;
        let engine = PersonalizationEngine::new(config, Collaborators::in_memory(SeedData::builtin().unwrap()))
            .await
            .unwrap();
        let manager = WorkerManager::new(Arc::new(engine), WorkerConfig::default()).await.unwrap();

        manager.start().await.unwrap();
        manager.stop().await;
        manager.stop().await;
    }

    #[tokio::test]
    async fn malformed_schedule_is_rejected() {
        let mut config = EngineConfig::default();
        config.checkpoint_dir = None;
        config.compute_workers = 1;
        let engine = PersonalizationEngine::new(config, Collaborators::in_memory(SeedData::builtin().unwrap()))
            .await
            .unwrap();
        let workers = WorkerConfig {
            checkpoint_flush: Some("every minute please".to_string()),
            session_cleanup: None,
        };
        let manager = WorkerManager::new(Arc::new(engine), workers).await.unwrap();

        assert!(matches!(manager.start().await, Err(WorkerError::Scheduler(_))));
    }
}
