use std::sync::Arc;

use pathway_backend_rust::collaborators::seed::SeedData;
use pathway_backend_rust::collaborators::Collaborators;
use pathway_backend_rust::config::Config;
use pathway_backend_rust::engine::PersonalizationEngine;
use pathway_backend_rust::logging::init_tracing;
use pathway_backend_rust::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.logging);

    let seed = match &config.engine.seed_graph_path {
        Some(path) => SeedData::from_file(path).await,
        None => SeedData::builtin(),
    }
    .expect("seed graph failed to load");

    let engine = PersonalizationEngine::new(config.engine.clone(), Collaborators::in_memory(seed))
        .await
        .map(Arc::new)
        .expect("personalization engine failed to start");

    let worker_manager = match WorkerManager::new(Arc::clone(&engine), config.workers.clone()).await {
        Ok(manager) => {
            if let Err(e) = manager.start().await {
                tracing::error!(error = %e, "failed to start workers");
            }
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "worker manager not initialized");
            None
        }
    };

    let app = pathway_backend_rust::app(Arc::clone(&engine), &config.routes);

    let addr = config.bind_addr();
    tracing::info!(%addr, "pathway backend listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener failed");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }

    match engine.flush_policy_checkpoint().await {
        Ok(true) => tracing::info!("policy checkpoint flushed on shutdown"),
        Ok(false) => {}
        Err(e) => tracing::error!(error = %e, "failed to flush policy checkpoint on shutdown"),
    }

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
