use crate::output::UserOutput;
use service_orchestrator::{api, Orchestrator, OrchestratorConfig, Registry};
use std::path::Path;
use std::sync::Arc;

pub async fn run_serve(
    registry_path: &Path,
    config: OrchestratorConfig,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let registry = Registry::from_file(registry_path)?;
    registry.validate()?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let orchestrator = Arc::new(Orchestrator::new(registry, config)?);
    orchestrator.initialize().await?;

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            out.error(&format!("Failed to bind {}: {}", address, e));
            orchestrator.shutdown().await?;
            return Err(e.into());
        }
    };
    out.success(&format!("Control API listening on http://{}/orchestrator", address));

    let served = axum::serve(listener, api::router(orchestrator.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    out.status("Stopping services...");
    orchestrator.shutdown().await?;
    served?;
    out.success("Orchestrator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
