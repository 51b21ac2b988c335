use taskflow::api::task_routes;
use taskflow::config::{HandlerConfig, OrchestratorConfig, ServerConfig};
use taskflow::orchestrator::TaskOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let orchestrator_config = OrchestratorConfig::from_env()?;
    let handler_config = HandlerConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    eprintln!("Taskflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}", server_config.bind_addr());
    eprintln!(
        "   Retries: {} (base delay {}ms)",
        orchestrator_config.max_retries,
        orchestrator_config.retry_base_delay.as_millis()
    );
    if handler_config.planning_latency.is_zero() {
        eprintln!("   Simulated latency: off");
    }

    let orchestrator = TaskOrchestrator::with_builtins(orchestrator_config, handler_config);
    let app = task_routes(orchestrator);

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Task API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
