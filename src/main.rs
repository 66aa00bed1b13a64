use jasque_telemetry::{init_telemetry, TelemetryConfig};
use jasque_server::ServerConfig;

#[tokio::main]
async fn main() {
    init_telemetry(TelemetryConfig::default());

    let config = ServerConfig::from_env();
    tracing::info!(
        port = config.port,
        vault = %config.vault_path.display(),
        model = %config.model_name,
        "starting Jasque server"
    );

    let handle = match jasque_server::start(config).await {
        Ok(handle) => handle,
        Err(error) => {
            tracing::error!(%error, "failed to start server");
            std::process::exit(1);
        }
    };

    tracing::info!(port = handle.port, "Jasque server ready");

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
