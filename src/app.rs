use crate::{
    config::Config, openapi::write_openapi, ort_service::OrtModelService, server::HttpServer,
    state::Labels,
};
use tokio::signal;

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let labels = Labels::from_config(&config.labels).map_err(anyhow::Error::msg)?;
    tracing::info!(
        "Loaded {} class labels from {:?}",
        labels.len(),
        config.labels.get_path()
    );

    let model_service = match OrtModelService::new(&config.model, labels) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to initialize model service: {:?}", e);
            return Err(e.into());
        }
    };
    tracing::info!(
        "Detector model loaded from {:?} on device {:?}",
        config.model.get_path(),
        config.model.device
    );

    if let Some(path) = &config.server.openapi_path {
        if let Err(e) = write_openapi(path) {
            tracing::warn!("Failed to save OpenAPI documentation to {:?}: {}", path, e);
        }
    }

    let server = HttpServer::new(model_service, &config).await?;
    server
        .run(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown.");
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
