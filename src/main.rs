//! Tutor web API backed by a local LLM

use tokio_tutor_api::api;
use tokio_tutor_api::core::offload::OffloadBridge;
use tokio_tutor_api::infrastructure::ollama::OllamaBackend;
use tokio_tutor_api::infrastructure::settings::Settings;

use anyhow::anyhow;
use di::{Injectable, Ref, ServiceProvider};
use di_axum::RouterServiceProviderExtensions;
use log::info;
use tokio::runtime::{Builder, Runtime};
use tower_http::cors::CorsLayer;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env()?;
    info!(
        "using model {} at {} with {} offload workers",
        settings.model, settings.ollama_url, settings.offload.workers
    );

    let bridge = Ref::new(OffloadBridge::new(settings.offload));

    let mut services = tokio_tutor_api::services(settings.clone(), bridge.clone());
    services.add(OllamaBackend::singleton());
    let provider = services
        .build_provider()
        .map_err(|e| anyhow!("invalid service configuration: {e:?}"))?;

    let cors = api::cors_layer(&settings.cors_origins)?;

    // HTTP requests are dispatched on a single thread; blocking LLM calls go to the bridge.
    let runtime: Runtime = Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async {
        let served = web_server_task(settings, provider, cors).await;
        bridge.shutdown().await;
        info!("Shutting down...");
        served
    })
}

async fn web_server_task(
    settings: Settings,
    provider: ServiceProvider,
    cors: CorsLayer,
) -> anyhow::Result<()> {
    let app = api::router().layer(cors).with_provider(provider);

    let listener = tokio::net::TcpListener::bind(settings.bind_address).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
