use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hermes_viz::api::{self, AppState};
use hermes_viz::config::Config;
use hermes_viz::inference::{ChatModel, LlamaHost, ModelSlot};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env()?;
    info!(model_id = %cfg.model_id, "starting D3 generation server");

    // -----------------------------
    // Startup: load the model once
    // -----------------------------
    let models = ModelSlot::new();
    let load_cfg = cfg.clone();
    let host = tokio::task::spawn_blocking(move || LlamaHost::load(&load_cfg))
        .await
        .context("model loading task panicked")??;
    models.install(Arc::new(host) as Arc<dyn ChatModel>);

    let state = AppState {
        models: models.clone(),
        model_id: cfg.model_id.clone(),
    };

    let listener = TcpListener::bind(cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, "HTTP listening");

    axum::serve(listener, api::app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // -----------------------------
    // Shutdown: release the model
    // -----------------------------
    if models.clear().is_some() {
        info!("model released");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
