//! Pre-fetches the model snapshot into the hub cache so the server can start offline.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hermes_viz::config::Config;
use hermes_viz::inference::snapshot;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut cfg = Config::from_env()?;
    // always go to the hub, even if MODEL_DIR points at a local copy
    cfg.model_dir = None;

    info!(
        model_id = %cfg.model_id,
        cache = %cfg.cache_dir.display(),
        "downloading model"
    );

    let files = snapshot::from_hub(&cfg)?;

    info!(
        shards = files.weights.len(),
        tokenizer = %files.tokenizer.display(),
        "download complete"
    );
    Ok(())
}
