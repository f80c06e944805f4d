//! TrueTalk AI server.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use truetalk_ai::{api, AppContext, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.monitoring.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    for warning in &config.load_warnings {
        tracing::warn!("{}", warning);
    }
    config.validate()?;
    if config.dev.dev_mode {
        tracing::warn!("Running in development mode");
    }

    let ctx = Arc::new(AppContext::new(Arc::new(config))?);
    api::serve(ctx).await
}
