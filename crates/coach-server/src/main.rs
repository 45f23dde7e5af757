//! Coach API entry point.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use coach_core::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;
    coach_server::run(settings).await
}
