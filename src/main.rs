//! Entry point: loads configuration from the environment, initializes
//! logging, and starts the WebSocket gateway.

use sales_voice_gateway::{config::Config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;
    server::start(config).await
}
