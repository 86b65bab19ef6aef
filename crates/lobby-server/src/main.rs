mod config;

use clap::Parser;
use tracing::info;

use lobby_gateway::Server;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lobby=info,lobby_gateway=debug".into()),
        )
        .init();

    let config = Config::parse();
    let server = Server::bind(config.listen_addr(), config.max_sessions).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    }
}
