use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kurzus_export::config::{Cli, Config};
use kurzus_export::state::AppState;
use kurzus_export::web;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_cli(Cli::parse());
    info!("Starting with {:?}", config);

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
