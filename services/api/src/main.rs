use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod middleware;
mod models;
mod routes;
mod settings;
mod state;

use crate::{settings::Settings, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting shop API service");

    let settings = Settings::load()?;
    info!("Using {:?} storage", settings.storage);

    let app_state = AppState::build(&settings).await?;
    info!("Shop API service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let address = settings.server.address();
    let listener = TcpListener::bind(&address).await?;
    info!("Shop API service listening on {}", address);

    axum::serve(listener, app).await?;

    Ok(())
}
