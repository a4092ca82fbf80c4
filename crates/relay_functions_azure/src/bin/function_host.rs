use std::net::SocketAddr;

use relay_functions_azure::config::FunctionsConfig;
use relay_functions_azure::server::{router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = FunctionsConfig::from_env()?;
    let address = SocketAddr::from(([127, 0, 0, 1], config.port));
    let app = router(AppState::new(config, reqwest::Client::new()));

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(
        component = "function_host",
        event = "listening",
        address = %address,
        "Custom handler listening on {address}"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
