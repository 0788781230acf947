use std::sync::Arc;
use tokio::net::TcpListener;

use presence_server::config::{generate_config_template, Config};
use presence_server::presence::reconciler;
use presence_server::routes;
use presence_server::state::AppState;
use presence_server::store::RedisStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("presence_server=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter())
            .init();
    }

    tracing::info!("Presence server v{} starting", env!("CARGO_PKG_VERSION"));

    let store = RedisStore::connect(&config.redis_url()).await?;

    let state = AppState::new(
        Arc::new(store),
        config.presence_ttl(),
        config.refresh_interval(),
    );

    // Subscribe to login/logout before accepting connections
    let _reconciler = reconciler::spawn(state.clone()).await?;

    let app = routes::build_router(state, &config.socket_path);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        "Listening on {} (WebSocket path {})",
        addr,
        config.socket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}
