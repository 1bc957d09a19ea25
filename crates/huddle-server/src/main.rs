use anyhow::Result;
use huddle_server::state::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "huddle_server=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;
    init_tracing(config.log_json);

    tracing::info!(storage = ?config.storage, "Starting Huddle server...");
    if config.uses_default_jwt_secret() {
        tracing::warn!("HUDDLE_JWT_SECRET not set, using default (insecure for production!)");
    }

    let app = huddle_server::create_app(config.clone()).await?;

    // Start the server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
