//! StoryLens server: photo in, story (and narration) out.

use tokio::signal;
use tracing::info;

use storylens::logging::Logger;
use storylens::{create_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    Logger::init();

    let config = Config::from_env()?;
    info!("Story style: {}", config.story_style);
    if config.gemini.api_key.is_none() {
        info!("GEMINI_API_KEY not set; uploads will fail until it is configured");
    }
    if config.speech.base_url.is_none() {
        info!("TTS_BASE_URL not set; stories will be returned without audio");
    }

    let addr = config.bind_addr();
    let port = config.port;
    let state = AppState::from_config(config);
    state.service.store().ensure_dir().await?;
    info!("Uploads directory: {}", state.service.store().dir().display());

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("StoryLens server running on port {}", port);
    info!("Health check: http://localhost:{}/health", port);
    info!("Static files: http://localhost:{}/media/", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
