use std::sync::Arc;

use anyhow::Context;
use server::config::Config;
use server::store::SessionStore;
use tracing_subscriber::EnvFilter;
use tutor_core::{
    ChatCompletionsClient, EngineManager, SessionConfig, StockfishLauncher, Tutor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    let engine = if config.engine_enabled {
        let launcher = StockfishLauncher::new(&config.stockfish_path, config.engine_options);
        let engine = Arc::new(EngineManager::new(Box::new(launcher), config.analysis));
        // Not fatal: analysis reports unavailable and each request retries once
        if let Err(e) = engine.start().await {
            tracing::warn!(path = %config.stockfish_path, error = %e, "Stockfish not available at startup");
        }
        Some(engine)
    } else {
        tracing::info!("Engine disabled by configuration");
        None
    };

    if config.llm.api_key.is_none() {
        tracing::warn!("GROQ_API_KEY not set - tutor replies will report unavailable");
    }
    let completions = ChatCompletionsClient::new(config.llm.clone())
        .context("Failed to build LLM client")?;
    let tutor = Tutor::new(Arc::new(completions));

    let session_config = SessionConfig {
        draw_rules: config.draw_rules,
        analyze_on_move: true,
    };
    let store = Arc::new(
        SessionStore::new(engine.clone(), tutor, session_config)
            .with_idle_timeout(config.session_idle_timeout),
    );
    let app = server::router(store);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(engine) = engine {
        engine.stop().await;
    }
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
