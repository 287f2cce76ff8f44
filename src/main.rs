use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use aria_relay::api;
use aria_relay::config::RelayConfig;
use aria_relay::routing::RoutingEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().context("Invalid configuration")?;

    eprintln!("📡 ARIA relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api/rules", config.port);
    eprintln!(
        "   Dispatch timeout: {}s",
        config.routing.dispatch_timeout.as_secs()
    );

    // ── Database + routing ───────────────────────────────────────────────
    let engine = Arc::new(RoutingEngine::from_config(&config).await.with_context(|| {
        format!(
            "Failed to start relay with database {}",
            config.db_path.display()
        )
    })?);

    if config.channels.smtp.is_none() {
        tracing::info!("SMTP not configured, email actions will be accepted without delivery");
    }
    if config.channels.telegram_bot_token.is_none() {
        tracing::info!("TELEGRAM_BOT_TOKEN not set, telegram actions need their own bot_token");
    }

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = api::router(engine);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "ARIA relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
