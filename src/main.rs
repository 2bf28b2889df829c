use std::sync::Arc;

use anyhow::Context;
use page_insight::api;
use page_insight::config::Config;
use page_insight::engine::Engine;
use page_insight::fetcher::HttpFetcher;
use page_insight::prober::LinkProber;
use page_insight::transport::{DialPolicy, SafeTransport};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    config.validate()?;

    // Initialize tracing subscriber (handles both tracing and log crate)
    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_target(true)
        .init();

    let transport = SafeTransport::new(DialPolicy::PublicOnly);
    let fetcher = HttpFetcher::new(transport, config.page_fetch_timeout())?;
    let prober = LinkProber::new(
        transport,
        config.link_check_concurrency,
        config.probe_timeout(),
    )?;
    let engine = Engine::new(fetcher, prober);
    let app = api::create_router(Arc::new(engine), config.analyze_timeout());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(
        port = config.port,
        concurrency = config.link_check_concurrency,
        "server starting"
    );

    let stop = CancellationToken::new();
    let serve = axum::serve(listener, app).with_graceful_shutdown(stop.clone().cancelled_owned());
    let mut server = tokio::spawn(async move { serve.await });

    tokio::select! {
        finished = &mut server => {
            finished??;
            return Ok(());
        }
        signal = shutdown_signal() => {
            tracing::info!(signal, "shutting down gracefully");
        }
    }

    stop.cancel();
    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(finished) => finished??,
        Err(_) => anyhow::bail!(
            "server did not drain within {:?}, forcing shutdown",
            config.shutdown_timeout()
        ),
    }

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}
