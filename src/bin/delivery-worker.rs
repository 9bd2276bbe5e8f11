//! Worker process entry point: loads configuration from the environment,
//! connects to Redis, and runs the dispatcher until `SIGINT`/`Ctrl-C`.

use std::sync::Arc;
use std::time::Duration;

use delivery_core::config::Config;
use delivery_core::dispatcher::Dispatcher;
use delivery_core::transport::http::HttpTransport;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = Config::from_env()?;

    let transport_url = std::env::var("TRANSPORT_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let transport = Arc::new(HttpTransport::new(transport_url, cfg.transport_timeout));

    let backend_url = cfg.queue_backend_url.clone();
    let dispatcher = Dispatcher::connect(&backend_url, transport, cfg).await?;

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        shutdown_signal.cancel();
    });

    dispatcher.run(shutdown).await?;
    Ok(())
}
