use keel::config::Config;
use keel::server::demo::DemoHandler;
use keel::server::listener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!(
        listen_addr = %cfg.listen_addr,
        workers = cfg.workers,
        max_body_size = cfg.max_body_size,
        "Configuration loaded"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    listener::run(&cfg, || DemoHandler, shutdown).await
}
