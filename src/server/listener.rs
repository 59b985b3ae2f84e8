use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::http::dispatcher::Handler;
use crate::server::worker::run_worker;

/// Binds the listening socket, starts `cfg.workers` worker threads and
/// serves until `shutdown` resolves.
pub async fn run<H, F>(cfg: &Config, make_handler: F, shutdown: impl Future<Output = ()>) -> anyhow::Result<()>
where
    H: Handler + 'static,
    F: Fn() -> H + Clone + Send + 'static,
{
    let listener = std::net::TcpListener::bind(&cfg.listen_addr)
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    listener.set_nonblocking(true)?;
    info!("Listening on {}", cfg.listen_addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick = Duration::from_millis(cfg.tick_ms);
    let mut handles = Vec::with_capacity(cfg.workers);

    for worker_id in 0..cfg.workers {
        let socket = listener.try_clone()?;
        let settings = cfg.dispatcher_settings();
        let make_handler = make_handler.clone();
        let rx = shutdown_rx.clone();

        let handle = std::thread::Builder::new()
            .name(format!("keel-worker-{}", worker_id))
            .spawn(move || run_worker(worker_id, socket, settings, tick, make_handler, rx))?;
        handles.push(handle);
    }

    shutdown.await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    let results = tokio::task::spawn_blocking(move || {
        handles
            .into_iter()
            .map(|h| h.join())
            .collect::<Vec<_>>()
    })
    .await?;

    for result in results {
        match result {
            Ok(res) => res?,
            Err(_) => anyhow::bail!("worker thread panicked"),
        }
    }

    Ok(())
}
