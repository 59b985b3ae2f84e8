use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::LocalSet;
use tracing::{error, info, warn};

use crate::http::connection::{Connection, Worker};
use crate::http::dispatcher::{DispatcherSettings, Handler};

/// Runs one worker: a current-thread runtime accepting on its own clone of
/// the listening socket, until `shutdown` flips.
pub fn run_worker<H, F>(
    worker_id: usize,
    socket: std::net::TcpListener,
    settings: DispatcherSettings,
    tick: Duration,
    make_handler: F,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    H: Handler + 'static,
    F: FnOnce() -> H,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();

    local.block_on(&rt, async move {
        let listener = TcpListener::from_std(socket)?;
        let worker = Worker::shared(settings, make_handler());

        info!(worker = worker_id, "Worker started");

        let ticker = worker.clone();
        let tick_task = tokio::task::spawn_local(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                ticker.borrow_mut().pass();
            }
        });

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(worker = worker_id, error = %e, "Accept failed");
                            continue;
                        }
                    };

                    let mut conn = Connection::new(socket, worker.clone());
                    info!(worker = worker_id, conn = %conn.id(), "Accepted connection from {}", peer);

                    tokio::task::spawn_local(async move {
                        if let Err(e) = conn.run().await {
                            error!("Connection error from {}: {}", peer, e);
                        }
                    });
                }

                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        tick_task.abort();
        worker.borrow_mut().shutdown();
        info!(worker = worker_id, "Worker stopped");

        Ok::<_, anyhow::Error>(())
    })
}
