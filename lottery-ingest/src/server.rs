use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::{JoinHandle, JoinSet},
    time::sleep,
};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    bet::AgencyId,
    completion::CompletionTracker,
    draw::WinningPredicate,
    ledger::LedgerStore,
    storage::{StorageHandle, spawn_arbitrator},
    worker::{WorkerContext, serve_connection},
};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts agency connections and hands each one to its own worker task.
pub struct Server {
    listener: TcpListener,
    ctx: WorkerContext,
    arbitrator: JoinHandle<()>,
}

impl Server {
    /// Starts the storage arbitrator over `store` and prepares the acceptor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S, P>(listener: TcpListener, store: S, total_agencies: AgencyId, predicate: P) -> Self
    where
        S: LedgerStore,
        P: WinningPredicate,
    {
        let (storage, arbitrator) = spawn_arbitrator(store);
        Self {
            listener,
            ctx: WorkerContext {
                storage,
                completion: Arc::new(CompletionTracker::new(total_agencies)),
                predicate: Arc::new(predicate),
            },
            arbitrator,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn completion(&self) -> Arc<CompletionTracker> {
        Arc::clone(&self.ctx.completion)
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// On shutdown the acceptor stops, every in-flight worker is aborted (which
    /// drops its connection), and the arbitrator is stopped and awaited.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            ctx,
            arbitrator,
        } = self;
        let mut workers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    if !handle_accept_result(accept_result, &ctx, &mut workers) {
                        // Errors like EMFILE persist; give workers time to release sockets.
                        select! {
                            _ = &mut shutdown => break,
                            _ = sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = ?err, "worker task failed");
                    }
                }
            }
        }

        drop(listener);
        handle_shutdown(ctx.storage, arbitrator, workers).await;
        Ok(())
    }

    /// Runs until ctrl-c or, on unix, SIGTERM.
    pub async fn run_until_signal(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = ?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Spawns a worker for an accepted connection. Returns `false` when accepting failed.
fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    ctx: &WorkerContext,
    workers: &mut JoinSet<()>,
) -> bool {
    match result {
        Ok((stream, peer)) => {
            info!(action = "accept_connections", result = "success", ip = %peer.ip());
            let span = info_span!("worker", %peer);
            workers.spawn(serve_connection(stream, ctx.clone()).instrument(span));
            true
        }
        Err(err) => {
            warn!(action = "accept_connections", result = "fail", error = ?err);
            false
        }
    }
}

async fn handle_shutdown(storage: StorageHandle, arbitrator: JoinHandle<()>, mut workers: JoinSet<()>) {
    info!(in_flight = workers.len(), "server shutting down");
    workers.shutdown().await;

    if let Err(err) = storage.stop().await {
        debug!(error = %err, "storage arbitrator already stopped");
    }
    drop(storage);
    if let Err(err) = arbitrator.await {
        warn!(error = ?err, "storage arbitrator task failed");
    }
    info!("server has shut down");
}
