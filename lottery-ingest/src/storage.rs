//! The storage arbitrator: a single task that owns the ledger store.
//!
//! Workers never touch the store. They talk to the arbitrator through a
//! cloneable [`StorageHandle`], and every request carries its own `oneshot`
//! sender for the reply. Requests are served one at a time in arrival order,
//! so ledger writes never interleave and a snapshot is never taken mid-write.
//! Each ledger call runs on the blocking pool so disk I/O never stalls the
//! runtime threads serving connections.

use tokio::{
    sync::{mpsc, oneshot},
    task::{self, JoinHandle},
};
use tracing::{debug, error, info, warn};

use crate::{bet::Bet, error::StorageError, ledger::LedgerStore};

/// Requests queued before senders start waiting for the arbitrator.
const REQUEST_QUEUE_DEPTH: usize = 1024;

enum StorageRequest {
    StoreBets {
        bets: Vec<Bet>,
        respond_to: oneshot::Sender<Result<(), StorageError>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<Result<Vec<Bet>, StorageError>>,
    },
    Stop,
}

/// Cloneable handle used by workers to reach the arbitrator.
#[derive(Clone)]
pub struct StorageHandle {
    requests: mpsc::Sender<StorageRequest>,
}

impl StorageHandle {
    /// Persists `bets` as one atomic unit.
    pub async fn store_bets(&self, bets: Vec<Bet>) -> Result<(), StorageError> {
        let (respond_to, response) = oneshot::channel();
        self.requests
            .send(StorageRequest::StoreBets { bets, respond_to })
            .await
            .map_err(|_| StorageError::Unavailable)?;
        response.await.map_err(|_| StorageError::Unavailable)?
    }

    /// Returns a full ordered copy of the ledger as of when the request is served.
    pub async fn ledger_snapshot(&self) -> Result<Vec<Bet>, StorageError> {
        let (respond_to, response) = oneshot::channel();
        self.requests
            .send(StorageRequest::Snapshot { respond_to })
            .await
            .map_err(|_| StorageError::Unavailable)?;
        response.await.map_err(|_| StorageError::Unavailable)?
    }

    /// Asks the arbitrator to stop; requests queued behind this are dropped.
    pub async fn stop(&self) -> Result<(), StorageError> {
        self.requests
            .send(StorageRequest::Stop)
            .await
            .map_err(|_| StorageError::Unavailable)
    }
}

/// Spawns the arbitrator task, handing it exclusive ownership of `store`.
///
/// The returned `JoinHandle` resolves once the arbitrator has released the
/// store, either after [`StorageHandle::stop`] or when every handle is gone.
pub fn spawn_arbitrator<S>(store: S) -> (StorageHandle, JoinHandle<()>)
where
    S: LedgerStore,
{
    let (requests, inbox) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let task = tokio::spawn(run_arbitrator(store, inbox));
    (StorageHandle { requests }, task)
}

async fn run_arbitrator<S>(mut store: S, mut inbox: mpsc::Receiver<StorageRequest>)
where
    S: LedgerStore,
{
    info!(action = "storage_arbitrator", result = "started");

    while let Some(request) = inbox.recv().await {
        match request {
            StorageRequest::StoreBets { bets, respond_to } => {
                let count = bets.len();
                let Some((returned, outcome)) =
                    with_store(store, move |store| store.append(&bets)).await
                else {
                    break;
                };
                store = returned;
                match &outcome {
                    Ok(()) => debug!(action = "store_bets", result = "success", count),
                    Err(error) => warn!(action = "store_bets", result = "fail", count, %error),
                }
                if respond_to.send(outcome).is_err() {
                    debug!(action = "store_bets", "requester left before the reply");
                }
            }
            StorageRequest::Snapshot { respond_to } => {
                let Some((returned, outcome)) = with_store(store, |store| store.read_all()).await
                else {
                    break;
                };
                store = returned;
                if let Err(error) = &outcome {
                    warn!(action = "ledger_snapshot", result = "fail", %error);
                }
                if respond_to.send(outcome).is_err() {
                    debug!(action = "ledger_snapshot", "requester left before the reply");
                }
            }
            StorageRequest::Stop => break,
        }
    }

    // Closing the inbox drops any queued requests, failing their callers.
    inbox.close();
    info!(action = "storage_arbitrator", result = "stopped");
}

/// Runs one ledger operation on the blocking pool and hands the store back.
///
/// Returns `None` if the operation panicked; the store is lost with it.
async fn with_store<S, R, F>(mut store: S, op: F) -> Option<(S, R)>
where
    S: LedgerStore,
    R: Send + 'static,
    F: FnOnce(&mut S) -> R + Send + 'static,
{
    let blocking = task::spawn_blocking(move || {
        let outcome = op(&mut store);
        (store, outcome)
    });
    match blocking.await {
        Ok(done) => Some(done),
        Err(err) => {
            error!(action = "storage_arbitrator", result = "fail", error = ?err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::ledger::MemoryLedger;

    fn bet(agency: u8, document: &str) -> Bet {
        Bet {
            agency,
            first_name: "Ana".into(),
            last_name: "Diaz".into(),
            document: document.into(),
            birthdate: "2000-01-01".into(),
            number: 1,
        }
    }

    /// Fails every append whose batch contains the poisoned document.
    struct PoisonedLedger {
        inner: MemoryLedger,
        poison: &'static str,
    }

    impl LedgerStore for PoisonedLedger {
        fn append(&mut self, bets: &[Bet]) -> Result<(), StorageError> {
            if bets.iter().any(|bet| bet.document == self.poison) {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.append(bets)
        }

        fn read_all(&mut self) -> Result<Vec<Bet>, StorageError> {
            self.inner.read_all()
        }
    }

    /// Sleeps inside every append, like a slow disk.
    struct SlowLedger {
        inner: MemoryLedger,
        delay: Duration,
    }

    impl SlowLedger {
        fn new(delay: Duration) -> Self {
            Self {
                inner: MemoryLedger::new(),
                delay,
            }
        }
    }

    impl LedgerStore for SlowLedger {
        fn append(&mut self, bets: &[Bet]) -> Result<(), StorageError> {
            std::thread::sleep(self.delay);
            self.inner.append(bets)
        }

        fn read_all(&mut self) -> Result<Vec<Bet>, StorageError> {
            self.inner.read_all()
        }
    }

    #[tokio::test]
    async fn store_then_snapshot() {
        let (handle, task) = spawn_arbitrator(MemoryLedger::new());

        handle
            .store_bets(vec![bet(1, "A"), bet(1, "B")])
            .await
            .expect("store");
        let snapshot = handle.ledger_snapshot().await.expect("snapshot");
        assert_eq!(snapshot, vec![bet(1, "A"), bet(1, "B")]);

        handle.stop().await.expect("stop");
        task.await.expect("arbitrator exits");
    }

    #[tokio::test]
    async fn failed_batch_leaves_ledger_untouched_and_arbitrator_running() {
        let store = PoisonedLedger {
            inner: MemoryLedger::new(),
            poison: "BAD",
        };
        let (handle, task) = spawn_arbitrator(store);

        handle.store_bets(vec![bet(1, "A")]).await.expect("first store");
        let err = handle
            .store_bets(vec![bet(1, "B"), bet(1, "BAD")])
            .await
            .expect_err("poisoned batch");
        assert!(matches!(err, StorageError::Io(_)));

        handle.store_bets(vec![bet(2, "C")]).await.expect("later store");
        let documents: Vec<_> = handle
            .ledger_snapshot()
            .await
            .expect("snapshot")
            .into_iter()
            .map(|bet| bet.document)
            .collect();
        assert_eq!(documents, ["A", "C"]);

        handle.stop().await.expect("stop");
        task.await.expect("arbitrator exits");
    }

    #[tokio::test]
    async fn requests_after_stop_report_unavailable() {
        let (handle, task) = spawn_arbitrator(MemoryLedger::new());
        handle.stop().await.expect("stop");
        task.await.expect("arbitrator exits");

        let err = handle.store_bets(vec![bet(1, "A")]).await.expect_err("stopped");
        assert!(matches!(err, StorageError::Unavailable));
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_arbitrator() {
        let (handle, task) = spawn_arbitrator(MemoryLedger::new());
        drop(handle);
        task.await.expect("arbitrator exits");
    }

    #[tokio::test]
    async fn slow_ledger_leaves_the_runtime_free() {
        // Single-threaded runtime: a blocking append would freeze every task.
        let (handle, task) = spawn_arbitrator(SlowLedger::new(Duration::from_millis(300)));
        let writer = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.store_bets(vec![bet(1, "A")]).await })
        };

        let started = Instant::now();
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(
            started.elapsed() < Duration::from_millis(250),
            "runtime stalled for {:?}",
            started.elapsed()
        );

        writer.await.expect("writer task").expect("store");
        handle.stop().await.expect("stop");
        task.await.expect("arbitrator exits");
    }

    #[tokio::test]
    async fn requesters_leaving_early_do_not_disturb_the_arbitrator() {
        let (handle, task) = spawn_arbitrator(SlowLedger::new(Duration::from_millis(20)));
        let requesters: Vec<_> = (0..10)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.store_bets(vec![bet(1, &format!("doc-{i}"))]).await })
            })
            .collect();

        // Every request is queued by now; drop the requesters before their replies.
        tokio::time::sleep(Duration::from_millis(5)).await;
        for requester in &requesters {
            requester.abort();
        }
        for requester in requesters {
            let _ = requester.await;
        }

        // Queued writes still land even though nobody waits for the ack.
        let snapshot = handle.ledger_snapshot().await.expect("snapshot");
        assert_eq!(snapshot.len(), 10);

        handle.stop().await.expect("stop");
        task.await.expect("arbitrator exits");
    }
}
