//! Background eviction.
//!
//! Prefix deletions are queued on a bounded channel and performed in
//! submission order by one worker task. Each job hands back a receipt the
//! caller may await or drop.

use std::sync::{Arc, Mutex};

use rowcache_core::{CacheError, CacheResult, CacheStore};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::lock::mutex_lock;
use crate::stats::CacheStats;

const SOURCE: &str = "rowcache::evict";

enum EvictionJob {
    Evict {
        prefix: String,
        reply: oneshot::Sender<CacheResult<()>>,
    },
    /// Completes once every job queued before it is done.
    Barrier(oneshot::Sender<()>),
}

/// Handle on one scheduled prefix deletion.
#[derive(Debug)]
pub struct EvictionReceipt {
    prefix: String,
    reply: Option<oneshot::Receiver<CacheResult<()>>>,
}

impl EvictionReceipt {
    fn stopped(prefix: String) -> Self {
        Self {
            prefix,
            reply: None,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wait for the deletion to finish.
    pub async fn wait(self) -> CacheResult<()> {
        match self.reply {
            Some(reply) => reply.await.unwrap_or(Err(CacheError::WorkerStopped)),
            None => Err(CacheError::WorkerStopped),
        }
    }
}

/// Owner of the eviction queue and its worker task.
pub struct Evictor {
    queue: Mutex<Option<mpsc::Sender<EvictionJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Evictor {
    /// Start the worker on the current tokio runtime.
    pub fn spawn<S>(store: Arc<S>, depth: usize, stats: Arc<CacheStats>) -> Self
    where
        S: CacheStore + 'static,
    {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let worker = tokio::spawn(run_worker(store, rx, stats));
        Self {
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<EvictionJob>> {
        mutex_lock(&self.queue, SOURCE, "sender").clone()
    }

    /// Queue a deletion of every key under `prefix`.
    ///
    /// Waits for queue capacity, not for the deletion itself.
    pub async fn schedule(&self, prefix: String) -> EvictionReceipt {
        let Some(queue) = self.sender() else {
            error!(prefix = %prefix, "Eviction queue closed; prefix not evicted");
            return EvictionReceipt::stopped(prefix);
        };

        let (reply, rx) = oneshot::channel();
        let job = EvictionJob::Evict {
            prefix: prefix.clone(),
            reply,
        };
        if queue.send(job).await.is_err() {
            error!(prefix = %prefix, "Eviction worker stopped; prefix not evicted");
            return EvictionReceipt::stopped(prefix);
        }

        debug!(prefix = %prefix, "Eviction scheduled");
        EvictionReceipt {
            prefix,
            reply: Some(rx),
        }
    }

    /// Wait until every eviction scheduled so far has been performed.
    pub async fn flush(&self) {
        let Some(queue) = self.sender() else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if queue.send(EvictionJob::Barrier(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(&self) {
        let queue = mutex_lock(&self.queue, SOURCE, "shutdown").take();
        drop(queue);

        let worker = mutex_lock(&self.worker, SOURCE, "shutdown").take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Eviction worker terminated abnormally");
            }
        }
    }
}

async fn run_worker<S>(
    store: Arc<S>,
    mut rx: mpsc::Receiver<EvictionJob>,
    stats: Arc<CacheStats>,
) where
    S: CacheStore + 'static,
{
    while let Some(job) = rx.recv().await {
        match job {
            EvictionJob::Evict { prefix, reply } => {
                let result = store.delete_with_prefix(&prefix).await;
                match &result {
                    Ok(()) => {
                        stats.record_eviction();
                        debug!(prefix = %prefix, "Evicted cache prefix");
                    }
                    Err(e) => {
                        stats.record_eviction_failure();
                        error!(prefix = %prefix, error = %e, "Failed to evict cache prefix");
                    }
                }
                let _ = reply.send(result);
            }
            EvictionJob::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Eviction worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_schedule_and_wait() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("t:5-a", b"v".to_vec(), Duration::ZERO)
            .await
            .unwrap();
        store
            .set("t:7-a", b"v".to_vec(), Duration::ZERO)
            .await
            .unwrap();
        let stats = Arc::new(CacheStats::new());
        let evictor = Evictor::spawn(Arc::clone(&store), 4, Arc::clone(&stats));

        let receipt = evictor.schedule("t:5".to_string()).await;
        assert_eq!(receipt.prefix(), "t:5");
        receipt.wait().await.unwrap();

        assert_eq!(store.keys(), vec!["t:7-a".to_string()]);
        assert_eq!(stats.snapshot().evictions, 1);
    }

    #[tokio::test]
    async fn test_flush_waits_for_dropped_receipts() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("t:LIST-a", b"v".to_vec(), Duration::ZERO)
            .await
            .unwrap();
        let evictor = Evictor::spawn(Arc::clone(&store), 1, Arc::new(CacheStats::new()));

        drop(evictor.schedule("t:LIST".to_string()).await);
        evictor.flush().await;

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_schedule_after_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let evictor = Evictor::spawn(store, 1, Arc::new(CacheStats::new()));

        evictor.shutdown().await;
        let receipt = evictor.schedule("t:1".to_string()).await;
        assert_eq!(receipt.wait().await, Err(CacheError::WorkerStopped));
    }
}
