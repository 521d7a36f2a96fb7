//! Generic work-queue controller.
//!
//! Keys arrive over a channel fed by the watches, land in a [`WorkQueue`] and
//! are handed one at a time to a [`SyncHandler`].  A failed pass is retried
//! with per-key exponential backoff until `max_retries` is reached, after
//! which the key is dropped until the next change notification.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{ObjectKey, ResourceCache};
use crate::error::Result;
use crate::queue::{ExponentialBackoff, WorkQueue};

/// Converges the object behind one key.
#[async_trait::async_trait]
pub trait SyncHandler: Send + Sync + 'static {
    async fn sync(&self, key: &ObjectKey) -> Result<()>;
}

type ReadyCheck = BoxFuture<'static, Result<()>>;

pub struct Controller {
    name: String,
    queue: WorkQueue<ObjectKey>,
    handler: Arc<dyn SyncHandler>,
    intake: mpsc::UnboundedReceiver<ObjectKey>,
    max_retries: u32,
    ready_checks: Vec<ReadyCheck>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("queued", &self.queue.len())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Controller {
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn SyncHandler>,
        intake: mpsc::UnboundedReceiver<ObjectKey>,
        backoff: ExponentialBackoff,
        max_retries: u32,
    ) -> Self {
        Self {
            name: name.into(),
            queue: WorkQueue::new(backoff),
            handler,
            intake,
            max_retries,
            ready_checks: Vec::new(),
        }
    }

    /// Do not start workers before `cache` has received its initial list.
    pub fn wait_for<K>(mut self, cache: &ResourceCache<K>) -> Self
    where
        K: kube::Resource + Clone + Send + Sync + 'static,
        K::DynamicType: Eq + Hash + Clone + Default + Send + Sync,
    {
        let cache = cache.clone();
        self.ready_checks
            .push(async move { cache.wait_until_ready().await }.boxed());
        self
    }

    /// Handle on the underlying queue.
    pub fn queue(&self) -> WorkQueue<ObjectKey> {
        self.queue.clone()
    }

    pub fn enqueue(&self, key: ObjectKey) {
        self.queue.add(key);
    }

    /// Wait for the caches, then process keys with `workers` concurrent
    /// workers until `stop` is cancelled.  Workers finish the key they are
    /// syncing before returning.
    pub async fn run(self, workers: usize, stop: CancellationToken) -> Result<()> {
        let Controller {
            name,
            queue,
            handler,
            mut intake,
            max_retries,
            ready_checks,
        } = self;

        info!(controller = %name, "waiting for caches to sync");
        tokio::select! {
            res = try_join_all(ready_checks) => { res?; }
            _ = stop.cancelled() => {
                info!(controller = %name, "stopped before caches synced");
                return Ok(());
            }
        }

        let intake_queue = queue.clone();
        let intake_task = tokio::spawn(async move {
            while let Some(key) = intake.recv().await {
                intake_queue.add(key);
            }
        });

        info!(controller = %name, workers, "starting workers");
        let handles: Vec<_> = (0..workers.max(1))
            .map(|_| {
                let queue = queue.clone();
                let handler = Arc::clone(&handler);
                let name = name.clone();
                tokio::spawn(async move {
                    while let Some(key) = queue.get().await {
                        process_item(&name, &queue, handler.as_ref(), max_retries, key).await;
                    }
                })
            })
            .collect();

        stop.cancelled().await;
        info!(controller = %name, "shutting down workers");
        queue.shut_down();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(controller = %name, %e, "worker task panicked");
            }
        }
        intake_task.abort();
        Ok(())
    }
}

/// Sync one key and record the outcome in the queue.
pub async fn process_item(
    name: &str,
    queue: &WorkQueue<ObjectKey>,
    handler: &dyn SyncHandler,
    max_retries: u32,
    key: ObjectKey,
) {
    debug!(controller = %name, %key, "syncing");
    match handler.sync(&key).await {
        Ok(()) => {
            queue.forget(&key);
            debug!(controller = %name, %key, "synced");
        }
        Err(e) => {
            let retries = queue.num_requeues(&key);
            if retries < max_retries {
                warn!(controller = %name, %key, retries, error = %e, "sync failed, requeueing");
                queue.add_rate_limited(key.clone());
            } else {
                error!(controller = %name, %key, retries, error = %e, "dropping key out of the queue");
                queue.forget(&key);
            }
        }
    }
    queue.done(&key);
}
