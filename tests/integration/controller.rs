use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use super::common::*;
use aerospike_operator::cache::{ObjectKey, ResourceCache};
use aerospike_operator::controller::generic::{Controller, SyncHandler};
use aerospike_operator::error::{Error, Result};
use aerospike_operator::queue::ExponentialBackoff;

/// Counts passes and fails the first `failures` of them.
struct CountingHandler {
    calls: AtomicUsize,
    failures: usize,
}

impl CountingHandler {
    fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SyncHandler for CountingHandler {
    async fn sync(&self, _key: &ObjectKey) -> Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(Error::config("sync failed"));
        }
        Ok(())
    }
}

/// Blocks every pass until the test releases it, tracking how many passes
/// overlap.
#[derive(Default)]
struct GatedHandler {
    started: Notify,
    release: Notify,
    calls: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl GatedHandler {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SyncHandler for GatedHandler {
    async fn sync(&self, _key: &ObjectKey) -> Result<()> {
        let overlapping = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(overlapping, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        self.release.notified().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1))
}

fn key() -> ObjectKey {
    ObjectKey::new(NS, "b1")
}

#[tokio::test(start_paused = true)]
async fn failing_key_is_retried_then_dropped() -> anyhow::Result<()> {
    let handler = CountingHandler::failing(usize::MAX);
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = Controller::new("test", handler.clone(), rx, backoff(), 3)
        .wait_for(&cache_of::<Pod>(vec![]));
    let queue = controller.queue();

    let stop = CancellationToken::new();
    let run = tokio::spawn(controller.run(1, stop.clone()));

    tx.send(key())?;
    tokio::time::sleep(Duration::from_secs(10)).await;

    // The initial pass plus three retries.
    assert_eq!(handler.calls(), 4);
    assert_eq!(queue.num_requeues(&key()), 0, "dropped keys are forgotten");
    assert!(queue.is_empty());

    // A fresh notification starts over.
    tx.send(key())?;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handler.calls(), 8);

    stop.cancel();
    run.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers() -> anyhow::Result<()> {
    let handler = CountingHandler::failing(2);
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = Controller::new("test", handler.clone(), rx, backoff(), 5)
        .wait_for(&cache_of::<Pod>(vec![]));
    let queue = controller.queue();

    let stop = CancellationToken::new();
    let run = tokio::spawn(controller.run(2, stop.clone()));

    tx.send(key())?;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(handler.calls(), 3);
    assert_eq!(queue.num_requeues(&key()), 0);

    stop.cancel();
    run.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn successful_sync_runs_once() -> anyhow::Result<()> {
    let handler = CountingHandler::failing(0);
    let (_tx, rx) = mpsc::unbounded_channel();
    let controller = Controller::new("test", handler.clone(), rx, backoff(), 3)
        .wait_for(&cache_of::<Pod>(vec![]));
    controller.enqueue(key());

    let stop = CancellationToken::new();
    let run = tokio::spawn(controller.run(1, stop.clone()));
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(handler.calls(), 1);

    stop.cancel();
    run.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn no_work_before_caches_sync() -> anyhow::Result<()> {
    let handler = CountingHandler::failing(0);
    let (tx, rx) = mpsc::unbounded_channel();
    // Keep the writer alive without ever completing the initial list.
    let (store, _writer) = reflector::store::<Pod>();
    let controller =
        Controller::new("test", handler.clone(), rx, backoff(), 3).wait_for(&ResourceCache::new(store));

    let stop = CancellationToken::new();
    let run = tokio::spawn(controller.run(1, stop.clone()));

    tx.send(key())?;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handler.calls(), 0);

    stop.cancel();
    run.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_lets_the_running_pass_finish_and_dequeues_nothing_more() -> anyhow::Result<()> {
    let handler = Arc::new(GatedHandler::default());
    let (_tx, rx) = mpsc::unbounded_channel();
    let controller = Controller::new("test", handler.clone(), rx, backoff(), 3)
        .wait_for(&cache_of::<Pod>(vec![]));
    controller.enqueue(ObjectKey::new(NS, "first"));
    controller.enqueue(ObjectKey::new(NS, "second"));
    let queue = controller.queue();

    let stop = CancellationToken::new();
    let run = tokio::spawn(controller.run(1, stop.clone()));

    handler.started.notified().await;
    stop.cancel();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!run.is_finished(), "run waits for the pass in progress");
    assert_eq!(handler.calls(), 1);

    handler.release.notify_one();
    run.await??;

    assert_eq!(handler.calls(), 1, "second key is never dequeued");
    assert_eq!(handler.completed(), 1);
    assert!(queue.is_shutting_down());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn key_re_added_during_its_sync_never_runs_concurrently() -> anyhow::Result<()> {
    let handler = Arc::new(GatedHandler::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = Controller::new("test", handler.clone(), rx, backoff(), 3)
        .wait_for(&cache_of::<Pod>(vec![]));

    let stop = CancellationToken::new();
    let run = tokio::spawn(controller.run(2, stop.clone()));

    tx.send(key())?;
    handler.started.notified().await;

    // Changes arriving while the key is being synced.
    tx.send(key())?;
    tx.send(key())?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handler.calls(), 1, "the idle worker must not pick up the same key");

    handler.release.notify_one();
    handler.started.notified().await;
    assert_eq!(handler.calls(), 2, "pending changes coalesce into one more pass");

    handler.release.notify_one();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handler.calls(), 2);
    assert_eq!(handler.completed(), 2);
    assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 1);

    stop.cancel();
    run.await??;
    Ok(())
}
