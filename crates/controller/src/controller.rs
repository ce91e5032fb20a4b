use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, field, info, info_span, warn, Instrument};
use vigil_core::metrics::{Recorder, REQUEUE};
use vigil_core::{split_key, Error, EventHandler, EventKind, ListOptions, ResourceEvent, Result, Source};
use vigil_store::{Backoff, Cache, Pending, WorkQueue};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub name: String,
    pub concurrent_workers: usize,
    pub resync_interval: Duration,
    /// Failed attempts re-enqueued before a key is dropped.
    pub max_retries: u32,
    pub cache_sync_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub backoff: Backoff,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "controller".into(),
            concurrent_workers: 1,
            resync_interval: Duration::from_secs(30),
            max_retries: 3,
            cache_sync_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(10),
            backoff: Backoff::default(),
        }
    }
}

/// Watches one resource kind and drives an [`EventHandler`] for every change,
/// one key at a time per key, `concurrent_workers` keys at a time overall.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: ControllerConfig,
    cache: Cache,
    queue: WorkQueue,
    source: Arc<dyn Source>,
    handler: Arc<dyn EventHandler>,
    recorder: Arc<dyn Recorder>,
    running: AtomicBool,
    synced: AtomicBool,
}

/// Marks the key done however processing ends.
struct DoneGuard<'a> {
    queue: &'a WorkQueue,
    key: &'a str,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

impl Controller {
    pub fn new(
        cfg: ControllerConfig,
        source: Arc<dyn Source>,
        handler: Arc<dyn EventHandler>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        let queue = WorkQueue::with_backoff(cfg.backoff);
        let cache = Cache::new(cfg.name.clone(), queue.clone(), Arc::clone(&recorder));
        Self {
            inner: Arc::new(Inner {
                cfg,
                cache,
                queue,
                source,
                handler,
                recorder,
                running: AtomicBool::new(false),
                synced: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.cfg.name
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.cfg
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.inner.queue
    }

    pub fn cache(&self) -> &Cache {
        &self.inner.cache
    }

    /// True once the cache synced and workers were started.
    pub fn has_synced(&self) -> bool {
        self.inner.synced.load(Ordering::Acquire)
    }

    /// Sync the cache, run the workers until `stop` fires, then drain.
    ///
    /// A controller runs at most once: its queue is shut down when `run`
    /// returns, so a second call fails with [`Error::AlreadyRunning`].
    pub async fn run(&self, stop: CancellationToken) -> Result<()> {
        let inner = &self.inner;
        let name = inner.cfg.name.as_str();
        if inner.cfg.resync_interval.is_zero() {
            return Err(Error::Config(format!("controller {}: resync interval must be positive", name)));
        }
        if inner.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning(name.to_string()));
        }
        info!(controller = %name, workers = inner.cfg.concurrent_workers, "starting controller");

        let cache_stop = stop.child_token();
        let cache_task = {
            let inner = Arc::clone(inner);
            let cache_stop = cache_stop.clone();
            tokio::spawn(async move {
                let source = Arc::clone(&inner.source);
                inner.cache.run(source, ListOptions::default(), inner.cfg.resync_interval, cache_stop).await;
            })
        };

        let synced = tokio::select! {
            _ = stop.cancelled() => false,
            res = tokio::time::timeout(inner.cfg.cache_sync_timeout, inner.cache.wait_synced()) => res.is_ok(),
        };
        if !synced {
            cache_stop.cancel();
            inner.queue.shut_down();
            join_cache(name, cache_task).await;
            if stop.is_cancelled() {
                info!(controller = %name, "stopped before cache sync");
                return Ok(());
            }
            error!(controller = %name, timeout = ?inner.cfg.cache_sync_timeout, "timed out waiting for cache sync");
            return Err(Error::CacheSyncTimeout);
        }
        inner.synced.store(true, Ordering::Release);
        info!(controller = %name, objects = inner.cache.len(), "cache synced; starting workers");

        let mut workers = JoinSet::new();
        for id in 0..inner.cfg.concurrent_workers.max(1) {
            let inner = Arc::clone(inner);
            workers.spawn(async move { inner.run_worker(id).await });
        }

        stop.cancelled().await;
        info!(controller = %name, "stopping controller");
        cache_stop.cancel();
        inner.queue.shut_down();

        let drain = async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(controller = %name, error = %e, "worker panicked");
                }
            }
        };
        if tokio::time::timeout(inner.cfg.shutdown_timeout, drain).await.is_err() {
            warn!(controller = %name, timeout = ?inner.cfg.shutdown_timeout, "workers still busy; aborting");
            workers.abort_all();
        }
        join_cache(name, cache_task).await;
        info!(controller = %name, "controller stopped");
        Ok(())
    }
}

impl Inner {
    async fn run_worker(&self, id: usize) {
        debug!(controller = %self.cfg.name, worker = id, "worker started");
        while self.get_and_process_next_job().await {}
        debug!(controller = %self.cfg.name, worker = id, "worker stopped");
    }

    /// Returns false once the queue is shut down and drained.
    async fn get_and_process_next_job(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let _done = DoneGuard { queue: &self.queue, key: &key };
        let pending = self.cache.take_pending(&key);
        let retries = self.queue.num_requeues(&key);
        let (namespace, name) = split_key(&key);
        let span = info_span!(
            "process_job",
            controller = %self.cfg.name,
            key = %key,
            namespace = namespace.unwrap_or(""),
            name = name,
            retries = retries,
            outcome = field::Empty,
        );

        let result = self.process_job(&key, pending).instrument(span.clone()).await;
        span.in_scope(|| match result {
            Ok(()) => {
                self.queue.forget(&key);
                span.record("outcome", "success");
            }
            Err(e) if retries < self.cfg.max_retries => {
                warn!(error = %e, "processing failed; requeueing");
                if let Some(p) = pending {
                    self.cache.restore_pending(&key, p);
                }
                self.queue.add_rate_limited(&key);
                self.recorder.inc_queued(&self.cfg.name, REQUEUE);
                span.record("outcome", "requeued");
            }
            Err(e) => {
                error!(error = %e, max_retries = self.cfg.max_retries, "processing failed; dropping key");
                self.queue.forget(&key);
                span.record("outcome", "forgotten");
            }
        });
        true
    }

    /// Present in the cache ⇒ add (or update), absent ⇒ delete.
    async fn process_job(&self, key: &str, pending: Option<Pending>) -> Result<()> {
        let started = Instant::now();
        let has_synced = self.synced.load(Ordering::Acquire) && pending.map_or(true, |p| p.has_synced);
        let (kind, res) = match self.cache.get_by_key(key) {
            Some(obj) => {
                // no record means an earlier job consumed it while this change
                // was coalesced into the in-flight key
                let kind = match pending.map(|p| p.kind) {
                    Some(EventKind::Update) | None => EventKind::Update,
                    Some(EventKind::Add) | Some(EventKind::Delete) => EventKind::Add,
                };
                let ev = ResourceEvent::new(key, kind, has_synced).with_object(obj);
                (kind, self.handler.add(ev).await)
            }
            None => {
                let ev = ResourceEvent::new(key, EventKind::Delete, has_synced);
                (EventKind::Delete, self.handler.delete(ev).await)
            }
        };
        self.recorder.observe_duration(&self.cfg.name, kind.label(), started);
        match &res {
            Ok(()) => self.recorder.inc_processed(&self.cfg.name, kind.label()),
            Err(_) => self.recorder.inc_processed_error(&self.cfg.name, kind.label()),
        }
        res
    }
}

async fn join_cache(name: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        error!(controller = %name, error = %e, "cache task failed");
    }
}
