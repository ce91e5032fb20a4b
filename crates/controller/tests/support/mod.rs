#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use vigil_core::metrics::Recorder;
use vigil_core::{Error, EventHandler, EventKind, ListOptions, Listing, ResourceEvent, Result, Source, SourceEvent};
use vigil_store::WorkQueue;

pub fn obj(name: &str, rv: &str) -> Value {
    json!({ "kind": "Deployment", "metadata": { "name": name, "namespace": "ns", "resourceVersion": rv } })
}

/// Fixed listing, then whatever the test pushes.
pub struct FakeSource {
    listing: Vec<Value>,
    fail_list: bool,
    events: Mutex<Option<mpsc::UnboundedReceiver<Result<SourceEvent>>>>,
}

impl FakeSource {
    pub fn new(listing: Vec<Value>) -> (Arc<Self>, mpsc::UnboundedSender<Result<SourceEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { listing, fail_list: false, events: Mutex::new(Some(rx)) }), tx)
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self { listing: Vec::new(), fail_list: true, events: Mutex::new(None) })
    }
}

#[async_trait]
impl Source for FakeSource {
    async fn list(&self, _opts: &ListOptions) -> Result<Listing> {
        if self.fail_list {
            return Err(Error::Source("connection refused".into()));
        }
        Ok(Listing { items: self.listing.clone(), resource_version: Some("1".into()) })
    }

    async fn watch(&self, _opts: &ListOptions) -> Result<BoxStream<'static, Result<SourceEvent>>> {
        match self.events.lock().take() {
            Some(rx) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) }))),
            None => Ok(Box::pin(stream::pending::<Result<SourceEvent>>())),
        }
    }
}

/// Records every call; fails every call when `fail` is set.
#[derive(Default)]
pub struct Recording {
    pub calls: Mutex<Vec<(EventKind, String, bool)>>,
    pub count: AtomicUsize,
    pub fail: bool,
}

impl Recording {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn record(&self, ev: &ResourceEvent) -> Result<()> {
        self.calls.lock().push((ev.kind, ev.key.clone(), ev.has_synced));
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Delivery("sink down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for Recording {
    async fn add(&self, event: ResourceEvent) -> Result<()> {
        self.record(&event)
    }

    async fn delete(&self, event: ResourceEvent) -> Result<()> {
        self.record(&event)
    }
}

/// Never finishes a call.
#[derive(Default)]
pub struct Hanging {
    pub entered: AtomicUsize,
}

impl Hanging {
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for Hanging {
    async fn add(&self, _event: ResourceEvent) -> Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn delete(&self, event: ResourceEvent) -> Result<()> {
        self.add(event).await
    }
}

/// Puts the key back on the queue once, from inside the first call, with no
/// cache notification of its own.
#[derive(Default)]
pub struct Requeueing {
    pub queue: Mutex<Option<WorkQueue>>,
    pub inner: Recording,
}

#[async_trait]
impl EventHandler for Requeueing {
    async fn add(&self, event: ResourceEvent) -> Result<()> {
        if let Some(q) = self.queue.lock().take() {
            q.add(&event.key);
        }
        self.inner.record(&event)
    }

    async fn delete(&self, event: ResourceEvent) -> Result<()> {
        self.inner.record(&event)
    }
}

/// Counts every metric call as `(metric, event)`.
#[derive(Default)]
pub struct Counting {
    pub calls: Mutex<Vec<(&'static str, &'static str)>>,
}

impl Counting {
    pub fn count(&self, metric: &str, event: &str) -> usize {
        self.calls.lock().iter().filter(|(m, e)| *m == metric && *e == event).count()
    }
}

impl Recorder for Counting {
    fn inc_queued(&self, _controller: &str, event: &'static str) {
        self.calls.lock().push(("queued", event));
    }

    fn inc_processed(&self, _controller: &str, event: &'static str) {
        self.calls.lock().push(("processed", event));
    }

    fn inc_processed_error(&self, _controller: &str, event: &'static str) {
        self.calls.lock().push(("processed_error", event));
    }

    fn observe_duration(&self, _controller: &str, event: &'static str, _started: Instant) {
        self.calls.lock().push(("duration", event));
    }
}

pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}
