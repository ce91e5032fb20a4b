//! Informer cache: a local mirror of one resource kind kept current by a
//! list/watch [`Source`], turning every change into a key on the work queue.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::metrics::Recorder;
use vigil_core::{object_key, EventKind, ListOptions, Source, SourceEvent};

use crate::WorkQueue;

const RELIST_BACKOFF_BASE: Duration = Duration::from_secs(1);
const RELIST_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Oldest unprocessed notification for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub kind: EventKind,
    pub has_synced: bool,
}

pub struct Cache {
    name: String,
    items: RwLock<FxHashMap<String, Arc<Value>>>,
    pending: Mutex<FxHashMap<String, Pending>>,
    queue: WorkQueue,
    synced: watch::Sender<bool>,
    recorder: Arc<dyn Recorder>,
}

impl Cache {
    pub fn new(name: impl Into<String>, queue: WorkQueue, recorder: Arc<dyn Recorder>) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            name: name.into(),
            items: RwLock::new(FxHashMap::default()),
            pending: Mutex::new(FxHashMap::default()),
            queue,
            synced,
            recorder,
        }
    }

    /// True once the first full listing has been mirrored.
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    pub async fn wait_synced(&self) {
        let mut rx = self.synced.subscribe();
        let _ = rx.wait_for(|synced| *synced).await;
    }

    pub fn get_by_key(&self, key: &str) -> Option<Arc<Value>> {
        self.items.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take_pending(&self, key: &str) -> Option<Pending> {
        self.pending.lock().remove(key)
    }

    /// Put back a record taken for a job that is going to be retried. It is
    /// older than anything that arrived meanwhile, so it wins.
    pub fn restore_pending(&self, key: &str, pending: Pending) {
        self.pending.lock().insert(key.to_string(), pending);
    }

    fn notify(&self, key: &str, kind: EventKind) {
        let has_synced = self.has_synced();
        self.pending.lock().entry(key.to_string()).or_insert(Pending { kind, has_synced });
        self.queue.add(key);
        self.recorder.inc_queued(&self.name, kind.label());
    }

    /// Apply one watch event. Returns the resource version to resume from.
    pub fn apply(&self, event: SourceEvent) -> Option<String> {
        match event {
            SourceEvent::Added(obj) | SourceEvent::Modified(obj) => {
                let rv = resource_version(&obj);
                let Some(key) = object_key(&obj) else {
                    warn!(cache = %self.name, "object without metadata.name; skipped");
                    return rv;
                };
                let existed = self.items.write().insert(key.clone(), Arc::new(obj)).is_some();
                self.notify(&key, if existed { EventKind::Update } else { EventKind::Add });
                rv
            }
            SourceEvent::Deleted(obj) => {
                let rv = resource_version(&obj);
                if let Some(key) = object_key(&obj) {
                    if self.items.write().remove(&key).is_some() {
                        self.notify(&key, EventKind::Delete);
                    }
                }
                rv
            }
            SourceEvent::Bookmark(rv) => Some(rv),
        }
    }

    /// Swap the mirror for a full listing: new keys are adds, known keys are
    /// updates, vanished keys are deletes.
    pub fn replace(&self, listing: Vec<Value>) {
        let mut next: FxHashMap<String, Arc<Value>> = FxHashMap::default();
        for obj in listing {
            match object_key(&obj) {
                Some(key) => {
                    next.insert(key, Arc::new(obj));
                }
                None => warn!(cache = %self.name, "listed object without metadata.name; skipped"),
            }
        }
        let mut changes: Vec<(String, EventKind)> = Vec::with_capacity(next.len());
        {
            let mut items = self.items.write();
            for key in next.keys() {
                let kind = if items.contains_key(key) { EventKind::Update } else { EventKind::Add };
                changes.push((key.clone(), kind));
            }
            for key in items.keys() {
                if !next.contains_key(key) {
                    changes.push((key.clone(), EventKind::Delete));
                }
            }
            *items = next;
        }
        debug!(cache = %self.name, changes = changes.len(), "listing replaced");
        for (key, kind) in changes {
            self.notify(&key, kind);
        }
    }

    /// Re-deliver every mirrored key as an update.
    pub fn resync(&self) {
        let keys = self.keys();
        debug!(cache = %self.name, count = keys.len(), "resync");
        for key in keys {
            self.notify(&key, EventKind::Update);
        }
    }

    fn mark_synced(&self, items: usize) {
        if !self.synced.send_replace(true) {
            info!(cache = %self.name, items, "cache synced");
        }
    }

    /// List, then watch, until `cancel` fires. Watch failures relist with back-off;
    /// a watch that simply ends is reopened from the last resource version.
    pub async fn run(&self, source: Arc<dyn Source>, opts: ListOptions, resync: Duration, cancel: CancellationToken) {
        let mut backoff = RELIST_BACKOFF_BASE;
        let mut resync_tick = tokio::time::interval_at(Instant::now() + resync, resync);
        resync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'list: loop {
            let listed = tokio::select! {
                _ = cancel.cancelled() => break 'list,
                res = source.list(&opts) => res,
            };
            let listing = match listed {
                Ok(l) => l,
                Err(e) => {
                    warn!(cache = %self.name, error = %e, backoff_ms = %backoff.as_millis(), "list failed");
                    if sleep_or_cancel(backoff, &cancel).await {
                        break 'list;
                    }
                    backoff = (backoff * 2).min(RELIST_BACKOFF_MAX);
                    continue 'list;
                }
            };
            let count = listing.items.len();
            self.replace(listing.items);
            self.mark_synced(count);

            let mut watch_opts =
                ListOptions { label_selector: opts.label_selector.clone(), resource_version: listing.resource_version };
            'watch: loop {
                let opened = tokio::select! {
                    _ = cancel.cancelled() => break 'list,
                    res = source.watch(&watch_opts) => res,
                };
                let mut stream = match opened {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(cache = %self.name, error = %e, "watch failed to open; relisting");
                        break 'watch;
                    }
                };
                backoff = RELIST_BACKOFF_BASE;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'list,
                        _ = resync_tick.tick() => self.resync(),
                        next = stream.next() => match next {
                            Some(Ok(ev)) => {
                                if let Some(rv) = self.apply(ev) {
                                    watch_opts.resource_version = Some(rv);
                                }
                            }
                            Some(Err(e)) => {
                                warn!(cache = %self.name, error = %e, "watch failed; relisting");
                                break 'watch;
                            }
                            None => {
                                debug!(cache = %self.name, "watch stream ended; reopening");
                                continue 'watch;
                            }
                        },
                    }
                }
            }
            if sleep_or_cancel(backoff, &cancel).await {
                break 'list;
            }
            backoff = (backoff * 2).min(RELIST_BACKOFF_MAX);
        }
        info!(cache = %self.name, "cache stopped");
    }
}

fn resource_version(obj: &Value) -> Option<String> {
    obj.get("metadata")
        .and_then(|m| m.get("resourceVersion"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Returns true when cancelled before the delay elapsed.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vigil_core::metrics::NoopRecorder;

    fn obj(name: &str, rv: &str) -> Value {
        json!({ "metadata": { "name": name, "namespace": "ns", "resourceVersion": rv } })
    }

    fn cache() -> (Cache, WorkQueue) {
        let q = WorkQueue::new();
        (Cache::new("test", q.clone(), Arc::new(NoopRecorder)), q)
    }

    #[test]
    fn replace_emits_add_update_delete() {
        let (c, _q) = cache();
        c.replace(vec![obj("a", "1"), obj("b", "1")]);
        assert_eq!(c.take_pending("ns/a").map(|p| p.kind), Some(EventKind::Add));
        assert_eq!(c.take_pending("ns/b").map(|p| p.kind), Some(EventKind::Add));

        c.replace(vec![obj("a", "2")]);
        assert_eq!(c.take_pending("ns/a").map(|p| p.kind), Some(EventKind::Update));
        assert_eq!(c.take_pending("ns/b").map(|p| p.kind), Some(EventKind::Delete));
        assert!(c.get_by_key("ns/b").is_none());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn oldest_pending_wins_until_taken() {
        let (c, _q) = cache();
        c.apply(SourceEvent::Added(obj("a", "1")));
        c.mark_synced(1);
        c.apply(SourceEvent::Modified(obj("a", "2")));
        assert_eq!(c.take_pending("ns/a"), Some(Pending { kind: EventKind::Add, has_synced: false }));
        assert_eq!(c.take_pending("ns/a"), None);
    }

    #[test]
    fn apply_returns_resume_version() {
        let (c, _q) = cache();
        assert_eq!(c.apply(SourceEvent::Added(obj("a", "7"))).as_deref(), Some("7"));
        assert_eq!(c.apply(SourceEvent::Bookmark("9".into())).as_deref(), Some("9"));
    }

    #[test]
    fn unknown_delete_is_not_queued() {
        let (c, q) = cache();
        c.apply(SourceEvent::Deleted(obj("ghost", "3")));
        assert!(q.is_empty());
        assert!(c.take_pending("ns/ghost").is_none());
    }
}
