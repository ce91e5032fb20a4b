//! Deduplicating, rate-limited FIFO of object keys.
//!
//! A key is pending at most once. A key handed out by [`WorkQueue::get`] is
//! not handed out again until [`WorkQueue::done`] is called for it; re-adds
//! that arrive meanwhile are parked and re-queued on `done`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Per-key exponential back-off: `base * 2^failures`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base: Duration::from_millis(5), max: Duration::from_secs(1000) }
    }
}

impl Backoff {
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }
}

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    /// Keys waiting to be processed (queued, or parked behind an in-flight run).
    dirty: FxHashSet<String>,
    processing: FxHashSet<String>,
    failures: FxHashMap<String, u32>,
    shutting_down: bool,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
    backoff: Backoff,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::with_backoff(Backoff::default())
    }

    pub fn with_backoff(backoff: Backoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                backoff,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Enqueue `key` unless it is already pending. No-op after shutdown.
    pub fn add(&self, key: &str) {
        let mut st = self.inner.state.lock();
        if st.shutting_down || st.dirty.contains(key) {
            return;
        }
        st.dirty.insert(key.to_string());
        if st.processing.contains(key) {
            // picked up again by `done`
            return;
        }
        st.queue.push_back(key.to_string());
        drop(st);
        self.inner.notify.notify_one();
    }

    /// Wait for the next key. `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // register before inspecting state so a wake-up can't slip between
            notified.as_mut().enable();
            {
                let mut st = self.inner.state.lock();
                if let Some(key) = st.queue.pop_front() {
                    st.dirty.remove(&key);
                    st.processing.insert(key.clone());
                    return Some(key);
                }
                if st.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark `key` finished; a re-add that arrived while it ran is queued now.
    pub fn done(&self, key: &str) {
        let mut st = self.inner.state.lock();
        st.processing.remove(key);
        if st.dirty.contains(key) {
            st.queue.push_back(key.to_string());
            drop(st);
            self.inner.notify.notify_one();
        }
    }

    /// Clear the failure history of `key`.
    pub fn forget(&self, key: &str) {
        self.inner.state.lock().failures.remove(key);
    }

    pub fn num_requeues(&self, key: &str) -> u32 {
        self.inner.state.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Re-add `key` after a delay that doubles with every consecutive failure.
    pub fn add_rate_limited(&self, key: &str) {
        let delay = {
            let mut st = self.inner.state.lock();
            if st.shutting_down {
                return;
            }
            let failures = st.failures.entry(key.to_string()).or_insert(0);
            let delay = self.inner.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        trace!(key, delay_ms = %delay.as_millis(), "rate limited requeue");
        self.add_after(key, delay);
    }

    pub fn add_after(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        let key = key.to_string();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => queue.add(&key),
                _ = shutdown.cancelled() => {}
            }
        });
    }

    /// Stop accepting keys and release every blocked `get` once drained. Idempotent.
    pub fn shut_down(&self) {
        self.inner.state.lock().shutting_down = true;
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }

    /// Keys ready to be handed out (excludes in-flight and parked keys).
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
