//! Vigil store: the deduplicating work queue, the informer cache that feeds
//! it, and the per-diff-handler manifest store.

#![forbid(unsafe_code)]

pub mod cache;
pub mod manifest;
pub mod queue;

pub use cache::{Cache, Pending};
pub use manifest::ManifestStore;
pub use queue::{Backoff, WorkQueue};
