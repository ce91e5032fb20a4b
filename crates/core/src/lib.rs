//! Vigil core types: resource events, pipeline input/output and the
//! capabilities (handler, source, sink) the rest of the workspace plugs into.

#![forbid(unsafe_code)]

pub mod error;
pub mod metrics;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};
pub use registry::{HandlerCtor, Registry, ResourceCtor};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "Add",
            EventKind::Update => "Update",
            EventKind::Delete => "Delete",
        }
    }

    /// Lowercase label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }

    /// Whether a configured event name (e.g. from an ignore list) names this kind.
    pub fn matches(&self, name: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(name.trim())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical change of a watched object, derived from the cache at
/// processing time.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    pub key: String,
    pub kind: EventKind,
    /// False while the event belongs to the initial catch-up listing.
    pub has_synced: bool,
    /// Current snapshot; `None` for deletions.
    pub object: Option<Arc<serde_json::Value>>,
}

impl ResourceEvent {
    pub fn new(key: impl Into<String>, kind: EventKind, has_synced: bool) -> Self {
        Self { key: key.into(), kind, has_synced, object: None }
    }

    pub fn with_object(mut self, object: Arc<serde_json::Value>) -> Self {
        self.object = Some(object);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Input {
    pub event: ResourceEvent,
    pub resource_kind: String,
    pub manifest: Vec<u8>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub manifest: Vec<u8>,
    pub payload: Vec<u8>,
    pub run_next: bool,
}

impl Output {
    /// Hand manifest and payload through untouched and let the chain continue.
    pub fn pass(input: Input) -> Self {
        Self { manifest: input.manifest, payload: input.payload, run_next: true }
    }

    /// Hand manifest and payload through untouched but stop the chain.
    pub fn stop(input: Input) -> Self {
        Self { manifest: input.manifest, payload: input.payload, run_next: false }
    }
}

/// Build the `namespace/name` key (or `name` for cluster-scoped objects).
pub fn object_key(obj: &serde_json::Value) -> Option<String> {
    let meta = obj.get("metadata")?;
    let name = meta.get("name").and_then(|v| v.as_str()).filter(|s| !s.is_empty())?;
    match meta.get("namespace").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
        Some(ns) => Some(format!("{}/{}", ns, name)),
        None => Some(name.to_string()),
    }
}

/// Split an object key into `(namespace, name)`.
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('/') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, key),
    }
}

/// A pipeline stage: process one event, say whether downstream stages run.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, input: Input) -> Result<Output>;
}

/// What a controller drives for every dequeued key.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Object is present in the cache (created, updated or resynced).
    async fn add(&self, event: ResourceEvent) -> Result<()>;

    /// Object is gone from the cache.
    async fn delete(&self, event: ResourceEvent) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    /// Resume point for watches; taken from the last listing or bookmark.
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub items: Vec<serde_json::Value>,
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SourceEvent {
    Added(serde_json::Value),
    Modified(serde_json::Value),
    Deleted(serde_json::Value),
    Bookmark(String),
}

/// List/watch capability for one resource kind.
#[async_trait]
pub trait Source: Send + Sync {
    async fn list(&self, opts: &ListOptions) -> Result<Listing>;

    async fn watch(&self, opts: &ListOptions) -> Result<BoxStream<'static, Result<SourceEvent>>>;
}

/// A formatted, transport-neutral notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub color: String,
    pub text: String,
    pub footer: String,
    pub ts: i64,
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, message: &Notification) -> Result<()>;
}

/// Per-handler settings. Fields a handler does not use stay at their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct HandlerConfig {
    pub name: String,
    pub cluster_name: String,
    pub webhook_url: String,
    pub ignore_events: Vec<String>,
    pub annotations_to_clean: Option<Vec<String>>,
}

impl HandlerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceConfig {
    pub kind: String,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

pub mod prelude {
    pub use super::{
        EventHandler, EventKind, Handler, HandlerConfig, Input, ListOptions, Listing, Notification, Output,
        ResourceConfig, ResourceEvent, Sink, Source, SourceEvent,
    };
    pub use super::{Error, Result};
}
