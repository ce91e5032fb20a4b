//! Vigil kubehub: kube client setup and list/watch sources over the
//! dynamic API for the builtin resource kinds.

#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    api::{Api, ListParams, WatchEvent, WatchParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject},
    Client, Config,
};
use tracing::{debug, info};
use vigil_core::{ListOptions, Listing, Registry, ResourceConfig, Source, SourceEvent};

/// Server-side watch timeout; the cache reopens the watch when it elapses.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Builtin resource names and their API types.
pub fn builtin_resources() -> Vec<(&'static str, ApiResource)> {
    vec![
        ("deployment", ApiResource::erase::<Deployment>(&())),
        ("statefulset", ApiResource::erase::<StatefulSet>(&())),
        ("daemonset", ApiResource::erase::<DaemonSet>(&())),
        ("service", ApiResource::erase::<Service>(&())),
        ("ingress", ApiResource::erase::<Ingress>(&())),
    ]
}

/// Client from an explicit kubeconfig, else the in-cluster / default chain.
pub async fn client(kubeconfig: Option<&Path>) -> Result<Client> {
    match kubeconfig {
        Some(path) => {
            let kc = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path.display()))?;
            let config = Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                .await
                .context("loading kubeconfig")?;
            info!(kubeconfig = %path.display(), cluster = %config.cluster_url, "kube client configured");
            Client::try_from(config).context("building kube client")
        }
        None => Client::try_default().await.context("inferring kube client config"),
    }
}

/// Register every builtin resource. Per-resource namespace and selector
/// override the process-wide ones.
pub fn register_resources(
    registry: &Registry,
    client: Client,
    namespace: Option<String>,
    label_selector: Option<String>,
) {
    for (name, ar) in builtin_resources() {
        let client = client.clone();
        let namespace = namespace.clone();
        let label_selector = label_selector.clone();
        registry.register_resource(name, move |cfg: &ResourceConfig| -> vigil_core::Result<Arc<dyn Source>> {
            let ns = cfg.namespace.clone().or_else(|| namespace.clone());
            let selector = cfg.label_selector.clone().or_else(|| label_selector.clone());
            Ok(Arc::new(KubeSource::new(client.clone(), &ar, ns.as_deref(), selector)))
        });
    }
}

/// List/watch over one resource kind via the dynamic API.
pub struct KubeSource {
    api: Api<DynamicObject>,
    kind: String,
    label_selector: Option<String>,
}

impl KubeSource {
    pub fn new(client: Client, ar: &ApiResource, namespace: Option<&str>, label_selector: Option<String>) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced_with(client, ns, ar),
            None => Api::all_with(client, ar),
        };
        Self { api, kind: ar.kind.clone(), label_selector }
    }

    fn selector<'a>(&'a self, opts: &'a ListOptions) -> Option<&'a str> {
        opts.label_selector.as_deref().or(self.label_selector.as_deref())
    }

    async fn list_inner(&self, opts: &ListOptions) -> Result<Listing> {
        let mut lp = ListParams::default();
        if let Some(sel) = self.selector(opts) {
            lp = lp.labels(sel);
        }
        let list = self.api.list(&lp).await.with_context(|| format!("listing {}", self.kind))?;
        let items = list.items.into_iter().map(to_value).collect::<Result<Vec<_>>>()?;
        debug!(kind = %self.kind, count = items.len(), "listed");
        Ok(Listing { items, resource_version: list.metadata.resource_version })
    }

    async fn watch_inner(&self, opts: &ListOptions) -> Result<BoxStream<'static, vigil_core::Result<SourceEvent>>> {
        let mut wp = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        if let Some(sel) = self.selector(opts) {
            wp = wp.labels(sel);
        }
        let version = opts.resource_version.as_deref().unwrap_or("0");
        let stream = self.api.watch(&wp, version).await.with_context(|| format!("watching {}", self.kind))?;
        Ok(stream
            .map_err(|e| anyhow::Error::new(e).context("watch stream"))
            .map(|ev| ev.and_then(map_event).map_err(source_error))
            .boxed())
    }
}

#[async_trait]
impl Source for KubeSource {
    async fn list(&self, opts: &ListOptions) -> vigil_core::Result<Listing> {
        self.list_inner(opts).await.map_err(source_error)
    }

    async fn watch(&self, opts: &ListOptions) -> vigil_core::Result<BoxStream<'static, vigil_core::Result<SourceEvent>>> {
        self.watch_inner(opts).await.map_err(source_error)
    }
}

fn source_error(e: anyhow::Error) -> vigil_core::Error {
    vigil_core::Error::Source(format!("{:#}", e))
}

fn to_value(obj: DynamicObject) -> Result<serde_json::Value> {
    let mut raw = serde_json::to_value(obj).context("serializing DynamicObject")?;
    strip_managed_fields(&mut raw);
    Ok(raw)
}

/// Translate a watch event. Server-side errors (e.g. 410 Gone) fail the
/// stream so the cache relists.
pub fn map_event(ev: WatchEvent<DynamicObject>) -> Result<SourceEvent> {
    match ev {
        WatchEvent::Added(o) => Ok(SourceEvent::Added(to_value(o)?)),
        WatchEvent::Modified(o) => Ok(SourceEvent::Modified(to_value(o)?)),
        WatchEvent::Deleted(o) => Ok(SourceEvent::Deleted(to_value(o)?)),
        WatchEvent::Bookmark(b) => Ok(SourceEvent::Bookmark(b.metadata.resource_version)),
        WatchEvent::Error(e) => Err(anyhow::anyhow!("watch error {} ({}): {}", e.code, e.reason, e.message)),
    }
}

pub fn strip_managed_fields(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
    }
}
