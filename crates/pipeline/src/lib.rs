//! Vigil handler pipeline: the chain, the builtin handlers, and the adapter
//! that lets a controller drive a chain.

#![forbid(unsafe_code)]

pub mod chain;
pub mod handlers;
pub mod sink;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use vigil_core::{Error, EventHandler, Handler, HandlerConfig, Input, Registry, ResourceEvent, Result};

pub use chain::HandlerChain;
pub use handlers::{DiffHandler, IgnoreEventsHandler, LogHandler, NotifyHandler};
pub use sink::SlackWebhookSink;

/// Register the builtin handlers: `diff`, `ignoreEvents`, `log`, `slack`.
pub fn register_builtin(registry: &Registry) {
    registry.register_handler("diff", |cfg: &HandlerConfig| -> Result<Box<dyn Handler>> {
        Ok(Box::new(DiffHandler::from_config(cfg)))
    });
    registry.register_handler("ignoreEvents", |cfg: &HandlerConfig| -> Result<Box<dyn Handler>> {
        Ok(Box::new(IgnoreEventsHandler::new(cfg.ignore_events.clone())))
    });
    registry.register_handler("log", |_cfg: &HandlerConfig| -> Result<Box<dyn Handler>> {
        Ok(Box::new(LogHandler))
    });
    registry.register_handler("slack", |cfg: &HandlerConfig| -> Result<Box<dyn Handler>> {
        if cfg.webhook_url.is_empty() {
            return Err(Error::Config("slack handler requires webhookUrl".into()));
        }
        let sink = Arc::new(SlackWebhookSink::new(cfg.webhook_url.clone())?);
        Ok(Box::new(NotifyHandler::new("slack", cfg.cluster_name.clone(), cfg.ignore_events.clone(), sink)))
    });
}

/// Build a fresh chain, in configuration order. Every call yields new handler
/// instances, so each resource kind gets its own diff state.
pub fn build_chain(registry: &Registry, configs: &[HandlerConfig]) -> Result<HandlerChain> {
    let handlers = configs.iter().map(|cfg| registry.build_handler(cfg)).collect::<Result<Vec<_>>>()?;
    let chain = HandlerChain::new(handlers);
    info!(handlers = ?chain.names(), "handler chain built");
    Ok(chain)
}

/// Runs a chain for every event of one resource kind.
pub struct ResourcePipeline {
    resource_kind: String,
    chain: HandlerChain,
}

impl ResourcePipeline {
    pub fn new(resource_kind: impl Into<String>, chain: HandlerChain) -> Self {
        Self { resource_kind: resource_kind.into(), chain }
    }

    pub fn resource_kind(&self) -> &str {
        &self.resource_kind
    }

    async fn dispatch(&self, event: ResourceEvent, manifest: Vec<u8>) -> Result<()> {
        let key = event.key.clone();
        let out = self
            .chain
            .run(Input { event, resource_kind: self.resource_kind.clone(), manifest, payload: Vec::new() })
            .await?;
        if !out.run_next {
            debug!(key = %key, resource = %self.resource_kind, "chain ended early");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ResourcePipeline {
    async fn add(&self, event: ResourceEvent) -> Result<()> {
        let manifest = match &event.object {
            Some(obj) => serde_json::to_vec(obj.as_ref())?,
            None => Vec::new(),
        };
        self.dispatch(event, manifest).await
    }

    async fn delete(&self, event: ResourceEvent) -> Result<()> {
        self.dispatch(event, Vec::new()).await
    }
}
