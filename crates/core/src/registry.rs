//! Name-keyed constructor tables for pluggable handlers and resources.
//!
//! A `Registry` is built once at process start and filled by an explicit
//! bootstrap step; afterwards it is only read while assembling pipelines.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::{Error, Handler, HandlerConfig, ResourceConfig, Result, Source};

pub const HANDLER: &str = "handler";
pub const RESOURCE: &str = "resource";

pub type HandlerCtor = Arc<dyn Fn(&HandlerConfig) -> Result<Box<dyn Handler>> + Send + Sync>;
pub type ResourceCtor = Arc<dyn Fn(&ResourceConfig) -> Result<Arc<dyn Source>> + Send + Sync>;

struct Namespace<C> {
    name: &'static str,
    entries: RwLock<FxHashMap<String, C>>,
}

impl<C: Clone> Namespace<C> {
    fn new(name: &'static str) -> Self {
        Self { name, entries: RwLock::new(FxHashMap::default()) }
    }

    /// Append-only: an existing entry is never replaced.
    fn register(&self, item: &str, ctor: C) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(item) {
            warn!(namespace = self.name, name = item, "duplicate registration ignored");
            return false;
        }
        debug!(namespace = self.name, name = item, "registered");
        entries.insert(item.to_string(), ctor);
        true
    }

    fn resolve(&self, item: &str) -> Option<C> {
        self.entries.read().get(item).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct Registry {
    handlers: Namespace<HandlerCtor>,
    resources: Namespace<ResourceCtor>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self { handlers: Namespace::new(HANDLER), resources: Namespace::new(RESOURCE) }
    }

    pub fn register_handler<F>(&self, name: &str, ctor: F) -> bool
    where
        F: Fn(&HandlerConfig) -> Result<Box<dyn Handler>> + Send + Sync + 'static,
    {
        self.handlers.register(name, Arc::new(ctor))
    }

    pub fn register_resource<F>(&self, name: &str, ctor: F) -> bool
    where
        F: Fn(&ResourceConfig) -> Result<Arc<dyn Source>> + Send + Sync + 'static,
    {
        self.resources.register(name, Arc::new(ctor))
    }

    pub fn handler(&self, name: &str) -> Option<HandlerCtor> {
        self.handlers.resolve(name)
    }

    pub fn resource(&self, name: &str) -> Option<ResourceCtor> {
        self.resources.resolve(name)
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.names()
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.resources.names()
    }

    /// Construct the handler named by `cfg.name`; unknown names are a config error.
    pub fn build_handler(&self, cfg: &HandlerConfig) -> Result<Box<dyn Handler>> {
        let ctor = self
            .handler(&cfg.name)
            .ok_or_else(|| Error::NotRegistered { namespace: HANDLER, name: cfg.name.clone() })?;
        ctor(cfg)
    }

    pub fn build_source(&self, cfg: &ResourceConfig) -> Result<Arc<dyn Source>> {
        let ctor = self
            .resource(&cfg.kind)
            .ok_or_else(|| Error::NotRegistered { namespace: RESOURCE, name: cfg.kind.clone() })?;
        ctor(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Input, Output};
    use async_trait::async_trait;

    struct Named(String);

    #[async_trait]
    impl Handler for Named {
        fn name(&self) -> &str {
            &self.0
        }

        async fn run(&self, input: Input) -> Result<Output> {
            Ok(Output::pass(input))
        }
    }

    fn ctor(cfg: &HandlerConfig) -> Result<Box<dyn Handler>> {
        Ok(Box::new(Named(cfg.name.clone())))
    }

    #[test]
    fn resolves_registered_handler() {
        let reg = Registry::new();
        assert!(reg.register_handler("log", ctor));
        let h = reg.build_handler(&HandlerConfig::named("log")).unwrap();
        assert_eq!(h.name(), "log");
        assert_eq!(reg.handler_names(), vec!["log".to_string()]);
    }

    #[test]
    fn unknown_name_is_config_error() {
        let reg = Registry::new();
        match reg.build_handler(&HandlerConfig::named("nope")) {
            Err(Error::NotRegistered { namespace, name }) => {
                assert_eq!(namespace, HANDLER);
                assert_eq!(name, "nope");
            }
            other => panic!("unexpected: {:?}", other.map(|h| h.name().to_string())),
        }
        let res = reg.build_source(&ResourceConfig { kind: "deployment".into(), ..Default::default() });
        assert!(matches!(res, Err(Error::NotRegistered { namespace: RESOURCE, .. })));
    }

    #[test]
    fn registration_is_append_only() {
        let reg = Registry::new();
        assert!(reg.register_handler("diff", ctor));
        assert!(!reg.register_handler("diff", |_cfg: &HandlerConfig| -> Result<Box<dyn Handler>> {
            Ok(Box::new(Named("other".into())))
        }));
        let h = reg.build_handler(&HandlerConfig::named("diff")).unwrap();
        assert_eq!(h.name(), "diff");
    }

    #[test]
    fn namespaces_are_independent() {
        let reg = Registry::new();
        reg.register_handler("deployment", ctor);
        assert!(reg.resource("deployment").is_none());
        assert!(reg.handler("deployment").is_some());
    }

    #[test]
    fn concurrent_registration() {
        let reg = Arc::new(Registry::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    reg.register_handler(&format!("h{}", i), ctor);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(reg.handler_names().len(), 8);
    }
}
