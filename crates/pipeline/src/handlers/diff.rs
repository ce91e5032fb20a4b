use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vigil_core::{EventKind, Handler, HandlerConfig, Input, Output, Result};
use vigil_diff::{diff_lines, ManifestCleaner};
use vigil_store::ManifestStore;

/// Reports what changed between consecutive versions of an object.
///
/// Output manifest is the cleaned one; the payload is the line diff.
/// Updates advance the chain only when the diff is non-empty. Adds advance
/// with an empty payload once the cache is synced. Deletes drop the tracked
/// manifest and always advance.
pub struct DiffHandler {
    cleaner: ManifestCleaner,
    store: Arc<ManifestStore>,
}

impl DiffHandler {
    pub fn new(cleaner: ManifestCleaner, store: Arc<ManifestStore>) -> Self {
        Self { cleaner, store }
    }

    pub fn from_config(cfg: &HandlerConfig) -> Self {
        let cleaner = match &cfg.annotations_to_clean {
            Some(list) => ManifestCleaner::new(list.iter().cloned()),
            None => ManifestCleaner::default(),
        };
        Self::new(cleaner, Arc::new(ManifestStore::new()))
    }

    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }
}

#[async_trait]
impl Handler for DiffHandler {
    fn name(&self) -> &str {
        "diff"
    }

    async fn run(&self, input: Input) -> Result<Output> {
        let id = format!("{}/{}", input.event.key, input.resource_kind);
        match input.event.kind {
            EventKind::Delete => {
                self.store.delete(&id);
                debug!(object = %id, "stopped tracking");
                Ok(Output::pass(input))
            }
            EventKind::Add => {
                let cleaned = self.cleaner.clean(&input.manifest)?;
                self.store.add(&id, cleaned.clone());
                Ok(Output { manifest: cleaned, payload: Vec::new(), run_next: input.event.has_synced })
            }
            EventKind::Update => {
                let cleaned = self.cleaner.clean(&input.manifest)?;
                let diff = match self.store.get(&id) {
                    Some(previous) if input.event.has_synced => diff_lines(&previous, &cleaned)?,
                    _ => Vec::new(),
                };
                self.store.add(&id, cleaned.clone());
                let run_next = !diff.is_empty();
                if !run_next {
                    debug!(object = %id, "no visible change");
                }
                Ok(Output { manifest: cleaned, payload: diff, run_next })
            }
        }
    }
}
