use tracing::trace;
use vigil_core::{Error, Handler, Input, Output, Result};

/// Ordered handlers run one after another for a single event.
///
/// Each stage sees the manifest and payload produced by the previous one. A
/// stage returning `run_next == false` ends the run without error; a failing
/// stage ends it with [`Error::Stage`]. Earlier side effects are kept.
pub struct HandlerChain {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerChain {
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Self {
        Self { handlers }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub async fn run(&self, input: Input) -> Result<Output> {
        let Input { event, resource_kind, mut manifest, mut payload } = input;
        for (index, handler) in self.handlers.iter().enumerate() {
            let stage_input =
                Input { event: event.clone(), resource_kind: resource_kind.clone(), manifest, payload };
            let out = handler.run(stage_input).await.map_err(|e| Error::Stage {
                index,
                name: handler.name().to_string(),
                source: Box::new(e),
            })?;
            manifest = out.manifest;
            payload = out.payload;
            if !out.run_next {
                trace!(key = %event.key, stage = handler.name(), "chain stopped");
                return Ok(Output { manifest, payload, run_next: false });
            }
        }
        Ok(Output { manifest, payload, run_next: true })
    }
}
