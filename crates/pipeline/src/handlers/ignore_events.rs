use async_trait::async_trait;
use tracing::debug;
use vigil_core::{Handler, Input, Output, Result};

use super::is_ignored;

/// Stops the chain for the configured event kinds.
pub struct IgnoreEventsHandler {
    ignore: Vec<String>,
}

impl IgnoreEventsHandler {
    pub fn new(ignore: Vec<String>) -> Self {
        Self { ignore }
    }
}

#[async_trait]
impl Handler for IgnoreEventsHandler {
    fn name(&self) -> &str {
        "ignoreEvents"
    }

    async fn run(&self, input: Input) -> Result<Output> {
        if is_ignored(&self.ignore, input.event.kind) {
            debug!(key = %input.event.key, event = %input.event.kind, "event ignored");
            return Ok(Output::stop(input));
        }
        Ok(Output::pass(input))
    }
}
