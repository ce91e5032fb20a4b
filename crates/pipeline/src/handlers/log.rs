use async_trait::async_trait;
use tracing::{debug, info, Level};
use vigil_core::{Handler, Input, Output, Result};

pub struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn run(&self, input: Input) -> Result<Output> {
        let ev = &input.event;
        info!(
            key = %ev.key,
            event = %ev.kind,
            resource = %input.resource_kind,
            synced = ev.has_synced,
            payload = %String::from_utf8_lossy(&input.payload),
            "resource event"
        );
        if tracing::enabled!(Level::DEBUG) {
            let pretty = vigil_diff::pretty_json(&input.manifest).unwrap_or_else(|_| input.manifest.clone());
            debug!(key = %ev.key, manifest = %String::from_utf8_lossy(&pretty), "manifest");
        }
        Ok(Output::pass(input))
    }
}
