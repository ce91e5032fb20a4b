use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vigil_core::{EventKind, Handler, Input, Notification, Output, Result, Sink};

use super::is_ignored;

/// Longest payload excerpt sent, in characters. Keeps the message, fences
/// included, under the 4000 character attachment limit.
pub const MAX_TEXT_CHARS: usize = 3994;

pub fn colour(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Add => "#1ADA00",
        EventKind::Update => "#F39C12",
        EventKind::Delete => "#FF0000",
    }
}

/// First `limit` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Formats the event as a [`Notification`] and hands it to a [`Sink`].
///
/// Kinds on its own ignore list are passed through without delivery.
pub struct NotifyHandler {
    name: String,
    cluster_name: String,
    ignore: Vec<String>,
    sink: Arc<dyn Sink>,
}

impl NotifyHandler {
    pub fn new(name: impl Into<String>, cluster_name: impl Into<String>, ignore: Vec<String>, sink: Arc<dyn Sink>) -> Self {
        Self { name: name.into(), cluster_name: cluster_name.into(), ignore, sink }
    }

    pub fn format(&self, input: &Input) -> Notification {
        let title = format!(
            "{} {} {}",
            input.event.kind.as_str().to_uppercase(),
            input.resource_kind,
            input.event.key
        );
        let text = if input.payload.is_empty() {
            String::new()
        } else {
            let payload = String::from_utf8_lossy(&input.payload);
            format!("```{}```", truncate_chars(&payload, MAX_TEXT_CHARS))
        };
        Notification {
            title,
            color: colour(input.event.kind).to_string(),
            text,
            footer: self.cluster_name.clone(),
            ts: chrono::Utc::now().timestamp(),
        }
    }
}

#[async_trait]
impl Handler for NotifyHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: Input) -> Result<Output> {
        if is_ignored(&self.ignore, input.event.kind) {
            debug!(sink = %self.name, key = %input.event.key, event = %input.event.kind, "delivery skipped");
            return Ok(Output::pass(input));
        }
        let message = self.format(&input);
        self.sink.deliver(&message).await?;
        debug!(sink = %self.name, title = %message.title, "notification delivered");
        Ok(Output::pass(input))
    }
}
