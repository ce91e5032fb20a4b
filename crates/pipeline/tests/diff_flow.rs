#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use vigil_core::{EventHandler, EventKind, Handler, Input, Output, ResourceEvent, Result};
use vigil_pipeline::{DiffHandler, HandlerChain, LogHandler, ResourcePipeline};

/// Last stage: remembers what reached it.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<(EventKind, Vec<u8>, Vec<u8>)>>>);

#[async_trait]
impl Handler for Capture {
    fn name(&self) -> &str {
        "capture"
    }

    async fn run(&self, input: Input) -> Result<Output> {
        self.0.lock().push((input.event.kind, input.manifest.clone(), input.payload.clone()));
        Ok(Output::pass(input))
    }
}

fn pipeline(capture: &Capture) -> ResourcePipeline {
    let diff = DiffHandler::from_config(&vigil_core::HandlerConfig::named("diff"));
    ResourcePipeline::new(
        "deployment",
        HandlerChain::new(vec![Box::new(diff), Box::new(LogHandler), Box::new(capture.clone())]),
    )
}

fn event(kind: EventKind, synced: bool, kind_field: &str) -> ResourceEvent {
    ResourceEvent::new("ns/web", kind, synced).with_object(Arc::new(json!({ "kind": kind_field })))
}

#[tokio::test]
async fn add_update_delete_scenario() {
    let capture = Capture::default();
    let p = pipeline(&capture);

    p.add(event(EventKind::Add, true, "fakeKind")).await.unwrap();
    p.add(event(EventKind::Update, true, "fakeKindDifferentThanPrevious")).await.unwrap();
    p.delete(ResourceEvent::new("ns/web", EventKind::Delete, true)).await.unwrap();

    let seen = capture.0.lock();
    assert_eq!(seen.len(), 3);

    let (kind, manifest, payload) = &seen[0];
    assert_eq!(*kind, EventKind::Add);
    assert!(payload.is_empty());
    assert!(String::from_utf8_lossy(manifest).contains("\"annotations\": {}"));

    let (kind, _, payload) = &seen[1];
    assert_eq!(*kind, EventKind::Update);
    let diff = String::from_utf8_lossy(payload);
    assert!(diff.contains("fakeKindDifferentThanPrevious"), "{}", diff);

    let (kind, manifest, _) = &seen[2];
    assert_eq!(*kind, EventKind::Delete);
    assert!(manifest.is_empty());
}

#[tokio::test]
async fn initial_listing_is_never_reported() {
    let capture = Capture::default();
    let p = pipeline(&capture);
    p.add(event(EventKind::Add, false, "fakeKind")).await.unwrap();
    // resync of an unchanged object
    p.add(event(EventKind::Update, true, "fakeKind")).await.unwrap();
    assert!(capture.0.lock().is_empty());
}

#[tokio::test]
async fn delete_clears_tracked_state() {
    let capture = Capture::default();
    let p = pipeline(&capture);
    p.add(event(EventKind::Add, false, "fakeKind")).await.unwrap();
    p.delete(ResourceEvent::new("ns/web", EventKind::Delete, true)).await.unwrap();
    // recreated with different content: nothing to compare against
    p.add(event(EventKind::Update, true, "fakeKindDifferentThanPrevious")).await.unwrap();

    let seen = capture.0.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, EventKind::Delete);
}

#[tokio::test]
async fn unsynced_update_is_stored_without_diff() {
    let capture = Capture::default();
    let p = pipeline(&capture);
    p.add(event(EventKind::Add, false, "a")).await.unwrap();
    p.add(event(EventKind::Update, false, "b")).await.unwrap();
    p.add(event(EventKind::Update, true, "c")).await.unwrap();

    let seen = capture.0.lock();
    assert_eq!(seen.len(), 1);
    let diff = String::from_utf8_lossy(&seen[0].2);
    assert!(diff.contains("-  \"kind\": \"b\""), "{}", diff);
    assert!(diff.contains("+  \"kind\": \"c\""), "{}", diff);
}
