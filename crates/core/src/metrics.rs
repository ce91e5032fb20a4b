//! Metrics seam for controllers and caches. Pure side effects, never a
//! decision point.

use std::time::Instant;

use metrics::{counter, histogram};

/// Event label for jobs re-enqueued after a failure.
pub const REQUEUE: &str = "requeue";

pub trait Recorder: Send + Sync {
    fn inc_queued(&self, controller: &str, event: &'static str);
    fn inc_processed(&self, controller: &str, event: &'static str);
    fn inc_processed_error(&self, controller: &str, event: &'static str);
    fn observe_duration(&self, controller: &str, event: &'static str, started: Instant);
}

/// Records through the `metrics` facade; exported by whatever recorder the
/// binary installs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl Recorder for MetricsRecorder {
    fn inc_queued(&self, controller: &str, event: &'static str) {
        counter!("vigil_events_queued_total", 1u64, "controller" => controller.to_string(), "event" => event);
    }

    fn inc_processed(&self, controller: &str, event: &'static str) {
        counter!("vigil_events_processed_total", 1u64, "controller" => controller.to_string(), "event" => event);
    }

    fn inc_processed_error(&self, controller: &str, event: &'static str) {
        counter!("vigil_events_processed_errors_total", 1u64, "controller" => controller.to_string(), "event" => event);
    }

    fn observe_duration(&self, controller: &str, event: &'static str, started: Instant) {
        histogram!(
            "vigil_event_processing_seconds",
            started.elapsed().as_secs_f64(),
            "controller" => controller.to_string(),
            "event" => event
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn inc_queued(&self, _controller: &str, _event: &'static str) {}
    fn inc_processed(&self, _controller: &str, _event: &'static str) {}
    fn inc_processed_error(&self, _controller: &str, _event: &'static str) {}
    fn observe_duration(&self, _controller: &str, _event: &'static str, _started: Instant) {}
}
