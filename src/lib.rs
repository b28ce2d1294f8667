//! Teletriage -- telemetry incident detection and diagnosis pipeline.
//!
//! This crate watches structured log events and numeric metrics for a
//! running service, runs a cheap severity check on every poll tick, and
//! escalates to full evidence extraction, root cause inference, and
//! incident assembly once severity crosses the alert threshold.

pub mod detect;
pub mod extract;
pub mod incident;
pub mod infer;
pub mod orchestrator;
pub mod summarize;
pub mod telemetry;

pub use detect::metrics::MetricThresholds;
pub use detect::Severity;
pub use incident::Incident;
pub use orchestrator::{MonitorConfig, Orchestrator, TickOutcome};
pub use summarize::Summarizer;
pub use telemetry::{LogSource, MetricSource};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build an orchestrator and run the monitor loop until cancelled.
/// Returns the incidents collected over the loop's lifetime.
pub async fn monitor(
    config: MonitorConfig,
    logs: Arc<dyn LogSource>,
    metrics: Arc<dyn MetricSource>,
    summarizer: Option<Arc<dyn Summarizer>>,
    cancel: CancellationToken,
) -> Vec<Incident> {
    let mut orchestrator = Orchestrator::new(config, logs, metrics);
    if let Some(summarizer) = summarizer {
        orchestrator = orchestrator.with_summarizer(summarizer);
    }
    orchestrator.run(cancel).await
}
