//! Telemetry wire types and the collaborator boundaries they cross.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Half-open analysis window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window covering the last `minutes` up to now.
    pub fn last_minutes(minutes: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - chrono::Duration::minutes(minutes),
            end,
        }
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// A raw log line as returned by the telemetry backend. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Backend ingestion timestamp, epoch milliseconds.
    pub timestamp_ms: i64,
    /// Identifier of the stream the line came from.
    pub stream: String,
    /// The raw message text, structured or not.
    pub message: String,
}

impl LogEvent {
    pub fn new(timestamp_ms: i64, stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            stream: stream.into(),
            message: message.into(),
        }
    }
}

/// Metric categories the pipeline understands.
///
/// `Errors` and `Invocations` are fetched as separate series and combined
/// into an error rate by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Duration,
    Errors,
    Invocations,
    Cpu,
    Memory,
}

impl MetricCategory {
    /// Every category the orchestrator asks a metric source for.
    pub const ALL: [MetricCategory; 5] = [
        MetricCategory::Duration,
        MetricCategory::Errors,
        MetricCategory::Invocations,
        MetricCategory::Cpu,
        MetricCategory::Memory,
    ];
}

impl std::fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricCategory::Duration => write!(f, "duration"),
            MetricCategory::Errors => write!(f, "errors"),
            MetricCategory::Invocations => write!(f, "invocations"),
            MetricCategory::Cpu => write!(f, "cpu"),
            MetricCategory::Memory => write!(f, "memory"),
        }
    }
}

/// One aggregated reporting interval for a metric category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: Option<DateTime<Utc>>,
    pub maximum: Option<f64>,
    pub sum: Option<f64>,
}

impl Datapoint {
    pub fn with_maximum(value: f64) -> Self {
        Self {
            maximum: Some(value),
            ..Default::default()
        }
    }

    pub fn with_sum(value: f64) -> Self {
        Self {
            sum: Some(value),
            ..Default::default()
        }
    }
}

/// Source of raw log events. Transient backend failures may surface as an
/// error or as an empty page; the orchestrator treats both as "no events".
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch_logs(&self, window: TimeWindow) -> Result<Vec<LogEvent>>;
}

/// Source of aggregated metric datapoints, keyed by category. Categories
/// with no data may simply be absent from the map.
#[async_trait::async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch_metrics(
        &self,
        window: TimeWindow,
        categories: &[MetricCategory],
    ) -> Result<HashMap<MetricCategory, Vec<Datapoint>>>;
}
