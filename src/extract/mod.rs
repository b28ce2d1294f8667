//! Evidence extraction from raw log lines.

pub mod patterns;
pub mod payload;

pub use self::patterns::{LogReport, PatternScanner};
pub use self::payload::{extract_structured_payload, ExtractedPayload, StructuredPayload};

use serde::Serialize;

/// Evidence families a log line can contribute to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Timeout,
    Latency,
    Retry,
    Resource,
    Error,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingKind::Timeout => write!(f, "timeout"),
            FindingKind::Latency => write!(f, "latency"),
            FindingKind::Retry => write!(f, "retry"),
            FindingKind::Resource => write!(f, "resource"),
            FindingKind::Error => write!(f, "error"),
        }
    }
}

/// A single piece of log-derived evidence.
///
/// A single event may yield findings in several families, but at most one
/// finding per family, so counts stay per-event rather than per-hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    /// Backend timestamp of the originating event, epoch milliseconds.
    pub timestamp_ms: i64,
    pub message: String,
    pub scenario: Option<String>,
    /// Magnitude in milliseconds, only for latency findings that carried
    /// a numeric duration token.
    pub latency_ms: Option<u64>,
}
