//! Severity model and anomaly detection.

pub mod levels;
pub mod metrics;

use serde::{Deserialize, Serialize};

/// Severity of an observed problem, ordered by urgency.
///
/// `Ord` follows the escalation order, which makes `merge` a plain max and
/// lets any stage fold a sequence of severities down to one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    High,
    Critical,
}

impl Severity {
    /// Map a log level name to a severity, case-insensitively.
    /// Unrecognized names are `Ok`, never an error.
    pub fn classify(level: &str) -> Self {
        match level.trim().to_ascii_uppercase().as_str() {
            "WARNING" | "WARN" => Severity::Warning,
            "ERROR" => Severity::High,
            "CRITICAL" | "FATAL" => Severity::Critical,
            _ => Severity::Ok,
        }
    }

    /// The higher-ranked of the two. `Ok` is the identity.
    pub fn merge(self, other: Severity) -> Severity {
        self.max(other)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Ok => write!(f, "ok"),
            Severity::Warning => write!(f, "warning"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}
