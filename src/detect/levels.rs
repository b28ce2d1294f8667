//! Level-driven severity scan.
//!
//! The cheap baseline check: parse each event's structured payload, map its
//! level through the severity model, and fold everything down to one overall
//! severity. No pattern matching happens here; that is the escalated stage's
//! job.

use crate::detect::Severity;
use crate::extract::payload::extract_structured_payload;
use crate::telemetry::LogEvent;

/// Outcome of one severity scan over a window of log events.
#[derive(Debug, Clone)]
pub struct LevelScan {
    pub severity: Severity,
    pub warning_count: usize,
    pub high_count: usize,
    pub critical_count: usize,
    pub summary: String,
    pub trace: Vec<String>,
}

/// Scan parsed payload levels and merge them into an overall severity.
///
/// Events without a parseable payload carry no level and are skipped; they
/// are not an error and contribute nothing here.
pub fn scan_levels(events: &[LogEvent]) -> LevelScan {
    let mut trace = Vec::new();
    let mut overall = Severity::Ok;
    let mut warning_count = 0;
    let mut high_count = 0;
    let mut critical_count = 0;

    for ev in events {
        let Some(extracted) = extract_structured_payload(&ev.message) else {
            continue;
        };
        let payload = &extracted.payload;
        let severity = Severity::classify(&payload.level);
        if severity == Severity::Ok {
            continue;
        }

        overall = overall.merge(severity);
        match severity {
            Severity::Warning => warning_count += 1,
            Severity::High => high_count += 1,
            Severity::Critical => critical_count += 1,
            Severity::Ok => {}
        }

        // One line per severity-bearing event so the backend console can be
        // cross-referenced from the audit trail.
        trace.push(format!(
            "[Log] {} | {} | {} | severity={}",
            extracted.backend_timestamp.as_deref().unwrap_or("-"),
            payload.event.as_deref().unwrap_or("-"),
            payload.message.as_deref().unwrap_or("-"),
            severity
        ));
    }

    let summary = if overall == Severity::Ok {
        "No warning, high, or critical incidents detected in recent logs.".to_string()
    } else {
        let mut parts = Vec::new();
        if warning_count > 0 {
            parts.push(format!("{warning_count} warning"));
        }
        if high_count > 0 {
            parts.push(format!("{high_count} high"));
        }
        if critical_count > 0 {
            parts.push(format!("{critical_count} critical"));
        }
        format!(
            "Detected elevated incident signals from recent logs: {}",
            parts.join(", ")
        )
    };
    trace.push(format!("Computed overall severity: {overall}"));

    LevelScan {
        severity: overall,
        warning_count,
        high_count,
        critical_count,
        summary,
        trace,
    }
}
